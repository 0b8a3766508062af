//! Class entry: one bindable class of the wrapped hierarchy.
//!
//! A `ClassEntry` aggregates the method set, the attribute accessor, and
//! exactly one constructor. The base class is a name reference resolved by
//! lookup in the module, never an owning link: an unknown or empty base
//! simply leaves the entry non-derived.
//!
//! Deriving is a clone-time snapshot: `clone_as` copies the base's method
//! and attribute sets as they exist at that moment, and later additions to
//! the base do not propagate to the derived entry.

use crate::entries::getattr::GetattrEntry;
use crate::entries::method::{MethodEntry, MethodKind};
use crate::error::EmitError;
use crate::escape::escape_for_string;
use crate::marshal::TypeRegistry;

/// Whether a class wraps an object-model class or a bound plain struct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassKind {
    /// A full object-model class; instances are constructed natively.
    Object,
    /// A bound struct; the wrapper only carries a pointer to it.
    BoundStruct,
}

/// One bindable class.
#[derive(Debug, Clone)]
pub struct ClassEntry {
    /// Class name.
    pub name: String,
    /// Base class name (weak reference; resolved by module lookup).
    pub base_name: Option<String>,
    /// Object-model class or bound struct.
    pub kind: ClassKind,
    /// Methods in declaration order.
    pub methods: Vec<MethodEntry>,
    /// The one constructor; emission fails without it.
    pub constructor: Option<MethodEntry>,
    /// The per-class dynamic attribute accessor.
    pub getattr: GetattrEntry,
    /// Raw modifier text from the directive (`PRIVATE`, `ABSTRACT`, ...).
    pub modifier: String,
    /// Documentation attached to the class directive.
    pub docstring: String,
}

impl ClassEntry {
    /// Create a fresh object-model class.
    pub fn new_object(name: impl Into<String>, base_name: Option<String>) -> Self {
        let name = name.into();
        Self {
            getattr: GetattrEntry::new(name.clone(), base_name.clone()),
            name,
            base_name,
            kind: ClassKind::Object,
            methods: Vec::new(),
            constructor: None,
            modifier: String::new(),
            docstring: String::new(),
        }
    }

    /// Create a bound-struct class with its allocation-free constructor.
    pub fn new_struct(name: impl Into<String>) -> Self {
        let name = name.into();
        let constructor = MethodEntry::new(MethodKind::StructConstructor, name.clone(), None, "Con");
        Self {
            getattr: GetattrEntry::new(name.clone(), None),
            constructor: Some(constructor),
            name,
            base_name: None,
            kind: ClassKind::BoundStruct,
            methods: Vec::new(),
            modifier: String::new(),
            docstring: String::new(),
        }
    }

    /// True when visibility modifiers permit code generation.
    pub fn is_active(&self) -> bool {
        if self.modifier.contains("PRIVATE") || self.modifier.contains("ABSTRACT") {
            log::debug!("{} is not active: {}", self.name, self.modifier);
            return false;
        }
        true
    }

    /// Derive a new class from this one, snapshotting the current method,
    /// attribute, and constructor sets under the new name.
    pub fn clone_as(&self, new_name: &str) -> Self {
        Self {
            name: new_name.to_string(),
            base_name: Some(self.name.clone()),
            kind: ClassKind::Object,
            methods: self.methods.iter().map(|m| m.clone_for(new_name)).collect(),
            constructor: self.constructor.as_ref().map(|c| c.clone_for(new_name)),
            getattr: self.getattr.clone_for(new_name),
            modifier: String::new(),
            docstring: String::new(),
        }
    }

    /// Parse and append a method directive.
    pub fn add_method(
        &mut self,
        registry: &TypeRegistry,
        name: &str,
        args: &[(String, String)],
        return_type: &str,
        docstring: &str,
    ) {
        let mut method = MethodEntry::new(
            MethodKind::Regular,
            self.name.clone(),
            self.base_name.clone(),
            name,
        );
        for (spelling, arg_name) in args {
            method.add_arg(registry, spelling, arg_name);
        }
        method.set_return_type(registry, return_type);
        method.set_docstring(docstring);
        self.methods.push(method);
    }

    /// Parse and record the constructor directive.
    pub fn add_constructor(
        &mut self,
        registry: &TypeRegistry,
        name: &str,
        args: &[(String, String)],
        docstring: &str,
    ) {
        let mut constructor = MethodEntry::new(
            MethodKind::Constructor,
            self.name.clone(),
            self.base_name.clone(),
            name,
        );
        for (spelling, arg_name) in args {
            constructor.add_arg(registry, spelling, arg_name);
        }
        constructor.set_docstring(docstring);
        self.constructor = Some(constructor);
    }

    /// Parse and record an attribute declaration.
    ///
    /// Field reads never transfer ownership, so the binding is dispatched
    /// borrowed. Unknown types drop the attribute with a logged warning.
    pub fn add_attribute(&mut self, registry: &TypeRegistry, name: &str, spelling: &str) {
        match registry.dispatch(name, &format!("BORROWED {}", spelling.trim())) {
            Ok(marshaler) => self.getattr.add_attribute(marshaler),
            Err(err) => {
                log::warn!("unknown attribute type for {}.{name}: {err}", self.name);
            }
        }
    }

    /// Emit the wrapper struct layout.
    pub fn struct_decl(&self) -> String {
        match self.kind {
            ClassKind::Object => format!(
                "\ntypedef struct {{\n  PyObject_HEAD\n  {n} base;\n}} py{n}; \n\n",
                n = self.name
            ),
            ClassKind::BoundStruct => format!(
                "\ntypedef struct {{\n  PyObject_HEAD\n  {n} *base;\n}} py{n}; \n\n",
                n = self.name
            ),
        }
    }

    /// Emit the forward prototypes for the declarations pass.
    pub fn prototypes(&self) -> String {
        let mut out = format!("staticforward PyTypeObject {}_Type;\n", self.name);
        if let Some(constructor) = &self.constructor {
            out.push_str(&constructor.prototype());
        }
        out.push_str(&self.getattr.prototype());
        for method in &self.methods {
            out.push_str(&method.prototype());
        }
        out
    }

    /// Emit the method table.
    pub fn method_def_table(&self) -> String {
        let mut out = format!("static PyMethodDef {}_methods[] = {{\n", self.name);
        for method in &self.methods {
            let docstring = format!("{}\n\n{}", method.comment(), method.docstring);
            out.push_str(&format!(
                "     {{\"{m}\",(PyCFunction)py{c}_{m}, METH_VARARGS|METH_KEYWORDS, \"{doc}\"}},\n",
                m = method.name,
                c = self.name,
                doc = escape_for_string(&docstring)
            ));
        }
        out.push_str("     {NULL}  /* Sentinel */\n};\n");
        out
    }

    /// Emit the destructor, constructor, accessor, and method bodies.
    ///
    /// Fails when the class reached emission without a constructor; no valid
    /// wrapper can be produced in that case.
    pub fn code(&self) -> Result<String, EmitError> {
        let constructor = self
            .constructor
            .as_ref()
            .ok_or_else(|| EmitError::MissingConstructor {
                class: self.name.clone(),
            })?;

        let mut out = String::new();
        out.push_str(&constructor.destructor());
        out.push_str(&constructor.definition());
        out.push_str(&self.getattr.definition());
        for method in &self.methods {
            out.push_str(&method.definition());
        }
        Ok(out)
    }

    /// Emit this class's slot registration in the runtime type table.
    pub fn initialise(&self) -> String {
        match self.kind {
            ClassKind::Object => format!(
                "python_wrappers[TOTAL_CLASSES].class_ref = (Object)&__{n};\npython_wrappers[TOTAL_CLASSES++].python_type = &{n}_Type;\n",
                n = self.name
            ),
            ClassKind::BoundStruct => String::new(),
        }
    }

    /// Emit the full type-descriptor record.
    pub fn type_object(&self, module_name: &str) -> String {
        format!(
            r#"
static PyTypeObject {class}_Type = {{
    PyObject_HEAD_INIT(NULL)
    0,                         /* ob_size */
    "{module}.{class}",               /* tp_name */
    sizeof(py{class}),            /* tp_basicsize */
    0,                         /* tp_itemsize */
    (destructor){class}_dealloc,/* tp_dealloc */
    0,                         /* tp_print */
    0,                         /* tp_getattr */
    0,                         /* tp_setattr */
    0,                         /* tp_compare */
    0,                         /* tp_repr */
    0,                         /* tp_as_number */
    0,                         /* tp_as_sequence */
    0,                         /* tp_as_mapping */
    0,                         /* tp_hash */
    0,                         /* tp_call */
    0,                         /* tp_str */
    (getattrofunc){class}_getattr,                         /* tp_getattro */
    0,                         /* tp_setattro */
    0,                         /* tp_as_buffer */
    Py_TPFLAGS_DEFAULT | Py_TPFLAGS_BASETYPE,        /* tp_flags */
    "{doc}",     /* tp_doc */
    0,	                       /* tp_traverse */
    0,                         /* tp_clear */
    0,                         /* tp_richcompare */
    0,                         /* tp_weaklistoffset */
    0,                         /* tp_iter */
    0,                         /* tp_iternext */
    {class}_methods,            /* tp_methods */
    0,                         /* tp_members */
    0,                         /* tp_getset */
    0,                         /* tp_base */
    0,                         /* tp_dict */
    0,                         /* tp_descr_get */
    0,                         /* tp_descr_set */
    0,                         /* tp_dictoffset */
    (initproc)py{class}_init,      /* tp_init */
    0,                         /* tp_alloc */
    0,                         /* tp_new */
}};
"#,
            class = self.name,
            module = module_name,
            doc = format!("{}: {}", self.name, escape_for_string(&self.docstring)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(name: &str) -> TypeRegistry {
        let mut registry = TypeRegistry::with_builtins();
        registry.register_class(name);
        registry
    }

    #[test]
    fn private_and_abstract_classes_are_inactive() {
        let mut cls = ClassEntry::new_object("Secret", None);
        cls.modifier = "PRIVATE".to_string();
        assert!(!cls.is_active());

        cls.modifier = "ABSTRACT".to_string();
        assert!(!cls.is_active());

        cls.modifier = String::new();
        assert!(cls.is_active());
    }

    #[test]
    fn clone_snapshots_the_method_set() {
        let registry = registry_with("Base");
        let mut base = ClassEntry::new_object("Base", None);
        base.add_constructor(&registry, "Con", &[], "");
        base.add_method(&registry, "first", &[], "int", "");

        let derived = base.clone_as("Derived");
        assert_eq!(derived.base_name.as_deref(), Some("Base"));
        assert_eq!(derived.methods.len(), 1);

        // Additions to the base after the clone point must not propagate.
        base.add_method(&registry, "second", &[], "int", "");
        assert_eq!(base.methods.len(), 2);
        assert_eq!(derived.methods.len(), 1);
        assert!(!derived.method_def_table().contains("second"));
    }

    #[test]
    fn code_requires_a_constructor() {
        let cls = ClassEntry::new_object("Foo", None);
        let err = cls.code().unwrap_err();
        assert_eq!(
            err,
            EmitError::MissingConstructor {
                class: "Foo".to_string()
            }
        );
    }

    #[test]
    fn struct_wrapper_holds_a_pointer() {
        let cls = ClassEntry::new_struct("RDFURN");
        assert!(cls.struct_decl().contains("RDFURN *base;"));
        assert!(cls.constructor.is_some());
        // Bound structs never occupy a runtime type-table slot.
        assert_eq!(cls.initialise(), "");
    }

    #[test]
    fn object_wrapper_embeds_the_handle() {
        let cls = ClassEntry::new_object("ZipFile", None);
        assert!(cls.struct_decl().contains("ZipFile base;"));
        assert!(cls.initialise().contains("python_wrappers[TOTAL_CLASSES]"));
    }

    #[test]
    fn method_table_escapes_docstrings() {
        let registry = registry_with("ZipFile");
        let mut cls = ClassEntry::new_object("ZipFile", None);
        cls.add_method(&registry, "read", &[], "int", "Reads \"raw\" bytes\n");
        let table = cls.method_def_table();
        assert!(table.contains("\\\"raw\\\""));
        assert!(table.contains("{NULL}  /* Sentinel */"));
    }

    #[test]
    fn unknown_attribute_type_is_dropped() {
        let registry = TypeRegistry::with_builtins();
        let mut cls = ClassEntry::new_object("ZipFile", None);
        cls.add_attribute(&registry, "mystery", "struct unknown_t *");
        assert!(cls.getattr.attributes.is_empty());
    }

    #[test]
    fn type_object_names_the_module() {
        let cls = ClassEntry::new_object("ZipFile", None);
        let record = cls.type_object("pyaff4");
        assert!(record.contains("\"pyaff4.ZipFile\","));
        assert!(record.contains("(initproc)pyZipFile_init"));
    }
}
