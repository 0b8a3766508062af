//! Module model: the mutable build phase and the frozen emission phase.
//!
//! One [`ModuleBuilder`] exists per generation run. The scanner mutates it
//! while directives stream in: classes are created (or cloned from their
//! base), methods and attributes accumulate, constants are discovered, and
//! every wrapped class name extends the type registry. When parsing is done
//! the builder freezes into an immutable [`Module`], and only the frozen
//! view can emit — there is no way to mutate the model during emission.
//!
//! Emission is two-pass (struct layouts and forward prototypes first, then
//! implementations) followed by the module initializer, which registers
//! types strictly in inheritance order so the runtime hierarchy is wired
//! bottom-up regardless of declaration order in the input.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::entries::{ClassEntry, ClassKind, ConstantEntry, ConstantKind};
use crate::error::EmitError;
use crate::marshal::TypeRegistry;

/// Mutable module model, populated during parsing.
#[derive(Debug)]
pub struct ModuleBuilder {
    name: String,
    constants: Vec<ConstantEntry>,
    classes: Vec<ClassEntry>,
    index: FxHashMap<String, usize>,
    headers: String,
    registry: TypeRegistry,
    init_call: Option<String>,
}

impl ModuleBuilder {
    /// Create a builder for a named extension module.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constants: Vec::new(),
            classes: Vec::new(),
            index: FxHashMap::default(),
            headers: "#include <Python.h>\n".to_string(),
            registry: TypeRegistry::with_builtins(),
            init_call: None,
        }
    }

    /// Statement (without trailing `;`) run at the top of the generated
    /// initializer, typically the wrapped library's init function.
    pub fn set_init_call(&mut self, call: impl Into<String>) {
        self.init_call = Some(call.into());
    }

    /// Record an input header; the generated unit includes it.
    pub fn add_include(&mut self, path: &str) {
        self.headers.push_str(&format!("#include \"{path}\"\n"));
    }

    /// Record a discovered constant macro.
    pub fn add_constant(&mut self, name: &str, kind: ConstantKind) {
        self.constants.push(ConstantEntry::new(name, kind));
    }

    /// The type registry, for dispatching spellings during parsing.
    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Look up a class by name.
    pub fn class(&self, name: &str) -> Option<&ClassEntry> {
        self.index.get(name).map(|&i| &self.classes[i])
    }

    /// Insert a class, registering its name as a wrapper spelling.
    ///
    /// A later class with the same name replaces the earlier one.
    pub fn add_class(&mut self, class: ClassEntry) {
        match class.kind {
            ClassKind::Object => self.registry.register_class(&class.name),
            ClassKind::BoundStruct => self.registry.register_struct(&class.name),
        }
        if let Some(&i) = self.index.get(&class.name) {
            self.classes[i] = class;
        } else {
            self.index.insert(class.name.clone(), self.classes.len());
            self.classes.push(class);
        }
    }

    /// Append a method (or, when `constructor` is set, the constructor) to a
    /// class. Unknown class names are ignored.
    pub fn add_method(
        &mut self,
        class_name: &str,
        method_name: &str,
        args: &[(String, String)],
        return_type: &str,
        docstring: &str,
        constructor: bool,
    ) {
        let Some(&i) = self.index.get(class_name) else {
            return;
        };
        let registry = &self.registry;
        let class = &mut self.classes[i];
        if constructor {
            class.add_constructor(registry, method_name, args, docstring);
        } else {
            class.add_method(registry, method_name, args, return_type, docstring);
        }
    }

    /// Append an attribute declaration to a class.
    pub fn add_attribute(&mut self, class_name: &str, attr_name: &str, spelling: &str) {
        let Some(&i) = self.index.get(class_name) else {
            return;
        };
        let registry = &self.registry;
        self.classes[i].add_attribute(registry, attr_name, spelling);
    }

    /// Freeze the model for emission.
    pub fn freeze(self) -> Module {
        Module {
            name: self.name,
            constants: self.constants,
            classes: self.classes,
            index: self.index,
            headers: self.headers,
            init_call: self.init_call,
        }
    }
}

/// Immutable module view; the only type that can emit.
#[derive(Debug)]
pub struct Module {
    name: String,
    constants: Vec<ConstantEntry>,
    classes: Vec<ClassEntry>,
    index: FxHashMap<String, usize>,
    headers: String,
    init_call: Option<String>,
}

impl Module {
    /// The extension module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a class by name.
    pub fn class(&self, name: &str) -> Option<&ClassEntry> {
        self.index.get(name).map(|&i| &self.classes[i])
    }

    fn active_classes(&self) -> impl Iterator<Item = &ClassEntry> {
        self.classes.iter().filter(|c| c.is_active())
    }

    /// Shared support code: the runtime type-lookup table sized to the class
    /// count, the wrapper factory consulting it, and the inheritance-aware
    /// type check.
    fn private_functions(&self) -> String {
        format!(
            r#"
/* The following is a static array mapping CLASS() pointers to their
python wrappers. This is used to allow the correct wrapper to be
chosen depending on the object type found - regardless of the
prototype.

This is basically a safer way for us to cast the correct python type
depending on context rather than assuming a type based on the .h
definition. For example consider the function

AFFObject Resolver.open(uri, mode)

The .h file implies that an AFFObject object is returned, but this is
not true as most of the time an object of a derived class will be
returned. In C we cast the returned value to the correct type. In the
python wrapper we just instantiate the correct python object wrapper
at runtime depending on the actual returned type. We use this lookup
table to do so.
*/
static int TOTAL_CLASSES=0;

static struct python_wrapper_map_t {{
       Object class_ref;
       PyTypeObject *python_type;
}} python_wrappers[{size}];

/** This is a generic wrapper type */
typedef struct {{
  PyObject_HEAD
  void *base;
}} Gen_wrapper;

/* Create the relevant wrapper from the item based on the lookup
table.
*/
Gen_wrapper *new_class_wrapper(Object item) {{
   int i;
   Gen_wrapper *result;

   for(i=0; i<TOTAL_CLASSES; i++) {{
     if(python_wrappers[i].class_ref == item->__class__) {{
       result = (Gen_wrapper *)_PyObject_New(python_wrappers[i].python_type);
       result->base = (void *)item;

       return result;
     }};
   }};

  PyErr_Format(PyExc_RuntimeError, "Unable to find a wrapper for object %s", NAMEOF(item));
  return NULL;
}};

static int type_check(PyObject *obj, PyTypeObject *type) {{
   PyTypeObject *tmp;

   // Recurse through the inheritance tree and check if the types are expected
   for(tmp = obj->ob_type; tmp != &PyBaseObject_Type; tmp = tmp->tp_base) {{
     if(tmp == type) return 1;
   }};

  return 0;
}};

"#,
            size = self.classes.len() + 1
        )
    }

    /// Write one class's registration into the initializer, ensuring its
    /// active base is registered and wired as the runtime parent first.
    fn initialise_class(&self, class_name: &str, out: &mut String, done: &mut FxHashSet<String>) {
        if done.contains(class_name) {
            return;
        }
        done.insert(class_name.to_string());

        let Some(class) = self.class(class_name) else {
            return;
        };
        if !class.is_active() {
            return;
        }

        if let Some(base) = class.base_name.as_deref().and_then(|b| self.class(b)) {
            if base.is_active() {
                // The base must be registered before us.
                self.initialise_class(&base.name, out, done);
                out.push_str(&format!(
                    " {}_Type.tp_base = &{}_Type;",
                    class.name, base.name
                ));
            }
        }

        out.push_str(&format!(
            r#"
 {name}_Type.tp_new = PyType_GenericNew;
 if (PyType_Ready(&{name}_Type) < 0)
     return;

 Py_INCREF((PyObject *)&{name}_Type);
 PyModule_AddObject(m, "{name}", (PyObject *)&{name}_Type);
"#,
            name = class.name
        ));
    }

    /// The initializer tail: the optional library init call, then every
    /// active class's slot in the runtime type table.
    fn initialization(&self) -> String {
        let mut result = String::from("\n");
        if let Some(call) = &self.init_call {
            result.push_str(&format!("{call};\n\n"));
        }
        for class in self.active_classes() {
            result.push_str(&class.initialise());
        }
        result
    }

    /// Emit the complete generated source unit.
    pub fn write(&self) -> Result<String, EmitError> {
        let mut out = String::new();
        out.push_str(&self.headers);
        out.push_str(&self.private_functions());

        for class in self.active_classes() {
            out.push_str(&class.struct_decl());
            out.push_str(&class.prototypes());
        }

        out.push_str(
            "/*****************************************************\n             Implementation\n******************************************************/\n\n",
        );
        for class in self.active_classes() {
            out.push_str(&class.method_def_table());
            out.push_str(&class.code()?);
            out.push_str(&class.type_object(&self.name));
        }

        out.push_str(&format!(
            r#"
static PyMethodDef {module}_methods[] = {{
     {{NULL}}  /* Sentinel */
}};

PyMODINIT_FUNC init{module}(void) {{
   /* create module */
   PyObject *m = Py_InitModule3("{module}", {module}_methods,
                                   "{module} module.");
   PyObject *d = PyModule_GetDict(m);
   PyObject *tmp;
"#,
            module = self.name
        ));

        // Order initializations according to the inheritance tree.
        let mut done = FxHashSet::default();
        let names: Vec<String> = self.classes.iter().map(|c| c.name.clone()).collect();
        for name in names {
            self.initialise_class(&name, &mut out, &mut done);
        }

        for constant in &self.constants {
            out.push_str(&constant.export());
        }

        out.push_str(&self.initialization());
        out.push_str("}\n\n");
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder_with_class(builder: &mut ModuleBuilder, name: &str, base: Option<&str>) {
        let class = match base.and_then(|b| builder.class(b)) {
            Some(base_class) => base_class.clone_as(name),
            None => ClassEntry::new_object(name, base.map(str::to_string)),
        };
        builder.add_class(class);
        builder.add_method(name, "Con", &[], name, "", true);
    }

    #[test]
    fn base_classes_register_before_derived_ones() {
        let mut builder = ModuleBuilder::new("testmod");
        // Declare the derived class's base *after* looking at insertion
        // order: Derived first would break a naive in-order registration.
        builder_with_class(&mut builder, "Base", None);
        builder_with_class(&mut builder, "Derived", Some("Base"));

        let mut swapped = ModuleBuilder::new("testmod2");
        builder_with_class(&mut swapped, "Base2", None);
        let derived = swapped.class("Base2").unwrap().clone_as("Derived2");
        let base = swapped.class("Base2").unwrap().clone();
        let mut reordered = ModuleBuilder::new("testmod2");
        reordered.add_class(derived);
        reordered.add_class(base);

        let output = builder.freeze().write().unwrap();
        let base_at = output.find("PyType_Ready(&Base_Type)").unwrap();
        let derived_at = output.find("PyType_Ready(&Derived_Type)").unwrap();
        assert!(base_at < derived_at);
        assert!(output.contains("Derived_Type.tp_base = &Base_Type;"));

        let output = reordered.freeze().write().unwrap();
        let base_at = output.find("PyType_Ready(&Base2_Type)").unwrap();
        let derived_at = output.find("PyType_Ready(&Derived2_Type)").unwrap();
        assert!(base_at < derived_at);
    }

    #[test]
    fn missing_constructor_aborts_emission() {
        let mut builder = ModuleBuilder::new("testmod");
        builder.add_class(ClassEntry::new_object("NoCon", None));
        let err = builder.freeze().write().unwrap_err();
        assert_eq!(
            err,
            EmitError::MissingConstructor {
                class: "NoCon".to_string()
            }
        );
    }

    #[test]
    fn inactive_classes_are_not_emitted_or_registered() {
        let mut builder = ModuleBuilder::new("testmod");
        builder_with_class(&mut builder, "Public", None);
        let mut hidden = ClassEntry::new_object("Hidden", None);
        hidden.modifier = "ABSTRACT".to_string();
        builder.add_class(hidden);

        let output = builder.freeze().write().unwrap();
        assert!(!output.contains("pyHidden"));
        assert!(!output.contains("Hidden_Type"));
        assert!(output.contains("pyPublic"));
    }

    #[test]
    fn type_table_is_sized_to_the_class_count() {
        let mut builder = ModuleBuilder::new("testmod");
        builder_with_class(&mut builder, "One", None);
        builder_with_class(&mut builder, "Two", None);
        let output = builder.freeze().write().unwrap();
        assert!(output.contains("python_wrappers[3];"));
    }

    #[test]
    fn constants_export_in_discovery_order() {
        let mut builder = ModuleBuilder::new("testmod");
        builder.add_constant("SECOND_DEFINED", ConstantKind::Numeric);
        builder.add_constant("FIRST_NS", ConstantKind::Str);
        let output = builder.freeze().write().unwrap();
        let numeric_at = output.find("PyLong_FromUnsignedLongLong(SECOND_DEFINED)").unwrap();
        let string_at = output.find("PyString_FromString(FIRST_NS)").unwrap();
        assert!(numeric_at < string_at);
    }

    #[test]
    fn init_call_runs_before_type_table_population() {
        let mut builder = ModuleBuilder::new("testmod");
        builder.set_init_call("AFF4_Init()");
        builder_with_class(&mut builder, "Foo", None);
        let output = builder.freeze().write().unwrap();
        let init_at = output.find("AFF4_Init();").unwrap();
        let table_at = output.rfind("python_wrappers[TOTAL_CLASSES]").unwrap();
        assert!(init_at < table_at);
    }

    #[test]
    fn headers_accumulate_after_the_python_include() {
        let mut builder = ModuleBuilder::new("testmod");
        builder.add_include("zip.h");
        builder_with_class(&mut builder, "Foo", None);
        let output = builder.freeze().write().unwrap();
        assert!(output.starts_with("#include <Python.h>\n#include \"zip.h\"\n"));
    }
}
