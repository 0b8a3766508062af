//! Attribute accessor entry.
//!
//! One `GetattrEntry` is generated per class, not per attribute: a single
//! dynamic-lookup function that first answers the `__members__` introspection
//! query, then matches the requested name against the attribute list in
//! declaration order, and otherwise falls back to the host runtime's generic
//! attribute resolution.

use crate::marshal::Marshaler;

/// The per-class dynamic attribute accessor.
#[derive(Debug, Clone)]
pub struct GetattrEntry {
    /// The class this accessor is emitted for.
    pub class_name: String,
    /// Weak reference to the owning class's base, by name.
    pub base_class_name: Option<String>,
    /// Attributes in declaration order, each with the class that declared it.
    ///
    /// The declaring class matters for inherited fields: the generated read
    /// casts the native handle through the class the field belongs to.
    pub attributes: Vec<(String, Marshaler)>,
}

impl GetattrEntry {
    /// Create an empty accessor for a class.
    pub fn new(class_name: impl Into<String>, base_class_name: Option<String>) -> Self {
        Self {
            class_name: class_name.into(),
            base_class_name,
            attributes: Vec::new(),
        }
    }

    /// Record an attribute declared on this class.
    pub fn add_attribute(&mut self, marshaler: Marshaler) {
        if !marshaler.name.is_empty() {
            self.attributes.push((self.class_name.clone(), marshaler));
        }
    }

    /// Derive a copy for a cloned class, keeping the recorded declaring
    /// classes so inherited fields still read through their own cast.
    pub fn clone_for(&self, new_class_name: &str) -> Self {
        Self {
            class_name: new_class_name.to_string(),
            base_class_name: self.base_class_name.clone(),
            attributes: self.attributes.clone(),
        }
    }

    /// Forward declaration for the prototypes pass.
    pub fn prototype(&self) -> String {
        format!(
            "\nstatic PyObject *{c}_getattr(py{c} *self, PyObject *name);\n",
            c = self.class_name
        )
    }

    /// The `__members__` introspection branch: all attribute names plus
    /// everything in the method table.
    fn built_ins(&self) -> String {
        let mut out = String::from(
            "  if(!strcmp(name, \"__members__\")) {\n     PyObject *result = PyList_New(0);\n     PyObject *tmp;\n     PyMethodDef *i;\n\n     if(!result) goto error;\n",
        );
        for (_, attribute) in &self.attributes {
            out.push_str(&format!(
                " tmp = PyString_FromString(\"{}\");\n    PyList_Append(result, tmp); Py_DECREF(tmp);\n",
                attribute.name
            ));
        }
        out.push_str(&format!(
            "\n\n    for(i={}_methods; i->ml_name; i++) {{\n     tmp = PyString_FromString(i->ml_name);\n    PyList_Append(result, tmp); Py_DECREF(tmp);\n    }}; ",
            self.class_name
        ));
        out.push_str("\n     return result; \n   }\n");
        out
    }

    /// Emit the accessor definition.
    pub fn definition(&self) -> String {
        let c = &self.class_name;
        let mut out = format!(
            "\nstatic PyObject *{c}_getattr(py{c} *self, PyObject *pyname) {{\n  char *name = PyString_AsString(pyname);\n\n  if(!self->base) return PyErr_Format(PyExc_RuntimeError, \"Wrapped object no longer valid\");\n  if(!name) return NULL;\n"
        );

        out.push_str(&self.built_ins());

        for (declaring_class, attribute) in &self.attributes {
            let read = if self.base_class_name.is_some() {
                format!("((({declaring_class})self->base)->{})", attribute.name)
            } else {
                format!("(self->base->{})", attribute.name)
            };
            out.push_str(&format!(
                "\nif(!strcmp(name, \"{name}\")) {{\n    PyObject *py_result;\n    {decl}\n    {assign}\n    {obj}\n    return py_result;\n}};",
                name = attribute.name,
                decl = attribute.declare(None),
                assign = attribute.assign(&read, None),
                obj = attribute.produce(None),
            ));
        }

        out.push_str(
            "\n\n  // Hand it off to the python native handler\n  return PyObject_GenericGetAttr((PyObject *)self, pyname);\n",
        );
        out.push_str("error:\nreturn NULL;\n");
        out.push_str("}\n\n");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::marshal::TypeRegistry;

    fn borrowed(registry: &TypeRegistry, name: &str, spelling: &str) -> Marshaler {
        registry
            .dispatch(name, &format!("BORROWED {spelling}"))
            .unwrap()
    }

    #[test]
    fn members_branch_lists_attributes_and_methods() {
        let reg = TypeRegistry::with_builtins();
        let mut getattr = GetattrEntry::new("ZipFile", None);
        getattr.add_attribute(borrowed(&reg, "filename", "char *"));

        let body = getattr.definition();
        assert!(body.contains("__members__"));
        assert!(body.contains("PyString_FromString(\"filename\")"));
        assert!(body.contains("for(i=ZipFile_methods; i->ml_name; i++)"));
    }

    #[test]
    fn attribute_reads_never_free_the_field() {
        let reg = TypeRegistry::with_builtins();
        let mut getattr = GetattrEntry::new("ZipFile", None);
        getattr.add_attribute(borrowed(&reg, "filename", "char *"));
        assert!(!getattr.definition().contains("talloc_free"));
    }

    #[test]
    fn inherited_fields_read_through_the_declaring_class() {
        let reg = TypeRegistry::with_builtins();
        let mut getattr = GetattrEntry::new("Base", Some("Object".to_string()));
        getattr.add_attribute(borrowed(&reg, "size", "uint64_t"));

        let derived = getattr.clone_for("Derived");
        let body = derived.definition();
        // Recorded on Base, so the cast goes through Base even for Derived.
        assert!(body.contains("((Base)self->base)->size"));
    }

    #[test]
    fn root_class_reads_fields_directly() {
        let reg = TypeRegistry::with_builtins();
        let mut getattr = GetattrEntry::new("RDFURN", None);
        getattr.add_attribute(borrowed(&reg, "value", "char *"));
        assert!(getattr.definition().contains("(self->base->value)"));
    }

    #[test]
    fn unmatched_names_fall_back_to_generic_lookup() {
        let getattr = GetattrEntry::new("ZipFile", None);
        assert!(getattr
            .definition()
            .contains("PyObject_GenericGetAttr((PyObject *)self, pyname)"));
    }
}
