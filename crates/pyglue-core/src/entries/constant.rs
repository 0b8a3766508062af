//! Constant entry: one exported `#define` macro.

/// Host-side export kind of a constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstantKind {
    /// Exported through the unsigned long-long path.
    Numeric,
    /// Exported as a host string.
    Str,
}

/// One constant macro, exported in discovery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantEntry {
    /// Macro name, referenced verbatim in the generated export.
    pub name: String,
    /// Numeric or string export path.
    pub kind: ConstantKind,
}

impl ConstantEntry {
    /// Create a constant entry.
    pub fn new(name: impl Into<String>, kind: ConstantKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Emit the module-dictionary export for this constant.
    pub fn export(&self) -> String {
        let mut out = match self.kind {
            ConstantKind::Numeric => {
                format!(" tmp = PyLong_FromUnsignedLongLong({}); \n", self.name)
            }
            ConstantKind::Str => format!(" tmp = PyString_FromString({}); \n", self.name),
        };
        out.push_str(&format!(
            "\n PyDict_SetItemString(d, \"{}\", tmp);\n Py_DECREF(tmp);\n",
            self.name
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_constants_export_through_the_long_path() {
        let constant = ConstantEntry::new("AFF4_MAX_SIZE", ConstantKind::Numeric);
        let export = constant.export();
        assert!(export.contains("PyLong_FromUnsignedLongLong(AFF4_MAX_SIZE)"));
        assert!(export.contains("PyDict_SetItemString(d, \"AFF4_MAX_SIZE\", tmp);"));
    }

    #[test]
    fn string_constants_export_through_the_string_path() {
        let constant = ConstantEntry::new("VOLATILE_NS", ConstantKind::Str);
        assert!(constant.export().contains("PyString_FromString(VOLATILE_NS)"));
    }
}
