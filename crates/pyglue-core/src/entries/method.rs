//! Method entry: one callable unit of a wrapped class.
//!
//! A `MethodEntry` owns an ordered argument list of marshalers, a return
//! marshaler, per-argument default values and an optional exception rule
//! mined from its documentation, and knows how to emit the full C wrapper
//! function for itself. Constructors are the same entry with a different
//! [`MethodKind`]: they allocate the wrapped object, report allocation
//! failure as a raised error, and contribute the type's destructor.

use lazy_static::lazy_static;
use regex::Regex;
use rustc_hash::FxHashMap;

use crate::marshal::{Direction, Interface, Marshaler, Ownership, TypeRegistry};

lazy_static! {
    static ref DEFAULT_RE: Regex = Regex::new(r"DEFAULT\(([A-Za-z0-9]+)\) =(.+)").unwrap();
    static ref RAISES_RE: Regex = Regex::new(r"RAISES\(([^,]+),([^)]+)\) =(.+)").unwrap();
}

/// How a method entry is emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    /// An ordinary wrapped method.
    Regular,
    /// A constructor calling the native construction macro.
    Constructor,
    /// A bound-struct constructor; allocates nothing.
    StructConstructor,
}

/// An exception rule mined from a `RAISES(check, Kind) = message` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaiseRule {
    /// Native boolean expression; raising when true.
    pub check: String,
    /// Host exception kind, without the `PyExc_` prefix.
    pub kind: String,
    /// Message expression passed to the exception constructor.
    pub message: String,
}

impl RaiseRule {
    /// Emit the post-call exception check.
    pub fn write(&self) -> String {
        format!(
            "\n//Handle exceptions\nif({}) {{\n    PyErr_Format(PyExc_{}, {});\n  goto error; \n}};\n\n",
            self.check, self.kind, self.message
        )
    }
}

/// One callable unit: arguments, return binding, and emission.
#[derive(Debug, Clone)]
pub struct MethodEntry {
    /// Emission flavor.
    pub kind: MethodKind,
    /// Native method name.
    pub name: String,
    /// The class this entry is emitted for.
    pub class_name: String,
    /// Weak reference to the owning class's base, by name.
    pub base_class_name: Option<String>,
    /// The class that defines the native function; calls cast through it.
    pub definition_class_name: String,
    /// Ordered argument marshalers (after composite folding).
    pub args: Vec<Marshaler>,
    /// Return marshaler, tagged OUT.
    pub return_type: Marshaler,
    /// Default-value expressions by argument name.
    pub defaults: FxHashMap<String, String>,
    /// At most one exception rule per method.
    pub raises: Option<RaiseRule>,
    /// Documentation text attached to the directive.
    pub docstring: String,
}

impl MethodEntry {
    /// Create an empty entry; arguments and docstring are added by the caller.
    pub fn new(
        kind: MethodKind,
        class_name: impl Into<String>,
        base_class_name: Option<String>,
        name: impl Into<String>,
    ) -> Self {
        let class_name = class_name.into();
        Self {
            kind,
            name: name.into(),
            definition_class_name: class_name.clone(),
            class_name,
            base_class_name,
            args: Vec::new(),
            return_type: Marshaler::void(),
            defaults: FxHashMap::default(),
            raises: None,
            docstring: String::new(),
        }
    }

    /// Resolve and record the return type; unresolvable spellings degrade to
    /// a Void return with a logged warning.
    pub fn set_return_type(&mut self, registry: &TypeRegistry, spelling: &str) {
        match registry.dispatch("func_return", spelling) {
            Ok(mut marshaler) => {
                marshaler.flags |= Ownership::OUT;
                self.return_type = marshaler;
            }
            Err(err) => {
                log::warn!(
                    "unable to handle return type {}.{}: {err}",
                    self.class_name,
                    self.name
                );
                self.return_type = Marshaler::void();
            }
        }
    }

    /// Dispatch and append one argument, folding an adjacent
    /// (string pointer, integer) pair into a single buffer composite.
    ///
    /// Unknown spellings drop only the offending argument.
    pub fn add_arg(&mut self, registry: &TypeRegistry, spelling: &str, name: &str) {
        let marshaler = match registry.dispatch(name, spelling) {
            Ok(m) => m,
            Err(err) => {
                log::warn!(
                    "unable to handle type {}.{} {name}: {err}",
                    self.class_name,
                    self.name
                );
                return;
            }
        };

        let follows_string = self
            .args
            .last()
            .is_some_and(|previous| previous.interface() == Interface::Str);
        if marshaler.interface() == Interface::Integer && follows_string {
            // Collapse char* + integer into one string-like interface.
            // Folding is irreversible.
            let previous = self.args.pop().expect("checked non-empty");
            self.args.push(previous.fold_with_length(name, spelling));
            return;
        }

        self.args.push(marshaler);
    }

    /// Attach documentation and mine the embedded directives from it.
    pub fn set_docstring(&mut self, docstring: impl Into<String>) {
        self.docstring = docstring.into();
        for line in self.docstring.clone().lines() {
            if let Some(captures) = DEFAULT_RE.captures(line) {
                let name = captures[1].to_string();
                let value = captures[2].trim().to_string();
                log::debug!("default value for {name}: {value}");
                self.defaults.insert(name, value);
            }
            if let Some(captures) = RAISES_RE.captures(line) {
                self.raises = Some(RaiseRule {
                    check: captures[1].trim().to_string(),
                    kind: captures[2].trim().to_string(),
                    message: captures[3].trim().to_string(),
                });
            }
        }
    }

    /// Derive a copy of this entry for a cloned class.
    ///
    /// The defining class is preserved so the emitted call still casts
    /// through the class that declares the native function.
    pub fn clone_for(&self, new_class_name: &str) -> Self {
        let mut result = self.clone();
        result.class_name = new_class_name.to_string();
        result
    }

    /// Signature text for generated documentation.
    pub fn comment(&self) -> String {
        let args: Vec<String> = self.args.iter().map(|a| a.comment()).collect();
        format!(
            "{} {}.{}({});\n",
            self.return_type.ctype,
            self.class_name,
            self.name,
            args.join(",")
        )
    }

    /// Forward declaration for the prototypes pass.
    pub fn prototype(&self) -> String {
        match self.kind {
            MethodKind::Regular => format!(
                "static PyObject *py{c}_{m}(py{c} *self, PyObject *args, PyObject *kwds);\n",
                c = self.class_name,
                m = self.name
            ),
            MethodKind::Constructor | MethodKind::StructConstructor => format!(
                "\nstatic int py{c}_init(py{c} *self, PyObject *args, PyObject *kwds);\n",
                c = self.class_name
            ),
        }
    }

    /// Local declarations, keyword list, and the scatter-parse call.
    ///
    /// Returns the emitted text and whether a parse call (and therefore an
    /// error exit) was emitted. Mandatory keywords precede defaulted ones.
    fn local_vars(&self) -> (String, bool) {
        let mut kwlist = String::from("static char *kwlist[] = {");
        for arg in &self.args {
            if let Some(keyword) = arg.keyword() {
                if !self.defaults.contains_key(&arg.name) {
                    kwlist.push_str(&format!("\"{keyword}\","));
                }
            }
        }
        for arg in &self.args {
            if let Some(keyword) = arg.keyword() {
                if self.defaults.contains_key(&arg.name) {
                    kwlist.push_str(&format!("\"{keyword}\","));
                }
            }
        }
        kwlist.push_str(" NULL};\n");

        let mut out = String::new();
        for arg in &self.args {
            out.push_str(&arg.declare(self.defaults.get(&arg.name).map(String::as_str)));
        }

        let mut parse_line = String::new();
        for arg in &self.args {
            if !arg.format_unit().is_empty() && !self.defaults.contains_key(&arg.name) {
                parse_line.push_str(arg.format_unit());
            }
        }
        parse_line.push('|');
        for arg in &self.args {
            if !arg.format_unit().is_empty() && self.defaults.contains_key(&arg.name) {
                parse_line.push_str(arg.format_unit());
            }
        }

        if parse_line != "|" {
            out.push_str(&kwlist);
            out.push_str(&format!(
                "\nif(!PyArg_ParseTupleAndKeywords(args, kwds, \"{parse_line}\", kwlist, "
            ));
            let refs: Vec<String> = self.args.iter().filter_map(|a| a.accept()).collect();
            out.push_str(&refs.join(","));
            out.push_str("))\n goto error;\n\n");
            (out, true)
        } else {
            (out, false)
        }
    }

    /// The statements run when any failure path is taken.
    fn error_condition(&self) -> String {
        match self.kind {
            MethodKind::Regular => {
                let mut result = String::new();
                if self.return_type.flags.contains(Ownership::DESTRUCTOR) {
                    result.push_str("self->base = NULL;\n");
                }
                result.push_str("return NULL;\n");
                result
            }
            MethodKind::Constructor | MethodKind::StructConstructor => "return -1;".to_string(),
        }
    }

    fn needs_error_exit(&self, parse_emitted: bool) -> bool {
        parse_emitted
            || self.return_type.assign_can_fail()
            || self.args.iter().any(|a| a.pre_call_can_fail())
            || self.raises.is_some()
    }

    /// Emit the full wrapper definition for this entry.
    pub fn definition(&self) -> String {
        match self.kind {
            MethodKind::Regular => self.method_definition(),
            MethodKind::Constructor => self.constructor_definition(),
            MethodKind::StructConstructor => format!(
                "static int py{c}_init(py{c} *self, PyObject *args, PyObject *kwds) {{\n\nself->base = NULL;\n  return 0;\n}};\n\n",
                c = self.class_name
            ),
        }
    }

    fn method_definition(&self) -> String {
        let class = &self.class_name;
        let mut out = String::new();
        out.push_str(
            "\n/********************************************************\nAutogenerated wrapper for function:\n",
        );
        out.push_str(&self.comment());
        out.push_str("********************************************************/\n");
        out.push_str(&format!(
            "\nstatic PyObject *py{class}_{m}(py{class} *self, PyObject *args, PyObject *kwds) {{\n       PyObject *returned_result, *py_result;\n",
            m = self.name
        ));
        out.push_str(&self.return_type.declare(None));

        let (locals, parse_emitted) = self.local_vars();
        out.push_str(&locals);

        out.push_str(&format!(
            "// Make sure that we have something valid to wrap\nif(!self->base) return PyErr_Format(PyExc_RuntimeError, \"{class} object no longer valid\");\n"
        ));

        out.push_str("// Precall preparations\n");
        out.push_str(&self.return_type.pre_call());
        for arg in &self.args {
            out.push_str(&arg.pre_call());
        }

        out.push_str("\n// Make the call\n");
        let def = &self.definition_class_name;
        let mut call = format!("(({def})self->base)->{}((({def})self->base)", self.name);
        for arg in &self.args {
            call.push_str(", ");
            call.push_str(&arg.call_arg());
        }
        call.push(')');
        out.push_str(&self.return_type.assign(&call, None));

        if let Some(raises) = &self.raises {
            out.push_str(&raises.write());
        }

        out.push_str("\n// Postcall preparations\n");
        out.push_str(&self.return_type.post_call());
        for arg in &self.args {
            out.push_str(&arg.post_call());
        }

        // Assemble the produced values: the return value, plus anything an
        // output-tagged argument contributes.
        out.push_str("\n// prepare results\n");
        let mut results = vec![self.return_type.produce(None)];
        for arg in &self.args {
            if arg.direction() == Direction::OutDone {
                if arg.consumes_call_result() && !results.is_empty() {
                    results.remove(0);
                }
                results.push(arg.produce(None));
            }
        }
        if results.len() > 1 {
            out.push_str("returned_result = PyList_New(0);\n");
            for result in &results {
                out.push_str(result);
                out.push_str("PyList_Append(returned_result, py_result); Py_DECREF(py_result);\n");
            }
            out.push_str("return returned_result;\n");
        } else {
            out.push_str(&results[0]);
            out.push_str("returned_result = py_result;\nreturn returned_result;\n");
        }

        if self.needs_error_exit(parse_emitted) {
            out.push_str("\n// error conditions:\n");
            out.push_str("error:\n    ");
            out.push_str(&self.error_condition());
        }

        out.push_str("\n};\n\n");
        out
    }

    fn constructor_definition(&self) -> String {
        let class = &self.class_name;
        let mut out = format!(
            "static int py{class}_init(py{class} *self, PyObject *args, PyObject *kwds) {{\n"
        );

        let (locals, _) = self.local_vars();
        out.push_str(&locals);

        for arg in &self.args {
            out.push_str(&arg.pre_call());
        }

        out.push_str(&format!(
            "\nself->base = CONSTRUCT({class}, {}, {}, NULL",
            self.definition_class_name, self.name
        ));
        for arg in &self.args {
            out.push_str(", ");
            out.push_str(&arg.call_arg());
        }
        out.push_str(&format!(
            ");\n  if(!self->base) {{\n    PyErr_Format(PyExc_IOError, \"Unable to construct class {class}\");\n    goto error;\n  }};\n"
        ));

        out.push_str("  return 0;\n");
        out.push_str("error:\n    ");
        out.push_str(&self.error_condition());
        out.push_str("\n};\n\n");
        out
    }

    /// Emit the type's destructor; only constructor entries contribute one.
    ///
    /// Releasing is idempotent: a second invocation finds a null handle and
    /// does nothing.
    pub fn destructor(&self) -> String {
        let class = &self.class_name;
        match self.kind {
            MethodKind::StructConstructor => format!(
                "static void\n{class}_dealloc(py{class} *self) {{\nif(self->base) talloc_free(self->base);\n}};\n\n"
            ),
            _ => format!(
                "static void\n{class}_dealloc(py{class} *self) {{\n\n    if(self->base) {{\n        talloc_free(self->base);\n        self->base=NULL;\n    }};\n\n}};\n\n"
            ),
        }
    }
}

impl Marshaler {
    /// Fold this string-like binding with a following length argument into a
    /// buffer composite, preserving the output direction of the pointer.
    pub(crate) fn fold_with_length(self, length: &str, length_type: &str) -> Marshaler {
        use crate::marshal::MarshalKind;
        let kind = if self.direction() == Direction::Out {
            MarshalKind::CharAndLengthOut {
                length: length.to_string(),
                length_type: length_type.trim().to_string(),
            }
        } else {
            MarshalKind::CharAndLength {
                length: length.to_string(),
                length_type: length_type.trim().to_string(),
            }
        };
        Marshaler::new(kind, self.name, self.ctype, self.flags, Direction::In)
    }
}
