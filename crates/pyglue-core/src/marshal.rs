//! Marshaling strategies for values crossing the native/host boundary.
//!
//! Every argument, return value, and attribute in the model carries a
//! [`Marshaler`]: a variant from the closed [`MarshalKind`] set paired with a
//! local name, the native type spelling, and an ownership flag set. The
//! variant decides how the generated C declares a local slot, scatter-parses
//! a host-supplied value into it, passes it to the wrapped native call, and
//! converts the result back into a host object.
//!
//! Spellings resolve through [`TypeRegistry`]. The registry starts with the
//! builtin C spellings and grows during parsing: every wrapped class name
//! becomes an opaque-wrapper spelling, every bound struct a struct-wrapper
//! spelling (plus its pointer form). A leading `BORROWED` or `DESTRUCTOR`
//! keyword is stripped and recorded in the flag set before lookup.
//!
//! All variants are matched exhaustively below, so a new variant cannot be
//! added without implementing every emission hook.

use bitflags::bitflags;
use rustc_hash::FxHashMap;

use crate::error::DispatchError;

bitflags! {
    /// Ownership and direction attributes attached to a marshaler.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Ownership: u8 {
        /// The holder does not own the value and must not release it.
        const BORROWED = 1 << 0;
        /// The wrapped call consumes the receiver; its handle is nulled
        /// after the call returns.
        const DESTRUCTOR = 1 << 1;
        /// The value flows out of the call (return values, output slots).
        const OUT = 1 << 2;
    }
}

/// Which way a value crosses the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Supplied by the host caller.
    In,
    /// Produced by the native side; folds into an output buffer.
    Out,
    /// Produced by the native side and appended to the returned results.
    OutDone,
}

/// Interface family used for argument folding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interface {
    /// String-like pointer; a following integer folds into it.
    Str,
    /// Plain integer.
    Integer,
    /// Single character (never folds).
    SmallInteger,
    /// Already-folded buffer composite.
    CharAndLength,
    /// Scalar numeric (timeval seconds).
    Numeric,
    /// No folding behavior.
    Opaque,
}

/// The closed set of type-binding variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarshalKind {
    /// `char *` owned by the callee; freed after conversion.
    Str,
    /// `char *` borrowed from the native side; never freed.
    BorrowedStr,
    /// A folded (`char *`, length) input buffer.
    CharAndLength {
        /// Name of the length argument that was folded in.
        length: String,
        /// Native type spelling of the length argument.
        length_type: String,
    },
    /// A folded output buffer: the host passes a size, the call fills it.
    CharAndLengthOut {
        /// Name of the length argument that was folded in.
        length: String,
        /// Native type spelling of the length argument.
        length_type: String,
    },
    /// Any plain integer spelling; declared as `uint64_t` locally.
    Integer,
    /// A single character, exchanged as a one-byte host string.
    Char,
    /// No value (void returns, unsupplied slots).
    Void,
    /// A wrapped class instance behind a generic wrapper handle.
    OpaqueWrapper,
    /// A bound struct wrapped by value-style allocation.
    StructWrapper,
    /// A bound struct referenced through a pointer spelling.
    PointerStructWrapper,
    /// `TDB_DATA *` result, freed after conversion.
    TdbDataPointer,
    /// `TDB_DATA` by value, converted without freeing.
    TdbData,
    /// `struct timeval` exchanged as a float seconds value.
    Timeval,
}

/// One type binding: a variant plus its naming and ownership context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marshaler {
    /// The binding variant.
    pub kind: MarshalKind,
    /// Local variable name in the generated wrapper.
    pub name: String,
    /// Native type spelling (ownership keywords stripped).
    pub ctype: String,
    /// Ownership/direction attributes.
    pub flags: Ownership,
    direction: Direction,
}

impl Marshaler {
    /// Create a marshaler with an explicit direction.
    pub fn new(
        kind: MarshalKind,
        name: impl Into<String>,
        ctype: impl Into<String>,
        flags: Ownership,
        direction: Direction,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            ctype: ctype.into(),
            flags,
            direction,
        }
    }

    /// The no-op binding substituted for unresolvable return types.
    pub fn void() -> Self {
        Self::new(MarshalKind::Void, "", "void *", Ownership::empty(), Direction::In)
    }

    /// Which way this binding crosses the boundary.
    pub fn direction(&self) -> Direction {
        match self.kind {
            MarshalKind::CharAndLengthOut { .. }
            | MarshalKind::TdbDataPointer
            | MarshalKind::TdbData => Direction::OutDone,
            _ => self.direction,
        }
    }

    /// Interface family, used by the argument-folding rule.
    pub fn interface(&self) -> Interface {
        match self.kind {
            MarshalKind::Str | MarshalKind::BorrowedStr => Interface::Str,
            MarshalKind::Integer => Interface::Integer,
            MarshalKind::Char => Interface::SmallInteger,
            MarshalKind::CharAndLength { .. } | MarshalKind::CharAndLengthOut { .. } => {
                Interface::CharAndLength
            }
            MarshalKind::Timeval => Interface::Numeric,
            _ => Interface::Opaque,
        }
    }

    /// `PyArg_ParseTupleAndKeywords` format unit for this binding.
    pub fn format_unit(&self) -> &'static str {
        match self.kind {
            MarshalKind::Str | MarshalKind::BorrowedStr | MarshalKind::Char => "s",
            MarshalKind::CharAndLength { .. } => "s#",
            MarshalKind::CharAndLengthOut { .. }
            | MarshalKind::TdbDataPointer
            | MarshalKind::TdbData => "l",
            MarshalKind::Integer => "K",
            MarshalKind::Void => "",
            MarshalKind::OpaqueWrapper
            | MarshalKind::StructWrapper
            | MarshalKind::PointerStructWrapper => "O",
            MarshalKind::Timeval => "f",
        }
    }

    /// Host-side keyword under which the caller supplies this argument.
    ///
    /// `None` for Void (the host cannot supply it). Output buffers are keyed
    /// by their length argument, since that is what the caller passes.
    pub fn keyword(&self) -> Option<&str> {
        match &self.kind {
            MarshalKind::Void => None,
            MarshalKind::CharAndLengthOut { length, .. } => Some(length),
            _ => Some(&self.name),
        }
    }

    /// Signature text used in generated documentation.
    pub fn comment(&self) -> String {
        match &self.kind {
            MarshalKind::CharAndLength { length, length_type }
            | MarshalKind::CharAndLengthOut { length, length_type } => {
                format!("{} {}, {} {}", self.ctype, self.name, length_type, length)
            }
            _ => format!("{} {} ", self.ctype, self.name),
        }
    }

    /// Emit the local-storage declaration, honoring a default value.
    pub fn declare(&self, default: Option<&str>) -> String {
        match &self.kind {
            MarshalKind::Void => String::new(),
            MarshalKind::Str | MarshalKind::BorrowedStr => match default {
                Some(d) => format!("{} {}={};\n", self.ctype, self.name, d),
                None => format!("{} {};\n", self.ctype, self.name),
            },
            MarshalKind::CharAndLength { length, .. } => {
                let d = default.unwrap_or("\"\"");
                format!(
                    "char *{}={}; Py_ssize_t {}=strlen({});\n",
                    self.name, d, length, d
                )
            }
            MarshalKind::CharAndLengthOut { length, .. } => {
                // Output buffers ignore defaults; the caller passes a size.
                format!(
                    "char *{n}=\"\"; Py_ssize_t {l}=strlen(\"\");\nPyObject *tmp_{n};\n",
                    n = self.name,
                    l = length
                )
            }
            MarshalKind::Integer => {
                format!("uint64_t {}={};\n", self.name, default.unwrap_or("0"))
            }
            MarshalKind::Char => {
                format!(
                    "char {n}=0; char *str_{n} = {d};\n",
                    n = self.name,
                    d = default.unwrap_or("\"\\x0\"")
                )
            }
            MarshalKind::OpaqueWrapper
            | MarshalKind::StructWrapper
            | MarshalKind::PointerStructWrapper => {
                format!("Gen_wrapper *{};\n", self.name)
            }
            MarshalKind::TdbDataPointer | MarshalKind::TdbData => {
                format!("{} {};\n", self.ctype, self.name)
            }
            MarshalKind::Timeval => {
                format!("float {n}_flt; struct timeval {n};\n", n = self.name)
            }
        }
    }

    /// Address expression(s) for the host argument scatter-parse.
    ///
    /// `None` for Void, which has no host-suppliable slot.
    pub fn accept(&self) -> Option<String> {
        match &self.kind {
            MarshalKind::Void => None,
            MarshalKind::CharAndLength { length, .. } => {
                Some(format!("&{}, &{}", self.name, length))
            }
            MarshalKind::CharAndLengthOut { length, .. } => Some(format!("&{}", length)),
            MarshalKind::Char => Some(format!("&str_{}", self.name)),
            MarshalKind::TdbDataPointer | MarshalKind::TdbData => {
                Some(format!("{n}.dptr, &{n}.dsize", n = self.name))
            }
            MarshalKind::Timeval => Some(format!("&{}_flt", self.name)),
            _ => Some(format!("&{}", self.name)),
        }
    }

    /// Expression passed into the wrapped native call.
    pub fn call_arg(&self) -> String {
        match &self.kind {
            MarshalKind::Void => "NULL".to_string(),
            MarshalKind::CharAndLength { length, length_type }
            | MarshalKind::CharAndLengthOut { length, length_type } => {
                format!(
                    "({}){}, ({}){}",
                    self.ctype, self.name, length_type, length
                )
            }
            MarshalKind::OpaqueWrapper
            | MarshalKind::StructWrapper
            | MarshalKind::PointerStructWrapper => format!("{}->base", self.name),
            _ => self.name.clone(),
        }
    }

    /// Side effects emitted before the native call.
    pub fn pre_call(&self) -> String {
        match &self.kind {
            MarshalKind::Char => format!(
                "\nif(strlen(str_{n})!=1) {{\n  PyErr_Format(PyExc_ValueError,\n          \"You must only provide a single character for arg '{n}'\");\n  goto error;\n}};\n\n{n} = str_{n}[0];\n",
                n = self.name
            ),
            MarshalKind::CharAndLengthOut { length, .. } => format!(
                "tmp_{n} = PyString_FromStringAndSize(NULL, {l});\nPyString_AsStringAndSize(tmp_{n}, &{n}, (Py_ssize_t *)&{l});\n",
                n = self.name,
                l = length
            ),
            MarshalKind::OpaqueWrapper
            | MarshalKind::StructWrapper
            | MarshalKind::PointerStructWrapper => {
                if self.flags.contains(Ownership::OUT) || self.direction() != Direction::In {
                    String::new()
                } else {
                    format!(
                        "if(!type_check((PyObject *){n},&{t}_Type)) {{\n     PyErr_Format(PyExc_RuntimeError, \"{n} must be derived from type {t}\");\n     goto error;\n}};\n",
                        n = self.name,
                        t = self.ctype
                    )
                }
            }
            MarshalKind::Timeval => format!(
                "{n}.tv_sec = (int){n}_flt; {n}.tv_usec = ({n}_flt - {n}.tv_sec) * 1e6;\n",
                n = self.name
            ),
            _ => String::new(),
        }
    }

    /// Side effects emitted after the native call.
    pub fn post_call(&self) -> String {
        if self.flags.contains(Ownership::DESTRUCTOR) {
            "self->base = NULL;\n".to_string()
        } else {
            String::new()
        }
    }

    /// True when this binding's pre-call hook can jump to the error exit.
    pub fn pre_call_can_fail(&self) -> bool {
        match &self.kind {
            MarshalKind::Char => true,
            MarshalKind::OpaqueWrapper
            | MarshalKind::StructWrapper
            | MarshalKind::PointerStructWrapper => {
                !self.flags.contains(Ownership::OUT) && self.direction() == Direction::In
            }
            _ => false,
        }
    }

    /// True when `assign` emits an error-path jump.
    pub fn assign_can_fail(&self) -> bool {
        matches!(self.kind, MarshalKind::OpaqueWrapper)
    }

    /// Capture the native call's result into this binding's slot.
    pub fn assign(&self, call: &str, target: Option<&str>) -> String {
        let target = target.unwrap_or(&self.name);
        match &self.kind {
            MarshalKind::Void => format!("{call};\n"),
            MarshalKind::OpaqueWrapper => {
                let mut result = format!(
                    "{{\n       Object returned_object = (Object){call};\n\n       if(!returned_object) {{\n         PyErr_Format(PyExc_RuntimeError,\n                    \"Failed to create object {t}: %s\", __error_str);\n         ClearError();\n         goto error;\n       }};\n\n       {target} = new_class_wrapper(returned_object);\n       if(!{target}) goto error;\n    }}\n",
                    t = self.ctype,
                );
                if self.flags.contains(Ownership::BORROWED) {
                    result.push_str(&format!(
                        "talloc_increase_ref_count({target}->base);\n"
                    ));
                }
                result
            }
            MarshalKind::StructWrapper | MarshalKind::PointerStructWrapper => {
                let mut result = format!(
                    "\n{target} = (py{t} *)PyObject_New(py{t}, &{t}_Type);\n{target}->base = {call};\n",
                    t = self.ctype,
                );
                if self.flags.contains(Ownership::BORROWED) {
                    result.push_str(&format!(
                        "talloc_increase_ref_count({target}->base);\n"
                    ));
                }
                result
            }
            _ => format!("{target} = {call};\n"),
        }
    }

    /// Convert the native value into a host object in `py_result`.
    pub fn produce(&self, name: Option<&str>) -> String {
        let name = name.unwrap_or(&self.name);
        match &self.kind {
            MarshalKind::Str => {
                let mut result = format!(
                    "py_result = PyString_FromStringAndSize((char *){n}, strlen({n}));\n",
                    n = name
                );
                if !self.flags.contains(Ownership::BORROWED) {
                    result.push_str(&format!("talloc_free({name});\n"));
                }
                result
            }
            MarshalKind::BorrowedStr => format!(
                "py_result = PyString_FromStringAndSize((char *){n}, strlen({n}));\n",
                n = name
            ),
            MarshalKind::CharAndLength { length, .. } => format!(
                "py_result = PyString_FromStringAndSize((char *){name}, {length});\n"
            ),
            MarshalKind::CharAndLengthOut { .. } => format!(
                " _PyString_Resize(&tmp_{name}, func_return); \npy_result = tmp_{name};\n"
            ),
            MarshalKind::Integer => format!("py_result = PyLong_FromLong({name});\n"),
            MarshalKind::Char => format!(
                "str_{n} = &{n};\n    py_result = PyString_FromStringAndSize(str_{n}, 1);\n",
                n = name
            ),
            MarshalKind::Void => "Py_INCREF(Py_None); py_result = Py_None;\n".to_string(),
            MarshalKind::OpaqueWrapper
            | MarshalKind::StructWrapper
            | MarshalKind::PointerStructWrapper => {
                format!("py_result = (PyObject *){name};\n")
            }
            MarshalKind::TdbDataPointer => format!(
                "py_result = PyString_FromStringAndSize((char *){n}->dptr, {n}->dsize);\ntalloc_free({n});\n",
                n = name
            ),
            MarshalKind::TdbData => format!(
                "py_result = PyString_FromStringAndSize((char *){n}.dptr, {n}.dsize);\n",
                n = name
            ),
            MarshalKind::Timeval => format!(
                "{n}_flt = (double)({n}.tv_sec) + {n}.tv_usec / 1e6;\npy_result = PyFloat_FromDouble({n}_flt);\n",
                n = name
            ),
        }
    }

    /// True when producing this binding's value replaces the call's own
    /// return value rather than adding to it.
    pub fn consumes_call_result(&self) -> bool {
        matches!(self.kind, MarshalKind::CharAndLengthOut { .. })
    }
}

// ============================================================================
// Type Registry
// ============================================================================

/// What a registered spelling resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Binding {
    Str,
    StrOut,
    Integer,
    Char,
    Void,
    TdbDataPointer,
    TdbData,
    Timeval,
    Opaque,
    Struct,
    PointerStruct,
}

/// Ownership keywords recognized at the head of a type spelling.
const OWNERSHIP_KEYWORDS: [(&str, Ownership); 2] = [
    ("BORROWED", Ownership::BORROWED),
    ("DESTRUCTOR", Ownership::DESTRUCTOR),
];

/// Maps native type spellings to binding variants.
///
/// Starts with the builtin C spellings; parsing extends it with one entry
/// per wrapped class and two per bound struct (`Name` and `Name *`).
#[derive(Debug, Clone)]
pub struct TypeRegistry {
    bindings: FxHashMap<String, Binding>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl TypeRegistry {
    /// Create a registry pre-populated with the builtin spellings.
    pub fn with_builtins() -> Self {
        let mut bindings = FxHashMap::default();
        for spelling in ["char *", "unsigned char *", "IN char *", "IN unsigned char *"] {
            bindings.insert(spelling.to_string(), Binding::Str);
        }
        for spelling in ["OUT char *", "OUT unsigned char *"] {
            bindings.insert(spelling.to_string(), Binding::StrOut);
        }
        for spelling in [
            "int",
            "unsigned int",
            "unsigned long int",
            "uint64_t",
            "uint32_t",
            "uint16_t",
            "int64_t",
        ] {
            bindings.insert(spelling.to_string(), Binding::Integer);
        }
        bindings.insert("char".to_string(), Binding::Char);
        bindings.insert("void".to_string(), Binding::Void);
        bindings.insert("void *".to_string(), Binding::Void);
        bindings.insert("TDB_DATA *".to_string(), Binding::TdbDataPointer);
        bindings.insert("TDB_DATA".to_string(), Binding::TdbData);
        bindings.insert("struct timeval".to_string(), Binding::Timeval);
        Self { bindings }
    }

    /// Register a wrapped class name as an opaque-wrapper spelling.
    pub fn register_class(&mut self, name: &str) {
        self.bindings.insert(name.to_string(), Binding::Opaque);
    }

    /// Register a bound struct name and its pointer spelling.
    pub fn register_struct(&mut self, name: &str) {
        self.bindings.insert(name.to_string(), Binding::Struct);
        self.bindings
            .insert(format!("{name} *"), Binding::PointerStruct);
    }

    /// Resolve a spelling (with optional leading ownership keyword) into a
    /// marshaler named `name`.
    pub fn dispatch(&self, name: &str, spelling: &str) -> Result<Marshaler, DispatchError> {
        let mut components: Vec<&str> = spelling.split_whitespace().collect();
        let mut flags = Ownership::empty();
        if let Some(first) = components.first() {
            for (keyword, flag) in OWNERSHIP_KEYWORDS {
                if *first == keyword {
                    flags |= flag;
                    components.remove(0);
                    break;
                }
            }
        }
        let spelling = components.join(" ");

        let binding =
            self.bindings
                .get(&spelling)
                .copied()
                .ok_or_else(|| DispatchError::UnknownType {
                    spelling: spelling.clone(),
                })?;

        let marshaler = match binding {
            Binding::Str => {
                if flags.contains(Ownership::BORROWED) {
                    Marshaler::new(MarshalKind::BorrowedStr, name, spelling, flags, Direction::In)
                } else {
                    Marshaler::new(MarshalKind::Str, name, spelling, flags, Direction::In)
                }
            }
            Binding::StrOut => {
                Marshaler::new(MarshalKind::Str, name, spelling, flags, Direction::Out)
            }
            Binding::Integer => {
                Marshaler::new(MarshalKind::Integer, name, "uint64_t", flags, Direction::In)
            }
            Binding::Char => Marshaler::new(MarshalKind::Char, name, spelling, flags, Direction::In),
            Binding::Void => {
                Marshaler::new(MarshalKind::Void, name, "void *", flags, Direction::In)
            }
            Binding::TdbDataPointer => Marshaler::new(
                MarshalKind::TdbDataPointer,
                name,
                spelling,
                flags,
                Direction::In,
            ),
            Binding::TdbData => {
                Marshaler::new(MarshalKind::TdbData, name, spelling, flags, Direction::In)
            }
            Binding::Timeval => {
                Marshaler::new(MarshalKind::Timeval, name, spelling, flags, Direction::In)
            }
            Binding::Opaque => Marshaler::new(
                MarshalKind::OpaqueWrapper,
                name,
                spelling,
                flags,
                Direction::In,
            ),
            Binding::Struct => Marshaler::new(
                MarshalKind::StructWrapper,
                name,
                spelling,
                flags,
                Direction::In,
            ),
            Binding::PointerStruct => {
                // The pointer spelling wraps the same struct type; keep only
                // the bare name for casts and type-object references.
                let bare = spelling.split_whitespace().next().unwrap_or("").to_string();
                Marshaler::new(
                    MarshalKind::PointerStructWrapper,
                    name,
                    bare,
                    flags,
                    Direction::In,
                )
            }
        };
        Ok(marshaler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> TypeRegistry {
        TypeRegistry::with_builtins()
    }

    #[test]
    fn dispatch_string() {
        let m = registry().dispatch("uri", "char *").unwrap();
        assert_eq!(m.kind, MarshalKind::Str);
        assert_eq!(m.format_unit(), "s");
        assert_eq!(m.accept().as_deref(), Some("&uri"));
    }

    #[test]
    fn dispatch_borrowed_string() {
        let m = registry().dispatch("uri", "BORROWED char *").unwrap();
        assert_eq!(m.kind, MarshalKind::BorrowedStr);
        assert!(m.flags.contains(Ownership::BORROWED));
        // A borrowed string conversion never frees the native buffer.
        assert!(!m.produce(None).contains("talloc_free"));
    }

    #[test]
    fn owned_string_frees_after_conversion() {
        let m = registry().dispatch("uri", "char *").unwrap();
        assert!(m.produce(None).contains("talloc_free(uri);"));
    }

    #[test]
    fn dispatch_out_string() {
        let m = registry().dispatch("buf", "OUT char *").unwrap();
        assert_eq!(m.kind, MarshalKind::Str);
        assert_eq!(m.direction(), Direction::Out);
    }

    #[test]
    fn integer_declares_as_uint64() {
        let m = registry().dispatch("offset", "uint32_t").unwrap();
        assert_eq!(m.declare(None), "uint64_t offset=0;\n");
        assert_eq!(m.declare(Some("42")), "uint64_t offset=42;\n");
    }

    #[test]
    fn char_declares_value_and_shadow_string() {
        let m = registry().dispatch("mode", "char").unwrap();
        let decl = m.declare(None);
        assert!(decl.contains("char mode=0;"));
        assert!(decl.contains("char *str_mode"));
        assert_eq!(m.accept().as_deref(), Some("&str_mode"));
    }

    #[test]
    fn char_pre_call_rejects_long_strings() {
        let m = registry().dispatch("mode", "char").unwrap();
        let pre = m.pre_call();
        assert!(pre.contains("strlen(str_mode)!=1"));
        assert!(pre.contains("goto error"));
        assert!(m.pre_call_can_fail());
    }

    #[test]
    fn void_has_no_host_slot() {
        let m = registry().dispatch("func_return", "void").unwrap();
        assert_eq!(m.accept(), None);
        assert_eq!(m.keyword(), None);
        assert_eq!(m.call_arg(), "NULL");
        assert_eq!(m.assign("call()", None), "call();\n");
    }

    #[test]
    fn timeval_splits_and_recombines_seconds() {
        let m = registry().dispatch("when", "struct timeval").unwrap();
        assert!(m.pre_call().contains("when.tv_usec = (when_flt - when.tv_sec) * 1e6"));
        assert!(m.produce(None).contains("when.tv_usec / 1e6"));
    }

    #[test]
    fn destructor_nulls_handle_after_call() {
        let m = registry().dispatch("func_return", "DESTRUCTOR int").unwrap();
        assert!(m.flags.contains(Ownership::DESTRUCTOR));
        assert_eq!(m.post_call(), "self->base = NULL;\n");
    }

    #[test]
    fn registered_class_dispatches_to_opaque_wrapper() {
        let mut reg = registry();
        reg.register_class("FileLikeObject");
        let m = reg.dispatch("fd", "FileLikeObject").unwrap();
        assert_eq!(m.kind, MarshalKind::OpaqueWrapper);
        assert_eq!(m.call_arg(), "fd->base");
        assert_eq!(m.declare(None), "Gen_wrapper *fd;\n");
        // Returned handles resolve their most-derived wrapper at runtime.
        assert!(m.assign("call()", None).contains("new_class_wrapper"));
    }

    #[test]
    fn opaque_wrapper_pre_call_type_checks_inputs_only() {
        let mut reg = registry();
        reg.register_class("Resolver");
        let m = reg.dispatch("r", "Resolver").unwrap();
        assert!(m.pre_call().contains("type_check"));

        let ret = {
            let mut ret = reg.dispatch("func_return", "Resolver").unwrap();
            ret.flags |= Ownership::OUT;
            ret
        };
        assert_eq!(ret.pre_call(), "");
    }

    #[test]
    fn registered_struct_has_pointer_spelling() {
        let mut reg = registry();
        reg.register_struct("RDFURN");
        let by_value = reg.dispatch("urn", "RDFURN").unwrap();
        assert_eq!(by_value.kind, MarshalKind::StructWrapper);
        let by_pointer = reg.dispatch("urn", "RDFURN *").unwrap();
        assert_eq!(by_pointer.kind, MarshalKind::PointerStructWrapper);
        assert_eq!(by_pointer.ctype, "RDFURN");
    }

    #[test]
    fn unknown_spelling_is_an_error() {
        let err = registry().dispatch("x", "struct unknown_t *").unwrap_err();
        assert_eq!(
            err,
            DispatchError::UnknownType {
                spelling: "struct unknown_t *".to_string()
            }
        );
    }

    #[test]
    fn tdb_data_pointer_is_out_done_and_frees() {
        let m = registry().dispatch("value", "TDB_DATA *").unwrap();
        assert_eq!(m.direction(), Direction::OutDone);
        assert!(m.produce(None).contains("talloc_free(value)"));

        let by_value = registry().dispatch("value", "TDB_DATA").unwrap();
        assert!(!by_value.produce(None).contains("talloc_free"));
    }
}
