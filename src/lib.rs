//! pyglue — a binding-glue generator for directive-annotated C headers.
//!
//! pyglue scans C headers decorated with lightweight directives (`CLASS()`,
//! `METHOD()`, attribute lines, `#define` constants, `BOUND` structs) and
//! emits one C source unit exposing the described native class hierarchy as
//! first-class objects in a CPython extension module.
//!
//! # Example
//!
//! ```
//! use pyglue::Generator;
//!
//! let mut generator = Generator::new("pyzip");
//! generator.parse_source(
//!     "zip.h",
//!     "CLASS(ZipFile, )\n  ZipFile METHOD(ZipFile, Con, char *filename);\nEND_CLASS\n",
//! );
//! let output = generator.generate().unwrap();
//! assert!(output.contains("initpyzip"));
//! ```

mod generator;

pub use generator::Generator;
pub use pyglue_core::{
    ClassEntry, ClassKind, ConstantEntry, ConstantKind, DispatchError, EmitError, GetattrEntry,
    Marshaler, MethodEntry, MethodKind, Module, ModuleBuilder, PyglueError, TypeRegistry,
};
pub use pyglue_parser::{ScanError, Scanner};
