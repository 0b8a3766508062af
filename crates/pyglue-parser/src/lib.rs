//! pyglue directive scanner.
//!
//! Line-oriented recognition of the annotation grammar (`CLASS()`,
//! `METHOD()`, attribute lines, `#define` constants, bound structs, and
//! documentation comments), feeding a `pyglue_core::ModuleBuilder`.

mod scanner;

pub use scanner::{ScanError, Scanner};
