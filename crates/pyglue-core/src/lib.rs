//! pyglue model and emission core.
//!
//! This crate holds everything between the directive scanner and the output
//! stream: the marshaler registry that binds native type spellings to
//! host-boundary conversion strategies, the class/method/constant entries
//! built up during parsing, and the module model that freezes the finished
//! graph and emits the generated extension source.
//!
//! The lifecycle is strictly two-phase: a [`ModuleBuilder`] is mutated while
//! input streams in, then frozen into a [`Module`] which alone can emit.

mod entries;
mod error;
mod escape;
mod marshal;
mod module;

pub use entries::{
    ClassEntry, ClassKind, ConstantEntry, ConstantKind, GetattrEntry, MethodEntry, MethodKind,
    RaiseRule,
};
pub use error::{DispatchError, EmitError, PyglueError};
pub use escape::escape_for_string;
pub use marshal::{Direction, Interface, MarshalKind, Marshaler, Ownership, TypeRegistry};
pub use module::{Module, ModuleBuilder};
