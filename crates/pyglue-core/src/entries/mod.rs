//! Model entries: the classes, methods, attributes, and constants that one
//! generation run accumulates before emission.

mod class;
mod constant;
mod getattr;
mod method;

pub use class::{ClassEntry, ClassKind};
pub use constant::{ConstantEntry, ConstantKind};
pub use getattr::GetattrEntry;
pub use method::{MethodEntry, MethodKind, RaiseRule};
