//! Unified error types for pyglue.
//!
//! This module provides a consistent error type hierarchy for the phases of
//! a generation run: type dispatch, scanning, and emission.
//!
//! ## Error Hierarchy
//!
//! ```text
//! PyglueError (top-level wrapper)
//! ├── DispatchError - unknown native type spellings
//! └── EmitError     - model-integrity failures at emission time
//! ```
//!
//! Most parse-time conditions are deliberately *not* errors: an unknown
//! argument or attribute type is logged and dropped so that generation can
//! continue over partially-annotated headers. Only conditions that make a
//! valid output impossible (a class reaching emission without a constructor)
//! surface as `EmitError`.

use thiserror::Error;

// ============================================================================
// Dispatch Errors
// ============================================================================

/// Errors produced by the marshaler registry when resolving a type spelling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The native type spelling has no registered binding.
    #[error("unknown native type '{spelling}'")]
    UnknownType {
        /// The spelling that failed to resolve (ownership keywords stripped).
        spelling: String,
    },
}

// ============================================================================
// Emission Errors
// ============================================================================

/// Errors that occur while emitting the frozen module.
///
/// These are fatal: the model cannot produce a valid wrapper and the whole
/// generation run aborts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmitError {
    /// A class reached emission with no constructor.
    #[error("no constructor found for class {class}")]
    MissingConstructor {
        /// The class missing its constructor.
        class: String,
    },
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// The unified error type for all pyglue operations.
///
/// Each variant uses `#[from]` to enable automatic conversion with the `?`
/// operator.
#[derive(Debug, Error)]
pub enum PyglueError {
    /// A type-dispatch error.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// An emission error.
    #[error(transparent)]
    Emit(#[from] EmitError),

    /// An I/O error reading an input header or writing the output unit.
    #[error("i/o error on {path}: {source}")]
    Io {
        /// The file being read or written.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_error_display() {
        let err = DispatchError::UnknownType {
            spelling: "struct unknown_t *".to_string(),
        };
        assert_eq!(format!("{err}"), "unknown native type 'struct unknown_t *'");
    }

    #[test]
    fn emit_error_display() {
        let err = EmitError::MissingConstructor {
            class: "FileLikeObject".to_string(),
        };
        assert_eq!(
            format!("{err}"),
            "no constructor found for class FileLikeObject"
        );
    }

    #[test]
    fn pyglue_error_transparent_display() {
        let err: PyglueError = EmitError::MissingConstructor {
            class: "Resolver".to_string(),
        }
        .into();
        assert_eq!(format!("{err}"), "no constructor found for class Resolver");
    }
}
