//! Error types

use thiserror::Error;

use crate::types::{Kind, Type};

/// Errors raised while cloning or manipulating runtime values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CloneError {
    /// A value of one type was supplied where another was required
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Type the operation required
        expected: String,
        /// Type that was supplied
        found: String,
    },

    /// Operation is not defined for the value's kind (e.g. indexing an int)
    #[error("{op} is not supported on {found}")]
    Unsupported {
        /// Operation name
        op: &'static str,
        /// Type (or `nil`) the operation was attempted on
        found: String,
    },

    /// Sequence index outside `0..len`
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange {
        /// Requested index
        index: usize,
        /// Sequence length
        len: usize,
    },

    /// Slice constructed with `len > cap`
    #[error("slice length {len} exceeds capacity {cap}")]
    InvalidSliceBounds {
        /// Requested length
        len: usize,
        /// Requested capacity
        cap: usize,
    },

    /// Record has no field with the given name
    #[error("{type_name} has no field `{field}`")]
    NoSuchField {
        /// Record type
        type_name: String,
        /// Requested field
        field: String,
    },

    /// Field cannot be written from outside its declaration
    #[error("field `{field}` of {type_name} is unexported")]
    UnexportedField {
        /// Record type
        type_name: String,
        /// Field name
        field: String,
    },

    /// Dereference through a nil pointer or empty interface
    #[error("nil dereference of {0}")]
    NilPointer(String),

    /// Map key whose type is not comparable
    #[error("unhashable map key of type {0}")]
    UnhashableKey(String),

    /// Numeric value does not fit the requested Rust type
    #[error("value {value} out of range for {target}")]
    Overflow {
        /// Offending value, rendered
        value: String,
        /// Rust target type
        target: &'static str,
    },

    /// Conversion between types with different underlying representations
    #[error("cannot convert {from} to {to}")]
    Conversion {
        /// Source type
        from: String,
        /// Target type
        to: String,
    },

    /// Non-blocking send on a channel whose buffer is full
    #[error("channel {0} is full")]
    ChannelFull(String),

    /// Configured nesting limit reached
    #[error("maximum clone depth of {limit} exceeded")]
    DepthExceeded {
        /// Configured limit
        limit: usize,
    },

    /// Error returned by a function value
    #[error("{0}")]
    Call(String),
}

impl CloneError {
    /// Create a type mismatch error
    pub fn type_mismatch(expected: &Type, found: Option<&Type>) -> Self {
        Self::TypeMismatch {
            expected: expected.to_string(),
            found: describe(found),
        }
    }

    /// Create a kind mismatch error, where the operation wanted a kind rather than a type
    pub fn kind_mismatch(expected: Kind, found: Option<&Type>) -> Self {
        Self::TypeMismatch {
            expected: expected.to_string(),
            found: describe(found),
        }
    }

    /// Create an unsupported-operation error
    pub fn unsupported(op: &'static str, found: Option<&Type>) -> Self {
        Self::Unsupported {
            op,
            found: describe(found),
        }
    }

    /// Create an error from a function value's failure message
    pub fn call(msg: impl Into<String>) -> Self {
        Self::Call(msg.into())
    }
}

fn describe(ty: Option<&Type>) -> String {
    ty.map_or_else(|| "nil".to_string(), Type::to_string)
}

/// Result type for clone and value operations
pub type CloneResult<T> = std::result::Result<T, CloneError>;
