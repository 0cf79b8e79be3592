//! Query errors
//!
//! Usage errors: raised while building or translating a query, never by a
//! backend.

/// Malformed query or query a backend cannot express.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    /// Operator string outside the operator table.
    #[error("unrecognized query operator: {0:?}")]
    UnknownOperator(String),

    /// Condition without an attribute name.
    #[error("condition attribute cannot be empty")]
    EmptyAttribute,

    /// Sort key without an attribute name, such as `-` or an empty string.
    #[error("sort key {0:?} has no attribute")]
    InvalidSortKey(String),

    /// Group operator other than `and` / `or`.
    #[error("group operator must be <and> or <or>, got {0:?}")]
    InvalidGroupOperator(String),

    /// Argument of the wrong shape for its operator.
    #[error("invalid argument for {operator} on {attribute:?}: {reason}")]
    InvalidArgument {
        /// Attribute the condition tests
        attribute: String,
        /// Operator name
        operator: String,
        /// What was expected
        reason: String,
    },

    /// The target backend has no rendition of this operator.
    #[error("operator {operator} is not supported by the {backend} translator")]
    Unsupported {
        /// Operator name
        operator: String,
        /// Translator name
        backend: &'static str,
    },
}

impl QueryError {
    /// Create an invalid-argument error.
    pub fn invalid_argument(
        attribute: impl Into<String>,
        operator: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidArgument {
            attribute: attribute.into(),
            operator: operator.into(),
            reason: reason.into(),
        }
    }
}
