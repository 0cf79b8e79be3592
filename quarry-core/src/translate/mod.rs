//! Translate - Query AST to backend-native filters
//!
//! TigerStyle: Pure functions. No I/O, no state between calls.
//!
//! # Architecture
//!
//! ```text
//!                 ┌──────────────┐
//!                 │  Query AST   │
//!                 └──────┬───────┘
//!            ┌───────────┴───────────┐
//!            ↓                       ↓
//! ┌────────────────────┐  ┌────────────────────┐
//! │ DocumentTranslator │  │   SqlTranslator    │
//! │  {"a": {"$gt": 1}} │  │ (doc #> $1) > $2   │
//! └────────────────────┘  └────────────────────┘
//! ```

mod document;
mod sql;

pub use document::DocumentTranslator;
pub use sql::{SqlFilter, SqlParam, SqlTranslator};

use serde_json::Value;

use crate::query::{Condition, Operator, Query, QueryError};

/// Compiles a query tree into a backend's native filter.
pub trait Translator {
    /// Native filter type.
    type Output;

    /// Translate one query tree.
    ///
    /// # Errors
    /// Returns a `QueryError` if the tree holds an argument or operator the
    /// backend cannot express.
    fn translate(&self, query: &Query) -> Result<Self::Output, QueryError>;

    /// Filter matching every record.
    fn match_all(&self) -> Self::Output;

    /// Translate several units as the AND of all of them.
    ///
    /// # Errors
    /// Same as [`translate`](Self::translate).
    fn translate_all(&self, units: &[Query]) -> Result<Self::Output, QueryError> {
        match Query::all_of(units) {
            Some(query) => self.translate(&query),
            None => Ok(self.match_all()),
        }
    }
}

/// Check argument shapes both translators rely on.
pub(crate) fn validate_argument(condition: &Condition) -> Result<(), QueryError> {
    let argument = condition.argument();
    let fail = |reason: &str| {
        Err(QueryError::invalid_argument(
            condition.attribute(),
            condition.operator().as_str(),
            reason,
        ))
    };

    match condition.operator() {
        Operator::In | Operator::Nin | Operator::All => {
            if !argument.is_array() {
                return fail("expected an array");
            }
        }
        Operator::Mod => match mod_argument(argument) {
            Some((divisor, _)) if divisor != 0 => {}
            Some(_) => return fail("divisor cannot be zero"),
            None => return fail("expected [divisor, remainder] integers"),
        },
        Operator::Size => {
            if argument.as_u64().is_none() {
                return fail("expected a non-negative integer");
            }
        }
        Operator::Exists => {
            if !argument.is_boolean() {
                return fail("expected a boolean");
            }
        }
        op if op.is_string_match() => {
            if !argument.is_string() {
                return fail("expected a string");
            }
        }
        _ => {}
    }

    Ok(())
}

/// Split a `mod` argument into `(divisor, remainder)`.
pub(crate) fn mod_argument(argument: &Value) -> Option<(i64, i64)> {
    match argument.as_array()?.as_slice() {
        [divisor, remainder] => Some((divisor.as_i64()?, remainder.as_i64()?)),
        _ => None,
    }
}

/// Build the escaped, anchored pattern for a string operator.
///
/// Metacharacters in `literal` match themselves.
pub(crate) fn string_pattern(operator: Operator, literal: &str) -> Option<String> {
    use crate::query::Anchor;

    let escaped = regex::escape(literal);
    let pattern = match operator.anchor()? {
        Anchor::None => escaped,
        Anchor::Start => format!("^{escaped}"),
        Anchor::End => format!("{escaped}$"),
        Anchor::Both => format!("^{escaped}$"),
    };
    Some(pattern)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn condition(op: &str, argument: Value) -> Condition {
        match Query::new("field", op, argument).unwrap() {
            Query::Condition(c) => c,
            Query::Group(_) => unreachable!(),
        }
    }

    #[test]
    fn test_validate_argument_shapes() {
        assert!(validate_argument(&condition("in", json!([1, 2]))).is_ok());
        assert!(validate_argument(&condition("in", json!(1))).is_err());
        assert!(validate_argument(&condition("mod", json!([4, 1]))).is_ok());
        assert!(validate_argument(&condition("mod", json!([0, 1]))).is_err());
        assert!(validate_argument(&condition("mod", json!([4]))).is_err());
        assert!(validate_argument(&condition("size", json!(3))).is_ok());
        assert!(validate_argument(&condition("size", json!(-1))).is_err());
        assert!(validate_argument(&condition("exists", json!(true))).is_ok());
        assert!(validate_argument(&condition("exists", json!("yes"))).is_err());
        assert!(validate_argument(&condition("startswith", json!(5))).is_err());
        assert!(validate_argument(&condition("gt", json!({"any": "thing"}))).is_ok());
    }

    #[test]
    fn test_string_pattern_anchors_and_escapes() {
        assert_eq!(
            string_pattern(Operator::Contains, "a.b").as_deref(),
            Some(r"a\.b")
        );
        assert_eq!(string_pattern(Operator::StartsWith, "ab").as_deref(), Some("^ab"));
        assert_eq!(string_pattern(Operator::IEndsWith, "ab").as_deref(), Some("ab$"));
        assert_eq!(
            string_pattern(Operator::Exact, "abc*def").as_deref(),
            Some(r"^abc\*def$")
        );
        assert_eq!(string_pattern(Operator::Eq, "ab"), None);
    }
}
