//! SqlTranslator - WHERE clauses over a JSONB document column
//!
//! TigerStyle: Every attribute path, value and pattern is a bound parameter.
//! Nothing from a query is spliced into SQL text.

use serde_json::Value;

use super::{mod_argument, string_pattern, validate_argument, Translator};
use crate::query::{Condition, Group, LogicalOp, Operator, Query, QueryError};

const BACKEND_NAME: &str = "sql";

/// A bound parameter of a [`SqlFilter`].
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// Text (regular expressions)
    Text(String),
    /// Text array (attribute paths for `#>` and `#>>`)
    Path(Vec<String>),
    /// JSONB value
    Json(Value),
    /// 64-bit integer
    Int(i64),
}

/// A translated WHERE clause with placeholders `$1..$n`.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFilter {
    /// Boolean SQL expression
    pub clause: String,
    /// Parameters, in placeholder order
    pub params: Vec<SqlParam>,
}

/// Postgres JSONB translator.
///
/// Unlike the document translator, AND is a true conjunction: two children
/// constraining one attribute both apply.
#[derive(Debug, Clone)]
pub struct SqlTranslator {
    column: String,
}

impl SqlTranslator {
    /// Create a translator for the given JSONB column.
    ///
    /// # Panics
    /// Panics if the column name is not a plain identifier.
    #[must_use]
    pub fn new(column: &str) -> Self {
        // Precondition: the column name is spliced into SQL text
        assert!(
            !column.is_empty()
                && column
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_'),
            "column must be a plain identifier, got {column:?}"
        );

        Self {
            column: column.to_string(),
        }
    }

    /// JSONB column the filter reads.
    #[must_use]
    pub fn column(&self) -> &str {
        &self.column
    }
}

impl Default for SqlTranslator {
    fn default() -> Self {
        Self::new("doc")
    }
}

impl Translator for SqlTranslator {
    type Output = SqlFilter;

    fn translate(&self, query: &Query) -> Result<SqlFilter, QueryError> {
        let mut builder = ClauseBuilder {
            column: &self.column,
            params: Vec::new(),
        };
        let clause = builder.node(query)?;
        Ok(SqlFilter {
            clause,
            params: builder.params,
        })
    }

    fn match_all(&self) -> SqlFilter {
        SqlFilter {
            clause: "TRUE".to_string(),
            params: Vec::new(),
        }
    }
}

// =============================================================================
// Clause Builder
// =============================================================================

struct ClauseBuilder<'a> {
    column: &'a str,
    params: Vec<SqlParam>,
}

impl ClauseBuilder<'_> {
    fn bind(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("${}", self.params.len())
    }

    fn node(&mut self, query: &Query) -> Result<String, QueryError> {
        match query {
            Query::Condition(condition) => self.condition(condition),
            Query::Group(group) => self.group(group),
        }
    }

    fn group(&mut self, group: &Group) -> Result<String, QueryError> {
        let (joiner, empty) = match group.operator() {
            LogicalOp::And => (" AND ", "TRUE"),
            LogicalOp::Or => (" OR ", "FALSE"),
        };

        if group.nodes().is_empty() {
            return Ok(empty.to_string());
        }

        let parts = group
            .nodes()
            .iter()
            .map(|node| self.node(node))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(format!("({})", parts.join(joiner)))
    }

    fn condition(&mut self, condition: &Condition) -> Result<String, QueryError> {
        validate_argument(condition)?;

        let operator = condition.operator();
        let argument = condition.argument();

        let path: Vec<String> = condition
            .attribute()
            .split('.')
            .map(str::to_string)
            .collect();
        let path = self.bind(SqlParam::Path(path));
        let field = format!("({} #> {path}::text[])", self.column);
        let text = format!("({} #>> {path}::text[])", self.column);

        let clause = match operator {
            Operator::Eq => self.equality(&field, argument),
            Operator::Ne => format!("NOT COALESCE({}, FALSE)", self.equality(&field, argument)),
            Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte => {
                let sql_op = match operator {
                    Operator::Gt => ">",
                    Operator::Gte => ">=",
                    Operator::Lt => "<",
                    _ => "<=",
                };
                let value = self.bind(SqlParam::Json(argument.clone()));
                format!(
                    "(jsonb_typeof({field}) = jsonb_typeof({value}::jsonb) AND {field} {sql_op} {value}::jsonb)"
                )
            }
            Operator::In | Operator::Nin => {
                let values = self.bind(SqlParam::Json(argument.clone()));
                let member = format!(
                    "EXISTS (SELECT 1 FROM jsonb_array_elements({values}::jsonb) AS e(v) \
                     WHERE e.v = {field} OR (jsonb_typeof({field}) = 'array' AND {field} @> jsonb_build_array(e.v)))"
                );
                if operator == Operator::In {
                    member
                } else {
                    format!("NOT {member}")
                }
            }
            Operator::Mod => {
                let (divisor, remainder) = mod_argument(argument).unwrap_or((1, 0));
                let divisor = self.bind(SqlParam::Int(divisor));
                let remainder = self.bind(SqlParam::Int(remainder));
                format!(
                    "(jsonb_typeof({field}) = 'number' AND MOD(({text})::numeric, {divisor}) = {remainder})"
                )
            }
            Operator::All => {
                let values = self.bind(SqlParam::Json(argument.clone()));
                format!("(jsonb_typeof({field}) = 'array' AND {field} @> {values}::jsonb)")
            }
            Operator::Size => {
                let size = i64::try_from(argument.as_u64().unwrap_or_default()).unwrap_or(i64::MAX);
                let size = self.bind(SqlParam::Int(size));
                format!("(jsonb_typeof({field}) = 'array' AND jsonb_array_length({field}) = {size})")
            }
            Operator::Exists => {
                if argument.as_bool().unwrap_or_default() {
                    format!("({field} IS NOT NULL)")
                } else {
                    format!("({field} IS NULL)")
                }
            }
            op if op.is_string_match() => {
                let literal = argument.as_str().unwrap_or_default();
                let pattern = string_pattern(op, literal).unwrap_or_default();
                let pattern = self.bind(SqlParam::Text(pattern));
                let sql_op = if op.is_case_insensitive() { "~*" } else { "~" };
                format!("(jsonb_typeof({field}) = 'string' AND {text} {sql_op} {pattern})")
            }
            other => {
                return Err(QueryError::Unsupported {
                    operator: other.as_str().to_string(),
                    backend: BACKEND_NAME,
                })
            }
        };

        Ok(clause)
    }

    /// Equality with document-store semantics: arrays match any element and
    /// `null` matches a missing attribute.
    fn equality(&mut self, field: &str, argument: &Value) -> String {
        if argument.is_null() {
            return format!("({field} IS NULL OR {field} = 'null'::jsonb)");
        }
        let value = self.bind(SqlParam::Json(argument.clone()));
        format!(
            "({field} = {value}::jsonb OR (jsonb_typeof({field}) = 'array' AND {field} @> jsonb_build_array({value}::jsonb)))"
        )
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn translate(query: &Query) -> SqlFilter {
        SqlTranslator::default().translate(query).unwrap()
    }

    #[test]
    fn test_eq_binds_path_and_value() {
        let filter = translate(&Query::eq("name", "alice"));
        assert!(filter.clause.contains("(doc #> $1::text[]) = $2::jsonb"));
        assert_eq!(
            filter.params,
            vec![
                SqlParam::Path(vec!["name".to_string()]),
                SqlParam::Json(json!("alice")),
            ]
        );
    }

    #[test]
    fn test_attribute_is_never_spliced() {
        let hostile = "x'); DROP TABLE t; --";
        let filter = translate(&Query::eq(hostile, 1));
        assert!(!filter.clause.contains("DROP"));
        assert_eq!(filter.params[0], SqlParam::Path(vec![hostile.to_string()]));
    }

    #[test]
    fn test_dotted_attribute_becomes_path() {
        let filter = translate(&Query::new("address.city", "exists", true).unwrap());
        assert_eq!(filter.clause, "((doc #> $1::text[]) IS NOT NULL)");
        assert_eq!(
            filter.params,
            vec![SqlParam::Path(vec!["address".to_string(), "city".to_string()])]
        );
    }

    #[test]
    fn test_range_operator() {
        let filter = translate(&Query::new("age", "gte", 18).unwrap());
        assert!(filter.clause.contains(">= $2::jsonb"));
        assert_eq!(filter.params[1], SqlParam::Json(json!(18)));
    }

    #[test]
    fn test_string_operators_use_regex() {
        let filter = translate(&Query::new("name", "iexact", "a*b").unwrap());
        assert!(filter.clause.contains("~* $2"));
        assert_eq!(filter.params[1], SqlParam::Text(r"^a\*b$".to_string()));

        let filter = translate(&Query::new("name", "startswith", "a").unwrap());
        assert!(filter.clause.contains("~ $2"));
        assert!(!filter.clause.contains("~*"));
    }

    #[test]
    fn test_groups_number_placeholders_in_order() {
        let q = Query::eq("a", 1) & (Query::eq("b", 2) | Query::new("c", "lt", 3).unwrap());
        let filter = translate(&q);
        assert!(filter.clause.starts_with('('));
        assert!(filter.clause.contains(" AND ("));
        assert!(filter.clause.contains(" OR "));
        assert_eq!(filter.params.len(), 6);
        assert!(filter.clause.contains("$6::jsonb"));
    }

    #[test]
    fn test_empty_groups() {
        let and = Query::from(Group::new(LogicalOp::And, vec![]));
        assert_eq!(translate(&and).clause, "TRUE");
        let or = Query::from(Group::new(LogicalOp::Or, vec![]));
        assert_eq!(translate(&or).clause, "FALSE");
        assert_eq!(SqlTranslator::default().match_all().clause, "TRUE");
    }

    #[test]
    fn test_unsupported_operators() {
        for (op, arg) in [
            ("near", json!([0, 0])),
            ("match", json!({})),
            ("not", json!({"$gt": 1})),
        ] {
            let q = Query::new("f", op, arg).unwrap();
            let err = SqlTranslator::default().translate(&q).unwrap_err();
            assert!(matches!(err, QueryError::Unsupported { backend: "sql", .. }));
        }
    }

    #[test]
    fn test_translation_is_idempotent() {
        let q = Query::new("a", "in", json!([1, 2])).unwrap() | Query::new("b", "mod", json!([3, 1])).unwrap();
        assert_eq!(translate(&q), translate(&q));
    }

    #[test]
    #[should_panic(expected = "plain identifier")]
    fn test_column_must_be_identifier() {
        let _ = SqlTranslator::new("doc; --");
    }
}
