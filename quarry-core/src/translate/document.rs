//! DocumentTranslator - Filters for document stores
//!
//! Produces filter documents in the `$`-operator dialect understood by
//! [`MemoryCollection`](crate::driver::MemoryCollection) and by document
//! databases that share it.

use serde_json::{json, Map, Value};

use super::{string_pattern, validate_argument, Translator};
use crate::constants::DOCUMENT_OPERATOR_PREFIX;
use crate::query::{Condition, Group, LogicalOp, Operator, Query, QueryError};

/// Document-store translator.
///
/// AND groups merge their children's filters by key union. When two
/// children constrain the same attribute the later one wins; callers must
/// not rely on both constraints applying.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentTranslator;

impl DocumentTranslator {
    /// Create a translator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn translate_node(&self, query: &Query) -> Result<Map<String, Value>, QueryError> {
        match query {
            Query::Condition(condition) => self.translate_condition(condition),
            Query::Group(group) => self.translate_group(group),
        }
    }

    fn translate_group(&self, group: &Group) -> Result<Map<String, Value>, QueryError> {
        match group.operator() {
            LogicalOp::And => {
                let mut merged = Map::new();
                for node in group.nodes() {
                    merged.extend(self.translate_node(node)?);
                }
                Ok(merged)
            }
            LogicalOp::Or => {
                let branches = group
                    .nodes()
                    .iter()
                    .map(|node| self.translate_node(node).map(Value::Object))
                    .collect::<Result<Vec<_>, _>>()?;

                let mut filter = Map::new();
                filter.insert("$or".to_string(), Value::Array(branches));
                Ok(filter)
            }
        }
    }

    fn translate_condition(&self, condition: &Condition) -> Result<Map<String, Value>, QueryError> {
        validate_argument(condition)?;

        let operator = condition.operator();
        let argument = condition.argument().clone();

        let constraint = if operator == Operator::Eq {
            argument
        } else if operator.is_comparison() {
            json!({ format!("{DOCUMENT_OPERATOR_PREFIX}{operator}"): argument })
        } else if operator.is_string_match() {
            let literal = argument.as_str().unwrap_or_default();
            let pattern = string_pattern(operator, literal).unwrap_or_default();
            if operator.is_case_insensitive() {
                json!({ "$regex": pattern, "$options": "i" })
            } else {
                json!({ "$regex": pattern })
            }
        } else {
            geo_or_match_constraint(operator, argument)
        };

        let mut filter = Map::new();
        filter.insert(condition.attribute().to_string(), constraint);
        Ok(filter)
    }
}

/// Geo operators and `match`, in the document store's combinator names.
fn geo_or_match_constraint(operator: Operator, argument: Value) -> Value {
    match operator {
        Operator::WithinDistance => json!({ "$within": { "$center": argument } }),
        Operator::WithinSphericalDistance => {
            json!({ "$within": { "$centerSphere": argument } })
        }
        Operator::WithinBox => json!({ "$within": { "$box": argument } }),
        Operator::WithinPolygon => json!({ "$within": { "$polygon": argument } }),
        Operator::Near => json!({ "$near": argument }),
        Operator::NearSphere => json!({ "$nearSphere": argument }),
        Operator::MaxDistance => json!({ "$maxDistance": argument }),
        Operator::GeoWithin => json!({ "$geoWithin": argument }),
        Operator::GeoWithinBox => json!({ "$geoWithin": { "$box": argument } }),
        Operator::GeoWithinPolygon => json!({ "$geoWithin": { "$polygon": argument } }),
        Operator::GeoWithinCenter => json!({ "$geoWithin": { "$center": argument } }),
        Operator::GeoWithinSphere => {
            json!({ "$geoWithin": { "$centerSphere": argument } })
        }
        Operator::GeoIntersects => json!({ "$geoIntersects": argument }),
        Operator::Match => json!({ "$elemMatch": argument }),
        other => unreachable!("{other} is not a geo or match operator"),
    }
}

impl Translator for DocumentTranslator {
    type Output = Value;

    fn translate(&self, query: &Query) -> Result<Value, QueryError> {
        self.translate_node(query).map(Value::Object)
    }

    fn match_all(&self) -> Value {
        Value::Object(Map::new())
    }
}

// =============================================================================
// Tests
// =============================================================================
