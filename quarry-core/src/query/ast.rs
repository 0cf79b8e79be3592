//! Query AST - Backend-neutral boolean queries
//!
//! TigerStyle: Immutable nodes, validated at construction.
//!
//! ```text
//!            Group(Or)
//!           /         \
//!   Condition      Group(And)
//!  name eq "a"     /        \
//!           Condition    Condition
//!           age gt 3     tag in [..]
//! ```

use std::fmt;
use std::ops::{BitAnd, BitOr};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::QueryError;
use super::operator::Operator;

// =============================================================================
// Condition
// =============================================================================

/// A leaf condition: `attribute operator argument`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ConditionRepr")]
pub struct Condition {
    attribute: String,
    operator: Operator,
    argument: Value,
}

#[derive(Deserialize)]
struct ConditionRepr {
    attribute: String,
    operator: Operator,
    argument: Value,
}

impl TryFrom<ConditionRepr> for Condition {
    type Error = QueryError;

    fn try_from(repr: ConditionRepr) -> Result<Self, Self::Error> {
        Self::new(repr.attribute, repr.operator, repr.argument)
    }
}

impl Condition {
    /// Create a condition with a typed operator.
    ///
    /// # Errors
    /// Returns `EmptyAttribute` if `attribute` is empty.
    pub fn new(
        attribute: impl Into<String>,
        operator: Operator,
        argument: Value,
    ) -> Result<Self, QueryError> {
        let attribute = attribute.into();
        if attribute.is_empty() {
            return Err(QueryError::EmptyAttribute);
        }

        Ok(Self {
            attribute,
            operator,
            argument,
        })
    }

    /// Attribute the condition constrains.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Condition operator.
    #[must_use]
    pub fn operator(&self) -> Operator {
        self.operator
    }

    /// Condition argument.
    #[must_use]
    pub fn argument(&self) -> &Value {
        &self.argument
    }
}

// =============================================================================
// Group
// =============================================================================

/// Boolean operator joining the nodes of a [`Group`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalOp {
    /// Every node must match
    And,
    /// At least one node must match
    Or,
}

impl LogicalOp {
    /// Get string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

impl FromStr for LogicalOp {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "and" => Ok(Self::And),
            "or" => Ok(Self::Or),
            _ => Err(QueryError::InvalidGroupOperator(s.to_string())),
        }
    }
}

impl fmt::Display for LogicalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An internal node: ordered children joined by AND or OR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "GroupRepr", into = "GroupRepr")]
pub struct Group {
    operator: LogicalOp,
    nodes: Vec<Query>,
}

impl Group {
    /// Create a group with a typed operator.
    #[must_use]
    pub fn new(operator: LogicalOp, nodes: Vec<Query>) -> Self {
        Self { operator, nodes }
    }

    /// Create a group from an operator string.
    ///
    /// # Errors
    /// Returns `InvalidGroupOperator` unless `operator` is `and` or `or`.
    pub fn parse(operator: &str, nodes: Vec<Query>) -> Result<Self, QueryError> {
        Ok(Self::new(operator.parse()?, nodes))
    }

    /// Group operator.
    #[must_use]
    pub fn operator(&self) -> LogicalOp {
        self.operator
    }

    /// Child nodes, in order.
    #[must_use]
    pub fn nodes(&self) -> &[Query] {
        &self.nodes
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum GroupRepr {
    And(Vec<Query>),
    Or(Vec<Query>),
}

impl From<GroupRepr> for Group {
    fn from(repr: GroupRepr) -> Self {
        match repr {
            GroupRepr::And(nodes) => Self::new(LogicalOp::And, nodes),
            GroupRepr::Or(nodes) => Self::new(LogicalOp::Or, nodes),
        }
    }
}

impl From<Group> for GroupRepr {
    fn from(group: Group) -> Self {
        match group.operator {
            LogicalOp::And => Self::And(group.nodes),
            LogicalOp::Or => Self::Or(group.nodes),
        }
    }
}

// =============================================================================
// Query
// =============================================================================

/// A query tree.
///
/// Serialized as `{"attribute", "operator", "argument"}` for leaves and
/// `{"and": [...]}` / `{"or": [...]}` for groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Query {
    /// Leaf condition
    Condition(Condition),
    /// Boolean group
    Group(Group),
}

impl Query {
    /// Build a condition from an operator string.
    ///
    /// # Errors
    /// Returns `UnknownOperator` if `operator` is not recognized and
    /// `EmptyAttribute` if `attribute` is empty.
    ///
    /// # Example
    /// ```
    /// use quarry_core::Query;
    /// use serde_json::json;
    ///
    /// let q = Query::new("age", "gte", json!(18)).unwrap();
    /// assert!(Query::new("age", "roughly", json!(18)).is_err());
    /// ```
    pub fn new(
        attribute: impl Into<String>,
        operator: &str,
        argument: impl Into<Value>,
    ) -> Result<Self, QueryError> {
        Self::condition(attribute, operator.parse()?, argument)
    }

    /// Build a condition with a typed operator.
    ///
    /// # Errors
    /// Returns `EmptyAttribute` if `attribute` is empty.
    pub fn condition(
        attribute: impl Into<String>,
        operator: Operator,
        argument: impl Into<Value>,
    ) -> Result<Self, QueryError> {
        Condition::new(attribute, operator, argument.into()).map(Self::Condition)
    }

    /// Shorthand for an `eq` condition on a literal attribute name.
    ///
    /// # Panics
    /// Panics if `attribute` is empty; use [`condition`](Self::condition)
    /// for names that come from input.
    #[must_use]
    pub fn eq(attribute: impl Into<String>, argument: impl Into<Value>) -> Self {
        let attribute = attribute.into();
        // Precondition
        assert!(!attribute.is_empty(), "condition attribute cannot be empty");

        Self::Condition(Condition {
            attribute,
            operator: Operator::Eq,
            argument: argument.into(),
        })
    }

    /// Combine with another query under AND.
    #[must_use]
    pub fn and(self, other: Query) -> Self {
        Self::Group(Group::new(LogicalOp::And, vec![self, other]))
    }

    /// Combine with another query under OR.
    #[must_use]
    pub fn or(self, other: Query) -> Self {
        Self::Group(Group::new(LogicalOp::Or, vec![self, other]))
    }

    /// Fold independent units into one AND group.
    ///
    /// A single unit is returned unchanged; an empty slice yields `None`.
    #[must_use]
    pub fn all_of(units: &[Query]) -> Option<Self> {
        match units {
            [] => None,
            [single] => Some(single.clone()),
            many => Some(Self::Group(Group::new(LogicalOp::And, many.to_vec()))),
        }
    }
}

impl From<Condition> for Query {
    fn from(condition: Condition) -> Self {
        Self::Condition(condition)
    }
}

impl From<Group> for Query {
    fn from(group: Group) -> Self {
        Self::Group(group)
    }
}

impl BitAnd for Query {
    type Output = Query;

    fn bitand(self, rhs: Query) -> Query {
        self.and(rhs)
    }
}

impl BitOr for Query {
    type Output = Query;

    fn bitor(self, rhs: Query) -> Query {
        self.or(rhs)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_query_new_parses_operator() {
        let q = Query::new("name", "icontains", "ali").unwrap();
        match q {
            Query::Condition(c) => {
                assert_eq!(c.attribute(), "name");
                assert_eq!(c.operator(), Operator::IContains);
                assert_eq!(c.argument(), &json!("ali"));
            }
            Query::Group(_) => panic!("expected condition"),
        }
    }

    #[test]
    fn test_query_new_unknown_operator() {
        let err = Query::new("name", "regex", "x").unwrap_err();
        assert_eq!(err, QueryError::UnknownOperator("regex".to_string()));
    }

    #[test]
    fn test_group_parse() {
        let g = Group::parse("AND", vec![Query::eq("a", 1)]).unwrap();
        assert_eq!(g.operator(), LogicalOp::And);

        let err = Group::parse("xor", vec![]).unwrap_err();
        assert_eq!(err, QueryError::InvalidGroupOperator("xor".to_string()));
    }

    #[test]
    fn test_composition_builds_groups() {
        let q = Query::eq("a", 1) & Query::eq("b", 2) | Query::eq("c", 3);
        let Query::Group(outer) = q else {
            panic!("expected group");
        };
        assert_eq!(outer.operator(), LogicalOp::Or);
        assert_eq!(outer.nodes().len(), 2);
        assert!(matches!(
            &outer.nodes()[0],
            Query::Group(inner) if inner.operator() == LogicalOp::And
        ));
    }

    #[test]
    fn test_all_of() {
        assert_eq!(Query::all_of(&[]), None);

        let single = Query::eq("a", 1);
        assert_eq!(Query::all_of(&[single.clone()]), Some(single));

        let folded = Query::all_of(&[Query::eq("a", 1), Query::eq("b", 2)]).unwrap();
        assert!(matches!(folded, Query::Group(g) if g.operator() == LogicalOp::And));
    }

    #[test]
    fn test_query_serde() {
        let q = Query::eq("a", 1).or(Query::new("b", "gt", 2).unwrap());
        let value = serde_json::to_value(&q).unwrap();
        assert_eq!(
            value,
            json!({"or": [
                {"attribute": "a", "operator": "eq", "argument": 1},
                {"attribute": "b", "operator": "gt", "argument": 2}
            ]})
        );

        let back: Query = serde_json::from_value(value).unwrap();
        assert_eq!(back, q);
    }

    #[test]
    fn test_query_deserialize_rejects_unknown_operator() {
        let result: Result<Query, _> = serde_json::from_value(json!({
            "attribute": "a", "operator": "approximately", "argument": 1
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_attribute_is_an_error() {
        assert_eq!(Query::new("", "eq", 1).unwrap_err(), QueryError::EmptyAttribute);
        assert_eq!(
            Query::condition("", Operator::Gt, 1).unwrap_err(),
            QueryError::EmptyAttribute
        );

        let result: Result<Query, _> = serde_json::from_value(json!({
            "attribute": "", "operator": "eq", "argument": 1
        }));
        assert!(result.is_err());
        let nested: Result<Query, _> = serde_json::from_value(json!({
            "and": [{"attribute": "", "operator": "eq", "argument": 1}]
        }));
        assert!(nested.is_err());
    }

    #[test]
    #[should_panic(expected = "attribute cannot be empty")]
    fn test_eq_shorthand_rejects_empty_literal() {
        let _ = Query::eq("", 1);
    }
}
