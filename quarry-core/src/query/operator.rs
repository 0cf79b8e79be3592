//! Operator - The recognized condition operators
//!
//! TigerStyle: Closed enum. Parsing is the only place operator strings are
//! checked, so an unknown operator never reaches a translator.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::QueryError;

/// Operator of a leaf [`Condition`](super::Condition).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Operator {
    // Equality
    Eq,

    // Range, set and existence
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Mod,
    All,
    Size,
    Exists,
    Not,

    // String matching
    Contains,
    IContains,
    StartsWith,
    IStartsWith,
    EndsWith,
    IEndsWith,
    Exact,
    IExact,

    // Geo
    WithinDistance,
    WithinSphericalDistance,
    WithinBox,
    WithinPolygon,
    Near,
    NearSphere,
    MaxDistance,
    GeoWithin,
    GeoWithinBox,
    GeoWithinPolygon,
    GeoWithinCenter,
    GeoWithinSphere,
    GeoIntersects,

    // Element match
    Match,
}

/// Where a string operator anchors its pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    /// Match anywhere
    None,
    /// `^...`
    Start,
    /// `...$`
    End,
    /// `^...$`
    Both,
}

impl Operator {
    /// Every operator, in declaration order.
    pub const ALL: [Operator; 35] = [
        Self::Eq,
        Self::Ne,
        Self::Gt,
        Self::Gte,
        Self::Lt,
        Self::Lte,
        Self::In,
        Self::Nin,
        Self::Mod,
        Self::All,
        Self::Size,
        Self::Exists,
        Self::Not,
        Self::Contains,
        Self::IContains,
        Self::StartsWith,
        Self::IStartsWith,
        Self::EndsWith,
        Self::IEndsWith,
        Self::Exact,
        Self::IExact,
        Self::WithinDistance,
        Self::WithinSphericalDistance,
        Self::WithinBox,
        Self::WithinPolygon,
        Self::Near,
        Self::NearSphere,
        Self::MaxDistance,
        Self::GeoWithin,
        Self::GeoWithinBox,
        Self::GeoWithinPolygon,
        Self::GeoWithinCenter,
        Self::GeoWithinSphere,
        Self::GeoIntersects,
        Self::Match,
    ];

    /// Get string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::In => "in",
            Self::Nin => "nin",
            Self::Mod => "mod",
            Self::All => "all",
            Self::Size => "size",
            Self::Exists => "exists",
            Self::Not => "not",
            Self::Contains => "contains",
            Self::IContains => "icontains",
            Self::StartsWith => "startswith",
            Self::IStartsWith => "istartswith",
            Self::EndsWith => "endswith",
            Self::IEndsWith => "iendswith",
            Self::Exact => "exact",
            Self::IExact => "iexact",
            Self::WithinDistance => "within_distance",
            Self::WithinSphericalDistance => "within_spherical_distance",
            Self::WithinBox => "within_box",
            Self::WithinPolygon => "within_polygon",
            Self::Near => "near",
            Self::NearSphere => "near_sphere",
            Self::MaxDistance => "max_distance",
            Self::GeoWithin => "geo_within",
            Self::GeoWithinBox => "geo_within_box",
            Self::GeoWithinPolygon => "geo_within_polygon",
            Self::GeoWithinCenter => "geo_within_center",
            Self::GeoWithinSphere => "geo_within_sphere",
            Self::GeoIntersects => "geo_intersects",
            Self::Match => "match",
        }
    }

    /// Range, set and existence operators, passed through as `$op`.
    #[must_use]
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Self::Ne
                | Self::Gt
                | Self::Gte
                | Self::Lt
                | Self::Lte
                | Self::In
                | Self::Nin
                | Self::Mod
                | Self::All
                | Self::Size
                | Self::Exists
                | Self::Not
        )
    }

    /// Operators compiled into an escaped regular expression.
    #[must_use]
    pub fn is_string_match(&self) -> bool {
        self.anchor().is_some()
    }

    /// Geo operators.
    #[must_use]
    pub fn is_geo(&self) -> bool {
        matches!(
            self,
            Self::WithinDistance
                | Self::WithinSphericalDistance
                | Self::WithinBox
                | Self::WithinPolygon
                | Self::Near
                | Self::NearSphere
                | Self::MaxDistance
                | Self::GeoWithin
                | Self::GeoWithinBox
                | Self::GeoWithinPolygon
                | Self::GeoWithinCenter
                | Self::GeoWithinSphere
                | Self::GeoIntersects
        )
    }

    /// Pattern anchoring for string operators, `None` for the rest.
    #[must_use]
    pub fn anchor(&self) -> Option<Anchor> {
        match self {
            Self::Contains | Self::IContains => Some(Anchor::None),
            Self::StartsWith | Self::IStartsWith => Some(Anchor::Start),
            Self::EndsWith | Self::IEndsWith => Some(Anchor::End),
            Self::Exact | Self::IExact => Some(Anchor::Both),
            _ => None,
        }
    }

    /// True for the `i`-prefixed string operators.
    #[must_use]
    pub fn is_case_insensitive(&self) -> bool {
        matches!(
            self,
            Self::IContains | Self::IStartsWith | Self::IEndsWith | Self::IExact
        )
    }
}

impl FromStr for Operator {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .find(|op| op.as_str() == s)
            .copied()
            .ok_or_else(|| QueryError::UnknownOperator(s.to_string()))
    }
}

impl TryFrom<String> for Operator {
    type Error = QueryError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        op.as_str().to_string()
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_parse_roundtrip() {
        for op in Operator::ALL {
            assert_eq!(op.as_str().parse::<Operator>().unwrap(), op);
        }
    }

    #[test]
    fn test_operator_unknown() {
        let err = "like".parse::<Operator>().unwrap_err();
        assert!(matches!(err, QueryError::UnknownOperator(ref s) if s == "like"));

        // Operators are case-sensitive
        assert!("EQ".parse::<Operator>().is_err());
    }

    #[test]
    fn test_operator_categories_are_disjoint() {
        for op in Operator::ALL {
            let categories = [
                op == Operator::Eq,
                op.is_comparison(),
                op.is_string_match(),
                op.is_geo(),
                op == Operator::Match,
            ];
            assert_eq!(
                categories.iter().filter(|c| **c).count(),
                1,
                "{op} must belong to exactly one category"
            );
        }
    }

    #[test]
    fn test_operator_anchor() {
        assert_eq!(Operator::Contains.anchor(), Some(Anchor::None));
        assert_eq!(Operator::IStartsWith.anchor(), Some(Anchor::Start));
        assert_eq!(Operator::EndsWith.anchor(), Some(Anchor::End));
        assert_eq!(Operator::IExact.anchor(), Some(Anchor::Both));
        assert_eq!(Operator::Gt.anchor(), None);
        assert!(Operator::IExact.is_case_insensitive());
        assert!(!Operator::Exact.is_case_insensitive());
    }
}
