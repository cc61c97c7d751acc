//! Group membership expression building.
//!
//! The policy API models group membership as a list of terms joined by
//! conjunction operators. This module builds those lists from ordered
//! tag lists and enforces the API's term ceiling.

use serde::{Deserialize, Serialize};

use crate::error::{PlanError, Result};
use crate::nsx::Tag;

/// Maximum number of non-conjunction terms permitted in one expression.
pub const MAX_CONDITION_TERMS: usize = 5;

/// Object kinds a membership term can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberType {
    /// Virtual machines.
    VirtualMachine,
    /// Segments.
    Segment,
}

/// Group-membership expression terms understood by the policy API.
///
/// The wire discriminator is `resource_type`; the variant names below
/// match the API's exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "resource_type")]
pub enum Expression {
    /// A single key/operator/value condition.
    Condition {
        /// Condition key; tag conditions use `Tag`.
        key: String,
        /// Object kind the condition selects.
        member_type: MemberType,
        /// Comparison operator; tag conditions use `EQUALS`.
        operator: String,
        /// Comparison value; tag conditions use `scope|value`.
        value: String,
    },
    /// Joins the neighbouring terms of an expression list.
    ConjunctionOperator {
        /// `AND` inside nested expressions, `OR` at the top level.
        conjunction_operator: String,
    },
    /// Wraps a conjunction of conditions as a single term.
    NestedExpression {
        /// The inner term list, alternating conditions and conjunctions.
        expressions: Vec<Expression>,
    },
    /// Matches objects by policy path membership.
    PathExpression {
        /// Policy paths of the member objects.
        paths: Vec<String>,
    },
    /// Matches by literal address, network, or range strings.
    #[serde(rename = "IPAddressExpression")]
    IpAddressExpression {
        /// Address entries in specifier syntax.
        ip_addresses: Vec<String>,
    },
    /// Matches an explicit list of object identifiers.
    #[serde(rename = "ExternalIDExpression")]
    ExternalIdExpression {
        /// Object kind of the listed ids.
        member_type: MemberType,
        /// External ids of the member objects.
        external_ids: Vec<String>,
    },
}

impl Expression {
    /// Builds the tag equality condition for one scope/value pair.
    #[must_use]
    pub fn tag_condition(tag: &Tag, member_type: MemberType) -> Self {
        Self::Condition {
            key: String::from("Tag"),
            member_type,
            operator: String::from("EQUALS"),
            value: tag.condition_value(),
        }
    }

    /// Builds a conjunction term.
    #[must_use]
    pub fn conjunction(operator: &str) -> Self {
        Self::ConjunctionOperator {
            conjunction_operator: operator.to_string(),
        }
    }

    /// True for conjunction terms.
    #[must_use]
    pub const fn is_conjunction(&self) -> bool {
        matches!(self, Self::ConjunctionOperator { .. })
    }

    /// The wire name of this term's kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Condition { .. } => "Condition",
            Self::ConjunctionOperator { .. } => "ConjunctionOperator",
            Self::NestedExpression { .. } => "NestedExpression",
            Self::PathExpression { .. } => "PathExpression",
            Self::IpAddressExpression { .. } => "IPAddressExpression",
            Self::ExternalIdExpression { .. } => "ExternalIDExpression",
        }
    }
}

/// Builds group-membership expressions from ordered tag lists.
#[derive(Debug, Default)]
pub struct ExpressionBuilder;

impl ExpressionBuilder {
    /// Creates a new builder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Converts an ordered tag list into condition terms joined by `AND`.
    ///
    /// # Errors
    ///
    /// Fails when the list exceeds [`MAX_CONDITION_TERMS`].
    pub fn build_from_tags(&self, tags: &[Tag], member_type: MemberType) -> Result<Vec<Expression>> {
        if tags.len() > MAX_CONDITION_TERMS {
            return Err(PlanError::TooManyConditions { count: tags.len() }.into());
        }

        let mut expressions = Vec::new();
        for tag in tags {
            if !expressions.is_empty() {
                expressions.push(Expression::conjunction("AND"));
            }
            expressions.push(Expression::tag_condition(tag, member_type));
        }
        Ok(expressions)
    }

    /// Builds the single-term expression list for a tag conjunction: a
    /// bare condition for one tag, a nested expression otherwise.
    ///
    /// # Errors
    ///
    /// Fails when the list exceeds [`MAX_CONDITION_TERMS`].
    pub fn group_expression(&self, tags: &[Tag], member_type: MemberType) -> Result<Vec<Expression>> {
        let expressions = self.build_from_tags(tags, member_type)?;
        if expressions.len() <= 1 {
            Ok(expressions)
        } else {
            Ok(vec![Expression::NestedExpression { expressions }])
        }
    }

    /// Builds one named group expression per non-empty tag prefix.
    ///
    /// Group *i* (0-based) covers the first *i + 1* tags and is named by
    /// appending `_{value}` to `base_name` for each covered tag; N tags
    /// produce exactly N groups.
    ///
    /// # Errors
    ///
    /// Fails when the full list exceeds [`MAX_CONDITION_TERMS`].
    pub fn build_progressive(
        &self,
        tags: &[Tag],
        member_type: MemberType,
        base_name: &str,
    ) -> Result<Vec<(String, Vec<Expression>)>> {
        let mut groups = Vec::with_capacity(tags.len());
        let mut name = base_name.to_string();

        for end in 1..=tags.len() {
            let prefix = &tags[..end];
            name.push('_');
            name.push_str(&prefix[end - 1].tag);
            groups.push((name.clone(), self.group_expression(prefix, member_type)?));
        }
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn tags(pairs: &[(&str, &str)]) -> Vec<Tag> {
        pairs.iter().map(|(s, t)| Tag::new(*s, *t)).collect()
    }

    #[test]
    fn test_single_tag_builds_bare_condition() {
        let builder = ExpressionBuilder::new();
        let expr = builder
            .group_expression(&tags(&[("Env", "prod")]), MemberType::VirtualMachine)
            .unwrap();

        assert_eq!(expr.len(), 1);
        assert_eq!(
            serde_json::to_value(&expr[0]).unwrap(),
            json!({
                "resource_type": "Condition",
                "key": "Tag",
                "member_type": "VirtualMachine",
                "operator": "EQUALS",
                "value": "Env|prod"
            })
        );
    }

    #[test]
    fn test_multiple_tags_nest_with_and() {
        let builder = ExpressionBuilder::new();
        let expr = builder
            .group_expression(
                &tags(&[("Env", "prod"), ("App", "web")]),
                MemberType::VirtualMachine,
            )
            .unwrap();

        assert_eq!(expr.len(), 1);
        let Expression::NestedExpression { expressions } = &expr[0] else {
            panic!("expected a nested expression");
        };
        assert_eq!(expressions.len(), 3);
        assert!(expressions[1].is_conjunction());
        assert_eq!(
            serde_json::to_value(&expressions[1]).unwrap(),
            json!({
                "resource_type": "ConjunctionOperator",
                "conjunction_operator": "AND"
            })
        );
    }

    #[test]
    fn test_conjunctions_sit_at_odd_indices() {
        let builder = ExpressionBuilder::new();
        let terms = builder
            .build_from_tags(
                &tags(&[("Env", "prod"), ("App", "web"), ("Tier", "gold")]),
                MemberType::VirtualMachine,
            )
            .unwrap();

        assert_eq!(terms.len(), 5);
        for (index, term) in terms.iter().enumerate() {
            assert_eq!(term.is_conjunction(), index % 2 == 1);
        }
    }

    #[test]
    fn test_term_ceiling_is_fatal() {
        let builder = ExpressionBuilder::new();
        let many = tags(&[
            ("A", "1"),
            ("B", "2"),
            ("C", "3"),
            ("D", "4"),
            ("E", "5"),
            ("F", "6"),
        ]);

        let err = builder
            .build_from_tags(&many, MemberType::VirtualMachine)
            .unwrap_err();
        assert!(err.to_string().contains("exceeds the maximum"));
    }

    #[test]
    fn test_progressive_groups_cover_prefixes() {
        let builder = ExpressionBuilder::new();
        let groups = builder
            .build_progressive(
                &tags(&[("Env", "prod"), ("App", "web"), ("Tier", "gold")]),
                MemberType::VirtualMachine,
                "SG",
            )
            .unwrap();

        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].0, "SG_prod");
        assert_eq!(groups[1].0, "SG_prod_web");
        assert_eq!(groups[2].0, "SG_prod_web_gold");

        // group i carries i + 1 conditions
        assert!(matches!(groups[0].1[0], Expression::Condition { .. }));
        for (index, (_, expr)) in groups.iter().enumerate().skip(1) {
            let Expression::NestedExpression { expressions } = &expr[0] else {
                panic!("expected a nested expression");
            };
            let conditions = expressions.iter().filter(|e| !e.is_conjunction()).count();
            assert_eq!(conditions, index + 1);
        }
    }

    #[test]
    fn test_expression_wire_names() {
        let ip = Expression::IpAddressExpression {
            ip_addresses: vec!["10.0.0.1".to_string()],
        };
        let ids = Expression::ExternalIdExpression {
            member_type: MemberType::VirtualMachine,
            external_ids: vec!["vm-1".to_string()],
        };

        assert_eq!(
            serde_json::to_value(&ip).unwrap()["resource_type"],
            "IPAddressExpression"
        );
        assert_eq!(
            serde_json::to_value(&ids).unwrap()["resource_type"],
            "ExternalIDExpression"
        );
        assert_eq!(ip.kind(), "IPAddressExpression");
        assert_eq!(ids.kind(), "ExternalIDExpression");
    }
}
