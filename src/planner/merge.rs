//! Plan deduplication.
//!
//! Folds candidate descriptors into the running plan. Group candidates
//! whose expressions are equivalent to an already planned group are
//! discarded; segment updates targeting the same URL union their tags.

use tracing::{debug, info};

use crate::error::{PlanError, Result};
use crate::nsx::union_tags;

use super::expression::Expression;
use super::plan::{GroupSpec, SegmentUpdate};

/// Merges candidate plan entries into the cumulative plan.
#[derive(Debug, Default)]
pub struct DedupMerger;

impl DedupMerger {
    /// Creates a new merger.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Folds a group candidate into the list, discarding it when an
    /// existing group already carries an equivalent expression. Names
    /// are never merged: the first group planned keeps its name.
    ///
    /// # Errors
    ///
    /// Returns an error if two expressions of an uncomparable kind
    /// meet during the equivalence check.
    pub fn merge_group(&self, groups: &mut Vec<GroupSpec>, candidate: GroupSpec) -> Result<()> {
        for existing in groups.iter() {
            if Self::expressions_equivalent(
                &existing.payload.expression,
                &candidate.payload.expression,
            )? {
                info!(
                    "Group '{}' has the same membership as '{}', skipping",
                    candidate.display_name(),
                    existing.display_name()
                );
                return Ok(());
            }
        }

        groups.push(candidate);
        Ok(())
    }

    /// Folds a segment update into the list. Updates for the same
    /// target URL union their tag lists in first-seen order.
    pub fn merge_segment_update(
        &self,
        updates: &mut Vec<SegmentUpdate>,
        candidate: SegmentUpdate,
    ) {
        if let Some(existing) = updates.iter_mut().find(|u| u.url == candidate.url) {
            debug!(
                "Merging tags into existing update for segment '{}'",
                existing.display_name()
            );
            union_tags(&mut existing.payload.tags, &candidate.payload.tags);
        } else {
            updates.push(candidate);
        }
    }

    /// Compares two expression lists term by term, ignoring
    /// conjunction positions.
    fn expressions_equivalent(a: &[Expression], b: &[Expression]) -> Result<bool> {
        let left: Vec<&Expression> = a.iter().filter(|t| !t.is_conjunction()).collect();
        let right: Vec<&Expression> = b.iter().filter(|t| !t.is_conjunction()).collect();

        if left.len() != right.len() {
            return Ok(false);
        }

        for (x, y) in left.iter().zip(&right) {
            if !Self::terms_equivalent(x, y)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Typed equality for one term pair. Address and path lists
    /// compare order-insensitively; conditions compare structurally.
    fn terms_equivalent(a: &Expression, b: &Expression) -> Result<bool> {
        match (a, b) {
            (
                Expression::IpAddressExpression { ip_addresses: left },
                Expression::IpAddressExpression {
                    ip_addresses: right,
                },
            ) => Ok(Self::sorted(left) == Self::sorted(right)),
            (
                Expression::PathExpression { paths: left },
                Expression::PathExpression { paths: right },
            ) => Ok(Self::sorted(left) == Self::sorted(right)),
            (
                Expression::NestedExpression { expressions: left },
                Expression::NestedExpression { expressions: right },
            ) => Ok(Self::nested_equivalent(left, right)),
            (Expression::Condition { .. }, Expression::Condition { .. }) => Ok(a == b),
            (left, right) if left.kind() == right.kind() => {
                Err(PlanError::UnsupportedComparison {
                    kind: left.kind().to_string(),
                }
                .into())
            }
            _ => Ok(false),
        }
    }

    /// Inner terms of two nested expressions, sorted by condition
    /// value, must match pairwise.
    fn nested_equivalent(a: &[Expression], b: &[Expression]) -> bool {
        let mut left: Vec<&Expression> = a.iter().filter(|t| !t.is_conjunction()).collect();
        let mut right: Vec<&Expression> = b.iter().filter(|t| !t.is_conjunction()).collect();

        if left.len() != right.len() {
            return false;
        }

        left.sort_by(|x, y| Self::condition_value(x).cmp(Self::condition_value(y)));
        right.sort_by(|x, y| Self::condition_value(x).cmp(Self::condition_value(y)));

        left.iter().zip(&right).all(|(x, y)| x == y)
    }

    fn condition_value(term: &Expression) -> &str {
        match term {
            Expression::Condition { value, .. } => value,
            _ => "",
        }
    }

    fn sorted(values: &[String]) -> Vec<String> {
        let mut sorted = values.to_vec();
        sorted.sort();
        sorted
    }
}
