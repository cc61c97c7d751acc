//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying plans,
//! rules summaries, and apply results in text or JSON form.

use colored::Colorize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::apply::ApplySummary;
use crate::planner::{Expression, GroupSpec, Plan};
use crate::rules::{ObjectType, RuleSet};

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Scope row for table display.
#[derive(Tabled)]
struct ScopeRow {
    #[tabled(rename = "Scope")]
    scope: String,
    #[tabled(rename = "Multitag")]
    multitag: &'static str,
    #[tabled(rename = "Tags")]
    tags: usize,
    #[tabled(rename = "VMs")]
    vms: usize,
}

/// Group row for table display.
#[derive(Tabled)]
struct GroupRow {
    #[tabled(rename = "Group")]
    name: String,
    #[tabled(rename = "Kind")]
    kind: &'static str,
    #[tabled(rename = "Terms")]
    terms: usize,
}

/// Rule-count row for table display.
#[derive(Tabled)]
struct RuleCountRow {
    #[tabled(rename = "ObjectType")]
    object_type: String,
    #[tabled(rename = "Rows")]
    rows: usize,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &Plan, detailed: bool) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&PlanJson::from(plan)).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_plan_text(plan, detailed),
        }
    }

    /// Formats a plan as text.
    fn format_plan_text(plan: &Plan, detailed: bool) -> String {
        if plan.is_empty() {
            return format!(
                "{} Nothing to plan - no rule matched an inventory object.\n",
                "✓".green()
            );
        }

        let mut output = String::new();

        let _ = write!(
            output,
            "\n📋 Group/Tag Plan\n   Generated: {}\n\n",
            plan.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
        );

        let scope_rows: Vec<ScopeRow> = plan
            .scopes
            .iter()
            .map(|scope| ScopeRow {
                scope: scope.scope.clone(),
                multitag: if scope.multitag { "yes" } else { "no" },
                tags: scope.tags.len(),
                vms: scope.tags.iter().map(|op| op.resource_ids().len()).sum(),
            })
            .collect();

        if !scope_rows.is_empty() {
            let table = Table::new(scope_rows).to_string();
            output.push_str(&table);
            output.push('\n');
        }

        if detailed {
            let group_rows: Vec<GroupRow> = plan
                .groups
                .iter()
                .map(|group| GroupRow {
                    name: group.display_name().to_string(),
                    kind: Self::group_kind(group),
                    terms: Self::term_count(&group.payload.expression),
                })
                .collect();

            if !group_rows.is_empty() {
                output.push('\n');
                let table = Table::new(group_rows).to_string();
                output.push_str(&table);
                output.push('\n');
            }

            for update in &plan.segments {
                let _ = writeln!(
                    output,
                    "   ~ segment '{}' ({} tags)",
                    update.display_name(),
                    update.payload.tags.len()
                );
            }
        }

        let _ = write!(
            output,
            "\nPlan: {} groups, {} segment updates, {} tag operations\n",
            plan.groups.len().to_string().green(),
            plan.segments.len().to_string().yellow(),
            plan.tag_op_count().to_string().cyan()
        );

        output
    }

    /// Formats a parsed rules table for display.
    #[must_use]
    pub fn format_rules(&self, rules: &RuleSet) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&RulesJson::from(rules)).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_rules_text(rules),
        }
    }

    /// Formats a rules summary as text.
    fn format_rules_text(rules: &RuleSet) -> String {
        let mut output = String::new();

        let _ = write!(output, "\n📄 {} planning rows\n\n", rules.len());

        let count_rows: Vec<RuleCountRow> = [
            ObjectType::Vm,
            ObjectType::Ip,
            ObjectType::Segment,
            ObjectType::Tier0,
            ObjectType::Tier1,
        ]
        .into_iter()
        .map(|object_type| RuleCountRow {
            object_type: object_type.to_string(),
            rows: rules.rows_of(object_type),
        })
        .collect();

        let table = Table::new(count_rows).to_string();
        output.push_str(&table);
        output.push('\n');

        if rules.scopes.is_empty() {
            output.push_str("\nNo tag scope columns.\n");
        } else {
            output.push_str("\nTag scopes:\n");
            for scope in &rules.scopes {
                let cardinality = if scope.multitag {
                    "multiple values".yellow().to_string()
                } else {
                    "single value".to_string()
                };
                let _ = writeln!(output, "   {} ({cardinality})", scope.name);
            }
        }

        output
    }

    /// Formats an apply summary for display.
    #[must_use]
    pub fn format_summary(&self, summary: &ApplySummary) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(summary).unwrap_or_default(),
            OutputFormat::Text => {
                let mark = if summary.dry_run {
                    "○".yellow()
                } else {
                    "✓".green()
                };
                format!("{mark} {summary}\n")
            }
        }
    }

    /// The display label for a group's expression kind.
    fn group_kind(group: &GroupSpec) -> &'static str {
        group
            .payload
            .expression
            .first()
            .map_or("empty", Expression::kind)
    }

    /// Non-conjunction terms in an expression, nested terms included.
    fn term_count(expression: &[Expression]) -> usize {
        expression
            .iter()
            .map(|term| match term {
                Expression::NestedExpression { expressions } => Self::term_count(expressions),
                Expression::ConjunctionOperator { .. } => 0,
                _ => 1,
            })
            .sum()
    }
}

// JSON serialization helpers

#[derive(serde::Serialize)]
struct PlanJson {
    generated_at: String,
    groups: usize,
    segments: usize,
    tag_operations: usize,
    scopes: Vec<ScopeJson>,
}

#[derive(serde::Serialize)]
struct ScopeJson {
    scope: String,
    multitag: bool,
    tags: usize,
    vms: usize,
}

impl From<&Plan> for PlanJson {
    fn from(plan: &Plan) -> Self {
        Self {
            generated_at: plan.generated_at.to_rfc3339(),
            groups: plan.groups.len(),
            segments: plan.segments.len(),
            tag_operations: plan.tag_op_count(),
            scopes: plan
                .scopes
                .iter()
                .map(|scope| ScopeJson {
                    scope: scope.scope.clone(),
                    multitag: scope.multitag,
                    tags: scope.tags.len(),
                    vms: scope.tags.iter().map(|op| op.resource_ids().len()).sum(),
                })
                .collect(),
        }
    }
}

#[derive(serde::Serialize)]
struct RulesJson {
    rows: usize,
    vm: usize,
    ip: usize,
    segment: usize,
    tier0: usize,
    tier1: usize,
    scopes: Vec<ScopeColumnJson>,
}

#[derive(serde::Serialize)]
struct ScopeColumnJson {
    name: String,
    multitag: bool,
}

impl From<&RuleSet> for RulesJson {
    fn from(rules: &RuleSet) -> Self {
        Self {
            rows: rules.len(),
            vm: rules.rows_of(ObjectType::Vm),
            ip: rules.rows_of(ObjectType::Ip),
            segment: rules.rows_of(ObjectType::Segment),
            tier0: rules.rows_of(ObjectType::Tier0),
            tier1: rules.rows_of(ObjectType::Tier1),
            scopes: rules
                .scopes
                .iter()
                .map(|scope| ScopeColumnJson {
                    name: scope.name.clone(),
                    multitag: scope.multitag,
                })
                .collect(),
        }
    }
}
