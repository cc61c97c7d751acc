//! Typed model of the rules table.
//!
//! A rules file is a loose CSV sheet: a header row carrying sentinel
//! columns and tag scope columns, an optional multi-tag marker row, and
//! one data row per matching rule.

use std::fmt;

use crate::nsx::Tag;

/// Object kinds a rule row can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    /// Virtual machines, matched by display name.
    Vm,
    /// Virtual machines, matched by interface address.
    Ip,
    /// Segments, matched by display name.
    Segment,
    /// Segments reached through a Tier-0 gateway (two-level).
    Tier0,
    /// Segments reached through a Tier-1 gateway.
    Tier1,
}

impl ObjectType {
    /// Parses a cell value. Returns `None` for anything that is not a
    /// planning row (blank lines, comments, the header itself).
    #[must_use]
    pub fn parse(cell: &str) -> Option<Self> {
        match cell.trim().to_lowercase().as_str() {
            "vm" => Some(Self::Vm),
            "ip" => Some(Self::Ip),
            "segment" => Some(Self::Segment),
            "tier0" => Some(Self::Tier0),
            "tier1" => Some(Self::Tier1),
            _ => None,
        }
    }

    /// True for the gateway-backed kinds.
    #[must_use]
    pub const fn is_gateway(self) -> bool {
        matches!(self, Self::Tier0 | Self::Tier1)
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Vm => "vm",
            Self::Ip => "ip",
            Self::Segment => "segment",
            Self::Tier0 => "tier0",
            Self::Tier1 => "tier1",
        };
        write!(f, "{name}")
    }
}

/// String-matching operators for name-based selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MatchOperator {
    /// Case-insensitive equality; stops at the first hit.
    #[default]
    Exact,
    /// Name starts with the selector.
    StartsWith,
    /// Name ends with the selector.
    EndsWith,
    /// Name contains the selector.
    Contains,
}

impl MatchOperator {
    /// Parses a `Match` cell. Unrecognized or empty values fall back
    /// to exact matching.
    #[must_use]
    pub fn parse(cell: &str) -> Self {
        match cell.trim().to_lowercase().as_str() {
            "startswith" => Self::StartsWith,
            "endswith" => Self::EndsWith,
            "contains" => Self::Contains,
            _ => Self::Exact,
        }
    }
}

impl fmt::Display for MatchOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Exact => "exact",
            Self::StartsWith => "startswith",
            Self::EndsWith => "endswith",
            Self::Contains => "contains",
        };
        write!(f, "{name}")
    }
}

/// One tag scope column from the rules header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeColumn {
    /// Scope name (the header cell after the divider).
    pub name: String,
    /// Whether a VM may hold several values of this scope at once.
    pub multitag: bool,
}

/// A parsed planning rule.
#[derive(Debug, Clone)]
pub struct RuleRow {
    /// What kind of object the row selects.
    pub object_type: ObjectType,
    /// Name selector, or the IP specifier list for `ip` rows.
    pub name: String,
    /// How `name` is compared against display names.
    pub operator: MatchOperator,
    /// When set, the rule resolves to a direct VM list for tagging
    /// instead of defining an indirect group.
    pub resolve: bool,
    /// Group-name override from the `GroupName` column.
    pub group_name: Option<String>,
    /// Tag values aligned with the scope columns; `None` where empty.
    pub tag_values: Vec<Option<String>>,
    /// 1-based record number in the source file, for diagnostics.
    pub line: usize,
}

impl RuleRow {
    /// The tags this row assigns, in scope-column order, deduplicated.
    #[must_use]
    pub fn tags(&self, scopes: &[ScopeColumn]) -> Vec<Tag> {
        let mut tags = Vec::new();
        for (scope, value) in scopes.iter().zip(&self.tag_values) {
            if let Some(value) = value {
                let tag = Tag::new(&scope.name, value);
                if !tags.contains(&tag) {
                    tags.push(tag);
                }
            }
        }
        tags
    }
}

/// A fully parsed rules table.
#[derive(Debug, Clone)]
pub struct RuleSet {
    /// Tag scope columns, in header order.
    pub scopes: Vec<ScopeColumn>,
    /// Planning rows, in file order.
    pub rows: Vec<RuleRow>,
}

impl RuleSet {
    /// Number of planning rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when the table has no planning rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows targeting the given object type.
    #[must_use]
    pub fn rows_of(&self, object_type: ObjectType) -> usize {
        self.rows
            .iter()
            .filter(|r| r.object_type == object_type)
            .count()
    }
}
