//! The plan document.
//!
//! A plan is the complete, serializable output of one planning run:
//! group definitions, segment tag updates, and per-scope tag bulk
//! operations, each mutation paired with the data needed to reverse it.

use std::fmt;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{GroupTagError, PlanError, Result};
use crate::nsx::{union_tags, Segment, Tag};
use crate::rules::ScopeColumn;

use super::expression::{Expression, MemberType};

/// Group collection endpoint in the default policy domain.
const GROUPS_API: &str = "/policy/api/v1/infra/domains/default/groups";

/// Policy API prefix for path-addressed objects.
const POLICY_API: &str = "/policy/api/v1";

/// Write method used when applying a plan entry. The planner only
/// emits idempotent `PATCH` writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMethod {
    /// Idempotent create-or-update.
    Patch,
}

/// A planned group create-or-update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSpec {
    /// Target URL of the group resource.
    pub url: String,
    /// Write method for the apply executor.
    pub method: WriteMethod,
    /// Request payload sent to the policy API.
    pub payload: GroupPayload,
}

/// Payload of a group write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPayload {
    /// Group display name; doubles as its id under the default domain.
    pub display_name: String,
    /// Membership expression list.
    pub expression: Vec<Expression>,
}

impl GroupSpec {
    /// Creates a group spec addressed under the default policy domain.
    #[must_use]
    pub fn new(display_name: String, expression: Vec<Expression>) -> Self {
        Self {
            url: format!("{GROUPS_API}/{display_name}"),
            method: WriteMethod::Patch,
            payload: GroupPayload {
                display_name,
                expression,
            },
        }
    }

    /// The group's display name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.payload.display_name
    }
}

/// A planned segment tag update carrying its pre-change tags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentUpdate {
    /// Target URL of the segment resource.
    pub url: String,
    /// Write method for the apply executor.
    pub method: WriteMethod,
    /// Tags on the segment before planning, for exact rollback.
    pub original_tags: Vec<Tag>,
    /// Full segment object with the updated tag list.
    pub payload: Segment,
}

impl SegmentUpdate {
    /// Creates an update adding `add_tags` to the segment's tag list.
    #[must_use]
    pub fn new(segment: &Segment, add_tags: &[Tag]) -> Self {
        let mut payload = segment.clone();
        let original_tags = segment.tags.clone();
        union_tags(&mut payload.tags, add_tags);

        Self {
            url: format!("{POLICY_API}{}", segment.path),
            method: WriteMethod::Patch,
            original_tags,
            payload,
        }
    }

    /// The segment's display name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.payload.display_name
    }
}

/// Resource-id membership list inside a tag bulk operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceIdList {
    /// Kind of the listed resources.
    pub resource_type: MemberType,
    /// External ids of the resources.
    pub resource_ids: Vec<String>,
}

/// A bulk operation attaching one tag to many resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagBulkOp {
    /// The tag to attach.
    pub tag: Tag,
    /// Membership lists the tag is applied to.
    pub apply_to: Vec<ResourceIdList>,
}

/// The inverse of a [`TagBulkOp`]: detaches the tag from the same
/// resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagRemoveOp {
    /// The tag to detach.
    pub tag: Tag,
    /// Membership lists the tag is removed from.
    pub remove_from: Vec<ResourceIdList>,
}

impl TagBulkOp {
    /// Creates the op with a single VM member.
    #[must_use]
    pub fn for_vm(tag: Tag, external_id: String) -> Self {
        Self {
            tag,
            apply_to: vec![ResourceIdList {
                resource_type: MemberType::VirtualMachine,
                resource_ids: vec![external_id],
            }],
        }
    }

    /// True when the id is already a member.
    #[must_use]
    pub fn contains(&self, external_id: &str) -> bool {
        self.apply_to
            .first()
            .is_some_and(|list| list.resource_ids.iter().any(|id| id == external_id))
    }

    /// Adds an id to the membership list.
    pub fn add_id(&mut self, external_id: String) {
        if let Some(list) = self.apply_to.first_mut() {
            list.resource_ids.push(external_id);
        }
    }

    /// Strikes an id from the membership list.
    pub fn remove_id(&mut self, external_id: &str) {
        if let Some(list) = self.apply_to.first_mut() {
            list.resource_ids.retain(|id| id != external_id);
        }
    }

    /// The member ids, empty when the op has been fully evicted.
    #[must_use]
    pub fn resource_ids(&self) -> &[String] {
        self.apply_to
            .first()
            .map_or(&[], |list| list.resource_ids.as_slice())
    }
}

impl TagRemoveOp {
    /// Creates the op with a single VM member.
    #[must_use]
    pub fn for_vm(tag: Tag, external_id: String) -> Self {
        Self {
            tag,
            remove_from: vec![ResourceIdList {
                resource_type: MemberType::VirtualMachine,
                resource_ids: vec![external_id],
            }],
        }
    }

    /// Adds an id to the membership list.
    pub fn add_id(&mut self, external_id: String) {
        if let Some(list) = self.remove_from.first_mut() {
            list.resource_ids.push(external_id);
        }
    }

    /// Strikes an id from the membership list.
    pub fn remove_id(&mut self, external_id: &str) {
        if let Some(list) = self.remove_from.first_mut() {
            list.resource_ids.retain(|id| id != external_id);
        }
    }

    /// The member ids, empty when the op has been fully evicted.
    #[must_use]
    pub fn resource_ids(&self) -> &[String] {
        self.remove_from
            .first()
            .map_or(&[], |list| list.resource_ids.as_slice())
    }
}

/// Apply and remove bulk operations for one tag scope.
///
/// `tags` and `tagsremove` are maintained in lockstep: entry *i* of one
/// mirrors entry *i* of the other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeOps {
    /// Scope name from the rules header.
    pub scope: String,
    /// Whether a VM may hold several values of this scope at once.
    pub multitag: bool,
    /// Apply operations, one per distinct tag value.
    pub tags: Vec<TagBulkOp>,
    /// Mirrored remove operations for rollback.
    pub tagsremove: Vec<TagRemoveOp>,
}

impl ScopeOps {
    /// Creates an empty op table for one scope column.
    #[must_use]
    pub fn new(column: &ScopeColumn) -> Self {
        Self {
            scope: column.name.clone(),
            multitag: column.multitag,
            tags: Vec::new(),
            tagsremove: Vec::new(),
        }
    }
}

/// The complete plan document produced by one planning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// When the plan was generated.
    pub generated_at: DateTime<Utc>,
    /// Group create-or-update specs.
    pub groups: Vec<GroupSpec>,
    /// Segment tag updates with rollback data.
    pub segments: Vec<SegmentUpdate>,
    /// Per-scope tag bulk operations, in header order.
    pub scopes: Vec<ScopeOps>,
}

impl Plan {
    /// Creates an empty plan with one op table per scope column.
    #[must_use]
    pub fn new(scopes: &[ScopeColumn]) -> Self {
        Self {
            generated_at: Utc::now(),
            groups: Vec::new(),
            segments: Vec::new(),
            scopes: scopes.iter().map(ScopeOps::new).collect(),
        }
    }

    /// True when the plan contains no work.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
            && self.segments.is_empty()
            && self.scopes.iter().all(|scope| scope.tags.is_empty())
    }

    /// Number of distinct (scope, tag) apply operations.
    #[must_use]
    pub fn tag_op_count(&self) -> usize {
        self.scopes.iter().map(|scope| scope.tags.len()).sum()
    }

    /// Serializes the plan as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| GroupTagError::internal(format!("Failed to serialize plan: {e}")))
    }

    /// Writes the plan document to a file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Loads a plan document from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is missing or does not parse.
    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PlanError::DocumentNotFound {
                path: path.to_path_buf(),
            }
            .into());
        }

        let contents = fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|e| {
            PlanError::DocumentParse {
                message: e.to_string(),
            }
            .into()
        })
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} groups, {} segment updates, {} tag operations",
            self.groups.len(),
            self.segments.len(),
            self.tag_op_count()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scope_columns() -> Vec<ScopeColumn> {
        vec![
            ScopeColumn {
                name: "Env".to_string(),
                multitag: false,
            },
            ScopeColumn {
                name: "App".to_string(),
                multitag: true,
            },
        ]
    }

    #[test]
    fn test_group_spec_addresses_default_domain() {
        let group = GroupSpec::new("SG_prod".to_string(), Vec::new());

        assert_eq!(
            group.url,
            "/policy/api/v1/infra/domains/default/groups/SG_prod"
        );
        assert_eq!(group.method, WriteMethod::Patch);
        assert_eq!(group.display_name(), "SG_prod");
    }

    #[test]
    fn test_segment_update_unions_tags_and_keeps_originals() {
        let segment: Segment = serde_json::from_value(json!({
            "path": "/infra/segments/app",
            "display_name": "app",
            "tags": [{"scope": "Owner", "tag": "team-a"}],
            "admin_state": "UP"
        }))
        .unwrap();

        let update = SegmentUpdate::new(
            &segment,
            &[Tag::new("Owner", "team-a"), Tag::new("Env", "prod")],
        );

        assert_eq!(update.url, "/policy/api/v1/infra/segments/app");
        assert_eq!(update.original_tags, vec![Tag::new("Owner", "team-a")]);
        assert_eq!(
            update.payload.tags,
            vec![Tag::new("Owner", "team-a"), Tag::new("Env", "prod")]
        );
        assert_eq!(update.payload.extra.get("admin_state"), Some(&json!("UP")));
    }

    #[test]
    fn test_bulk_op_id_membership() {
        let mut op = TagBulkOp::for_vm(Tag::new("Env", "prod"), "vm-1".to_string());

        assert!(op.contains("vm-1"));
        assert!(!op.contains("vm-2"));

        op.add_id("vm-2".to_string());
        assert_eq!(op.resource_ids(), ["vm-1", "vm-2"]);

        op.remove_id("vm-1");
        assert_eq!(op.resource_ids(), ["vm-2"]);
    }

    #[test]
    fn test_scope_ops_wire_field_names() {
        let mut scope = ScopeOps::new(&scope_columns()[0]);
        scope
            .tags
            .push(TagBulkOp::for_vm(Tag::new("Env", "prod"), "vm-1".to_string()));
        scope.tagsremove.push(TagRemoveOp::for_vm(
            Tag::new("Env", "prod"),
            "vm-1".to_string(),
        ));

        let value = serde_json::to_value(&scope).unwrap();
        assert_eq!(
            value,
            json!({
                "scope": "Env",
                "multitag": false,
                "tags": [{
                    "tag": {"scope": "Env", "tag": "prod"},
                    "apply_to": [{
                        "resource_type": "VirtualMachine",
                        "resource_ids": ["vm-1"]
                    }]
                }],
                "tagsremove": [{
                    "tag": {"scope": "Env", "tag": "prod"},
                    "remove_from": [{
                        "resource_type": "VirtualMachine",
                        "resource_ids": ["vm-1"]
                    }]
                }]
            })
        );
    }

    #[test]
    fn test_empty_plan_detection() {
        let plan = Plan::new(&scope_columns());
        assert!(plan.is_empty());
        assert_eq!(plan.tag_op_count(), 0);
        assert_eq!(plan.scopes.len(), 2);
    }

    #[test]
    fn test_plan_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");

        let mut plan = Plan::new(&scope_columns());
        plan.groups.push(GroupSpec::new(
            "SG_prod".to_string(),
            vec![Expression::tag_condition(
                &Tag::new("Env", "prod"),
                MemberType::VirtualMachine,
            )],
        ));
        plan.write_to_file(&path).unwrap();

        let loaded = Plan::load_file(&path).unwrap();
        assert_eq!(loaded.groups, plan.groups);
        assert_eq!(loaded.generated_at, plan.generated_at);
    }

    #[test]
    fn test_load_missing_plan_fails() {
        let err = Plan::load_file(Path::new("/nonexistent/plan.json")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
