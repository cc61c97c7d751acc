//! NSX API types for inventory objects and tags.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// A scope/value tag pair as understood by the NSX policy API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Tag scope (category), e.g. `Env`.
    pub scope: String,
    /// Tag value within the scope.
    pub tag: String,
}

impl Tag {
    /// Creates a tag from a scope and a value.
    #[must_use]
    pub fn new(scope: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            tag: tag.into(),
        }
    }

    /// Renders the `scope|value` form used in group membership conditions.
    #[must_use]
    pub fn condition_value(&self) -> String {
        format!("{}|{}", self.scope, self.tag)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.scope, self.tag)
    }
}

/// Appends the tags from `add` that are not already in `into`,
/// preserving first-seen order.
pub fn union_tags(into: &mut Vec<Tag>, add: &[Tag]) {
    for tag in add {
        if !into.contains(tag) {
            into.push(tag.clone());
        }
    }
}

/// A realized virtual machine from the NSX inventory.
#[derive(Debug, Clone, Deserialize)]
pub struct VirtualMachine {
    /// Stable identifier used by tag bulk operations.
    pub external_id: String,
    /// Human-readable name used by matching rules.
    pub display_name: String,
    /// Tags already present on the VM when the snapshot was taken.
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Interfaces associated at load time; not part of the wire format.
    #[serde(skip)]
    pub attachments: Vec<Vif>,
}

/// A virtual network interface from the fabric inventory.
#[derive(Debug, Clone, Deserialize)]
pub struct Vif {
    /// Identifier of the owning VM, matched against VM external ids.
    pub owner_vm_id: String,
    /// VIF identifier, used in diagnostics.
    #[serde(default)]
    pub external_id: String,
    /// Logical-port attachment id linking the VIF to a segment port.
    #[serde(default)]
    pub lport_attachment_id: Option<String>,
    /// Address records reported for the interface.
    #[serde(default)]
    pub ip_address_info: Vec<IpAddressInfo>,
}

/// One address record on a VIF. Interfaces without discovered
/// addresses omit the field entirely.
#[derive(Debug, Clone, Deserialize)]
pub struct IpAddressInfo {
    /// Addresses reported by the discovery source.
    #[serde(default)]
    pub ip_addresses: Vec<IpAddr>,
}

/// A logical L2 segment from the policy API.
///
/// Only the fields the planner reads are typed; everything else is
/// carried in `extra` so update payloads round-trip the full object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Policy path identifying the segment.
    pub path: String,
    /// Human-readable name used by matching rules.
    #[serde(default)]
    pub display_name: String,
    /// Policy path of the gateway this segment connects to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connectivity_path: Option<String>,
    /// Tags on the segment.
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Remaining fields of the full segment object.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A Tier-0 or Tier-1 gateway returned by the policy search API.
#[derive(Debug, Clone, Deserialize)]
pub struct Gateway {
    /// Policy path identifying the gateway.
    pub path: String,
    /// Human-readable name used by matching rules.
    #[serde(default)]
    pub display_name: String,
    /// Resource type reported by the search API (`Tier0` or `Tier1`).
    #[serde(default)]
    pub resource_type: String,
    /// Policy path of the parent Tier-0; present on Tier-1 gateways.
    #[serde(default)]
    pub tier0_path: Option<String>,
}

/// A logical port on a segment.
#[derive(Debug, Clone, Deserialize)]
pub struct SegmentPort {
    /// Human-readable port name, used in diagnostics.
    #[serde(default)]
    pub display_name: String,
    /// Attachment info; ports without an attachment are skipped.
    #[serde(default)]
    pub attachment: Option<PortAttachment>,
}

/// Attachment block of a segment port.
#[derive(Debug, Clone, Deserialize)]
pub struct PortAttachment {
    /// Attachment id matched against VIF `lport_attachment_id`s.
    pub id: String,
}

/// Paged list envelope shared by NSX list and search endpoints.
#[derive(Debug, Deserialize)]
pub struct ListResponse<T> {
    /// Objects in this page.
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    /// Opaque cursor for the next page; absent or empty when done.
    #[serde(default)]
    pub cursor: Option<String>,
    /// Total result count across all pages, when reported.
    #[serde(default)]
    pub result_count: Option<u64>,
}
