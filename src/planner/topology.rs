//! Gateway and segment topology resolution.
//!
//! Walks the gateway → segment → port → VIF chains of the inventory
//! snapshot to turn a rule row into the segments and VMs it targets.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::inventory::Inventory;
use crate::nsx::{Gateway, Segment, VirtualMachine};
use crate::rules::{ObjectType, RuleRow};

use super::matching::match_by_name;

/// Resolves topology chains against one inventory snapshot.
#[derive(Debug)]
pub struct TopologyResolver<'a> {
    inventory: &'a Inventory,
}

impl<'a> TopologyResolver<'a> {
    /// Creates a resolver over the snapshot.
    #[must_use]
    pub const fn new(inventory: &'a Inventory) -> Self {
        Self { inventory }
    }

    /// Resolves the segments a rule row targets.
    ///
    /// Segment rows match segments by name. Gateway rows resolve the
    /// named gateway first and collect every segment attached to it; a
    /// Tier-0 additionally pulls in the segments of its Tier-1s.
    /// Returns `None` when a named gateway resolves to nothing, which
    /// skips the row.
    #[must_use]
    pub fn resolve_segments(&self, rule: &RuleRow) -> Option<Vec<&'a Segment>> {
        match rule.object_type {
            ObjectType::Segment => Some(match_by_name(
                &self.inventory.segments,
                &rule.name,
                rule.operator,
            )),
            ObjectType::Tier0 => {
                let gateway = Self::find_gateway(&self.inventory.tier0s, rule)?;
                let mut segments = self.segments_attached_to(&gateway.path);
                for tier1 in &self.inventory.tier1s {
                    if tier1.tier0_path.as_deref() == Some(gateway.path.as_str()) {
                        segments.extend(self.segments_attached_to(&tier1.path));
                    }
                }
                Some(segments)
            }
            ObjectType::Tier1 => {
                let gateway = Self::find_gateway(&self.inventory.tier1s, rule)?;
                Some(self.segments_attached_to(&gateway.path))
            }
            ObjectType::Vm | ObjectType::Ip => Some(Vec::new()),
        }
    }

    /// Segments whose connectivity path points at the gateway.
    #[must_use]
    pub fn segments_attached_to(&self, gateway_path: &str) -> Vec<&'a Segment> {
        self.inventory
            .segments
            .iter()
            .filter(|segment| segment.connectivity_path.as_deref() == Some(gateway_path))
            .collect()
    }

    /// VMs attached to any of the segments, resolved through segment
    /// ports and VIF attachment ids. Each VM appears once, in the
    /// order its first port is encountered.
    #[must_use]
    pub fn find_attached_vms(&self, segments: &[&Segment]) -> Vec<&'a VirtualMachine> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut vms = Vec::new();

        for segment in segments {
            for port in self.inventory.ports_for(&segment.path) {
                let Some(attachment) = &port.attachment else {
                    continue;
                };

                let owner = self.inventory.virtual_machines.iter().find(|vm| {
                    vm.attachments.iter().any(|vif| {
                        vif.lport_attachment_id.as_deref() == Some(attachment.id.as_str())
                    })
                });

                match owner {
                    Some(vm) => {
                        if seen.insert(vm.external_id.as_str()) {
                            vms.push(vm);
                        }
                    }
                    None => debug!(
                        "No VM owns port '{}' on segment '{}'",
                        port.display_name, segment.display_name
                    ),
                }
            }
        }

        vms
    }

    /// First gateway matching the row's name selector.
    fn find_gateway(pool: &'a [Gateway], rule: &RuleRow) -> Option<&'a Gateway> {
        let found = match_by_name(pool, &rule.name, rule.operator).into_iter().next();
        if found.is_none() {
            warn!(
                "No {} gateway matches '{}', skipping row {}",
                rule.object_type, rule.name, rule.line
            );
        }
        found
    }
}
