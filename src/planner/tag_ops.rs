//! Per-scope tag operation planning.
//!
//! Fills the plan's scope tables with mirrored apply/remove bulk
//! operations, enforcing single-value-per-scope exclusivity for scopes
//! not flagged as multitag.

use tracing::{info, warn};

use crate::nsx::{Tag, VirtualMachine};

use super::plan::{ScopeOps, TagBulkOp, TagRemoveOp};

/// Plans tag bulk operations against the per-scope op tables.
#[derive(Debug, Default)]
pub struct TagOpPlanner;

impl TagOpPlanner {
    /// Creates a new planner.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Plans every (VM, tag) pair into the matching scope table.
    ///
    /// Tags whose scope has no table entry are skipped with a warning;
    /// they cannot arise from a well-formed rules file.
    pub fn plan_vm_tags(&self, scopes: &mut [ScopeOps], vms: &[&VirtualMachine], tags: &[Tag]) {
        for tag in tags {
            let Some(scope) = scopes.iter_mut().find(|s| s.scope == tag.scope) else {
                warn!("No scope table entry for '{}', skipping tag {tag}", tag.scope);
                continue;
            };

            for vm in vms {
                Self::plan_one(scope, vm, tag);
            }
        }
    }

    /// Plans one (VM, tag) pair.
    ///
    /// For a single-value scope the VM is first evicted from every
    /// other planned value. The pair is then skipped when the VM's
    /// inventory tags already settle the outcome: the exact tag is
    /// already present, or a single-value scope already carries a
    /// different value.
    fn plan_one(scope: &mut ScopeOps, vm: &VirtualMachine, tag: &Tag) {
        let mut target = None;
        for index in 0..scope.tags.len() {
            if scope.tags[index].tag == *tag {
                target = Some(index);
            } else if !scope.multitag && scope.tags[index].contains(&vm.external_id) {
                warn!(
                    "Evicting VM '{}' from tag {}: scope '{}' takes a single value and '{}' is newer",
                    vm.display_name, scope.tags[index].tag, scope.scope, tag.tag
                );
                scope.tags[index].remove_id(&vm.external_id);
                scope.tagsremove[index].remove_id(&vm.external_id);
            }
        }

        if vm.tags.contains(tag) {
            info!(
                "VM '{}' already carries tag {tag}, skipping",
                vm.display_name
            );
            return;
        }

        if !scope.multitag
            && vm
                .tags
                .iter()
                .any(|t| t.scope == tag.scope && t.tag != tag.tag)
        {
            info!(
                "VM '{}' already holds a '{}' tag, keeping the existing value",
                vm.display_name, scope.scope
            );
            return;
        }

        match target {
            Some(index) => {
                if !scope.tags[index].contains(&vm.external_id) {
                    scope.tags[index].add_id(vm.external_id.clone());
                    scope.tagsremove[index].add_id(vm.external_id.clone());
                }
            }
            None => {
                scope
                    .tags
                    .push(TagBulkOp::for_vm(tag.clone(), vm.external_id.clone()));
                scope
                    .tagsremove
                    .push(TagRemoveOp::for_vm(tag.clone(), vm.external_id.clone()));
            }
        }
    }
}
