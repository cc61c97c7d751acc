//! In-memory inventory snapshot.

use std::collections::HashMap;

use tracing::{info, warn};

use crate::nsx::{Gateway, Segment, SegmentPort, Vif, VirtualMachine};

/// Read-only snapshot of the NSX inventory used for one planning run.
///
/// All planning is a pure function of this snapshot plus the rules
/// table; nothing is fetched while a plan is being assembled.
#[derive(Debug, Default)]
pub struct Inventory {
    /// Realized virtual machines, with their VIFs associated.
    pub virtual_machines: Vec<VirtualMachine>,
    /// Full segment objects.
    pub segments: Vec<Segment>,
    /// Tier-0 gateways.
    pub tier0s: Vec<Gateway>,
    /// Tier-1 gateways.
    pub tier1s: Vec<Gateway>,
    /// Logical ports keyed by segment path.
    pub segment_ports: HashMap<String, Vec<SegmentPort>>,
}

impl Inventory {
    /// Associates fabric VIFs with their owning VMs by matching
    /// `owner_vm_id` against VM external ids. VIFs whose owner is not
    /// in the snapshot are dropped with a warning.
    pub fn attach_vifs(&mut self, vifs: Vec<Vif>) {
        info!(
            "Associating {} VIFs with {} VMs",
            vifs.len(),
            self.virtual_machines.len()
        );

        for vif in vifs {
            match self
                .virtual_machines
                .iter_mut()
                .find(|vm| vm.external_id == vif.owner_vm_id)
            {
                Some(vm) => vm.attachments.push(vif),
                None => warn!(
                    "VIF {} owned by VM {} not found in inventory",
                    vif.external_id, vif.owner_vm_id
                ),
            }
        }
    }

    /// Ports of a segment, empty for unknown paths.
    #[must_use]
    pub fn ports_for(&self, segment_path: &str) -> &[SegmentPort] {
        self.segment_ports
            .get(segment_path)
            .map_or(&[], Vec::as_slice)
    }
}
