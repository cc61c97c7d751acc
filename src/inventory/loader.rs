//! Inventory snapshot loader.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::error::Result;
use crate::nsx::{NsxClient, Segment};

use super::snapshot::Inventory;

/// Loads a complete inventory snapshot from an NSX manager.
///
/// The search API returns consolidated summaries, so each segment is
/// re-fetched by path to get the full object for later tag updates.
pub struct InventoryLoader<'a> {
    client: &'a NsxClient,
}

impl<'a> InventoryLoader<'a> {
    /// Creates a loader over the given client.
    #[must_use]
    pub const fn new(client: &'a NsxClient) -> Self {
        Self { client }
    }

    /// Fetches VMs, VIFs, segments with their ports, and gateways, and
    /// assembles them into a snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if any inventory call fails.
    pub async fn load(&self) -> Result<Inventory> {
        info!("Fetching inventory snapshot");

        let vms = self.client.list_virtual_machines().await?;
        debug!("Fetched {} virtual machines", vms.len());

        let vifs = self.client.list_vifs().await?;
        debug!("Fetched {} VIFs", vifs.len());

        let summaries = self.client.list_segments().await?;
        let mut segments = Vec::with_capacity(summaries.len());
        let mut segment_ports = HashMap::with_capacity(summaries.len());
        for summary in &summaries {
            let segment: Segment = self.client.get_by_path(&summary.path).await?;
            let ports = self.client.list_segment_ports(&summary.path).await?;
            segment_ports.insert(segment.path.clone(), ports);
            segments.push(segment);
        }
        debug!("Fetched {} segments with ports", segments.len());

        let tier0s = self.client.list_tier0s().await?;
        let tier1s = self.client.list_tier1s().await?;
        debug!(
            "Fetched {} Tier-0 and {} Tier-1 gateways",
            tier0s.len(),
            tier1s.len()
        );

        let mut inventory = Inventory {
            virtual_machines: vms,
            segments,
            tier0s,
            tier1s,
            segment_ports,
        };
        inventory.attach_vifs(vifs);

        info!(
            "Inventory ready: {} VMs, {} segments, {} gateways",
            inventory.virtual_machines.len(),
            inventory.segments.len(),
            inventory.tier0s.len() + inventory.tier1s.len()
        );
        Ok(inventory)
    }
}
