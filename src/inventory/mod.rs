//! Inventory snapshot module.
//!
//! This module loads the NSX inventory (VMs, VIFs, segments with their
//! ports, and gateways) into an immutable snapshot that the planner
//! works against without further I/O.

mod loader;
mod snapshot;

pub use loader::InventoryLoader;
pub use snapshot::Inventory;
