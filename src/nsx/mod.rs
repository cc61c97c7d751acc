//! NSX manager API integration module.
//!
//! This module provides all functionality for talking to an NSX manager:
//! the authenticated HTTP client, cursor pagination, and the wire types
//! for the inventory objects the planner consumes.

mod client;
mod types;

pub use client::NsxClient;
pub use types::{
    union_tags, Gateway, IpAddressInfo, ListResponse, PortAttachment, Segment, SegmentPort, Tag,
    Vif, VirtualMachine,
};
