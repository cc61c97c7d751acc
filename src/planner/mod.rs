//! Planning module.
//!
//! Turns a rules table plus an inventory snapshot into a plan document:
//! object matching, topology resolution, expression building, per-scope
//! tag operation planning, and dedup of the assembled candidates.

mod assembler;
mod expression;
mod matching;
mod merge;
mod plan;
mod tag_ops;
mod topology;

pub use assembler::PlanAssembler;
pub use expression::{Expression, ExpressionBuilder, MemberType, MAX_CONDITION_TERMS};
pub use matching::{match_by_ip, match_by_name, IpSpec, NamedObject};
pub use merge::DedupMerger;
pub use plan::{
    GroupPayload, GroupSpec, Plan, ResourceIdList, ScopeOps, SegmentUpdate, TagBulkOp,
    TagRemoveOp, WriteMethod,
};
pub use tag_ops::TagOpPlanner;
pub use topology::TopologyResolver;
