//! Plan application module.
//!
//! Executes a plan document against the NSX manager: group and segment
//! writes, paginated tag bulk operations, dry-run previews, and the
//! filtered removal path that replays the plan's recorded inverses.

mod executor;

pub use executor::{ApplyExecutor, ApplyMode, ApplySummary, RemoveFilter, DEFAULT_PAGE_SIZE};
