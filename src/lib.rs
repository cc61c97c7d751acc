// ============================================================================
// Strict linting - Dangerous or non-idiomatic practices are forbidden
// ============================================================================

#![deny(warnings)]                    // All warnings are treated as errors
#![deny(unsafe_code)]                 // Unsafe code is forbidden
#![deny(missing_docs)]                // All public items must be documented
#![deny(dead_code)]                   // Unused code is forbidden
#![deny(non_camel_case_types)]        // Types must follow CamelCase convention

// Additional strictness - Leave nothing unchecked
#![deny(unused_imports)]              // Unused imports are forbidden
#![deny(unused_variables)]            // Unused variables are forbidden
#![deny(unused_must_use)]             // Must handle Result and Option explicitly
#![deny(non_snake_case)]              // Variables and functions must be snake_case
#![deny(non_upper_case_globals)]      // Constants must be UPPER_CASE
#![deny(nonstandard_style)]           // Non-standard code style is forbidden
#![forbid(unsafe_op_in_unsafe_fn)]    // Unsafe ops in unsafe fns are forbidden

// Clippy lints (warnings only)
#![warn(clippy::all)]                 // All standard Clippy lints
#![warn(clippy::pedantic)]            // Very strict Clippy lints
#![warn(clippy::nursery)]             // Experimental lints
#![warn(clippy::unwrap_used)]         // unwrap() warning
#![warn(clippy::expect_used)]         // expect() warning
#![warn(clippy::panic)]               // panic!() warning
#![warn(clippy::print_stdout)]        // println!() warning
#![warn(clippy::todo)]                // TODO warning
#![warn(clippy::unimplemented)]       // unimplemented!() warning
#![warn(clippy::missing_const_for_fn)] // Force const when possible
#![warn(clippy::unwrap_in_result)]    // unwrap() in Result warning
#![warn(clippy::module_inception)]    // Module with same name as crate warning
#![warn(clippy::redundant_clone)]     // Useless clones warning
#![warn(clippy::shadow_unrelated)]    // Shadowing unrelated variables warning
#![warn(clippy::too_many_arguments)]  // Limit function arguments
#![warn(clippy::cognitive_complexity)] // Limit cognitive complexity

// Safety and robustness lints
#![deny(overflowing_literals)]        // Overflowing literals are forbidden
#![deny(arithmetic_overflow)]         // Arithmetic overflow is forbidden

// ============================================================================
// Crate Documentation
// ============================================================================

//! # grouptag
//!
//! A declarative group and tag planner for VMware NSX-T inventories.
//!
//! ## Overview
//!
//! grouptag turns a CSV table of matching rules into NSX policy groups
//! and tag assignments, allowing you to:
//!
//! - Select VMs, segments, and gateways by name, pattern, or IP specifier
//! - Build tag-based, path-based, and address-based policy groups
//! - Plan tag bulk operations with exact inverses for rollback
//! - Review the full plan document before anything is written
//!
//! ## Architecture
//!
//! The system is built around a **plan/apply split**:
//!
//! 1. **Snapshot**: the inventory is fetched once from the NSX manager
//! 2. **Plan**: a pure pass over the rules produces a JSON plan document
//! 3. **Apply**: the document's writes (or their inverses) are replayed
//!
//! ## Modules
//!
//! - [`rules`]: rules CSV parsing and the typed rules model
//! - [`nsx`]: NSX manager API client and wire types
//! - [`inventory`]: inventory snapshot loading and VIF association
//! - [`planner`]: matching, topology, expressions, dedup, plan assembly
//! - [`apply`]: plan execution, pagination, dry-run, removal
//! - [`cli`]: command-line interface
//!
//! ## Example
//!
//! ```csv
//! ObjectType,Name,Match,Resolve,GroupName,_SEP_,Env,App
//! MultiVMTagScope,,,,,,,App
//! vm,web,startswith,false,,,prod,web
//! segment,dmz,exact,false,edge,,prod,
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod apply;
pub mod cli;
pub mod error;
pub mod inventory;
pub mod nsx;
pub mod planner;
pub mod rules;

// ============================================================================
// Re-exports
// ============================================================================

pub use apply::{ApplyExecutor, ApplyMode, ApplySummary, RemoveFilter};
pub use cli::{Cli, Commands, OutputFormatter};
pub use error::{GroupTagError, Result};
pub use inventory::{Inventory, InventoryLoader};
pub use nsx::NsxClient;
pub use planner::{Plan, PlanAssembler};
pub use rules::{RuleSet, RulesParser};
