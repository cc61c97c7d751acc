//! Rules table module.
//!
//! This module handles the declarative rules input:
//! - The typed model of rows, operators, and tag scope columns
//! - Parsing the loose CSV sheet format (sentinel header, multi-tag
//!   marker row, padded records)

mod parser;
mod spec;

pub use parser::RulesParser;
pub use spec::{MatchOperator, ObjectType, RuleRow, RuleSet, ScopeColumn};
