//! CLI module for the grouptag planning tool.
//!
//! This module provides the command-line interface for planning and
//! applying NSX group and tag changes.

mod commands;
mod output;

pub use commands::{Cli, Commands, OutputFormat};
pub use output::OutputFormatter;
