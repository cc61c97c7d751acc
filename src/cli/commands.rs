//! CLI command definitions.
//!
//! This module defines all CLI commands and their arguments using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::apply::{ApplyMode, DEFAULT_PAGE_SIZE};

/// grouptag - declarative group and tag planner for NSX-T.
#[derive(Parser, Debug)]
#[command(name = "grouptag")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// NSX manager hostname or base URL.
    #[arg(short, long, global = true, env = "GROUPTAG_NSX_MANAGER")]
    pub manager: Option<String>,

    /// NSX API user.
    #[arg(
        short,
        long,
        global = true,
        env = "GROUPTAG_NSX_USER",
        default_value = "admin"
    )]
    pub user: String,

    /// NSX API password; prompted for when absent.
    #[arg(
        short,
        long,
        global = true,
        env = "GROUPTAG_NSX_PASSWORD",
        hide_env_values = true
    )]
    pub password: Option<String>,

    /// Skip TLS certificate validation (self-signed managers).
    #[arg(short = 'k', long, global = true)]
    pub insecure: bool,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a starter rules file.
    Init {
        /// Destination path for the rules file.
        #[arg(default_value = "rules.csv")]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },

    /// Parse a rules file offline and show what it contains.
    Validate {
        /// Path to the rules CSV.
        #[arg(short, long)]
        rules: PathBuf,
    },

    /// Fetch the inventory and assemble a plan document.
    Plan {
        /// Path to the rules CSV.
        #[arg(short, long)]
        rules: PathBuf,

        /// Where to write the plan document.
        #[arg(short = 'o', long, default_value = "plan.json")]
        output_file: PathBuf,

        /// Show the full group and scope tables.
        #[arg(short, long)]
        detailed: bool,
    },

    /// Apply a previously written plan document, or reverse it.
    Apply {
        /// Path to the plan document.
        #[arg(long, default_value = "plan.json")]
        plan: PathBuf,

        /// Which plan collections to touch.
        #[arg(long, value_enum, default_value = "all")]
        mode: ApplyMode,

        /// Reverse the plan instead of applying it.
        #[arg(long)]
        remove: bool,

        /// Allow-list CSV restricting removal targets.
        #[arg(long, requires = "remove")]
        filter: Option<PathBuf>,

        /// Log every call without sending anything.
        #[arg(long)]
        dry_run: bool,

        /// Resource ids per tag-operation request.
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: usize,

        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },
}

/// Output format options.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

impl Cli {
    /// Parses CLI arguments from the command line.
    #[must_use]
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_plan_command() {
        let cli = Cli::try_parse_from([
            "grouptag",
            "--manager",
            "nsx.example.com",
            "plan",
            "--rules",
            "rules.csv",
        ])
        .unwrap();

        assert_eq!(cli.manager.as_deref(), Some("nsx.example.com"));
        assert_eq!(cli.user, "admin");
        match cli.command {
            Commands::Plan { rules, output_file, detailed } => {
                assert_eq!(rules, PathBuf::from("rules.csv"));
                assert_eq!(output_file, PathBuf::from("plan.json"));
                assert!(!detailed);
            }
            _ => panic!("expected plan command"),
        }
    }

    #[test]
    fn test_apply_filter_requires_remove() {
        let result = Cli::try_parse_from(["grouptag", "apply", "--filter", "allow.csv"]);
        assert!(result.is_err());

        let cli = Cli::try_parse_from([
            "grouptag",
            "apply",
            "--remove",
            "--filter",
            "allow.csv",
        ])
        .unwrap();
        match cli.command {
            Commands::Apply { remove, filter, mode, page_size, .. } => {
                assert!(remove);
                assert_eq!(filter, Some(PathBuf::from("allow.csv")));
                assert_eq!(mode, ApplyMode::All);
                assert_eq!(page_size, DEFAULT_PAGE_SIZE);
            }
            _ => panic!("expected apply command"),
        }
    }
}
