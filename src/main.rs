//! grouptag CLI entrypoint.
//!
//! Parses command-line arguments, sets up logging and the async runtime,
//! then dispatches to the subcommand handlers.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use dialoguer::Password;
use grouptag::apply::{ApplyExecutor, ApplyMode, RemoveFilter};
use grouptag::cli::{Cli, Commands, OutputFormatter};
use grouptag::error::{GroupTagError, NsxError, Result};
use grouptag::inventory::InventoryLoader;
use grouptag::nsx::NsxClient;
use grouptag::planner::{Plan, PlanAssembler};
use grouptag::rules::RulesParser;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    // Load .env before parsing: clap fills `env =` arguments from the
    // process environment at parse time.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    init_logging(cli.verbose);

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Initializes the logging system.
///
/// `--verbose` forces debug level, otherwise `RUST_LOG` is honored with an
/// `info` fallback. Diagnostics go to stderr so that plan and summary output
/// on stdout stays machine-readable.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Runs the requested subcommand.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Validate { rules } => cmd_validate(&rules, &formatter),
        Commands::Plan {
            rules,
            output_file,
            detailed,
        } => {
            let client = connect(cli.manager.as_deref(), &cli.user, cli.password, cli.insecure)?;
            cmd_plan(&client, &rules, &output_file, detailed, &formatter).await
        }
        Commands::Apply {
            plan,
            mode,
            remove,
            filter,
            dry_run,
            page_size,
            yes,
        } => {
            let client = connect(cli.manager.as_deref(), &cli.user, cli.password, cli.insecure)?;
            let args = ApplyArgs {
                plan,
                mode,
                remove,
                filter,
                dry_run,
                page_size,
                yes,
            };
            cmd_apply(&client, args, &formatter).await
        }
    }
}

/// Options collected from the `apply` subcommand.
struct ApplyArgs {
    plan: PathBuf,
    mode: ApplyMode,
    remove: bool,
    filter: Option<PathBuf>,
    dry_run: bool,
    page_size: usize,
    yes: bool,
}

/// Handles the `init` command.
fn cmd_init(path: &Path, force: bool) -> Result<()> {
    info!("Writing starter rules file to: {}", path.display());

    if !force && path.exists() {
        eprintln!("Rules file already exists: {}", path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, include_str!("../templates/rules.csv"))?;
    eprintln!("Created: {}", path.display());

    let env_path = path.with_file_name(".env.example");
    if force || !env_path.exists() {
        std::fs::write(&env_path, include_str!("../templates/.env.example"))?;
        eprintln!("Created: {}", env_path.display());
    }

    eprintln!("\nNext steps:");
    eprintln!("  1. Copy .env.example to .env and fill in the manager address");
    eprintln!("  2. Edit {} with your matching rules", path.display());
    eprintln!(
        "  3. Run 'grouptag validate --rules {}' to check the table",
        path.display()
    );
    eprintln!(
        "  4. Run 'grouptag plan --rules {}' to build a plan document",
        path.display()
    );
    eprintln!("  5. Run 'grouptag apply' to write the plan to the manager");

    Ok(())
}

/// Handles the `validate` command.
fn cmd_validate(rules_path: &Path, formatter: &OutputFormatter) -> Result<()> {
    info!("Validating rules file: {}", rules_path.display());

    let parser = RulesParser::new();
    let rules = parser.load_file(rules_path)?;

    println!("{}", formatter.format_rules(&rules));
    Ok(())
}

/// Handles the `plan` command.
async fn cmd_plan(
    client: &NsxClient,
    rules_path: &Path,
    output_file: &Path,
    detailed: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let parser = RulesParser::new();
    let rules = parser.load_file(rules_path)?;
    if rules.is_empty() {
        eprintln!("No planning rows in {}, nothing to do.", rules_path.display());
        return Ok(());
    }

    let loader = InventoryLoader::new(client);
    let inventory = loader.load().await?;

    let assembler = PlanAssembler::new(&inventory);
    let plan = assembler.assemble(&rules)?;

    plan.write_to_file(output_file)?;
    info!("Plan document written to {}", output_file.display());

    println!("{}", formatter.format_plan(&plan, detailed));
    Ok(())
}

/// Handles the `apply` command.
async fn cmd_apply(client: &NsxClient, args: ApplyArgs, formatter: &OutputFormatter) -> Result<()> {
    let plan = Plan::load_file(&args.plan)?;
    if plan.is_empty() {
        eprintln!("Plan {} is empty, nothing to do.", args.plan.display());
        return Ok(());
    }

    let action = if args.remove { "remove" } else { "apply" };
    eprintln!("Loaded plan from {}: {plan}", args.plan.display());

    if !args.yes && !args.dry_run {
        eprint!("Do you want to {action} this plan? [y/N]: ");
        std::io::stderr().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            eprintln!("Cancelled.");
            return Ok(());
        }
    }

    let executor = ApplyExecutor::new(client)
        .with_page_size(args.page_size)
        .with_dry_run(args.dry_run);

    let summary = if args.remove {
        let filter = match &args.filter {
            Some(path) => {
                let mut filter = RemoveFilter::load_file(path)?;
                filter.resolve_vm_ids(client).await?;
                Some(filter)
            }
            None => None,
        };
        executor.remove(&plan, args.mode, filter.as_ref()).await?
    } else {
        executor.apply(&plan, args.mode).await?
    };

    println!("{}", formatter.format_summary(&summary));
    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Creates an NSX client from the connection arguments, prompting for the
/// password when neither the flag nor the environment provided one.
fn connect(
    manager: Option<&str>,
    user: &str,
    password: Option<String>,
    insecure: bool,
) -> Result<NsxClient> {
    let Some(manager) = manager else {
        return Err(GroupTagError::Nsx(NsxError::ManagerNotConfigured));
    };

    let password = match password {
        Some(password) => password,
        None => Password::new()
            .with_prompt(format!("Password for {user}@{manager}"))
            .interact()
            .map_err(|e| GroupTagError::internal(format!("Failed to read password: {e}")))?,
    };

    NsxClient::new(manager, user, &password, insecure)
}
