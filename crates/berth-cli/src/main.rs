//! Berth - addon resolution and secret distribution
//!
//! Usage:
//!   berth plan                  # Show the ordered deployment plan
//!   berth secrets report        # Show merged secrets and their layers
//!   berth secrets distribute    # Push secrets to every configured target
//!   berth labels host           # Labels for a runner registration
//!   berth guard verify <proj>   # Check the owning-project marker
//!   berth state show            # Show the instance lifecycle ledger

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::style;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use berth_core::catalog::AddonCatalog;
use berth_core::config::ProjectDocument;
use berth_core::context::AppContext;
use berth_core::distribute::DistributionReport;
use berth_core::instance::InstanceOrigin;
use berth_core::lifecycle::LifecycleDocument;
use berth_core::pipeline::{Pipeline, PipelineOutput, default_distributor, http_bindings};
use berth_core::runner::{LabelRouter, ORCHESTRATION_ROLE, ProjectMarker};
use berth_core::secrets::MergedBundle;
use berth_core::types::InstanceRef;

#[derive(Parser)]
#[command(name = "berth")]
#[command(about = "Addon resolution and secret distribution", long_about = None)]
struct Cli {
    /// Project root containing berth.toml
    #[arg(long, short = 'C', global = true, default_value = ".")]
    project_dir: PathBuf,

    /// Override the per-project state directory
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve and render the deployment plan
    Plan {
        /// Print the rendered deployment (secrets redacted)
        #[arg(long)]
        json: bool,
    },

    /// Inspect or distribute secrets
    Secrets(SecretsArgs),

    /// Compute runner labels
    Labels(LabelsArgs),

    /// Manage the owning-project marker on an execution host
    Guard(GuardArgs),

    /// Inspect or edit the instance lifecycle ledger
    State(StateArgs),
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
    /// Only show problems (non-zero exit if any)
    Quiet,
}

#[derive(Args)]
struct SecretsArgs {
    #[command(subcommand)]
    command: SecretsSubcommand,
}

#[derive(Subcommand)]
enum SecretsSubcommand {
    /// Show every merged key, the layer that won, and blank keys
    Report {
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Resolve the project, then push secrets to every target
    Distribute {
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,

        /// Forget previous deliveries and rewrite every key
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args)]
struct LabelsArgs {
    #[command(subcommand)]
    command: LabelsSubcommand,
}

#[derive(Subcommand)]
enum LabelsSubcommand {
    /// Labels a runner host registers with
    Host {
        /// VM role (defaults to the project's role)
        #[arg(long)]
        role: Option<String>,
    },

    /// Labels a job targets
    Job {
        /// VM role (defaults to the project's role)
        #[arg(long)]
        role: Option<String>,

        /// Target the shared orchestration runner
        #[arg(long, conflicts_with = "role")]
        orchestration: bool,
    },
}

#[derive(Args)]
struct GuardArgs {
    /// Marker location (defaults to [runner].marker_path or /etc/berth/project)
    #[arg(long)]
    marker: Option<PathBuf>,

    #[command(subcommand)]
    command: GuardSubcommand,
}

#[derive(Subcommand)]
enum GuardSubcommand {
    /// Record this project as the host's owner
    Register {
        /// Overwrite a marker owned by another project
        #[arg(long, short)]
        force: bool,
    },

    /// Fail unless the host belongs to the given project
    Verify {
        /// Project the job belongs to
        project: String,
    },
}

#[derive(Args)]
struct StateArgs {
    #[command(subcommand)]
    command: StateSubcommand,
}

#[derive(Subcommand)]
enum StateSubcommand {
    /// Show every tracked instance and its state
    Show {
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Mark every planned instance as deployed
    Deployed,

    /// Remove an instance that is no longer configured
    Teardown {
        /// Instance to remove, `category.instance`
        instance: InstanceRef,
    },
}

fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "berth=debug,info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let ctx = build_context(&cli)?;

    match cli.command {
        Commands::Plan { json } => run_plan(&ctx, json),
        Commands::Secrets(args) => match args.command {
            SecretsSubcommand::Report { format } => run_secrets_report(&ctx, format),
            SecretsSubcommand::Distribute { format, force } => run_distribute(&ctx, format, force),
        },
        Commands::Labels(args) => run_labels(&ctx, args.command),
        Commands::Guard(args) => run_guard(&ctx, args),
        Commands::State(args) => run_state(&ctx, args.command),
    }
}

fn build_context(cli: &Cli) -> Result<AppContext> {
    let root = cli
        .project_dir
        .canonicalize()
        .with_context(|| format!("Project directory not found: {}", cli.project_dir.display()))?;
    let ctx = match &cli.state_dir {
        Some(state_dir) => AppContext::new(root, state_dir.clone()),
        None => AppContext::for_project(root)?,
    };
    Ok(ctx)
}

fn load(ctx: &AppContext, catalog: &AddonCatalog) -> Result<ProjectDocument> {
    Ok(Pipeline::new(ctx, catalog).load()?)
}

fn run_plan(ctx: &AppContext, json: bool) -> Result<()> {
    let catalog = AddonCatalog::builtin()?;
    let pipeline = Pipeline::new(ctx, &catalog);
    let doc = load(ctx, &catalog)?;
    let output = pipeline.run(&doc)?;

    if json {
        println!("{}", output.deployment.redacted().to_json()?);
    } else {
        print_plan(&output);
    }
    Ok(())
}

fn print_plan(output: &PipelineOutput) {
    println!("Project: {}", output.deployment.project);
    println!();
    println!(
        "  {:<4} {:<24} {:<12} {:<10} {:<8} Origin",
        "#", "Instance", "Type", "Version", "Plan"
    );
    println!("  {}", "-".repeat(72));

    for (index, instance) in output.deployment.instances.iter().enumerate() {
        let origin = match &instance.origin {
            InstanceOrigin::Declared => "declared".to_string(),
            InstanceOrigin::Required { by } => format!("required by {}", by),
            InstanceOrigin::Infrastructure => "infrastructure".to_string(),
        };
        println!(
            "  {:<4} {:<24} {:<12} {:<10} {:<8} {}",
            index + 1,
            truncate(&instance.key.to_string(), 24),
            truncate(&instance.addon_type, 12),
            instance.version.as_deref().unwrap_or("-"),
            instance.plan,
            origin
        );
    }

    if !output.deployment.apps.is_empty() {
        println!();
        println!("Applications ({}):", output.deployment.apps.len());
        for app in &output.deployment.apps {
            println!("  {}", style(&app.app).bold());
            for binding in &app.bindings {
                let access = if binding.readonly_credentials {
                    " (readonly)"
                } else {
                    ""
                };
                println!(
                    "    {}_* <- {}{} [{} vars]",
                    binding.alias,
                    binding.addon_ref,
                    access,
                    binding.variables.len()
                );
            }
        }
    }

    if !output.orphans.is_empty() {
        println!();
        println!(
            "{} Deployed but no longer configured (run 'berth state teardown <instance>'):",
            style("⚠").yellow()
        );
        for orphan in &output.orphans {
            println!("  {}", orphan);
        }
    }

    println!();
    println!("Summary: {} instances", output.plan.len());
}

fn run_secrets_report(ctx: &AppContext, format: OutputFormat) -> Result<()> {
    let catalog = AddonCatalog::builtin()?;
    let bundle = Pipeline::new(ctx, &catalog).secret_bundle()?;

    match format {
        OutputFormat::Table => print_bundle(&bundle),
        OutputFormat::Json => {
            let entries: Vec<_> = bundle
                .entries()
                .iter()
                .map(|(key, entry)| {
                    serde_json::json!({
                        "key": key,
                        "tier": entry.tier.to_string(),
                        "skip": entry.skip,
                    })
                })
                .collect();
            let output = serde_json::json!({
                "version": 1,
                "secrets": entries,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Quiet => {
            for key in bundle.skipped() {
                println!("{} {} is blank and will not be distributed", style("•").dim(), key);
            }
        }
    }
    Ok(())
}

fn print_bundle(bundle: &MergedBundle) {
    if bundle.is_empty() {
        println!("No secrets found.");
        return;
    }

    println!("  {:<40} {:<16} Status", "Key", "Layer");
    println!("  {}", "-".repeat(66));
    for (key, entry) in bundle.entries() {
        let status = if entry.skip {
            style("skip (blank)").dim().to_string()
        } else {
            style("ok").green().to_string()
        };
        println!(
            "  {:<40} {:<16} {}",
            truncate(key, 40),
            entry.tier.to_string(),
            status
        );
    }
    println!();
    println!(
        "Summary: {} keys, {} skipped",
        bundle.len(),
        bundle.skipped().len()
    );
}

fn run_distribute(ctx: &AppContext, format: OutputFormat, force: bool) -> Result<()> {
    let catalog = AddonCatalog::builtin()?;
    let pipeline = Pipeline::new(ctx, &catalog);
    let doc = load(ctx, &catalog)?;
    let distributor = default_distributor(ctx, &doc.config)?;
    let bindings = http_bindings(&doc.config)?;

    if bindings.is_empty() {
        println!("No distribution targets configured.");
        return Ok(());
    }
    if force {
        let forgotten = ctx
            .distribution_ledger()
            .forget(bindings.iter().map(|b| &b.target))?;
        tracing::info!(targets = forgotten, "Forced full redistribution");
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    let report = runtime.block_on(async {
        let cancel = CancellationToken::new();
        let watcher = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupted, finishing in-flight writes");
                watcher.cancel();
            }
        });
        pipeline
            .distribute(&doc, &distributor, &bindings, &cancel)
            .await
    })?;

    match format {
        OutputFormat::Table => print_distribution(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Quiet => {
            for failure in report.failures() {
                println!("{} {}", style("✗").red(), failure);
            }
        }
    }

    report.into_result()?;
    Ok(())
}

fn print_distribution(report: &DistributionReport) {
    for target in &report.targets {
        let symbol = if target.is_success() {
            style("✓").green()
        } else {
            style("✗").red()
        };
        println!(
            "{} {} ({}): {} written, {} unchanged, {} skipped",
            symbol,
            target.target,
            target.kind,
            target.written.len(),
            target.unchanged.len(),
            target.skipped.len()
        );
        for failure in &target.failures {
            println!("    {} {}: {}", style("✗").red(), failure.key, failure.reason);
        }
        if !target.incomplete.is_empty() {
            println!("    ⚠ {} keys not attempted", target.incomplete.len());
        }
    }
    if report.cancelled {
        println!();
        println!("Run interrupted; rerun to finish the remaining keys.");
    }
}

fn run_labels(ctx: &AppContext, command: LabelsSubcommand) -> Result<()> {
    let catalog = AddonCatalog::builtin()?;
    let doc = load(ctx, &catalog)?;
    let router = LabelRouter::from_config(&doc.config)?;
    let default_role = doc.config.project.role.as_str();

    let labels = match command {
        LabelsSubcommand::Host { role } => {
            router.host_labels(role.as_deref().unwrap_or(default_role))?
        }
        LabelsSubcommand::Job {
            role,
            orchestration,
        } => {
            let role = if orchestration {
                ORCHESTRATION_ROLE
            } else {
                role.as_deref().unwrap_or(default_role)
            };
            router.job_labels(role)?
        }
    };
    println!("{}", labels);
    Ok(())
}

fn run_guard(ctx: &AppContext, args: GuardArgs) -> Result<()> {
    let catalog = AddonCatalog::builtin()?;
    let doc = load(ctx, &catalog)?;
    let marker = match args.marker.or_else(|| doc.config.runner.marker_path.clone()) {
        Some(path) => ProjectMarker::new(path),
        None => ProjectMarker::default(),
    };

    match args.command {
        GuardSubcommand::Register { force } => {
            marker.register(&doc.config.project.name, force)?;
            println!(
                "{} Registered host to project '{}' ({})",
                style("✓").green(),
                doc.config.project.name,
                marker.path().display()
            );
        }
        GuardSubcommand::Verify { project } => {
            marker.verify(&project)?;
            println!("{} Host belongs to '{}'", style("✓").green(), project);
        }
    }
    Ok(())
}

fn run_state(ctx: &AppContext, command: StateSubcommand) -> Result<()> {
    let ledger = ctx.lifecycle_ledger();
    match command {
        StateSubcommand::Show { format } => {
            let doc = ledger.load()?;
            match format {
                OutputFormat::Table => print_state(&doc),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&doc)?),
                OutputFormat::Quiet => {}
            }
        }
        StateSubcommand::Deployed => {
            let catalog = AddonCatalog::builtin()?;
            let pipeline = Pipeline::new(ctx, &catalog);
            let doc = load(ctx, &catalog)?;
            let plan = pipeline.plan(&doc.config)?;
            ledger.mark_deployed(&plan.order())?;
            println!("{} Marked {} instances deployed", style("✓").green(), plan.len());
        }
        StateSubcommand::Teardown { instance } => {
            let catalog = AddonCatalog::builtin()?;
            let pipeline = Pipeline::new(ctx, &catalog);
            let doc = load(ctx, &catalog)?;
            let removed = pipeline.teardown(&doc, &instance)?;
            println!("{} Removed {}", style("✓").green(), instance);
            for key in &removed {
                println!("    dropped generated secret {}", key);
            }
        }
    }
    Ok(())
}

fn print_state(doc: &LifecycleDocument) {
    if doc.instances.is_empty() {
        println!("No instances tracked yet.");
        println!("Run 'berth plan' to resolve the project.");
        return;
    }

    println!("  {:<24} {:<12} {:<10} Updated", "Instance", "Type", "State");
    println!("  {}", "-".repeat(70));
    for (key, record) in &doc.instances {
        println!(
            "  {:<24} {:<12} {:<10} {}",
            truncate(&key.to_string(), 24),
            truncate(&record.addon_type, 12),
            record.state.to_string(),
            record.updated_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
}

fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        value.to_string()
    } else {
        let kept: String = value.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", kept)
    }
}
