use anyhow::{Context, Result};
use std::fs::File;
use std::path::Path;
use std::sync::{Arc, Mutex};
use testenv::cli::commands::{HistoryCommand, PlanCommand, RunCommand, ValidateCommand};
use testenv::cli::output::*;
use testenv::cli::{Cli, Command};
use testenv::core::config::E2EConfig;
use testenv::core::mode::{ModeFlags, OperatingMode};
use testenv::core::resolver::missing_variables;
use testenv::core::stage::StageId;
use testenv::execution::SuiteEngine;
use testenv::persistence::{PersistenceBackend, RunSummary};
use testenv::{ConfigResolver, SuiteContext, SuiteEvent, SuitePlan};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    let log_dir = match &cli.command {
        Command::Run(cmd) => Some(cmd.artifacts_folder.as_path()),
        _ => None,
    };
    init_logging(cli.verbose, log_dir)?;

    let code = match &cli.command {
        Command::Run(cmd) => run_suite(cmd).await?,
        Command::Plan(cmd) => show_plan(cmd)?,
        Command::Validate(cmd) => validate_config(cmd)?,
        Command::History(cmd) => show_history(cmd).await?,
    };

    std::process::exit(code);
}

/// Console logging plus a plain-text copy in the artifacts folder
fn init_logging(verbose: bool, log_dir: Option<&Path>) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            let file = File::create(dir.join("testenv.log"))
                .context("Failed to create run log")?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("Failed to set logging subscriber")
}

async fn run_suite(cmd: &RunCommand) -> Result<i32> {
    let flags = cmd.to_flags();
    let mode = OperatingMode::select(ModeFlags::from(&flags));
    println!("{} Operating mode: {}", INFO, style(mode.label()).bold());

    let run = match ConfigResolver::resolve(&flags) {
        Ok(run) => run,
        Err(e) => {
            error!("{}", e);
            println!(
                "{}",
                format_suite_event(&SuiteEvent::StageFailed {
                    stage: StageId::ResolveConfig,
                    error: e.to_string(),
                })
            );
            return Ok(2);
        }
    };

    let ctx = SuiteContext::new(run, mode, cmd.post_upgrade_hooks());

    // First interrupt stops setup; a second one also stops teardown
    let cancel = CancellationToken::new();
    let teardown_cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        let teardown_cancel = teardown_cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling setup; teardown still runs");
                cancel.cancel();
            }
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted again, cancelling teardown");
                teardown_cancel.cancel();
            }
        });
    }

    let reporter = Arc::new(ConsoleReporter::new());
    let engine = SuiteEngine::new(cmd.collaborators())
        .with_event_handler(move |event| reporter.handle(event));

    println!();
    let body = cmd.body();
    let outcome = engine
        .run(ctx, body.as_ref(), &cancel, &teardown_cancel)
        .await;

    if !cmd.no_history {
        let summary = RunSummary::from_outcome(&outcome);
        match open_store().await {
            Ok(store) => match store.save_run(&summary).await {
                Ok(()) => println!(
                    "{} Run saved to history (ID: {})",
                    INFO,
                    style(&summary.run_id.to_string()[..8]).dim()
                ),
                Err(e) => warn!("Failed to save run history: {:#}", e),
            },
            Err(e) => warn!("Failed to open run history: {:#}", e),
        }
    }

    if let Some(e) = &outcome.setup_error {
        println!("{} Setup failed: {}", CROSS, style(e).red());
    }
    if let Some(e) = &outcome.body_error {
        println!("{} Specs failed: {}", CROSS, style(e).red());
    }
    for (stage, e) in outcome.teardown.errors() {
        println!("{} Teardown {}: {}", WARN, style(stage).yellow(), style(e).dim());
    }

    let code = outcome.exit_code();
    if code == 0 {
        println!("{} Suite completed {}", CHECK, style("successfully").green());
    }
    info!("Exiting with code {}", code);
    Ok(code)
}

fn show_plan(cmd: &PlanCommand) -> Result<i32> {
    let mode = OperatingMode::select(cmd.mode.to_mode_flags());
    let plan = SuitePlan::from_mode(&mode, cmd.skip_cleanup);

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print!("{}", format_plan(&plan));
    }
    Ok(0)
}

fn validate_config(cmd: &ValidateCommand) -> Result<i32> {
    println!("{} Validating {}...", INFO, cmd.config.display());

    let config = match E2EConfig::from_file(&cmd.config) {
        Ok(config) => config,
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            return Ok(1);
        }
    };

    let mode = OperatingMode::select(cmd.mode.to_mode_flags());
    let missing = missing_variables(&config, &mode);
    if !missing.is_empty() {
        println!(
            "{} Missing variables for {} mode:",
            CROSS,
            style(mode.label()).bold()
        );
        for name in &missing {
            println!("  {}", style(name).red());
        }
        return Ok(1);
    }

    println!("{} Configuration is valid!", CHECK);
    println!(
        "  Management cluster: {}",
        style(&config.management_cluster_name).bold()
    );
    println!("  Variables: {}", style(config.variables.len()).cyan());
    println!("  Intervals: {}", style(config.intervals.len()).cyan());
    println!("  Providers: {}", style(config.providers.len()).cyan());
    Ok(0)
}

async fn show_history(cmd: &HistoryCommand) -> Result<i32> {
    let store = open_store().await?;

    if let Some(run_id) = &cmd.run_id {
        let run_id = uuid::Uuid::parse_str(run_id).context("Invalid run ID format")?;
        match store.load_run(run_id).await? {
            Some(summary) => print_run_details(&summary)?,
            None => println!("{} Run not found", WARN),
        }
        return Ok(0);
    }

    let runs = store.list_runs(cmd.limit).await?;
    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(0);
    }

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{} Run history (showing latest {}):", INFO, cmd.limit);
        for summary in &runs {
            println!("  {}", format_run_summary(summary));
        }
    }
    Ok(0)
}

fn print_run_details(summary: &RunSummary) -> Result<()> {
    println!("{} Run Details", INFO);
    println!("  ID: {}", style(summary.run_id).cyan());
    println!("  Mode: {}", style(&summary.mode).bold());
    println!("  Status: {}", format_status(summary.status));
    println!("  Exit code: {}", summary.exit_code);
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(finished) = summary.finished_at {
        println!("  Finished: {}", style(finished.to_rfc3339()).dim());
        if let Ok(duration) = finished.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }

    println!("\n  {}", style("Stages:").bold());
    for stage in &summary.stages {
        match &stage.error {
            Some(e) => println!("    {} {} {}", CROSS, style(stage.stage).red(), style(e).dim()),
            None => println!("    {} {} ({})", CHECK, stage.stage, stage.state),
        }
    }
    for e in &summary.teardown_errors {
        println!("  {} {}", WARN, style(e).yellow());
    }
    Ok(())
}

#[cfg(feature = "sqlite")]
async fn open_store() -> Result<Arc<dyn PersistenceBackend>> {
    let store = testenv::persistence::SqliteRunStore::with_default_path().await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_store() -> Result<Arc<dyn PersistenceBackend>> {
    warn!("Built without sqlite, run history is not kept across invocations");
    Ok(Arc::new(testenv::persistence::InMemoryPersistence::new()))
}
