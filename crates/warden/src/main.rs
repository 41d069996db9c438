use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::{error, info};

use warden::{assess, build_engine, ComplianceFramework, WardenConfig, WardenError};
use warden_core::{ResourceId, SubjectId};
use warden_policy::{AccessAction, PolicyStore};

/// Warden: zero-trust continuous verification and access decisions.
#[derive(Parser, Debug)]
#[command(name = "warden", version, about, long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliAction {
    Read,
    Write,
    Execute,
    Admin,
}

impl From<CliAction> for AccessAction {
    fn from(action: CliAction) -> Self {
        match action {
            CliAction::Read => AccessAction::Read,
            CliAction::Write => AccessAction::Write,
            CliAction::Execute => AccessAction::Execute,
            CliAction::Admin => AccessAction::Admin,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the engine with the background re-verification monitor
    Serve,

    /// Make a one-shot access decision for a subject
    Check {
        /// Subject id to verify
        #[arg(long)]
        subject: String,

        /// Resource the subject wants to access
        #[arg(long)]
        resource: String,

        /// Requested action
        #[arg(long, value_enum, default_value = "read")]
        action: CliAction,
    },

    /// Validate a policy rule file
    Rules {
        /// JSON rule file to validate
        file: PathBuf,
    },

    /// Produce a compliance coverage report
    Compliance {
        /// JSON file of compliance frameworks
        frameworks: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("warden=debug,warden_verify=debug,warden_policy=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warden=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&PathBuf>) -> Result<WardenConfig, WardenError> {
    match path {
        Some(p) => WardenConfig::load(p),
        None => {
            let default_path = WardenConfig::default_config_path();
            WardenConfig::load(&default_path)
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = run(cli).await;
    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), WardenError> {
    match cli.command {
        Commands::Serve => cmd_serve(cli.config.as_ref()).await,
        Commands::Check {
            subject,
            resource,
            action,
        } => cmd_check(cli.config.as_ref(), &subject, &resource, action.into()).await,
        Commands::Rules { file } => cmd_rules(&file),
        Commands::Compliance { frameworks } => cmd_compliance(cli.config.as_ref(), &frameworks),
    }
}

async fn cmd_serve(config_path: Option<&PathBuf>) -> Result<(), WardenError> {
    let config = load_config(config_path)?;
    let engine = build_engine(&config)?;

    let monitor = engine.spawn_monitor(config.monitor_config());
    info!(
        workers = config.scheduler.workers,
        tick_secs = config.scheduler.tick_secs,
        "warden engine running; press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    monitor.shutdown().await;

    let snapshot = engine.metrics_snapshot();
    info!(
        subjects = snapshot.system.subjects,
        verifications = snapshot.system.total_verifications,
        cache_hits = snapshot.system.cache_hits,
        "final metrics"
    );
    Ok(())
}

async fn cmd_check(
    config_path: Option<&PathBuf>,
    subject: &str,
    resource: &str,
    action: AccessAction,
) -> Result<(), WardenError> {
    let config = load_config(config_path)?;
    let engine = build_engine(&config)?;

    let subject_id = SubjectId::new(subject);
    engine.register_subject(subject_id.clone());

    let decision = engine
        .authorize(&subject_id, ResourceId::new(resource), action)
        .await?;

    println!("{}", serde_json::to_string_pretty(&decision)?);
    println!();
    println!(
        "decision: {}  (risk {} / {}, success: {})",
        decision.decision,
        decision.risk_score,
        decision.risk_score.level(),
        decision.success
    );
    Ok(())
}

fn cmd_rules(file: &PathBuf) -> Result<(), WardenError> {
    let raw = std::fs::read(file)?;
    let store = PolicyStore::new();
    match store.load_json(&raw) {
        Ok(count) => {
            println!("{} rules validated successfully.", count);
            Ok(())
        }
        Err(e) => {
            eprintln!("rule validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}

fn cmd_compliance(
    config_path: Option<&PathBuf>,
    frameworks_path: &PathBuf,
) -> Result<(), WardenError> {
    let config = load_config(config_path)?;
    let engine = build_engine(&config)?;

    let raw = std::fs::read(frameworks_path)?;
    let frameworks: Vec<ComplianceFramework> = serde_json::from_slice(&raw)?;

    let report = assess(&frameworks, engine.evaluator().store());
    println!("{}", serde_json::to_string_pretty(&report)?);
    println!();
    println!("overall compliance score: {:.1}%", report.overall_score);
    Ok(())
}
