//! edcm-migrate - Main entry point
//!
//! Loads the record table, the target schedule and the subject mapping,
//! resolves target settings (command line, environment, TOML file), runs the
//! synchronization engine and prints the outcome as JSON.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use edcm_common::config::resolve_toml_config;
use edcm_migrate::config::{EngineSettings, StudyContext, TargetConfig};
use edcm_migrate::models::{RecordTable, SubjectFallback, SubjectMap, TargetSchedule};
use edcm_migrate::{migrate, MigrationOutcome, MigrationRequest};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for edcm-migrate
#[derive(Parser, Debug)]
#[command(name = "edcm-migrate")]
#[command(about = "Synchronize transformed clinical records into a Vault EDC study")]
#[command(version)]
struct Args {
    /// Transformed record table (JSON array)
    #[arg(short, long)]
    records: PathBuf,

    /// Target schedule description (TOML or JSON)
    #[arg(short, long)]
    schedule: PathBuf,

    /// Target study name
    #[arg(long, env = "VAULT_STUDY_NAME")]
    study: String,

    /// Study country
    #[arg(long, env = "VAULT_STUDY_COUNTRY")]
    country: String,

    /// Site number
    #[arg(long, env = "VAULT_SITE_NUMBER")]
    site: String,

    /// Subject mapping `OLD:NEW,...` (an entry without `:` keeps its id)
    #[arg(long, conflicts_with_all = ["old_subjects", "new_subjects"])]
    subjects: Option<String>,

    /// Source subject ids, comma separated (paired with --new-subjects)
    #[arg(long, value_delimiter = ',')]
    old_subjects: Vec<String>,

    /// Target subject ids, comma separated
    #[arg(long, value_delimiter = ',')]
    new_subjects: Vec<String>,

    /// Pairing rule when the old and new subject lists differ in length
    #[arg(long, default_value = "identity")]
    subject_fallback: SubjectFallback,

    /// Directory for the failure logs [default: ./data]
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Target host (DNS name)
    #[arg(long, env = "VAULT_DNS")]
    host: Option<String>,

    /// Target API version
    #[arg(long, env = "VAULT_API_VERSION")]
    api_version: Option<String>,

    /// Target username
    #[arg(long, env = "VAULT_USERNAME")]
    username: Option<String>,

    /// Target password
    #[arg(long, env = "VAULT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Maximum form-discovery polls per event
    #[arg(long)]
    max_polls: Option<u32>,

    /// Initial delay between discovery polls, in milliseconds
    #[arg(long)]
    poll_backoff_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml_config =
        resolve_toml_config(args.config.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing (RUST_LOG overrides the configured level)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("edcm_migrate={0},edcm_common={0}", toml_config.logging.level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting edcm-migrate v{}", env!("CARGO_PKG_VERSION"));

    let target = TargetConfig {
        host: args.host,
        api_version: args.api_version,
        username: args.username,
        password: args.password,
    }
    .merged_with(&toml_config.target)
    .with_default_api_version();

    let mut settings = EngineSettings::from_section(&toml_config.engine);
    if let Some(max_polls) = args.max_polls {
        settings.max_polls = max_polls;
    }
    if let Some(backoff_ms) = args.poll_backoff_ms {
        settings.poll_backoff = std::time::Duration::from_millis(backoff_ms);
    }

    let subjects = match args.subjects.as_deref() {
        Some(mapping) => SubjectMap::parse(mapping),
        None => SubjectMap::from_lists(&args.old_subjects, &args.new_subjects, args.subject_fallback),
    }
    .context("Invalid subject mapping")?;

    let records = RecordTable::load_json(&args.records).context("Failed to load record table")?;
    let schedule = TargetSchedule::load(&args.schedule).context("Failed to load target schedule")?;

    let output_dir = args
        .output_dir
        .or(toml_config.output_dir)
        .unwrap_or_else(|| PathBuf::from("data"));

    let request = MigrationRequest {
        target,
        study: StudyContext {
            study_name: args.study,
            study_country: args.country,
            site: args.site,
        },
        records,
        schedule,
        subjects,
        settings: settings.sanitized(),
        output_dir,
    };

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let outcome = migrate(request, cancel).await.context("Migration failed")?;

    match &outcome {
        MigrationOutcome::Skipped { reason } => warn!("Migration skipped: {}", reason),
        MigrationOutcome::Completed(summary) => info!(
            failure_log = %summary.failure_log.display(),
            item_group_log = %summary.item_group_log.display(),
            "Migration complete, check the failure logs for rejected data"
        ),
    }

    let rendered = serde_json::to_string_pretty(&outcome).context("Failed to render outcome")?;
    println!("{}", rendered);
    Ok(())
}

/// Cancel the run at the next unit boundary on Ctrl+C
async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received Ctrl+C, stopping after the current unit");
            cancel.cancel();
        }
        Err(e) => warn!("Failed to install Ctrl+C handler: {}", e),
    }
}
