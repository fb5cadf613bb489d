//! Agrovalidate command-line interface
//!
//! Every command reads JSON input from files and prints JSON on stdout. Logs
//! go to stderr so output can be piped.

use agrovalidate_core::{
    Availability, Capability, CompletionReport, Engine, EngineConfig, FieldTestId, FieldTestPlan,
    MonitoringUpdate, RegionCode, ReviewSubmission, ReviewerFilter, ReviewerId,
    ReviewerRegistration, ValidationId, ValidationSubmission,
};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "agrovalidate")]
#[command(about = "Expert validation and field-test workflow engine", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Set log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Database path (overrides the configured path)
    #[arg(long, env = "AGROVALIDATE_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage the expert panel
    Panel {
        #[command(subcommand)]
        action: PanelCommands,
    },

    /// Validation requests and reviews
    Validation {
        #[command(subcommand)]
        action: ValidationCommands,
    },

    /// Field trials
    #[command(name = "field-test")]
    FieldTest {
        #[command(subcommand)]
        action: FieldTestCommands,
    },

    /// Rolling workflow metrics
    Metrics {
        /// Window in days (defaults to the configured window)
        #[arg(short, long)]
        window_days: Option<u32>,
    },
}

#[derive(Subcommand)]
enum PanelCommands {
    /// Register a reviewer from a JSON registration file
    Register {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// List reviewers
    List {
        #[arg(long)]
        capability: Option<Capability>,

        #[arg(long)]
        region: Option<String>,

        /// Only reviewers free for a new assignment
        #[arg(long)]
        available: bool,

        #[arg(long)]
        include_retired: bool,
    },

    /// Soft-retire a reviewer
    Retire { reviewer_id: ReviewerId },

    /// Panel composition summary
    Status,
}

#[derive(Subcommand)]
enum ValidationCommands {
    /// Submit a recommendation for validation from a JSON file
    Submit {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Submit a review from a JSON file
    Review {
        validation_id: ValidationId,

        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show status and progress
    Status { validation_id: ValidationId },

    /// Full review set and consensus
    Report { validation_id: ValidationId },

    /// Retry matching for unfilled capability slots
    Reassign { validation_id: ValidationId },

    /// List validations past their deadline
    Overdue,
}

#[derive(Subcommand)]
enum FieldTestCommands {
    /// Start a field test from a JSON plan file
    Start {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Push monitoring data from a JSON file
    Update {
        test_id: FieldTestId,

        #[arg(short, long)]
        file: PathBuf,
    },

    /// Complete a field test from a JSON report file
    Complete {
        test_id: FieldTestId,

        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show one field test
    Show { test_id: FieldTestId },

    /// List field tests on a farm
    List { farm_id: String },
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn run_panel(engine: &Engine, action: PanelCommands) -> Result<()> {
    match action {
        PanelCommands::Register { file } => {
            let registration: ReviewerRegistration = read_json(&file)?;
            print_json(&engine.register_reviewer(registration).await?)
        }
        PanelCommands::List {
            capability,
            region,
            available,
            include_retired,
        } => {
            let filter = ReviewerFilter {
                capability,
                region: region.map(RegionCode::new),
                availability: available.then_some(Availability::Available),
                include_retired,
            };
            print_json(&engine.list_reviewers(&filter).await)
        }
        PanelCommands::Retire { reviewer_id } => {
            print_json(&engine.retire_reviewer(reviewer_id).await?)
        }
        PanelCommands::Status => print_json(&engine.get_expert_panel_status().await),
    }
}

async fn run_validation(engine: &Engine, action: ValidationCommands) -> Result<()> {
    match action {
        ValidationCommands::Submit { file } => {
            let submission: ValidationSubmission = read_json(&file)?;
            print_json(&engine.submit_validation(submission).await?)
        }
        ValidationCommands::Review {
            validation_id,
            file,
        } => {
            let review: ReviewSubmission = read_json(&file)?;
            print_json(&engine.submit_review(validation_id, review).await?)
        }
        ValidationCommands::Status { validation_id } => {
            print_json(&engine.get_validation_status(validation_id).await?)
        }
        ValidationCommands::Report { validation_id } => {
            print_json(&engine.generate_validation_report(validation_id).await?)
        }
        ValidationCommands::Reassign { validation_id } => {
            print_json(&engine.reassign_unmet(validation_id).await?)
        }
        ValidationCommands::Overdue => print_json(&engine.list_overdue_validations().await?),
    }
}

async fn run_field_test(engine: &Engine, action: FieldTestCommands) -> Result<()> {
    match action {
        FieldTestCommands::Start { file } => {
            let plan: FieldTestPlan = read_json(&file)?;
            print_json(&engine.start_field_test(plan).await?)
        }
        FieldTestCommands::Update { test_id, file } => {
            let update: MonitoringUpdate = read_json(&file)?;
            print_json(&engine.update_field_test_monitoring(test_id, update).await?)
        }
        FieldTestCommands::Complete { test_id, file } => {
            let report: CompletionReport = read_json(&file)?;
            print_json(&engine.complete_field_test(test_id, report).await?)
        }
        FieldTestCommands::Show { test_id } => print_json(&engine.get_field_test(test_id).await?),
        FieldTestCommands::List { farm_id } => {
            print_json(&engine.list_field_tests_for_farm(&farm_id).await?)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    // RUST_LOG wins over --log-level when set
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "agrovalidate={level},agrovalidate_core={level}",
            level = level.as_str().to_lowercase()
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    debug!("Agrovalidate v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut config = EngineConfig::load(cli.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(path) = cli.db_path {
        config.storage.db_path = Some(path);
    }

    let engine = Engine::open_sqlite(config)
        .await
        .context("Failed to open engine")?;

    match cli.command {
        Commands::Panel { action } => run_panel(&engine, action).await,
        Commands::Validation { action } => run_validation(&engine, action).await,
        Commands::FieldTest { action } => run_field_test(&engine, action).await,
        Commands::Metrics { window_days } => {
            print_json(&engine.get_validation_metrics(window_days).await?)
        }
    }
}
