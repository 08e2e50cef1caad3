//! ingest-jobs - metadata import job command line
//!
//! Creates and edits import jobs, asks the external worker to validate or
//! import them, records the worker's reports and pushes status updates.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use ingest_common::events::JobProgress;
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use ingest_jobs::config::ServiceConfig;
use ingest_jobs::models::JobForm;
use ingest_jobs::notifier::StatusRelay;
use ingest_jobs::{AppState, Caller, JobState};

#[derive(Parser, Debug)]
#[command(name = "ingest-jobs")]
#[command(about = "Metadata import job lifecycle")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// User performing the action
    #[arg(short, long, global = true, env = "INGEST_USER")]
    user: Option<String>,

    /// Act with administrator rights
    #[arg(long, global = true)]
    admin: bool,

    /// Record broker messages instead of sending them
    #[arg(long, global = true)]
    dry_run: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List import jobs, newest first
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,
    },
    /// Show defaults for a new job
    New,
    /// Show one job
    Show { id: Uuid },
    /// Check that a job can still be edited
    Edit { id: Uuid },
    /// Create a job and request validation
    Create(FormArgs),
    /// Edit a job and request validation again
    Update {
        id: Uuid,
        #[command(flatten)]
        form: FormArgs,
    },
    /// Start or resume the import
    Import { id: Uuid },
    /// Record an outcome reported by the import worker
    Report {
        id: Uuid,
        /// validate_success, validate_failed, import_incomplete or import_complete
        #[arg(long, value_enum)]
        state: JobState,
        #[arg(long)]
        total: Option<u64>,
        #[arg(long)]
        completed: Option<u64>,
        #[arg(long)]
        failed: Option<u64>,
    },
    /// Push the job's current status to observers
    Notify { id: Uuid },
}

#[derive(Args, Debug)]
struct FormArgs {
    #[arg(long)]
    name: Option<String>,
    #[arg(long)]
    collection: Option<String>,
    #[arg(long)]
    access: Option<String>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    metadata_file: Option<String>,
    #[arg(long)]
    binaries_zip: Option<String>,
}

impl From<FormArgs> for JobForm {
    fn from(args: FormArgs) -> Self {
        JobForm {
            name: args.name,
            collection: args.collection,
            access: args.access,
            model: args.model,
            metadata_file: args.metadata_file,
            binaries_zip_filename: args.binaries_zip,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logging level comes from the config file, so load it first
    let config_path = ServiceConfig::resolve_path(cli.config.as_deref());
    let config = ServiceConfig::load_from(config_path.as_deref())
        .context("Failed to load configuration")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_writer(std::io::stderr)
        .init();

    info!("Starting ingest-jobs v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("No configuration file found, using built-in defaults"),
    }
    info!("Database: {}", config.database_path.display());

    let caller = resolve_caller(cli.user, cli.admin)?;
    let db = ingest_jobs::db::init_database_pool(&config.database_path).await?;
    let transport = ingest_jobs::build_transport(&config, cli.dry_run);
    let state = AppState::new(db, transport, &config);
    let service = &state.service;

    match cli.command {
        Command::List { page } => print_json(&service.list(&caller, page).await?)?,
        Command::New => print_json(&service.new_form(&caller))?,
        Command::Show { id } => print_json(&service.show(&caller, id).await?)?,
        Command::Edit { id } => print_json(&service.edit_form(&caller, id).await?)?,
        Command::Create(form) => {
            let outcome = service.create(&caller, &form.into()).await?;
            print_json(&outcome)?;
        }
        Command::Update { id, form } => {
            let outcome = service.update(&caller, id, &form.into()).await?;
            print_json(&outcome)?;
        }
        Command::Import { id } => print_json(&service.import(&caller, id).await?)?,
        Command::Report {
            id,
            state: reported,
            total,
            completed,
            failed,
        } => {
            let progress = (total.is_some() || completed.is_some() || failed.is_some()).then(|| {
                JobProgress {
                    total,
                    completed: completed.unwrap_or(0),
                    failed: failed.unwrap_or(0),
                }
            });
            print_json(&service.record_worker_report(id, reported, progress).await?)?;
        }
        Command::Notify { id } => {
            let relay = StatusRelay::spawn(&state.event_bus, state.transport.clone());
            let broadcast = service.request_status_update(id).await?;
            broadcast.await.context("Status broadcast task failed")?;

            // Closing the bus lets the relay drain and exit
            drop(state);
            relay.await.context("Status relay task failed")?;
            info!(job_id = %id, "Status update sent");
        }
    }

    Ok(())
}

fn resolve_caller(user: Option<String>, admin: bool) -> Result<Caller> {
    let user = user
        .or_else(|| std::env::var("USER").ok())
        .filter(|u| !u.trim().is_empty())
        .context("No user given; pass --user or set INGEST_USER")?;
    Ok(Caller::new(user, admin))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
