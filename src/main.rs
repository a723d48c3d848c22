use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commerce_metrics_engine::background_jobs::{
    create_scheduler, jobs::build_jobs, run_job, JobContext,
};
use commerce_metrics_engine::catalog::{
    read_products_csv, CatalogSource, CsvCatalog, SqliteCatalogStore,
};
use commerce_metrics_engine::config::{AppConfig, CliConfig, FileConfig};
use commerce_metrics_engine::events::{import_ndjson, EventStore, SqliteEventStore};
use commerce_metrics_engine::metrics_store::{MetricsStore, SqliteMetricsStore};
use commerce_metrics_engine::server::{metrics, run_server, ServerConfig, ServerState};
use commerce_metrics_engine::RequestsLoggingLevel;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(name = "metrics-engine", version)]
#[command(about = "Incremental revenue, KPI, health and trending tables from an event log")]
struct CliArgs {
    /// Directory holding events.db, catalog.db and metrics.db.
    #[clap(long, global = true, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Optional TOML file; its values override command-line options.
    #[clap(long, global = true, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Read the catalog from this CSV instead of catalog.db.
    #[clap(long, global = true, value_parser = parse_path)]
    pub catalog_csv: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one job (or `all`, in dependency order) once and exit.
    Run {
        job: String,
        /// Ignore revenue watermarks and rebuild from the full history.
        #[clap(long)]
        full_rebuild: bool,
    },
    /// Run the scheduler and serve the HTTP API.
    Serve {
        /// The port to listen on.
        #[clap(short, long, default_value_t = 3001)]
        port: u16,

        /// The port for the metrics server (Prometheus scraping).
        #[clap(long, default_value_t = 9091)]
        metrics_port: u16,

        /// The level of logging to perform on each request.
        #[clap(long, default_value = "path")]
        logging_level: RequestsLoggingLevel,
    },
    /// Append newline-delimited JSON events to events.db.
    ImportEvents {
        #[clap(value_parser = parse_path)]
        path: PathBuf,
    },
    /// Replace the catalog.db snapshot with the rows of a products CSV.
    ImportCatalog {
        #[clap(value_parser = parse_path)]
        path: PathBuf,
    },
    /// List the registered jobs.
    Jobs,
}

struct Stores {
    events: Arc<dyn EventStore>,
    catalog: Arc<dyn CatalogSource>,
    metrics: Arc<dyn MetricsStore>,
}

fn open_stores(config: &AppConfig) -> Result<Stores> {
    info!("Opening databases in {:?}...", config.db_dir);
    let events = Arc::new(SqliteEventStore::new(config.events_db_path())?);
    let catalog: Arc<dyn CatalogSource> = match &config.catalog_csv {
        Some(path) => {
            info!("Reading catalog from {:?}", path);
            Arc::new(CsvCatalog::new(path))
        }
        None => Arc::new(SqliteCatalogStore::new(config.catalog_db_path())?),
    };
    let metrics = Arc::new(SqliteMetricsStore::new(config.metrics_db_path())?);
    Ok(Stores {
        events,
        catalog,
        metrics,
    })
}

async fn run_once(config: AppConfig, job_filter: String, full_rebuild: bool) -> Result<()> {
    let stores = open_stores(&config)?;
    let ctx = JobContext::new(
        CancellationToken::new(),
        stores.events,
        stores.catalog,
        stores.metrics,
    );

    let jobs: Vec<_> = build_jobs(&config)
        .into_iter()
        .filter(|job| job_filter == "all" || job.id() == job_filter)
        .collect();
    if jobs.is_empty() {
        bail!("Unknown job '{}'", job_filter);
    }
    let params = full_rebuild.then(|| json!({ "full_rebuild": true }));

    let failed = tokio::task::spawn_blocking(move || {
        let mut failed: HashSet<&'static str> = HashSet::new();
        for job in &jobs {
            if let Some(dep) = job.depends_on().iter().find(|d| failed.contains(*d)) {
                warn!("Skipping {}: dependency {} failed", job.id(), dep);
                failed.insert(job.id());
                continue;
            }
            if run_job(job.as_ref(), &ctx, params.clone(), "cli").is_err() {
                failed.insert(job.id());
            }
        }
        failed
    })
    .await?;

    if !failed.is_empty() {
        let mut failed: Vec<_> = failed.into_iter().collect();
        failed.sort_unstable();
        bail!("Jobs failed: {}", failed.join(", "));
    }
    Ok(())
}

async fn serve(config: AppConfig) -> Result<()> {
    let stores = open_stores(&config)?;
    let shutdown_token = CancellationToken::new();

    let job_context = JobContext::new(
        shutdown_token.child_token(),
        stores.events,
        stores.catalog,
        stores.metrics.clone(),
    );
    let (mut scheduler, scheduler_handle) =
        create_scheduler(stores.metrics.clone(), shutdown_token.clone(), job_context);
    for job in build_jobs(&config) {
        scheduler.register_job(job).await;
    }
    let scheduler_task = tokio::spawn(async move { scheduler.run().await });

    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, shutting down");
            signal_token.cancel();
        }
    });

    let server_config = ServerConfig {
        requests_logging_level: config.logging_level.clone(),
        port: config.port,
        metrics_port: config.metrics_port,
    };
    let state = ServerState::new(server_config, stores.metrics, Some(scheduler_handle));
    let result = run_server(state, shutdown_token.clone()).await;

    shutdown_token.cancel();
    if let Err(e) = scheduler_task.await {
        error!("Scheduler task failed: {}", e);
    }
    result
}

fn import_events(config: &AppConfig, path: &Path) -> Result<()> {
    let store = SqliteEventStore::new(config.events_db_path())?;
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let summary = import_ndjson(BufReader::new(file), &store)?;
    println!(
        "Imported {} events, rejected {}",
        summary.imported, summary.rejected
    );
    for (event_type, count) in store.count_by_type()? {
        println!("  {:<20} {}", event_type, count);
    }
    Ok(())
}

fn import_catalog(config: &AppConfig, path: &Path) -> Result<()> {
    let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
    let products = read_products_csv(file)?;
    let store = SqliteCatalogStore::new(config.catalog_db_path())?;
    let written = store.replace_products(&products)?;
    println!("Catalog replaced with {} products", written);
    Ok(())
}

fn list_jobs(config: &AppConfig) {
    for job in build_jobs(config) {
        let depends = job.depends_on().join(", ");
        println!(
            "{:<16} {:<16} {}{}",
            job.id(),
            job.name(),
            job.description(),
            if depends.is_empty() {
                String::new()
            } else {
                format!(" (after {})", depends)
            }
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let mut cli_config = CliConfig {
        db_dir: cli_args.db_dir.clone(),
        catalog_csv: cli_args.catalog_csv.clone(),
        port: 3001,
        metrics_port: 9091,
        logging_level: RequestsLoggingLevel::default(),
    };
    if let Command::Serve {
        port,
        metrics_port,
        logging_level,
    } = &cli_args.command
    {
        cli_config.port = *port;
        cli_config.metrics_port = *metrics_port;
        cli_config.logging_level = logging_level.clone();
    }

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    metrics::init_metrics();

    match cli_args.command {
        Command::Run { job, full_rebuild } => run_once(config, job, full_rebuild).await,
        Command::Serve { .. } => serve(config).await,
        Command::ImportEvents { path } => import_events(&config, &path),
        Command::ImportCatalog { path } => import_catalog(&config, &path),
        Command::Jobs => {
            list_jobs(&config);
            Ok(())
        }
    }
}
