mod file_config;

pub use file_config::{FileConfig, HealthConfig, JobsConfig, RevenueConfig, TrendingConfig};

use crate::analytics::{HealthWeights, TrendWindows};
use crate::server::RequestsLoggingLevel;
use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use std::path::PathBuf;
use std::time::Duration;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub catalog_csv: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_dir: PathBuf,
    /// When set, the catalog is read from this CSV instead of `catalog.db`.
    pub catalog_csv: Option<PathBuf>,
    pub port: u16,
    pub metrics_port: u16,
    pub logging_level: RequestsLoggingLevel,

    pub revenue: RevenueSettings,
    pub trend_windows: TrendWindows,
    pub health_weights: HealthWeights,
    pub jobs: JobIntervals,
}

#[derive(Debug, Clone, Default)]
pub struct RevenueSettings {
    pub revisit_open_bucket: bool,
}

#[derive(Debug, Clone)]
pub struct JobIntervals {
    pub revenue_interval_minutes: u64,
    pub trending_interval_minutes: u64,
    pub kpi_interval_hours: u64,
}

impl Default for JobIntervals {
    fn default() -> Self {
        Self {
            revenue_interval_minutes: 60,
            trending_interval_minutes: 60,
            kpi_interval_hours: 24,
        }
    }
}

/// Longest accepted job interval.
const MAX_INTERVAL_SECS: u64 = 366 * 24 * 3600;

impl JobIntervals {
    pub fn revenue(&self) -> Duration {
        Duration::from_secs(self.revenue_interval_minutes.saturating_mul(60))
    }

    pub fn trending(&self) -> Duration {
        Duration::from_secs(self.trending_interval_minutes.saturating_mul(60))
    }

    pub fn kpi(&self) -> Duration {
        Duration::from_secs(self.kpi_interval_hours.saturating_mul(3600))
    }

    fn validate(&self) -> Result<()> {
        for (name, value, unit_secs) in [
            ("revenue_interval_minutes", self.revenue_interval_minutes, 60),
            ("trending_interval_minutes", self.trending_interval_minutes, 60),
            ("kpi_interval_hours", self.kpi_interval_hours, 3600),
        ] {
            if value == 0 {
                bail!("Job interval {} must be greater than zero", name);
            }
            match value.checked_mul(unit_secs) {
                Some(secs) if secs <= MAX_INTERVAL_SECS => {}
                _ => bail!(
                    "Job interval {} = {} exceeds the maximum of {} days",
                    name,
                    value,
                    MAX_INTERVAL_SECS / 86_400
                ),
            }
        }
        Ok(())
    }
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| {
                anyhow::anyhow!("db_dir must be specified via --db-dir or in config file")
            })?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let catalog_csv = file
            .catalog_csv
            .map(PathBuf::from)
            .or_else(|| cli.catalog_csv.clone());
        if let Some(path) = &catalog_csv {
            if !path.is_file() {
                bail!("Catalog CSV not found: {:?}", path);
            }
        }

        let port = file.port.unwrap_or(cli.port);
        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let logging_level = match file.logging_level {
            Some(s) => parse_logging_level(&s)
                .with_context(|| format!("Invalid logging_level in config file: {:?}", s))?,
            None => cli.logging_level.clone(),
        };

        let revenue_file = file.revenue.unwrap_or_default();
        let revenue = RevenueSettings {
            revisit_open_bucket: revenue_file.revisit_open_bucket.unwrap_or(false),
        };

        let trending_file = file.trending.unwrap_or_default();
        let default_windows = TrendWindows::default();
        let trend_windows = TrendWindows {
            short_days: trending_file
                .short_window_days
                .unwrap_or(default_windows.short_days),
            long_days: trending_file
                .long_window_days
                .unwrap_or(default_windows.long_days),
        };
        trend_windows.validate()?;

        let health_file = file.health.unwrap_or_default();
        let default_weights = HealthWeights::default();
        let health_weights = HealthWeights {
            sales: health_file.sales_weight.unwrap_or(default_weights.sales),
            rating: health_file.rating_weight.unwrap_or(default_weights.rating),
            returns: health_file.return_weight.unwrap_or(default_weights.returns),
        };
        health_weights.validate()?;

        let jobs_file = file.jobs.unwrap_or_default();
        let default_intervals = JobIntervals::default();
        let jobs = JobIntervals {
            revenue_interval_minutes: jobs_file
                .revenue_interval_minutes
                .unwrap_or(default_intervals.revenue_interval_minutes),
            trending_interval_minutes: jobs_file
                .trending_interval_minutes
                .unwrap_or(default_intervals.trending_interval_minutes),
            kpi_interval_hours: jobs_file
                .kpi_interval_hours
                .unwrap_or(default_intervals.kpi_interval_hours),
        };
        jobs.validate()?;

        Ok(Self {
            db_dir,
            catalog_csv,
            port,
            metrics_port,
            logging_level,
            revenue,
            trend_windows,
            health_weights,
            jobs,
        })
    }

    pub fn events_db_path(&self) -> PathBuf {
        self.db_dir.join("events.db")
    }

    pub fn catalog_db_path(&self) -> PathBuf {
        self.db_dir.join("catalog.db")
    }

    pub fn metrics_db_path(&self) -> PathBuf {
        self.db_dir.join("metrics.db")
    }
}

/// Parses a logging level string into RequestsLoggingLevel.
/// Uses clap's ValueEnum trait for parsing.
fn parse_logging_level(s: &str) -> Option<RequestsLoggingLevel> {
    RequestsLoggingLevel::from_str(s, true).ok()
}
