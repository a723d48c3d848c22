use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub catalog_csv: Option<String>,
    pub port: Option<u16>,
    pub metrics_port: Option<u16>,
    pub logging_level: Option<String>,

    // Engine sections
    pub revenue: Option<RevenueConfig>,
    pub trending: Option<TrendingConfig>,
    pub health: Option<HealthConfig>,
    pub jobs: Option<JobsConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct RevenueConfig {
    /// Re-aggregate the watermark bucket on every incremental run.
    pub revisit_open_bucket: Option<bool>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct TrendingConfig {
    pub short_window_days: Option<usize>,
    pub long_window_days: Option<usize>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct HealthConfig {
    pub sales_weight: Option<f64>,
    pub rating_weight: Option<f64>,
    pub return_weight: Option<f64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct JobsConfig {
    pub revenue_interval_minutes: Option<u64>,
    pub trending_interval_minutes: Option<u64>,
    pub kpi_interval_hours: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_file() {
        let config: FileConfig = toml::from_str(
            r#"
            db_dir = "/var/lib/metrics"
            port = 4000
            logging_level = "headers"

            [revenue]
            revisit_open_bucket = true

            [trending]
            short_window_days = 3
            long_window_days = 14

            [health]
            sales_weight = 0.6
            rating_weight = 0.2
            return_weight = 0.2

            [jobs]
            kpi_interval_hours = 6
            "#,
        )
        .unwrap();

        assert_eq!(config.db_dir.as_deref(), Some("/var/lib/metrics"));
        assert_eq!(config.port, Some(4000));
        assert_eq!(config.revenue.unwrap().revisit_open_bucket, Some(true));
        let trending = config.trending.unwrap();
        assert_eq!(trending.short_window_days, Some(3));
        assert_eq!(trending.long_window_days, Some(14));
        assert_eq!(config.health.unwrap().sales_weight, Some(0.6));
        let jobs = config.jobs.unwrap();
        assert_eq!(jobs.kpi_interval_hours, Some(6));
        assert!(jobs.revenue_interval_minutes.is_none());
    }

    #[test]
    fn test_empty_file_is_all_defaults() {
        let config: FileConfig = toml::from_str("").unwrap();
        assert!(config.db_dir.is_none());
        assert!(config.revenue.is_none());
        assert!(config.jobs.is_none());
    }

    #[test]
    fn test_load_reports_path_on_parse_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "port = \"not a number\"").unwrap();

        let err = FileConfig::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config file"));
    }
}
