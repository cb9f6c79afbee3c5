use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;

use crate::data::sqlite::DEFAULT_CANONICAL_MODEL;
use crate::data::types::Station;
use crate::forecast::aggregator::AggregatorConfig;
use crate::view::clock::ActiveDatePolicy;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub system: SystemConfig,
    pub stations: Vec<Station>,
    #[serde(default)]
    pub aggregation: AggregationConfig,
    #[serde(default)]
    pub temperature: TemperatureConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SystemConfig {
    pub database_path: String,
    /// Where each refresh pass writes the assembled views as JSON.
    #[serde(default)]
    pub snapshot_path: Option<String>,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AggregationConfig {
    #[serde(default = "default_canonical_model")]
    pub canonical_observation_model: String,
    #[serde(default = "default_climatology")]
    pub default_climatology: f64,
    #[serde(default)]
    pub model_horizons_hours: HashMap<String, i64>,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            canonical_observation_model: default_canonical_model(),
            default_climatology: default_climatology(),
            model_horizons_hours: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TemperatureConfig {
    #[serde(default = "default_cutoff_hour")]
    pub cutoff_hour: u32,
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,
}

impl Default for TemperatureConfig {
    fn default() -> Self {
        Self {
            cutoff_hour: default_cutoff_hour(),
            utc_offset_hours: default_utc_offset(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct MonitoringConfig {
    #[serde(default)]
    pub csv_logging: bool,
    #[serde(default = "default_csv_log_path")]
    pub csv_log_path: String,
}

fn default_refresh_interval() -> u64 { 300 }
fn default_canonical_model() -> String { DEFAULT_CANONICAL_MODEL.to_string() }
fn default_climatology() -> f64 { 3.0 }
fn default_cutoff_hour() -> u32 { 20 }
fn default_utc_offset() -> i32 { -7 }
fn default_csv_log_path() -> String { "projections.csv".to_string() }

/// Settings read from the environment (and `.env`, if present).
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub config_path: String,
    pub database_path: Option<String>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {}", path))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.active_date_policy()?;
        Ok(config)
    }

    pub fn apply_env(&mut self, env: &EnvConfig) {
        if let Some(path) = &env.database_path {
            self.system.database_path = path.clone();
        }
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            canonical_model: self.aggregation.canonical_observation_model.clone(),
            model_horizons: self
                .aggregation
                .model_horizons_hours
                .iter()
                .map(|(model, hours)| (model.clone(), chrono::Duration::hours(*hours)))
                .collect(),
            default_climatology: self.aggregation.default_climatology,
        }
    }

    pub fn active_date_policy(&self) -> Result<ActiveDatePolicy> {
        ActiveDatePolicy::new(self.temperature.cutoff_hour, self.temperature.utc_offset_hours)
            .with_context(|| {
                format!(
                    "Invalid temperature cutoff {}:00 at UTC offset {}",
                    self.temperature.cutoff_hour, self.temperature.utc_offset_hours
                )
            })
    }
}

impl EnvConfig {
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        Ok(Self {
            config_path: std::env::var("RAINCHECK_CONFIG")
                .unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string()),
            database_path: std::env::var("RAINCHECK_DB_PATH").ok(),
        })
    }
}
