use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;

use raincheck::config::{Config, EnvConfig};
use raincheck::data::sqlite::SqliteStore;
use raincheck::forecast::aggregator::Aggregator;
use raincheck::market::matcher::MarketMatcher;
use raincheck::monitoring::logger::CsvLogger;
use raincheck::view::assembler::{ForecastViews, TemperatureViews};
use raincheck::view::clock::SystemClock;
use raincheck::view::service::ForecastService;

#[derive(Serialize)]
struct Snapshot {
    generated_at: chrono::DateTime<Utc>,
    precipitation: ForecastViews,
    temperature: TemperatureViews,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    tracing::info!("Forecast aggregation service starting...");

    let env_config = EnvConfig::load()?;
    tracing::info!("Loading configuration: {}", env_config.config_path);
    let mut config = Config::load(&env_config.config_path)?;
    config.apply_env(&env_config);

    tracing::info!("Stations: {}", config.stations.len());
    tracing::info!(
        "Canonical observation model: {}",
        config.aggregation.canonical_observation_model
    );

    tracing::info!("Opening database: {}", config.system.database_path);
    match SqliteStore::open_read_only(&config.system.database_path).and_then(|s| s.summary()) {
        Ok(summary) => tracing::info!(
            "Store: {} forecasts, {} temperature forecasts, {} temperature observations, {} active markets",
            summary.forecasts,
            summary.temperature_forecasts,
            summary.temperature_observations,
            summary.active_markets
        ),
        Err(e) => tracing::warn!("Store summary unavailable: {}", e),
    }

    let logger = if config.monitoring.csv_logging {
        Some(CsvLogger::new(&config.monitoring.csv_log_path)?)
    } else {
        None
    };

    let mut interval = tokio::time::interval(Duration::from_secs(
        config.system.refresh_interval_secs.max(1),
    ));

    // Listen from startup so a Ctrl-C during a refresh pass is not missed.
    let mut shutdown = tokio::spawn(tokio::signal::ctrl_c());

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let pass_config = config.clone();
                let snapshot = tokio::task::spawn_blocking(move || refresh(&pass_config))
                    .await
                    .context("Refresh task panicked")?;

                match snapshot {
                    Ok(snapshot) => publish(&config, logger.as_ref(), &snapshot),
                    Err(e) => tracing::error!("Refresh failed: {:#}", e),
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Shutting down...");
                break;
            }
        }
    }

    Ok(())
}

/// One full pass over a freshly opened store.
fn refresh(config: &Config) -> Result<Snapshot> {
    let store = SqliteStore::open_read_only(&config.system.database_path)
        .with_context(|| format!("Failed to open database: {}", config.system.database_path))?
        .with_canonical_model(config.aggregation.canonical_observation_model.clone());

    let service = ForecastService::new(
        store,
        config.stations.clone(),
        Aggregator::new(config.aggregator_config()),
        MarketMatcher::new().context("Failed to compile bracket patterns")?,
        config.active_date_policy()?,
    );

    let clock = SystemClock;
    let precipitation = service.get_all_station_forecasts(&clock);
    let temperature = service.get_all_station_temperature_forecasts(&clock);

    Ok(Snapshot {
        generated_at: Utc::now(),
        precipitation,
        temperature,
    })
}

fn publish(config: &Config, logger: Option<&CsvLogger>, snapshot: &Snapshot) {
    if let Some(path) = &config.system.snapshot_path {
        let written = serde_json::to_string_pretty(snapshot)
            .context("Failed to serialize snapshot")
            .and_then(|json| {
                std::fs::write(path, json)
                    .with_context(|| format!("Failed to write snapshot: {}", path))
            });
        match written {
            Ok(()) => tracing::info!("Snapshot written to {}", path),
            Err(e) => tracing::error!("{:#}", e),
        }
    }

    if let Some(logger) = logger {
        match logger.log_projections(snapshot.generated_at, &snapshot.precipitation) {
            Ok(lines) => tracing::debug!("Logged {} projections", lines),
            Err(e) => tracing::warn!("CSV logging failed: {}", e),
        }
    }
}
