use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::data::types::{
    month_start, next_month_start, ForecastRun, ForecastType, Metric, Observation,
    TemperatureForecast,
};
use crate::forecast::selection::select_latest;

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Model id whose rows are the official observation, not a forecast.
    pub canonical_model: String,
    /// Native forecast horizon per model.
    pub model_horizons: HashMap<String, Duration>,
    /// Climatology used when the store has none for the month.
    pub default_climatology: f64,
}

/// `observed + forecast_remainder` for one model, computed at read time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedTotal {
    pub model: String,
    pub init_time: DateTime<Utc>,
    pub observed: f64,
    pub forecast_remainder: f64,
    pub total: f64,
    pub is_partial: bool,
    /// End of the model's native horizon, set only for partial runs.
    pub valid_through: Option<DateTime<Utc>>,
}

/// The observed month-to-date value every projection is built on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservedBaseline {
    pub value: f64,
    pub source: String,
    pub as_of: DateTime<Utc>,
    pub period_start: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationAggregate {
    pub station: String,
    pub observed: Option<ObservedBaseline>,
    pub models: Vec<ProjectedTotal>,
}

pub struct Aggregator {
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    /// One projected total per model for `station`.
    ///
    /// Runs for other stations are ignored. Without any observed value the
    /// model list is empty: there is nothing to add the remainder to.
    pub fn aggregate(
        &self,
        station: &str,
        runs: &[ForecastRun],
        observation: Option<&Observation>,
    ) -> StationAggregate {
        let latest = select_latest(
            runs.iter().filter(|r| r.station == station),
            |r| r.model_name.as_str(),
            |r| r.init_time,
        );

        let Some(baseline) = self.baseline(observation, &latest) else {
            return StationAggregate {
                station: station.to_string(),
                observed: None,
                models: Vec::new(),
            };
        };

        let period_end = next_month_start(baseline.period_start);
        let models = latest
            .values()
            .filter(|run| run.model_name != self.config.canonical_model)
            .map(|run| self.project(run, baseline.value, period_end))
            .collect();

        StationAggregate {
            station: station.to_string(),
            observed: Some(baseline),
            models,
        }
    }

    /// Canonical observation first, then the canonical model's own row, then
    /// the first model (by name) carrying an observed snapshot.
    fn baseline(
        &self,
        observation: Option<&Observation>,
        latest: &BTreeMap<&str, &ForecastRun>,
    ) -> Option<ObservedBaseline> {
        if let Some(obs) = observation.filter(|o| o.metric == Metric::Precipitation) {
            return Some(ObservedBaseline {
                value: obs.value,
                source: self.config.canonical_model.clone(),
                as_of: obs.as_of,
                period_start: obs.period_start,
            });
        }

        let canonical = latest
            .get(self.config.canonical_model.as_str())
            .filter(|run| run.observed.is_some());
        let fallback = || latest.values().find(|run| run.observed.is_some());

        canonical.or_else(fallback).and_then(|run| {
            Some(ObservedBaseline {
                value: run.observed?,
                source: run.model_name.clone(),
                as_of: run.init_time,
                period_start: month_start(run.init_time.date_naive()),
            })
        })
    }

    fn project(&self, run: &ForecastRun, observed: f64, period_end: DateTime<Utc>) -> ProjectedTotal {
        let horizon_end = self
            .config
            .model_horizons
            .get(&run.model_name)
            .and_then(|h| run.init_time.checked_add_signed(*h));
        let covers_period = horizon_end.map_or(false, |end| end >= period_end);
        let is_partial = run.is_partial && !covers_period;

        ProjectedTotal {
            model: run.model_name.clone(),
            init_time: run.init_time,
            observed,
            forecast_remainder: run.forecast_remainder,
            total: observed + run.forecast_remainder,
            is_partial,
            valid_through: if is_partial { horizon_end } else { None },
        }
    }

    pub fn climatology(&self, station: &str, by_station: &HashMap<String, f64>) -> f64 {
        by_station
            .get(station)
            .copied()
            .unwrap_or(self.config.default_climatology)
    }
}

/// Newest forecast per model for one station, date and type, sorted by model.
pub fn current_temperature_forecasts<'a>(
    forecasts: &'a [TemperatureForecast],
    station: &str,
    target_date: NaiveDate,
    forecast_type: ForecastType,
) -> Vec<&'a TemperatureForecast> {
    select_latest(
        forecasts.iter().filter(|f| {
            f.station == station && f.target_date == target_date && f.forecast_type == forecast_type
        }),
        |f| f.model_name.as_str(),
        |f| f.issued_at,
    )
    .into_values()
    .collect()
}
