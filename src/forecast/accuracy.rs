use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::data::types::{round_half_up, ForecastType, Metric, Observation, TemperatureForecast};
use crate::forecast::selection::select_latest;

/// How often a model's forecast rounded to the observed value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AccuracyCount {
    pub correct: usize,
    /// Target dates with an observation; unresolved dates are not misses.
    pub resolved: usize,
}

/// Per-station accuracy, rebuilt from the full history on every call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccuracyTable {
    counts: BTreeMap<(String, ForecastType), AccuracyCount>,
}

impl AccuracyTable {
    pub fn get(&self, model: &str, forecast_type: ForecastType) -> AccuracyCount {
        self.counts
            .get(&(model.to_string(), forecast_type))
            .copied()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

/// Compare every historical temperature forecast for `station` with the
/// realized value for its target date.
pub fn compute_accuracy(
    station: &str,
    forecasts: &[TemperatureForecast],
    observations: &[Observation],
) -> AccuracyTable {
    let observed: HashMap<(NaiveDate, ForecastType), f64> = select_latest(
        observations.iter().filter(|o| o.station == station),
        |o| match o.metric {
            Metric::Temperature(forecast_type) => Some((o.period_start, forecast_type)),
            Metric::Precipitation => None,
        },
        |o| o.as_of,
    )
    .into_iter()
    .filter_map(|(key, obs)| Some((key?, obs.value)))
    .collect();

    let latest = select_latest(
        forecasts.iter().filter(|f| f.station == station),
        |f| (f.model_name.as_str(), f.target_date, f.forecast_type),
        |f| f.issued_at,
    );

    let mut counts: BTreeMap<(String, ForecastType), AccuracyCount> = BTreeMap::new();
    for ((model, target_date, forecast_type), forecast) in latest {
        let count = counts
            .entry((model.to_string(), forecast_type))
            .or_default();

        let Some(actual) = observed.get(&(target_date, forecast_type)) else {
            continue;
        };
        count.resolved += 1;
        if round_half_up(forecast.value) == round_half_up(*actual) {
            count.correct += 1;
        }
    }

    AccuracyTable { counts }
}
