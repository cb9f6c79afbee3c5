use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::data::types::{round_half_up, ForecastType, Station, TemperatureForecast};
use crate::forecast::accuracy::{AccuracyCount, AccuracyTable};
use crate::forecast::aggregator::{ObservedBaseline, ProjectedTotal, StationAggregate};
use crate::market::matcher::MarketMatch;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationForecastView {
    pub station: String,
    pub name: String,
    pub climatology: f64,
    pub observed: Option<ObservedBaseline>,
    pub models: Vec<ProjectedTotal>,
    pub markets: Vec<MarketMatch>,
}

/// Precipitation view for every queried station.
///
/// A station in `stations` with no models was queried and had nothing usable;
/// one in `no_data` had neither forecasts nor observations; one in neither was
/// never queried.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ForecastViews {
    pub stations: BTreeMap<String, StationForecastView>,
    pub no_data: BTreeSet<String>,
}

impl ForecastViews {
    pub fn insert(&mut self, view: StationForecastView) {
        self.stations.insert(view.station.clone(), view);
    }

    pub fn mark_no_data(&mut self, station: &str) {
        self.no_data.insert(station.to_string());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelTemperature {
    pub model: String,
    pub issued_at: DateTime<Utc>,
    pub value: f64,
    pub rounded: i64,
    /// `rounded - round(observed)`, once the target date has an observation.
    pub error: Option<i64>,
    pub accuracy: AccuracyCount,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TemperatureSection {
    /// Realized value for the target date, once known.
    pub observed: Option<f64>,
    pub forecasts: Vec<ModelTemperature>,
    pub markets: Vec<MarketMatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationTemperatureView {
    pub station: String,
    pub name: String,
    pub target_date: NaiveDate,
    pub high: TemperatureSection,
    pub low: TemperatureSection,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TemperatureViews {
    pub stations: BTreeMap<String, StationTemperatureView>,
    pub no_data: BTreeSet<String>,
}

impl TemperatureViews {
    pub fn insert(&mut self, view: StationTemperatureView) {
        self.stations.insert(view.station.clone(), view);
    }

    pub fn mark_no_data(&mut self, station: &str) {
        self.no_data.insert(station.to_string());
    }
}

pub fn station_forecast_view(
    station: &Station,
    aggregate: StationAggregate,
    climatology: f64,
    markets: Vec<MarketMatch>,
) -> StationForecastView {
    StationForecastView {
        station: station.id.clone(),
        name: station.name.clone(),
        climatology,
        observed: aggregate.observed,
        models: aggregate.models,
        markets,
    }
}

pub fn temperature_section(
    forecast_type: ForecastType,
    forecasts: &[&TemperatureForecast],
    accuracy: &AccuracyTable,
    observed: Option<f64>,
    markets: Vec<MarketMatch>,
) -> TemperatureSection {
    TemperatureSection {
        observed,
        forecasts: forecasts
            .iter()
            .map(|f| {
                let rounded = round_half_up(f.value);
                ModelTemperature {
                    model: f.model_name.clone(),
                    issued_at: f.issued_at,
                    value: f.value,
                    rounded,
                    error: observed.map(|actual| rounded - round_half_up(actual)),
                    accuracy: accuracy.get(&f.model_name, forecast_type),
                }
            })
            .collect(),
        markets,
    }
}
