use std::collections::HashMap;

use crate::data::types::{
    ContractFamily, ForecastRun, MarketContract, Metric, Observation, TemperatureForecast,
};
use crate::error::StoreError;

/// Read-only query contract the core runs against. Each call is complete or
/// failed; there are no partial results to reconcile.
pub trait ForecastSource {
    /// Most recent precipitation run per `(station, model)`, or the full set
    /// of runs if the store does not deduplicate. The aggregator reduces
    /// either way.
    fn fetch_latest_forecasts(&self, station: Option<&str>)
        -> Result<Vec<ForecastRun>, StoreError>;

    fn fetch_observation(
        &self,
        station: &str,
        metric: Metric,
    ) -> Result<Option<Observation>, StoreError>;

    /// Climatology for `month` (1-12), keyed by station id.
    fn fetch_climatology(&self, month: u32) -> Result<HashMap<String, f64>, StoreError>;

    fn fetch_active_markets(
        &self,
        family: Option<ContractFamily>,
    ) -> Result<Vec<MarketContract>, StoreError>;

    /// Full temperature forecast history for a station, every target date.
    fn fetch_temperature_forecasts(
        &self,
        station: &str,
    ) -> Result<Vec<TemperatureForecast>, StoreError>;

    /// Realized daily highs and lows for a station.
    fn fetch_temperature_observations(
        &self,
        station: &str,
    ) -> Result<Vec<Observation>, StoreError>;
}
