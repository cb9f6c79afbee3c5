use chrono::{Datelike, NaiveDate};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::data::source::ForecastSource;
use crate::data::types::{
    ContractFamily, ForecastType, MarketContract, Metric, Observation, Station,
};
use crate::error::{CoreError, StoreError};
use crate::forecast::accuracy::compute_accuracy;
use crate::forecast::aggregator::{current_temperature_forecasts, Aggregator};
use crate::market::matcher::MarketMatcher;
use crate::view::assembler::{
    station_forecast_view, temperature_section, ForecastViews, StationForecastView,
    StationTemperatureView, TemperatureSection, TemperatureViews,
};
use crate::view::clock::{ActiveDatePolicy, Clock};

/// Read API over a [`ForecastSource`]. Holds configuration only; every call
/// reads the store afresh.
pub struct ForecastService<S> {
    source: S,
    stations: Vec<Station>,
    aggregator: Aggregator,
    matcher: MarketMatcher,
    policy: ActiveDatePolicy,
}

impl<S: ForecastSource> ForecastService<S> {
    pub fn new(
        source: S,
        stations: Vec<Station>,
        aggregator: Aggregator,
        matcher: MarketMatcher,
        policy: ActiveDatePolicy,
    ) -> Self {
        Self {
            source,
            stations,
            aggregator,
            matcher,
            policy,
        }
    }

    /// Projected monthly precipitation for every configured station.
    pub fn get_all_station_forecasts(&self, clock: &dyn Clock) -> ForecastViews {
        let month = clock.now().month();
        let climatology = (month, self.load_climatology(month));
        let markets = self.load_markets(Some(ContractFamily::RainTotal));

        let mut views = ForecastViews::default();
        for station in &self.stations {
            match self.build_station_forecast(station, &climatology, &markets) {
                Ok(view) => views.insert(view),
                Err(err) => {
                    warn!("{}", err);
                    views.mark_no_data(&station.id);
                }
            }
        }

        info!(
            "Assembled precipitation view: {} stations, {} without data",
            views.stations.len(),
            views.no_data.len()
        );
        views
    }

    pub fn get_station_forecast(
        &self,
        station_id: &str,
        clock: &dyn Clock,
    ) -> Result<StationForecastView, CoreError> {
        let station = self.find_station(station_id)?;
        let month = clock.now().month();
        let climatology = (month, self.load_climatology(month));
        let markets = self.load_markets(Some(ContractFamily::RainTotal));
        self.build_station_forecast(station, &climatology, &markets)
    }

    /// Next-day temperature forecasts for every configured station. Each
    /// station's target date is picked in its own local time.
    pub fn get_all_station_temperature_forecasts(&self, clock: &dyn Clock) -> TemperatureViews {
        let markets = self.load_markets(None);

        let mut views = TemperatureViews::default();
        for station in &self.stations {
            let target_date = self.policy.active_date_for(station, clock);
            match self.build_station_temperature(station, target_date, &markets) {
                Ok(view) => views.insert(view),
                Err(err @ CoreError::AmbiguousTargetDate { .. }) => {
                    warn!("{}", err);
                }
                Err(err) => {
                    warn!("{}", err);
                    views.mark_no_data(&station.id);
                }
            }
        }

        info!(
            "Assembled temperature view: {} stations, {} without data",
            views.stations.len(),
            views.no_data.len()
        );
        views
    }

    pub fn get_station_temperature_forecast(
        &self,
        station_id: &str,
        clock: &dyn Clock,
    ) -> Result<StationTemperatureView, CoreError> {
        let station = self.find_station(station_id)?;
        let target_date = self.policy.active_date_for(station, clock);
        let markets = self.load_markets(None);
        self.build_station_temperature(station, target_date, &markets)
    }

    fn find_station(&self, station_id: &str) -> Result<&Station, CoreError> {
        self.stations
            .iter()
            .find(|s| s.id == station_id)
            .ok_or_else(|| CoreError::MissingEssentialData {
                station: station_id.to_string(),
            })
    }

    fn build_station_forecast(
        &self,
        station: &Station,
        climatology: &(u32, HashMap<String, f64>),
        markets: &[MarketContract],
    ) -> Result<StationForecastView, CoreError> {
        let runs = essential(
            &station.id,
            "forecasts",
            self.source.fetch_latest_forecasts(Some(&station.id)),
        );
        let observation = essential(
            &station.id,
            "observation",
            self.source.fetch_observation(&station.id, Metric::Precipitation),
        );

        if runs.is_empty() && observation.is_none() {
            return Err(CoreError::MissingEssentialData {
                station: station.id.clone(),
            });
        }

        let aggregate = self
            .aggregator
            .aggregate(&station.id, &runs, observation.as_ref());
        debug!(
            "Aggregated {}: {} runs in, {} models out",
            station.id,
            runs.len(),
            aggregate.models.len()
        );

        let matched = match &aggregate.observed {
            Some(baseline) => {
                let totals: Vec<f64> = aggregate.models.iter().map(|m| m.total).collect();
                self.matcher.match_contracts(
                    markets,
                    &station.id,
                    ContractFamily::RainTotal,
                    baseline.period_start,
                    &totals,
                )
            }
            None => Vec::new(),
        };

        // Climatology follows the month being projected, not the wall clock.
        let (loaded_month, loaded) = climatology;
        let month = aggregate
            .observed
            .as_ref()
            .map_or(*loaded_month, |baseline| baseline.period_start.month());
        let clim = if month == *loaded_month {
            self.aggregator.climatology(&station.id, loaded)
        } else {
            self.aggregator
                .climatology(&station.id, &self.load_climatology(month))
        };
        Ok(station_forecast_view(station, aggregate, clim, matched))
    }

    fn build_station_temperature(
        &self,
        station: &Station,
        target_date: NaiveDate,
        markets: &[MarketContract],
    ) -> Result<StationTemperatureView, CoreError> {
        let forecasts = essential(
            &station.id,
            "temperature forecasts",
            self.source.fetch_temperature_forecasts(&station.id),
        );
        let observations = essential(
            &station.id,
            "temperature observations",
            self.source.fetch_temperature_observations(&station.id),
        );

        if forecasts.is_empty() && observations.is_empty() {
            return Err(CoreError::MissingEssentialData {
                station: station.id.clone(),
            });
        }

        let accuracy = compute_accuracy(&station.id, &forecasts, &observations);
        let section = |forecast_type: ForecastType| -> TemperatureSection {
            let current = current_temperature_forecasts(&forecasts, &station.id, target_date, forecast_type);
            let values: Vec<f64> = current.iter().map(|f| f.value).collect();
            let family = match forecast_type {
                ForecastType::High => ContractFamily::HighTemperature,
                ForecastType::Low => ContractFamily::LowTemperature,
            };
            let matched = self
                .matcher
                .match_contracts(markets, &station.id, family, target_date, &values);
            let observed = observed_on(&observations, target_date, forecast_type);

            temperature_section(forecast_type, &current, &accuracy, observed, matched)
        };

        let high = section(ForecastType::High);
        let low = section(ForecastType::Low);
        if high.forecasts.is_empty() && low.forecasts.is_empty() {
            return Err(CoreError::AmbiguousTargetDate {
                station: station.id.clone(),
                date: target_date,
            });
        }

        Ok(StationTemperatureView {
            station: station.id.clone(),
            name: station.name.clone(),
            target_date,
            high,
            low,
        })
    }

    fn load_climatology(&self, month: u32) -> HashMap<String, f64> {
        optional("climatology", self.source.fetch_climatology(month))
    }

    fn load_markets(&self, family: Option<ContractFamily>) -> Vec<MarketContract> {
        optional("markets", self.source.fetch_active_markets(family))
    }
}

/// Essential sources are logged and treated as absent on failure; the caller
/// decides whether absence of everything is an error.
fn essential<T: Default>(station: &str, what: &str, result: Result<T, StoreError>) -> T {
    result.unwrap_or_else(|err| {
        warn!("Failed to load {} for {}: {}", what, station, err);
        T::default()
    })
}

fn optional<T: Default>(source_name: &'static str, result: Result<T, StoreError>) -> T {
    result.unwrap_or_else(|err| {
        let err = CoreError::MissingSource {
            source_name,
            reason: err.to_string(),
        };
        warn!("{}", err);
        T::default()
    })
}

fn observed_on(
    observations: &[Observation],
    date: NaiveDate,
    forecast_type: ForecastType,
) -> Option<f64> {
    observations
        .iter()
        .filter(|o| o.period_start == date && o.metric == Metric::Temperature(forecast_type))
        .max_by_key(|o| o.as_of)
        .map(|o| o.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::types::{ForecastRun, TemperatureForecast};
    use crate::forecast::aggregator::AggregatorConfig;
    use crate::view::clock::FixedClock;
    use chrono::{DateTime, TimeZone, Utc};

    #[derive(Default)]
    struct FakeSource {
        runs: Vec<ForecastRun>,
        observations: HashMap<String, Observation>,
        temperature: Vec<TemperatureForecast>,
        temperature_observations: Vec<Observation>,
        markets: Vec<MarketContract>,
        climatology: HashMap<u32, HashMap<String, f64>>,
        markets_down: bool,
        forecasts_down: bool,
    }

    impl ForecastSource for FakeSource {
        fn fetch_latest_forecasts(&self, station: Option<&str>) -> Result<Vec<ForecastRun>, StoreError> {
            if self.forecasts_down {
                return Err(StoreError::Unavailable("no such table: forecasts".into()));
            }
            Ok(self
                .runs
                .iter()
                .filter(|r| station.map_or(true, |s| r.station == s))
                .cloned()
                .collect())
        }

        fn fetch_observation(&self, station: &str, _metric: Metric) -> Result<Option<Observation>, StoreError> {
            Ok(self.observations.get(station).cloned())
        }

        fn fetch_climatology(&self, month: u32) -> Result<HashMap<String, f64>, StoreError> {
            if self.climatology.is_empty() {
                return Err(StoreError::Unavailable("no such table: climatology".into()));
            }
            Ok(self.climatology.get(&month).cloned().unwrap_or_default())
        }

        fn fetch_active_markets(&self, _family: Option<ContractFamily>) -> Result<Vec<MarketContract>, StoreError> {
            if self.markets_down {
                return Err(StoreError::Unavailable("no such table: kalshi_markets".into()));
            }
            Ok(self.markets.clone())
        }

        fn fetch_temperature_forecasts(&self, station: &str) -> Result<Vec<TemperatureForecast>, StoreError> {
            Ok(self.temperature.iter().filter(|f| f.station == station).cloned().collect())
        }

        fn fetch_temperature_observations(&self, station: &str) -> Result<Vec<Observation>, StoreError> {
            Ok(self
                .temperature_observations
                .iter()
                .filter(|o| o.station == station)
                .cloned()
                .collect())
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 18, 15, 0, 0).unwrap()
    }

    fn station(id: &str) -> Station {
        Station {
            id: id.to_string(),
            name: format!("{id} airport"),
            timezone: None,
        }
    }

    fn service(source: FakeSource) -> ForecastService<FakeSource> {
        service_for(source, vec![station("KNYC"), station("KSEA")])
    }

    fn service_for(source: FakeSource, stations: Vec<Station>) -> ForecastService<FakeSource> {
        ForecastService::new(
            source,
            stations,
            Aggregator::new(AggregatorConfig {
                canonical_model: "NWS_CLI".to_string(),
                model_horizons: HashMap::new(),
                default_climatology: 3.0,
            }),
            MarketMatcher::new().unwrap(),
            ActiveDatePolicy::new(20, -7).unwrap(),
        )
    }

    fn run(station: &str, model: &str, remainder: f64) -> ForecastRun {
        ForecastRun {
            station: station.to_string(),
            model_name: model.to_string(),
            init_time: now(),
            observed: None,
            forecast_remainder: remainder,
            is_partial: false,
        }
    }

    fn rain_market(title: &str) -> MarketContract {
        MarketContract {
            ticker: "KXRAINNYCM-26JAN-3".to_string(),
            station: "KNYC".to_string(),
            title: title.to_string(),
            yes_price: 20,
            no_price: 82,
            status: "active".to_string(),
            target_date: None,
        }
    }

    fn precip(station: &str, value: f64) -> Observation {
        Observation {
            station: station.to_string(),
            metric: Metric::Precipitation,
            period_start: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            value,
            as_of: now(),
        }
    }

    #[test]
    fn test_station_isolation_and_no_data() {
        let mut source = FakeSource {
            runs: vec![run("KNYC", "GFS", 1.0)],
            markets: vec![rain_market("Above 3 inches")],
            ..Default::default()
        };
        source.observations.insert("KNYC".to_string(), precip("KNYC", 2.4));

        let views = service(source).get_all_station_forecasts(&FixedClock(now()));
        let nyc = &views.stations["KNYC"];
        assert_eq!(nyc.models.len(), 1);
        assert!((nyc.models[0].total - 3.4).abs() < 1e-9);
        assert!((nyc.climatology - 3.0).abs() < 1e-9);
        assert_eq!(nyc.markets.len(), 1);
        assert_eq!(nyc.markets[0].matches, 1);
        assert!(!views.stations.contains_key("KSEA"));
        assert!(views.no_data.contains("KSEA"));
    }

    #[test]
    fn test_forecasts_without_observation_list_station_with_no_models() {
        let source = FakeSource {
            runs: vec![run("KNYC", "GFS", 1.0), run("KNYC", "ICON", 0.4)],
            ..Default::default()
        };

        let views = service(source).get_all_station_forecasts(&FixedClock(now()));
        let nyc = &views.stations["KNYC"];
        assert!(nyc.models.is_empty());
        assert!(nyc.observed.is_none());
        assert!(!views.no_data.contains("KNYC"));
    }

    #[test]
    fn test_markets_down_degrades_to_empty() {
        let mut source = FakeSource {
            runs: vec![run("KNYC", "GFS", 1.0)],
            markets: vec![rain_market("Above 3 inches")],
            markets_down: true,
            ..Default::default()
        };
        source.observations.insert("KNYC".to_string(), precip("KNYC", 2.4));

        let view = service(source)
            .get_station_forecast("KNYC", &FixedClock(now()))
            .unwrap();
        assert_eq!(view.models.len(), 1);
        assert!(view.markets.is_empty());
    }

    #[test]
    fn test_forecast_store_down_with_observation_still_answers() {
        let mut source = FakeSource {
            forecasts_down: true,
            ..Default::default()
        };
        source.observations.insert("KNYC".to_string(), precip("KNYC", 2.4));
        let service = service(source);

        let view = service.get_station_forecast("KNYC", &FixedClock(now())).unwrap();
        assert!(view.models.is_empty());
        assert!(view.observed.is_some());

        let err = service.get_station_forecast("KSEA", &FixedClock(now())).unwrap_err();
        assert_eq!(
            err,
            CoreError::MissingEssentialData {
                station: "KSEA".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_station_is_no_data() {
        let err = service(FakeSource::default())
            .get_station_temperature_forecast("KXXX", &FixedClock(now()))
            .unwrap_err();
        assert!(matches!(err, CoreError::MissingEssentialData { .. }));
    }

    #[test]
    fn test_temperature_without_active_date_forecasts_is_omitted() {
        let source = FakeSource {
            temperature: vec![TemperatureForecast {
                station: "KNYC".to_string(),
                model_name: "GFS".to_string(),
                issued_at: now(),
                target_date: NaiveDate::from_ymd_opt(2026, 1, 10).unwrap(),
                forecast_type: ForecastType::High,
                value: 41.0,
            }],
            ..Default::default()
        };
        let service = service(source);

        let views = service.get_all_station_temperature_forecasts(&FixedClock(now()));
        assert!(views.stations.is_empty());
        assert!(!views.no_data.contains("KNYC"));
        assert!(views.no_data.contains("KSEA"));

        let err = service
            .get_station_temperature_forecast("KNYC", &FixedClock(now()))
            .unwrap_err();
        assert!(matches!(err, CoreError::AmbiguousTargetDate { .. }));
    }

    #[test]
    fn test_climatology_month_follows_observation_period() {
        let mut source = FakeSource {
            runs: vec![run("KNYC", "GFS", 0.2)],
            ..Default::default()
        };
        source.observations.insert("KNYC".to_string(), precip("KNYC", 4.1));
        source
            .climatology
            .insert(1, HashMap::from([("KNYC".to_string(), 3.56)]));
        source
            .climatology
            .insert(2, HashMap::from([("KNYC".to_string(), 2.9)]));

        // Already February in UTC; the January total is still being projected.
        let clock = FixedClock(Utc.with_ymd_and_hms(2026, 2, 1, 3, 0, 0).unwrap());
        let view = service(source).get_station_forecast("KNYC", &clock).unwrap();
        assert!((view.climatology - 3.56).abs() < 1e-9);
    }

    #[test]
    fn test_temperature_target_date_per_station_zone() {
        let forecast = |station: &str, day: u32| TemperatureForecast {
            station: station.to_string(),
            model_name: "GFS".to_string(),
            issued_at: Utc.with_ymd_and_hms(2026, 1, 21, 18, 0, 0).unwrap(),
            target_date: NaiveDate::from_ymd_opt(2026, 1, day).unwrap(),
            forecast_type: ForecastType::High,
            value: 40.0,
        };
        let source = FakeSource {
            temperature: vec![
                forecast("KNYC", 22),
                forecast("KNYC", 23),
                forecast("KSFO", 22),
                forecast("KSFO", 23),
            ],
            ..Default::default()
        };
        let stations = vec![
            Station {
                timezone: Some(chrono_tz::America::New_York),
                ..station("KNYC")
            },
            Station {
                timezone: Some(chrono_tz::America::Los_Angeles),
                ..station("KSFO")
            },
        ];

        // 20:30 in New York, 17:30 in San Francisco.
        let clock = FixedClock(Utc.with_ymd_and_hms(2026, 1, 23, 1, 30, 0).unwrap());
        let views = service_for(source, stations).get_all_station_temperature_forecasts(&clock);
        assert_eq!(
            views.stations["KNYC"].target_date,
            NaiveDate::from_ymd_opt(2026, 1, 23).unwrap()
        );
        assert_eq!(
            views.stations["KSFO"].target_date,
            NaiveDate::from_ymd_opt(2026, 1, 22).unwrap()
        );
    }
}
