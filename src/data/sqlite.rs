use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use crate::data::source::ForecastSource;
use crate::data::ticker::target_date_from_ticker;
use crate::forecast::selection::select_latest;
use crate::data::types::{
    month_start, ContractFamily, ForecastRun, ForecastType, MarketContract, Metric, Observation,
    TemperatureForecast,
};
use crate::error::StoreError;

pub const DEFAULT_CANONICAL_MODEL: &str = "NWS_CLI";

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS forecasts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        location_id TEXT NOT NULL,
        model_name TEXT NOT NULL,
        init_time TEXT NOT NULL,
        observed_mtd REAL,
        forecast_remainder REAL,
        total_proj REAL,
        is_partial BOOLEAN DEFAULT 0,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS climatology (
        location_id TEXT,
        month INTEGER,
        value REAL,
        PRIMARY KEY (location_id, month)
    );

    CREATE TABLE IF NOT EXISTS kalshi_markets (
        ticker TEXT PRIMARY KEY,
        location_id TEXT,
        title TEXT,
        yes_price INTEGER,
        no_price INTEGER,
        status TEXT,
        target_date TEXT,
        last_updated TIMESTAMP DEFAULT CURRENT_TIMESTAMP
    );

    CREATE TABLE IF NOT EXISTS temperature_forecasts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        location_id TEXT NOT NULL,
        target_date TEXT NOT NULL,
        model_name TEXT NOT NULL,
        forecast_type TEXT DEFAULT 'high',
        forecast_value REAL,
        created_at TEXT DEFAULT CURRENT_TIMESTAMP,
        UNIQUE(location_id, target_date, model_name, forecast_type)
    );

    CREATE TABLE IF NOT EXISTS temperature_observations (
        location_id TEXT NOT NULL,
        obs_date TEXT NOT NULL,
        forecast_type TEXT NOT NULL,
        observed_value REAL NOT NULL,
        as_of TEXT NOT NULL,
        PRIMARY KEY (location_id, obs_date, forecast_type)
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_forecasts_unique ON forecasts (location_id, model_name, init_time);
    CREATE INDEX IF NOT EXISTS idx_forecasts_loc_model ON forecasts (location_id, model_name);
    CREATE INDEX IF NOT EXISTS idx_markets_status ON kalshi_markets (status);
"#;

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(_, Some(msg)) if msg.contains("no such table") => {
                StoreError::Unavailable(msg.clone())
            }
            rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::CannotOpen => {
                StoreError::Unavailable(err.to_string())
            }
            _ => StoreError::Query(err.to_string()),
        }
    }
}

/// Row counts reported at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSummary {
    pub forecasts: usize,
    pub temperature_forecasts: usize,
    pub temperature_observations: usize,
    pub active_markets: usize,
}

pub struct SqliteStore {
    conn: Connection,
    canonical_model: String,
}

impl SqliteStore {
    /// Open (creating if needed) a writable store. Used by ingestion tooling.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(10))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self::from_connection(conn))
    }

    /// Open an existing store without write access. Missing tables surface as
    /// `StoreError::Unavailable` on first query, not here.
    pub fn open_read_only(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        conn.busy_timeout(Duration::from_secs(10))?;
        Ok(Self::from_connection(conn))
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            canonical_model: DEFAULT_CANONICAL_MODEL.to_string(),
        }
    }

    /// Model id whose rows carry the official month-to-date observation.
    pub fn with_canonical_model(mut self, model: impl Into<String>) -> Self {
        self.canonical_model = model.into();
        self
    }

    pub fn summary(&self) -> Result<StoreSummary, StoreError> {
        let count = |sql: &str| -> Result<usize, StoreError> {
            Ok(self.conn.query_row(sql, [], |row| row.get(0))?)
        };

        Ok(StoreSummary {
            forecasts: count("SELECT COUNT(*) FROM forecasts")?,
            temperature_forecasts: count("SELECT COUNT(*) FROM temperature_forecasts")?,
            temperature_observations: count("SELECT COUNT(*) FROM temperature_observations")?,
            active_markets: count("SELECT COUNT(*) FROM kalshi_markets WHERE status = 'active'")?,
        })
    }

    pub fn save_forecast(&self, run: &ForecastRun) -> Result<(), StoreError> {
        let total_proj = run.observed.unwrap_or(0.0) + run.forecast_remainder;
        self.conn.execute(
            "INSERT OR REPLACE INTO forecasts
             (location_id, model_name, init_time, observed_mtd, forecast_remainder, total_proj, is_partial)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run.station,
                run.model_name,
                run.init_time.to_rfc3339(),
                run.observed,
                run.forecast_remainder,
                total_proj,
                run.is_partial,
            ],
        )?;
        Ok(())
    }

    pub fn save_climatology(&self, station: &str, month: u32, value: f64) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO climatology (location_id, month, value) VALUES (?1, ?2, ?3)",
            params![station, month, value],
        )?;
        Ok(())
    }

    pub fn save_market(&self, market: &MarketContract) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kalshi_markets
             (ticker, location_id, title, yes_price, no_price, status, target_date, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, CURRENT_TIMESTAMP)",
            params![
                market.ticker,
                market.station,
                market.title,
                market.yes_price,
                market.no_price,
                market.status,
                market.target_date.map(|d| d.format("%Y-%m-%d").to_string()),
            ],
        )?;
        Ok(())
    }

    /// Upsert; a newer issue for the same key replaces the value and issue time.
    pub fn save_temperature_forecast(&self, forecast: &TemperatureForecast) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO temperature_forecasts
             (location_id, target_date, model_name, forecast_type, forecast_value, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(location_id, target_date, model_name, forecast_type) DO UPDATE SET
             forecast_value = excluded.forecast_value,
             created_at = excluded.created_at",
            params![
                forecast.station,
                forecast.target_date.format("%Y-%m-%d").to_string(),
                forecast.model_name,
                forecast.forecast_type.as_str(),
                forecast.value,
                forecast.issued_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn save_temperature_observation(&self, obs: &Observation) -> Result<(), StoreError> {
        let Metric::Temperature(forecast_type) = obs.metric else {
            return Err(StoreError::Query(format!(
                "expected a temperature observation for {}, got {:?}",
                obs.station, obs.metric
            )));
        };

        self.conn.execute(
            "INSERT OR REPLACE INTO temperature_observations
             (location_id, obs_date, forecast_type, observed_value, as_of)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                obs.station,
                obs.period_start.format("%Y-%m-%d").to_string(),
                forecast_type.as_str(),
                obs.value,
                obs.as_of.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn latest_precipitation_observation(&self, station: &str) -> Result<Option<Observation>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT observed_mtd, init_time FROM forecasts
             WHERE location_id = ?1 AND model_name = ?2 AND observed_mtd IS NOT NULL",
        )?;
        let rows = stmt.query_map(params![station, self.canonical_model], |row| {
            let value: f64 = row.get(0)?;
            let as_of = parse_timestamp(1, &row.get::<_, String>(1)?)?;
            Ok((value, as_of))
        })?;

        let mut row: Option<(f64, DateTime<Utc>)> = None;
        for candidate in rows {
            let candidate = candidate?;
            if row.map_or(true, |(_, as_of)| candidate.1 >= as_of) {
                row = Some(candidate);
            }
        }

        Ok(row.map(|(value, as_of)| Observation {
            station: station.to_string(),
            metric: Metric::Precipitation,
            period_start: month_start(as_of.date_naive()),
            value,
            as_of,
        }))
    }

    fn latest_temperature_observation(
        &self,
        station: &str,
        forecast_type: ForecastType,
    ) -> Result<Option<Observation>, StoreError> {
        let obs = self
            .conn
            .query_row(
                "SELECT location_id, obs_date, forecast_type, observed_value, as_of
                 FROM temperature_observations
                 WHERE location_id = ?1 AND forecast_type = ?2
                 ORDER BY obs_date DESC LIMIT 1",
                params![station, forecast_type.as_str()],
                temperature_observation_from_row,
            )
            .optional()?;
        Ok(obs)
    }
}

impl ForecastSource for SqliteStore {
    fn fetch_latest_forecasts(&self, station: Option<&str>) -> Result<Vec<ForecastRun>, StoreError> {
        // init_time strings may carry different offsets, so the newest run is
        // picked after parsing rather than with MAX() on text.
        let mut stmt = self.conn.prepare(
            "SELECT location_id, model_name, init_time, observed_mtd, forecast_remainder, is_partial
             FROM forecasts
             WHERE ?1 IS NULL OR location_id = ?1",
        )?;

        let rows = stmt.query_map(params![station], |row| {
            let init_time = parse_timestamp(2, &row.get::<_, String>(2)?)?;
            let remainder: Option<f64> = row.get(4)?;
            let is_partial: Option<bool> = row.get(5)?;

            Ok(ForecastRun {
                station: row.get(0)?,
                model_name: row.get(1)?,
                init_time,
                observed: row.get(3)?,
                forecast_remainder: remainder.unwrap_or(0.0),
                is_partial: is_partial.unwrap_or(false),
            })
        })?;
        let runs = rows.collect::<Result<Vec<_>, _>>()?;

        let latest: Vec<ForecastRun> = select_latest(
            &runs,
            |r| (r.station.as_str(), r.model_name.as_str()),
            |r| r.init_time,
        )
        .into_values()
        .cloned()
        .collect();
        Ok(latest)
    }

    fn fetch_observation(&self, station: &str, metric: Metric) -> Result<Option<Observation>, StoreError> {
        match metric {
            Metric::Precipitation => self.latest_precipitation_observation(station),
            Metric::Temperature(forecast_type) => {
                self.latest_temperature_observation(station, forecast_type)
            }
        }
    }

    fn fetch_climatology(&self, month: u32) -> Result<HashMap<String, f64>, StoreError> {
        let mut stmt = self
            .conn
            .prepare("SELECT location_id, value FROM climatology WHERE month = ?1")?;

        let rows = stmt.query_map(params![month], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?;

        Ok(rows.collect::<Result<HashMap<_, _>, _>>()?)
    }

    fn fetch_active_markets(&self, family: Option<ContractFamily>) -> Result<Vec<MarketContract>, StoreError> {
        let pattern = family.map(|f| format!("{}%", f.prefix()));
        let mut stmt = self.conn.prepare(
            "SELECT ticker, location_id, title, yes_price, no_price, status, target_date
             FROM kalshi_markets
             WHERE status = 'active' AND (?1 IS NULL OR ticker LIKE ?1)
             ORDER BY ticker",
        )?;

        let markets = stmt.query_map(params![pattern], |row| {
            let ticker: String = row.get(0)?;
            let target_date = match row.get::<_, Option<String>>(6)? {
                Some(raw) => Some(parse_date(6, &raw)?),
                None => target_date_from_ticker(&ticker),
            };

            Ok(MarketContract {
                ticker,
                station: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                title: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                yes_price: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                no_price: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
                status: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
                target_date,
            })
        })?;

        Ok(markets.collect::<Result<Vec<_>, _>>()?)
    }

    fn fetch_temperature_forecasts(&self, station: &str) -> Result<Vec<TemperatureForecast>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT location_id, model_name, created_at, target_date, forecast_type, forecast_value
             FROM temperature_forecasts
             WHERE location_id = ?1 AND forecast_value IS NOT NULL
             ORDER BY target_date DESC, model_name",
        )?;

        let forecasts = stmt.query_map(params![station], |row| {
            let issued_at = parse_timestamp(2, &row.get::<_, String>(2)?)?;
            let target_date = parse_date(3, &row.get::<_, String>(3)?)?;
            let raw_type: Option<String> = row.get(4)?;
            let forecast_type = match raw_type {
                Some(raw) => parse_forecast_type(4, &raw)?,
                None => ForecastType::High,
            };

            Ok(TemperatureForecast {
                station: row.get(0)?,
                model_name: row.get(1)?,
                issued_at,
                target_date,
                forecast_type,
                value: row.get(5)?,
            })
        })?;

        Ok(forecasts.collect::<Result<Vec<_>, _>>()?)
    }

    fn fetch_temperature_observations(&self, station: &str) -> Result<Vec<Observation>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT location_id, obs_date, forecast_type, observed_value, as_of
             FROM temperature_observations
             WHERE location_id = ?1
             ORDER BY obs_date DESC, forecast_type",
        )?;

        let observations = stmt.query_map(params![station], temperature_observation_from_row)?;
        Ok(observations.collect::<Result<Vec<_>, _>>()?)
    }
}

fn temperature_observation_from_row(row: &Row<'_>) -> rusqlite::Result<Observation> {
    let period_start = parse_date(1, &row.get::<_, String>(1)?)?;
    let forecast_type = parse_forecast_type(2, &row.get::<_, String>(2)?)?;
    let as_of = parse_timestamp(4, &row.get::<_, String>(4)?)?;

    Ok(Observation {
        station: row.get(0)?,
        metric: Metric::Temperature(forecast_type),
        period_start,
        value: row.get(3)?,
        as_of,
    })
}

/// Ingesters write both RFC 3339 and offset-less ISO-8601; the latter is UTC.
fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(naive.and_utc());
        }
    }
    Err(conversion_error(idx, format!("invalid timestamp {raw:?}")))
}

fn parse_date(idx: usize, raw: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|e| conversion_error(idx, format!("invalid date {raw:?}: {e}")))
}

fn parse_forecast_type(idx: usize, raw: &str) -> rusqlite::Result<ForecastType> {
    ForecastType::parse(raw).ok_or_else(|| conversion_error(idx, format!("invalid forecast type {raw:?}")))
}

fn conversion_error(idx: usize, msg: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, msg.into())
}
