use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Observation location, e.g. `KNYC`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    pub id: String,
    pub name: String,
    /// IANA zone the station's daily high/low is settled in. Stations without
    /// one use the configured default offset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<Tz>,
}

/// Which side of the daily temperature a forecast or contract is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForecastType {
    High,
    Low,
}

impl ForecastType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForecastType::High => "high",
            ForecastType::Low => "low",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Some(ForecastType::High),
            "low" => Some(ForecastType::Low),
            _ => None,
        }
    }
}

impl fmt::Display for ForecastType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Precipitation,
    Temperature(ForecastType),
}

/// A realized measurement. For precipitation `value` is month-to-date inches as
/// of `as_of`; for temperature it is the day's high or low in °F.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub station: String,
    pub metric: Metric,
    pub period_start: NaiveDate,
    pub value: f64,
    pub as_of: DateTime<Utc>,
}

/// One precipitation model run as ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastRun {
    pub station: String,
    pub model_name: String,
    pub init_time: DateTime<Utc>,
    /// Observed month-to-date snapshot the ingester attached to this row.
    pub observed: Option<f64>,
    /// Additional accumulation from `init_time` through the end of the month.
    pub forecast_remainder: f64,
    pub is_partial: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemperatureForecast {
    pub station: String,
    pub model_name: String,
    pub issued_at: DateTime<Utc>,
    pub target_date: NaiveDate,
    pub forecast_type: ForecastType,
    pub value: f64,
}

/// Contract family, encoded by the ticker prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractFamily {
    RainTotal,
    HighTemperature,
    LowTemperature,
}

impl ContractFamily {
    pub const RAIN_PREFIX: &'static str = "KXRAIN";
    pub const HIGH_PREFIX: &'static str = "KXHIGH";
    pub const LOW_PREFIX: &'static str = "KXLOW";

    pub fn from_ticker(ticker: &str) -> Option<Self> {
        let upper = ticker.trim().to_ascii_uppercase();
        if upper.starts_with(Self::RAIN_PREFIX) {
            Some(ContractFamily::RainTotal)
        } else if upper.starts_with(Self::HIGH_PREFIX) {
            Some(ContractFamily::HighTemperature)
        } else if upper.starts_with(Self::LOW_PREFIX) {
            Some(ContractFamily::LowTemperature)
        } else {
            None
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            ContractFamily::RainTotal => Self::RAIN_PREFIX,
            ContractFamily::HighTemperature => Self::HIGH_PREFIX,
            ContractFamily::LowTemperature => Self::LOW_PREFIX,
        }
    }

    pub fn forecast_type(&self) -> Option<ForecastType> {
        match self {
            ContractFamily::RainTotal => None,
            ContractFamily::HighTemperature => Some(ForecastType::High),
            ContractFamily::LowTemperature => Some(ForecastType::Low),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketContract {
    pub ticker: String,
    pub station: String,
    pub title: String,
    /// Ask prices in cents.
    pub yes_price: i64,
    pub no_price: i64,
    pub status: String,
    pub target_date: Option<NaiveDate>,
}

impl MarketContract {
    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case("active")
    }

    pub fn family(&self) -> Option<ContractFamily> {
        ContractFamily::from_ticker(&self.ticker)
    }
}

/// Round half-up to a whole unit. Shared by accuracy tracking and bracket
/// matching so both agree on what "the same degree" means.
pub fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// First instant of the month after `date`, in UTC.
pub fn next_month_start(date: NaiveDate) -> DateTime<Utc> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
