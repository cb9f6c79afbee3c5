use chrono::NaiveDate;

/// Failures reported by a [`ForecastSource`](crate::data::source::ForecastSource).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Store query failed: {0}")]
    Query(String),
}

/// Conditions raised while assembling views. Everything except
/// `MissingEssentialData` is recovered where it happens and only logged.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CoreError {
    #[error("Source {source_name} unavailable, using empty result: {reason}")]
    MissingSource {
        source_name: &'static str,
        reason: String,
    },

    #[error("No data for station {station}")]
    MissingEssentialData { station: String },

    #[error("Unparseable market title for {ticker}: {title:?}")]
    UnparseableMarketTitle { ticker: String, title: String },

    #[error("No forecasts for station {station} on active date {date}")]
    AmbiguousTargetDate { station: String, date: NaiveDate },
}
