use anyhow::Result;
use chrono::{DateTime, Utc};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::view::assembler::ForecastViews;

const HEADER: &str = "timestamp,station,model,observed,forecast_remainder,total,is_partial";

/// Appends projected totals to a CSV file, one line per (station, model).
pub struct CsvLogger {
    log_path: PathBuf,
}

impl CsvLogger {
    pub fn new(log_path: impl AsRef<Path>) -> Result<Self> {
        let log_path = log_path.as_ref().to_path_buf();
        // Create CSV file with headers if it doesn't exist
        if !log_path.exists() {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .open(&log_path)?;

            writeln!(file, "{}", HEADER)?;
        }

        Ok(Self { log_path })
    }

    /// Log every projected total in `views`. Returns the number of lines written.
    pub fn log_projections(&self, at: DateTime<Utc>, views: &ForecastViews) -> Result<usize> {
        let mut file = OpenOptions::new().append(true).open(&self.log_path)?;

        let mut written = 0;
        for (station, view) in &views.stations {
            for model in &view.models {
                writeln!(
                    file,
                    "{},{},{},{:.2},{:.2},{:.2},{}",
                    at.to_rfc3339(),
                    station,
                    csv_field(&model.model),
                    model.observed,
                    model.forecast_remainder,
                    model.total,
                    model.is_partial
                )?;
                written += 1;
            }
        }

        Ok(written)
    }
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
