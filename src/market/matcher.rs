use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, warn};

use crate::data::ticker::target_date_from_ticker;
use crate::data::types::{round_half_up, ContractFamily, MarketContract};
use crate::error::CoreError;
use crate::market::bracket::{Bracket, BracketParser};

/// A contract lined up against the models forecasting the same outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketMatch {
    pub ticker: String,
    pub title: String,
    pub yes_price: i64,
    pub no_price: i64,
    pub target_date: NaiveDate,
    pub bracket: Bracket,
    /// Models whose rounded forecast falls inside the bracket.
    pub matches: usize,
    pub total_models: usize,
}

pub struct MarketMatcher {
    parser: BracketParser,
}

impl MarketMatcher {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            parser: BracketParser::new()?,
        })
    }

    pub fn parse_title(&self, title: &str) -> Bracket {
        self.parser.parse(title)
    }

    /// Count how many model values agree with the contract's bracket.
    /// Temperatures settle on whole degrees and are rounded half-up first;
    /// rain totals are compared as projected.
    pub fn agreement(&self, bracket: &Bracket, family: ContractFamily, values: &[f64]) -> usize {
        values
            .iter()
            .filter(|v| bracket.contains(settlement_value(family, **v)))
            .count()
    }

    /// Match every contract routed to `(station, family, target_date)`.
    /// Inactive contracts, other families and contracts without a resolvable
    /// date are skipped.
    pub fn match_contracts(
        &self,
        contracts: &[MarketContract],
        station: &str,
        family: ContractFamily,
        target_date: NaiveDate,
        values: &[f64],
    ) -> Vec<MarketMatch> {
        contracts
            .iter()
            .filter(|c| c.is_active() && c.station == station && c.family() == Some(family))
            .filter_map(|contract| {
                let Some(date) = resolve_target_date(contract) else {
                    debug!("Dropping {} from matched view: no target date", contract.ticker);
                    return None;
                };
                if date != target_date {
                    return None;
                }

                let bracket = self.parse_title(&contract.title);
                if !bracket.is_recognized() {
                    let err = CoreError::UnparseableMarketTitle {
                        ticker: contract.ticker.clone(),
                        title: contract.title.clone(),
                    };
                    warn!("{}", err);
                }

                Some(MarketMatch {
                    ticker: contract.ticker.clone(),
                    title: contract.title.clone(),
                    yes_price: contract.yes_price,
                    no_price: contract.no_price,
                    target_date: date,
                    bracket,
                    matches: self.agreement(&bracket, family, values),
                    total_models: values.len(),
                })
            })
            .collect()
    }
}

fn settlement_value(family: ContractFamily, value: f64) -> f64 {
    match family {
        ContractFamily::RainTotal => value,
        ContractFamily::HighTemperature | ContractFamily::LowTemperature => {
            round_half_up(value) as f64
        }
    }
}

/// Explicit target date if the store has one, otherwise whatever the ticker encodes.
pub fn resolve_target_date(contract: &MarketContract) -> Option<NaiveDate> {
    contract
        .target_date
        .or_else(|| target_date_from_ticker(&contract.ticker))
}
