use regex::Regex;
use serde::{Deserialize, Serialize};

/// Payout condition of a contract, parsed from its title.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Bracket {
    /// `min <= value < max`; the upper bound belongs to the next bracket.
    Closed { min: f64, max: f64 },
    /// `value > min`
    OpenAbove { min: f64 },
    /// `value < max`
    OpenBelow { max: f64 },
    /// Title matched no known pattern; matches nothing.
    Unrecognized,
}

impl Bracket {
    pub fn contains(&self, value: f64) -> bool {
        match *self {
            Bracket::Closed { min, max } => min <= value && value < max,
            Bracket::OpenAbove { min } => value > min,
            Bracket::OpenBelow { max } => value < max,
            Bracket::Unrecognized => false,
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Bracket::Unrecognized)
    }
}

const NUMBER: &str = r"(-?\d+(?:\.\d+)?)";

/// Compiled title patterns. Parsing never fails; unmatched titles yield
/// [`Bracket::Unrecognized`].
#[derive(Debug, Clone)]
pub struct BracketParser {
    range: Regex,
    below: Regex,
    above: Regex,
}

impl BracketParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            range: Regex::new(&format!(r"(?i){NUMBER}\s*°?\s*[a-z]*\s+to\s+{NUMBER}"))?,
            below: Regex::new(&format!(r"(?i)\b(?:below|under)\s+{NUMBER}"))?,
            above: Regex::new(&format!(r"(?i)\b(?:above|over)\s+{NUMBER}"))?,
        })
    }

    pub fn parse(&self, title: &str) -> Bracket {
        if let Some(cap) = self.range.captures(title) {
            if let (Some(a), Some(b)) = (number(&cap, 1), number(&cap, 2)) {
                return Bracket::Closed {
                    min: a.min(b),
                    max: a.max(b),
                };
            }
        }

        if let Some(max) = self.below.captures(title).and_then(|cap| number(&cap, 1)) {
            return Bracket::OpenBelow { max };
        }

        if let Some(min) = self.above.captures(title).and_then(|cap| number(&cap, 1)) {
            return Bracket::OpenAbove { min };
        }

        Bracket::Unrecognized
    }
}

fn number(cap: &regex::Captures<'_>, idx: usize) -> Option<f64> {
    cap.get(idx)?.as_str().parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(title: &str) -> Bracket {
        BracketParser::new().unwrap().parse(title)
    }

    #[test]
    fn test_closed_range() {
        assert_eq!(parse("20° to 21°"), Bracket::Closed { min: 20.0, max: 21.0 });
        assert_eq!(parse("66 TO 67"), Bracket::Closed { min: 66.0, max: 67.0 });
        assert_eq!(
            parse("3 inches to 4 inches"),
            Bracket::Closed { min: 3.0, max: 4.0 }
        );
        assert_eq!(
            parse("Will the high be 20.5° to 21.5°?"),
            Bracket::Closed { min: 20.5, max: 21.5 }
        );
    }

    #[test]
    fn test_open_brackets() {
        assert_eq!(parse("Below 20°"), Bracket::OpenBelow { max: 20.0 });
        assert_eq!(parse("under 2 inches"), Bracket::OpenBelow { max: 2.0 });
        assert_eq!(parse("Above 73°"), Bracket::OpenAbove { min: 73.0 });
        assert_eq!(parse("OVER 4"), Bracket::OpenAbove { min: 4.0 });
        assert_eq!(parse("below -5°"), Bracket::OpenBelow { max: -5.0 });
    }

    #[test]
    fn test_unrecognized_titles() {
        assert_eq!(parse(""), Bracket::Unrecognized);
        assert_eq!(parse("Will it rain in NYC?"), Bracket::Unrecognized);
        assert_eq!(parse("to 21°"), Bracket::Unrecognized);
        assert_eq!(parse("Hoover Dam"), Bracket::Unrecognized);
    }

    #[test]
    fn test_contains() {
        let below = Bracket::OpenBelow { max: 20.0 };
        assert!(below.contains(19.0));
        assert!(!below.contains(20.0));

        let above = Bracket::OpenAbove { min: 20.0 };
        assert!(above.contains(21.0));
        assert!(!above.contains(20.0));

        let closed = Bracket::Closed { min: 20.0, max: 21.0 };
        assert!(closed.contains(20.0));
        assert!(closed.contains(20.99));
        assert!(!closed.contains(21.0));
        assert!(!closed.contains(19.99));

        assert!(!Bracket::Unrecognized.contains(0.0));
    }
}
