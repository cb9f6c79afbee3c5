use chrono::NaiveDate;

const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

/// Resolve a contract's target date from its ticker.
///
/// Tickers look like `KXHIGHNY-26JAN23-T66` (daily, `YYMMMDD`) or
/// `KXRAINNYCM-26JAN-4` (monthly, `YYMMM`, resolved to the first of the month).
/// The first dash-separated segment that parses wins.
pub fn target_date_from_ticker(ticker: &str) -> Option<NaiveDate> {
    ticker.split('-').skip(1).find_map(parse_segment)
}

fn parse_segment(segment: &str) -> Option<NaiveDate> {
    let segment = segment.trim().to_ascii_uppercase();
    if !(segment.len() == 5 || segment.len() == 7) || !segment.is_ascii() {
        return None;
    }

    let year: i32 = segment[0..2].parse().ok()?;
    let month = MONTHS.iter().position(|m| *m == &segment[2..5])? as u32 + 1;
    let day: u32 = if segment.len() == 7 {
        segment[5..7].parse().ok()?
    } else {
        1
    };

    NaiveDate::from_ymd_opt(2000 + year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daily_ticker() {
        assert_eq!(
            target_date_from_ticker("KXHIGHNY-26JAN23-T66"),
            NaiveDate::from_ymd_opt(2026, 1, 23)
        );
        assert_eq!(
            target_date_from_ticker("KXLOWTNYC-25dec31-B20.5"),
            NaiveDate::from_ymd_opt(2025, 12, 31)
        );
    }

    #[test]
    fn test_monthly_ticker() {
        assert_eq!(
            target_date_from_ticker("KXRAINNYCM-26FEB-4"),
            NaiveDate::from_ymd_opt(2026, 2, 1)
        );
    }

    #[test]
    fn test_unresolvable_ticker() {
        assert_eq!(target_date_from_ticker("KXRAINNYCM"), None);
        assert_eq!(target_date_from_ticker("KXHIGHNY-26FEB30-T66"), None);
        assert_eq!(target_date_from_ticker("KXHIGHNY-T66-B20"), None);
        assert_eq!(target_date_from_ticker("KXHIGHNY-2ÉJAN23"), None);
    }
}
