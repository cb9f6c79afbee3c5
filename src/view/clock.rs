use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::data::types::Station;

/// Source of "now". Everything date-dependent takes one of these instead of
/// reading the system clock.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Pinned instant, for tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Picks the temperature target date: today before the local cutoff,
/// tomorrow at or after it. "Local" is the station's own zone when it has
/// one, otherwise the fixed fallback offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveDatePolicy {
    cutoff: NaiveTime,
    offset: FixedOffset,
}

impl ActiveDatePolicy {
    /// `None` if the hour or offset is out of range.
    pub fn new(cutoff_hour: u32, utc_offset_hours: i32) -> Option<Self> {
        Some(Self {
            cutoff: NaiveTime::from_hms_opt(cutoff_hour, 0, 0)?,
            offset: FixedOffset::east_opt(utc_offset_hours.checked_mul(3600)?)?,
        })
    }

    /// Active date at the fallback offset.
    pub fn active_date(&self, now: DateTime<Utc>) -> NaiveDate {
        self.active_date_in(now, &self.offset)
    }

    pub fn active_date_in<Z: TimeZone>(&self, now: DateTime<Utc>, tz: &Z) -> NaiveDate {
        let local = now.with_timezone(tz);
        let today = local.date_naive();
        if local.time() >= self.cutoff {
            today.succ_opt().unwrap_or(today)
        } else {
            today
        }
    }

    pub fn active_date_for(&self, station: &Station, clock: &dyn Clock) -> NaiveDate {
        let now = clock.now();
        match &station.timezone {
            Some(tz) => self.active_date_in(now, tz),
            None => self.active_date(now),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::America::{Los_Angeles, New_York};

    fn mst(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        FixedOffset::west_opt(7 * 3600)
            .unwrap()
            .with_ymd_and_hms(y, m, d, h, min, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn station(id: &str, timezone: Option<chrono_tz::Tz>) -> Station {
        Station {
            id: id.to_string(),
            name: id.to_string(),
            timezone,
        }
    }

    #[test]
    fn test_before_cutoff_is_today() {
        let policy = ActiveDatePolicy::new(20, -7).unwrap();
        let clock = FixedClock(mst(2026, 1, 22, 19, 59));
        assert_eq!(
            policy.active_date_for(&station("KDEN", None), &clock),
            NaiveDate::from_ymd_opt(2026, 1, 22).unwrap()
        );
    }

    #[test]
    fn test_cutoff_is_tomorrow() {
        let policy = ActiveDatePolicy::new(20, -7).unwrap();
        let clock = FixedClock(mst(2026, 1, 22, 20, 0));
        assert_eq!(
            policy.active_date_for(&station("KDEN", None), &clock),
            NaiveDate::from_ymd_opt(2026, 1, 23).unwrap()
        );
    }

    #[test]
    fn test_fallback_offset_differs_from_utc() {
        let policy = ActiveDatePolicy::new(20, -7).unwrap();
        // 02:30 UTC on the 23rd is 19:30 MST on the 22nd.
        let now = Utc.with_ymd_and_hms(2026, 1, 23, 2, 30, 0).unwrap();
        assert_eq!(policy.active_date(now), NaiveDate::from_ymd_opt(2026, 1, 22).unwrap());
    }

    #[test]
    fn test_station_zone_decides_cutoff() {
        let policy = ActiveDatePolicy::new(20, -7).unwrap();
        let nyc = station("KNYC", Some(New_York));
        let sfo = station("KSFO", Some(Los_Angeles));

        // 01:30Z on the 23rd: 20:30 EST (past cutoff), 17:30 PST (before it).
        let clock = FixedClock(Utc.with_ymd_and_hms(2026, 1, 23, 1, 30, 0).unwrap());
        assert_eq!(
            policy.active_date_for(&nyc, &clock),
            NaiveDate::from_ymd_opt(2026, 1, 23).unwrap()
        );
        assert_eq!(
            policy.active_date_for(&sfo, &clock),
            NaiveDate::from_ymd_opt(2026, 1, 22).unwrap()
        );
        // The fixed fallback would have said 18:30, still the 22nd.
        assert_eq!(
            policy.active_date(clock.now()),
            NaiveDate::from_ymd_opt(2026, 1, 22).unwrap()
        );

        // 04:00Z on the 23rd: 20:00 PST, now past cutoff on the west coast too.
        let clock = FixedClock(Utc.with_ymd_and_hms(2026, 1, 23, 4, 0, 0).unwrap());
        assert_eq!(
            policy.active_date_for(&sfo, &clock),
            NaiveDate::from_ymd_opt(2026, 1, 23).unwrap()
        );
    }

    #[test]
    fn test_station_zone_follows_dst() {
        let policy = ActiveDatePolicy::new(20, -7).unwrap();
        let nyc = station("KNYC", Some(New_York));
        // 00:30Z on July 23 is 20:30 EDT on the 22nd.
        let clock = FixedClock(Utc.with_ymd_and_hms(2026, 7, 23, 0, 30, 0).unwrap());
        assert_eq!(
            policy.active_date_for(&nyc, &clock),
            NaiveDate::from_ymd_opt(2026, 7, 23).unwrap()
        );
        // 23:30Z on July 22 is 19:30 EDT.
        let clock = FixedClock(Utc.with_ymd_and_hms(2026, 7, 22, 23, 30, 0).unwrap());
        assert_eq!(
            policy.active_date_for(&nyc, &clock),
            NaiveDate::from_ymd_opt(2026, 7, 22).unwrap()
        );
    }

    #[test]
    fn test_month_rollover() {
        let policy = ActiveDatePolicy::new(20, -7).unwrap();
        assert_eq!(
            policy.active_date(mst(2026, 1, 31, 21, 0)),
            NaiveDate::from_ymd_opt(2026, 2, 1).unwrap()
        );
    }

    #[test]
    fn test_invalid_policy() {
        assert!(ActiveDatePolicy::new(24, 0).is_none());
        assert!(ActiveDatePolicy::new(20, 30).is_none());
    }
}
