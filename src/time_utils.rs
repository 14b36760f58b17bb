//! Wall-clock helpers shared by the timer engine, notification scheduler,
//! and plan validator. All time reads use local wall-clock time
//! (spec §6.4); the engine tolerates a few seconds of drift per minute
//! and makes no sub-second precision claims (spec §1 Non-goals).

use chrono::{Local, NaiveTime, Timelike};

pub const SECONDS_IN_DAY: i64 = 86_400;

/// Current local wall-clock time.
pub fn now() -> chrono::DateTime<Local> {
    Local::now()
}

/// Seconds remaining until local midnight, computed from `now`.
pub fn seconds_until_midnight(now: chrono::DateTime<Local>) -> i64 {
    let elapsed_today =
        now.hour() as i64 * 3600 + now.minute() as i64 * 60 + now.second() as i64;
    (SECONDS_IN_DAY - elapsed_today).max(0)
}

/// Parses a `"HH:MM"` string against today's date, anchored to `now`'s
/// calendar day. Returns `None` on any parse failure — unparseable
/// `scheduled_time` is silently skipped everywhere in this engine
/// (spec §4.2).
pub fn parse_scheduled_time(
    scheduled_time: &str,
    now: chrono::DateTime<Local>,
) -> Option<chrono::DateTime<Local>> {
    let t = NaiveTime::parse_from_str(scheduled_time, "%H:%M").ok()?;
    now.date_naive().and_time(t).and_local_timezone(Local).single()
}

/// Seconds from `now` until `target`. Negative if `target` is in the past.
pub fn seconds_until(target: chrono::DateTime<Local>, now: chrono::DateTime<Local>) -> i64 {
    (target - now).num_seconds()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> chrono::DateTime<Local> {
        Local.with_ymd_and_hms(2024, 6, 1, h, m, s).unwrap()
    }

    #[test]
    fn seconds_until_midnight_at_start_of_day() {
        assert_eq!(seconds_until_midnight(at(0, 0, 0)), SECONDS_IN_DAY);
    }

    #[test]
    fn seconds_until_midnight_one_second_before() {
        assert_eq!(seconds_until_midnight(at(23, 59, 59)), 1);
    }

    #[test]
    fn parse_scheduled_time_valid() {
        let now = at(8, 0, 0);
        let parsed = parse_scheduled_time("09:00", now).unwrap();
        assert_eq!(parsed.hour(), 9);
        assert_eq!(parsed.minute(), 0);
    }

    #[test]
    fn parse_scheduled_time_invalid_is_none() {
        let now = at(8, 0, 0);
        assert!(parse_scheduled_time("not-a-time", now).is_none());
        assert!(parse_scheduled_time("25:61", now).is_none());
    }

    #[test]
    fn seconds_until_counts_forward() {
        let now = at(8, 56, 0);
        let target = at(9, 0, 0);
        assert_eq!(seconds_until(target, now), 240);
    }
}
