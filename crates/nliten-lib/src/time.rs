//! User-supplied times for `query`, e.g. `08-02-2021 17:30` local time.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};

/// Command-line time format: day-month-year hour:minute.
pub const TIME_FORMAT: &str = "%d-%m-%Y %H:%M";

/// Parse a local time into Unix epoch seconds.
///
/// Ambiguous local times (DST fall-back) resolve to the earlier instant;
/// nonexistent ones (spring-forward gap) are an error.
pub fn parse_local_time(s: &str) -> crate::error::Result<i64> {
    let naive = NaiveDateTime::parse_from_str(s.trim(), TIME_FORMAT).map_err(|e| {
        crate::NlitenError::Time(format!("'{s}' does not match DD-MM-YYYY HH:MM: {e}"))
    })?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp())
        .ok_or_else(|| crate::NlitenError::Time(format!("'{s}' does not exist in the local timezone")))
}

/// `YYYY-mm-dd` for an epoch time, as the `summary` endpoint expects.
pub fn summary_date(epoch: i64) -> crate::error::Result<String> {
    DateTime::from_timestamp(epoch, 0)
        .map(|utc| utc.with_timezone(&Local).format("%Y-%m-%d").to_string())
        .ok_or_else(|| crate::NlitenError::Time(format!("epoch {epoch} out of range")))
}

/// Check that a begin/end pair is ordered.
pub fn check_window(start: Option<i64>, end: Option<i64>) -> crate::error::Result<()> {
    if let (Some(start), Some(end)) = (start, end)
        && start > end
    {
        return Err(crate::NlitenError::Time(format!(
            "begin time ({start}) is after end time ({end})"
        )));
    }
    Ok(())
}

/// Current time in Unix epoch seconds.
pub fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_documented_example() {
        let epoch = parse_local_time("08-02-2021 17:30").unwrap();
        let back = DateTime::from_timestamp(epoch, 0).unwrap().with_timezone(&Local);
        assert_eq!(back.format(TIME_FORMAT).to_string(), "08-02-2021 17:30");
    }

    #[test]
    fn one_minute_apart() {
        let a = parse_local_time("08-02-2021 17:30").unwrap();
        let b = parse_local_time("08-02-2021 17:31").unwrap();
        assert_eq!(b - a, 60);
    }

    #[test]
    fn surrounding_whitespace_ignored() {
        assert_eq!(
            parse_local_time(" 08-02-2021 17:30 ").unwrap(),
            parse_local_time("08-02-2021 17:30").unwrap()
        );
    }

    #[test]
    fn rejects_iso_order() {
        let err = parse_local_time("2021-02-08 17:30").unwrap_err();
        assert!(matches!(err, crate::NlitenError::Time(_)));
        assert!(err.to_string().contains("2021-02-08 17:30"));
    }

    #[test]
    fn rejects_missing_time() {
        assert!(parse_local_time("08-02-2021").is_err());
    }

    #[test]
    fn rejects_invalid_day() {
        assert!(parse_local_time("31-02-2021 10:00").is_err());
    }

    #[test]
    fn summary_date_is_local_calendar_day() {
        let epoch = parse_local_time("29-07-2016 12:00").unwrap();
        assert_eq!(summary_date(epoch).unwrap(), "2016-07-29");
    }

    #[test]
    fn window_order() {
        assert!(check_window(Some(1), Some(2)).is_ok());
        assert!(check_window(Some(2), Some(2)).is_ok());
        assert!(check_window(Some(3), Some(2)).is_err());
        assert!(check_window(None, Some(2)).is_ok());
        assert!(check_window(Some(3), None).is_ok());
    }

    #[test]
    fn now_is_after_2020() {
        assert!(now_epoch() > 1_577_836_800);
    }
}
