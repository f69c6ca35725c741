//! Calendar helpers.
//!
//! Lookback windows are computed with calendar-month arithmetic (month-end
//! clamping via [`chrono::Months`]), never with fixed day counts.

use chrono::{Datelike, Months, NaiveDate};
use std::ops::RangeInclusive;

/// Unix epoch, the origin of polars' physical `Date` values.
fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

/// Convert a date to days since the Unix epoch.
pub fn date_to_days(date: NaiveDate) -> i32 {
    (date - epoch()).num_days() as i32
}

/// Convert days since the Unix epoch to a date.
pub fn days_to_date(days: i32) -> Option<NaiveDate> {
    epoch().checked_add_signed(chrono::Duration::days(i64::from(days)))
}

/// Absolute month number (`year * 12 + month0`).
pub fn month_index(date: NaiveDate) -> i32 {
    date.year() * 12 + date.month0() as i32
}

/// First day of the month with the given absolute month number.
pub fn month_start(index: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(index.div_euclid(12), index.rem_euclid(12) as u32 + 1, 1)
}

/// Calendar months from `from` to `to` (positive when `to` is later).
pub fn months_between(from: NaiveDate, to: NaiveDate) -> i32 {
    month_index(to) - month_index(from)
}

/// Months whose first day lies in `[anchor - lookback months, anchor]`.
///
/// With an anchor of March 31 and a 3-month lookback the window opens on
/// December 31, so January, February and March are included.
pub fn lookback_months(anchor: NaiveDate, lookback: u32) -> Option<RangeInclusive<i32>> {
    let opens = anchor.checked_sub_months(Months::new(lookback))?;
    let first = if opens.day() == 1 {
        month_index(opens)
    } else {
        month_index(opens) + 1
    };
    Some(first..=month_index(anchor))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_days_round_trip() {
        let d = date(2016, 12, 31);
        assert_eq!(days_to_date(date_to_days(d)), Some(d));
        assert_eq!(date_to_days(date(1970, 1, 2)), 1);
    }

    #[test]
    fn test_month_start_handles_december() {
        let idx = month_index(date(2019, 12, 15));
        assert_eq!(month_start(idx), Some(date(2019, 12, 1)));
        assert_eq!(month_start(idx + 1), Some(date(2020, 1, 1)));
    }

    #[rstest]
    #[case(date(2020, 3, 31), 3, date(2020, 1, 1), date(2020, 3, 1))]
    #[case(date(2016, 12, 31), 12, date(2016, 1, 1), date(2016, 12, 1))]
    #[case(date(2016, 6, 30), 12, date(2015, 7, 1), date(2016, 6, 1))]
    // Window opening exactly on a month start includes that month.
    #[case(date(2020, 3, 1), 3, date(2019, 12, 1), date(2020, 3, 1))]
    // Month-end clamping: Feb 29 minus 12 months is Feb 28.
    #[case(date(2020, 2, 29), 12, date(2019, 3, 1), date(2020, 2, 1))]
    fn test_lookback_months(
        #[case] anchor: NaiveDate,
        #[case] lookback: u32,
        #[case] first: NaiveDate,
        #[case] last: NaiveDate,
    ) {
        let range = lookback_months(anchor, lookback).unwrap();
        assert_eq!(month_start(*range.start()), Some(first));
        assert_eq!(month_start(*range.end()), Some(last));
    }

    #[test]
    fn test_months_between() {
        assert_eq!(months_between(date(2015, 12, 31), date(2016, 12, 31)), 12);
        assert_eq!(months_between(date(2015, 12, 31), date(2016, 6, 30)), 6);
    }
}
