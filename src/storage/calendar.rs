//! Calendar rules
//!
//! Pure, allocation-free functions giving the variable sizes of calendar
//! units in the proleptic Gregorian calendar. Weeks follow ISO 8601: week 1
//! is the week containing 4 January, so a year has 53 weeks when it starts
//! on a Thursday, or on a Wednesday in a leap year.

use chrono::{Datelike, NaiveDate};

/// Hours in one day
pub const HOURS_IN_DAY: u32 = 24;
/// Days in one week
pub const DAYS_IN_WEEK: u32 = 7;
/// Hours in one week
pub const HOURS_IN_WEEK: u32 = DAYS_IN_WEEK * HOURS_IN_DAY;
/// Months in one year
pub const MONTHS_IN_YEAR: u32 = 12;

/// Weeks in an ISO year without a week 53
pub const MIN_WEEKS_IN_YEAR: u32 = 52;

/// Cumulative days before each month in a common year
const DAYS_BEFORE_MONTH: [u32; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];

pub fn is_leap_year(year: i32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

/// Days in `month` (1-12) of `year`; 0 for a month outside 1-12
pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

pub fn days_in_year(year: i32) -> u32 {
    if is_leap_year(year) {
        366
    } else {
        365
    }
}

pub fn hours_in_month(year: i32, month: u32) -> u32 {
    HOURS_IN_DAY * days_in_month(year, month)
}

pub fn hours_in_year(year: i32) -> u32 {
    HOURS_IN_DAY * days_in_year(year)
}

/// Number of ISO 8601 weeks (52 or 53) in `year`
///
/// 28 December always falls in the last ISO week of its year.
pub fn weeks_in_year(year: i32) -> u32 {
    NaiveDate::from_ymd_opt(year, 12, 28)
        .map(|d| d.iso_week().week())
        .unwrap_or(MIN_WEEKS_IN_YEAR)
}

/// Days in the months of `year` preceding `month` (1-12)
pub fn days_before_month(year: i32, month: u32) -> u32 {
    let idx = month.clamp(1, 12) as usize - 1;
    let leap_day = u32::from(month > 2 && is_leap_year(year));
    DAYS_BEFORE_MONTH[idx] + leap_day
}

/// Days from 1 January 0001 to 1 January of `year`
fn days_to_year(year: i32) -> i64 {
    let y = i64::from(year) - 1;
    365 * y + y.div_euclid(4) - y.div_euclid(100) + y.div_euclid(400)
}

/// Days between 1 January of `from` and 1 January of `to`
pub fn days_between_years(from: i32, to: i32) -> i64 {
    days_to_year(to) - days_to_year(from)
}

/// Day number of the Monday that opens ISO week 1 of `year`
fn iso_week_one_monday(year: i32) -> i64 {
    let jan4 = days_to_year(year) + 3;
    // 0001-01-01 is a Monday
    jan4 - jan4.rem_euclid(7)
}

/// ISO weeks between week 1 of `from` and week 1 of `to`
pub fn weeks_between_years(from: i32, to: i32) -> i64 {
    (iso_week_one_monday(to) - iso_week_one_monday(from)) / i64::from(DAYS_IN_WEEK)
}
