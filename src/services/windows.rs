use chrono::{Datelike, Duration, NaiveDate, Utc};
use chrono_tz::Tz;

/// Half-open date range `[start, end)` used by every aggregate query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl TimeWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    pub fn single_day(day: NaiveDate) -> Self {
        Self::new(day, day + Duration::days(1))
    }

    /// ISO Monday of `today` through `today`, inclusive.
    pub fn week_to_date(today: NaiveDate) -> Self {
        let monday = iso_monday(today);
        Self::new(monday, today + Duration::days(1))
    }

    /// The same weekday span one week earlier, for week-over-week
    /// comparisons against an equal number of elapsed days.
    pub fn prior_week_equivalent(today: NaiveDate) -> Self {
        let current = Self::week_to_date(today);
        Self::new(
            current.start - Duration::days(7),
            current.end - Duration::days(7),
        )
    }

    /// First of the month through `today`, inclusive.
    pub fn month_to_date(today: NaiveDate) -> Self {
        let first = first_of_month(today);
        Self::new(first, today + Duration::days(1))
    }

    /// The prior month's window covering the same day-of-month span,
    /// clamped to the prior month's length (Mar 31 compares against all of
    /// February, not a nonexistent Feb 31).
    pub fn prior_month_equivalent(today: NaiveDate) -> Self {
        let current_first = first_of_month(today);
        let prior_first = first_of_prior_month(today);
        let span = Duration::days(i64::from(today.day()));
        let end = std::cmp::min(prior_first + span, current_first);
        Self::new(prior_first, end)
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days().max(0)
    }
}

/// The run date in the tenant-facing reporting timezone. All windows are
/// anchored to this, not to UTC midnight.
pub fn business_today(tz: Tz) -> NaiveDate {
    Utc::now().with_timezone(&tz).date_naive()
}

fn iso_monday(day: NaiveDate) -> NaiveDate {
    day - Duration::days(i64::from(day.weekday().num_days_from_monday()))
}

fn first_of_month(day: NaiveDate) -> NaiveDate {
    day.with_day(1).unwrap_or(day)
}

fn first_of_prior_month(day: NaiveDate) -> NaiveDate {
    let first = first_of_month(day);
    first_of_month(first - Duration::days(1))
}
