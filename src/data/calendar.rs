//! Business-day arithmetic. Weekends are the only non-business days.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// First business day strictly after `date`.
pub fn next_business_day(date: NaiveDate) -> NaiveDate {
    let mut next = date + Duration::days(1);
    while !is_business_day(next) {
        next += Duration::days(1);
    }
    next
}

/// Every business day in `[start, end]`.
pub fn business_days(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut days = Vec::new();
    let mut current = start;
    while current <= end {
        if is_business_day(current) {
            days.push(current);
        }
        current += Duration::days(1);
    }
    days
}
