//! Pure aggregate arithmetic

use chrono::{Datelike, NaiveDate};

/// Age brackets used by the population breakdown
pub const AGE_BUCKETS: [&str; 5] = ["0-18", "19-35", "36-50", "51-65", "65+"];

/// Relative change from `previous` to `recent`, in percent, one decimal
///
/// A rise from zero counts as 100%; no change from zero is 0%.
pub fn percentage_change(recent: i64, previous: i64) -> f64 {
    if previous == 0 {
        return if recent > 0 { 100.0 } else { 0.0 };
    }
    let change = (recent - previous) as f64 / previous as f64 * 100.0;
    round1(change)
}

pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Whole years between birth and `today`; `None` for future birth dates
pub fn age_on(date_of_birth: NaiveDate, today: NaiveDate) -> Option<u32> {
    if date_of_birth > today {
        return None;
    }
    let mut age = today.year() - date_of_birth.year();
    if (today.month(), today.day()) < (date_of_birth.month(), date_of_birth.day()) {
        age -= 1;
    }
    u32::try_from(age).ok()
}

pub fn age_bucket(age: u32) -> &'static str {
    match age {
        0..=18 => AGE_BUCKETS[0],
        19..=35 => AGE_BUCKETS[1],
        36..=50 => AGE_BUCKETS[2],
        51..=65 => AGE_BUCKETS[3],
        _ => AGE_BUCKETS[4],
    }
}

/// Running mean over numeric samples
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    pub fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn value(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(round1(self.sum / self.count as f64))
        }
    }
}

/// First day of the month containing `date`
pub fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// First day of the calendar quarter containing `date`
pub fn quarter_start(date: NaiveDate) -> NaiveDate {
    let first_month = (date.month0() / 3) * 3 + 1;
    NaiveDate::from_ymd_opt(date.year(), first_month, 1).unwrap_or(date)
}
