//! Schedule expansion: frequency patterns and dose-event generation.
//!
//! A frequency pattern like `"1-0-1"` selects which of the three daily
//! slots (morning 08:00, afternoon 14:00, night 20:00) a dose is taken.
//! Expansion walks the course's date range one calendar day at a time and
//! emits one pending reminder per selected slot. This is the single
//! routine behind every workflow that generates reminders; it is pure and
//! never touches the database or the clock.

use chrono::{Datelike, NaiveDate};

use crate::models::{NewReminder, Slot};
use crate::trackers::TrackerError;

/// Per-day dose flags for the three daily slots, in slot order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrequencyPattern([bool; 3]);

impl FrequencyPattern {
    /// Parse a `"1-0-1"`-style string: exactly three `-`-separated flags,
    /// each `0` or `1`. An all-zero pattern is valid and expands to nothing.
    pub fn parse(s: &str) -> Result<Self, TrackerError> {
        let parts: Vec<&str> = s.split('-').collect();
        if parts.len() != 3 {
            return Err(TrackerError::InvalidPattern(s.to_string()));
        }
        let mut flags = [false; 3];
        for (i, part) in parts.iter().enumerate() {
            match part.trim() {
                "0" => flags[i] = false,
                "1" => flags[i] = true,
                _ => return Err(TrackerError::InvalidPattern(s.to_string())),
            }
        }
        Ok(Self(flags))
    }

    pub fn takes(&self, slot: Slot) -> bool {
        self.0[slot as usize]
    }

    /// Number of doses per day (set flags).
    pub fn doses_per_day(&self) -> usize {
        self.0.iter().filter(|f| **f).count()
    }
}

impl std::str::FromStr for FrequencyPattern {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Default course end when none is given: same month/day one year later.
/// Feb 29 clamps to Feb 28 in the non-leap target year.
pub fn default_end_date(start: NaiveDate) -> NaiveDate {
    let year = start.year() + 1;
    NaiveDate::from_ymd_opt(year, start.month(), start.day())
        .or_else(|| NaiveDate::from_ymd_opt(year, 2, 28))
        .unwrap_or(start) // unreachable: only Feb 29 fails the first lookup
}

/// Expand a course's date range into its full reminder batch.
///
/// Walks `start..=end` in calendar days (not 24 h steps, so the fixed
/// wall-clock hours survive DST transitions) and emits one reminder per
/// set slot, mornings first. The result is ordered by `(day, slot)` and
/// has exactly `inclusive_days × doses_per_day` entries. An inverted
/// range (`end < start`) yields an empty batch.
pub fn expand_schedule(
    start: NaiveDate,
    end: Option<NaiveDate>,
    pattern: &FrequencyPattern,
) -> Vec<NewReminder> {
    let end = end.unwrap_or_else(|| default_end_date(start));

    let mut reminders = Vec::new();
    let mut day = start;
    while day <= end {
        for slot in Slot::ALL {
            if pattern.takes(slot) {
                if let Some(date) = day.and_hms_opt(slot.hour(), 0, 0) {
                    reminders.push(NewReminder { date, time: slot });
                }
            }
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break, // end of the calendar
        }
    }
    reminders
}
