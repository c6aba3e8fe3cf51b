// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::collections::BTreeSet;

use thiserror::Error;
use time::{Date, OffsetDateTime, Weekday};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CalendarError {
    #[error("calendar start {start} is after end {end}")]
    InvalidRange { start: Date, end: Date },
    #[error("calendar {name} has no sessions")]
    Empty { name: String },
}

/// Ordered trading sessions, one per trading day.
pub trait SessionCalendar {
    fn name(&self) -> &str;

    /// Every session the calendar knows about, ascending.
    fn all_sessions(&self) -> &[Date];

    fn first_session(&self) -> Option<Date> {
        self.all_sessions().first().copied()
    }

    fn last_session(&self) -> Option<Date> {
        self.all_sessions().last().copied()
    }

    fn is_session(&self, date: Date) -> bool {
        self.index_of(date).is_some()
    }

    /// Position of `date` among all sessions, if it is one.
    fn index_of(&self, date: Date) -> Option<usize> {
        self.all_sessions().binary_search(&date).ok()
    }

    /// Sessions falling within `[start, end]`.
    fn sessions_in_range(&self, start: Date, end: Date) -> &[Date] {
        let sessions = self.all_sessions();
        let lo = sessions.partition_point(|s| *s < start);
        let hi = sessions.partition_point(|s| *s <= end);
        if lo >= hi { &[] } else { &sessions[lo..hi] }
    }

    /// Sessions from `first_day` through `last_day` inclusive.
    fn slice(&self, first_day: Date, last_day: Date) -> &[Date] {
        self.sessions_in_range(first_day, last_day)
    }
}

/// Monday through Friday sessions between two bounds, minus explicit holidays.
#[derive(Clone, Debug)]
pub struct WeekdayCalendar {
    name: String,
    sessions: Vec<Date>,
}

impl WeekdayCalendar {
    pub fn new(name: impl Into<String>, start: Date, end: Date) -> Result<Self, CalendarError> {
        CalendarBuilder::new(name, start, end).build()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionCalendar for WeekdayCalendar {
    fn name(&self) -> &str {
        &self.name
    }

    fn all_sessions(&self) -> &[Date] {
        &self.sessions
    }
}

pub struct CalendarBuilder {
    name: String,
    start: Date,
    end: Date,
    holidays: BTreeSet<Date>,
}

impl CalendarBuilder {
    pub fn new(name: impl Into<String>, start: Date, end: Date) -> Self {
        Self {
            name: name.into(),
            start,
            end,
            holidays: BTreeSet::new(),
        }
    }

    pub fn holiday(mut self, date: Date) -> Self {
        self.holidays.insert(date);
        self
    }

    pub fn holidays(mut self, dates: impl IntoIterator<Item = Date>) -> Self {
        self.holidays.extend(dates);
        self
    }

    pub fn build(self) -> Result<WeekdayCalendar, CalendarError> {
        if self.start > self.end {
            return Err(CalendarError::InvalidRange {
                start: self.start,
                end: self.end,
            });
        }
        let mut sessions = Vec::new();
        let mut current = Some(self.start);
        while let Some(day) = current {
            if day > self.end {
                break;
            }
            if !matches!(day.weekday(), Weekday::Saturday | Weekday::Sunday)
                && !self.holidays.contains(&day)
            {
                sessions.push(day);
            }
            current = day.next_day();
        }
        if sessions.is_empty() {
            return Err(CalendarError::Empty { name: self.name });
        }
        Ok(WeekdayCalendar {
            name: self.name,
            sessions,
        })
    }
}

/// Midnight-UTC unix timestamp (seconds) labelling a session.
pub fn session_timestamp(date: Date) -> i64 {
    date.midnight().assume_utc().unix_timestamp()
}

/// Inverse of [`session_timestamp`]; `None` when the timestamp is out of `time`'s range.
pub fn date_from_timestamp(seconds: i64) -> Option<Date> {
    OffsetDateTime::from_unix_timestamp(seconds)
        .ok()
        .map(|dt| dt.date())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn calendar() -> WeekdayCalendar {
        CalendarBuilder::new("TEST", date!(2024 - 01 - 01), date!(2024 - 01 - 31))
            .holiday(date!(2024 - 01 - 01))
            .holiday(date!(2024 - 01 - 15))
            .build()
            .unwrap()
    }

    #[test]
    fn skips_weekends_and_holidays() {
        let cal = calendar();
        assert_eq!(cal.first_session(), Some(date!(2024 - 01 - 02)));
        assert_eq!(cal.last_session(), Some(date!(2024 - 01 - 31)));
        assert!(!cal.is_session(date!(2024 - 01 - 06)));
        assert!(!cal.is_session(date!(2024 - 01 - 15)));
        assert_eq!(cal.len(), 21);
    }

    #[test]
    fn range_and_index_lookup() {
        let cal = calendar();
        let week = cal.sessions_in_range(date!(2024 - 01 - 06), date!(2024 - 01 - 12));
        assert_eq!(week.len(), 5);
        assert_eq!(week[0], date!(2024 - 01 - 08));
        assert_eq!(cal.index_of(date!(2024 - 01 - 08)), Some(4));
        assert_eq!(cal.index_of(date!(2024 - 01 - 07)), None);
        assert!(cal
            .slice(date!(2024 - 01 - 13), date!(2024 - 01 - 14))
            .is_empty());
    }

    #[test]
    fn rejects_inverted_bounds() {
        let err = WeekdayCalendar::new("X", date!(2024 - 02 - 01), date!(2024 - 01 - 01))
            .unwrap_err();
        assert!(matches!(err, CalendarError::InvalidRange { .. }));
        let err = WeekdayCalendar::new("X", date!(2024 - 01 - 06), date!(2024 - 01 - 07))
            .unwrap_err();
        assert!(matches!(err, CalendarError::Empty { .. }));
    }

    #[test]
    fn timestamp_roundtrip() {
        let day = date!(2024 - 01 - 02);
        assert_eq!(session_timestamp(day), 1_704_153_600);
        assert_eq!(date_from_timestamp(1_704_153_600), Some(day));
    }
}
