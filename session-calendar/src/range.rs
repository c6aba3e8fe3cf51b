// Copyright (c) James Kassemi, SC, US. All rights reserved.

use time::Date;

use crate::calendar::SessionCalendar;

/// Owned, contiguous run of sessions; index 0 is the range's first session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionRange {
    sessions: Vec<Date>,
}

impl SessionRange {
    pub fn new(sessions: Vec<Date>) -> Self {
        debug_assert!(sessions.windows(2).all(|w| w[0] < w[1]));
        Self { sessions }
    }

    /// Sessions of `calendar` within `[start, end]`.
    pub fn from_calendar<C: SessionCalendar + ?Sized>(calendar: &C, start: Date, end: Date) -> Self {
        Self::new(calendar.sessions_in_range(start, end).to_vec())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn as_slice(&self) -> &[Date] {
        &self.sessions
    }

    pub fn get(&self, idx: usize) -> Option<Date> {
        self.sessions.get(idx).copied()
    }

    pub fn first(&self) -> Option<Date> {
        self.sessions.first().copied()
    }

    pub fn last(&self) -> Option<Date> {
        self.sessions.last().copied()
    }

    pub fn index_of(&self, date: Date) -> Option<usize> {
        self.sessions.binary_search(&date).ok()
    }

    /// Sessions from `first_day` through `last_day` inclusive.
    pub fn slice(&self, first_day: Date, last_day: Date) -> &[Date] {
        let lo = self.sessions.partition_point(|s| *s < first_day);
        let hi = self.sessions.partition_point(|s| *s <= last_day);
        if lo >= hi { &[] } else { &self.sessions[lo..hi] }
    }

    pub fn iter(&self) -> impl Iterator<Item = Date> + '_ {
        self.sessions.iter().copied()
    }
}
