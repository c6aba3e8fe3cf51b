// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Trading-session calendars.
//!
//! The crate exposes:
//! - [`SessionCalendar`]: the ordered-sessions interface the column store consumes.
//! - [`WeekdayCalendar`] / [`CalendarBuilder`]: a Monday–Friday calendar with explicit holidays.
//! - [`SessionRange`]: an owned, bounded run of sessions with index lookups.

pub mod calendar;
pub mod range;

pub use calendar::{
    CalendarBuilder, CalendarError, SessionCalendar, WeekdayCalendar, date_from_timestamp,
    session_timestamp,
};
pub use range::SessionRange;
