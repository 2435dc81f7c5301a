// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Upcoming/past classification of schedules at day granularity.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::models::Schedule;
use crate::time_utils::normalize_to_date;

/// Where a schedule falls relative to a reference day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "bindings/")
)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleTiming {
    Upcoming,
    Past,
}

/// List filter selected in the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleFilter {
    #[default]
    Upcoming,
    Past,
    All,
}

/// Classify by start day: on or after `reference` is upcoming.
///
/// `None` when the start date cannot be read.
pub fn classify(schedule: &Schedule, reference: NaiveDate) -> Option<ScheduleTiming> {
    let start = normalize_to_date(&schedule.start_date)?;
    Some(if start >= reference {
        ScheduleTiming::Upcoming
    } else {
        ScheduleTiming::Past
    })
}

impl ScheduleFilter {
    pub fn matches(self, schedule: &Schedule, reference: NaiveDate) -> bool {
        match self {
            ScheduleFilter::All => true,
            ScheduleFilter::Upcoming => {
                classify(schedule, reference) == Some(ScheduleTiming::Upcoming)
            }
            ScheduleFilter::Past => classify(schedule, reference) == Some(ScheduleTiming::Past),
        }
    }

    /// Keep the schedules matching this filter, in input order.
    pub fn apply(self, schedules: &[Schedule], reference: NaiveDate) -> Vec<Schedule> {
        schedules
            .iter()
            .filter(|s| self.matches(s, reference))
            .cloned()
            .collect()
    }

    /// [`ScheduleFilter::apply`] relative to the current UTC day.
    pub fn apply_today(self, schedules: &[Schedule]) -> Vec<Schedule> {
        self.apply(schedules, Utc::now().date_naive())
    }
}
