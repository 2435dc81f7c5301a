// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Schedule aggregation: flattens a room's member schedules into calendar
//! marks, the list for a selected day, and the important list.
//!
//! All functions are pure projections of the member map and are recomputed
//! from scratch whenever the room changes. Schedules with dates that cannot
//! be normalized are skipped without affecting the rest.

use chrono::{DateTime, NaiveDate, Utc};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::config::{Config, DEFAULT_MAX_SCHEDULE_SPAN_DAYS};
use crate::models::calendar::{DEFAULT_DOT_COLOR, SCHEDULE_COLORS};
use crate::models::{CalendarMarkSet, DayMarks, MarkDot, Room, RoomMember, Schedule};
use crate::time_utils::{self, expand_dates, format_day, normalize_to_date, span_days};

/// Computes calendar projections for a room.
#[derive(Debug, Clone, Copy)]
pub struct ScheduleAggregator {
    max_span_days: usize,
}

impl Default for ScheduleAggregator {
    fn default() -> Self {
        Self {
            max_span_days: DEFAULT_MAX_SCHEDULE_SPAN_DAYS,
        }
    }
}

impl ScheduleAggregator {
    /// Aggregator that skips schedules spanning more than `max_span_days`.
    pub fn new(max_span_days: usize) -> Self {
        Self { max_span_days }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_schedule_span_days)
    }

    /// Normalized inclusive day span of a schedule, if it is usable.
    pub fn resolve_span(&self, schedule: &Schedule) -> Option<(NaiveDate, NaiveDate)> {
        let start = normalize_to_date(&schedule.start_date)?;
        let end = normalize_to_date(&schedule.end_date)?;
        let days = span_days(start, end)?;
        if days > self.max_span_days {
            tracing::warn!(
                schedule_id = %schedule.schedule_id,
                days,
                max = self.max_span_days,
                "Skipping schedule with oversized date range"
            );
            return None;
        }
        Some((start, end))
    }

    /// Per-day dot markers for every schedule of every member.
    ///
    /// The first dot on a day uses the default color; later dots take a
    /// palette color derived from the schedule id.
    pub fn build_marks(&self, members: &BTreeMap<String, RoomMember>) -> CalendarMarkSet {
        let mut marks = CalendarMarkSet::new();

        for schedule in members.values().flat_map(|m| m.schedules.iter()) {
            let Some((start, end)) = self.resolve_span(schedule) else {
                continue;
            };
            for day in expand_dates(start, end) {
                let entry = marks.entry(format_day(day)).or_insert_with(DayMarks::default);
                let color = if entry.dots.is_empty() {
                    DEFAULT_DOT_COLOR
                } else {
                    dot_color(&schedule.schedule_id)
                };
                entry.dots.push(MarkDot {
                    color: color.to_string(),
                });
            }
        }

        marks
    }

    /// Schedules touching `day`, tagged with their owner's nickname.
    ///
    /// Ordered by member, then by each member's list order. An unparseable
    /// `day` yields nothing.
    pub fn schedules_on_day(
        &self,
        members: &BTreeMap<String, RoomMember>,
        day: &str,
    ) -> Vec<Schedule> {
        let Some(day) = time_utils::parse_day(day) else {
            return Vec::new();
        };

        let mut found = Vec::new();
        for (user_id, member) in members {
            for schedule in &member.schedules {
                if let Some((start, end)) = self.resolve_span(schedule) {
                    if start <= day && day <= end {
                        found.push(schedule.tagged(user_id, &member.nickname));
                    }
                }
            }
        }
        found
    }

    /// Important schedules across all members, most recent start first.
    ///
    /// Equal start dates keep member/list order; schedules whose start
    /// cannot be parsed go last.
    pub fn important_schedules(&self, members: &BTreeMap<String, RoomMember>) -> Vec<Schedule> {
        let mut important: Vec<(Option<DateTime<Utc>>, Schedule)> = members
            .iter()
            .flat_map(|(user_id, member)| {
                member
                    .schedules
                    .iter()
                    .filter(|s| s.important)
                    .map(move |s| {
                        (
                            time_utils::to_datetime(&s.start_date),
                            s.tagged(user_id, &member.nickname),
                        )
                    })
            })
            .collect();

        // sort_by is stable
        important.sort_by(|(a, _), (b, _)| b.cmp(a));
        important.into_iter().map(|(_, s)| s).collect()
    }
}

/// Palette color for an additional dot, stable for a given schedule id.
pub fn dot_color(schedule_id: &str) -> &'static str {
    let digest = Sha256::digest(schedule_id.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let index = u64::from_be_bytes(prefix) % SCHEDULE_COLORS.len() as u64;
    SCHEDULE_COLORS[index as usize]
}

/// Everything the calendar screen shows for one room and selected day.
#[derive(Debug, Clone, Default)]
pub struct CalendarView {
    pub marks: CalendarMarkSet,
    pub selected_day: String,
    pub day_schedules: Vec<Schedule>,
    pub important: Vec<Schedule>,
}

impl CalendarView {
    /// Project a room into calendar data. No room means an empty view.
    pub fn project(aggregator: &ScheduleAggregator, room: Option<&Room>, day: &str) -> Self {
        let Some(room) = room else {
            return Self {
                selected_day: day.to_string(),
                ..Default::default()
            };
        };
        Self {
            marks: aggregator.build_marks(&room.members),
            selected_day: day.to_string(),
            day_schedules: aggregator.schedules_on_day(&room.members, day),
            important: aggregator.important_schedules(&room.members),
        }
    }
}
