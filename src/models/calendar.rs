// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Calendar marking types derived from a room.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Color of the first dot on any day.
pub const DEFAULT_DOT_COLOR: &str = SCHEDULE_COLORS[0];

/// Palette for additional dots on a day.
pub const SCHEDULE_COLORS: [&str; 7] = [
    "#FF5733", "#33FF57", "#FF33A8", "#FF8C33", "#8C33FF", "#33FFF3", "#FFD700",
];

/// One colored dot on a calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "bindings/")
)]
pub struct MarkDot {
    pub color: String,
}

/// Marks for a single calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "bindings/")
)]
pub struct DayMarks {
    pub dots: Vec<MarkDot>,
}

/// Marks keyed by `YYYY-MM-DD`.
///
/// Always recomputed in full from the room; never patched.
pub type CalendarMarkSet = BTreeMap<String, DayMarks>;
