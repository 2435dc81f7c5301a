// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Data models for the application.

pub mod calendar;
pub mod room;
pub mod schedule;
pub mod user;

pub use calendar::{CalendarMarkSet, DayMarks, MarkDot};
pub use room::{MemberRole, Room, RoomMember};
pub use schedule::{DateValue, Schedule};
pub use user::{Identity, SessionUser, UserProfile};
