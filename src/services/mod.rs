// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod aggregate;
pub mod auth;
pub mod filter;
pub mod grouping;
pub mod push;
pub mod room_sync;
pub mod rooms;
pub mod session;
pub mod storage;

pub use aggregate::{dot_color, CalendarView, ScheduleAggregator};
pub use auth::{AuthProvider, FirebaseAuth, MemoryAuth};
pub use filter::{classify, ScheduleFilter, ScheduleTiming};
pub use grouping::{group_by_owner, UNKNOWN_OWNER};
pub use push::register_push_token;
pub use room_sync::{RoomSyncHandle, RoomSyncReconciler, SyncDecision, SyncPhase};
pub use rooms::{CreateRoomRequest, JoinOutcome, NewSchedule, RoomService};
pub use session::{Session, SessionBootstrapper, SessionPhase, SignUpRequest};
pub use storage::{FirebaseStorage, MemoryStorage, ObjectStorage};
