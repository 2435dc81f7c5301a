// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Room synchronization: keeps the local room copy in step with the remote
//! document while suppressing no-op snapshots.
//!
//! Every snapshot is compared structurally against the last *applied* room
//! (name, invite code, members). Identical snapshots are suppressed.
//! Changed snapshots arriving within `min_spacing` of the previous apply are
//! held and applied when the window closes; a newer snapshot replaces the
//! held one, and a snapshot equal to the applied room cancels it.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::db::{collections, DocumentStore, SnapshotEvent, Subscription};
use crate::error::Result;
use crate::models::Room;

/// Lifecycle of a room subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Unsubscribed,
    Subscribed,
    Evaluating,
    Applied,
    Suppressed,
    /// A changed snapshot is held until the spacing window closes.
    Deferred,
}

/// Outcome of evaluating one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncDecision {
    Applied(Room),
    Suppressed,
    Deferred { until: Instant },
}

/// Per-room reconciler state.
#[derive(Debug)]
pub struct RoomSyncReconciler {
    last_applied: Room,
    last_applied_at: Option<Instant>,
    min_spacing: Duration,
    pending: Option<Room>,
    phase: SyncPhase,
}

impl RoomSyncReconciler {
    /// Start from the room the caller already holds locally.
    pub fn new(initial: Room, min_spacing: Duration) -> Self {
        Self {
            last_applied: initial,
            last_applied_at: None,
            min_spacing,
            pending: None,
            phase: SyncPhase::Unsubscribed,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn room_id(&self) -> &str {
        &self.last_applied.room_id
    }

    pub fn last_applied(&self) -> &Room {
        &self.last_applied
    }

    /// When a held snapshot becomes due, if one is held.
    pub fn pending_deadline(&self) -> Option<Instant> {
        self.pending.as_ref()?;
        Some(self.window_end().unwrap_or_else(Instant::now))
    }

    fn window_end(&self) -> Option<Instant> {
        self.last_applied_at.map(|at| at + self.min_spacing)
    }

    /// Evaluate an incoming snapshot of the room.
    pub fn evaluate(&mut self, incoming: Room, now: Instant) -> SyncDecision {
        self.phase = SyncPhase::Evaluating;

        if incoming.same_content(&self.last_applied) {
            if self.pending.take().is_some() {
                tracing::debug!(room_id = %self.room_id(), "Held snapshot reverted, dropping it");
            }
            self.phase = SyncPhase::Suppressed;
            return SyncDecision::Suppressed;
        }

        if let Some(until) = self.window_end().filter(|end| now < *end) {
            self.pending = Some(incoming);
            self.phase = SyncPhase::Deferred;
            return SyncDecision::Deferred { until };
        }

        SyncDecision::Applied(self.apply(incoming, now))
    }

    /// Apply the held snapshot if its window has closed.
    pub fn flush(&mut self, now: Instant) -> Option<Room> {
        let due = self.pending_deadline()?;
        if now < due {
            return None;
        }
        let room = self.pending.take()?;
        Some(self.apply(room, now))
    }

    fn apply(&mut self, mut room: Room, now: Instant) -> Room {
        room.room_id = self.last_applied.room_id.clone();
        self.last_applied = room.clone();
        self.last_applied_at = Some(now);
        self.pending = None;
        self.phase = SyncPhase::Applied;
        room
    }

    /// Drive the reconciler from a subscription until it ends.
    pub async fn run<F>(mut self, mut subscription: Subscription, mut on_apply: F)
    where
        F: FnMut(Room) + Send,
    {
        self.phase = SyncPhase::Subscribed;
        let room_id = self.room_id().to_string();

        loop {
            let deadline = self.pending_deadline();
            tokio::select! {
                event = subscription.recv() => {
                    let Some(event) = event else {
                        break;
                    };
                    match event {
                        SnapshotEvent::Snapshot(Some(doc)) => {
                            let incoming = match Room::from_document(&room_id, doc) {
                                Ok(room) => room,
                                Err(e) => {
                                    tracing::warn!(room_id = %room_id, error = %e, "Unreadable room snapshot");
                                    continue;
                                }
                            };
                            match self.evaluate(incoming, Instant::now()) {
                                SyncDecision::Applied(room) => {
                                    tracing::debug!(room_id = %room_id, "Room snapshot applied");
                                    on_apply(room);
                                }
                                SyncDecision::Suppressed => {
                                    tracing::debug!(room_id = %room_id, "Room snapshot unchanged, suppressed");
                                }
                                SyncDecision::Deferred { .. } => {
                                    tracing::debug!(room_id = %room_id, "Room snapshot held for spacing window");
                                }
                            }
                        }
                        SnapshotEvent::Snapshot(None) => {
                            tracing::warn!(room_id = %room_id, "Room document no longer exists");
                        }
                        SnapshotEvent::Error(e) => {
                            tracing::warn!(room_id = %room_id, error = %e, "Room listener error");
                        }
                    }
                }
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    if let Some(room) = self.flush(Instant::now()) {
                        tracing::debug!(room_id = %room_id, "Held room snapshot applied");
                        on_apply(room);
                    }
                }
            }
        }

        self.phase = SyncPhase::Unsubscribed;
        tracing::debug!(room_id = %room_id, "Room sync ended");
    }

    /// Subscribe to the room document and reconcile in a background task.
    ///
    /// The subscription lives exactly as long as the returned handle.
    pub async fn spawn<F>(
        store: Arc<dyn DocumentStore>,
        initial: Room,
        min_spacing: Duration,
        on_apply: F,
    ) -> Result<RoomSyncHandle>
    where
        F: FnMut(Room) + Send + 'static,
    {
        let room_id = initial.room_id.clone();
        let subscription = store.subscribe(collections::ROOMS, &room_id).await?;
        let reconciler = Self::new(initial, min_spacing);
        tracing::info!(room_id = %room_id, "Room sync started");
        let task = tokio::spawn(reconciler.run(subscription, on_apply));
        Ok(RoomSyncHandle {
            room_id,
            task: Some(task),
        })
    }
}

/// Owns a running room sync; dropping it tears the subscription down.
pub struct RoomSyncHandle {
    room_id: String,
    task: Option<JoinHandle<()>>,
}

impl RoomSyncHandle {
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Stop syncing and wait until the subscription has been released.
    pub async fn shutdown(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            let _ = task.await;
        }
    }
}

impl Drop for RoomSyncHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MemberRole, RoomMember};
    use std::collections::BTreeMap;

    fn room(name: &str, nickname: &str) -> Room {
        Room {
            room_id: "r1".to_string(),
            room_name: name.to_string(),
            invite_code: "ABC123".to_string(),
            created_at: None,
            members: BTreeMap::from([(
                "u1".to_string(),
                RoomMember::new(nickname, MemberRole::Owner),
            )]),
        }
    }

    const SPACING: Duration = Duration::from_millis(300);

    #[test]
    fn test_identical_snapshot_is_suppressed() {
        let start = Instant::now();
        let mut sync = RoomSyncReconciler::new(room("Home", "Mom"), SPACING);

        let mut copy = room("Home", "Mom");
        copy.room_id = String::new();
        assert_eq!(sync.evaluate(copy, start), SyncDecision::Suppressed);
        assert_eq!(sync.phase(), SyncPhase::Suppressed);
    }

    #[test]
    fn test_first_change_applies_immediately() {
        let start = Instant::now();
        let mut sync = RoomSyncReconciler::new(room("Home", "Mom"), SPACING);

        match sync.evaluate(room("Home", "Mother"), start) {
            SyncDecision::Applied(applied) => {
                assert_eq!(applied.room_id, "r1");
                assert_eq!(applied.members["u1"].nickname, "Mother");
            }
            other => panic!("expected apply, got {:?}", other),
        }
        assert_eq!(sync.phase(), SyncPhase::Applied);
    }

    #[test]
    fn test_change_inside_window_is_held_then_flushed() {
        let start = Instant::now();
        let mut sync = RoomSyncReconciler::new(room("Home", "Mom"), SPACING);
        assert!(matches!(
            sync.evaluate(room("Home 2", "Mom"), start),
            SyncDecision::Applied(_)
        ));

        let later = start + Duration::from_millis(100);
        assert_eq!(
            sync.evaluate(room("Home 3", "Mom"), later),
            SyncDecision::Deferred {
                until: start + SPACING
            }
        );
        assert_eq!(sync.pending_deadline(), Some(start + SPACING));
        assert!(sync.flush(later).is_none());

        let applied = sync.flush(start + SPACING).unwrap();
        assert_eq!(applied.room_name, "Home 3");
        assert!(sync.pending_deadline().is_none());
    }

    #[test]
    fn test_revert_inside_window_cancels_held_snapshot() {
        let start = Instant::now();
        let mut sync = RoomSyncReconciler::new(room("Home", "Mom"), SPACING);
        sync.evaluate(room("Home 2", "Mom"), start);

        let later = start + Duration::from_millis(50);
        sync.evaluate(room("Home 3", "Mom"), later);
        assert_eq!(
            sync.evaluate(room("Home 2", "Mom"), later),
            SyncDecision::Suppressed
        );
        assert!(sync.flush(start + SPACING).is_none());
        assert_eq!(sync.last_applied().room_name, "Home 2");
    }

    #[test]
    fn test_zero_spacing_never_defers() {
        let start = Instant::now();
        let mut sync = RoomSyncReconciler::new(room("Home", "Mom"), Duration::ZERO);
        assert!(matches!(
            sync.evaluate(room("a", "Mom"), start),
            SyncDecision::Applied(_)
        ));
        assert!(matches!(
            sync.evaluate(room("b", "Mom"), start),
            SyncDecision::Applied(_)
        ));
    }
}
