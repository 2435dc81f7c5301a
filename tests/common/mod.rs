// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use household_calendar::config::Config;
use household_calendar::db::{collections, DocumentStore, FirestoreDb, MemoryStore, SetOptions};
use household_calendar::models::{DateValue, MemberRole, Room, RoomMember, Schedule};
use household_calendar::services::{MemoryAuth, MemoryStorage, Session};
use household_calendar::AppState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// In-memory app plus handles to its collaborators for inspection.
#[allow(dead_code)]
pub struct TestApp {
    pub state: Arc<AppState>,
    pub store: MemoryStore,
    pub auth: Arc<MemoryAuth>,
    pub storage: Arc<MemoryStorage>,
}

/// Create a test app with in-memory dependencies.
#[allow(dead_code)]
pub fn create_test_app() -> TestApp {
    create_test_app_with(Config::test_default())
}

#[allow(dead_code)]
pub fn create_test_app_with(config: Config) -> TestApp {
    let store = MemoryStore::new();
    let auth = Arc::new(MemoryAuth::new());
    let storage = Arc::new(MemoryStorage::new());

    let state = Arc::new(AppState {
        config,
        store: Arc::new(store.clone()),
        auth: auth.clone(),
        storage: storage.clone(),
    });

    TestApp {
        state,
        store,
        auth,
        storage,
    }
}

/// Helper to create a schedule
#[allow(dead_code)]
pub fn schedule(id: &str, title: &str, start: &str, end: &str) -> Schedule {
    Schedule {
        schedule_id: id.to_string(),
        title: title.to_string(),
        content: String::new(),
        start_date: DateValue::from(start),
        end_date: DateValue::from(end),
        created_by: None,
        user_name: String::new(),
        created_at: None,
        important: false,
        owner_name: None,
        owner_id: None,
    }
}

#[allow(dead_code)]
pub fn important(mut schedule: Schedule) -> Schedule {
    schedule.important = true;
    schedule
}

#[allow(dead_code)]
pub fn member(nickname: &str, role: MemberRole, schedules: Vec<Schedule>) -> RoomMember {
    RoomMember {
        schedules,
        ..RoomMember::new(nickname, role)
    }
}

/// Helper to create a room
#[allow(dead_code)]
pub fn room(room_id: &str, members: Vec<(&str, RoomMember)>) -> Room {
    Room {
        room_id: room_id.to_string(),
        room_name: "Kim family".to_string(),
        invite_code: "AB12CD".to_string(),
        created_at: None,
        members: members
            .into_iter()
            .map(|(uid, m)| (uid.to_string(), m))
            .collect(),
    }
}

#[allow(dead_code)]
pub async fn seed_room(store: &MemoryStore, room: &Room) {
    store
        .set(
            collections::ROOMS,
            &room.room_id,
            room.to_document().unwrap(),
            SetOptions::default(),
        )
        .await
        .unwrap();
}

/// Profile document pointing at `room_id`.
#[allow(dead_code)]
pub async fn seed_profile(store: &MemoryStore, user_id: &str, room_id: Option<&str>) {
    store
        .set(
            collections::USERS,
            user_id,
            serde_json::json!({
                "userId": user_id,
                "email": format!("{}@example.com", user_id),
                "name": "Profile Name",
                "profileImage": "https://img.example/p.jpg",
                "currentRoomId": room_id,
                "currentRoomName": room_id.map(|_| "Kim family"),
            }),
            SetOptions::default(),
        )
        .await
        .unwrap();
}

/// Wait (bounded) until the published session satisfies `pred`.
#[allow(dead_code)]
pub async fn wait_for_session(
    rx: &mut watch::Receiver<Session>,
    pred: impl FnMut(&Session) -> bool,
) -> Session {
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
        .await
        .expect("timed out waiting for session")
        .expect("session owner dropped")
        .clone()
}
