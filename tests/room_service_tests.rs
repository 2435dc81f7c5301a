// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Room creation, joining and member edits against the in-memory store.

use chrono::{TimeZone, Utc};
use household_calendar::config::Config;
use household_calendar::db::{collections, DocumentStore, SetOptions};
use household_calendar::error::AppError;
use household_calendar::models::{MemberRole, SessionUser, UserProfile};
use household_calendar::services::{CreateRoomRequest, JoinOutcome, NewSchedule, RoomService};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

mod common;
use common::{create_test_app, create_test_app_with, member, room, seed_room};

fn user(id: &str, name: &str) -> SessionUser {
    SessionUser {
        user_id: id.to_string(),
        email: format!("{}@example.com", id),
        name: name.to_string(),
        current_room_id: None,
        current_room_name: None,
        just_logged_in: false,
    }
}

fn new_schedule(title: &str, start_day: u32, end_day: u32) -> NewSchedule {
    NewSchedule {
        title: title.to_string(),
        content: "details".to_string(),
        start: Utc.with_ymd_and_hms(2024, 6, start_day, 9, 0, 0).unwrap(),
        end: Utc.with_ymd_and_hms(2024, 6, end_day, 17, 0, 0).unwrap(),
        important: false,
    }
}

async fn profile(app: &common::TestApp, user_id: &str) -> UserProfile {
    let doc = app
        .store
        .get(collections::USERS, user_id)
        .await
        .unwrap()
        .unwrap();
    serde_json::from_value(doc).unwrap()
}

#[tokio::test]
async fn test_create_room_makes_owner_and_points_profile() {
    let app = create_test_app();
    let rooms = RoomService::new(app.state.clone());
    let owner = user("u1", "Mom");

    let created = rooms
        .create_room(&owner, CreateRoomRequest::new("  Kim family ", " Mommy "))
        .await
        .unwrap();

    assert_eq!(created.room_name, "Kim family");
    assert_eq!(created.invite_code.len(), 6);
    assert_eq!(created.room_id.len(), 20);
    assert_eq!(created.members["u1"].role, MemberRole::Owner);
    assert_eq!(created.members["u1"].nickname, "Mommy");

    let stored = rooms.load_room(&created.room_id).await.unwrap().unwrap();
    assert_eq!(stored.members, created.members);
    assert_eq!(stored.invite_code, created.invite_code);

    let p = profile(&app, "u1").await;
    assert_eq!(p.current_room_id.as_deref(), Some(created.room_id.as_str()));
    assert_eq!(p.current_room_name.as_deref(), Some("Kim family"));
    assert_eq!(p.name, "Mom");
}

#[tokio::test]
async fn test_create_room_rejects_blank_names() {
    let app = create_test_app();
    let rooms = RoomService::new(app.state.clone());

    let err = rooms
        .create_room(&user("u1", "Mom"), CreateRoomRequest::new("   ", "Mom"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    assert!(app
        .store
        .query_eq(collections::ROOMS, "roomName", "")
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_invite_code_collision_retries() {
    let app = create_test_app();
    seed_room(&app.store, &room("existing", vec![])).await;

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let rooms = RoomService::new(app.state.clone()).with_invite_code_source(move || {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        Ok(if n < 2 { "AB12CD" } else { "ZZ99ZZ" }.to_string())
    });

    let created = rooms
        .create_room(&user("u1", "Mom"), CreateRoomRequest::new("Second", "Mom"))
        .await
        .unwrap();
    assert_eq!(created.invite_code, "ZZ99ZZ");
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_invite_code_attempts_exhausted() {
    let mut config = Config::test_default();
    config.invite_code_attempts = 2;
    let app = create_test_app_with(config);
    seed_room(&app.store, &room("existing", vec![])).await;

    let rooms = RoomService::new(app.state.clone())
        .with_invite_code_source(|| Ok("AB12CD".to_string()));
    let err = rooms
        .create_room(&user("u1", "Mom"), CreateRoomRequest::new("Second", "Mom"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Internal(_)));
}

#[tokio::test]
async fn test_join_needs_nickname_then_enters() {
    let app = create_test_app();
    seed_room(
        &app.store,
        &room("r1", vec![("u1", member("Mom", MemberRole::Owner, vec![]))]),
    )
    .await;
    let rooms = RoomService::new(app.state.clone());
    let kid = user("u2", "Kid");

    let outcome = rooms.join_room(&kid, " ab12cd ", None).await.unwrap();
    assert_eq!(
        outcome,
        JoinOutcome::NeedsNickname {
            room_id: "r1".to_string(),
            room_name: "Kim family".to_string(),
        }
    );
    // Nothing written yet
    assert!(app.store.get(collections::USERS, "u2").await.unwrap().is_none());

    let JoinOutcome::Entered(joined) = rooms.join_room(&kid, "AB12CD", Some("Junior")).await.unwrap()
    else {
        panic!("expected to enter the room");
    };
    assert_eq!(joined.members["u2"].nickname, "Junior");
    assert_eq!(joined.members["u2"].role, MemberRole::Member);

    let stored = rooms.load_room("r1").await.unwrap().unwrap();
    assert_eq!(stored.members.len(), 2);
    assert_eq!(stored.members["u1"].nickname, "Mom");
    assert_eq!(profile(&app, "u2").await.current_room_id.as_deref(), Some("r1"));
}

#[tokio::test]
async fn test_existing_member_enters_without_nickname() {
    let app = create_test_app();
    seed_room(
        &app.store,
        &room("r1", vec![("u1", member("Mom", MemberRole::Owner, vec![]))]),
    )
    .await;
    let rooms = RoomService::new(app.state.clone());

    let outcome = rooms
        .join_room(&user("u1", "Mom"), "AB12CD", Some("Ignored"))
        .await
        .unwrap();
    let JoinOutcome::Entered(room) = outcome else {
        panic!("expected to enter the room");
    };
    assert_eq!(room.members["u1"].nickname, "Mom");
    assert_eq!(room.members["u1"].role, MemberRole::Owner);
}

#[tokio::test]
async fn test_join_with_unknown_or_malformed_code() {
    let app = create_test_app();
    let rooms = RoomService::new(app.state.clone());
    let kid = user("u2", "Kid");

    assert!(matches!(
        rooms.join_room(&kid, "ZZZZZZ", Some("Kid")).await,
        Err(AppError::NotFound(_))
    ));
    assert!(matches!(
        rooms.join_room(&kid, "AB-1", Some("Kid")).await,
        Err(AppError::BadRequest(_))
    ));
}

#[tokio::test]
async fn test_add_schedule_appends_to_own_list() {
    let app = create_test_app();
    seed_room(
        &app.store,
        &room(
            "r1",
            vec![
                ("u1", member("Mom", MemberRole::Owner, vec![])),
                ("u2", member("Kid", MemberRole::Member, vec![])),
            ],
        ),
    )
    .await;
    let rooms = RoomService::new(app.state.clone());
    let mom = user("u1", "Mom");

    let first = rooms
        .add_schedule(&mom, "r1", new_schedule("Trip", 1, 3))
        .await
        .unwrap();
    assert_eq!(first.created_by.as_deref(), Some("u1"));
    assert_eq!(first.user_name, "Mom");
    rooms
        .add_schedule(&mom, "r1", new_schedule("Dentist", 5, 5))
        .await
        .unwrap();

    let stored = rooms.load_room("r1").await.unwrap().unwrap();
    let titles: Vec<_> = stored.members["u1"]
        .schedules
        .iter()
        .map(|s| s.title.as_str())
        .collect();
    assert_eq!(titles, vec!["Trip", "Dentist"]);
    assert!(stored.members["u2"].schedules.is_empty());
}

#[tokio::test]
async fn test_add_schedule_rejections() {
    let app = create_test_app();
    seed_room(
        &app.store,
        &room("r1", vec![("u1", member("Mom", MemberRole::Owner, vec![]))]),
    )
    .await;
    let rooms = RoomService::new(app.state.clone());

    let backwards = rooms
        .add_schedule(&user("u1", "Mom"), "r1", new_schedule("Oops", 5, 4))
        .await;
    assert!(matches!(backwards, Err(AppError::BadRequest(_))));

    let mut blank = new_schedule("Trip", 1, 1);
    blank.content = "  ".to_string();
    let blank = rooms.add_schedule(&user("u1", "Mom"), "r1", blank).await;
    assert!(matches!(blank, Err(AppError::BadRequest(_))));

    let outsider = rooms
        .add_schedule(&user("u9", "Stranger"), "r1", new_schedule("Trip", 1, 1))
        .await;
    assert!(matches!(outsider, Err(AppError::NotFound(_))));

    let missing = rooms
        .add_schedule(&user("u1", "Mom"), "nope", new_schedule("Trip", 1, 1))
        .await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn test_change_nickname_touches_only_that_member() {
    let app = create_test_app();
    seed_room(
        &app.store,
        &room(
            "r1",
            vec![
                ("u1", member("Mom", MemberRole::Owner, vec![])),
                ("u2", member("Kid", MemberRole::Member, vec![])),
            ],
        ),
    )
    .await;
    let rooms = RoomService::new(app.state.clone());

    let stored = rooms.change_nickname("u2", "r1", "  Junior ").await.unwrap();
    assert_eq!(stored, "Junior");

    let room = rooms.load_room("r1").await.unwrap().unwrap();
    assert_eq!(room.members["u2"].nickname, "Junior");
    assert_eq!(room.members["u2"].role, MemberRole::Member);
    assert_eq!(room.members["u1"].nickname, "Mom");

    let long = "x".repeat(31);
    assert!(matches!(
        rooms.change_nickname("u2", "r1", &long).await,
        Err(AppError::BadRequest(_))
    ));
}

#[tokio::test]
async fn test_change_profile_image_mirrors_into_room() {
    let app = create_test_app();
    let family = room("r1", vec![("u1", member("Mom", MemberRole::Owner, vec![]))]);
    seed_room(&app.store, &family).await;
    let rooms = RoomService::new(app.state.clone());

    let dir = std::env::temp_dir().join(format!("hc-rooms-{}", std::process::id()));
    tokio::fs::create_dir_all(&dir).await.unwrap();
    let image = dir.join("me.jpg");
    tokio::fs::write(&image, b"jpeg bytes").await.unwrap();

    let url = rooms
        .change_profile_image("u1", Some(&family), &image)
        .await
        .unwrap();
    assert!(url.starts_with("memory://profiles/profile_u1_"));
    assert_eq!(app.storage.len(), 1);

    assert_eq!(profile(&app, "u1").await.profile_image.as_deref(), Some(url.as_str()));
    let stored = rooms.load_room("r1").await.unwrap().unwrap();
    assert_eq!(stored.members["u1"].profile_image.as_deref(), Some(url.as_str()));

    // Same URL already recorded
    assert!(!rooms
        .update_member_profile_image(&stored, "u1", &url)
        .await
        .unwrap());
    // Not a member
    assert!(!rooms
        .update_member_profile_image(&stored, "u9", &url)
        .await
        .unwrap());

    app.storage.set_failing(true);
    let failed = rooms.change_profile_image("u1", None, &image).await;
    assert!(matches!(failed, Err(AppError::Storage(_))));
    let _ = tokio::fs::remove_dir_all(&dir).await;
}

#[tokio::test]
async fn test_migrate_legacy_schedule_maps() {
    let app = create_test_app();
    app.store
        .set(
            collections::ROOMS,
            "old",
            serde_json::json!({
                "roomName": "Old house",
                "inviteCode": "OLD123",
                "members": {
                    "u1": {
                        "nickname": "Mom",
                        "role": "owner",
                        "schedules": {
                            "100": {
                                "scheduleId": "100",
                                "scheduleTitle": "Trip",
                                "scheduleDate": "2024-06-01",
                                "scheduleEndDate": "2024-06-02"
                            }
                        }
                    },
                    "u2": {
                        "nickname": "Kid",
                        "role": "member",
                        "schedules": []
                    }
                }
            }),
            SetOptions::default(),
        )
        .await
        .unwrap();
    let rooms = RoomService::new(app.state.clone());

    assert_eq!(rooms.migrate_schedules("old").await.unwrap(), 1);
    let room = rooms.load_room("old").await.unwrap().unwrap();
    assert_eq!(room.members["u1"].schedules.len(), 1);
    assert_eq!(room.members["u1"].schedules[0].title, "Trip");

    // Already arrays: nothing to do
    assert_eq!(rooms.migrate_schedules("old").await.unwrap(), 0);
    assert!(matches!(
        rooms.migrate_schedules("missing").await,
        Err(AppError::NotFound(_))
    ));
}
