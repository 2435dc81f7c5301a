// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Room management: creation, joining by invite code, schedule writes and
//! member profile updates.
//!
//! Every write goes through field paths (`members.<uid>.<field>`) so that
//! concurrent edits by other members are not overwritten.

use chrono::{DateTime, Utc};
use ring::rand::{SecureRandom, SystemRandom};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use validator::{Validate, ValidationError};

use crate::db::{collections, member_path, Document, FieldUpdate, SetOptions};
use crate::error::{AppError, Result};
use crate::models::{DateValue, MemberRole, Room, RoomMember, Schedule, SessionUser};
use crate::services::storage::profile_image_path;
use crate::time_utils::format_utc_rfc3339;
use crate::AppState;

/// Invite codes are this many uppercase alphanumerics.
pub const INVITE_CODE_LEN: usize = 6;
const INVITE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const DOCUMENT_ID_LEN: usize = 20;
const DOCUMENT_ID_ALPHABET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Uniformly random string over `alphabet` (rejection sampled).
fn random_string(rng: &dyn SecureRandom, alphabet: &[u8], len: usize) -> Result<String> {
    let limit = 256 - 256 % alphabet.len();
    let mut out = String::with_capacity(len);
    let mut buf = [0u8; 32];
    while out.len() < len {
        rng.fill(&mut buf)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("System RNG failure")))?;
        for &b in buf.iter().filter(|&&b| (b as usize) < limit) {
            out.push(alphabet[b as usize % alphabet.len()] as char);
            if out.len() == len {
                break;
            }
        }
    }
    Ok(out)
}

/// Fresh random invite code.
pub fn generate_invite_code() -> Result<String> {
    random_string(&SystemRandom::new(), INVITE_ALPHABET, INVITE_CODE_LEN)
}

/// Fresh random document id in the backend's auto-id shape.
pub fn generate_document_id() -> Result<String> {
    random_string(&SystemRandom::new(), DOCUMENT_ID_ALPHABET, DOCUMENT_ID_LEN)
}

fn timestamp_now() -> DateValue {
    let now = Utc::now();
    DateValue::Timestamp {
        seconds: now.timestamp(),
        nanoseconds: now.timestamp_subsec_nanos(),
    }
}

/// Trim and uppercase a typed invite code, rejecting malformed ones.
pub fn normalize_invite_code(raw: &str) -> Result<String> {
    let code = raw.trim().to_ascii_uppercase();
    if code.len() != INVITE_CODE_LEN || !code.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(AppError::BadRequest(format!(
            "Invite code must be {} letters or digits",
            INVITE_CODE_LEN
        )));
    }
    Ok(code)
}

fn not_blank(value: &str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank"));
    }
    Ok(())
}

/// Room creation form.
#[derive(Debug, Clone, Validate)]
pub struct CreateRoomRequest {
    #[validate(length(min = 1, max = 30), custom(function = "not_blank"))]
    pub room_name: String,
    #[validate(length(min = 1, max = 30), custom(function = "not_blank"))]
    pub nickname: String,
}

impl CreateRoomRequest {
    pub fn new(room_name: &str, nickname: &str) -> Self {
        Self {
            room_name: room_name.trim().to_string(),
            nickname: nickname.trim().to_string(),
        }
    }
}

#[derive(Debug, Validate)]
struct NicknameForm {
    #[validate(length(min = 1, max = 30), custom(function = "not_blank"))]
    nickname: String,
}

fn validate_nickname(nickname: &str) -> Result<String> {
    let form = NicknameForm {
        nickname: nickname.trim().to_string(),
    };
    form.validate()?;
    Ok(form.nickname)
}

/// New schedule form.
#[derive(Debug, Clone, Validate)]
pub struct NewSchedule {
    #[validate(length(min = 1, max = 100), custom(function = "not_blank"))]
    pub title: String,
    #[validate(length(min = 1, max = 1000), custom(function = "not_blank"))]
    pub content: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub important: bool,
}

/// Result of presenting an invite code.
#[derive(Debug, Clone, PartialEq)]
pub enum JoinOutcome {
    /// The user is (now) a member and the room is their current room.
    Entered(Room),
    /// The user is not a member yet and must pick a nickname first.
    NeedsNickname { room_id: String, room_name: String },
}

type CodeSource = Arc<dyn Fn() -> Result<String> + Send + Sync>;

/// Room operations against the document store.
#[derive(Clone)]
pub struct RoomService {
    state: Arc<AppState>,
    invite_codes: CodeSource,
}

impl RoomService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            invite_codes: Arc::new(generate_invite_code),
        }
    }

    /// Replace the invite code generator.
    pub fn with_invite_code_source(
        mut self,
        source: impl Fn() -> Result<String> + Send + Sync + 'static,
    ) -> Self {
        self.invite_codes = Arc::new(source);
        self
    }

    /// Read a room document.
    pub async fn load_room(&self, room_id: &str) -> Result<Option<Room>> {
        let Some(doc) = self.state.store.get(collections::ROOMS, room_id).await? else {
            return Ok(None);
        };
        Room::from_document(room_id, doc)
            .map(Some)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Unreadable room {}: {}", room_id, e)))
    }

    async fn require_room(&self, room_id: &str) -> Result<Room> {
        self.load_room(room_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("room {}", room_id)))
    }

    async fn unused_invite_code(&self) -> Result<String> {
        let attempts = self.state.config.invite_code_attempts.max(1);
        for attempt in 1..=attempts {
            let code = (self.invite_codes)()?;
            let taken = self
                .state
                .store
                .query_eq(collections::ROOMS, "inviteCode", &code)
                .await?;
            if taken.is_empty() {
                return Ok(code);
            }
            tracing::warn!(attempt, "Invite code collision, retrying");
        }
        Err(AppError::Internal(anyhow::anyhow!(
            "No unused invite code after {} attempts",
            attempts
        )))
    }

    async fn point_profile_at(&self, user: &SessionUser, room: &Room) -> Result<()> {
        self.state
            .store
            .set(
                collections::USERS,
                &user.user_id,
                json!({
                    "userId": user.user_id,
                    "email": user.email,
                    "name": user.name,
                    "currentRoomId": room.room_id,
                    "currentRoomName": room.room_name,
                }),
                SetOptions::merge(),
            )
            .await
    }

    /// Create a room owned by `user` and make it their current room.
    pub async fn create_room(&self, user: &SessionUser, request: CreateRoomRequest) -> Result<Room> {
        request.validate()?;

        let invite_code = self.unused_invite_code().await?;
        let room_id = generate_document_id()?;

        let room = Room {
            room_id,
            room_name: request.room_name,
            invite_code,
            created_at: Some(timestamp_now()),
            members: [(
                user.user_id.clone(),
                RoomMember::new(&request.nickname, MemberRole::Owner),
            )]
            .into(),
        };

        let doc = room.to_document().map_err(anyhow::Error::from)?;
        self.state
            .store
            .set(collections::ROOMS, &room.room_id, doc, SetOptions::default())
            .await?;
        self.point_profile_at(user, &room).await?;

        tracing::info!(room_id = %room.room_id, user_id = %user.user_id, "Room created");
        Ok(room)
    }

    /// Resolve an invite code and enter or join the room.
    ///
    /// Joining as a new member requires `nickname`; without one the caller
    /// gets [`JoinOutcome::NeedsNickname`] and nothing is written.
    pub async fn join_room(
        &self,
        user: &SessionUser,
        invite_code: &str,
        nickname: Option<&str>,
    ) -> Result<JoinOutcome> {
        let code = normalize_invite_code(invite_code)?;

        let found = self
            .state
            .store
            .query_eq(collections::ROOMS, "inviteCode", &code)
            .await?;
        let Some((room_id, doc)) = found.into_iter().next() else {
            return Err(AppError::NotFound("invite code".to_string()));
        };
        let mut room = Room::from_document(&room_id, doc)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Unreadable room {}: {}", room_id, e)))?;

        if room.member(&user.user_id).is_none() {
            let Some(nickname) = nickname.filter(|n| !n.trim().is_empty()) else {
                return Ok(JoinOutcome::NeedsNickname {
                    room_id: room.room_id,
                    room_name: room.room_name,
                });
            };
            let nickname = validate_nickname(nickname)?;
            let member = RoomMember::new(&nickname, MemberRole::Member);

            self.state
                .store
                .update(
                    collections::ROOMS,
                    &room.room_id,
                    vec![FieldUpdate::new(
                        format!("members.{}", user.user_id),
                        serde_json::to_value(&member).map_err(anyhow::Error::from)?,
                    )],
                )
                .await?;
            room.members.insert(user.user_id.clone(), member);
            tracing::info!(room_id = %room.room_id, user_id = %user.user_id, "Joined room");
        }

        self.point_profile_at(user, &room).await?;
        Ok(JoinOutcome::Entered(room))
    }

    /// Append a schedule to the user's list in the room.
    pub async fn add_schedule(
        &self,
        user: &SessionUser,
        room_id: &str,
        form: NewSchedule,
    ) -> Result<Schedule> {
        form.validate()?;
        if form.end < form.start {
            return Err(AppError::BadRequest(
                "Schedule ends before it starts".to_string(),
            ));
        }

        let room = self.require_room(room_id).await?;
        let member = room
            .member(&user.user_id)
            .ok_or_else(|| AppError::NotFound(format!("membership in room {}", room_id)))?;

        let schedule = Schedule {
            schedule_id: Utc::now().timestamp_millis().to_string(),
            title: form.title.trim().to_string(),
            content: form.content.trim().to_string(),
            start_date: DateValue::Text(format_utc_rfc3339(form.start)),
            end_date: DateValue::Text(format_utc_rfc3339(form.end)),
            created_by: Some(user.user_id.clone()),
            user_name: user.name.clone(),
            created_at: Some(timestamp_now()),
            important: form.important,
            owner_name: None,
            owner_id: None,
        };

        let mut schedules = member.schedules.clone();
        schedules.push(schedule.clone());
        self.state
            .store
            .update(
                collections::ROOMS,
                room_id,
                vec![FieldUpdate::new(
                    member_path(&user.user_id, "schedules"),
                    serde_json::to_value(&schedules).map_err(anyhow::Error::from)?,
                )],
            )
            .await?;

        tracing::info!(room_id = %room_id, schedule_id = %schedule.schedule_id, "Schedule added");
        Ok(schedule)
    }

    /// Change the user's nickname in a room. Returns the stored nickname.
    pub async fn change_nickname(
        &self,
        user_id: &str,
        room_id: &str,
        nickname: &str,
    ) -> Result<String> {
        let nickname = validate_nickname(nickname)?;
        self.state
            .store
            .update(
                collections::ROOMS,
                room_id,
                vec![FieldUpdate::new(member_path(user_id, "nickname"), nickname.as_str())],
            )
            .await?;
        Ok(nickname)
    }

    /// Mirror a profile image URL into the room's member entry.
    ///
    /// Returns whether a write was needed.
    pub async fn update_member_profile_image(
        &self,
        room: &Room,
        user_id: &str,
        url: &str,
    ) -> Result<bool> {
        let Some(member) = room.member(user_id) else {
            return Ok(false);
        };
        if member.profile_image.as_deref() == Some(url) {
            return Ok(false);
        }
        self.state
            .store
            .update(
                collections::ROOMS,
                &room.room_id,
                vec![FieldUpdate::new(member_path(user_id, "profileImage"), url)],
            )
            .await?;
        Ok(true)
    }

    /// Upload a new profile image and record it on the profile and, when
    /// given, in the room member entry. Returns the download URL.
    pub async fn change_profile_image(
        &self,
        user_id: &str,
        room: Option<&Room>,
        local_path: &Path,
    ) -> Result<String> {
        let path = profile_image_path(user_id, Utc::now().timestamp_millis());
        let url = self.state.storage.upload(&path, local_path).await?;

        self.state
            .store
            .set(
                collections::USERS,
                user_id,
                json!({ "profileImage": url }),
                SetOptions::merge(),
            )
            .await?;
        if let Some(room) = room {
            self.update_member_profile_image(room, user_id, &url).await?;
        }

        tracing::info!(user_id = %user_id, "Profile image changed");
        Ok(url)
    }

    /// Rewrite member schedules stored as id->schedule maps as arrays.
    ///
    /// Returns the number of members rewritten.
    pub async fn migrate_schedules(&self, room_id: &str) -> Result<usize> {
        let doc = self
            .state
            .store
            .get(collections::ROOMS, room_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("room {}", room_id)))?;

        let updates = legacy_schedule_updates(&doc);
        let count = updates.len();
        if count > 0 {
            self.state
                .store
                .update(collections::ROOMS, room_id, updates)
                .await?;
            tracing::info!(room_id = %room_id, members = count, "Migrated legacy schedules");
        }
        Ok(count)
    }
}

/// Field updates converting every map-shaped schedule list to an array.
fn legacy_schedule_updates(doc: &Document) -> Vec<FieldUpdate> {
    let Some(members) = doc.get("members").and_then(Value::as_object) else {
        return Vec::new();
    };
    members
        .iter()
        .filter_map(|(user_id, member)| {
            let map = member.get("schedules")?.as_object()?;
            let list: Vec<Value> = map.values().cloned().collect();
            Some(FieldUpdate::new(
                member_path(user_id, "schedules"),
                Value::Array(list),
            ))
        })
        .collect()
}
