// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session bootstrapping and ownership of the signed-in state.
//!
//! [`SessionBootstrapper`] is the single owner of the published
//! [`Session`]. It reacts to auth-state changes by loading the profile, the
//! current room and the caller's nickname, and it is the only place that
//! applies room snapshots coming from the room sync.
//!
//! Loads are tagged with a generation number. Sign-out and every new
//! auth-state event bump the generation, so a slow load that finishes
//! afterwards cannot resurrect a stale session.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use validator::Validate;

use crate::db::{collections, FieldUpdate};
use crate::error::{AppError, Result};
use crate::models::{Identity, Room, Schedule, SessionUser, UserProfile};
use crate::services::aggregate::{CalendarView, ScheduleAggregator};
use crate::services::push::register_push_token;
use crate::services::room_sync::{RoomSyncHandle, RoomSyncReconciler};
use crate::services::rooms::{CreateRoomRequest, JoinOutcome, NewSchedule, RoomService};
use crate::services::storage::profile_image_path;
use crate::AppState;

/// Where the bootstrap is for the current auth state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Uninitialized,
    Unauthenticated,
    LoadingProfile,
    LoadingRoom,
    LoadingNickname,
    Ready,
}

/// Everything the UI needs about the signed-in user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub phase: SessionPhase,
    pub user: Option<SessionUser>,
    pub current_room: Option<Room>,
    /// Caller's nickname in the current room
    pub nickname: Option<String>,
    pub profile_image: Option<String>,
    /// Caller's own schedules in the current room
    pub schedules: Vec<Schedule>,
    /// Set once the first bootstrap attempt has finished, even if it failed
    pub initialized: bool,
}

impl Session {
    fn enter(&mut self, room: &Room) {
        let Some(user) = self.user.as_mut() else {
            return;
        };
        user.current_room_id = Some(room.room_id.clone());
        user.current_room_name = Some(room.room_name.clone());
        if let Some(nickname) = room.nickname_of(&user.user_id) {
            self.nickname = Some(nickname.to_string());
        }
        self.schedules = room
            .member(&user.user_id)
            .map(|m| m.schedules.clone())
            .unwrap_or_default();
        self.current_room = Some(room.clone());
    }

    fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.user_id.as_str())
    }
}

/// Sign-up form.
#[derive(Debug, Clone, Validate)]
pub struct SignUpRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6))]
    pub password: String,
    #[validate(length(min = 1, max = 30))]
    pub name: String,
    /// Local image file to upload as the profile picture
    pub profile_image: Option<PathBuf>,
}

/// Owner of the session state.
pub struct SessionBootstrapper {
    state: Arc<AppState>,
    rooms: RoomService,
    aggregator: ScheduleAggregator,
    session: watch::Sender<Session>,
    /// Read by the auth-state handler at the moment it runs
    just_logged_in: Arc<AtomicBool>,
    generation: AtomicU64,
    room_sync: Mutex<Option<RoomSyncHandle>>,
    weak_self: Weak<SessionBootstrapper>,
}

impl SessionBootstrapper {
    pub fn new(state: Arc<AppState>) -> Arc<Self> {
        let rooms = RoomService::new(state.clone());
        Self::with_room_service(state, rooms)
    }

    pub fn with_room_service(state: Arc<AppState>, rooms: RoomService) -> Arc<Self> {
        let aggregator = ScheduleAggregator::from_config(&state.config);
        let (session, _) = watch::channel(Session::default());
        Arc::new_cyclic(|weak_self| Self {
            state,
            rooms,
            aggregator,
            session,
            just_logged_in: Arc::new(AtomicBool::new(false)),
            generation: AtomicU64::new(0),
            room_sync: Mutex::new(None),
            weak_self: weak_self.clone(),
        })
    }

    /// Watch the published session.
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.session.subscribe()
    }

    /// Snapshot of the current session.
    pub fn session(&self) -> Session {
        self.session.borrow().clone()
    }

    pub fn rooms(&self) -> &RoomService {
        &self.rooms
    }

    pub fn just_logged_in(&self) -> bool {
        self.just_logged_in.load(Ordering::SeqCst)
    }

    /// Update the interactive sign-in flag, immediately visible to the next
    /// auth-state event and to the published user.
    pub fn set_just_logged_in(&self, value: bool) {
        self.just_logged_in.store(value, Ordering::SeqCst);
        self.session.send_if_modified(|s| match s.user.as_mut() {
            Some(user) if user.just_logged_in != value => {
                user.just_logged_in = value;
                true
            }
            _ => false,
        });
    }

    /// Wait until the first bootstrap attempt has completed.
    pub async fn wait_until_initialized(&self) -> Session {
        let mut rx = self.subscribe();
        let result = rx.wait_for(|s| s.initialized).await;
        match result {
            Ok(session) => session.clone(),
            Err(_) => self.session(),
        }
    }

    /// Apply `modify` unless a newer load or a sign-out has started since
    /// `generation` was taken. Returns whether it was applied.
    fn publish(&self, generation: u64, modify: impl FnOnce(&mut Session)) -> bool {
        let mut applied = false;
        self.session.send_if_modified(|s| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            modify(s);
            applied = true;
            true
        });
        applied
    }

    /// Follow the auth-state feed until the provider goes away.
    pub async fn run(self: Arc<Self>) {
        let mut auth_state = self.state.auth.auth_state();
        loop {
            let identity = auth_state.borrow_and_update().clone();
            self.handle_auth_state(identity).await;
            if auth_state.changed().await.is_err() {
                break;
            }
        }
        tracing::debug!("Auth state feed closed");
    }

    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(self.clone().run())
    }

    /// Bootstrap the session for one auth-state event.
    pub async fn handle_auth_state(&self, identity: Option<Identity>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.stop_room_sync().await;

        let Some(identity) = identity else {
            self.publish(generation, |s| {
                *s = Session {
                    phase: SessionPhase::Unauthenticated,
                    initialized: true,
                    ..Default::default()
                };
            });
            return;
        };

        let basic = SessionUser::from_identity(&identity, self.just_logged_in());
        tracing::debug!(user_id = %basic.user_id, just_logged_in = basic.just_logged_in, "Bootstrapping session");
        self.publish(generation, |s| {
            *s = Session {
                phase: SessionPhase::LoadingProfile,
                user: Some(basic.clone()),
                profile_image: identity.photo_url.clone(),
                initialized: s.initialized,
                ..Default::default()
            };
        });

        let room = match self.load_user_state(generation, &basic).await {
            Ok(room) => room,
            Err(e) => {
                tracing::warn!(user_id = %basic.user_id, error = %e, "Profile load failed, using basic profile");
                self.publish(generation, |s| {
                    s.user = Some(basic.clone());
                    s.current_room = None;
                    s.nickname = None;
                    s.schedules.clear();
                });
                None
            }
        };

        let ready = self.publish(generation, |s| {
            s.phase = SessionPhase::Ready;
            s.initialized = true;
        });

        if let (true, Some(room)) = (ready, room) {
            if let Err(e) = self.start_room_sync_at(generation, room).await {
                tracing::warn!(error = %e, "Could not start room sync");
            }
        }
    }

    /// Load profile, current room and nickname. Returns the room entered.
    async fn load_user_state(&self, generation: u64, basic: &SessionUser) -> Result<Option<Room>> {
        let user_id = basic.user_id.as_str();
        let profile: Option<UserProfile> = self
            .state
            .store
            .get(collections::USERS, user_id)
            .await?
            .map(serde_json::from_value)
            .transpose()
            .map_err(anyhow::Error::from)?;
        let Some(profile) = profile else {
            tracing::debug!(user_id = %user_id, "No profile document yet");
            return Ok(None);
        };

        let room_id = profile.current_room_id.clone().filter(|id| !id.is_empty());
        let applied = self.publish(generation, |s| {
            if let Some(image) = profile.profile_image.clone().filter(|i| !i.is_empty()) {
                s.profile_image = Some(image);
            }
            if let Some(user) = s.user.as_mut() {
                if user.name.is_empty() {
                    user.name = profile.name.clone();
                }
            }
            if room_id.is_some() {
                s.phase = SessionPhase::LoadingRoom;
            }
        });
        let (true, Some(room_id)) = (applied, room_id) else {
            return Ok(None);
        };

        let Some(room) = self.rooms.load_room(&room_id).await? else {
            tracing::warn!(user_id = %user_id, room_id = %room_id, "Current room no longer exists");
            return Ok(None);
        };

        let entered = self.publish(generation, |s| {
            s.phase = SessionPhase::LoadingNickname;
            s.enter(&room);
        });
        Ok(entered.then_some(room))
    }

    /// Interactive sign-in.
    ///
    /// `push_token` is registered afterwards; a failure there is logged and
    /// does not fail the sign-in.
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
        push_token: Option<&str>,
    ) -> Result<Identity> {
        // Set before the provider fires its auth-state event
        self.set_just_logged_in(true);
        let identity = match self.state.auth.sign_in(email.trim(), password).await {
            Ok(identity) => identity,
            Err(e) => {
                self.set_just_logged_in(false);
                return Err(e);
            }
        };
        tracing::info!(user_id = %identity.user_id, "Signed in");

        if let Some(token) = push_token {
            if let Err(e) =
                register_push_token(self.state.store.as_ref(), &identity.user_id, token).await
            {
                tracing::warn!(user_id = %identity.user_id, error = %e, "Push token registration failed");
            }
        }
        Ok(identity)
    }

    /// Create an account, upload the optional profile image and write the
    /// profile document.
    pub async fn sign_up(&self, request: SignUpRequest) -> Result<Identity> {
        request.validate()?;
        let name = request.name.trim().to_string();

        self.set_just_logged_in(true);
        let identity = match self
            .state
            .auth
            .sign_up(request.email.trim(), &request.password)
            .await
        {
            Ok(identity) => identity,
            Err(e) => {
                self.set_just_logged_in(false);
                return Err(e);
            }
        };
        let user_id = identity.user_id.clone();

        let image_url = match &request.profile_image {
            Some(path) => {
                let object = profile_image_path(&user_id, chrono::Utc::now().timestamp_millis());
                Some(self.state.storage.upload(&object, path).await?)
            }
            None => None,
        };

        let identity = self
            .state
            .auth
            .update_profile(Some(&name), image_url.as_deref())
            .await?;

        let profile = UserProfile {
            user_id: user_id.clone(),
            email: identity.email.clone(),
            name: name.clone(),
            profile_image: image_url.clone(),
            ..Default::default()
        };
        self.state
            .store
            .set(
                collections::USERS,
                &user_id,
                serde_json::to_value(&profile).map_err(anyhow::Error::from)?,
                Default::default(),
            )
            .await?;

        self.session.send_if_modified(|s| {
            if s.user_id() != Some(user_id.as_str()) {
                return false;
            }
            if let Some(user) = s.user.as_mut() {
                user.name = name.clone();
            }
            if image_url.is_some() {
                s.profile_image = image_url.clone();
            }
            true
        });

        tracing::info!(user_id = %user_id, "Account created");
        Ok(identity)
    }

    pub async fn send_password_reset(&self, email: &str) -> Result<()> {
        let email = email.trim();
        if email.is_empty() {
            return Err(AppError::BadRequest("Email is required".to_string()));
        }
        self.state.auth.send_password_reset(email).await
    }

    /// Sign out: local state first, then the best-effort profile pointer
    /// reset, then the provider.
    pub async fn sign_out(&self) -> Result<()> {
        let mut user_id = None;
        self.session.send_modify(|s| {
            // Invalidates loads still in flight
            self.generation.fetch_add(1, Ordering::SeqCst);
            self.just_logged_in.store(false, Ordering::SeqCst);
            user_id = s.user.take().map(|u| u.user_id);
            *s = Session {
                phase: SessionPhase::Unauthenticated,
                initialized: true,
                ..Default::default()
            };
        });
        self.stop_room_sync().await;

        if let Some(user_id) = &user_id {
            let cleared = self
                .state
                .store
                .update(
                    collections::USERS,
                    user_id,
                    vec![
                        FieldUpdate::new("currentRoomId", serde_json::Value::Null),
                        FieldUpdate::new("currentRoomName", serde_json::Value::Null),
                    ],
                )
                .await;
            if let Err(e) = cleared {
                tracing::warn!(user_id = %user_id, error = %e, "Could not clear current room pointer");
            }
        }

        self.state.auth.sign_out().await?;
        tracing::info!("Signed out");
        Ok(())
    }

    fn require_user(&self) -> Result<SessionUser> {
        self.session
            .borrow()
            .user
            .clone()
            .ok_or(AppError::Unauthorized)
    }

    fn require_room(&self) -> Result<(SessionUser, Room)> {
        let session = self.session.borrow();
        let user = session.user.clone().ok_or(AppError::Unauthorized)?;
        let room = session
            .current_room
            .clone()
            .ok_or_else(|| AppError::NotFound("current room".to_string()))?;
        Ok((user, room))
    }

    /// Make `room` the current room and start syncing it.
    pub async fn enter_room(&self, room: Room) -> Result<()> {
        let mut generation = None;
        self.session.send_if_modified(|s| {
            if s.user.is_none() {
                return false;
            }
            generation = Some(self.generation.load(Ordering::SeqCst));
            s.enter(&room);
            true
        });
        let Some(generation) = generation else {
            return Err(AppError::Unauthorized);
        };
        self.start_room_sync_at(generation, room).await
    }

    pub async fn create_room(&self, request: CreateRoomRequest) -> Result<Room> {
        let user = self.require_user()?;
        let room = self.rooms.create_room(&user, request).await?;
        self.enter_room(room.clone()).await?;
        Ok(room)
    }

    pub async fn join_room(&self, invite_code: &str, nickname: Option<&str>) -> Result<JoinOutcome> {
        let user = self.require_user()?;
        let outcome = self.rooms.join_room(&user, invite_code, nickname).await?;
        if let JoinOutcome::Entered(room) = &outcome {
            self.enter_room(room.clone()).await?;
        }
        Ok(outcome)
    }

    pub async fn add_schedule(&self, form: NewSchedule) -> Result<Schedule> {
        let (user, room) = self.require_room()?;
        let schedule = self.rooms.add_schedule(&user, &room.room_id, form).await?;
        if let Err(e) = self.refresh_room().await {
            tracing::warn!(error = %e, "Refresh after adding schedule failed");
        }
        Ok(schedule)
    }

    /// Change the caller's nickname in the current room.
    pub async fn change_nickname(&self, nickname: &str) -> Result<()> {
        let (user, room) = self.require_room()?;
        let nickname = self
            .rooms
            .change_nickname(&user.user_id, &room.room_id, nickname)
            .await?;

        self.session.send_if_modified(|s| {
            let Some(room) = s.current_room.as_mut().filter(|r| r.room_id == room.room_id) else {
                return false;
            };
            if let Some(member) = room.members.get_mut(&user.user_id) {
                member.nickname = nickname.clone();
            }
            s.nickname = Some(nickname.clone());
            true
        });
        Ok(())
    }

    /// Upload a new profile image and mirror it into the current room.
    pub async fn change_profile_image(&self, local_path: &std::path::Path) -> Result<String> {
        let (user_id, room) = {
            let session = self.session.borrow();
            let user_id = session.user_id().ok_or(AppError::Unauthorized)?.to_string();
            (user_id, session.current_room.clone())
        };
        let url = self
            .rooms
            .change_profile_image(&user_id, room.as_ref(), local_path)
            .await?;

        self.session.send_modify(|s| {
            s.profile_image = Some(url.clone());
            if let Some(member) = s
                .current_room
                .as_mut()
                .and_then(|r| r.members.get_mut(&user_id))
            {
                member.profile_image = Some(url.clone());
            }
        });
        Ok(url)
    }

    /// Re-read the current room and apply it.
    pub async fn refresh_room(&self) -> Result<()> {
        let Some(room_id) = self
            .session
            .borrow()
            .current_room
            .as_ref()
            .map(|r| r.room_id.clone())
        else {
            return Ok(());
        };
        match self.rooms.load_room(&room_id).await? {
            Some(room) => {
                self.apply_synced_room(room);
                Ok(())
            }
            None => Err(AppError::NotFound(format!("room {}", room_id))),
        }
    }

    /// Replace the current room with a fresher copy of the same room.
    ///
    /// Copies of any other room are ignored. Returns whether the session
    /// changed.
    pub fn apply_synced_room(&self, room: Room) -> bool {
        self.session.send_if_modified(|s| {
            match s.current_room.as_ref() {
                Some(current) if current.room_id == room.room_id => {}
                _ => return false,
            }
            if s.current_room.as_ref() == Some(&room) {
                return false;
            }
            s.enter(&room);
            true
        })
    }

    /// (Re)start the room sync for `room`, replacing any previous one.
    pub async fn start_room_sync(&self, room: Room) -> Result<()> {
        let generation = self.generation.load(Ordering::SeqCst);
        self.start_room_sync_at(generation, room).await
    }

    /// Start the sync only if no sign-out or newer auth event happened since
    /// `generation` was taken. Checked under the sync lock, which
    /// [`Self::stop_room_sync`] also takes.
    async fn start_room_sync_at(&self, generation: u64, room: Room) -> Result<()> {
        let mut slot = self.room_sync.lock().await;
        if let Some(previous) = slot.take() {
            previous.shutdown().await;
        }
        if self.generation.load(Ordering::SeqCst) != generation {
            tracing::debug!(room_id = %room.room_id, "Session changed, not starting room sync");
            return Ok(());
        }

        let weak = self.weak_self.clone();
        let handle = RoomSyncReconciler::spawn(
            self.state.store.clone(),
            room,
            self.state.config.sync_min_spacing,
            move |room| {
                if let Some(this) = weak.upgrade() {
                    this.apply_synced_room(room);
                }
            },
        )
        .await?;
        *slot = Some(handle);
        Ok(())
    }

    pub async fn stop_room_sync(&self) {
        if let Some(handle) = self.room_sync.lock().await.take() {
            handle.shutdown().await;
        }
    }

    /// Room id currently being synced, if any.
    pub async fn syncing_room(&self) -> Option<String> {
        self.room_sync
            .lock()
            .await
            .as_ref()
            .map(|h| h.room_id().to_string())
    }

    /// Calendar data for the current room and `day` (`YYYY-MM-DD`).
    pub fn calendar_view(&self, day: &str) -> CalendarView {
        let session = self.session.borrow();
        CalendarView::project(&self.aggregator, session.current_room.as_ref(), day)
    }
}
