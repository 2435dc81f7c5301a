// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Authentication provider boundary.
//!
//! Handles:
//! - Email/password sign-up and sign-in
//! - Display name / photo updates
//! - Password reset mail
//! - The auth-state feed the session bootstrapper listens to
//!
//! [`FirebaseAuth`] talks to the Identity Toolkit REST API; [`MemoryAuth`]
//! keeps accounts in process for tests and offline hosts.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{watch, RwLock};

use crate::error::{AppError, Result};
use crate::models::Identity;

/// Authentication operations used by the session layer.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Feed of the signed-in identity. Fires on every sign-in, sign-up,
    /// session restore and sign-out.
    fn auth_state(&self) -> watch::Receiver<Option<Identity>>;

    fn current_identity(&self) -> Option<Identity> {
        self.auth_state().borrow().clone()
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity>;

    /// Update the signed-in user's display name and/or photo URL.
    ///
    /// Does not fire the auth-state feed.
    async fn update_profile(
        &self,
        display_name: Option<&str>,
        photo_url: Option<&str>,
    ) -> Result<Identity>;

    async fn send_password_reset(&self, email: &str) -> Result<()>;

    async fn sign_out(&self) -> Result<()>;
}

/// Store `identity` as current without waking auth-state listeners.
fn replace_quietly(state: &watch::Sender<Option<Identity>>, identity: &Identity) {
    state.send_if_modified(|current| {
        *current = Some(identity.clone());
        false
    });
}

/// Map an Identity Toolkit error message to an application error.
///
/// Messages look like `EMAIL_EXISTS` or `WEAK_PASSWORD : Password should be
/// at least 6 characters`.
pub fn classify_auth_error(message: &str) -> AppError {
    let code = message.split(':').next().unwrap_or_default().trim();
    match code {
        "EMAIL_EXISTS" => AppError::EmailInUse,
        "TOKEN_EXPIRED" | "INVALID_ID_TOKEN" | "INVALID_REFRESH_TOKEN" | "USER_NOT_FOUND"
        | "CREDENTIAL_TOO_OLD_LOGIN_AGAIN" => AppError::Unauthorized,
        _ => AppError::AuthFailed(message.to_string()),
    }
}

#[derive(Debug, Clone)]
struct Tokens {
    id_token: String,
    refresh_token: String,
}

/// Identity Toolkit REST client.
pub struct FirebaseAuth {
    http: reqwest::Client,
    base_url: String,
    token_url: String,
    api_key: String,
    tokens: RwLock<Option<Tokens>>,
    state: watch::Sender<Option<Identity>>,
}

impl FirebaseAuth {
    /// Create a client for the project's Web API key.
    ///
    /// Uses the Auth emulator when `FIREBASE_AUTH_EMULATOR_HOST` is set.
    pub fn new(api_key: &str) -> Self {
        let (base_url, token_url) = match std::env::var("FIREBASE_AUTH_EMULATOR_HOST") {
            Ok(host) => {
                tracing::info!(host = %host, "Using Auth emulator");
                (
                    format!("http://{}/identitytoolkit.googleapis.com/v1", host),
                    format!("http://{}/securetoken.googleapis.com/v1/token", host),
                )
            }
            Err(_) => (
                "https://identitytoolkit.googleapis.com/v1".to_string(),
                "https://securetoken.googleapis.com/v1/token".to_string(),
            ),
        };
        let (state, _) = watch::channel(None);

        Self {
            http: reqwest::Client::new(),
            base_url,
            token_url,
            api_key: api_key.to_string(),
            tokens: RwLock::new(None),
            state,
        }
    }

    /// Current ID token, for authenticated storage requests.
    pub async fn id_token(&self) -> Option<String> {
        self.tokens.read().await.as_ref().map(|t| t.id_token.clone())
    }

    /// Refresh token to persist for the next launch.
    pub async fn refresh_token(&self) -> Option<String> {
        self.tokens
            .read()
            .await
            .as_ref()
            .map(|t| t.refresh_token.clone())
    }

    /// Resume a cached session on relaunch.
    ///
    /// Publishes the identity like any other auth-state change.
    pub async fn restore_session(&self, refresh_token: &str) -> Result<Identity> {
        let response = self
            .http
            .post(&self.token_url)
            .query(&[("key", self.api_key.as_str())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ])
            .send()
            .await
            .map_err(|e| AppError::AuthFailed(format!("Token refresh request failed: {}", e)))?;
        let refreshed: TokenRefreshResponse = self.check_response_json(response).await?;

        let identity = self.lookup(&refreshed.id_token).await?;
        *self.tokens.write().await = Some(Tokens {
            id_token: refreshed.id_token,
            refresh_token: refreshed.refresh_token,
        });
        tracing::info!(user_id = %identity.user_id, "Session restored");
        self.state.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn lookup(&self, id_token: &str) -> Result<Identity> {
        let body = serde_json::json!({ "idToken": id_token });
        let response: LookupResponse = self.post_json("accounts:lookup", &body).await?;
        response
            .users
            .into_iter()
            .next()
            .map(AccountInfo::into_identity)
            .ok_or(AppError::Unauthorized)
    }

    async fn password_flow(&self, endpoint: &str, email: &str, password: &str) -> Result<Identity> {
        let body = serde_json::json!({
            "email": email,
            "password": password,
            "returnSecureToken": true,
        });
        let account: AccountInfo = self.post_json(endpoint, &body).await?;

        if let (Some(id_token), Some(refresh_token)) =
            (account.id_token.clone(), account.refresh_token.clone())
        {
            *self.tokens.write().await = Some(Tokens {
                id_token,
                refresh_token,
            });
        }
        let identity = account.into_identity();
        self.state.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn post_json<T: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let url = format!("{}/{}", self.base_url, endpoint);
        let response = self
            .http
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::AuthFailed(format!("{} request failed: {}", endpoint, e)))?;

        self.check_response_json(response).await
    }

    /// Check response and parse JSON body.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if let Ok(error) = serde_json::from_str::<ErrorResponse>(&body) {
                tracing::debug!(status = %status, message = %error.error.message, "Auth request rejected");
                return Err(classify_auth_error(&error.error.message));
            }
            return Err(AppError::AuthFailed(format!("HTTP {}: {}", status, body)));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::AuthFailed(format!("JSON parse error: {}", e)))
    }
}

#[async_trait]
impl AuthProvider for FirebaseAuth {
    fn auth_state(&self) -> watch::Receiver<Option<Identity>> {
        self.state.subscribe()
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity> {
        self.password_flow("accounts:signUp", email, password).await
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        self.password_flow("accounts:signInWithPassword", email, password)
            .await
    }

    async fn update_profile(
        &self,
        display_name: Option<&str>,
        photo_url: Option<&str>,
    ) -> Result<Identity> {
        let id_token = self.id_token().await.ok_or(AppError::Unauthorized)?;

        let mut body = serde_json::json!({
            "idToken": id_token,
            "returnSecureToken": true,
        });
        if let Some(name) = display_name {
            body["displayName"] = name.into();
        }
        if let Some(url) = photo_url {
            body["photoUrl"] = url.into();
        }

        let account: AccountInfo = self.post_json("accounts:update", &body).await?;
        if let (Some(id_token), Some(refresh_token)) =
            (account.id_token.clone(), account.refresh_token.clone())
        {
            *self.tokens.write().await = Some(Tokens {
                id_token,
                refresh_token,
            });
        }

        let identity = account.into_identity();
        replace_quietly(&self.state, &identity);
        Ok(identity)
    }

    async fn send_password_reset(&self, email: &str) -> Result<()> {
        let body = serde_json::json!({
            "requestType": "PASSWORD_RESET",
            "email": email,
        });
        let _: serde_json::Value = self.post_json("accounts:sendOobCode", &body).await?;
        tracing::info!("Password reset mail requested");
        Ok(())
    }

    async fn sign_out(&self) -> Result<()> {
        *self.tokens.write().await = None;
        self.state.send_replace(None);
        Ok(())
    }
}

/// Account payload shared by signUp, signInWithPassword, update and lookup.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountInfo {
    local_id: String,
    email: Option<String>,
    display_name: Option<String>,
    photo_url: Option<String>,
    id_token: Option<String>,
    refresh_token: Option<String>,
}

impl AccountInfo {
    fn into_identity(self) -> Identity {
        Identity {
            user_id: self.local_id,
            email: self.email,
            display_name: self.display_name.filter(|n| !n.is_empty()),
            photo_url: self.photo_url.filter(|u| !u.is_empty()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<AccountInfo>,
}

/// Secure-token refresh response (snake_case, unlike the rest of the API).
#[derive(Debug, Deserialize)]
struct TokenRefreshResponse {
    id_token: String,
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Debug, Clone)]
struct MemoryAccount {
    identity: Identity,
    password: String,
}

/// In-process accounts keyed by email.
pub struct MemoryAuth {
    accounts: DashMap<String, MemoryAccount>,
    password_resets: DashMap<String, u32>,
    next_id: AtomicU64,
    state: watch::Sender<Option<Identity>>,
}

impl Default for MemoryAuth {
    fn default() -> Self {
        let (state, _) = watch::channel(None);
        Self {
            accounts: DashMap::new(),
            password_resets: DashMap::new(),
            next_id: AtomicU64::new(1),
            state,
        }
    }
}

impl MemoryAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an identity as if a cached session was found on launch.
    pub fn restore(&self, identity: Identity) {
        self.state.send_replace(Some(identity));
    }

    /// How many password reset mails were requested for `email`.
    pub fn password_resets(&self, email: &str) -> u32 {
        self.password_resets
            .get(&email.to_lowercase())
            .map(|n| *n)
            .unwrap_or(0)
    }

    fn signed_in_email(&self) -> Option<String> {
        self.state
            .borrow()
            .as_ref()
            .and_then(|identity| identity.email.clone())
    }
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    fn auth_state(&self) -> watch::Receiver<Option<Identity>> {
        self.state.subscribe()
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Identity> {
        if password.len() < 6 {
            return Err(AppError::AuthFailed(
                "WEAK_PASSWORD : Password should be at least 6 characters".to_string(),
            ));
        }

        let key = email.to_lowercase();
        let identity = match self.accounts.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => return Err(AppError::EmailInUse),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let identity = Identity {
                    user_id: format!("user-{}", self.next_id.fetch_add(1, Ordering::SeqCst)),
                    email: Some(email.to_string()),
                    display_name: None,
                    photo_url: None,
                };
                slot.insert(MemoryAccount {
                    identity: identity.clone(),
                    password: password.to_string(),
                });
                identity
            }
        };

        self.state.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity> {
        let identity = match self.accounts.get(&email.to_lowercase()) {
            Some(account) if account.password == password => account.identity.clone(),
            _ => return Err(AppError::AuthFailed("INVALID_LOGIN_CREDENTIALS".to_string())),
        };
        self.state.send_replace(Some(identity.clone()));
        Ok(identity)
    }

    async fn update_profile(
        &self,
        display_name: Option<&str>,
        photo_url: Option<&str>,
    ) -> Result<Identity> {
        let email = self.signed_in_email().ok_or(AppError::Unauthorized)?;
        let mut account = self
            .accounts
            .get_mut(&email.to_lowercase())
            .ok_or(AppError::Unauthorized)?;

        if let Some(name) = display_name {
            account.identity.display_name = Some(name.to_string());
        }
        if let Some(url) = photo_url {
            account.identity.photo_url = Some(url.to_string());
        }
        let identity = account.identity.clone();
        drop(account);

        replace_quietly(&self.state, &identity);
        Ok(identity)
    }

    async fn send_password_reset(&self, email: &str) -> Result<()> {
        let key = email.to_lowercase();
        if !self.accounts.contains_key(&key) {
            return Err(AppError::AuthFailed("EMAIL_NOT_FOUND".to_string()));
        }
        *self.password_resets.entry(key).or_insert(0) += 1;
        Ok(())
    }

    async fn sign_out(&self) -> Result<()> {
        self.state.send_replace(None);
        Ok(())
    }
}
