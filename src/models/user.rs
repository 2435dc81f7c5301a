//! User profile and identity models.

use serde::{Deserialize, Serialize};

use crate::models::schedule::DateValue;

/// Identity returned by the authentication provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable user identifier (also the profile document ID)
    pub user_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

/// User profile stored in the `users` collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(rename = "userId", default)]
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "profileImage", default, skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    /// Room the user last entered
    #[serde(rename = "currentRoomId", default, skip_serializing_if = "Option::is_none")]
    pub current_room_id: Option<String>,
    #[serde(rename = "currentRoomName", default, skip_serializing_if = "Option::is_none")]
    pub current_room_name: Option<String>,
    /// Registered push tokens
    #[serde(rename = "fcmToken", default)]
    pub push_tokens: Vec<String>,
    #[serde(rename = "lastTokenUpdated", default, skip_serializing_if = "Option::is_none")]
    pub last_token_updated: Option<DateValue>,
}

/// The signed-in user as seen by the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionUser {
    pub user_id: String,
    pub email: String,
    pub name: String,
    pub current_room_id: Option<String>,
    pub current_room_name: Option<String>,
    /// True when this session started from an interactive sign-in
    pub just_logged_in: bool,
}

impl SessionUser {
    /// Basic user built from the authentication identity alone.
    pub fn from_identity(identity: &Identity, just_logged_in: bool) -> Self {
        Self {
            user_id: identity.user_id.clone(),
            email: identity.email.clone().unwrap_or_default(),
            name: identity.display_name.clone().unwrap_or_default(),
            current_room_id: None,
            current_room_name: None,
            just_logged_in,
        }
    }
}
