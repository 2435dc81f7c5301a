//! Push notification token registration.

use serde_json::json;

use crate::db::{collections, server_timestamp, DocumentStore, SetOptions};
use crate::error::{AppError, Result};

/// Record the device push token on the user's profile.
///
/// Replaces the stored token list with this device's token.
pub async fn register_push_token(
    store: &dyn DocumentStore,
    user_id: &str,
    token: &str,
) -> Result<()> {
    if token.trim().is_empty() {
        return Err(AppError::BadRequest("Empty push token".to_string()));
    }

    store
        .set(
            collections::USERS,
            user_id,
            json!({
                "fcmToken": [token],
                "lastTokenUpdated": server_timestamp(),
            }),
            SetOptions::merge(),
        )
        .await?;

    tracing::debug!(user_id = %user_id, "Push token registered");
    Ok(())
}
