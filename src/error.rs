// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent user-facing messages.

/// Application error type.
///
/// Network-facing operations return this instead of raw backend errors so
/// the UI layer only ever sees [`AppError::user_message`].
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Email address already in use")]
    EmailInUse,

    #[error("Authentication required")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Generic message suitable for a toast or alert.
    pub fn user_message(&self) -> &'static str {
        match self {
            AppError::AuthFailed(_) => "Please check your email or password and try again.",
            AppError::EmailInUse => "This email address is already registered.",
            AppError::Unauthorized => "Please sign in to continue.",
            AppError::NotFound(_) => "The requested room or profile could not be found.",
            AppError::BadRequest(_) => "Please check the information you entered.",
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                "Something went wrong while syncing. Please try again."
            }
            AppError::Storage(msg) => {
                tracing::error!(error = %msg, "Storage error");
                "The image could not be uploaded. Please try again."
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal error");
                "An unexpected error occurred."
            }
        }
    }

    /// Whether the failure is a backend/network hiccup that leaves prior
    /// state intact and may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Database(_) | AppError::Storage(_))
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::BadRequest(errors.to_string())
    }
}

/// Result type alias for fallible operations.
pub type Result<T> = std::result::Result<T, AppError>;
