// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Household calendar: a shared calendar for a family "room"
//!
//! This crate provides the client-side engine behind the mobile app:
//! calendar aggregation over a room's member schedules, live room sync,
//! and session bootstrapping against Firebase (Auth, Firestore, Storage).

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;
pub mod services;
pub mod time_utils;

use std::sync::Arc;

use config::Config;
use db::{DocumentStore, FirestoreDb};
use services::{AuthProvider, FirebaseAuth, FirebaseStorage, ObjectStorage};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn DocumentStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub storage: Arc<dyn ObjectStorage>,
}

impl AppState {
    /// Connect to the Firebase project named in `config`.
    pub async fn connect(config: Config) -> error::Result<Self> {
        let store = FirestoreDb::new(&config.gcp_project_id).await?;
        let auth = Arc::new(FirebaseAuth::new(&config.firebase_api_key));
        let storage = FirebaseStorage::new(&config.storage_bucket, auth.clone());
        tracing::info!(project = %config.gcp_project_id, "Connected to Firebase");

        Ok(Self {
            config,
            store: Arc::new(store),
            auth,
            storage: Arc::new(storage),
        })
    }
}
