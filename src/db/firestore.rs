// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper implementing [`DocumentStore`].
//!
//! Documents are exchanged as JSON values; typed conversion happens in the
//! models layer so a malformed field never fails a whole read here.

use async_trait::async_trait;
use firestore::errors::FirestoreError;
use firestore::{
    FirestoreListenEvent, FirestoreListenerTarget, FirestoreMemListenStateStorage,
    FirestoreWritePrecondition,
};
use tokio::sync::mpsc;

use crate::db::{
    nest_field_updates, Document, DocumentStore, FieldUpdate, SetOptions, SnapshotEvent,
    Subscription,
};
use crate::error::{AppError, Result};

/// Every subscription owns its own listener, so a single target ID suffices.
const DOCUMENT_TARGET: FirestoreListenerTarget = FirestoreListenerTarget::new(1_u32);

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self> {
        // If the emulator environment variable is set, use unauthenticated connection
        // to avoid local credential warnings and leakage.
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self> {
        tracing::info!("Using unauthenticated connection for Firestore Emulator");

        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(
            project = project_id,
            "Connected to Firestore (Emulator/Unauthenticated)"
        );

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a mock Firestore client for testing (offline mode).
    ///
    /// All database operations will return an error if called.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    /// Helper to get the client or return an error if offline.
    fn get_client(&self) -> Result<&firestore::FirestoreDb> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }
}

/// Last path segment of a full document resource name.
fn document_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Quote a dotted field path for an update mask. Segments that are not
/// simple identifiers (user ids starting with a digit, ids containing `-`)
/// are wrapped in backticks.
fn quote_field_path(path: &str) -> String {
    path.split('.')
        .map(|segment| {
            let mut chars = segment.chars();
            let simple = matches!(chars.next(), Some(c) if c == '_' || c.is_ascii_alphabetic())
                && chars.all(|c| c == '_' || c.is_ascii_alphanumeric());
            if simple {
                segment.to_string()
            } else {
                format!(
                    "`{}`",
                    segment.replace('\\', "\\\\").replace('`', "\\`")
                )
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

fn write_error(err: FirestoreError, collection: &str, id: &str) -> AppError {
    match err {
        FirestoreError::DataNotFoundError(_) => {
            AppError::NotFound(format!("{}/{}", collection, id))
        }
        other => AppError::Database(other.to_string()),
    }
}

#[async_trait]
impl DocumentStore for FirestoreDb {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collection)
            .obj::<Document>()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        data: Document,
        options: SetOptions,
    ) -> Result<()> {
        let client = self.get_client()?;

        let _: () = if options.merge {
            let mask: Vec<String> = data
                .as_object()
                .map(|map| map.keys().map(|key| quote_field_path(key)).collect())
                .unwrap_or_default();
            client
                .fluent()
                .update()
                .fields(mask)
                .in_col(collection)
                .document_id(id)
                .object(&data)
                .execute()
                .await
        } else {
            client
                .fluent()
                .update()
                .in_col(collection)
                .document_id(id)
                .object(&data)
                .execute()
                .await
        }
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: Vec<FieldUpdate>) -> Result<()> {
        let (data, paths) = nest_field_updates(fields);
        let mask: Vec<String> = paths.iter().map(|path| quote_field_path(path)).collect();

        // Updates never create the document
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .fields(mask)
            .in_col(collection)
            .precondition(FirestoreWritePrecondition::Exists(true))
            .document_id(id)
            .object(&data)
            .execute()
            .await
            .map_err(|e| write_error(e, collection, id))?;
        Ok(())
    }

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<(String, Document)>> {
        let field = field.to_string();
        let value = value.to_string();

        let docs = self
            .get_client()?
            .fluent()
            .select()
            .from(collection)
            .filter(move |q| q.for_all([q.field(field.as_str()).eq(value.clone())]))
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        docs.iter()
            .map(|doc| {
                let body = firestore::FirestoreDb::deserialize_doc_to::<Document>(doc)
                    .map_err(|e| AppError::Database(e.to_string()))?;
                Ok((document_id(&doc.name).to_string(), body))
            })
            .collect()
    }

    async fn subscribe(&self, collection: &str, id: &str) -> Result<Subscription> {
        let client = self.get_client()?;
        let (tx, rx) = mpsc::unbounded_channel();

        // The listener only reports changes; deliver the current state first.
        let current = self.get(collection, id).await?;
        let _ = tx.send(SnapshotEvent::Snapshot(current));

        let mut listener = client
            .create_listener(FirestoreMemListenStateStorage::new())
            .await
            .map_err(|e| AppError::Database(format!("Failed to create listener: {}", e)))?;

        client
            .fluent()
            .select()
            .by_id_in(collection)
            .batch_listen([id.to_string()])
            .add_target(DOCUMENT_TARGET, &mut listener)
            .map_err(|e| AppError::Database(format!("Failed to add listen target: {}", e)))?;

        let events = tx.clone();
        listener
            .start(move |event| {
                let events = events.clone();
                async move {
                    match event {
                        FirestoreListenEvent::DocumentChange(ref change) => {
                            if let Some(doc) = &change.document {
                                let snapshot =
                                    match firestore::FirestoreDb::deserialize_doc_to::<Document>(
                                        doc,
                                    ) {
                                        Ok(body) => SnapshotEvent::Snapshot(Some(body)),
                                        Err(e) => {
                                            SnapshotEvent::Error(AppError::Database(e.to_string()))
                                        }
                                    };
                                let _ = events.send(snapshot);
                            }
                        }
                        FirestoreListenEvent::DocumentDelete(_) => {
                            let _ = events.send(SnapshotEvent::Snapshot(None));
                        }
                        _ => {}
                    }
                    Ok(())
                }
            })
            .await
            .map_err(|e| AppError::Database(format!("Failed to start listener: {}", e)))?;

        let collection = collection.to_string();
        let id = id.to_string();
        tracing::debug!(collection = %collection, id = %id, "Document listener started");

        Ok(Subscription::new(rx, move || {
            tokio::spawn(async move {
                if let Err(e) = listener.shutdown().await {
                    tracing::warn!(error = %e, collection = %collection, id = %id, "Listener shutdown failed");
                } else {
                    tracing::debug!(collection = %collection, id = %id, "Document listener released");
                }
            });
        }))
    }
}
