// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Database layer: the document-store boundary and its implementations.

pub mod firestore;
pub mod memory;

pub use self::firestore::FirestoreDb;
pub use memory::{MemoryStore, ReadGate};

use async_trait::async_trait;
use futures_util::Stream;
use serde_json::{Map, Value};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use crate::error::{AppError, Result};

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    pub const ROOMS: &str = "rooms";
}

/// A stored document body (always a JSON object).
pub type Document = Value;

/// Options for [`DocumentStore::set`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SetOptions {
    /// Only write the top-level keys present in the data.
    pub merge: bool,
}

impl SetOptions {
    pub fn merge() -> Self {
        Self { merge: true }
    }
}

/// A targeted write of one (possibly nested) field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    /// Dotted path, e.g. `members.<userId>.nickname`
    pub path: String,
    pub value: Value,
}

impl FieldUpdate {
    pub fn new(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
        }
    }
}

/// Event delivered by a document subscription.
#[derive(Debug)]
pub enum SnapshotEvent {
    /// Current document contents (`None` when it does not exist)
    Snapshot(Option<Document>),
    /// The listener reported an error; the subscription stays open
    Error(AppError),
}

type ReleaseFn = Box<dyn FnOnce() + Send>;

/// Live subscription to a single document.
///
/// The backing listener is released exactly once: by
/// [`Subscription::unsubscribe`] or when the subscription is dropped.
pub struct Subscription {
    events: mpsc::UnboundedReceiver<SnapshotEvent>,
    release: Option<ReleaseFn>,
}

impl Subscription {
    pub fn new(
        events: mpsc::UnboundedReceiver<SnapshotEvent>,
        release: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            events,
            release: Some(Box::new(release)),
        }
    }

    /// Wait for the next event. `None` once the listener has shut down.
    pub async fn recv(&mut self) -> Option<SnapshotEvent> {
        self.events.recv().await
    }

    /// Release the listener now.
    pub fn unsubscribe(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if let Some(release) = self.release.take() {
            self.events.close();
            release();
        }
    }
}

impl Stream for Subscription {
    type Item = SnapshotEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release_once();
    }
}

/// Opaque document store: get/set/update/query/subscribe.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Write a document, replacing it unless `options.merge` is set.
    async fn set(
        &self,
        collection: &str,
        id: &str,
        data: Document,
        options: SetOptions,
    ) -> Result<()>;

    /// Write individual field paths without touching siblings.
    async fn update(&self, collection: &str, id: &str, fields: Vec<FieldUpdate>) -> Result<()>;

    /// Find documents whose `field` equals `value`.
    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<(String, Document)>>;

    /// Listen for changes to a document. The current state is delivered
    /// first.
    async fn subscribe(&self, collection: &str, id: &str) -> Result<Subscription>;
}

/// Set `path` inside `doc`, creating intermediate objects as needed.
pub fn apply_field_path(doc: &mut Value, path: &str, value: Value) {
    let mut segments = path.split('.').peekable();
    let mut cursor = doc;
    while let Some(segment) = segments.next() {
        if !cursor.is_object() {
            *cursor = Value::Object(Map::new());
        }
        let Value::Object(map) = cursor else {
            return;
        };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return;
        }
        cursor = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

/// Fold field updates into one nested object plus the list of paths
/// (the update mask).
pub fn nest_field_updates(fields: Vec<FieldUpdate>) -> (Document, Vec<String>) {
    let mut doc = Value::Object(Map::new());
    let mut paths = Vec::with_capacity(fields.len());
    for field in fields {
        apply_field_path(&mut doc, &field.path, field.value);
        paths.push(field.path);
    }
    (doc, paths)
}

/// Timestamp value written where the backend would stamp server time.
///
/// Stamped from the client clock in the `{seconds, nanoseconds}` shape.
pub fn server_timestamp() -> Value {
    let now = chrono::Utc::now();
    serde_json::json!({
        "seconds": now.timestamp(),
        "nanoseconds": now.timestamp_subsec_nanos(),
    })
}

/// Field path addressing one member entry of a room.
pub fn member_path(user_id: &str, field: &str) -> String {
    format!("members.{}.{}", user_id, field)
}
