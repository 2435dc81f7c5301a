// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process [`DocumentStore`] for tests and offline hosts.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

use crate::db::{
    apply_field_path, Document, DocumentStore, FieldUpdate, SetOptions, SnapshotEvent,
    Subscription,
};
use crate::error::{AppError, Result};

type DocKey = (String, String);
type Watchers = Vec<(u64, mpsc::UnboundedSender<SnapshotEvent>)>;

#[derive(Default)]
struct Inner {
    docs: DashMap<DocKey, Document>,
    watchers: DashMap<DocKey, Watchers>,
    next_watcher: AtomicU64,
    offline: AtomicBool,
    released: AtomicUsize,
    read_gates: DashMap<String, watch::Sender<bool>>,
    waiting_reads: AtomicUsize,
}

/// Holds back reads of one collection until released or dropped.
pub struct ReadGate {
    inner: Arc<Inner>,
    collection: String,
}

impl ReadGate {
    pub fn release(self) {}
}

impl Drop for ReadGate {
    fn drop(&mut self) {
        if let Some((_, gate)) = self.inner.read_gates.remove(&self.collection) {
            let _ = gate.send(false);
        }
    }
}

/// Document store held entirely in memory.
///
/// Cloning shares the same documents.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with a transient database error.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Number of subscriptions released so far.
    pub fn released_subscriptions(&self) -> usize {
        self.inner.released.load(Ordering::SeqCst)
    }

    /// Number of subscriptions currently open on a document.
    pub fn active_subscriptions(&self, collection: &str, id: &str) -> usize {
        self.inner
            .watchers
            .get(&key(collection, id))
            .map(|w| w.len())
            .unwrap_or(0)
    }

    /// Park every `get` on `collection` until the returned gate is released.
    pub fn hold_reads(&self, collection: &str) -> ReadGate {
        let (gate, _) = watch::channel(true);
        self.inner.read_gates.insert(collection.to_string(), gate);
        ReadGate {
            inner: self.inner.clone(),
            collection: collection.to_string(),
        }
    }

    /// Number of reads currently parked behind a gate.
    pub fn waiting_reads(&self) -> usize {
        self.inner.waiting_reads.load(Ordering::SeqCst)
    }

    async fn wait_for_gate(&self, collection: &str) {
        let Some(mut gate) = self.inner.read_gates.get(collection).map(|g| g.subscribe()) else {
            return;
        };
        self.inner.waiting_reads.fetch_add(1, Ordering::SeqCst);
        // A closed gate counts as released
        let _ = gate.wait_for(|held| !*held).await;
        self.inner.waiting_reads.fetch_sub(1, Ordering::SeqCst);
    }

    /// Push an error to every subscriber of a document.
    pub fn inject_listener_error(&self, collection: &str, id: &str, message: &str) {
        if let Some(watchers) = self.inner.watchers.get(&key(collection, id)) {
            for (_, tx) in watchers.iter() {
                let _ = tx.send(SnapshotEvent::Error(AppError::Database(message.to_string())));
            }
        }
    }

    fn check_online(&self) -> Result<()> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(AppError::Database("Backend unavailable (offline)".to_string()));
        }
        Ok(())
    }

    fn notify(&self, key: &DocKey) {
        let snapshot = self.inner.docs.get(key).map(|d| d.value().clone());
        if let Some(mut watchers) = self.inner.watchers.get_mut(key) {
            watchers.retain(|(_, tx)| {
                tx.send(SnapshotEvent::Snapshot(snapshot.clone())).is_ok()
            });
        }
    }
}

fn key(collection: &str, id: &str) -> DocKey {
    (collection.to_string(), id.to_string())
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        self.wait_for_gate(collection).await;
        self.check_online()?;
        Ok(self
            .inner
            .docs
            .get(&key(collection, id))
            .map(|d| d.value().clone()))
    }

    async fn set(
        &self,
        collection: &str,
        id: &str,
        data: Document,
        options: SetOptions,
    ) -> Result<()> {
        self.check_online()?;
        if !data.is_object() {
            return Err(AppError::BadRequest("Document body must be an object".to_string()));
        }

        let key = key(collection, id);
        {
            let mut entry = self
                .inner
                .docs
                .entry(key.clone())
                .or_insert_with(|| Value::Object(Default::default()));
            match (options.merge, entry.value_mut(), data) {
                (true, Value::Object(existing), Value::Object(incoming)) => {
                    existing.extend(incoming);
                }
                (_, slot, data) => *slot = data,
            }
        }
        self.notify(&key);
        Ok(())
    }

    async fn update(&self, collection: &str, id: &str, fields: Vec<FieldUpdate>) -> Result<()> {
        self.check_online()?;

        let key = key(collection, id);
        {
            let mut doc = self
                .inner
                .docs
                .get_mut(&key)
                .ok_or_else(|| AppError::NotFound(format!("{}/{}", collection, id)))?;
            for field in fields {
                apply_field_path(doc.value_mut(), &field.path, field.value);
            }
        }
        self.notify(&key);
        Ok(())
    }

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<(String, Document)>> {
        self.check_online()?;

        let mut found: Vec<(String, Document)> = self
            .inner
            .docs
            .iter()
            .filter(|entry| entry.key().0 == collection)
            .filter(|entry| entry.value().get(field).and_then(Value::as_str) == Some(value))
            .map(|entry| (entry.key().1.clone(), entry.value().clone()))
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found)
    }

    async fn subscribe(&self, collection: &str, id: &str) -> Result<Subscription> {
        self.check_online()?;

        let key = key(collection, id);
        let (tx, rx) = mpsc::unbounded_channel();
        let current = self.inner.docs.get(&key).map(|d| d.value().clone());
        let _ = tx.send(SnapshotEvent::Snapshot(current));

        let watcher_id = self.inner.next_watcher.fetch_add(1, Ordering::SeqCst);
        self.inner
            .watchers
            .entry(key.clone())
            .or_default()
            .push((watcher_id, tx));

        let inner = self.inner.clone();
        Ok(Subscription::new(rx, move || {
            if let Some(mut watchers) = inner.watchers.get_mut(&key) {
                watchers.retain(|(wid, _)| *wid != watcher_id);
            }
            inner.released.fetch_add(1, Ordering::SeqCst);
        }))
    }
}
