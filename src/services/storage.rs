// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Object storage for profile images.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::services::auth::FirebaseAuth;

/// Object path for a freshly uploaded profile image.
pub fn profile_image_path(user_id: &str, uploaded_at_millis: i64) -> String {
    format!("profiles/profile_{}_{}.jpg", user_id, uploaded_at_millis)
}

/// Upload-only object store.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload the file at `local_path` to `path`; returns its download URL.
    async fn upload(&self, path: &str, local_path: &Path) -> Result<String>;
}

async fn read_local(local_path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(local_path).await.map_err(|e| {
        AppError::Storage(format!("Failed to read {}: {}", local_path.display(), e))
    })
}

/// Firebase Storage REST client.
pub struct FirebaseStorage {
    http: reqwest::Client,
    base_url: String,
    bucket: String,
    auth: Arc<FirebaseAuth>,
}

impl FirebaseStorage {
    /// Uses the Storage emulator when `FIREBASE_STORAGE_EMULATOR_HOST` is set.
    pub fn new(bucket: &str, auth: Arc<FirebaseAuth>) -> Self {
        let base_url = match std::env::var("FIREBASE_STORAGE_EMULATOR_HOST") {
            Ok(host) => format!("http://{}/v0", host),
            Err(_) => "https://firebasestorage.googleapis.com/v0".to_string(),
        };
        Self {
            http: reqwest::Client::new(),
            base_url,
            bucket: bucket.to_string(),
            auth,
        }
    }

    /// Public download URL for an object and its download token.
    pub fn download_url(&self, path: &str, token: &str) -> String {
        format!(
            "{}/b/{}/o/{}?alt=media&token={}",
            self.base_url,
            self.bucket,
            urlencoding::encode(path),
            urlencoding::encode(token)
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    name: String,
    #[serde(default)]
    download_tokens: Option<String>,
}

#[async_trait]
impl ObjectStorage for FirebaseStorage {
    async fn upload(&self, path: &str, local_path: &Path) -> Result<String> {
        let bytes = read_local(local_path).await?;
        let id_token = self.auth.id_token().await.ok_or(AppError::Unauthorized)?;

        let url = format!(
            "{}/b/{}/o?name={}",
            self.base_url,
            self.bucket,
            urlencoding::encode(path)
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(id_token)
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(bytes)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("Upload request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Storage(format!("HTTP {}: {}", status, body)));
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| AppError::Storage(format!("JSON parse error: {}", e)))?;

        // Multiple tokens are comma separated; any of them works
        let token = uploaded
            .download_tokens
            .as_deref()
            .and_then(|t| t.split(',').next())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Storage("Upload returned no download token".to_string()))?;

        tracing::info!(path = %uploaded.name, "Uploaded object");
        Ok(self.download_url(&uploaded.name, token))
    }
}

/// Objects held in memory, for tests and offline hosts.
#[derive(Default)]
pub struct MemoryStorage {
    objects: DashMap<String, Vec<u8>>,
    failing: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make uploads fail with a storage error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.get(path).map(|o| o.value().clone())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn upload(&self, path: &str, local_path: &Path) -> Result<String> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Storage("Upload rejected".to_string()));
        }
        let bytes = read_local(local_path).await?;
        self.objects.insert(path.to_string(), bytes);
        Ok(format!("memory://{}", path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_image_path() {
        assert_eq!(
            profile_image_path("abc", 1717200000000),
            "profiles/profile_abc_1717200000000.jpg"
        );
    }

    #[test]
    fn test_download_url_encodes_path() {
        let storage = FirebaseStorage::new("bucket", Arc::new(FirebaseAuth::new("key")));
        let url = storage.download_url("profiles/p_1.jpg", "tok");
        assert!(url.ends_with("/b/bucket/o/profiles%2Fp_1.jpg?alt=media&token=tok"));
    }

    #[tokio::test]
    async fn test_memory_upload() {
        let dir = std::env::temp_dir().join(format!("hc-storage-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let file = dir.join("me.jpg");
        tokio::fs::write(&file, b"jpeg").await.unwrap();

        let storage = MemoryStorage::new();
        let url = storage.upload("profiles/me.jpg", &file).await.unwrap();
        assert_eq!(url, "memory://profiles/me.jpg");
        assert_eq!(storage.object("profiles/me.jpg").unwrap(), b"jpeg");

        storage.set_failing(true);
        let err = storage.upload("profiles/x.jpg", &file).await.unwrap_err();
        assert!(err.is_transient());

        let missing = storage.upload("p", &dir.join("missing.jpg")).await;
        assert!(missing.is_err());
        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
