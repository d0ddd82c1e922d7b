// SPDX-License-Identifier: Apache-2.0

use async_trait::async_trait;
use partwise_store::{PartStoreBackend, StoreError, StoreErrorCode};
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::time::Duration;
use tokio::sync::Mutex;

/// In-memory backend for tests: seeded files, per-path artificial latency,
/// and a fetch counter for asserting single-flight behavior.
pub struct FakeStore {
    pub files: Mutex<HashMap<String, String>>,
    pub delays: Mutex<HashMap<String, Duration>>,
    pub fetch_calls: AtomicU64,
}

impl Default for FakeStore {
    fn default() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            delays: Mutex::new(HashMap::new()),
            fetch_calls: AtomicU64::new(0),
        }
    }
}

impl FakeStore {
    pub async fn put(&self, path: &str, text: &str) {
        self.files
            .lock()
            .await
            .insert(path.to_string(), text.to_string());
    }

    pub async fn delay(&self, path: &str, delay: Duration) {
        self.delays.lock().await.insert(path.to_string(), delay);
    }

    pub async fn remove(&self, path: &str) {
        self.files.lock().await.remove(path);
    }
}

#[async_trait]
impl PartStoreBackend for FakeStore {
    fn backend_tag(&self) -> &'static str {
        "fake"
    }

    async fn fetch_text(&self, path: &str) -> Result<String, StoreError> {
        self.fetch_calls
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let delay = self.delays.lock().await.get(path).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.files
            .lock()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::new(StoreErrorCode::NotFound, format!("not found: {path}")))
    }
}
