// SPDX-License-Identifier: Apache-2.0

use crate::{StoreError, StoreErrorCode};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Read-only access to the static host the datasets were published to.
/// Paths are logical, `/`-separated, and relative to the backend root.
#[async_trait]
pub trait PartStoreBackend: Send + Sync {
    fn backend_tag(&self) -> &'static str;

    async fn fetch_text(&self, path: &str) -> Result<String, StoreError>;
}

pub struct LocalFsBackend {
    root: PathBuf,
}

impl LocalFsBackend {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn resolve_safe(&self, path: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(path);
        for component in relative.components() {
            match component {
                Component::Normal(_) => {}
                _ => {
                    return Err(StoreError::new(
                        StoreErrorCode::Validation,
                        format!("path traversal blocked: {path}"),
                    ))
                }
            }
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl PartStoreBackend for LocalFsBackend {
    fn backend_tag(&self) -> &'static str {
        "localfs"
    }

    async fn fetch_text(&self, path: &str) -> Result<String, StoreError> {
        let resolved = self.resolve_safe(path)?;
        fs::read_to_string(&resolved).map_err(|e| {
            let code = if e.kind() == std::io::ErrorKind::NotFound {
                StoreErrorCode::NotFound
            } else {
                StoreErrorCode::Io
            };
            StoreError::new(code, format!("read failed for {path}: {e}"))
        })
    }
}

/// Backend for a size-capped static file host reached over HTTP. The host
/// serves plain files; there is no listing or write surface.
#[derive(Clone)]
pub struct HttpBackend {
    base_url: String,
    client: reqwest::Client,
}

impl HttpBackend {
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl PartStoreBackend for HttpBackend {
    fn backend_tag(&self) -> &'static str {
        "http"
    }

    async fn fetch_text(&self, path: &str) -> Result<String, StoreError> {
        let url = self.url_for(path);
        debug!(url = %url, "store fetch");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| StoreError::new(StoreErrorCode::Network, e.to_string()))?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(StoreError::new(
                StoreErrorCode::NotFound,
                format!("not found: {url}"),
            )),
            status if !status.is_success() => Err(StoreError::new(
                StoreErrorCode::Network,
                format!("unexpected status {status} for {url}"),
            )),
            _ => response
                .text()
                .await
                .map_err(|e| StoreError::new(StoreErrorCode::Network, e.to_string())),
        }
    }
}
