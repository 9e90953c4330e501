// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Content store access for offloaded payloads.
//!
//! [`ContentStoreResolver`] walks the candidate targets in order and stops at the
//! first successful upload. Failures of individual targets are logged and never
//! propagated; only exhaustion of every candidate is reported, as a value.

use crate::errors::ContentStoreError;
use crate::targets::StorageTarget;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Object put primitive. Implementations must not retry on their own.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn put(
        &self,
        target: &StorageTarget,
        path: &str,
        body: &str,
    ) -> Result<(), ContentStoreError>;
}

/// Every candidate target rejected the upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffloadFailure {
    pub path: String,
    /// `(target name, error)` per attempted candidate, in attempt order.
    pub attempts: Vec<(String, String)>,
}

impl fmt::Display for OffloadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.attempts.is_empty() {
            return write!(f, "no storage target available for {}", self.path);
        }
        write!(f, "all storage targets failed for {}: ", self.path)?;
        for (i, (target, err)) in self.attempts.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{target}: {err}")?;
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct ContentStoreResolver {
    store: Arc<dyn ContentStore>,
}

impl ContentStoreResolver {
    pub fn new(store: Arc<dyn ContentStore>) -> Self {
        Self { store }
    }

    /// Uploads `body` to the first candidate that accepts it and returns that
    /// candidate. Candidates are tried sequentially.
    pub async fn upload(
        &self,
        candidates: &[StorageTarget],
        path: &str,
        body: &str,
    ) -> Result<StorageTarget, OffloadFailure> {
        let mut attempts = Vec::with_capacity(candidates.len());

        for target in candidates {
            match self.store.put(target, path, body).await {
                Ok(()) => {
                    debug!(
                        "OFFLOAD | Uploaded {} bytes to {}/{} ({})",
                        body.len(),
                        target.name,
                        path,
                        target.region
                    );
                    return Ok(target.clone());
                }
                Err(e) => {
                    warn!(
                        "OFFLOAD | Failed to upload {} to {} ({}): {}",
                        path, target.name, target.region, e
                    );
                    attempts.push((target.name.clone(), e.to_string()));
                }
            }
        }

        let failure = OffloadFailure {
            path: path.to_string(),
            attempts,
        };
        error!("OFFLOAD | {failure}");
        Err(failure)
    }
}

impl fmt::Debug for ContentStoreResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentStoreResolver")
    }
}

/// Object store reachable over HTTP: `PUT {endpoint}/{target.name}/{path}`.
///
/// The target region and credential reference travel as `x-storage-region` and
/// `x-credential-ref` headers.
#[derive(Debug, Clone)]
pub struct HttpContentStore {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpContentStore {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ContentStoreError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: reqwest::Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        }
    }

    fn headers(target: &StorageTarget) -> Result<HeaderMap, ContentStoreError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "x-storage-region",
            HeaderValue::from_str(&target.region)
                .map_err(|e| ContentStoreError::Rejected(format!("invalid region header: {e}")))?,
        );
        if let Some(credential_ref) = &target.credential_ref {
            headers.insert(
                "x-credential-ref",
                HeaderValue::from_str(credential_ref).map_err(|e| {
                    ContentStoreError::Rejected(format!("invalid credential header: {e}"))
                })?,
            );
        }
        Ok(headers)
    }
}

#[async_trait]
impl ContentStore for HttpContentStore {
    async fn put(
        &self,
        target: &StorageTarget,
        path: &str,
        body: &str,
    ) -> Result<(), ContentStoreError> {
        let url = format!("{}/{}/{}", self.endpoint, target.name, path);
        let resp = self
            .client
            .put(&url)
            .headers(Self::headers(target)?)
            .body(body.to_string())
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ContentStoreError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
