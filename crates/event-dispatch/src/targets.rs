// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Storage target candidates for offloaded content.
//!
//! Resolving the candidate list can be a multi-hop lookup (shared resource lookup,
//! parameter fetch, credential exchange), so a [`TargetSource`] is only consulted
//! through a [`CallTargets`], which memoizes the result for one publish call and is
//! dropped at the end of it. Nothing is cached across calls.

use crate::errors::DispatchError;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use std::{future::Future, pin::Pin};
use tokio::sync::OnceCell;
use tracing::debug;

/// A bucket-like location content can be uploaded to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageTarget {
    pub name: String,
    pub region: String,
    /// Opaque reference the content store uses to pick credentials.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_ref: Option<String>,
}

impl StorageTarget {
    pub fn new(name: &str, region: &str) -> Self {
        Self {
            name: name.to_string(),
            region: region.to_string(),
            credential_ref: None,
        }
    }

    #[must_use]
    pub fn with_credential_ref(mut self, credential_ref: &str) -> Self {
        self.credential_ref = Some(credential_ref.to_string());
        self
    }
}

pub type TargetResolverFn = Arc<
    dyn Fn() -> Pin<Box<dyn Future<Output = Result<Vec<StorageTarget>, String>> + Send>>
        + Send
        + Sync,
>;

/// Ordered candidate list; the first entry is the default target and the rest are
/// fallbacks.
#[derive(Clone)]
pub enum TargetSource {
    Static(Vec<StorageTarget>),
    Dynamic(TargetResolverFn),
}

impl TargetSource {
    pub fn new_from_resolver(resolver_fn: TargetResolverFn) -> Self {
        Self::Dynamic(resolver_fn)
    }

    pub fn new_from_static_targets(targets: Vec<StorageTarget>) -> Self {
        Self::Static(targets)
    }

    /// An empty candidate list is a resolution failure: there is nowhere to upload to.
    pub async fn resolve_candidates(&self) -> Result<Vec<StorageTarget>, DispatchError> {
        let targets = match self {
            Self::Static(targets) => targets.clone(),
            Self::Dynamic(resolver_fn) => (resolver_fn)()
                .await
                .map_err(DispatchError::TargetResolution)?,
        };

        if targets.is_empty() {
            return Err(DispatchError::TargetResolution(
                "no storage target candidates available".to_string(),
            ));
        }
        Ok(targets)
    }
}

impl Debug for TargetSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Static(targets) => f.debug_tuple("Static").field(targets).finish(),
            Self::Dynamic(_) => write!(f, "Dynamic"),
        }
    }
}

/// Candidate list resolved at most once for the duration of one publish call.
pub struct CallTargets<'a> {
    source: &'a TargetSource,
    targets: OnceCell<Arc<[StorageTarget]>>,
}

impl<'a> CallTargets<'a> {
    pub fn new(source: &'a TargetSource) -> Self {
        Self {
            source,
            targets: OnceCell::new(),
        }
    }

    pub async fn get(&self) -> Result<Arc<[StorageTarget]>, DispatchError> {
        let targets = self
            .targets
            .get_or_try_init(|| async {
                let targets = self.source.resolve_candidates().await?;
                debug!("OFFLOAD | Resolved {} storage target candidates", targets.len());
                Ok::<_, DispatchError>(Arc::from(targets))
            })
            .await?;
        Ok(Arc::clone(targets))
    }

    pub fn is_resolved(&self) -> bool {
        self.targets.initialized()
    }
}
