// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helper functions for integration tests

use super::mocks::{MockContentStore, MockTransport};
use chrono::{TimeZone, Utc};
use event_dispatch::message::MessageFormatter;
use event_dispatch::{DispatchConfig, EventPublisher, StorageTarget, TargetSource};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub const QUEUE_URL: &str = "https://sqs.eu-west-1.amazonaws.com/123456789012/orders";

/// Formatter with a pinned clock and id source so offload paths are predictable
pub fn pinned_formatter(config: &DispatchConfig) -> MessageFormatter {
    MessageFormatter::new(&config.service_name, config.tenant_fallback.clone())
        .with_clock(Arc::new(|| Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap()))
        .with_id_source(Arc::new(|| "fixed".to_string()))
}

pub fn test_config() -> DispatchConfig {
    DispatchConfig {
        service_name: "billing".to_string(),
        ..Default::default()
    }
}

pub fn default_targets() -> Vec<StorageTarget> {
    vec![
        StorageTarget::new("primary-bucket", "eu-west-1"),
        StorageTarget::new("fallback-bucket", "eu-central-1"),
    ]
}

/// Resolver counting how many times it was invoked
pub fn counting_targets(counter: Arc<AtomicUsize>) -> TargetSource {
    TargetSource::new_from_resolver(Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok::<_, String>(default_targets()) })
    }))
}

pub fn publisher(
    transport: Arc<MockTransport>,
    store: Arc<MockContentStore>,
    targets: TargetSource,
) -> EventPublisher {
    let config = test_config();
    EventPublisher::new(&config, transport, store, targets)
        .unwrap()
        .with_formatter(pinned_formatter(&config))
}
