// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Caller-facing entry points.
//!
//! A publish call moves through
//! `resolving targets -> formatting -> evaluating -> partitioning -> dispatching -> aggregating`.
//! Target resolution only happens when at least one message needs offload. Failures
//! during destination parsing, formatting or target resolution abort the call; every
//! later failure is reported per message in the returned summary.

use crate::aggregator::{aggregate, DispatchSummary};
use crate::batch::Partitioner;
use crate::config::DispatchConfig;
use crate::content_store::{ContentStore, ContentStoreResolver};
use crate::destination::Destination;
use crate::dispatcher::Dispatcher;
use crate::errors::{ConfigError, DispatchError};
use crate::event::{Event, PublishContext};
use crate::message::MessageFormatter;
use crate::offload::{self, SizeEvaluator, SizedMessage};
use crate::targets::{CallTargets, TargetSource};
use crate::transport::{BatchEntry, QueueTransport, SendReceipt};
use std::sync::Arc;
use tracing::{debug, error};

pub struct EventPublisher {
    formatter: MessageFormatter,
    evaluator: SizeEvaluator,
    partitioner: Partitioner,
    dispatcher: Dispatcher,
    transport: Arc<dyn QueueTransport>,
    resolver: ContentStoreResolver,
    targets: TargetSource,
    max_message_size_bytes: usize,
}

impl EventPublisher {
    pub fn new(
        config: &DispatchConfig,
        transport: Arc<dyn QueueTransport>,
        store: Arc<dyn ContentStore>,
        targets: TargetSource,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let resolver = ContentStoreResolver::new(store);
        let partitioner = Partitioner::new(config.max_batch_size_bytes, config.max_batch_entries);
        let dispatcher = Dispatcher::new(
            Arc::clone(&transport),
            resolver.clone(),
            partitioner,
            config.max_message_size_bytes,
            config.max_concurrency,
        );

        Ok(Self {
            formatter: MessageFormatter::new(&config.service_name, config.tenant_fallback.clone()),
            evaluator: SizeEvaluator::new(
                config.max_message_size_bytes,
                config.offload_reserve_bytes,
            ),
            partitioner,
            dispatcher,
            transport,
            resolver,
            targets,
            max_message_size_bytes: config.max_message_size_bytes,
        })
    }

    /// Replaces the formatter, typically to pin the clock and id source.
    #[must_use]
    pub fn with_formatter(mut self, formatter: MessageFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    /// Publishes every event and reports one outcome per event.
    ///
    /// Only call-level failures are returned as errors. In that case nothing was sent.
    pub async fn publish_many(
        &self,
        destination: &str,
        events: &[Event],
        context: &PublishContext,
    ) -> Result<DispatchSummary, DispatchError> {
        let destination = Destination::parse(destination)?;
        if events.is_empty() {
            return Ok(DispatchSummary::default());
        }

        let messages = self.prepare(&destination, events, context)?;

        let call_targets = CallTargets::new(&self.targets);
        let targets = if messages.iter().any(|m| m.message.limit_exceeded) {
            Some(call_targets.get().await.inspect_err(|e| {
                error!("DISPATCH | Aborting publish to {}: {}", destination, e);
            })?)
        } else {
            None
        };

        let batches = self.partitioner.partition(messages);
        debug!(
            "DISPATCH | Partitioned {} events into {} batches",
            events.len(),
            batches.len()
        );

        let results = self.dispatcher.dispatch(&destination, batches, targets).await;
        let summary = aggregate(results);
        debug!(
            "DISPATCH | Published {} events to {}: {} succeeded, {} failed",
            events.len(),
            destination,
            summary.success_count,
            summary.failed_count
        );
        Ok(summary)
    }

    /// Publishes a single event with the transport's single-send primitive.
    ///
    /// Unlike [`publish_many`](Self::publish_many), offload and transport failures
    /// are returned as errors.
    pub async fn publish_one(
        &self,
        destination: &str,
        event: &Event,
        context: &PublishContext,
    ) -> Result<SendReceipt, DispatchError> {
        let destination = Destination::parse(destination)?;
        let mut sized = self
            .prepare(&destination, std::slice::from_ref(event), context)?
            .into_iter()
            .next()
            .ok_or_else(|| DispatchError::InvalidInput("no event to publish".to_string()))?;

        if sized.message.limit_exceeded {
            let planned = sized.message.size_bytes();
            if planned > self.max_message_size_bytes {
                return Err(DispatchError::PayloadTooLarge {
                    size: planned,
                    limit: self.max_message_size_bytes,
                });
            }
            let call_targets = CallTargets::new(&self.targets);
            let targets = call_targets.get().await?;
            let msg = &mut sized.message;
            let (Some(path), Some(payload)) =
                (msg.extra.offload_path.as_deref(), msg.extra.payload.as_deref())
            else {
                return Err(DispatchError::Offload(
                    "message has no offload path".to_string(),
                ));
            };
            let target = self
                .resolver
                .upload(&targets, path, payload)
                .await
                .map_err(|failure| DispatchError::Offload(failure.to_string()))?;
            offload::finalize(msg, &target);
            msg.extra.payload = None;
        }

        let entry = BatchEntry::from_message(&sized.message);
        let size = entry.size_bytes();
        if size > self.max_message_size_bytes {
            return Err(DispatchError::PayloadTooLarge {
                size,
                limit: self.max_message_size_bytes,
            });
        }

        let receipt = self.transport.send_one(&destination, &entry).await?;
        debug!(
            "DISPATCH | Published message {} to {}",
            receipt.message_id, destination
        );
        Ok(receipt)
    }

    /// Formats and sizes every event, failing the whole call on the first invalid one.
    fn prepare(
        &self,
        destination: &Destination,
        events: &[Event],
        context: &PublishContext,
    ) -> Result<Vec<SizedMessage>, DispatchError> {
        events
            .iter()
            .enumerate()
            .map(|(index, event)| {
                let sequence_id = index + 1;
                if destination.is_fifo() && event.group_key.is_none() {
                    return Err(DispatchError::InvalidInput(format!(
                        "event {sequence_id} has no group key but {} is a FIFO queue",
                        destination.queue_name()
                    )));
                }

                let msg = self.formatter.format(
                    event,
                    destination.queue_name(),
                    sequence_id,
                    context,
                )?;
                let sized = self.evaluator.evaluate(msg);
                if sized.message.limit_exceeded && sized.message.extra.offload_path.is_none() {
                    return Err(DispatchError::InvalidInput(format!(
                        "event {sequence_id} needs offload but no tenant is set"
                    )));
                }
                Ok(sized)
            })
            .collect()
    }
}

impl std::fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventPublisher")
            .field("formatter", &self.formatter)
            .field("dispatcher", &self.dispatcher)
            .field("targets", &self.targets)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::TenantFallback;
    use crate::errors::{ContentStoreError, TransportError};
    use crate::message::tests::fixed_formatter;
    use crate::targets::StorageTarget;
    use crate::transport::BatchSendResponse;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    const QUEUE_URL: &str = "https://sqs.us-east-1.amazonaws.com/123456789012/orders";
    const FIFO_URL: &str = "https://sqs.us-east-1.amazonaws.com/123456789012/orders.fifo";

    #[derive(Default)]
    struct SingleTransport {
        sent: Mutex<Vec<BatchEntry>>,
    }

    #[async_trait]
    impl QueueTransport for SingleTransport {
        async fn send_one(
            &self,
            _destination: &Destination,
            entry: &BatchEntry,
        ) -> Result<SendReceipt, TransportError> {
            self.sent.lock().unwrap().push(entry.clone());
            Ok(SendReceipt {
                message_id: "m-1".to_string(),
                sequence_number: None,
            })
        }

        async fn send_batch(
            &self,
            _destination: &Destination,
            _entries: &[BatchEntry],
        ) -> Result<BatchSendResponse, TransportError> {
            Ok(BatchSendResponse::default())
        }
    }

    struct FailingStore;

    #[async_trait]
    impl ContentStore for FailingStore {
        async fn put(
            &self,
            _target: &StorageTarget,
            _path: &str,
            _body: &str,
        ) -> Result<(), ContentStoreError> {
            Err(ContentStoreError::Rejected("denied".to_string()))
        }
    }

    #[derive(Default)]
    struct CountingStore {
        puts: Mutex<usize>,
    }

    #[async_trait]
    impl ContentStore for CountingStore {
        async fn put(
            &self,
            _target: &StorageTarget,
            _path: &str,
            _body: &str,
        ) -> Result<(), ContentStoreError> {
            *self.puts.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn publisher(config: &DispatchConfig, transport: Arc<SingleTransport>) -> EventPublisher {
        EventPublisher::new(
            config,
            transport,
            Arc::new(FailingStore),
            TargetSource::new_from_static_targets(vec![StorageTarget::new("b", "r")]),
        )
        .unwrap()
        .with_formatter(fixed_formatter())
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = DispatchConfig {
            max_concurrency: 0,
            ..Default::default()
        };
        let result = EventPublisher::new(
            &config,
            Arc::new(SingleTransport::default()),
            Arc::new(FailingStore),
            TargetSource::new_from_static_targets(vec![]),
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_publish_one_sends_single_entry() {
        let transport = Arc::new(SingleTransport::default());
        let receipt = publisher(&DispatchConfig::default(), transport.clone())
            .publish_one(QUEUE_URL, &Event::new(json!({"id": 1})), &PublishContext::default())
            .await
            .unwrap();

        assert_eq!(receipt.message_id, "m-1");
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].message_body, r#"{"id":1}"#);
    }

    #[tokio::test]
    async fn test_publish_one_offload_failure_is_an_error() {
        let transport = Arc::new(SingleTransport::default());
        let event = Event::new(json!({"foo": "x".repeat(300 * 1024)}));
        let result = publisher(&DispatchConfig::default(), transport.clone())
            .publish_one(QUEUE_URL, &event, &PublishContext::default())
            .await;

        assert!(matches!(result, Err(DispatchError::Offload(_))));
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_publish_one_oversized_pointer_skips_upload() {
        let config = DispatchConfig {
            max_message_size_bytes: 500,
            offload_reserve_bytes: 90,
            ..Default::default()
        };
        let transport = Arc::new(SingleTransport::default());
        let store = Arc::new(CountingStore::default());
        let publisher = EventPublisher::new(
            &config,
            transport.clone(),
            store.clone(),
            TargetSource::new_from_static_targets(vec![StorageTarget::new("b", "r")]),
        )
        .unwrap()
        .with_formatter(fixed_formatter());

        let event = Event::new(json!({"bar": "y".repeat(600), "foo": "z".repeat(600)}))
            .with_fixed_properties(["bar"]);
        let result = publisher
            .publish_one(QUEUE_URL, &event, &PublishContext::default())
            .await;

        assert!(matches!(
            result,
            Err(DispatchError::PayloadTooLarge { limit: 500, .. })
        ));
        assert_eq!(*store.puts.lock().unwrap(), 0);
        assert!(transport.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_publish_many_requires_group_key_for_fifo() {
        let transport = Arc::new(SingleTransport::default());
        let publisher = publisher(&DispatchConfig::default(), transport);
        let events = vec![
            Event::new(json!({"a": 1})).with_group_key("g"),
            Event::new(json!({"a": 2})),
        ];

        let result = publisher
            .publish_many(FIFO_URL, &events, &PublishContext::default())
            .await;
        assert!(matches!(result, Err(DispatchError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_publish_many_missing_content_is_invalid_input() {
        let transport = Arc::new(SingleTransport::default());
        let result = publisher(&DispatchConfig::default(), transport)
            .publish_many(QUEUE_URL, &[Event::default()], &PublishContext::default())
            .await;
        assert!(matches!(result, Err(DispatchError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_publish_many_required_tenant_only_matters_for_offload() {
        let config = DispatchConfig {
            tenant_fallback: TenantFallback::Require,
            ..Default::default()
        };
        let transport = Arc::new(SingleTransport::default());
        let publisher = EventPublisher::new(
            &config,
            transport,
            Arc::new(FailingStore),
            TargetSource::new_from_static_targets(vec![StorageTarget::new("b", "r")]),
        )
        .unwrap();

        let huge = Event::new(json!({"foo": "x".repeat(300 * 1024)}));
        let result = publisher
            .publish_many(QUEUE_URL, &[huge], &PublishContext::default())
            .await;
        assert!(matches!(result, Err(DispatchError::InvalidInput(_))));

        let summary = publisher
            .publish_many(QUEUE_URL, &[Event::new(json!({"a": 1}))], &PublishContext::default())
            .await
            .unwrap();
        assert_eq!(summary.total(), 1);
    }

    #[tokio::test]
    async fn test_publish_many_empty_events() {
        let transport = Arc::new(SingleTransport::default());
        let summary = publisher(&DispatchConfig::default(), transport)
            .publish_many(QUEUE_URL, &[], &PublishContext::default())
            .await
            .unwrap();
        assert_eq!(summary, DispatchSummary::default());
    }
}
