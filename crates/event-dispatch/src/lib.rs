// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Size-aware batching and bounded-concurrency dispatch of events to message queues.
//!
//! Events are formatted into transport entries, measured against the transport's
//! per-message limit (oversized content is offloaded to a content store and replaced
//! by a pointer body), grouped into wire-legal batches, and sent under a global
//! concurrency cap. Per-message outcomes are reconciled back to the caller keyed by
//! the 1-based sequence id of each event.
//!
//! ```text
//!   events ─> MessageFormatter ─> SizeEvaluator ─> Partitioner
//!                                                      │
//!                     ┌────────────────────────────────┘
//!                     v
//!               Dispatcher (≤ max_concurrency pipelines)
//!                 │  ├─ ContentStoreResolver (offloaded messages)
//!                 │  └─ QueueTransport::send_batch
//!                 v
//!               aggregate ─> DispatchSummary
//! ```

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod aggregator;
pub mod batch;
pub mod config;
pub mod constants;
pub mod content_store;
pub mod destination;
pub mod dispatcher;
pub mod errors;
pub mod event;
pub mod logger;
pub mod message;
pub mod offload;
pub mod publisher;
pub mod targets;
pub mod transport;

pub use aggregator::{DispatchOutcome, DispatchSummary, OutcomeCode};
pub use config::{DispatchConfig, TenantFallback};
pub use destination::Destination;
pub use errors::DispatchError;
pub use event::{AttributeValue, Event, PublishContext};
pub use publisher::EventPublisher;
pub use targets::{StorageTarget, TargetSource};
pub use transport::SendReceipt;
