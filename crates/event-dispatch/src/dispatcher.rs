// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded-concurrency execution of batch pipelines.
//!
//! Every batch runs the same pipeline in its own task:
//!
//! ```text
//!   planned size check ─> offload uploads (concurrent) ─> final pointer bodies ─> final size check
//!        │                        │                                               │
//!        └─ PAYLOAD_TOO_LARGE     └─ S3_ERROR                  PAYLOAD_TOO_LARGE ─┘
//!                                                re-partition ─> send_batch ─> reconcile
//! ```
//!
//! Admission is guarded by one counting semaphore owned by the [`Dispatcher`] and
//! shared by every call made through it, so at most `max_concurrency` pipelines are
//! in flight no matter how many batches or concurrent callers there are.

use crate::aggregator::{BatchResult, DispatchOutcome, OutcomeCode};
use crate::batch::{Batch, Partitioner, Weighed};
use crate::content_store::ContentStoreResolver;
use crate::destination::Destination;
use crate::message::FormattedMessage;
use crate::offload::{self, SizedMessage};
use crate::targets::StorageTarget;
use crate::transport::{BatchEntry, BatchSendResponse, QueueTransport};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn QueueTransport>,
    resolver: ContentStoreResolver,
    partitioner: Partitioner,
    max_message_size_bytes: usize,
    max_concurrency: usize,
    semaphore: Arc<Semaphore>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("partitioner", &self.partitioner)
            .field("max_message_size_bytes", &self.max_message_size_bytes)
            .field("max_concurrency", &self.max_concurrency)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// `max_concurrency` is clamped to at least 1.
    pub fn new(
        transport: Arc<dyn QueueTransport>,
        resolver: ContentStoreResolver,
        partitioner: Partitioner,
        max_message_size_bytes: usize,
        max_concurrency: usize,
    ) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            transport,
            resolver,
            partitioner,
            max_message_size_bytes,
            max_concurrency,
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
        }
    }

    /// Runs one pipeline per batch and returns their results in submission order.
    ///
    /// `targets` is the candidate list resolved for this call. It is only consulted
    /// by batches holding messages that need offload.
    pub async fn dispatch(
        &self,
        destination: &Destination,
        batches: Vec<Batch<SizedMessage>>,
        targets: Option<Arc<[StorageTarget]>>,
    ) -> Vec<BatchResult> {
        if batches.is_empty() {
            return Vec::new();
        }

        debug!(
            "DISPATCH | Dispatching {} batches to {} with at most {} in flight",
            batches.len(),
            destination,
            self.max_concurrency
        );

        let pipeline = Arc::new(Pipeline {
            transport: Arc::clone(&self.transport),
            resolver: self.resolver.clone(),
            partitioner: self.partitioner,
            max_message_size_bytes: self.max_message_size_bytes,
            destination: destination.clone(),
            targets,
        });

        let mut handles = Vec::with_capacity(batches.len());
        for batch in batches {
            let sequence_ids: Vec<usize> = batch
                .items()
                .iter()
                .map(|sized| sized.message.sequence_id)
                .collect();
            let semaphore = Arc::clone(&self.semaphore);
            let pipeline = Arc::clone(&pipeline);
            let handle = tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return fail_all(
                        batch.items().iter().map(|sized| sized.message.sequence_id),
                        OutcomeCode::TransportCallError,
                        "dispatcher was shut down before the batch was admitted",
                    );
                };
                pipeline.run(batch).await
            });
            handles.push((sequence_ids, handle));
        }

        let (ids, handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        join_all(handles)
            .await
            .into_iter()
            .zip(ids)
            .map(|(joined, sequence_ids)| match joined {
                Ok(result) => result,
                Err(e) => {
                    error!("DISPATCH | Failed to join batch pipeline: {}", e);
                    fail_all(
                        sequence_ids,
                        OutcomeCode::TransportCallError,
                        &format!("batch pipeline aborted: {e}"),
                    )
                }
            })
            .collect()
    }
}

/// State shared read-only by every pipeline of one dispatch call.
struct Pipeline {
    transport: Arc<dyn QueueTransport>,
    resolver: ContentStoreResolver,
    partitioner: Partitioner,
    max_message_size_bytes: usize,
    destination: Destination,
    targets: Option<Arc<[StorageTarget]>>,
}

/// A final transport entry tagged with the message it came from.
struct OutgoingEntry {
    sequence_id: usize,
    entry: BatchEntry,
    size_bytes: usize,
}

impl Weighed for OutgoingEntry {
    fn size_bytes(&self) -> usize {
        self.size_bytes
    }
}

impl Pipeline {
    async fn run(&self, batch: Batch<SizedMessage>) -> BatchResult {
        let mut result = BatchResult::default();

        // join_all keeps input order; direct messages resolve immediately
        let uploads = batch
            .into_items()
            .into_iter()
            .map(|sized| self.offload(sized.message));
        let mut outgoing = Vec::new();
        for resolved in join_all(uploads).await {
            match resolved {
                Ok(msg) => {
                    let entry = BatchEntry::from_message(&msg);
                    let size_bytes = entry.size_bytes();
                    if size_bytes > self.max_message_size_bytes {
                        result.push(self.too_large(msg.sequence_id, size_bytes));
                        continue;
                    }
                    outgoing.push(OutgoingEntry {
                        sequence_id: msg.sequence_id,
                        entry,
                        size_bytes,
                    });
                }
                Err(outcome) => result.push(outcome),
            }
        }

        if outgoing.is_empty() {
            debug!("DISPATCH | Nothing left to send for batch, skipping transport call");
            return result;
        }

        // pointer bodies can end up larger than their reserved estimate
        let groups = self.partitioner.partition(outgoing);
        if groups.len() > 1 {
            debug!(
                "DISPATCH | Final entries re-partitioned into {} transport calls",
                groups.len()
            );
        }
        for group in groups {
            self.send(group, &mut result).await;
        }

        result
    }

    async fn offload(
        &self,
        mut msg: FormattedMessage,
    ) -> Result<FormattedMessage, DispatchOutcome> {
        if !msg.limit_exceeded {
            return Ok(msg);
        }

        // fixed properties alone can keep the pointer over the limit
        let planned_size = msg.size_bytes();
        if planned_size > self.max_message_size_bytes {
            return Err(self.too_large(msg.sequence_id, planned_size));
        }

        let Some(targets) = self.targets.as_deref() else {
            return Err(DispatchOutcome::failure(
                msg.sequence_id,
                OutcomeCode::OffloadError,
                "no storage targets were resolved for this call",
            ));
        };
        let (Some(path), Some(payload)) = (
            msg.extra.offload_path.as_deref(),
            msg.extra.payload.as_deref(),
        ) else {
            return Err(DispatchOutcome::failure(
                msg.sequence_id,
                OutcomeCode::OffloadError,
                "message has no offload path",
            ));
        };

        match self.resolver.upload(targets, path, payload).await {
            Ok(target) => {
                offload::finalize(&mut msg, &target);
                msg.extra.payload = None;
                Ok(msg)
            }
            Err(failure) => Err(DispatchOutcome::failure(
                msg.sequence_id,
                OutcomeCode::OffloadError,
                failure.to_string(),
            )),
        }
    }

    fn too_large(&self, sequence_id: usize, size_bytes: usize) -> DispatchOutcome {
        warn!(
            "DISPATCH | Message {} is {} bytes after offload, over the {} byte limit",
            sequence_id, size_bytes, self.max_message_size_bytes
        );
        DispatchOutcome::failure(
            sequence_id,
            OutcomeCode::PayloadTooLarge,
            format!(
                "message is {size_bytes} bytes after offload, limit is {}",
                self.max_message_size_bytes
            ),
        )
    }

    async fn send(&self, group: Batch<OutgoingEntry>, result: &mut BatchResult) {
        let (sequence_ids, entries): (Vec<usize>, Vec<BatchEntry>) = group
            .into_items()
            .into_iter()
            .map(|outgoing| (outgoing.sequence_id, outgoing.entry))
            .unzip();

        match self.transport.send_batch(&self.destination, &entries).await {
            Ok(response) => {
                let pending = entries
                    .iter()
                    .map(|entry| entry.id.clone())
                    .zip(sequence_ids)
                    .collect();
                reconcile(pending, response, result);
            }
            Err(e) => {
                error!(
                    "DISPATCH | Failed to send batch of {} entries to {}: {}",
                    entries.len(),
                    self.destination,
                    e
                );
                let message = e.to_string();
                for outcome in fail_all(sequence_ids, OutcomeCode::TransportCallError, &message)
                    .failed
                {
                    result.push(outcome);
                }
            }
        }
    }
}

/// Maps a batch response back onto the entries that were sent. Entries the transport
/// did not mention are failed rather than dropped.
fn reconcile(
    mut pending: BTreeMap<String, usize>,
    response: BatchSendResponse,
    result: &mut BatchResult,
) {
    let sent = pending.len();
    let mut rejected = 0;

    for ok in response.successful {
        match pending.remove(&ok.id) {
            Some(sequence_id) => result.push(DispatchOutcome::success(
                sequence_id,
                ok.message_id,
                ok.sequence_number,
            )),
            None => warn!("DISPATCH | Ignoring result for unknown entry id {}", ok.id),
        }
    }

    for failed in response.failed {
        let Some(sequence_id) = pending.remove(&failed.id) else {
            warn!("DISPATCH | Ignoring failure for unknown entry id {}", failed.id);
            continue;
        };
        rejected += 1;
        warn!(
            "DISPATCH | Entry {} rejected with {}: {}",
            failed.id,
            failed.code,
            failed.message.as_deref().unwrap_or("")
        );
        result.push(DispatchOutcome::failure(
            sequence_id,
            OutcomeCode::TransportRejection(failed.code),
            failed.message.unwrap_or_default(),
        ));
    }

    for (id, sequence_id) in pending {
        warn!("DISPATCH | No result returned for entry {}", id);
        result.push(DispatchOutcome::failure(
            sequence_id,
            OutcomeCode::TransportCallError,
            "no result returned for entry",
        ));
    }

    debug!(
        "DISPATCH | Sent batch of {} entries, {} rejected",
        sent, rejected
    );
}

fn fail_all<I>(sequence_ids: I, code: OutcomeCode, message: &str) -> BatchResult
where
    I: IntoIterator<Item = usize>,
{
    let mut result = BatchResult::default();
    for sequence_id in sequence_ids {
        result.push(DispatchOutcome::failure(sequence_id, code.clone(), message));
    }
    result
}
