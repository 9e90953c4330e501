// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-memory queue transport and content store recording every call

use event_dispatch::content_store::ContentStore;
use event_dispatch::errors::{ContentStoreError, TransportError};
use event_dispatch::transport::{
    BatchEntry, BatchErrorEntry, BatchResultEntry, BatchSendResponse, QueueTransport,
};
use event_dispatch::{Destination, SendReceipt, StorageTarget};
use std::collections::HashSet;
use std::sync::Mutex;

/// Accepts every entry except the ids it was told to reject
#[derive(Default)]
pub struct MockTransport {
    reject_ids: HashSet<String>,
    fail_calls: bool,
    batch_calls: Mutex<Vec<Vec<BatchEntry>>>,
    single_calls: Mutex<Vec<BatchEntry>>,
}

#[allow(dead_code)]
impl MockTransport {
    pub fn rejecting(ids: &[usize]) -> Self {
        Self {
            reject_ids: ids.iter().map(ToString::to_string).collect(),
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_calls: true,
            ..Default::default()
        }
    }

    pub fn batch_calls(&self) -> Vec<Vec<BatchEntry>> {
        self.batch_calls.lock().unwrap().clone()
    }

    pub fn single_calls(&self) -> Vec<BatchEntry> {
        self.single_calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.batch_calls.lock().unwrap().len() + self.single_calls.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl QueueTransport for MockTransport {
    async fn send_one(
        &self,
        _destination: &Destination,
        entry: &BatchEntry,
    ) -> Result<SendReceipt, TransportError> {
        self.single_calls.lock().unwrap().push(entry.clone());
        if self.fail_calls {
            return Err(TransportError::Status {
                status: 500,
                body: "internal error".to_string(),
            });
        }
        Ok(SendReceipt {
            message_id: format!("msg-{}", entry.id),
            sequence_number: None,
        })
    }

    async fn send_batch(
        &self,
        _destination: &Destination,
        entries: &[BatchEntry],
    ) -> Result<BatchSendResponse, TransportError> {
        self.batch_calls.lock().unwrap().push(entries.to_vec());
        if self.fail_calls {
            return Err(TransportError::Status {
                status: 500,
                body: "internal error".to_string(),
            });
        }

        let mut response = BatchSendResponse::default();
        for entry in entries {
            if self.reject_ids.contains(&entry.id) {
                response.failed.push(BatchErrorEntry {
                    id: entry.id.clone(),
                    code: "InvalidMessageContents".to_string(),
                    message: Some("rejected by mock".to_string()),
                    sender_fault: true,
                });
            } else {
                response.successful.push(BatchResultEntry {
                    id: entry.id.clone(),
                    message_id: format!("msg-{}", entry.id),
                    sequence_number: None,
                });
            }
        }
        // failures first and reversed, the way a real gateway may report them
        response.failed.reverse();
        Ok(response)
    }
}

/// One recorded upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Put {
    pub target: String,
    pub path: String,
    pub body: String,
}

/// Accepts uploads except to the targets it was told to reject
#[derive(Default)]
pub struct MockContentStore {
    failing_targets: HashSet<String>,
    puts: Mutex<Vec<Put>>,
}

#[allow(dead_code)]
impl MockContentStore {
    pub fn failing_for(targets: &[&str]) -> Self {
        Self {
            failing_targets: targets.iter().map(ToString::to_string).collect(),
            ..Default::default()
        }
    }

    pub fn puts(&self) -> Vec<Put> {
        self.puts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ContentStore for MockContentStore {
    async fn put(
        &self,
        target: &StorageTarget,
        path: &str,
        body: &str,
    ) -> Result<(), ContentStoreError> {
        self.puts.lock().unwrap().push(Put {
            target: target.name.clone(),
            path: path.to_string(),
            body: body.to_string(),
        });
        if self.failing_targets.contains(&target.name) {
            return Err(ContentStoreError::Status {
                status: 403,
                body: "access denied".to_string(),
            });
        }
        Ok(())
    }
}
