// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Queue transport boundary.
//!
//! The engine only needs two primitives, enqueue-one and enqueue-batch, described by
//! [`QueueTransport`]. [`HttpQueueTransport`] speaks the SQS JSON protocol shapes
//! (`AmazonSQS.SendMessage` / `AmazonSQS.SendMessageBatch`) against any compatible
//! gateway; request signing is left to that gateway.

use crate::destination::Destination;
use crate::errors::TransportError;
use crate::message::{payload_size, FormattedMessage, MessageAttribute};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

const AMZ_JSON_CONTENT_TYPE: &str = "application/x-amz-json-1.0";
const SEND_MESSAGE_TARGET: &str = "AmazonSQS.SendMessage";
const SEND_MESSAGE_BATCH_TARGET: &str = "AmazonSQS.SendMessageBatch";

/// One entry of a batch call, identified by the message's sequence id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct BatchEntry {
    pub id: String,
    pub message_body: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub message_attributes: BTreeMap<String, MessageAttribute>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_deduplication_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_structure: Option<String>,
}

impl BatchEntry {
    pub fn from_message(msg: &FormattedMessage) -> Self {
        Self {
            id: msg.sequence_id.to_string(),
            message_body: msg.body.clone(),
            message_attributes: msg.attributes.clone(),
            subject: msg.subject.clone(),
            message_group_id: msg.group_key.clone(),
            message_deduplication_id: msg.deduplication_key.clone(),
            message_structure: msg.structure_hint.clone(),
        }
    }

    /// Serialized size as counted by the transport.
    pub fn size_bytes(&self) -> usize {
        payload_size(
            &self.message_body,
            self.subject.as_deref(),
            &self.message_attributes,
        )
    }
}

/// Acknowledgement of a single enqueue.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SendReceipt {
    pub message_id: String,
    #[serde(default)]
    pub sequence_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BatchResultEntry {
    pub id: String,
    pub message_id: String,
    #[serde(default)]
    pub sequence_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BatchErrorEntry {
    pub id: String,
    pub code: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub sender_fault: bool,
}

/// Per-entry result of a batch call that reached the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BatchSendResponse {
    #[serde(default)]
    pub successful: Vec<BatchResultEntry>,
    #[serde(default)]
    pub failed: Vec<BatchErrorEntry>,
}

#[async_trait]
pub trait QueueTransport: Send + Sync {
    async fn send_one(
        &self,
        destination: &Destination,
        entry: &BatchEntry,
    ) -> Result<SendReceipt, TransportError>;

    /// `entries` never holds more than the transport's batch limits allow.
    async fn send_batch(
        &self,
        destination: &Destination,
        entries: &[BatchEntry],
    ) -> Result<BatchSendResponse, TransportError>;
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendMessageRequest<'a> {
    queue_url: &'a str,
    #[serde(flatten)]
    entry: SingleEntry<'a>,
}

/// A batch entry without its `Id`, as `SendMessage` expects.
#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SingleEntry<'a> {
    message_body: &'a str,
    #[serde(skip_serializing_if = "no_attributes")]
    message_attributes: &'a BTreeMap<String, MessageAttribute>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subject: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_group_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_deduplication_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_structure: Option<&'a str>,
}

fn no_attributes(attributes: &&BTreeMap<String, MessageAttribute>) -> bool {
    attributes.is_empty()
}

impl<'a> From<&'a BatchEntry> for SingleEntry<'a> {
    fn from(entry: &'a BatchEntry) -> Self {
        Self {
            message_body: &entry.message_body,
            message_attributes: &entry.message_attributes,
            subject: entry.subject.as_deref(),
            message_group_id: entry.message_group_id.as_deref(),
            message_deduplication_id: entry.message_deduplication_id.as_deref(),
            message_structure: entry.message_structure.as_deref(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct SendMessageBatchRequest<'a> {
    queue_url: &'a str,
    entries: &'a [BatchEntry],
}

#[derive(Debug, Clone)]
pub struct HttpQueueTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpQueueTransport {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, endpoint))
    }

    pub fn with_client(client: reqwest::Client, endpoint: &str) -> Self {
        Self {
            client,
            endpoint: endpoint.to_string(),
        }
    }

    fn headers(target: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(AMZ_JSON_CONTENT_TYPE));
        headers.insert("X-Amz-Target", HeaderValue::from_static(target));
        headers
    }

    async fn post<B, R>(&self, target: &'static str, body: &B) -> Result<R, TransportError>
    where
        B: Serialize + Sync,
        R: for<'de> Deserialize<'de>,
    {
        let resp = self
            .client
            .post(&self.endpoint)
            .headers(Self::headers(target))
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| TransportError::Decode(e.to_string()))
    }
}

#[async_trait]
impl QueueTransport for HttpQueueTransport {
    async fn send_one(
        &self,
        destination: &Destination,
        entry: &BatchEntry,
    ) -> Result<SendReceipt, TransportError> {
        debug!("DISPATCH | Sending message {} to {}", entry.id, destination);
        let request = SendMessageRequest {
            queue_url: destination.queue_url(),
            entry: SingleEntry::from(entry),
        };
        self.post(SEND_MESSAGE_TARGET, &request).await
    }

    async fn send_batch(
        &self,
        destination: &Destination,
        entries: &[BatchEntry],
    ) -> Result<BatchSendResponse, TransportError> {
        debug!(
            "DISPATCH | Sending batch of {} entries to {}",
            entries.len(),
            destination
        );
        let request = SendMessageBatchRequest {
            queue_url: destination.queue_url(),
            entries,
        };
        self.post(SEND_MESSAGE_BATCH_TARGET, &request).await
    }
}
