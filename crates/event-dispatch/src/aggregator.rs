// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Merging of per-batch results into one caller-facing summary.
//!
//! Batch pipelines finish in any order, so every outcome is keyed by the message's
//! sequence id and the merged lists are sorted by it.

use derive_more::Display;
use serde::{Serialize, Serializer};

/// Why a single message was not delivered.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum OutcomeCode {
    /// Every storage target rejected the offloaded payload.
    #[display("S3_ERROR")]
    OffloadError,
    /// The transport rejected this entry inside an otherwise successful batch call.
    #[display("{_0}")]
    TransportRejection(String),
    /// The batch call carrying this entry failed as a whole.
    #[display("TRANSPORT_ERROR")]
    TransportCallError,
    /// Still over the per-message limit after offload substitution.
    #[display("PAYLOAD_TOO_LARGE")]
    PayloadTooLarge,
}

impl Serialize for OutcomeCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub sequence_id: usize,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<OutcomeCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl DispatchOutcome {
    pub fn success(
        sequence_id: usize,
        message_id: String,
        sequence_number: Option<String>,
    ) -> Self {
        Self {
            sequence_id,
            ok: true,
            message_id: Some(message_id),
            sequence_number,
            error_code: None,
            error_message: None,
        }
    }

    pub fn failure(sequence_id: usize, code: OutcomeCode, message: impl Into<String>) -> Self {
        Self {
            sequence_id,
            ok: false,
            message_id: None,
            sequence_number: None,
            error_code: Some(code),
            error_message: Some(message.into()),
        }
    }
}

/// Outcomes of one batch pipeline, including failures produced before the transport
/// was ever called.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub successful: Vec<DispatchOutcome>,
    pub failed: Vec<DispatchOutcome>,
}

impl BatchResult {
    pub fn push(&mut self, outcome: DispatchOutcome) {
        if outcome.ok {
            self.successful.push(outcome);
        } else {
            self.failed.push(outcome);
        }
    }

    pub fn len(&self) -> usize {
        self.successful.len() + self.failed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchSummary {
    pub success_count: usize,
    pub failed_count: usize,
    pub success: Vec<DispatchOutcome>,
    pub failed: Vec<DispatchOutcome>,
}

impl DispatchSummary {
    pub fn total(&self) -> usize {
        self.success_count + self.failed_count
    }
}

pub fn aggregate<I>(results: I) -> DispatchSummary
where
    I: IntoIterator<Item = BatchResult>,
{
    let mut success = Vec::new();
    let mut failed = Vec::new();

    for mut result in results {
        // transports may report failures out of order
        result.failed.sort_by_key(|o| o.sequence_id);
        success.append(&mut result.successful);
        failed.append(&mut result.failed);
    }

    success.sort_by_key(|o| o.sequence_id);
    failed.sort_by_key(|o| o.sequence_id);

    DispatchSummary {
        success_count: success.len(),
        failed_count: failed.len(),
        success,
        failed,
    }
}
