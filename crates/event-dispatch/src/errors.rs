// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types.
//!
//! [`DispatchError`] is reserved for failures that abort a whole publish call. Failures
//! that only affect individual messages are reported as values in the
//! [`DispatchSummary`](crate::aggregator::DispatchSummary) instead.

/// Call-level failure: nothing was sent.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Invalid destination: {0}")]
    InvalidDestination(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to resolve storage targets: {0}")]
    TargetResolution(String),

    /// Only raised by `publish_one`; `publish_many` reports offload failures per message.
    #[error("Failed to offload message content: {0}")]
    Offload(String),

    /// Only raised by `publish_one`.
    #[error("Message of {size} bytes exceeds the {limit} byte limit after offload")]
    PayloadTooLarge { size: usize, limit: usize },

    /// Only raised by `publish_one`.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Failure of a single queue transport call.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

/// Failure of a single content store upload.
#[derive(Debug, thiserror::Error)]
pub enum ContentStoreError {
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("{0}")]
    Rejected(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}
