// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Parsing and validation of queue destination identifiers.
//!
//! Two address forms are accepted:
//! - Queue URL: `https://sqs.us-east-1.amazonaws.com/123456789012/orders`
//!   (any `http`/`https` host, so local emulators work too)
//! - Queue ARN: `arn:aws:sqs:us-east-1:123456789012:orders`
//!
//! Validation happens before any network call; an identifier that fails it never
//! reaches the transport.

use crate::errors::DispatchError;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// `scheme://host[:port]/<12-digit account>/<queue name>`
    static ref QUEUE_URL_REGEX: Regex = Regex::new(
        r"^https?://[A-Za-z0-9.-]+(?::[0-9]{1,5})?/[0-9]{12}/([A-Za-z0-9_-]{1,80}(?:\.fifo)?)$"
    )
    .expect("failed creating regex");

    /// `arn:<partition>:sqs:<region>:<12-digit account>:<queue name>`
    static ref QUEUE_ARN_REGEX: Regex = Regex::new(
        r"^arn:([a-z-]+):sqs:([a-z0-9-]+):([0-9]{12}):([A-Za-z0-9_-]{1,80}(?:\.fifo)?)$"
    )
    .expect("failed creating regex");
}

const FIFO_SUFFIX: &str = ".fifo";

/// A validated queue address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    address: String,
    queue_url: String,
    queue_name: String,
}

impl Destination {
    /// Validates `identifier` against the transport's addressing format and extracts
    /// the queue name. ARNs are resolved to the queue URL the transport expects.
    pub fn parse(identifier: &str) -> Result<Self, DispatchError> {
        let address = identifier.trim();
        let invalid = || DispatchError::InvalidDestination(identifier.to_string());

        if let Some(captures) = QUEUE_URL_REGEX.captures(address) {
            let queue_name = captures.get(1).ok_or_else(invalid)?.as_str().to_string();
            return Ok(Self {
                address: address.to_string(),
                queue_url: address.to_string(),
                queue_name,
            });
        }

        let captures = QUEUE_ARN_REGEX.captures(address).ok_or_else(invalid)?;
        let part = |i: usize| captures.get(i).map(|m| m.as_str()).ok_or_else(invalid);
        let (partition, region, account, queue_name) = (part(1)?, part(2)?, part(3)?, part(4)?);

        Ok(Self {
            address: address.to_string(),
            queue_url: format!(
                "https://sqs.{region}.{}/{account}/{queue_name}",
                partition_domain(partition)
            ),
            queue_name: queue_name.to_string(),
        })
    }

    /// The address as given by the caller (trimmed).
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Queue URL sent to the transport.
    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// FIFO queues require a grouping key on every message.
    pub fn is_fifo(&self) -> bool {
        self.queue_name.ends_with(FIFO_SUFFIX)
    }
}

fn partition_domain(partition: &str) -> &'static str {
    match partition {
        "aws-cn" => "amazonaws.com.cn",
        _ => "amazonaws.com",
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.address)
    }
}
