// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Size evaluation and offload planning.
//!
//! A message whose serialized size exceeds the per-message limit keeps only a pointer
//! body inline:
//!
//! ```json
//! {"offloadLocation":{"key":"eventContent/...json","bucket":"b","region":"r"},"id":42}
//! ```
//!
//! The bucket and region are only known once an upload succeeds, so the planning
//! estimate is taken from a pointer body without them plus a fixed reserve.

use crate::batch::Weighed;
use crate::constants;
use crate::message::FormattedMessage;
use crate::targets::StorageTarget;
use serde_json::{Map, Value};

/// Where an offloaded payload lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffloadLocation {
    pub key: String,
    pub bucket: Option<String>,
    pub region: Option<String>,
}

impl OffloadLocation {
    fn planned(key: &str) -> Self {
        Self {
            key: key.to_string(),
            bucket: None,
            region: None,
        }
    }

    fn resolved(key: &str, target: &StorageTarget) -> Self {
        Self {
            key: key.to_string(),
            bucket: Some(target.name.clone()),
            region: Some(target.region.clone()),
        }
    }
}

/// A formatted message paired with its size estimate.
#[derive(Debug, Clone, PartialEq)]
pub struct SizedMessage {
    pub message: FormattedMessage,
    pub size_bytes: usize,
}

impl Weighed for SizedMessage {
    fn size_bytes(&self) -> usize {
        self.size_bytes
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SizeEvaluator {
    max_message_size_bytes: usize,
    reserve_bytes: usize,
}

impl Default for SizeEvaluator {
    fn default() -> Self {
        Self {
            max_message_size_bytes: constants::MAX_MESSAGE_SIZE_BYTES,
            reserve_bytes: constants::OFFLOAD_RESERVE_BYTES,
        }
    }
}

impl SizeEvaluator {
    pub fn new(max_message_size_bytes: usize, reserve_bytes: usize) -> Self {
        Self {
            max_message_size_bytes,
            reserve_bytes,
        }
    }

    /// Measures `msg` and, when it is over the per-message limit, swaps its body for
    /// a pointer body and marks it for offload. The returned size is the one the
    /// partitioner must budget for.
    pub fn evaluate(&self, mut msg: FormattedMessage) -> SizedMessage {
        let size_bytes = msg.size_bytes();
        if size_bytes <= self.max_message_size_bytes {
            return SizedMessage { message: msg, size_bytes };
        }

        let key = msg.extra.offload_path.clone().unwrap_or_default();
        let pointer = pointer_body(
            &OffloadLocation::planned(&key),
            &msg.content,
            &msg.extra.fixed_properties,
        );
        msg.extra.payload = Some(std::mem::replace(&mut msg.body, pointer));
        msg.limit_exceeded = true;

        let size_bytes = msg.size_bytes() + self.reserve_bytes;
        SizedMessage { message: msg, size_bytes }
    }
}

/// Replaces the planned pointer body with one naming the target the payload was
/// actually uploaded to.
pub fn finalize(msg: &mut FormattedMessage, target: &StorageTarget) {
    let key = msg.extra.offload_path.clone().unwrap_or_default();
    msg.body = pointer_body(
        &OffloadLocation::resolved(&key, target),
        &msg.content,
        &msg.extra.fixed_properties,
    );
}

/// `{ offloadLocation, ...pick(content, fixed_properties) }`
///
/// Only object content contributes fixed properties; keys that are missing or not
/// truthy are skipped.
pub fn pointer_body(
    location: &OffloadLocation,
    content: &Value,
    fixed_properties: &[String],
) -> String {
    let mut body = Map::new();
    body.insert(
        constants::OFFLOAD_LOCATION_KEY.to_string(),
        Value::Object(location_fields(location)),
    );

    if let Value::Object(fields) = content {
        for key in fixed_properties {
            if key == constants::OFFLOAD_LOCATION_KEY {
                continue;
            }
            if let Some(value) = fields.get(key).filter(|v| is_truthy(v)) {
                body.insert(key.clone(), value.clone());
            }
        }
    }

    Value::Object(body).to_string()
}

fn location_fields(location: &OffloadLocation) -> Map<String, Value> {
    let mut fields = Map::new();
    fields.insert("key".to_string(), Value::from(location.key.clone()));
    if let Some(bucket) = &location.bucket {
        fields.insert("bucket".to_string(), Value::from(bucket.clone()));
    }
    if let Some(region) = &location.region {
        fields.insert("region".to_string(), Value::from(region.clone()));
    }
    fields
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
