// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Formatting of events into transport-ready messages.
//!
//! Every message carries a speculative offload path computed up front, whether or
//! not its content ends up offloaded, so the size estimate taken while partitioning
//! matches the pointer body that is eventually transmitted.

use crate::config::TenantFallback;
use crate::constants;
use crate::errors::DispatchError;
use crate::event::{AttributeValue, Event, PublishContext};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

pub type ClockFn = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;
pub type IdSourceFn = Arc<dyn Fn() -> String + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeDataType {
    String,
    #[serde(rename = "String.Array")]
    StringArray,
}

impl AttributeDataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "String",
            Self::StringArray => "String.Array",
        }
    }
}

/// Serialized form of one message attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageAttribute {
    pub data_type: AttributeDataType,
    pub string_value: String,
}

impl MessageAttribute {
    pub fn string(value: &str) -> Self {
        Self {
            data_type: AttributeDataType::String,
            string_value: value.to_string(),
        }
    }

    fn from_value(value: &AttributeValue) -> Self {
        match value {
            AttributeValue::String(s) => Self::string(s),
            AttributeValue::StringArray(items) => Self {
                data_type: AttributeDataType::StringArray,
                // Vec<String> always serializes
                string_value: Value::from(items.clone()).to_string(),
            },
        }
    }
}

/// Side channel consulted when the message has to be offloaded.
#[derive(Debug, Clone, PartialEq)]
pub struct OffloadExtra {
    pub fixed_properties: Vec<String>,
    /// `None` only when no tenant is known and the tenant policy is
    /// [`TenantFallback::Require`].
    pub offload_path: Option<String>,
    /// Original body, moved here when the message is replaced by a pointer body.
    pub payload: Option<String>,
}

/// An event formatted for the transport. Owned by the pipeline, never returned to callers.
#[derive(Debug, Clone, PartialEq)]
pub struct FormattedMessage {
    /// 1-based position of the event in the publish call.
    pub sequence_id: usize,
    pub body: String,
    pub attributes: BTreeMap<String, MessageAttribute>,
    pub subject: Option<String>,
    pub group_key: Option<String>,
    pub deduplication_key: Option<String>,
    pub structure_hint: Option<String>,
    pub extra: OffloadExtra,
    pub limit_exceeded: bool,
    pub(crate) content: Value,
}

impl FormattedMessage {
    /// Serialized size as counted by the transport.
    pub fn size_bytes(&self) -> usize {
        payload_size(&self.body, self.subject.as_deref(), &self.attributes)
    }

    pub fn content(&self) -> &Value {
        &self.content
    }
}

/// Body bytes plus subject plus, for every attribute, its name, data type and value.
pub(crate) fn payload_size(
    body: &str,
    subject: Option<&str>,
    attributes: &BTreeMap<String, MessageAttribute>,
) -> usize {
    let attributes_size: usize = attributes
        .iter()
        .map(|(name, attribute)| {
            name.len() + attribute.data_type.as_str().len() + attribute.string_value.len()
        })
        .sum();
    body.len() + subject.map_or(0, str::len) + attributes_size
}

#[derive(Clone)]
pub struct MessageFormatter {
    service_name: String,
    tenant_fallback: TenantFallback,
    clock: ClockFn,
    id_source: IdSourceFn,
}

impl MessageFormatter {
    pub fn new(service_name: &str, tenant_fallback: TenantFallback) -> Self {
        Self {
            service_name: service_name.to_string(),
            tenant_fallback,
            clock: Arc::new(Utc::now),
            id_source: Arc::new(|| uuid::Uuid::new_v4().simple().to_string()),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: ClockFn) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_id_source(mut self, id_source: IdSourceFn) -> Self {
        self.id_source = id_source;
        self
    }

    pub fn format(
        &self,
        event: &Event,
        queue_name: &str,
        sequence_id: usize,
        context: &PublishContext,
    ) -> Result<FormattedMessage, DispatchError> {
        let content = event.content.clone().ok_or_else(|| {
            DispatchError::InvalidInput(format!("event {sequence_id} has no content"))
        })?;

        let body = match &content {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        let mut attributes = BTreeMap::new();
        for (name, value) in &event.attributes {
            attributes.insert(name.clone(), MessageAttribute::from_value(value));
        }
        attributes.insert(
            constants::QUEUE_NAME_ATTRIBUTE.to_string(),
            MessageAttribute::string(queue_name),
        );
        if let Some(tenant) = &context.tenant {
            attributes.insert(
                constants::TENANT_ATTRIBUTE.to_string(),
                MessageAttribute::string(tenant),
            );
        }

        let path_tenant = match (&context.tenant, &self.tenant_fallback) {
            (Some(tenant), _) => Some(tenant.as_str()),
            (None, TenantFallback::Placeholder(placeholder)) => Some(placeholder.as_str()),
            (None, TenantFallback::Require) => None,
        };
        let offload_path =
            path_tenant.map(|tenant| self.offload_path(tenant, queue_name, sequence_id));

        Ok(FormattedMessage {
            sequence_id,
            body,
            attributes,
            subject: event.subject.clone(),
            group_key: event.group_key.clone(),
            deduplication_key: event.deduplication_key.clone(),
            structure_hint: event.structure_hint.clone(),
            extra: OffloadExtra {
                fixed_properties: event.fixed_properties.clone(),
                offload_path,
                payload: None,
            },
            limit_exceeded: false,
            content,
        })
    }

    /// `eventContent/{tenant}/{service}/{queue}/{yyyy}/{mm}/{dd}/{sequence}-{random}.json`
    pub fn offload_path(&self, tenant: &str, queue_name: &str, sequence_id: usize) -> String {
        let now = (self.clock)();
        format!(
            "{}/{}/{}/{}/{}/{}-{}.json",
            constants::OFFLOAD_NAMESPACE,
            tenant,
            self.service_name,
            queue_name,
            now.format("%Y/%m/%d"),
            sequence_id,
            (self.id_source)()
        )
    }
}

impl Debug for MessageFormatter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageFormatter")
            .field("service_name", &self.service_name)
            .field("tenant_fallback", &self.tenant_fallback)
            .finish_non_exhaustive()
    }
}
