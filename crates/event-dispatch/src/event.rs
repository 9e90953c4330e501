// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Caller-facing event model.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Filter metadata attached to an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    StringArray(Vec<String>),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(value: Vec<String>) -> Self {
        Self::StringArray(value)
    }
}

impl From<Vec<&str>> for AttributeValue {
    fn from(value: Vec<&str>) -> Self {
        Self::StringArray(value.into_iter().map(str::to_string).collect())
    }
}

/// A logical unit of application data to be published.
///
/// `group_key`, `deduplication_key` and `structure_hint` are passed through to the
/// transport untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub content: Option<Value>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
    #[serde(default)]
    pub subject: Option<String>,
    /// Content keys kept inline when the content is offloaded.
    #[serde(default)]
    pub fixed_properties: Vec<String>,
    #[serde(default)]
    pub group_key: Option<String>,
    #[serde(default)]
    pub deduplication_key: Option<String>,
    #[serde(default)]
    pub structure_hint: Option<String>,
}

impl Event {
    pub fn new(content: Value) -> Self {
        Self {
            content: Some(content),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, name: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    #[must_use]
    pub fn with_subject(mut self, subject: &str) -> Self {
        self.subject = Some(subject.to_string());
        self
    }

    #[must_use]
    pub fn with_fixed_properties<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fixed_properties = keys.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_group_key(mut self, group_key: &str) -> Self {
        self.group_key = Some(group_key.to_string());
        self
    }

    #[must_use]
    pub fn with_deduplication_key(mut self, deduplication_key: &str) -> Self {
        self.deduplication_key = Some(deduplication_key.to_string());
        self
    }

    #[must_use]
    pub fn with_structure_hint(mut self, structure_hint: &str) -> Self {
        self.structure_hint = Some(structure_hint.to_string());
        self
    }
}

/// Per-call context supplied by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishContext {
    /// Tenant or client identifier, injected as an attribute and used in offload paths.
    pub tenant: Option<String>,
}

impl PublishContext {
    pub fn for_tenant(tenant: &str) -> Self {
        Self {
            tenant: Some(tenant.to_string()),
        }
    }
}
