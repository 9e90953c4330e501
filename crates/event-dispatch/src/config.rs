// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::constants;
use crate::errors::ConfigError;
use std::env;

/// What to put in offload paths when the calling context has no tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TenantFallback {
    /// Offloading a message without a tenant fails the call with `InvalidInput`.
    Require,
    /// Use a literal placeholder segment instead.
    Placeholder(String),
}

impl TenantFallback {
    /// `"require"` (case-insensitive) selects [`TenantFallback::Require`]; any other
    /// non-empty value is used as the placeholder.
    pub fn parse(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.eq_ignore_ascii_case("require") {
            Some(Self::Require)
        } else {
            Some(Self::Placeholder(trimmed.to_string()))
        }
    }
}

impl Default for TenantFallback {
    fn default() -> Self {
        Self::Placeholder(constants::DEFAULT_TENANT_PLACEHOLDER.to_string())
    }
}

/// Configuration for the dispatch engine
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Service segment of offload paths
    pub service_name: String,
    /// Maximum number of batch pipelines running at once
    pub max_concurrency: usize,
    /// Per-message size limit enforced by the transport
    pub max_message_size_bytes: usize,
    /// Per-batch aggregate size limit enforced by the transport
    pub max_batch_size_bytes: usize,
    /// Per-batch entry limit enforced by the transport
    pub max_batch_entries: usize,
    /// Bytes reserved for the storage target descriptor in offload pointer bodies
    pub offload_reserve_bytes: usize,
    pub tenant_fallback: TenantFallback,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            service_name: constants::DEFAULT_SERVICE_NAME.to_string(),
            max_concurrency: constants::MAX_CONCURRENCY,
            max_message_size_bytes: constants::MAX_MESSAGE_SIZE_BYTES,
            max_batch_size_bytes: constants::MAX_BATCH_SIZE_BYTES,
            max_batch_entries: constants::MAX_BATCH_ENTRIES,
            offload_reserve_bytes: constants::OFFLOAD_RESERVE_BYTES,
            tenant_fallback: TenantFallback::default(),
            log_level: "info".to_string(),
        }
    }
}

impl DispatchConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup, falling back to defaults for
    /// missing or unparsable values.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parse_usize = |key: &str, default: usize| {
            lookup(key)
                .and_then(|val| val.trim().parse::<usize>().ok())
                .unwrap_or(default)
        };

        let config = Self {
            service_name: lookup("EVENT_DISPATCH_SERVICE_NAME")
                .map(|val| val.trim().to_string())
                .filter(|val| !val.is_empty())
                .unwrap_or(defaults.service_name),
            max_concurrency: parse_usize(
                "EVENT_DISPATCH_MAX_CONCURRENCY",
                defaults.max_concurrency,
            ),
            max_message_size_bytes: parse_usize(
                "EVENT_DISPATCH_MAX_MESSAGE_BYTES",
                defaults.max_message_size_bytes,
            ),
            max_batch_size_bytes: parse_usize(
                "EVENT_DISPATCH_MAX_BATCH_BYTES",
                defaults.max_batch_size_bytes,
            ),
            max_batch_entries: parse_usize(
                "EVENT_DISPATCH_MAX_BATCH_ENTRIES",
                defaults.max_batch_entries,
            ),
            offload_reserve_bytes: parse_usize(
                "EVENT_DISPATCH_OFFLOAD_RESERVE_BYTES",
                defaults.offload_reserve_bytes,
            ),
            tenant_fallback: lookup("EVENT_DISPATCH_TENANT_FALLBACK")
                .and_then(|val| TenantFallback::parse(&val))
                .unwrap_or(defaults.tenant_fallback),
            log_level: lookup("EVENT_DISPATCH_LOG_LEVEL")
                .map(|val| val.to_lowercase())
                .unwrap_or(defaults.log_level),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid(
                "max concurrency must be greater than 0".to_string(),
            ));
        }

        if self.max_batch_entries == 0 || self.max_batch_entries > constants::MAX_BATCH_ENTRIES {
            return Err(ConfigError::Invalid(format!(
                "max batch entries must be between 1 and {}",
                constants::MAX_BATCH_ENTRIES
            )));
        }

        if self.max_message_size_bytes == 0 || self.max_batch_size_bytes == 0 {
            return Err(ConfigError::Invalid(
                "size limits must be greater than 0".to_string(),
            ));
        }

        if self.max_message_size_bytes > self.max_batch_size_bytes {
            return Err(ConfigError::Invalid(format!(
                "max message size ({}) cannot exceed max batch size ({})",
                self.max_message_size_bytes, self.max_batch_size_bytes
            )));
        }

        if self.offload_reserve_bytes >= self.max_message_size_bytes {
            return Err(ConfigError::Invalid(
                "offload reserve must be smaller than the max message size".to_string(),
            ));
        }

        if self.service_name.contains('/') {
            return Err(ConfigError::Invalid(format!(
                "service name '{}' cannot contain '/'",
                self.service_name
            )));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.log_level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.log_level
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = DispatchConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_concurrency, 25);
        assert_eq!(config.max_message_size_bytes, 262_144);
        assert_eq!(config.max_batch_entries, 10);
        assert_eq!(config.offload_reserve_bytes, 90);
    }

    #[test]
    fn test_from_lookup_reads_values() {
        let config = DispatchConfig::from_lookup(lookup_from(&[
            ("EVENT_DISPATCH_SERVICE_NAME", "billing"),
            ("EVENT_DISPATCH_MAX_CONCURRENCY", "4"),
            ("EVENT_DISPATCH_MAX_BATCH_ENTRIES", "5"),
            ("EVENT_DISPATCH_TENANT_FALLBACK", "REQUIRE"),
            ("EVENT_DISPATCH_LOG_LEVEL", "DEBUG"),
        ]))
        .unwrap();

        assert_eq!(config.service_name, "billing");
        assert_eq!(config.max_concurrency, 4);
        assert_eq!(config.max_batch_entries, 5);
        assert_eq!(config.tenant_fallback, TenantFallback::Require);
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_from_lookup_ignores_unparsable_numbers() {
        let config = DispatchConfig::from_lookup(lookup_from(&[(
            "EVENT_DISPATCH_MAX_CONCURRENCY",
            "lots",
        )]))
        .unwrap();
        assert_eq!(config.max_concurrency, 25);
    }

    #[test]
    fn test_from_lookup_placeholder_tenant() {
        let config = DispatchConfig::from_lookup(lookup_from(&[(
            "EVENT_DISPATCH_TENANT_FALLBACK",
            " shared ",
        )]))
        .unwrap();
        assert_eq!(
            config.tenant_fallback,
            TenantFallback::Placeholder("shared".to_string())
        );
    }

    #[test]
    fn test_validate_batch_entries_above_transport_limit() {
        let config = DispatchConfig {
            max_batch_entries: 11,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = DispatchConfig {
            max_batch_entries: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_concurrency() {
        let config = DispatchConfig {
            max_concurrency: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_message_larger_than_batch() {
        let config = DispatchConfig {
            max_message_size_bytes: 1_000,
            max_batch_size_bytes: 500,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_reserve_too_large() {
        let config = DispatchConfig {
            max_message_size_bytes: 90,
            offload_reserve_bytes: 90,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let config = DispatchConfig {
            log_level: "verbose".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_service_name_with_slash() {
        let config = DispatchConfig {
            service_name: "a/b".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tenant_fallback_parse() {
        assert_eq!(TenantFallback::parse("require"), Some(TenantFallback::Require));
        assert_eq!(TenantFallback::parse(""), None);
        assert_eq!(
            TenantFallback::parse("anonymous"),
            Some(TenantFallback::Placeholder("anonymous".to_string()))
        );
    }
}
