// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Log line formatting for processes embedding the dispatcher.
//!
//! ```text
//! EVENT_DISPATCH | LEVEL | [span_name{span_fields}:] message {event_fields}
//! ```
//!
//! The library never installs a subscriber on its own. Binaries call [`init`] once,
//! or build their own subscriber around [`Formatter`].

use crate::config::DispatchConfig;
use crate::errors::ConfigError;
use std::fmt;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::fmt::{
    format::{self, FormatEvent, FormatFields},
    FmtContext, FormattedFields,
};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

/// Prefixes every line with `EVENT_DISPATCH` and the level.
#[derive(Debug, Clone, Copy)]
pub struct Formatter;

impl<S, N> FormatEvent<S, N> for Formatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(&mut writer, "EVENT_DISPATCH | {} | ", event.metadata().level())?;

        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;

                let ext = span.extensions();
                if let Some(fields) = ext.get::<FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{fields}}}")?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Filter directive muting HTTP stack noise below the configured level.
pub fn env_filter(log_level: &str) -> Result<EnvFilter, ConfigError> {
    EnvFilter::try_new(format!("h2=off,hyper=off,rustls=off,reqwest=off,{log_level}"))
        .map_err(|e| ConfigError::Logging(format!("invalid log level {log_level:?}: {e}")))
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init(log_level: &str) -> Result<(), ConfigError> {
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(env_filter(log_level)?)
        .event_format(Formatter)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| ConfigError::Logging(e.to_string()))?;

    tracing::debug!("Logging subsystem enabled");
    Ok(())
}

/// [`init`] with the level from `config`.
pub fn init_from_config(config: &DispatchConfig) -> Result<(), ConfigError> {
    init(&config.log_level)
}
