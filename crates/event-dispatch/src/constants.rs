// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Transport limits and naming constants.
//!
//! The queue transport rejects any single message larger than 256 KiB and any
//! batch call carrying more than 10 entries or more than 256 KiB in aggregate.

/// Maximum serialized size of a single message, in bytes.
pub const MAX_MESSAGE_SIZE_BYTES: usize = 256 * 1_024;

/// Maximum aggregate serialized size of one batch call, in bytes.
pub const MAX_BATCH_SIZE_BYTES: usize = 256 * 1_024;

/// Maximum number of entries the transport accepts in one batch call.
pub const MAX_BATCH_ENTRIES: usize = 10;

/// Maximum number of batch pipelines running at the same time.
pub const MAX_CONCURRENCY: usize = 25;

/// Bytes reserved in an offload pointer body for the storage target descriptor
/// (bucket name and region), which is only known after the upload succeeds.
///
/// The size estimate used for partitioning adds this reserve to the pointer body,
/// so it has to cover `,"bucket":"<name>","region":"<region>"`.
pub const OFFLOAD_RESERVE_BYTES: usize = 90;

/// Root namespace of every offload path.
pub const OFFLOAD_NAMESPACE: &str = "eventContent";

/// Attribute injected on every message with the destination queue name.
pub const QUEUE_NAME_ATTRIBUTE: &str = "queueName";

/// Attribute injected when the calling context carries a tenant.
pub const TENANT_ATTRIBUTE: &str = "tenant";

/// Key of the pointer object in an offloaded message body.
pub const OFFLOAD_LOCATION_KEY: &str = "offloadLocation";

pub const DEFAULT_TENANT_PLACEHOLDER: &str = "no-tenant";
pub const DEFAULT_SERVICE_NAME: &str = "unknown-service";
