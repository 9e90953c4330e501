// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Greedy partitioning of sized items into wire-legal batches.
//!
//! # Batching Strategy
//!
//! Items are appended to the current batch until one of two limits would be crossed:
//! 1. **Count limit**: the batch already holds `max_batch_entries` items
//! 2. **Size limit**: adding the item would push the batch over `max_batch_size_bytes`
//!
//! Either way the current batch is closed and a new one started. An item that is
//! larger than the size limit on its own is never split; it ends up alone in its
//! batch. Input order is preserved both across and within batches.

use crate::constants;
use tracing::warn;

/// Anything with a known serialized size.
pub trait Weighed {
    fn size_bytes(&self) -> usize;
}

/// Ordered, non-empty group of items sent in one transport call.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch<T> {
    items: Vec<T>,
    size_bytes: usize,
}

impl<T> Batch<T> {
    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Cumulative size of every item in the batch.
    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Partitioner {
    max_batch_size_bytes: usize,
    max_batch_entries: usize,
}

impl Default for Partitioner {
    fn default() -> Self {
        Self {
            max_batch_size_bytes: constants::MAX_BATCH_SIZE_BYTES,
            max_batch_entries: constants::MAX_BATCH_ENTRIES,
        }
    }
}

impl Partitioner {
    /// `max_batch_entries` is clamped to at least 1.
    pub fn new(max_batch_size_bytes: usize, max_batch_entries: usize) -> Self {
        Self {
            max_batch_size_bytes,
            max_batch_entries: max_batch_entries.max(1),
        }
    }

    pub fn partition<T, I>(&self, items: I) -> Vec<Batch<T>>
    where
        T: Weighed,
        I: IntoIterator<Item = T>,
    {
        let mut batches = Vec::new();
        let mut current: Vec<T> = Vec::with_capacity(self.max_batch_entries);
        let mut current_size = 0;

        for item in items {
            let size = item.size_bytes();

            if !current.is_empty()
                && (current.len() >= self.max_batch_entries
                    || current_size + size > self.max_batch_size_bytes)
            {
                batches.push(Batch {
                    items: std::mem::replace(
                        &mut current,
                        Vec::with_capacity(self.max_batch_entries),
                    ),
                    size_bytes: current_size,
                });
                current_size = 0;
            }

            if size > self.max_batch_size_bytes {
                warn!(
                    "DISPATCH | Item of {} bytes exceeds the {} byte batch limit, sending it alone",
                    size, self.max_batch_size_bytes
                );
            }

            current_size += size;
            current.push(item);
        }

        if !current.is_empty() {
            batches.push(Batch {
                items: current,
                size_bytes: current_size,
            });
        }

        batches
    }
}
