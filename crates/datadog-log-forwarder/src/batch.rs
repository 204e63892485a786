// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Groups serialized events into batches for the HTTP intake.
//!
//! Batches are bounded twice: by event count and by accumulated byte size.
//! Events keep their input order, every event lands in exactly one batch,
//! and an event is truncated at most once. A single event larger than the
//! size cap is truncated to fit and ships alone.

use crate::truncate::truncate;

/// Splits an ordered event stream into intake-sized batches.
#[derive(Debug, Clone, Copy)]
pub struct Batcher {
    max_batch_length: usize,
    max_batch_size_bytes: usize,
}

impl Batcher {
    pub fn new(max_batch_length: usize, max_batch_size_bytes: usize) -> Self {
        Batcher {
            max_batch_length,
            max_batch_size_bytes,
        }
    }

    /// Batches `events` in order.
    ///
    /// A new batch starts at every `max_batch_length`-th event, or as soon as
    /// adding an event would push the accumulated size past
    /// `max_batch_size_bytes`. The final in-progress batch is always emitted
    /// so no event is ever dropped; callers skip empty batches.
    pub fn batch(&self, events: Vec<Vec<u8>>) -> Vec<Vec<Vec<u8>>> {
        let mut batches = Vec::new();
        let mut current = Vec::new();
        let mut current_size = 0usize;

        for (i, event) in events.into_iter().enumerate() {
            let event = truncate(event, self.max_batch_size_bytes);
            let at_count_boundary =
                self.max_batch_length > 0 && i > 0 && i % self.max_batch_length == 0;
            if at_count_boundary || current_size + event.len() > self.max_batch_size_bytes {
                batches.push(std::mem::take(&mut current));
                current_size = 0;
            }
            current_size += event.len();
            current.push(event);
        }

        batches.push(current);
        batches
    }
}
