// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounds a serialized event to a maximum byte length.

use crate::constants::TRUNCATION_MARKER;

/// Truncates `event` to at most `max_len` bytes.
///
/// Events within the limit pass through unchanged. Oversized events keep
/// their first `max_len` bytes with [`TRUNCATION_MARKER`] written over the
/// tail, so the result is exactly `max_len` bytes and always ends with the
/// marker. When `max_len` is smaller than the marker itself, the marker alone
/// is returned.
pub fn truncate(mut event: Vec<u8>, max_len: usize) -> Vec<u8> {
    if event.len() <= max_len {
        return event;
    }
    if max_len < TRUNCATION_MARKER.len() {
        return TRUNCATION_MARKER.to_vec();
    }
    event.truncate(max_len);
    let start = max_len - TRUNCATION_MARKER.len();
    event[start..].copy_from_slice(TRUNCATION_MARKER);
    event
}
