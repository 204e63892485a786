// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Constants for the Datadog log intake API limits.

/// Maximum number of events per HTTP batch.
///
/// The intake rejects payloads carrying more entries than this, so the
/// batcher starts a fresh batch at every multiple of this count.
pub const MAX_BATCH_LENGTH: usize = 500;

/// Maximum uncompressed request size in bytes.
///
/// A batch never exceeds this size. A single event larger than this is
/// truncated to fit (see [`crate::truncate`]) and shipped alone.
pub const MAX_BATCH_SIZE_BYTES: usize = 500_000;

/// Suffix written over the tail of an event that was cut to fit a size limit.
pub const TRUNCATION_MARKER: &[u8] = b"...TRUNCATED...";

/// Default cap applied to the exponential retry backoff, in seconds.
///
/// Also bounds worst-case shutdown latency while a retry loop is sleeping.
pub const DEFAULT_MAX_BACKOFF_SECS: u64 = 30;

/// Keep-alive frame periodically written on an idle TCP connection.
pub const HEARTBEAT_FRAME: &[u8] = b"fp\n";
