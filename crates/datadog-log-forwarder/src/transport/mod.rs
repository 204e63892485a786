// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Transport clients for the log intake.
//!
//! Both variants expose the same capability: one delivery attempt plus a
//! best-effort close. Errors crossing this boundary are retryable by
//! construction. Non-retryable conditions (a 4xx other than 429) are logged
//! and absorbed inside the client, because the intake will not accept the
//! same payload on a resend.

pub mod http;
pub mod tcp;

use async_trait::async_trait;

/// Failures warranting a backoff and resend of the same payload.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("request timed out")]
    Timeout,

    #[error("retryable intake status {0}")]
    Status(u16),

    #[error("network error: {0}")]
    Request(#[from] reqwest::Error),
}

/// One-attempt delivery capability owned by the forwarder.
///
/// Implementations exclusively own their connection state; the caller
/// serializes `send` invocations so a single connection never sees
/// interleaved writes.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs one delivery attempt of the full payload.
    async fn send(&self, payload: &[u8]) -> Result<(), TransportError>;

    /// Releases the underlying connection. Errors are suppressed.
    async fn shutdown(&self);
}
