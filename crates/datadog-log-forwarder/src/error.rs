// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

/// Errors that can occur while constructing the forwarder.
///
/// Runtime delivery failures never surface through this type. They are
/// retried, or logged and dropped, inside the delivery cycle.
#[derive(Debug, thiserror::Error)]
pub enum ForwarderError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to initialize TLS: {0}")]
    Tls(String),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
