// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Datadog Log Forwarder
//!
//! Library component that takes decoded log records handed over by a host
//! collection pipeline, enriches them with contextual metadata, groups them
//! into size-bounded batches and delivers them to the Datadog log intake,
//! either over HTTP or over a persistent TCP/TLS connection.
//!
//! The pipeline per delivery cycle:
//!
//! ```text
//!   host chunk
//!       │
//!       v
//!   ┌──────────┐   ┌───────────────────┐   ┌──────────┐   ┌───────────┐
//!   │ Enricher │──>│ Batcher/Truncator │──>│ Compress │──>│ Transport │
//!   └──────────┘   └───────────────────┘   └──────────┘   └───────────┘
//!                                                              │ retry w/ backoff
//!                                                              v
//!                                                        Datadog intake
//! ```
//!
//! Delivery is at-least-once under transient failures: retryable transport
//! errors (connection failures, 5xx, 429) are retried with capped exponential
//! backoff, client errors are logged and absorbed, and no failure ever
//! propagates out of a delivery cycle into the host pipeline.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![deny(unused_extern_crates)]

pub mod batch;
pub mod compress;
pub mod config;
pub mod constants;
pub mod enrich;
mod error;
pub mod forwarder;
pub mod retry;
pub mod transport;
pub mod truncate;

pub use config::Config;
pub use error::ForwarderError;
pub use forwarder::{Forwarder, LogEntry};

/// Version reported to the intake in the `DD-EVP-ORIGIN-VERSION` header.
pub const FORWARDER_VERSION: &str = env!("CARGO_PKG_VERSION");
