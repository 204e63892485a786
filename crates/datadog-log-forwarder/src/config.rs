// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Forwarder configuration.
//!
//! Configuration is resolved once at startup, either from explicit values or
//! from `DD_*` environment variables, and stays immutable for the lifetime of
//! the forwarder. Environment variables override nothing after construction;
//! there is no ad hoc environment access on the delivery path.

use std::env;

use crate::constants;
use crate::error::ForwarderError;

const DEFAULT_INTAKE_HOST: &str = "http-intake.logs.datadoghq.com";

/// Immutable endpoint and pipeline configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Datadog API key (secret).
    pub api_key: String,
    /// Intake hostname.
    pub host: String,
    /// Plaintext port, used when TLS is disabled.
    pub port: u16,
    /// TLS port, used when TLS is enabled.
    pub ssl_port: u16,
    /// Whether to use TLS for the connection.
    pub use_ssl: bool,
    /// Disable TLS certificate validation (insecure, off by default).
    pub no_ssl_validation: bool,
    /// HTTP intake when true, raw TCP intake when false.
    pub use_http: bool,
    /// Send records as JSON; when false the TCP path sends the raw `message`
    /// field instead.
    pub use_json: bool,
    /// Use the legacy `/v1/input/<api_key>` route with per-event payloads
    /// instead of the batched `/api/v2/logs` route.
    pub use_v1_routes: bool,
    /// Gzip request bodies on the HTTP path.
    pub use_compression: bool,
    /// Gzip compression level.
    pub compression_level: u32,
    /// Maximum delivery retries per payload. Negative means unbounded.
    pub max_retries: i32,
    /// Cap on the exponential backoff between retries, in seconds.
    pub max_backoff_secs: u64,
    /// Maximum number of events per HTTP batch.
    pub max_batch_length: usize,
    /// Maximum uncompressed request size in bytes.
    pub max_batch_size_bytes: usize,
    /// Timeout for a single HTTP delivery attempt, in seconds.
    pub request_timeout_secs: u64,
    /// Explicit HTTPS proxy URL. Takes precedence over the `HTTPS_PROXY`
    /// environment variable, which the HTTP layer honors on its own.
    pub http_proxy: Option<String>,
    /// Write the host-supplied tag into each record under [`Config::tag_key`].
    pub include_tag_key: bool,
    /// Field name used when `include_tag_key` is set.
    pub tag_key: String,
    /// Field to receive the event timestamp as an ISO-8601 string, when absent.
    pub timestamp_key: Option<String>,
    /// Static `ddsource` value applied to records lacking one.
    pub source: Option<String>,
    /// Static `ddsourcecategory` value applied to records lacking one.
    pub sourcecategory: Option<String>,
    /// Static `service` value applied to records lacking one.
    pub service: Option<String>,
    /// Static `ddtags` value applied to records lacking one.
    pub tags: Option<String>,
    /// Static `hostname` value applied to records lacking one.
    pub hostname: Option<String>,
    /// Period of the TCP keep-alive frame. Disabled when unset.
    pub heartbeat_interval_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            api_key: String::new(),
            host: DEFAULT_INTAKE_HOST.to_string(),
            port: 80,
            ssl_port: 443,
            use_ssl: true,
            no_ssl_validation: false,
            use_http: true,
            use_json: true,
            use_v1_routes: false,
            use_compression: true,
            compression_level: 6,
            max_retries: -1,
            max_backoff_secs: constants::DEFAULT_MAX_BACKOFF_SECS,
            max_batch_length: constants::MAX_BATCH_LENGTH,
            max_batch_size_bytes: constants::MAX_BATCH_SIZE_BYTES,
            request_timeout_secs: 30,
            http_proxy: None,
            include_tag_key: false,
            tag_key: "tag".to_string(),
            timestamp_key: Some("@timestamp".to_string()),
            source: None,
            sourcecategory: None,
            service: None,
            tags: None,
            hostname: None,
            heartbeat_interval_secs: None,
        }
    }
}

impl Config {
    /// Builds a configuration from `DD_*` environment variables.
    ///
    /// `DD_API_KEY` is required; everything else falls back to the defaults
    /// of [`Config::default`].
    pub fn from_env() -> Result<Config, ForwarderError> {
        let api_key = env::var("DD_API_KEY")
            .map_err(|_| ForwarderError::InvalidConfig("DD_API_KEY is not set".to_string()))?;

        let defaults = Config::default();
        let config = Config {
            api_key,
            host: env::var("DD_URL").unwrap_or(defaults.host),
            port: parse_var("DD_PORT").unwrap_or(defaults.port),
            ssl_port: parse_var("DD_SSL_PORT").unwrap_or(defaults.ssl_port),
            use_ssl: bool_var("DD_USE_SSL", defaults.use_ssl),
            no_ssl_validation: bool_var("DD_NO_SSL_VALIDATION", defaults.no_ssl_validation),
            use_http: bool_var("DD_USE_HTTP", defaults.use_http),
            use_json: bool_var("DD_USE_JSON", defaults.use_json),
            use_v1_routes: bool_var("DD_USE_V1_ROUTES", defaults.use_v1_routes),
            use_compression: bool_var("DD_USE_COMPRESSION", defaults.use_compression),
            compression_level: parse_var("DD_COMPRESSION_LEVEL")
                .unwrap_or(defaults.compression_level),
            max_retries: parse_var("DD_MAX_RETRIES").unwrap_or(defaults.max_retries),
            max_backoff_secs: parse_var("DD_MAX_BACKOFF").unwrap_or(defaults.max_backoff_secs),
            max_batch_length: parse_var("DD_MAX_BATCH_LENGTH").unwrap_or(defaults.max_batch_length),
            max_batch_size_bytes: parse_var("DD_MAX_BATCH_SIZE")
                .unwrap_or(defaults.max_batch_size_bytes),
            request_timeout_secs: parse_var("DD_REQUEST_TIMEOUT")
                .unwrap_or(defaults.request_timeout_secs),
            http_proxy: resolve_proxy(
                env::var("DD_PROXY_HTTPS").ok(),
                env::var("HTTPS_PROXY").ok(),
            ),
            include_tag_key: bool_var("DD_INCLUDE_TAG_KEY", defaults.include_tag_key),
            tag_key: env::var("DD_TAG_KEY").unwrap_or(defaults.tag_key),
            timestamp_key: env::var("DD_TIMESTAMP_KEY")
                .ok()
                .or(defaults.timestamp_key),
            source: env::var("DD_SOURCE").ok(),
            sourcecategory: env::var("DD_SOURCECATEGORY").ok(),
            service: env::var("DD_SERVICE").ok(),
            tags: env::var("DD_TAGS").ok(),
            hostname: env::var("DD_HOSTNAME").ok(),
            heartbeat_interval_secs: parse_var("DD_HEARTBEAT_INTERVAL"),
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations the transports cannot operate with.
    pub fn validate(&self) -> Result<(), ForwarderError> {
        if self.api_key.trim().is_empty() {
            return Err(ForwarderError::InvalidConfig(
                "API key must not be empty".to_string(),
            ));
        }
        if self.host.trim().is_empty() {
            return Err(ForwarderError::InvalidConfig(
                "intake host must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Port the transport connects to, depending on TLS.
    pub fn endpoint_port(&self) -> u16 {
        if self.use_ssl {
            self.ssl_port
        } else {
            self.port
        }
    }

    /// Full HTTP intake URL for the configured route version.
    pub fn intake_url(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        let port = self.endpoint_port();
        if self.use_v1_routes {
            format!("{scheme}://{}:{port}/v1/input/{}", self.host, self.api_key)
        } else {
            format!("{scheme}://{}:{port}/api/v2/logs", self.host)
        }
    }
}

/// Applies the proxy resolution order: explicit configuration wins over the
/// ambient environment value, which the HTTP layer already honors natively
/// and is therefore only logged here.
fn resolve_proxy(explicit: Option<String>, environment: Option<String>) -> Option<String> {
    match (explicit, environment) {
        (Some(proxy), _) => Some(proxy),
        (None, Some(ambient)) => {
            tracing::debug!(proxy = %ambient, "no proxy configured, HTTPS_PROXY from environment applies");
            None
        }
        (None, None) => None,
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|val| val.parse::<T>().ok())
}

fn bool_var(name: &str, default: bool) -> bool {
    env::var(name)
        .map(|val| val.to_lowercase() != "false")
        .unwrap_or(default)
}
