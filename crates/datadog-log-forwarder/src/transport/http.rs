// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! HTTP transport to the log intake.
//!
//! Holds one persistent connection pool and posts payloads to the versioned
//! route selected by the configuration: the batch route with the API key in
//! the `DD-API-KEY` header, or the legacy route with the key embedded in the
//! path. Status classification follows intake semantics: 5xx and 429 are
//! retryable, any other client error will not succeed on a resend and is
//! absorbed here after logging.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::{debug, error};

use crate::config::Config;
use crate::error::ForwarderError;
use crate::transport::{Transport, TransportError};
use crate::FORWARDER_VERSION;

/// Client for the HTTP intake endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: Arc<Config>) -> Result<Self, ForwarderError> {
        Ok(HttpTransport {
            client: build_client(&config)?,
            url: config.intake_url(),
            headers: build_headers(&config)?,
            timeout: Duration::from_secs(config.request_timeout_secs),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .headers(self.headers.clone())
            .body(payload.to_vec())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout
                } else {
                    TransportError::Request(e)
                }
            })?;

        let status = response.status();
        if status.as_u16() >= 500 || status.as_u16() == 429 {
            return Err(TransportError::Status(status.as_u16()));
        }
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            error!(
                status = status.as_u16(),
                body = %body,
                "intake rejected the payload, dropping without retry"
            );
            return Ok(());
        }
        debug!(status = status.as_u16(), bytes = payload.len(), "payload delivered");
        Ok(())
    }

    async fn shutdown(&self) {
        // Connection pool is released on drop; nothing to flush.
        debug!("closing HTTP transport");
    }
}

fn build_client(config: &Config) -> Result<reqwest::Client, ForwarderError> {
    let mut builder = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)));

    if config.no_ssl_validation {
        builder = builder.danger_accept_invalid_certs(true);
    }
    // Explicit proxy beats the environment one; reqwest applies HTTPS_PROXY
    // from the environment on its own when nothing is set here.
    if let Some(proxy_url) = &config.http_proxy {
        builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
    }

    Ok(builder.build()?)
}

fn build_headers(config: &Config) -> Result<HeaderMap, ForwarderError> {
    let mut headers = HeaderMap::new();
    headers.insert("Content-Type", HeaderValue::from_static("application/json"));
    if !config.use_v1_routes {
        let api_key = HeaderValue::from_str(&config.api_key)
            .map_err(|_| ForwarderError::InvalidConfig("API key is not a valid header value".to_string()))?;
        headers.insert("DD-API-KEY", api_key);
        headers.insert("DD-EVP-ORIGIN", HeaderValue::from_static("log-forwarder"));
        headers.insert(
            "DD-EVP-ORIGIN-VERSION",
            HeaderValue::from_static(FORWARDER_VERSION),
        );
    }
    if config.use_compression {
        headers.insert("Content-Encoding", HeaderValue::from_static("gzip"));
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            api_key: "test-api-key".to_string(),
            ..Config::default()
        }
    }

    fn transport_for(config: Config) -> HttpTransport {
        HttpTransport::new(Arc::new(config)).unwrap()
    }

    async fn send_with_status(status: usize) -> Result<(), TransportError> {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/v2/logs")
            .with_status(status)
            .create_async()
            .await;

        let host_with_port = server.host_with_port();
        let (host, port) = host_with_port.split_once(':').unwrap();
        let transport = transport_for(Config {
            host: host.to_string(),
            port: port.parse().unwrap(),
            use_ssl: false,
            use_compression: false,
            ..test_config()
        });
        transport.send(br#"[{"message":"x"}]"#).await
    }

    #[tokio::test]
    async fn success_status_is_ok() {
        assert!(send_with_status(202).await.is_ok());
    }

    #[tokio::test]
    async fn server_errors_are_retryable() {
        assert!(matches!(
            send_with_status(500).await,
            Err(TransportError::Status(500))
        ));
        assert!(matches!(
            send_with_status(503).await,
            Err(TransportError::Status(503))
        ));
    }

    #[tokio::test]
    async fn throttling_is_retryable() {
        assert!(matches!(
            send_with_status(429).await,
            Err(TransportError::Status(429))
        ));
    }

    #[tokio::test]
    async fn client_errors_are_absorbed() {
        assert!(send_with_status(400).await.is_ok());
        assert!(send_with_status(403).await.is_ok());
    }

    #[tokio::test]
    async fn connection_failure_is_retryable() {
        // Port 1 is reserved and nothing listens on it.
        let transport = transport_for(Config {
            host: "127.0.0.1".to_string(),
            port: 1,
            use_ssl: false,
            ..test_config()
        });
        assert!(transport.send(b"[]").await.is_err());
    }

    #[test]
    fn v2_headers_carry_api_key_and_origin() {
        let headers = build_headers(&test_config()).unwrap();
        assert_eq!(headers.get("DD-API-KEY").unwrap(), "test-api-key");
        assert_eq!(headers.get("DD-EVP-ORIGIN").unwrap(), "log-forwarder");
        assert_eq!(headers.get("Content-Type").unwrap(), "application/json");
        assert_eq!(headers.get("Content-Encoding").unwrap(), "gzip");
    }

    #[test]
    fn v1_headers_omit_api_key() {
        let headers = build_headers(&Config {
            use_v1_routes: true,
            use_compression: false,
            ..test_config()
        })
        .unwrap();
        assert!(!headers.contains_key("DD-API-KEY"));
        assert!(!headers.contains_key("Content-Encoding"));
    }
}
