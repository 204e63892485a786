// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Orchestrator driving the delivery pipeline.
//!
//! One call to [`Forwarder::process`] handles one host-supplied chunk of
//! decoded records: malformed and empty records are skipped, the rest are
//! enriched and serialized, then either batched, formatted and compressed
//! for the HTTP intake, or framed individually for the TCP intake, and
//! finally delivered through the retrying sender. Nothing that happens
//! inside a cycle propagates to the caller; failures are logged and the
//! affected record or batch is dropped.
//!
//! All sends of a cycle run under one mutex, so a forwarder instance has at
//! most one in-flight network operation at a time. Backoff sleeps block only
//! the delivery task; the host keeps buffering on its side.

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, trace};

use crate::batch::Batcher;
use crate::compress::compress;
use crate::config::Config;
use crate::enrich::Enricher;
use crate::error::ForwarderError;
use crate::retry::{send_with_retries, RetryPolicy};
use crate::transport::http::HttpTransport;
use crate::transport::tcp::TcpTransport;
use crate::transport::Transport;
use crate::truncate::truncate;

/// One decoded record handed over by the host pipeline.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Routing tag assigned by the host, if any.
    pub tag: Option<String>,
    /// Event time in seconds since the epoch.
    pub timestamp: Option<f64>,
    /// Decoded record; anything but a non-empty JSON object is skipped.
    pub record: Value,
}

/// Log forwarder for one configured intake endpoint.
pub struct Forwarder {
    config: Arc<Config>,
    enricher: Enricher,
    batcher: Batcher,
    transport: Box<dyn Transport>,
    retry: RetryPolicy,
    /// Serializes all sends of this instance.
    send_lock: Mutex<()>,
}

impl Forwarder {
    /// Builds the forwarder and the transport matching the configured mode.
    ///
    /// Must be called from within a Tokio runtime when a TCP keep-alive is
    /// configured.
    pub fn new(config: Config) -> Result<Self, ForwarderError> {
        config.validate()?;
        let config = Arc::new(config);
        let transport: Box<dyn Transport> = if config.use_http {
            Box::new(HttpTransport::new(Arc::clone(&config))?)
        } else {
            Box::new(TcpTransport::new(Arc::clone(&config))?)
        };
        Ok(Self::with_transport(config, transport))
    }

    fn with_transport(config: Arc<Config>, transport: Box<dyn Transport>) -> Self {
        Forwarder {
            enricher: Enricher::new(&config),
            batcher: Batcher::new(config.max_batch_length, config.max_batch_size_bytes),
            retry: RetryPolicy::from_config(&config),
            send_lock: Mutex::new(()),
            config,
            transport,
        }
    }

    /// Processes one chunk of records. Never fails and never panics across
    /// the host boundary; delivery time is bounded by the retry policy.
    pub async fn process(&self, entries: Vec<LogEntry>) {
        let count = entries.len();
        let records = self.enrich_records(entries);
        trace!(received = count, usable = records.len(), "processing chunk");
        if records.is_empty() {
            return;
        }
        if self.config.use_http {
            self.deliver_http(records).await;
        } else {
            self.deliver_tcp(records).await;
        }
    }

    /// Stops accepting work on the underlying connection and releases it.
    pub async fn shutdown(&self) {
        self.transport.shutdown().await;
    }

    fn enrich_records(&self, entries: Vec<LogEntry>) -> Vec<Map<String, Value>> {
        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            let Value::Object(mut record) = entry.record else {
                trace!("skipping non-object record");
                continue;
            };
            if record.is_empty() {
                continue;
            }
            self.enricher
                .enrich(entry.tag.as_deref(), entry.timestamp, &mut record);
            records.push(record);
        }
        records
    }

    async fn deliver_http(&self, records: Vec<Map<String, Value>>) {
        let mut events = Vec::with_capacity(records.len());
        for record in &records {
            match serde_json::to_vec(record) {
                Ok(event) => events.push(event),
                Err(e) => error!(error = %e, "failed to serialize record, dropping it"),
            }
        }

        // The legacy route takes one JSON object per request; the batch
        // route takes a JSON array per request.
        let payloads: Vec<Vec<u8>> = if self.config.use_v1_routes {
            events
        } else {
            self.batcher
                .batch(events)
                .iter()
                .filter(|batch| !batch.is_empty())
                .map(|batch| join_batch(batch))
                .collect()
        };

        let _guard = self.send_lock.lock().await;
        for payload in payloads {
            let payload = if self.config.use_compression {
                match compress(&payload, self.config.compression_level) {
                    Ok(compressed) => compressed,
                    Err(e) => {
                        error!(error = %e, "failed to compress batch, dropping it");
                        continue;
                    }
                }
            } else {
                payload
            };
            debug!(bytes = payload.len(), "sending batch to intake");
            send_with_retries(self.transport.as_ref(), &payload, &self.retry).await;
        }
    }

    async fn deliver_tcp(&self, records: Vec<Map<String, Value>>) {
        let mut frames = Vec::with_capacity(records.len());
        for record in &records {
            if let Some(frame) = self.frame_tcp(record) {
                frames.push(frame);
            }
        }

        let _guard = self.send_lock.lock().await;
        for frame in frames {
            send_with_retries(self.transport.as_ref(), &frame, &self.retry).await;
        }
    }

    /// Builds one newline-terminated `<api_key> <payload>` frame, truncated
    /// to the request size cap before the newline is appended.
    fn frame_tcp(&self, record: &Map<String, Value>) -> Option<Vec<u8>> {
        let body = if self.config.use_json {
            match serde_json::to_vec(record) {
                Ok(body) => body,
                Err(e) => {
                    error!(error = %e, "failed to serialize record, dropping it");
                    return None;
                }
            }
        } else {
            match record.get("message") {
                Some(Value::String(message)) => message.trim().as_bytes().to_vec(),
                _ => {
                    trace!("skipping record without a message field");
                    return None;
                }
            }
        };

        let mut frame =
            Vec::with_capacity(self.config.api_key.len() + 1 + body.len());
        frame.extend_from_slice(self.config.api_key.as_bytes());
        frame.push(b' ');
        frame.extend_from_slice(&body);
        let mut frame = truncate(frame, self.config.max_batch_size_bytes);
        frame.push(b'\n');
        Some(frame)
    }
}

/// Joins a batch of serialized records into one JSON array payload.
fn join_batch(batch: &[Vec<u8>]) -> Vec<u8> {
    let size: usize = batch.iter().map(Vec::len).sum::<usize>() + batch.len() + 1;
    let mut payload = Vec::with_capacity(size);
    payload.push(b'[');
    for (i, event) in batch.iter().enumerate() {
        if i > 0 {
            payload.push(b',');
        }
        payload.extend_from_slice(event);
    }
    payload.push(b']');
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::io::Read;
    use std::sync::Mutex as StdMutex;

    /// Transport capturing every payload it is asked to deliver.
    struct RecordingTransport {
        payloads: Arc<StdMutex<Vec<Vec<u8>>>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
            self.payloads.lock().unwrap().push(payload.to_vec());
            Ok(())
        }

        async fn shutdown(&self) {}
    }

    fn forwarder_with_recorder(config: Config) -> (Forwarder, Arc<StdMutex<Vec<Vec<u8>>>>) {
        let payloads = Arc::new(StdMutex::new(Vec::new()));
        let transport = Box::new(RecordingTransport {
            payloads: Arc::clone(&payloads),
        });
        (
            Forwarder::with_transport(Arc::new(config), transport),
            payloads,
        )
    }

    fn entry(record: Value) -> LogEntry {
        LogEntry {
            tag: Some("app.web".to_string()),
            timestamp: Some(12345.0),
            record,
        }
    }

    fn test_config() -> Config {
        Config {
            api_key: "test-api-key".to_string(),
            use_compression: false,
            timestamp_key: None,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn http_batches_are_json_arrays() {
        let (forwarder, payloads) = forwarder_with_recorder(test_config());
        forwarder
            .process(vec![
                entry(json!({"message": "one"})),
                entry(json!({"message": "two"})),
            ])
            .await;

        let sent = payloads.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let body: Value = serde_json::from_slice(&sent[0]).unwrap();
        assert_eq!(body, json!([{"message": "one"}, {"message": "two"}]));
    }

    #[tokio::test]
    async fn compressed_batches_decompress_to_the_payload() {
        let (forwarder, payloads) = forwarder_with_recorder(Config {
            use_compression: true,
            ..test_config()
        });
        forwarder
            .process(vec![entry(json!({"message": "compressed"}))])
            .await;

        let sent = payloads.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let mut decoder = flate2::read::GzDecoder::new(&sent[0][..]);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed).unwrap();
        let body: Value = serde_json::from_slice(&decompressed).unwrap();
        assert_eq!(body, json!([{"message": "compressed"}]));
    }

    #[tokio::test]
    async fn malformed_and_empty_records_are_skipped() {
        let (forwarder, payloads) = forwarder_with_recorder(test_config());
        forwarder
            .process(vec![
                entry(json!("just a string")),
                entry(json!({})),
                entry(json!(null)),
            ])
            .await;
        assert!(payloads.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn v1_route_sends_one_object_per_request() {
        let (forwarder, payloads) = forwarder_with_recorder(Config {
            use_v1_routes: true,
            ..test_config()
        });
        forwarder
            .process(vec![
                entry(json!({"message": "one"})),
                entry(json!({"message": "two"})),
            ])
            .await;

        let sent = payloads.lock().unwrap();
        assert_eq!(sent.len(), 2);
        let first: Value = serde_json::from_slice(&sent[0]).unwrap();
        assert_eq!(first, json!({"message": "one"}));
    }

    #[tokio::test]
    async fn size_cap_splits_http_batches() {
        let (forwarder, payloads) = forwarder_with_recorder(Config {
            max_batch_size_bytes: 40,
            ..test_config()
        });
        forwarder
            .process(vec![
                entry(json!({"message": "first entry"})),
                entry(json!({"message": "second entry"})),
            ])
            .await;
        assert_eq!(payloads.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn tcp_frames_carry_api_key_and_newline() {
        let (forwarder, payloads) = forwarder_with_recorder(Config {
            use_http: false,
            ..test_config()
        });
        forwarder
            .process(vec![entry(json!({"message": "hello"}))])
            .await;

        let sent = payloads.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let frame = String::from_utf8(sent[0].clone()).unwrap();
        assert!(frame.starts_with("test-api-key "));
        assert!(frame.ends_with('\n'));
        let body: Value = serde_json::from_str(&frame["test-api-key ".len()..]).unwrap();
        assert_eq!(body, json!({"message": "hello"}));
    }

    #[tokio::test]
    async fn raw_mode_sends_trimmed_message_only() {
        let (forwarder, payloads) = forwarder_with_recorder(Config {
            use_http: false,
            use_json: false,
            ..test_config()
        });
        forwarder
            .process(vec![
                entry(json!({"message": "  spaced out  "})),
                entry(json!({"no_message": true})),
            ])
            .await;

        let sent = payloads.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0], b"test-api-key spaced out\n".to_vec());
    }

    #[tokio::test]
    async fn oversized_tcp_frame_is_truncated_before_newline() {
        let (forwarder, payloads) = forwarder_with_recorder(Config {
            use_http: false,
            max_batch_size_bytes: 30,
            ..test_config()
        });
        forwarder
            .process(vec![entry(json!({"message": "x".repeat(100)}))])
            .await;

        let sent = payloads.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].len(), 31);
        assert!(sent[0].ends_with(b"...TRUNCATED...\n"));
    }

    #[tokio::test]
    async fn enrichment_is_applied_before_serialization() {
        let (forwarder, payloads) = forwarder_with_recorder(Config {
            source: Some("redis".to_string()),
            include_tag_key: true,
            ..test_config()
        });
        forwarder
            .process(vec![entry(json!({"message": "hello"}))])
            .await;

        let sent = payloads.lock().unwrap();
        let body: Value = serde_json::from_slice(&sent[0]).unwrap();
        assert_eq!(body[0]["ddsource"], "redis");
        assert_eq!(body[0]["tag"], "app.web");
    }

    #[test]
    fn join_batch_builds_json_array() {
        let batch = vec![br#"{"a":1}"#.to_vec(), br#"{"b":2}"#.to_vec()];
        assert_eq!(join_batch(&batch), br#"[{"a":1},{"b":2}]"#.to_vec());
        assert_eq!(join_batch(&[br#"{"a":1}"#.to_vec()]), br#"[{"a":1}]"#.to_vec());
    }
}
