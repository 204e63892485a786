// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Record enrichment with contextual metadata.
//!
//! The enricher is a pure transform over a decoded record: static metadata
//! fields from the configuration are applied first-write-wins, the host tag
//! and event timestamp are injected under configurable keys, and container
//! metadata already present on the record (`kubernetes`/`docker` sub-objects)
//! is flattened into `ddtags`. No I/O, deterministic given inputs and
//! configuration.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::config::Config;

/// Mapping from `kubernetes` sub-object fields to derived tag names.
const KUBERNETES_TAGS: [(&str, &str); 5] = [
    ("container_image", "image_name"),
    ("container_name", "container_name"),
    ("namespace_name", "kube_namespace"),
    ("pod_name", "pod_name"),
    ("docker_id", "container_id"),
];

/// Pure record-enrichment stage, built once from the configuration.
#[derive(Debug, Clone)]
pub struct Enricher {
    source: Option<String>,
    sourcecategory: Option<String>,
    tags: Option<String>,
    service: Option<String>,
    hostname: Option<String>,
    include_tag_key: bool,
    tag_key: String,
    timestamp_key: Option<String>,
}

impl Enricher {
    pub fn new(config: &Config) -> Self {
        Enricher {
            source: config.source.clone(),
            sourcecategory: config.sourcecategory.clone(),
            tags: config.tags.clone(),
            service: config.service.clone(),
            hostname: config.hostname.clone(),
            include_tag_key: config.include_tag_key,
            tag_key: config.tag_key.clone(),
            timestamp_key: config.timestamp_key.clone(),
        }
    }

    /// Enriches `record` in place.
    ///
    /// Configured metadata never overwrites a value the record already
    /// carries; only the tag key is written unconditionally. The timestamp
    /// key is set from `timestamp` only when the field is absent.
    pub fn enrich(&self, tag: Option<&str>, timestamp: Option<f64>, record: &mut Map<String, Value>) {
        set_if_absent(record, "ddsourcecategory", self.sourcecategory.as_deref());
        set_if_absent(record, "ddsource", self.source.as_deref());
        set_if_absent(record, "ddtags", self.tags.as_deref());
        set_if_absent(record, "service", self.service.as_deref());
        set_if_absent(record, "hostname", self.hostname.as_deref());

        if self.include_tag_key {
            if let Some(tag) = tag {
                record.insert(self.tag_key.clone(), Value::String(tag.to_string()));
            }
        }

        if let Some(key) = &self.timestamp_key {
            if !record.contains_key(key) {
                if let Some(formatted) = timestamp.and_then(format_timestamp) {
                    record.insert(key.clone(), Value::String(formatted));
                }
            }
        }

        apply_container_tags(record);
    }
}

fn set_if_absent(record: &mut Map<String, Value>, key: &str, value: Option<&str>) {
    if let Some(value) = value {
        if !record.contains_key(key) {
            record.insert(key.to_string(), Value::String(value.to_string()));
        }
    }
}

/// Formats epoch seconds as an ISO-8601 UTC string with millisecond
/// precision, e.g. `1970-01-01T03:25:45.000Z`.
fn format_timestamp(seconds: f64) -> Option<String> {
    let millis = (seconds * 1000.0).round();
    if !millis.is_finite() {
        return None;
    }
    DateTime::<Utc>::from_timestamp_millis(millis as i64)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
}

/// Flattens `kubernetes`/`docker` metadata into `ddtags`.
///
/// Derived tags are appended to a non-empty existing `ddtags` value,
/// comma-joined; otherwise `ddtags` is set to the derived tags. No-op when
/// the record carries no container metadata.
fn apply_container_tags(record: &mut Map<String, Value>) {
    let mut derived = Vec::new();

    if let Some(Value::Object(kubernetes)) = record.get("kubernetes") {
        for (field, tag_name) in KUBERNETES_TAGS {
            if let Some(Value::String(value)) = kubernetes.get(field) {
                derived.push(format!("{tag_name}:{value}"));
            }
        }
    }
    if let Some(Value::Object(docker)) = record.get("docker") {
        if let Some(Value::String(value)) = docker.get("container_id") {
            derived.push(format!("container_id:{value}"));
        }
    }

    if derived.is_empty() {
        return;
    }
    let derived = derived.join(",");
    let merged = match record.get("ddtags") {
        Some(Value::String(existing)) if !existing.is_empty() => {
            format!("{existing},{derived}")
        }
        _ => derived,
    };
    record.insert("ddtags".to_string(), Value::String(merged));
}
