// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Gzip compression for batch payloads.

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;

/// Compresses `payload` with gzip at the given level.
///
/// The stream is fully in memory, so a failure here is an encoding error,
/// not a transport condition. Callers drop the affected batch instead of
/// retrying it.
pub fn compress(payload: &[u8], level: u32) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(
        Vec::with_capacity(payload.len() / 2),
        Compression::new(level),
    );
    encoder.write_all(payload)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn round_trips_through_gzip() {
        let payload = br#"[{"message":"hello"},{"message":"world"}]"#;
        let compressed = compress(payload, 6).unwrap();
        assert!(!compressed.is_empty());

        let mut decoder = flate2::read::GzDecoder::new(&compressed[..]);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed).unwrap();
        assert_eq!(decompressed, payload);
    }

    #[test]
    fn compresses_repetitive_payloads() {
        let payload = vec![b'a'; 10_000];
        let compressed = compress(&payload, 6).unwrap();
        assert!(compressed.len() < payload.len());
    }

    #[test]
    fn level_zero_still_valid_gzip() {
        let payload = b"no compression";
        let compressed = compress(payload, 0).unwrap();
        let mut decoder = flate2::read::GzDecoder::new(&compressed[..]);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed).unwrap();
        assert_eq!(decompressed, payload.to_vec());
    }
}
