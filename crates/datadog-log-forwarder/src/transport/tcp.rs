// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! TCP transport to the log intake.
//!
//! The socket is established lazily on the first send and optionally
//! upgraded to TLS. Any I/O failure discards the connection and surfaces as
//! a retryable error; the next attempt reconnects. A keep-alive frame can be
//! written periodically from a timer task that shares the socket mutex with
//! regular sends, so a dead connection is detected and recycled even while
//! the pipeline is idle.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_rustls::TlsConnector;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Config;
use crate::constants::HEARTBEAT_FRAME;
use crate::error::ForwarderError;
use crate::transport::{Transport, TransportError};

/// Client for the TCP intake endpoint.
pub struct TcpTransport {
    inner: Arc<TcpInner>,
    heartbeat: CancellationToken,
}

struct TcpInner {
    host: String,
    port: u16,
    tls: Option<Tls>,
    /// Exclusive owner of the connection; all writes go through this lock.
    stream: Mutex<Option<IntakeStream>>,
}

struct Tls {
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

enum IntakeStream {
    Plain(TcpStream),
    Tls(Box<tokio_rustls::client::TlsStream<TcpStream>>),
}

impl IntakeStream {
    async fn write_all(&mut self, payload: &[u8]) -> std::io::Result<()> {
        match self {
            IntakeStream::Plain(stream) => stream.write_all(payload).await,
            IntakeStream::Tls(stream) => stream.write_all(payload).await,
        }
    }

    async fn flush(&mut self) -> std::io::Result<()> {
        match self {
            IntakeStream::Plain(stream) => stream.flush().await,
            IntakeStream::Tls(stream) => stream.flush().await,
        }
    }

    async fn close(&mut self) {
        let result = match self {
            IntakeStream::Plain(stream) => stream.shutdown().await,
            IntakeStream::Tls(stream) => stream.shutdown().await,
        };
        if let Err(e) = result {
            debug!(error = %e, "ignoring error while closing intake connection");
        }
    }
}

impl TcpTransport {
    /// Builds the transport and, when configured, starts the keep-alive
    /// timer. Must be called from within a Tokio runtime.
    pub fn new(config: Arc<Config>) -> Result<Self, ForwarderError> {
        let tls = if config.use_ssl {
            let connector = build_tls_connector(config.no_ssl_validation)?;
            let server_name = ServerName::try_from(config.host.clone()).map_err(|_| {
                ForwarderError::InvalidConfig(format!(
                    "intake host {:?} is not a valid TLS server name",
                    config.host
                ))
            })?;
            Some(Tls {
                connector,
                server_name,
            })
        } else {
            None
        };

        let inner = Arc::new(TcpInner {
            host: config.host.clone(),
            port: config.endpoint_port(),
            tls,
            stream: Mutex::new(None),
        });

        let heartbeat = CancellationToken::new();
        if let Some(secs) = config.heartbeat_interval_secs {
            spawn_heartbeat(
                Arc::clone(&inner),
                Duration::from_secs(secs),
                heartbeat.clone(),
            );
        }

        Ok(TcpTransport { inner, heartbeat })
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, payload: &[u8]) -> Result<(), TransportError> {
        self.inner.write_frame(payload).await
    }

    async fn shutdown(&self) {
        self.heartbeat.cancel();
        let mut guard = self.inner.stream.lock().await;
        if let Some(mut stream) = guard.take() {
            stream.close().await;
        }
    }
}

impl TcpInner {
    /// Writes one frame, connecting first if no connection is alive.
    ///
    /// On any I/O error the connection is discarded so the next call starts
    /// from a fresh socket.
    async fn write_frame(&self, payload: &[u8]) -> Result<(), TransportError> {
        let mut guard = self.stream.lock().await;

        if guard.is_none() {
            debug!(host = %self.host, port = self.port, "establishing intake connection");
            *guard = Some(self.connect().await?);
        }

        if let Some(stream) = guard.as_mut() {
            let result = match stream.write_all(payload).await {
                Ok(()) => stream.flush().await,
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!(error = %e, "write to intake failed, discarding connection");
                *guard = None;
                return Err(TransportError::Io(e));
            }
        }
        Ok(())
    }

    async fn connect(&self) -> Result<IntakeStream, TransportError> {
        let stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        match &self.tls {
            Some(tls) => {
                let stream = tls
                    .connector
                    .connect(tls.server_name.clone(), stream)
                    .await?;
                Ok(IntakeStream::Tls(Box::new(stream)))
            }
            None => Ok(IntakeStream::Plain(stream)),
        }
    }
}

fn spawn_heartbeat(inner: Arc<TcpInner>, period: Duration, cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of an interval fires immediately; skip it so the
        // connection stays lazy until the first real send or full period.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = inner.write_frame(HEARTBEAT_FRAME).await {
                        debug!(error = %e, "keep-alive write failed, connection recycled");
                    }
                }
                () = cancel.cancelled() => break,
            }
        }
        debug!("keep-alive timer stopped");
    });
}

fn build_tls_connector(no_ssl_validation: bool) -> Result<TlsConnector, ForwarderError> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|e| ForwarderError::Tls(e.to_string()))?;

    let config = if no_ssl_validation {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(InsecureVerifier { provider }))
            .with_no_client_auth()
    } else {
        let loaded = rustls_native_certs::load_native_certs();
        let mut roots = rustls::RootCertStore::empty();
        for cert in loaded.certs {
            if let Err(e) = roots.add(cert) {
                debug!(error = %e, "skipping unusable root certificate");
            }
        }
        if roots.is_empty() {
            return Err(ForwarderError::Tls(format!(
                "no usable native root certificates: {:?}",
                loaded.errors
            )));
        }
        builder
            .with_root_certificates(roots)
            .with_no_client_auth()
    };

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Certificate verifier used when validation is disabled by configuration.
#[derive(Debug)]
struct InsecureVerifier {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for InsecureVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
