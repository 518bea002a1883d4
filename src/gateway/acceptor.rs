//! TLS acceptor recording the client's certificate chain.
//!
//! Wraps the rustls acceptor; once the handshake completes the presented
//! chain is attached to the connection's service so that every request on it
//! carries a [`PeerCertificates`] extension.

use std::io;

use axum_server::accept::Accept;
use axum_server::tls_rustls::{RustlsAcceptor, RustlsConfig};
use futures::future::BoxFuture;
use rustls::pki_types::CertificateDer;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::server::TlsStream;
use tower_http::add_extension::AddExtension;
use tracing::trace;

use crate::mtls::PeerCertificates;

/// Rustls acceptor that exposes the peer chain to request handlers.
#[derive(Debug, Clone)]
pub struct PeerCertAcceptor {
    inner: RustlsAcceptor,
}

impl PeerCertAcceptor {
    /// Acceptor over a rustls server configuration.
    #[must_use]
    pub fn new(config: RustlsConfig) -> Self {
        Self {
            inner: RustlsAcceptor::new(config),
        }
    }
}

impl<I, S> Accept<I, S> for PeerCertAcceptor
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    S: Send + 'static,
{
    type Stream = TlsStream<I>;
    type Service = AddExtension<S, PeerCertificates>;
    type Future = BoxFuture<'static, io::Result<(Self::Stream, Self::Service)>>;

    fn accept(&self, stream: I, service: S) -> Self::Future {
        let acceptor = self.inner.clone();
        Box::pin(async move {
            let (stream, service) = acceptor.accept(stream, service).await?;
            let chain = stream
                .get_ref()
                .1
                .peer_certificates()
                .map(owned_chain)
                .unwrap_or_default();
            let peer = PeerCertificates::new(chain);
            trace!(certificates = peer.as_slice().len(), "TLS handshake complete");
            Ok((stream, AddExtension::new(service, peer)))
        })
    }
}

fn owned_chain(certs: &[CertificateDer<'_>]) -> Vec<CertificateDer<'static>> {
    certs.iter().map(|c| c.clone().into_owned()).collect()
}
