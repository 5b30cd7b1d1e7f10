//! Upstream TLS connector.
//!
//! Douyin's CDN edges are reached through the proxy's own client. In
//! insecure mode the upstream certificate chain is not verified, so edges
//! with self-signed or pinned chains stay reachable. Handshake signatures
//! are still checked.

use std::sync::Arc;

use hudsucker::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use hudsucker::rustls::crypto::aws_lc_rs::default_provider;
use hudsucker::rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use hudsucker::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use hudsucker::rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use hyper_rustls::{ConfigBuilderExt, HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;

use crate::error::{ProxyError, Result};

/// Connector used for all upstream requests.
pub type UpstreamConnector = HttpsConnector<HttpConnector>;

/// Builds the upstream connector, verifying certificates against the native
/// root store unless `insecure` is set.
pub fn upstream_connector(insecure: bool) -> Result<UpstreamConnector> {
    let tls_config = client_config(insecure)?;

    Ok(HttpsConnectorBuilder::new()
        .with_tls_config(tls_config)
        .https_or_http()
        .enable_http1()
        .enable_http2()
        .build())
}

fn client_config(insecure: bool) -> Result<ClientConfig> {
    let provider = Arc::new(default_provider());
    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| ProxyError::Tls(e.to_string()))?;

    if insecure {
        tracing::warn!("Upstream certificate verification is disabled");
        return Ok(builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert(provider)))
            .with_no_client_auth());
    }

    Ok(builder
        .with_native_roots()
        .map_err(|e| ProxyError::Tls(e.to_string()))?
        .with_no_client_auth())
}

/// Accepts any server certificate but still validates handshake signatures.
#[derive(Debug)]
struct AcceptAnyServerCert(Arc<CryptoProvider>);

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, hudsucker::rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, hudsucker::rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, hudsucker::rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.0.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.0.signature_verification_algorithms.supported_schemes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insecure_config_accepts_any_certificate() {
        let verifier = AcceptAnyServerCert(Arc::new(default_provider()));
        let name = ServerName::try_from("webcast.douyin.com").unwrap();
        let cert = CertificateDer::from(vec![0u8; 4]);

        assert!(verifier
            .verify_server_cert(&cert, &[], &name, &[], UnixTime::now())
            .is_ok());
        assert!(!verifier.supported_verify_schemes().is_empty());
    }

    #[test]
    fn insecure_connector_builds() {
        assert!(upstream_connector(true).is_ok());
    }
}
