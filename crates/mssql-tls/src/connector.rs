//! TLS connector.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsConnector as RustlsConnector;

use crate::config::TlsSettings;
use crate::error::TlsError;
use crate::prelogin_channel::PreloginChannel;

/// Certificate verifier that accepts anything.
///
/// Active only under `trust_server_certificate`; connections verified this
/// way are open to man-in-the-middle interception.
#[derive(Debug)]
struct AcceptAnyCertificate;

impl ServerCertVerifier for AcceptAnyCertificate {
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
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

/// Connector for SQL Server TLS sessions.
pub struct TlsConnector {
    settings: TlsSettings,
    inner: RustlsConnector,
}

impl TlsConnector {
    /// Build a connector from settings.
    pub fn new(settings: TlsSettings) -> Result<Self, TlsError> {
        let config = Self::client_config(&settings)?;
        Ok(Self {
            settings,
            inner: RustlsConnector::from(Arc::new(config)),
        })
    }

    fn client_config(settings: &TlsSettings) -> Result<ClientConfig, TlsError> {
        if settings.trust_server_certificate {
            tracing::warn!(
                "trust_server_certificate is enabled; certificate validation is DISABLED"
            );
            let config = ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
                .with_no_client_auth();
            return Ok(config);
        }

        let roots = RootCertStore {
            roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
        };
        Ok(ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth())
    }

    /// Run the handshake over `transport`, framing handshake records inside
    /// PRELOGIN packets. The returned stream is already in pass-through
    /// mode; subsequent TLS records flow directly on the socket.
    pub async fn connect_within_prelogin<S>(
        &self,
        transport: S,
        host: &str,
    ) -> Result<crate::TlsStream<S>, TlsError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let name = self.settings.server_name.as_deref().unwrap_or(host);
        let sni = ServerName::try_from(name.to_string())
            .map_err(|_| TlsError::InvalidServerName(name.to_string()))?;

        tracing::debug!(server_name = %name, "starting PRELOGIN-wrapped TLS handshake");

        let channel = PreloginChannel::new(transport);
        let mut stream = self
            .inner
            .connect(sni, channel)
            .await
            .map_err(|e| TlsError::HandshakeFailed(e.to_string()))?;

        stream.get_mut().0.handshake_complete();
        tracing::debug!("TLS handshake complete, channel switched to pass-through");

        Ok(stream)
    }
}

impl std::fmt::Debug for TlsConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConnector")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
