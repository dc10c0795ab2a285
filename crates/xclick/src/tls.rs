//! TLS settings for driver connections.
//!
//! [`TlsConfig`] is a plain description that can be compared, cloned and
//! logged. Drivers turn it into a rustls client configuration with
//! [`TlsConfig::client_config`].

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{CryptoProvider, verify_tls12_signature, verify_tls13_signature};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

use crate::error::{Error, Result};

/// TLS configuration for connections to ClickHouse.
#[derive(Clone, PartialEq, Eq)]
pub struct TlsConfig {
    /// Name to verify the server certificate against. Defaults to the host.
    pub server_name: Option<String>,
    /// Accept any server certificate. Never enable outside development.
    pub insecure_skip_verify: bool,
    /// Additional PEM-encoded CA certificates to trust.
    pub ca_pem: Option<Vec<u8>>,
    /// PEM-encoded client certificate chain for mutual TLS.
    pub client_cert_pem: Option<Vec<u8>>,
    /// PEM-encoded client private key for mutual TLS.
    pub client_key_pem: Option<Vec<u8>>,
    /// Trust the bundled Mozilla root certificates.
    pub use_webpki_roots: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            server_name: None,
            insecure_skip_verify: false,
            ca_pem: None,
            client_cert_pem: None,
            client_key_pem: None,
            use_webpki_roots: true,
        }
    }
}

impl TlsConfig {
    /// Create a verifying configuration trusting the bundled roots.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration with certificate verification disabled.
    #[must_use]
    pub fn insecure() -> Self {
        Self::default().insecure_skip_verify(true)
    }

    /// Set the name to verify the server certificate against.
    #[must_use]
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    /// Enable or disable certificate verification bypass.
    #[must_use]
    pub fn insecure_skip_verify(mut self, skip: bool) -> Self {
        self.insecure_skip_verify = skip;
        self
    }

    /// Trust additional PEM-encoded CA certificates.
    #[must_use]
    pub fn ca_pem(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.ca_pem = Some(pem.into());
        self
    }

    /// Present a client certificate.
    #[must_use]
    pub fn client_auth_pem(mut self, cert: impl Into<Vec<u8>>, key: impl Into<Vec<u8>>) -> Self {
        self.client_cert_pem = Some(cert.into());
        self.client_key_pem = Some(key.into());
        self
    }

    /// Enable or disable the bundled root certificates.
    #[must_use]
    pub fn use_webpki_roots(mut self, enabled: bool) -> Self {
        self.use_webpki_roots = enabled;
        self
    }

    /// Build a rustls client configuration.
    pub fn client_config(&self) -> Result<Arc<ClientConfig>> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
            .with_safe_default_protocol_versions()?;

        let builder = if self.insecure_skip_verify {
            tracing::warn!("TLS certificate verification is disabled");
            builder
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerification { provider }))
        } else {
            builder.with_root_certificates(self.root_store()?)
        };

        let config = match self.client_identity()? {
            Some((chain, key)) => builder.with_client_auth_cert(chain, key)?,
            None => builder.with_no_client_auth(),
        };

        Ok(Arc::new(config))
    }

    fn root_store(&self) -> Result<RootCertStore> {
        let mut roots = RootCertStore::empty();

        if self.use_webpki_roots {
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }

        if let Some(pem) = &self.ca_pem {
            let certs = parse_certs(pem)?;
            if certs.is_empty() {
                return Err(Error::Config("CA bundle contains no certificates".into()));
            }
            for cert in certs {
                roots.add(cert)?;
            }
        }

        if roots.is_empty() {
            return Err(Error::Config("no trusted root certificates configured".into()));
        }

        Ok(roots)
    }

    fn client_identity(
        &self,
    ) -> Result<Option<(Vec<CertificateDer<'static>>, PrivateKeyDer<'static>)>> {
        match (&self.client_cert_pem, &self.client_key_pem) {
            (None, None) => Ok(None),
            (Some(cert), Some(key)) => {
                let chain = parse_certs(cert)?;
                if chain.is_empty() {
                    return Err(Error::Config(
                        "client certificate PEM contains no certificates".into(),
                    ));
                }
                let mut reader = key.as_slice();
                let key = rustls_pemfile::private_key(&mut reader)?.ok_or_else(|| {
                    Error::Config("client key PEM contains no private key".into())
                })?;
                Ok(Some((chain, key)))
            }
            _ => Err(Error::Config(
                "client certificate and key must be set together".into(),
            )),
        }
    }
}

impl std::fmt::Debug for TlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsConfig")
            .field("server_name", &self.server_name)
            .field("insecure_skip_verify", &self.insecure_skip_verify)
            .field("ca_pem", &self.ca_pem.as_ref().map(Vec::len))
            .field("client_cert", &self.client_cert_pem.is_some())
            .field("use_webpki_roots", &self.use_webpki_roots)
            .finish()
    }
}

fn parse_certs(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = pem;
    let certs = rustls_pemfile::certs(&mut reader).collect::<std::io::Result<Vec<_>>>()?;
    Ok(certs)
}

/// Verifier that accepts every server certificate.
///
/// Handshake signatures are still checked so the session keys are bound to
/// the presented certificate.
#[derive(Debug)]
struct NoVerification {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
