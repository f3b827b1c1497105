//! Explicit FTPS (RFC 4217) over rustls.
//!
//! `AUTH TLS` upgrades the existing control connection in place; after
//! `PBSZ 0` / `PROT P` every data connection is wrapped with the same
//! client configuration.

use std::sync::Arc;

use log::{debug, info, warn};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::ftp::client::Session;
use crate::ftp::error::{FtpError, FtpResult};
use crate::ftp::protocol::{ControlChannel, Transport};
use crate::ftp::types::{SecurityState, TlsOptions};

/// Build a rustls client configuration from the platform trust store.
///
/// With `accept_invalid_certs` the certificate chain is not verified at all.
pub fn client_config(options: &TlsOptions) -> FtpResult<Arc<ClientConfig>> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| FtpError::tls(format!("TLS protocol setup: {}", e)))?;

    let config = if options.accept_invalid_certs {
        warn!("TLS certificate verification disabled – insecure!");
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(NoCertVerifier))
            .with_no_client_auth()
    } else {
        let mut roots = RootCertStore::empty();
        let native = rustls_native_certs::load_native_certs();
        for e in &native.errors {
            warn!("Skipping unreadable native CA certificate: {}", e);
        }
        let (added, ignored) = roots.add_parsable_certificates(native.certs);
        debug!("Loaded {} native CA certificate(s), ignored {}", added, ignored);
        if roots.is_empty() {
            return Err(FtpError::tls("No usable CA certificates in the platform store"));
        }
        builder.with_root_certificates(roots).with_no_client_auth()
    };

    Ok(Arc::new(config))
}

/// Name used for SNI and certificate checks.
pub fn server_name(host: &str) -> FtpResult<ServerName<'static>> {
    ServerName::try_from(host.to_string())
        .map_err(|e| FtpError::invalid_config(format!("Invalid TLS server name '{}': {}", host, e)))
}

/// The configuration the control channel was secured with, reused for
/// every data connection.
#[derive(Clone)]
pub struct TlsContext {
    connector: TlsConnector,
    server_name: ServerName<'static>,
}

impl TlsContext {
    pub fn new(config: Arc<ClientConfig>, server_name: ServerName<'static>) -> Self {
        Self {
            connector: TlsConnector::from(config),
            server_name,
        }
    }

    /// Run the client handshake over `tcp`.
    pub async fn wrap(&self, tcp: TcpStream) -> FtpResult<Transport> {
        let stream = self
            .connector
            .connect(self.server_name.clone(), tcp)
            .await
            .map_err(|e| FtpError::tls(format!("TLS handshake failed: {}", e)))?;
        Ok(Transport::Tls(Box::new(stream)))
    }
}

impl Session {
    /// AUTH TLS (234), handshake on the control socket, PBSZ 0 (200),
    /// PROT P (200).
    ///
    /// Any failure after the 234 leaves the session `Disconnected`; close it
    /// and reconnect.
    pub async fn auth_tls(&mut self, config: Arc<ClientConfig>) -> FtpResult<()> {
        if self.state != SecurityState::Plain {
            return Err(FtpError::tls("Control connection is already secured"));
        }
        let name = match &self.config.tls.server_name {
            Some(n) => server_name(n)?,
            None => server_name(&self.host)?,
        };

        self.channel()?.cmd(234, "AUTH TLS").await?;
        self.state = SecurityState::Securing;

        let channel = self
            .channel
            .take()
            .ok_or_else(|| FtpError::disconnected("Session is closed"))?;
        let (transport, settings) = channel.into_parts();
        let tcp = match transport {
            Transport::Plain(tcp) => tcp,
            Transport::Tls(_) => return Err(FtpError::tls("Control connection is already TLS")),
        };

        let context = TlsContext::new(config, name);
        let secured = context.wrap(tcp).await?;
        debug!("{} control connection upgraded to TLS", settings.label);
        let mut channel = ControlChannel::with_settings(secured, settings);

        channel.cmd(200, "PBSZ 0").await?;
        channel.cmd(200, "PROT P").await?;

        self.channel = Some(channel);
        self.tls = Some(context);
        self.state = SecurityState::Secured;
        info!("[ftp:{}] control and data channels secured", self.id);
        Ok(())
    }

    /// `auth_tls` with a configuration built from the session's `TlsOptions`.
    pub async fn secure(&mut self) -> FtpResult<()> {
        let config = client_config(&self.config.tls)?;
        self.auth_tls(config).await
    }
}

// ─── NoCertVerifier (for self-signed certs) ─────────────────────────

#[derive(Debug)]
struct NoCertVerifier;

impl ServerCertVerifier for NoCertVerifier {
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
            SignatureScheme::ED25519,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
        ]
    }
}
