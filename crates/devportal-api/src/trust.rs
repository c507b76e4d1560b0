// Certificate trust decisions
//
// Device portals usually serve self-issued certificates, so the usual
// root-store check is replaced by a caller-supplied policy. The policy is
// wired into rustls through a custom `ServerCertVerifier`; handshake
// signatures are still verified with the crypto provider.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::{CertificateError, DigitallySignedStruct, SignatureScheme};
use rustls_pki_types::pem::PemObject;
use rustls_pki_types::{CertificateDer, ServerName, UnixTime};
use tracing::{debug, warn};

use crate::error::Error;

/// The certificate a portal presented during the TLS handshake.
#[derive(Debug, Clone, Copy)]
pub struct PeerCertificate<'a> {
    /// DER encoding of the end-entity certificate.
    pub der: &'a [u8],
    /// Number of intermediate certificates sent with it.
    pub intermediates: usize,
    /// Host name (or IP literal) the client connected to.
    pub server_name: &'a str,
}

/// Decides whether a presented certificate is acceptable.
pub trait TrustPolicy: Send + Sync {
    fn accept(&self, peer: &PeerCertificate<'_>) -> bool;
}

impl<F> TrustPolicy for F
where
    F: Fn(&PeerCertificate<'_>) -> bool + Send + Sync,
{
    fn accept(&self, peer: &PeerCertificate<'_>) -> bool {
        self(peer)
    }
}

/// Accepts only certificates whose DER bytes match a pinned set.
#[derive(Debug, Clone, Default)]
pub struct PinnedCertificates {
    pinned: Vec<CertificateDer<'static>>,
}

impl PinnedCertificates {
    pub fn new(pinned: impl IntoIterator<Item = CertificateDer<'static>>) -> Self {
        Self {
            pinned: pinned.into_iter().collect(),
        }
    }

    /// Load every certificate from a PEM file (the portal's exported cert).
    pub fn from_pem_file(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let pinned = CertificateDer::pem_file_iter(path)
            .map_err(|e| Error::Tls(format!("failed to read {}: {e}", path.display())))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Error::Tls(format!("invalid certificate in {}: {e}", path.display())))?;

        if pinned.is_empty() {
            return Err(Error::Tls(format!(
                "no certificates found in {}",
                path.display()
            )));
        }
        Ok(Self { pinned })
    }

    pub fn len(&self) -> usize {
        self.pinned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pinned.is_empty()
    }
}

impl TrustPolicy for PinnedCertificates {
    fn accept(&self, peer: &PeerCertificate<'_>) -> bool {
        self.pinned.iter().any(|c| c.as_ref() == peer.der)
    }
}

/// How the transport decides whether to trust the portal's certificate.
#[derive(Clone, Default)]
pub enum TrustMode {
    /// Use the platform's root certificate store.
    #[default]
    System,
    /// Trust a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Delegate every decision to a caller-supplied policy.
    Policy(Arc<dyn TrustPolicy>),
    /// Accept any certificate.
    DangerAcceptInvalid,
}

impl TrustMode {
    pub fn policy(policy: impl TrustPolicy + 'static) -> Self {
        Self::Policy(Arc::new(policy))
    }
}

impl fmt::Debug for TrustMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("System"),
            Self::CustomCa(path) => f.debug_tuple("CustomCa").field(path).finish(),
            Self::Policy(_) => f.write_str("Policy(..)"),
            Self::DangerAcceptInvalid => f.write_str("DangerAcceptInvalid"),
        }
    }
}

// ── rustls integration ──────────────────────────────────────────────

/// `ServerCertVerifier` that hands the identity decision to a [`TrustPolicy`].
pub(crate) struct PolicyVerifier {
    policy: Arc<dyn TrustPolicy>,
    provider: Arc<CryptoProvider>,
}

impl PolicyVerifier {
    pub(crate) fn new(policy: Arc<dyn TrustPolicy>, provider: Arc<CryptoProvider>) -> Self {
        Self { policy, provider }
    }
}

impl fmt::Debug for PolicyVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyVerifier").finish_non_exhaustive()
    }
}

impl ServerCertVerifier for PolicyVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let name = server_name.to_str();
        let peer = PeerCertificate {
            der: end_entity.as_ref(),
            intermediates: intermediates.len(),
            server_name: &name,
        };

        if self.policy.accept(&peer) {
            debug!(server = %name, "peer certificate accepted by trust policy");
            Ok(ServerCertVerified::assertion())
        } else {
            warn!(server = %name, "peer certificate rejected by trust policy");
            Err(rustls::Error::InvalidCertificate(
                CertificateError::ApplicationVerificationFailure,
            ))
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
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
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
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

/// Build a rustls client config whose certificate check is `policy`.
pub(crate) fn policy_tls_config(
    policy: Arc<dyn TrustPolicy>,
) -> Result<rustls::ClientConfig, Error> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let verifier = Arc::new(PolicyVerifier::new(policy, Arc::clone(&provider)));

    let config = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(format!("unsupported TLS protocol versions: {e}")))?
        .dangerous()
        .with_custom_certificate_verifier(verifier)
        .with_no_client_auth();

    Ok(config)
}
