#![allow(clippy::unwrap_used)]
// Certificate trust against a local TLS portal with a self-issued certificate.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rustls_pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use url::Url;

use devportal_api::{
    ConnectionContext, PeerCertificate, PinnedCertificates, PortalClient, QueryString,
    TransportConfig, TrustMode,
};

const BODY: &[u8] = br#"{"Status":"ok"}"#;

// ── Helpers ─────────────────────────────────────────────────────────

struct DeviceCertificate {
    cert: CertificateDer<'static>,
    key: Vec<u8>,
}

fn self_signed() -> DeviceCertificate {
    let generated = rcgen::generate_simple_self_signed(vec!["127.0.0.1".to_owned()]).unwrap();
    DeviceCertificate {
        cert: CertificateDer::from(generated.serialize_der().unwrap()),
        key: generated.serialize_private_key_der(),
    }
}

/// Serve a fixed JSON body over TLS until the test ends.
async fn start_portal(device: &DeviceCertificate) -> SocketAddr {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let config = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_single_cert(
            vec![device.cert.clone()],
            PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(device.key.clone())),
        )
        .unwrap();
    let acceptor = TlsAcceptor::from(Arc::new(config));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((tcp, _)) = listener.accept().await {
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                let Ok(mut tls) = acceptor.accept(tcp).await else {
                    return;
                };

                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match tls.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }

                let head = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    BODY.len()
                );
                if tls.write_all(head.as_bytes()).await.is_ok() && tls.write_all(BODY).await.is_ok() {
                    tls.shutdown().await.ok();
                }
            });
        }
    });

    addr
}

fn client_for(addr: SocketAddr, trust: TrustMode) -> PortalClient {
    let base_url = Url::parse(&format!("https://{addr}")).unwrap();
    let context = ConnectionContext::new(base_url).with_trust(trust);
    PortalClient::new(context, &TransportConfig::default()).unwrap()
}

// ── Trust policies ──────────────────────────────────────────────────

#[tokio::test]
async fn test_rejecting_policy_is_transport_error() {
    let device = self_signed();
    let addr = start_portal(&device).await;

    let consulted = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&consulted);
    let policy = move |peer: &PeerCertificate<'_>| {
        if peer.server_name == "127.0.0.1" {
            seen.fetch_add(1, Ordering::SeqCst);
        }
        false
    };

    let client = client_for(addr, TrustMode::policy(policy));
    let err = client
        .get("api/os/info", &QueryString::new())
        .await
        .unwrap_err();

    assert!(err.is_transport(), "expected transport error, got: {err:?}");
    assert!(consulted.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn test_pinned_certificate_is_accepted() {
    let device = self_signed();
    let addr = start_portal(&device).await;

    let pinned = PinnedCertificates::new([device.cert.clone()]);
    let client = client_for(addr, TrustMode::policy(pinned));

    let body = client
        .get("api/os/info", &QueryString::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&body[..], BODY);
}

#[tokio::test]
async fn test_certificate_pinned_for_another_device_is_rejected() {
    let device = self_signed();
    let addr = start_portal(&device).await;

    let other = self_signed();
    let client = client_for(addr, TrustMode::policy(PinnedCertificates::new([other.cert])));

    let err = client
        .get("api/os/info", &QueryString::new())
        .await
        .unwrap_err();
    assert!(err.is_transport(), "expected transport error, got: {err:?}");
}

#[tokio::test]
async fn test_system_roots_reject_self_issued_certificate() {
    let device = self_signed();
    let addr = start_portal(&device).await;

    let err = client_for(addr, TrustMode::System)
        .get("api/os/info", &QueryString::new())
        .await
        .unwrap_err();
    assert!(err.is_transport(), "expected transport error, got: {err:?}");
}

#[tokio::test]
async fn test_accept_any_reaches_self_issued_portal() {
    let device = self_signed();
    let addr = start_portal(&device).await;

    let body = client_for(addr, TrustMode::DangerAcceptInvalid)
        .get("api/os/info", &QueryString::new())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&body[..], BODY);
}
