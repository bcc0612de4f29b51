//! Certificate trust policy against a local endpoint with a self-signed
//! certificate.

use idbridge_provider::config::{TlsTrust, TransportConfig};
use idbridge_provider::{ProviderError, Transport};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_native_tls::native_tls;

/// Serves `ok` over TLS until the test ends. Returns the base URL.
async fn start_self_signed_server() -> String {
    let certified = rcgen::generate_simple_self_signed(vec![
        "localhost".to_string(),
        "127.0.0.1".to_string(),
    ])
    .unwrap();
    let identity = native_tls::Identity::from_pkcs8(
        certified.cert.pem().as_bytes(),
        certified.key_pair.serialize_pem().as_bytes(),
    )
    .unwrap();
    let acceptor = tokio_native_tls::TlsAcceptor::from(native_tls::TlsAcceptor::new(identity).unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                return;
            };
            let acceptor = acceptor.clone();
            tokio::spawn(async move {
                // Handshakes from validating clients fail here.
                let Ok(mut tls) = acceptor.accept(stream).await else {
                    return;
                };
                let mut buf = [0u8; 4096];
                let _ = tls.read(&mut buf).await;
                let _ = tls
                    .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok")
                    .await;
                let _ = tls.shutdown().await;
            });
        }
    });

    format!("https://127.0.0.1:{}/", addr.port())
}

#[tokio::test]
async fn test_validate_rejects_self_signed_certificate() {
    let url = start_self_signed_server().await;
    let transport = Transport::provision(&TransportConfig::default(), Vec::new()).unwrap();

    let err = transport.execute(transport.get(&url)).await.unwrap_err();
    assert!(matches!(err, ProviderError::Network(_)), "{err}");
}

#[tokio::test]
async fn test_accept_all_trusts_self_signed_certificate() {
    let url = start_self_signed_server().await;
    let config = TransportConfig {
        tls_trust: TlsTrust::AcceptAll,
        ..TransportConfig::default()
    };
    let transport = Transport::provision(&config, Vec::new()).unwrap();

    let response = transport.execute(transport.get(&url)).await.unwrap();
    assert!(response.status().is_success());
    assert_eq!(response.body(), "ok");
}
