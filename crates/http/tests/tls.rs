use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use micro_engine::{handler_fn, BoxHandler, Config, Engine, Request, Response};
use micro_http::server::HttpEngine;
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName};
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;

struct SelfSigned {
    cert_file: NamedTempFile,
    key_file: NamedTempFile,
    der: CertificateDer<'static>,
}

fn self_signed() -> SelfSigned {
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();

    let mut cert_file = NamedTempFile::new().unwrap();
    cert_file.write_all(cert.serialize_pem().unwrap().as_bytes()).unwrap();
    let mut key_file = NamedTempFile::new().unwrap();
    key_file.write_all(cert.serialize_private_key_pem().as_bytes()).unwrap();

    SelfSigned { cert_file, key_file, der: CertificateDer::from(cert.serialize_der().unwrap()) }
}

fn connector(cert: &SelfSigned) -> TlsConnector {
    let mut roots = RootCertStore::empty();
    roots.add(cert.der.clone()).unwrap();

    let config = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();
    TlsConnector::from(Arc::new(config))
}

fn scheme() -> BoxHandler {
    Arc::new(handler_fn(|req: &mut dyn Request, res: &mut dyn Response| {
        Box::pin(async move {
            let body = format!("{} {}", req.scheme(), req.is_tls());
            res.write_all(body.as_bytes()).unwrap();
        })
    }))
}

fn tls_config(cert: &SelfSigned, read_timeout: Duration) -> (Config, SocketAddr) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap();
    let config = Config::builder()
        .listener(listener)
        .tls_cert_file(cert.cert_file.path())
        .tls_key_file(cert.key_file.path())
        .read_timeout(read_timeout)
        .build()
        .unwrap();
    (config, address)
}

async fn https_get(connector: &TlsConnector, address: SocketAddr) -> String {
    let stream = TcpStream::connect(address).await.unwrap();
    let mut stream = connector.connect(ServerName::try_from("localhost").unwrap(), stream).await.unwrap();
    stream.write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").await.unwrap();

    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await.unwrap();
    String::from_utf8(buf).unwrap()
}

#[tokio::test]
async fn serve_over_tls() {
    let cert = self_signed();
    let (config, address) = tls_config(&cert, Duration::from_secs(5));
    let mut engine = HttpEngine::new(config);
    engine.set_handler(scheme()).unwrap();
    let shutdown = engine.shutdown_handle();
    let server = tokio::spawn(async move { engine.start().await });

    let response = https_get(&connector(&cert), address).await;
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
    assert!(response.ends_with("https true"), "{response}");

    shutdown.shutdown();
    assert!(server.await.unwrap().is_ok());
}

#[tokio::test]
async fn stalled_handshake_is_dropped() {
    let cert = self_signed();
    let (config, address) = tls_config(&cert, Duration::from_millis(100));
    let mut engine = HttpEngine::new(config);
    engine.set_handler(scheme()).unwrap();
    let shutdown = engine.shutdown_handle();
    let server = tokio::spawn(async move { engine.start().await });

    let mut silent = TcpStream::connect(address).await.unwrap();
    let mut buf = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(2), silent.read_to_end(&mut buf)).await.unwrap();
    assert!(read.is_err() || buf.is_empty());

    let response = https_get(&connector(&cert), address).await;
    assert!(response.ends_with("https true"), "{response}");

    shutdown.shutdown();
    assert!(server.await.unwrap().is_ok());
}
