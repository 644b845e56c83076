//! TLS acceptor construction from PEM files.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use micro_engine::EngineError;
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

/// Builds an acceptor from a certificate chain and a private key, both PEM encoded.
pub fn load_acceptor(cert_file: &Path, key_file: &Path) -> Result<TlsAcceptor, EngineError> {
    let certs = load_certs(cert_file)?;
    let key = load_private_key(key_file)?;

    let mut config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(EngineError::tls)?
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(EngineError::tls)?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn open(path: &Path) -> Result<BufReader<File>, EngineError> {
    File::open(path).map(BufReader::new).map_err(|e| EngineError::tls(format!("can't open {}: {e}", path.display())))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, EngineError> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| EngineError::tls(format!("invalid certificate in {}: {e}", path.display())))?;

    if certs.is_empty() {
        return Err(EngineError::tls(format!("no certificate found in {}", path.display())));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, EngineError> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|e| EngineError::tls(format!("invalid private key in {}: {e}", path.display())))?
        .ok_or_else(|| EngineError::tls(format!("no private key found in {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn reason(result: Result<TlsAcceptor, EngineError>) -> String {
        match result {
            Err(EngineError::Tls { reason }) => reason,
            Err(e) => panic!("unexpected error {e}"),
            Ok(_) => panic!("expect error"),
        }
    }

    #[test]
    fn missing_cert_file() {
        let reason = reason(load_acceptor(Path::new("/no/such/cert.pem"), Path::new("/no/such/key.pem")));
        assert!(reason.starts_with("can't open /no/such/cert.pem"));
    }

    #[test]
    fn file_without_certificate() {
        let mut cert = NamedTempFile::new().unwrap();
        writeln!(cert, "not a pem file").unwrap();

        let reason = reason(load_acceptor(cert.path(), cert.path()));
        assert!(reason.starts_with("no certificate found in"));
    }
}
