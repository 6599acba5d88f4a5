//! TLS credential loading.
//!
//! The acceptor advertises `h2` and `http/1.1` through ALPN, so RPC clients
//! negotiate HTTP/2 during the handshake and browsers keep HTTP/1.1.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::TlsAcceptor;

use crate::error::ServerError;

/// ALPN protocols offered, in preference order.
pub const ALPN_PROTOCOLS: &[&[u8]] = &[b"h2", b"http/1.1"];

/// PEM certificate chain and private key paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    /// Certificate chain.
    pub cert: PathBuf,
    /// Private key (PKCS#8, PKCS#1 or SEC1).
    pub key: PathBuf,
}

impl TlsFiles {
    /// Creates the pair.
    pub fn new(cert: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        Self {
            cert: cert.into(),
            key: key.into(),
        }
    }

    /// Loads both files and builds the acceptor.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Tls`] if a file is unreadable, holds no usable
    /// PEM item, or the key does not match the certificate.
    pub fn acceptor(&self) -> Result<TlsAcceptor, ServerError> {
        let certs = load_certs(&self.cert)?;
        let key = load_key(&self.key)?;

        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let mut config = rustls::ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()
            .map_err(|e| ServerError::tls(&self.cert, e.to_string()))?
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(|e| ServerError::tls(&self.key, e.to_string()))?;
        config.alpn_protocols = ALPN_PROTOCOLS.iter().map(|p| p.to_vec()).collect();

        Ok(TlsAcceptor::from(Arc::new(config)))
    }
}

fn open(path: &Path) -> Result<BufReader<File>, ServerError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| ServerError::tls(path, e.to_string()))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ServerError> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ServerError::tls(path, e.to_string()))?;
    if certs.is_empty() {
        return Err(ServerError::tls(path, "no certificate found"));
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, ServerError> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|e| ServerError::tls(path, e.to_string()))?
        .ok_or_else(|| ServerError::tls(path, "no private key found"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_tls_error() {
        let files = TlsFiles::new("/nonexistent/cert.pem", "/nonexistent/key.pem");
        let Err(err) = files.acceptor() else {
            panic!("acceptor built from missing files");
        };
        assert!(matches!(err, ServerError::Tls { ref path, .. } if path.ends_with("cert.pem")));
    }

    #[test]
    fn file_without_pem_items_is_rejected() {
        let mut cert = tempfile::NamedTempFile::new().unwrap();
        writeln!(cert, "not a certificate").unwrap();
        let err = load_certs(cert.path()).unwrap_err();
        assert!(err.to_string().contains("no certificate found"));

        let err = load_key(cert.path()).unwrap_err();
        assert!(err.to_string().contains("no private key found"));
    }

    #[test]
    fn self_signed_pair_loads() {
        let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let files = TlsFiles::new(dir.path().join("cert.pem"), dir.path().join("key.pem"));
        std::fs::write(&files.cert, generated.cert.pem()).unwrap();
        std::fs::write(&files.key, generated.key_pair.serialize_pem()).unwrap();
        assert!(files.acceptor().is_ok());
    }

    #[test]
    fn alpn_prefers_h2() {
        assert_eq!(ALPN_PROTOCOLS[0], b"h2");
    }
}
