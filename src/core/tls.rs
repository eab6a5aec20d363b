//! Purpose: Pin the TLS parameters every outgoing POST negotiates with.
//! Exports: `TlsPolicy`, `AllowedSuite`, `ALLOWED_CIPHER_SUITES`, root-store helpers.
//! Role: Translate the fixed allow-list into a rustls `ClientConfig`.
//! Invariants: Only TLS 1.2 is enabled; TLS 1.3 servers fail the handshake.
//! Invariants: The crypto provider offers allow-listed suites and nothing else.
//! Notes: rustls implements no finite-field DHE, so the DHE entry is listed but never offered.
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use rustls::crypto::{CryptoProvider, aws_lc_rs};
use rustls::pki_types::CertificateDer;
use rustls::{CipherSuite, ClientConfig, RootCertStore, SupportedCipherSuite};

use super::error::{Error, ErrorKind};

pub const TLS_VERSION: &str = "TLSv1.2";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AllowedSuite {
    pub name: &'static str,
    pub iana: u16,
}

pub const ALLOWED_CIPHER_SUITES: [AllowedSuite; 3] = [
    AllowedSuite {
        name: "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
        iana: 0xc02b,
    },
    AllowedSuite {
        name: "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
        iana: 0xc02f,
    },
    AllowedSuite {
        name: "TLS_DHE_RSA_WITH_AES_128_GCM_SHA256",
        iana: 0x009e,
    },
];

impl AllowedSuite {
    fn matches(&self, suite: &SupportedCipherSuite) -> bool {
        suite.suite() == CipherSuite::from(self.iana)
    }
}

#[derive(Clone, Debug)]
pub struct TlsPolicy {
    suites: Vec<SupportedCipherSuite>,
}

impl Default for TlsPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl TlsPolicy {
    pub fn new() -> Self {
        let suites = aws_lc_rs::ALL_CIPHER_SUITES
            .iter()
            .copied()
            .filter(|suite| {
                ALLOWED_CIPHER_SUITES
                    .iter()
                    .any(|allowed| allowed.matches(suite))
            })
            .collect();
        Self { suites }
    }

    pub fn allowed_suites(&self) -> &'static [AllowedSuite] {
        &ALLOWED_CIPHER_SUITES
    }

    /// Allow-listed suites the backend will actually offer in a ClientHello.
    pub fn negotiable_suites(&self) -> Vec<&'static AllowedSuite> {
        ALLOWED_CIPHER_SUITES
            .iter()
            .filter(|allowed| self.is_negotiable(allowed))
            .collect()
    }

    pub fn unsupported_suites(&self) -> Vec<&'static AllowedSuite> {
        ALLOWED_CIPHER_SUITES
            .iter()
            .filter(|allowed| !self.is_negotiable(allowed))
            .collect()
    }

    pub fn is_negotiable(&self, allowed: &AllowedSuite) -> bool {
        self.suites.iter().any(|suite| allowed.matches(suite))
    }

    pub fn crypto_provider(&self) -> CryptoProvider {
        CryptoProvider {
            cipher_suites: self.suites.clone(),
            ..aws_lc_rs::default_provider()
        }
    }

    pub fn client_config(&self, roots: RootCertStore) -> Result<ClientConfig, Error> {
        if self.suites.is_empty() {
            return Err(Error::new(ErrorKind::Tls)
                .with_message("no allow-listed cipher suite is supported by the TLS backend"));
        }
        let config = ClientConfig::builder_with_provider(Arc::new(self.crypto_provider()))
            .with_protocol_versions(&[&rustls::version::TLS12])
            .map_err(|err| {
                Error::new(ErrorKind::Tls)
                    .with_message("TLS backend rejected the protocol policy")
                    .with_source(err)
            })?
            .with_root_certificates(roots)
            .with_no_client_auth();
        Ok(config)
    }
}

/// Bundled Mozilla trust anchors.
pub fn default_roots() -> RootCertStore {
    RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned())
}

pub fn load_pem_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, Error> {
    let cert_bytes = std::fs::read(path).map_err(|err| {
        Error::new(ErrorKind::Usage)
            .with_message(format!(
                "failed to read TLS CA/certificate file {}",
                path.display()
            ))
            .with_source(err)
    })?;
    let mut cert_reader = Cursor::new(cert_bytes);
    let certs = rustls_pemfile::certs(&mut cert_reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message(format!(
                    "failed to parse TLS CA/certificate file {}",
                    path.display()
                ))
                .with_source(err)
        })?;
    if certs.is_empty() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message(format!(
                "TLS CA/certificate file {} contains no certificates",
                path.display()
            ))
            .with_hint("Expected PEM blocks starting with -----BEGIN CERTIFICATE-----."));
    }
    Ok(certs)
}

/// Adds every parsable certificate from `path` to `roots`.
pub fn add_pem_roots(roots: &mut RootCertStore, path: &Path) -> Result<usize, Error> {
    let certs = load_pem_certs(path)?;
    let (added, _) = roots.add_parsable_certificates(certs);
    if added == 0 {
        return Err(Error::new(ErrorKind::Usage).with_message(format!(
            "TLS CA/certificate file {} contains no parsable certificates",
            path.display()
        )));
    }
    Ok(added)
}
