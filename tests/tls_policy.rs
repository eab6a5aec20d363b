//! Purpose: Verify the TLS allow-list against a local rustls server.
//! Exports: None (integration test module).
//! Role: Prove that only TLS 1.2 with an allow-listed suite completes a handshake.
//! Invariants: Certificates are generated per test with rcgen and trusted via a temp CA file.
//! Invariants: Each server thread handles exactly one connection.

use formpost::api::{ErrorKind, FormBody, HttpProvider};
use rcgen::{Certificate, CertificateParams, SanType};
use rustls::crypto::{CryptoProvider, aws_lc_rs};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{
    ServerConfig, ServerConnection, StreamOwned, SupportedCipherSuite, SupportedProtocolVersion,
};
use std::io::{self, Read, Write};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::Duration;

type TestResult<T> = Result<T, Box<dyn std::error::Error>>;

const REPLY: &str = r#"{"secure":true,"session":"abc"}"#;

struct Identity {
    cert_der: Vec<u8>,
    key_der: Vec<u8>,
    ca_file: tempfile::NamedTempFile,
}

impl Identity {
    fn generate() -> TestResult<Self> {
        let mut params = CertificateParams::new(vec!["localhost".to_string()]);
        params
            .subject_alt_names
            .push(SanType::IpAddress(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        let cert = Certificate::from_params(params)?;
        let mut ca_file = tempfile::NamedTempFile::new()?;
        ca_file.write_all(cert.serialize_pem()?.as_bytes())?;
        ca_file.flush()?;
        Ok(Self {
            cert_der: cert.serialize_der()?,
            key_der: cert.serialize_private_key_der(),
            ca_file,
        })
    }

    fn trusting_provider(&self) -> TestResult<HttpProvider> {
        Ok(HttpProvider::new()?
            .with_timeout(Duration::from_secs(5))
            .with_tls_ca_file(self.ca_file.path())?)
    }
}

struct TlsServer {
    addr: SocketAddr,
    requests: Receiver<String>,
}

impl TlsServer {
    fn start(
        identity: &Identity,
        suites: Vec<SupportedCipherSuite>,
        versions: &[&'static SupportedProtocolVersion],
    ) -> TestResult<Self> {
        let provider = CryptoProvider {
            cipher_suites: suites,
            ..aws_lc_rs::default_provider()
        };
        let config = ServerConfig::builder_with_provider(Arc::new(provider))
            .with_protocol_versions(versions)?
            .with_no_client_auth()
            .with_single_cert(
                vec![CertificateDer::from(identity.cert_der.clone())],
                PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(identity.key_der.clone())),
            )?;
        let config = Arc::new(config);

        let listener = TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            if let Ok((stream, _)) = listener.accept() {
                if let Ok(request) = serve_one(config, stream) {
                    let _ = tx.send(request);
                }
            }
        });
        Ok(Self { addr, requests: rx })
    }

    fn url(&self) -> String {
        format!("https://{}/login", self.addr)
    }
}

fn serve_one(config: Arc<ServerConfig>, stream: TcpStream) -> io::Result<String> {
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    let conn = ServerConnection::new(config).map_err(io::Error::other)?;
    let mut tls = StreamOwned::new(conn, stream);
    let request = read_request(&mut tls)?;

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{REPLY}",
        REPLY.len()
    );
    tls.write_all(response.as_bytes())?;
    tls.conn.send_close_notify();
    tls.flush()?;
    Ok(request)
}

fn read_request(stream: &mut impl Read) -> io::Result<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        let read = stream.read(&mut chunk)?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before headers",
            ));
        }
        buf.extend_from_slice(&chunk[..read]);
        if let Some(pos) = buf.windows(4).position(|window| window == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            name.eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let read = stream.read(&mut chunk)?;
        if read == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..read]);
    }
    Ok(String::from_utf8_lossy(&buf).to_string())
}

fn form() -> FormBody {
    FormBody::from_pairs([("user", "alice"), ("pass", "secret")])
}

#[test]
fn allow_listed_suite_completes_handshake() -> TestResult<()> {
    let identity = Identity::generate()?;
    let server = TlsServer::start(
        &identity,
        vec![aws_lc_rs::cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256],
        &[&rustls::version::TLS12],
    )?;
    let provider = identity.trusting_provider()?;

    let object = provider
        .send_post(&server.url(), &form())
        .ok_or("expected a json object")?;
    assert_eq!(object.get("secure"), Some(&serde_json::Value::Bool(true)));
    assert_eq!(object.get("session"), Some(&serde_json::json!("abc")));

    let request = server.requests.recv_timeout(Duration::from_secs(5))?;
    assert!(request.starts_with("POST /login HTTP/1.1\r\n"), "{request}");
    let lowered = request.to_ascii_lowercase();
    assert!(lowered.contains("content-type: application/x-www-form-urlencoded\r\n"));
    assert!(request.ends_with("user=alice&pass=secret"), "{request}");
    Ok(())
}

#[test]
fn suite_outside_allow_list_fails_handshake() -> TestResult<()> {
    let identity = Identity::generate()?;
    let server = TlsServer::start(
        &identity,
        vec![aws_lc_rs::cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384],
        &[&rustls::version::TLS12],
    )?;
    let provider = identity.trusting_provider()?;

    let err = provider
        .post_form(&server.url(), &form())
        .expect_err("handshake should fail");
    assert!(
        matches!(err.kind(), ErrorKind::Tls | ErrorKind::Io),
        "unexpected kind {:?}",
        err.kind()
    );
    assert!(server.requests.recv_timeout(Duration::from_secs(1)).is_err());
    Ok(())
}

#[test]
fn chacha_only_server_is_rejected() -> TestResult<()> {
    let identity = Identity::generate()?;
    let server = TlsServer::start(
        &identity,
        vec![aws_lc_rs::cipher_suite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256],
        &[&rustls::version::TLS12],
    )?;
    let provider = identity.trusting_provider()?;

    assert!(provider.send_post(&server.url(), &form()).is_none());
    Ok(())
}

#[test]
fn tls13_only_server_is_rejected() -> TestResult<()> {
    let identity = Identity::generate()?;
    let server = TlsServer::start(
        &identity,
        vec![aws_lc_rs::cipher_suite::TLS13_AES_128_GCM_SHA256],
        &[&rustls::version::TLS13],
    )?;
    let provider = identity.trusting_provider()?;

    assert!(provider.send_post(&server.url(), &form()).is_none());
    Ok(())
}

#[test]
fn untrusted_certificate_is_tls_error() -> TestResult<()> {
    let identity = Identity::generate()?;
    let server = TlsServer::start(
        &identity,
        vec![aws_lc_rs::cipher_suite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256],
        &[&rustls::version::TLS12],
    )?;
    let provider = HttpProvider::new()?;

    let err = provider
        .post_form(&server.url(), &form())
        .expect_err("unknown issuer should fail");
    assert_eq!(err.kind(), ErrorKind::Tls);
    assert!(err.hint().is_some());
    Ok(())
}
