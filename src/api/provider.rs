//! Purpose: Blocking form POST that yields a JSON object or nothing.
//! Exports: `HttpProvider`, `send_post`, `JsonObject`, `CALL_TIMEOUT`.
//! Role: Thin wrapper over a policy-restricted `ureq` agent; one request per call.
//! Invariants: Every request is POST with `Content-Type: application/x-www-form-urlencoded`.
//! Invariants: A single deadline bounds DNS, connect, write and read.
//! Invariants: `send_post` never returns an error; failures are logged and collapse to `None`.
//! Notes: No retries. Non-2xx bodies are logged, never parsed.
use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use rustls::{ClientConfig, RootCertStore};
use serde_json::{Map, Value};
use tracing::{debug, error, warn};

use crate::core::error::{Error, ErrorKind};
use crate::core::form::{FORM_CONTENT_TYPE, FormBody};
use crate::core::tls::{self, TlsPolicy};

pub type JsonObject = Map<String, Value>;

type ApiResult<T> = Result<T, Error>;

pub const CALL_TIMEOUT: Duration = Duration::from_millis(5000);

static DEFAULT_PROVIDER: OnceLock<Option<HttpProvider>> = OnceLock::new();

/// Posts `form` to `url` with the process-wide default provider.
///
/// Blocks for at most [`CALL_TIMEOUT`]. Returns `None` on transport failure,
/// non-2xx status, or a body that is not a JSON object.
pub fn send_post(url: &str, form: &FormBody) -> Option<JsonObject> {
    default_provider()?.send_post(url, form)
}

fn default_provider() -> Option<&'static HttpProvider> {
    DEFAULT_PROVIDER
        .get_or_init(|| match HttpProvider::new() {
            Ok(provider) => Some(provider),
            Err(err) => {
                error!(error = %describe(&err), "failed to build default http provider");
                None
            }
        })
        .as_ref()
}

#[derive(Clone)]
pub struct HttpProvider {
    inner: Arc<HttpProviderInner>,
}

struct HttpProviderInner {
    agent: ureq::Agent,
    timeout: Duration,
    policy: TlsPolicy,
    roots: RootCertStore,
    tls_config: Arc<ClientConfig>,
}

impl fmt::Debug for HttpProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpProvider")
            .field("timeout", &self.inner.timeout)
            .field("policy", &self.inner.policy)
            .field("roots", &self.inner.roots.len())
            .finish()
    }
}

impl HttpProvider {
    pub fn new() -> ApiResult<Self> {
        Self::build(TlsPolicy::new(), tls::default_roots(), CALL_TIMEOUT)
    }

    fn build(policy: TlsPolicy, roots: RootCertStore, timeout: Duration) -> ApiResult<Self> {
        let unsupported = policy.unsupported_suites();
        if !unsupported.is_empty() {
            let names: Vec<_> = unsupported.iter().map(|suite| suite.name).collect();
            debug!(suites = ?names, "allow-listed cipher suites not offered by TLS backend");
        }
        let tls_config = Arc::new(policy.client_config(roots.clone())?);
        let agent = build_agent(&tls_config, timeout);
        Ok(Self {
            inner: Arc::new(HttpProviderInner {
                agent,
                timeout,
                policy,
                roots,
                tls_config,
            }),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        let agent = build_agent(&self.inner.tls_config, timeout);
        if let Some(inner) = Arc::get_mut(&mut self.inner) {
            inner.agent = agent;
            inner.timeout = timeout;
        } else {
            self.inner = Arc::new(HttpProviderInner {
                agent,
                timeout,
                policy: self.inner.policy.clone(),
                roots: self.inner.roots.clone(),
                tls_config: self.inner.tls_config.clone(),
            });
        }
        self
    }

    /// Trusts the PEM certificates in `path` in addition to the bundled roots.
    pub fn with_tls_ca_file(self, path: impl AsRef<Path>) -> ApiResult<Self> {
        let mut roots = self.inner.roots.clone();
        tls::add_pem_roots(&mut roots, path.as_ref())?;
        Self::build(self.inner.policy.clone(), roots, self.inner.timeout)
    }

    pub fn timeout(&self) -> Duration {
        self.inner.timeout
    }

    pub fn policy(&self) -> &TlsPolicy {
        &self.inner.policy
    }

    pub fn send_post(&self, url: &str, form: &FormBody) -> Option<JsonObject> {
        match self.post_form(url, form) {
            Ok(object) => Some(object),
            Err(err) => {
                log_failure(&err);
                None
            }
        }
    }

    pub fn post_form(&self, url: &str, form: &FormBody) -> ApiResult<JsonObject> {
        debug!(
            url,
            fields = ?field_names(form),
            body_len = form.as_str().len(),
            "sending form post"
        );
        let response = self
            .inner
            .agent
            .post(url)
            .set("Content-Type", FORM_CONTENT_TYPE)
            .send_string(form.as_str());

        match response {
            // ureq hands back unfollowed 1xx/3xx replies as Ok.
            Ok(resp) if !(200..300).contains(&resp.status()) => {
                let code = resp.status();
                Err(status_error(code, resp).with_url(url))
            }
            Ok(resp) => read_json_object(resp).map_err(|err| err.with_url(url)),
            Err(ureq::Error::Status(code, resp)) => Err(status_error(code, resp).with_url(url)),
            Err(ureq::Error::Transport(err)) => Err(transport_error(err).with_url(url)),
        }
    }
}

// Values stay out of logs; they are usually credentials.
fn field_names(form: &FormBody) -> Vec<String> {
    form.pairs().into_iter().map(|(key, _)| key).collect()
}

fn build_agent(tls_config: &Arc<ClientConfig>, timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout(timeout)
        .tls_config(tls_config.clone())
        .build()
}

fn read_json_object(response: ureq::Response) -> ApiResult<JsonObject> {
    let body = response.into_string().map_err(|err| {
        let kind = if is_timeout(&err) {
            ErrorKind::Timeout
        } else {
            ErrorKind::Io
        };
        Error::new(kind)
            .with_message("failed to read response body")
            .with_source(err)
    })?;
    parse_json_object(&body)
}

fn parse_json_object(body: &str) -> ApiResult<JsonObject> {
    let value: Value = serde_json::from_str(body).map_err(|err| {
        Error::new(ErrorKind::Parse)
            .with_message("invalid response json")
            .with_source(err)
    })?;
    match value {
        Value::Object(object) => Ok(object),
        other => Err(Error::new(ErrorKind::Parse).with_message(format!(
            "response json is {}, expected an object",
            json_type_name(&other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn status_error(status: u16, response: ureq::Response) -> Error {
    let body = match response.into_string() {
        Ok(body) => body,
        Err(err) => {
            warn!(status, error = %err, "failed to read error response body");
            String::new()
        }
    };
    Error::new(ErrorKind::Status)
        .with_message(format!("server returned status {status}"))
        .with_status(status)
        .with_body(body)
}

fn transport_error(err: ureq::Transport) -> Error {
    let kind = match err.kind() {
        ureq::ErrorKind::InvalidUrl | ureq::ErrorKind::UnknownScheme => ErrorKind::Usage,
        _ if is_tls_failure(&err) => ErrorKind::Tls,
        _ if is_timeout(&err) => ErrorKind::Timeout,
        _ => ErrorKind::Io,
    };
    let message = match kind {
        ErrorKind::Usage => "invalid request url",
        ErrorKind::Tls => "TLS handshake failed",
        ErrorKind::Timeout => "request timed out",
        _ => "request failed",
    };
    let mut out = Error::new(kind).with_message(message);
    if kind == ErrorKind::Tls {
        out = out.with_hint("The server must accept TLS 1.2 with an allow-listed cipher suite.");
    }
    out.with_source(err)
}

fn is_tls_failure(err: &(dyn StdError + 'static)) -> bool {
    chain_contains(err, &|cause| cause.downcast_ref::<rustls::Error>().is_some())
}

fn is_timeout(err: &(dyn StdError + 'static)) -> bool {
    chain_contains(err, &|cause| {
        cause.downcast_ref::<io::Error>().is_some_and(|io_err| {
            matches!(
                io_err.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            )
        })
    })
}

// io::Error hides its payload from `source()`, so unwrap it explicitly.
fn chain_contains<F>(err: &(dyn StdError + 'static), matches: &F) -> bool
where
    F: Fn(&(dyn StdError + 'static)) -> bool,
{
    if matches(err) {
        return true;
    }
    if let Some(inner) = err.downcast_ref::<io::Error>().and_then(io::Error::get_ref) {
        if chain_contains(inner, matches) {
            return true;
        }
    }
    err.source()
        .is_some_and(|source| chain_contains(source, matches))
}

fn log_failure(err: &Error) {
    match err.kind() {
        ErrorKind::Status => {
            error!(
                target: "bad_request",
                status = err.status(),
                url = err.url(),
                body = err.body().unwrap_or_default(),
                "server rejected form post"
            );
        }
        kind => {
            warn!(kind = ?kind, url = err.url(), error = %describe(err), "form post failed");
        }
    }
}

fn describe(err: &Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        out.push_str(": ");
        out.push_str(&cause.to_string());
        source = cause.source();
    }
    out
}
