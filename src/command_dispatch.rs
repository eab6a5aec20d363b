//! Purpose: Hold top-level CLI command dispatch for `formpost`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: `post` goes through `HttpProvider::post_form` so failures keep their kind.

use std::io::Read;
use std::time::Duration;

use formpost::api::{FormBody, HttpProvider, TLS_VERSION, TlsPolicy};

use super::*;

pub(super) fn dispatch_command(command: Command) -> Result<RunOutcome, Error> {
    match command {
        Command::Post {
            url,
            fields,
            data,
            timeout_ms,
            tls_ca,
        } => {
            if timeout_ms == 0 {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("--timeout-ms must be greater than zero"));
            }
            let form = build_form(&fields, data.as_deref())?;
            let mut provider =
                HttpProvider::new()?.with_timeout(Duration::from_millis(timeout_ms));
            if let Some(path) = tls_ca {
                provider = provider.with_tls_ca_file(path)?;
            }
            let object = provider.post_form(&url, &form)?;
            emit_json(Value::Object(object));
            Ok(RunOutcome::ok())
        }
        Command::Policy => {
            emit_json(policy_json(&TlsPolicy::new()));
            Ok(RunOutcome::ok())
        }
        Command::Completion { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            clap_complete::aot::generate(shell, &mut cmd, "formpost", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
    }
}

fn build_form(fields: &[String], data: Option<&str>) -> Result<FormBody, Error> {
    match data {
        Some("-") => {
            let mut encoded = String::new();
            io::stdin().read_to_string(&mut encoded).map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to read form body from stdin")
                    .with_source(err)
            })?;
            Ok(FormBody::from_encoded(encoded.trim_end_matches(['\r', '\n'])))
        }
        Some(encoded) => Ok(FormBody::from_encoded(encoded)),
        None => {
            let pairs = fields
                .iter()
                .map(|field| parse_field(field))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(FormBody::from_pairs(pairs))
        }
    }
}

fn parse_field(field: &str) -> Result<(&str, &str), Error> {
    match field.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => Err(Error::new(ErrorKind::Usage)
            .with_message(format!("invalid form field `{field}`"))
            .with_hint("Use KEY=VALUE, for example `-F user=alice`.")),
    }
}

fn policy_json(policy: &TlsPolicy) -> Value {
    let suites = policy
        .allowed_suites()
        .iter()
        .map(|suite| {
            json!({
                "name": suite.name,
                "iana": format!("0x{:04X}", suite.iana),
                "negotiable": policy.is_negotiable(suite),
            })
        })
        .collect::<Vec<_>>();
    json!({
        "tls_version": TLS_VERSION,
        "cipher_suites": suites,
        "timeout_ms": formpost::api::CALL_TIMEOUT.as_millis() as u64,
    })
}
