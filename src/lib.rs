//! Purpose: Library crate behind the `formpost` CLI: one blocking, TLS-restricted form POST.
//! Exports: `api` (send_post, HttpProvider, FormBody, TlsPolicy, errors).
//! Role: Callers post a URL-encoded form and get back a JSON object or nothing.
//! Invariants: No retries, no background threads; each call blocks up to its timeout.
//! Invariants: Core modules stay private; `api` is the public boundary.
pub mod api;
mod core;
