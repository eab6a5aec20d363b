//! Purpose: Define the stable public Rust API boundary for formpost.
//! Exports: Blocking POST helpers, form bodies, TLS policy, and error types.
//! Role: Public, additive-only surface; hides internal core modules.
//! Invariants: This module is the only public path to core primitives.

mod provider;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::form::{FORM_CONTENT_TYPE, FormBody};
pub use crate::core::tls::{ALLOWED_CIPHER_SUITES, AllowedSuite, TLS_VERSION, TlsPolicy};
pub use provider::{CALL_TIMEOUT, HttpProvider, JsonObject, send_post};
