// Core modules: error modeling, form encoding, TLS policy.
pub mod error;
pub mod form;
pub mod tls;
