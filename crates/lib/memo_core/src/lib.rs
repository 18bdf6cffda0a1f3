//! # memo_core
//!
//! Authentication core for the memo backend: credentials, policy, token
//! rotation and the stores they live in.

pub mod auth;
pub mod models;
pub mod store;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
