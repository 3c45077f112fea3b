//! # sqlm-auth (account, team and token authority)
//!
//! `sqlm-auth` issues and validates bearer tokens, enforces role-based
//! permission checks on protected operations and keeps optimistic-concurrency
//! invariants on mutable account and team records.
//!
//! ## Tokens
//!
//! A token is 16 random bytes from the OS CSPRNG, encoded as unpadded
//! URL-safe base64 and prefixed with a scope tag (`sml_` for login, `smr_`
//! for read-only). Only the SHA-256 digest of the full string is stored; the
//! plaintext is handed to the caller exactly once. Expired and unknown tokens
//! are indistinguishable.
//!
//! ## Authorization
//!
//! Roles map to permission codes (`<resource>-<action>`) through a static
//! JSON policy loaded at startup. Every check re-reads the caller's role from
//! storage and fails closed: anonymous callers, empty roles and lookup errors
//! never grant access.
//!
//! ## Versioned records
//!
//! Accounts and teams carry a `version` starting at 1. Updates and deletes
//! must present the last-known version and are applied with a single
//! compare-and-swap statement; losing writers get `409 Conflict`.

pub mod api;
pub mod auth;
pub mod cli;
pub mod error;
pub mod model;
pub mod store;

pub use error::{Error, FieldErrors};

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
