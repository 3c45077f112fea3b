//! Role to permission-code resolution.
//!
//! The table is loaded once at startup from a JSON document and is immutable
//! afterwards:
//!
//! ```json
//! {"roles": {"admin": ["users-read", "users-write"], "user": ["users-read"]}}
//! ```

use regex::Regex;
use serde::Deserialize;
use std::{collections::HashMap, path::Path};
use thiserror::Error;

/// Policy document compiled into the binary.
pub const EMBEDDED_POLICY: &str = include_str!("../../policy/roles.json");

pub const USERS_READ: &str = "users-read";
pub const USERS_WRITE: &str = "users-write";
pub const TEAMS_READ: &str = "teams-read";
pub const TEAMS_WRITE: &str = "teams-write";
pub const TOKENS_WRITE: &str = "tokens-write";

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("account has no role")]
    NoRole,

    #[error("invalid permission code {code:?} for role {role:?}")]
    InvalidCode { role: String, code: String },

    #[error("failed to parse policy document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to read policy file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
}

/// The permission codes granted to one role, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions(Vec<String>);

impl Permissions {
    /// Exact-match membership test.
    #[must_use]
    pub fn include(&self, code: &str) -> bool {
        self.0.iter().any(|granted| granted == code)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

pub trait PolicyStore: Send + Sync {
    /// Permission set of `role`. Unknown roles get an empty set.
    ///
    /// # Errors
    /// `PolicyError::NoRole` for an empty role.
    fn permissions_for_role(&self, role: &str) -> Result<Permissions, PolicyError>;
}

#[derive(Debug, Deserialize)]
struct PolicyDocument {
    roles: HashMap<String, Vec<String>>,
}

/// JSON-backed, read-only role table.
#[derive(Debug, Clone)]
pub struct StaticPolicy {
    roles: HashMap<String, Permissions>,
}

impl StaticPolicy {
    /// # Errors
    /// `PolicyError::Parse` for invalid JSON, `PolicyError::InvalidCode` for a
    /// code not shaped like `<resource>-<action>`.
    pub fn from_json(document: &str) -> Result<Self, PolicyError> {
        let document: PolicyDocument = serde_json::from_str(document)?;
        let code_format = Regex::new(r"^[a-z][a-z0-9_]*-[a-z][a-z0-9_]*$")
            .map_err(|err| PolicyError::InvalidCode {
                role: String::new(),
                code: err.to_string(),
            })?;

        let mut roles = HashMap::with_capacity(document.roles.len());
        for (role, codes) in document.roles {
            let mut granted: Vec<String> = Vec::with_capacity(codes.len());
            for code in codes {
                if !code_format.is_match(&code) {
                    return Err(PolicyError::InvalidCode { role, code });
                }
                if !granted.contains(&code) {
                    granted.push(code);
                }
            }
            roles.insert(role, Permissions(granted));
        }

        Ok(Self { roles })
    }

    /// # Errors
    /// See [`StaticPolicy::from_json`].
    pub fn embedded() -> Result<Self, PolicyError> {
        Self::from_json(EMBEDDED_POLICY)
    }

    /// # Errors
    /// `PolicyError::Read` when the file cannot be read, otherwise see
    /// [`StaticPolicy::from_json`].
    pub fn from_file(path: &Path) -> Result<Self, PolicyError> {
        let document = std::fs::read_to_string(path).map_err(|source| PolicyError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&document)
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.roles.keys().map(String::as_str)
    }
}

impl PolicyStore for StaticPolicy {
    fn permissions_for_role(&self, role: &str) -> Result<Permissions, PolicyError> {
        if role.is_empty() {
            return Err(PolicyError::NoRole);
        }

        Ok(self.roles.get(role).cloned().unwrap_or_default())
    }
}
