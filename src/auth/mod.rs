//! Credentials, tokens and permission checks.

pub mod authenticate;
pub mod authorize;
pub mod password;
pub mod policy;
pub mod token;

pub use authenticate::AuthenticationResolver;
pub use authorize::AuthorizationGate;
pub use password::{CredentialError, PasswordHash};
pub use policy::{Permissions, PolicyError, PolicyStore, StaticPolicy};
pub use token::{Scope, Token, TokenError, TokenHash, TokenService};
