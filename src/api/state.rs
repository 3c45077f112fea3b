//! Shared request state and auth configuration.

use crate::{
    auth::{AuthenticationResolver, AuthorizationGate, PolicyStore, TokenService},
    store::{version::ConcurrencyGuard, SharedStore},
};
use std::{sync::Arc, time::Duration};

const DEFAULT_TOKEN_TTL_SECONDS: u64 = 24 * 60 * 60;
const DEFAULT_STORAGE_TIMEOUT_SECONDS: u64 = 3;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    token_ttl_seconds: u64,
    storage_timeout_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            token_ttl_seconds: DEFAULT_TOKEN_TTL_SECONDS,
            storage_timeout_seconds: DEFAULT_STORAGE_TIMEOUT_SECONDS,
        }
    }

    #[must_use]
    pub fn with_token_ttl_seconds(mut self, seconds: u64) -> Self {
        self.token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_storage_timeout_seconds(mut self, seconds: u64) -> Self {
        self.storage_timeout_seconds = seconds;
        self
    }

    #[must_use]
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_seconds)
    }

    #[must_use]
    pub fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage_timeout_seconds)
    }
}

/// Immutable per-process state handed to every handler.
pub struct AppState {
    pub store: SharedStore,
    pub tokens: TokenService,
    pub resolver: AuthenticationResolver,
    pub gate: AuthorizationGate,
    pub guard: ConcurrencyGuard,
    pub config: AuthConfig,
}

impl AppState {
    #[must_use]
    pub fn new(store: SharedStore, policy: Arc<dyn PolicyStore>, config: AuthConfig) -> Self {
        let tokens = TokenService::new(store.clone());

        Self {
            resolver: AuthenticationResolver::new(tokens.clone()),
            gate: AuthorizationGate::new(store.clone(), policy),
            guard: ConcurrencyGuard,
            tokens,
            store,
            config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = AuthConfig::default();
        assert_eq!(config.token_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.storage_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn builder_overrides() {
        let config = AuthConfig::new()
            .with_token_ttl_seconds(60)
            .with_storage_timeout_seconds(1);
        assert_eq!(config.token_ttl(), Duration::from_secs(60));
        assert_eq!(config.storage_timeout(), Duration::from_secs(1));
    }
}
