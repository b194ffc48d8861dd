//! Configuration for the authorization and resource servers.
//!
//! Everything the engines need (issuer, audience, key identity, lifetimes,
//! registered clients) is carried in an explicit [`Config`] handed to them at
//! construction. Nothing is read from globals.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use chrono::TimeDelta;

use crate::oauth::types::{Client, ClientRegistry, SubjectClaims};

/// Protocol defaults.
pub mod defaults {
    use std::time::Duration;

    /// Issuer placed in `iss` and expected by the resource guard.
    pub const ISSUER: &str = "http://localhost:3000";

    /// Audience the resource guard expects in `aud`.
    pub const AUDIENCE: &str = "demo-client";

    /// Key id published in the JWKS and stamped in every token header.
    pub const KEY_ID: &str = "demo-key-1";

    /// Authorization code lifetime: 5 minutes.
    pub const AUTH_CODE_TTL_SECS: i64 = 5 * 60;

    /// Access token lifetime: 15 minutes.
    pub const ACCESS_TOKEN_TTL_SECS: i64 = 15 * 60;

    /// Refresh token lifetime: 30 days.
    pub const REFRESH_TOKEN_TTL_SECS: i64 = 30 * 24 * 3600;

    /// RSA modulus size for generated keys.
    pub const RSA_KEY_BITS: usize = 2048;

    /// How long fetched JWKS keys are trusted before refetching.
    pub const JWKS_CACHE_TTL: Duration = Duration::from_secs(600);

    /// Minimum interval between JWKS refetches triggered by an unknown `kid`.
    pub const JWKS_REFETCH_COOLDOWN: Duration = Duration::from_secs(30);

    /// Maximum cached keys.
    pub const JWKS_CACHE_MAX_SIZE: u64 = 64;

    /// Request timeout for JWKS fetches.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    /// Connection timeout for JWKS fetches.
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

    /// Demo client registered when no clients file is given.
    pub const DEMO_CLIENT_ID: &str = "demo-client";

    /// Redirect URI registered for the demo client.
    pub const DEMO_REDIRECT_URI: &str = "http://localhost:4000/callback";

    /// Scope the demo profile endpoint requires.
    pub const PROFILE_SCOPE: &str = "api.read";
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Issuer URL (`iss`).
    pub issuer: String,

    /// Audience the resource guard requires (`aud`).
    pub audience: String,

    /// Key id of the signing key.
    pub key_id: String,

    /// PEM private key. A key is generated at startup when unset.
    pub private_key_path: Option<PathBuf>,

    /// Registered clients.
    pub clients: Vec<Client>,

    /// Claims returned by the identity collaborator.
    pub subject: SubjectClaims,

    pub auth_code_ttl: TimeDelta,
    pub access_token_ttl: TimeDelta,
    pub refresh_token_ttl: TimeDelta,

    /// Remote JWKS for the resource guard. Verifies locally when unset.
    pub jwks_url: Option<String>,

    pub jwks_cache_ttl: Duration,
    pub jwks_cache_max_size: u64,

    /// A token naming an unknown `kid` refetches the JWKS at most once per this interval.
    pub jwks_refetch_cooldown: Duration,

    pub request_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Config {
    /// Create a configuration for the given issuer and audience with default lifetimes.
    #[must_use]
    pub fn new(issuer: impl Into<String>, audience: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
            audience: audience.into(),
            key_id: defaults::KEY_ID.to_string(),
            private_key_path: None,
            clients: vec![demo_client()],
            subject: demo_subject(),
            auth_code_ttl: TimeDelta::seconds(defaults::AUTH_CODE_TTL_SECS),
            access_token_ttl: TimeDelta::seconds(defaults::ACCESS_TOKEN_TTL_SECS),
            refresh_token_ttl: TimeDelta::seconds(defaults::REFRESH_TOKEN_TTL_SECS),
            jwks_url: None,
            jwks_cache_ttl: defaults::JWKS_CACHE_TTL,
            jwks_cache_max_size: defaults::JWKS_CACHE_MAX_SIZE,
            jwks_refetch_cooldown: defaults::JWKS_REFETCH_COOLDOWN,
            request_timeout: defaults::REQUEST_TIMEOUT,
            connect_timeout: defaults::CONNECT_TIMEOUT,
        }
    }

    /// Create a test configuration pointing the resource guard at a mock JWKS server.
    #[must_use]
    pub fn for_testing(jwks_base_url: &str) -> Self {
        Self {
            jwks_url: Some(format!("{jwks_base_url}/.well-known/jwks.json")),
            jwks_cache_ttl: Duration::from_secs(60),
            request_timeout: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(1),
            ..Self::default()
        }
    }

    /// Replace the registered clients with those in a JSON file.
    ///
    /// The file holds an array of `{"id": .., "allowed_redirect_uris": [..]}`.
    pub fn with_clients_file(mut self, path: impl AsRef<Path>) -> anyhow::Result<Self> {
        self.clients = load_clients(path.as_ref())?;
        Ok(self)
    }

    /// Build the immutable client lookup.
    #[must_use]
    pub fn client_registry(&self) -> ClientRegistry {
        ClientRegistry::new(self.clients.iter().cloned())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(defaults::ISSUER, defaults::AUDIENCE)
    }
}

fn demo_client() -> Client {
    Client::new(defaults::DEMO_CLIENT_ID, [defaults::DEMO_REDIRECT_URI])
}

fn demo_subject() -> SubjectClaims {
    SubjectClaims {
        sub: "alice".to_string(),
        name: "Alice Example".to_string(),
        email: "alice@example.com".to_string(),
    }
}

fn load_clients(path: &Path) -> anyhow::Result<Vec<Client>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read clients file: {}", path.display()))?;
    let clients: Vec<Client> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse clients file: {}", path.display()))?;
    tracing::info!(count = clients.len(), path = %path.display(), "Loaded registered clients");
    Ok(clients)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.issuer, defaults::ISSUER);
        assert_eq!(config.audience, defaults::AUDIENCE);
        assert_eq!(config.key_id, defaults::KEY_ID);
        assert_eq!(config.access_token_ttl.num_seconds(), 900);
        assert_eq!(config.jwks_refetch_cooldown, Duration::from_secs(30));
        assert_eq!(config.auth_code_ttl.num_seconds(), 300);
        assert_eq!(config.refresh_token_ttl.num_days(), 30);
        assert!(config.jwks_url.is_none());
    }

    #[test]
    fn test_demo_client_registered() {
        let registry = Config::default().client_registry();
        let client = registry.get("demo-client").unwrap();
        assert!(client.allows_redirect("http://localhost:4000/callback"));
    }

    #[test]
    fn test_for_testing_points_at_mock() {
        let config = Config::for_testing("http://127.0.0.1:9999");
        assert_eq!(
            config.jwks_url.as_deref(),
            Some("http://127.0.0.1:9999/.well-known/jwks.json")
        );
    }

    #[test]
    fn test_clients_file_missing() {
        let result = Config::default().with_clients_file("/nonexistent/clients.json");
        assert!(result.is_err());
    }
}
