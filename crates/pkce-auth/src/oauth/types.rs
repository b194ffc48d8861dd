//! OAuth 2.0 records: clients, authorization codes, refresh tokens and access-token claims.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::scope::Scope;

/// A statically registered OAuth client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub allowed_redirect_uris: HashSet<String>,
}

impl Client {
    pub fn new<I, S>(id: impl Into<String>, redirect_uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            allowed_redirect_uris: redirect_uris.into_iter().map(Into::into).collect(),
        }
    }

    /// Exact string match against the registered set. No prefix or host matching.
    #[must_use]
    pub fn allows_redirect(&self, redirect_uri: &str) -> bool {
        self.allowed_redirect_uris.contains(redirect_uri)
    }
}

/// Immutable lookup of registered clients by id.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: HashMap<String, Client>,
}

impl ClientRegistry {
    pub fn new(clients: impl IntoIterator<Item = Client>) -> Self {
        Self { clients: clients.into_iter().map(|c| (c.id.clone(), c)).collect() }
    }

    #[must_use]
    pub fn get(&self, client_id: &str) -> Option<&Client> {
        self.clients.get(client_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

/// Identity claims of the authenticated end user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectClaims {
    pub sub: String,
    pub name: String,
    pub email: String,
}

/// Records with an absolute expiry. Stores use this for lazy expiry.
pub trait Expiring {
    fn expires_at(&self) -> DateTime<Utc>;

    /// Expired once `now` reaches `expires_at`.
    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }
}

/// A one-time authorization code bound to a client, redirect URI and PKCE challenge.
#[derive(Debug, Clone)]
pub struct AuthorizationCode {
    pub code: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub code_challenge: String,
    pub scope: Scope,
    pub subject: SubjectClaims,
    pub expires_at: DateTime<Utc>,
}

impl Expiring for AuthorizationCode {
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// A refresh token for obtaining new access tokens. Rotated on every use.
#[derive(Debug, Clone)]
pub struct RefreshToken {
    pub token: String,
    pub client_id: String,
    pub subject: SubjectClaims,
    pub scope: Scope,
    pub expires_at: DateTime<Utc>,
}

impl Expiring for RefreshToken {
    fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}

/// Claims carried by a signed access token. Never stored server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub iss: String,
    pub aud: String,
    pub sub: String,
    #[serde(default)]
    pub scope: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

impl AccessClaims {
    /// The `scope` claim as a set.
    #[must_use]
    pub fn scopes(&self) -> Scope {
        Scope::parse(&self.scope)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    #[test]
    fn test_redirect_exact_match() {
        let client = Client::new("demo-client", ["http://localhost:4000/callback"]);
        assert!(client.allows_redirect("http://localhost:4000/callback"));
        assert!(!client.allows_redirect("http://localhost:4000/callback/"));
        assert!(!client.allows_redirect("http://localhost:4000/callback?x=1"));
        assert!(!client.allows_redirect("http://LOCALHOST:4000/callback"));
    }

    #[test]
    fn test_registry_lookup() {
        let registry = ClientRegistry::new([
            Client::new("a", ["http://a/cb"]),
            Client::new("b", ["http://b/cb"]),
        ]);
        assert_eq!(registry.len(), 2);
        assert!(registry.get("a").is_some());
        assert!(registry.get("c").is_none());
    }

    #[test]
    fn test_expiry_boundary() {
        let now = Utc::now();
        let token = RefreshToken {
            token: "t".into(),
            client_id: "c".into(),
            subject: SubjectClaims {
                sub: "alice".into(),
                name: "Alice Example".into(),
                email: "alice@example.com".into(),
            },
            scope: Scope::default(),
            expires_at: now,
        };
        assert!(token.is_expired_at(now));
        assert!(!token.is_expired_at(now - TimeDelta::seconds(1)));
    }

    #[test]
    fn test_claims_scopes() {
        let claims = AccessClaims {
            iss: "http://localhost:3000".into(),
            aud: "demo-client".into(),
            sub: "alice".into(),
            scope: "api.read profile".into(),
            name: String::new(),
            email: String::new(),
            iat: 0,
            exp: 0,
        };
        assert!(claims.scopes().contains("api.read"));
        assert!(!claims.scopes().contains("api.write"));
    }
}
