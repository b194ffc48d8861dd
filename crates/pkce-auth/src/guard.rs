//! Resource guard.
//!
//! Verifies bearer tokens (signature, issuer, audience, expiry) and enforces
//! scope requirements in front of protected handlers.

use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Validation, decode, decode_header};

use crate::config::Config;
use crate::error::{GuardError, GuardResult, JwksError, TokenRejection};
use crate::keys::{ALGORITHM, KeySource, RemoteJwks};
use crate::oauth::types::AccessClaims;

/// Verifies access tokens against a [`KeySource`].
#[derive(Clone)]
pub struct ResourceGuard {
    keys: Arc<dyn KeySource>,
    validation: Validation,
}

impl ResourceGuard {
    #[must_use]
    pub fn new(keys: Arc<dyn KeySource>, issuer: &str, audience: &str) -> Self {
        let mut validation = Validation::new(ALGORITHM);
        validation.leeway = 0;
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        Self { keys, validation }
    }

    /// Guard backed by the issuer's published JWKS.
    ///
    /// Uses `config.jwks_url`, falling back to `{issuer}/.well-known/jwks.json`.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn remote(config: &Config) -> Result<Self, JwksError> {
        let url = config.jwks_url.clone().unwrap_or_else(|| {
            format!("{}/.well-known/jwks.json", config.issuer.trim_end_matches('/'))
        });
        let keys = RemoteJwks::new(url, config)?;
        Ok(Self::new(Arc::new(keys), &config.issuer, &config.audience))
    }

    /// Authenticate a request from its `Authorization` header value.
    pub async fn authenticate(&self, authorization: Option<&str>) -> GuardResult<AccessClaims> {
        let token = bearer_token(authorization)?;
        self.verify(token).await.map_err(|reason| {
            tracing::debug!(reason = reason.as_str(), "Rejected bearer token");
            GuardError::InvalidToken(reason)
        })
    }

    /// Verify a compact JWS and return its claims.
    pub async fn verify(&self, token: &str) -> Result<AccessClaims, TokenRejection> {
        let header = decode_header(token).map_err(|_| TokenRejection::Malformed)?;
        if header.alg != ALGORITHM {
            return Err(TokenRejection::Malformed);
        }

        let key = self.keys.verification_key(header.kid.as_deref()).await.map_err(|e| {
            tracing::debug!(kid = ?header.kid, error = %e, "No verification key");
            e.rejection()
        })?;

        let data = decode::<AccessClaims>(token, &key, &self.validation).map_err(|e| rejection(e.kind()))?;

        // The library tolerates exp == now; a token is dead at its expiry instant.
        if data.claims.exp <= Utc::now().timestamp() {
            return Err(TokenRejection::Expired);
        }

        Ok(data.claims)
    }
}

impl std::fmt::Debug for ResourceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceGuard")
            .field("issuer", &self.validation.iss)
            .field("audience", &self.validation.aud)
            .finish_non_exhaustive()
    }
}

/// Extract the token from an `Authorization: Bearer <token>` value.
pub fn bearer_token(authorization: Option<&str>) -> GuardResult<&str> {
    let value = authorization.ok_or(GuardError::MissingHeader)?;
    let (scheme, token) = value.split_once(' ').ok_or(GuardError::MissingHeader)?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(GuardError::MissingHeader);
    }
    let token = token.trim();
    if token.is_empty() || token.contains(' ') {
        return Err(GuardError::MissingHeader);
    }
    Ok(token)
}

/// Require `required` in the token's scope set.
pub fn authorize_scope(claims: &AccessClaims, required: &str) -> GuardResult<()> {
    if claims.scopes().contains(required) {
        Ok(())
    } else {
        tracing::debug!(sub = %claims.sub, required, "Insufficient scope");
        Err(GuardError::InsufficientScope { required: required.to_string() })
    }
}

fn rejection(kind: &ErrorKind) -> TokenRejection {
    match kind {
        ErrorKind::InvalidSignature => TokenRejection::BadSignature,
        ErrorKind::ExpiredSignature => TokenRejection::Expired,
        ErrorKind::InvalidIssuer => TokenRejection::WrongIssuer,
        ErrorKind::InvalidAudience => TokenRejection::WrongAudience,
        _ => TokenRejection::Malformed,
    }
}
