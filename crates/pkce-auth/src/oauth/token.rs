//! Token engine.
//!
//! Redeems authorization codes (with PKCE verification) for a signed access
//! token plus a refresh token, and rotates refresh tokens on renewal.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use super::pkce;
use super::scope::Scope;
use super::store::{CodeStore, RefreshStore};
use super::types::{AccessClaims, Expiring, RefreshToken, SubjectClaims};
use crate::config::Config;
use crate::error::{GrantFailure, KeyError, TokenError, TokenResult};
use crate::keys::{HeaderOverrides, KeyManager};

/// Form body of `POST /token`. Which fields are required depends on `grant_type`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    pub grant_type: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
}

/// Successful token response (RFC 6749 §5.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub scope: String,
}

pub struct TokenEngine {
    codes: CodeStore,
    refresh_tokens: RefreshStore,
    keys: Arc<KeyManager>,
    issuer: String,
    access_token_ttl: TimeDelta,
    refresh_token_ttl: TimeDelta,
}

impl TokenEngine {
    #[must_use]
    pub fn new(config: &Config, codes: CodeStore, refresh_tokens: RefreshStore, keys: Arc<KeyManager>) -> Self {
        Self {
            codes,
            refresh_tokens,
            keys,
            issuer: config.issuer.clone(),
            access_token_ttl: config.access_token_ttl,
            refresh_token_ttl: config.refresh_token_ttl,
        }
    }

    /// Dispatch on `grant_type`.
    pub async fn token(&self, request: &TokenRequest) -> TokenResult<TokenResponse> {
        match request.grant_type.as_deref() {
            Some("authorization_code") => {
                self.exchange_code(
                    required(request.code.as_deref(), "code")?,
                    required(request.redirect_uri.as_deref(), "redirect_uri")?,
                    required(request.client_id.as_deref(), "client_id")?,
                    required(request.code_verifier.as_deref(), "code_verifier")?,
                )
                .await
            }
            Some("refresh_token") => {
                self.refresh(
                    required(request.refresh_token.as_deref(), "refresh_token")?,
                    required(request.client_id.as_deref(), "client_id")?,
                )
                .await
            }
            other => {
                tracing::debug!(grant_type = ?other, "Unsupported grant_type");
                Err(TokenError::UnsupportedGrantType)
            }
        }
    }

    /// `authorization_code` grant.
    ///
    /// The code is removed from the store before any check runs, so it is
    /// burned even when redemption fails.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        client_id: &str,
        code_verifier: &str,
    ) -> TokenResult<TokenResponse> {
        let now = Utc::now();

        let Some(record) = self.codes.take_if_present(code).await else {
            return Err(reject_code(client_id, GrantFailure::NotFound));
        };
        if record.is_expired_at(now) {
            return Err(reject_code(client_id, GrantFailure::Expired));
        }
        if record.client_id != client_id {
            return Err(reject_code(client_id, GrantFailure::ClientMismatch));
        }
        if record.redirect_uri != redirect_uri {
            return Err(reject_code(client_id, GrantFailure::RedirectMismatch));
        }
        if !pkce::verify_s256(code_verifier, &record.code_challenge) {
            return Err(reject_code(client_id, GrantFailure::PkceMismatch));
        }

        let access_token = match self.sign_access_token(client_id, &record.subject, &record.scope, now) {
            Ok(token) => token,
            Err(e) => {
                // Nothing was issued, so the validated code goes back.
                tracing::error!(client_id = %client_id, error = %e, "Failed to sign access token");
                self.codes.put(code.to_owned(), record).await;
                return Err(e.into());
            }
        };
        let refresh_token =
            self.issue_refresh_token(client_id, record.subject, record.scope.clone(), now).await;

        tracing::info!(client_id = %client_id, "Exchanged authorization code for tokens");

        Ok(self.response(access_token, refresh_token, &record.scope))
    }

    /// `refresh_token` grant with rotation.
    ///
    /// The presented token is removed only if it is live and bound to
    /// `client_id`; a garbage or foreign token mints nothing.
    pub async fn refresh(&self, refresh_token: &str, client_id: &str) -> TokenResult<TokenResponse> {
        let now = Utc::now();

        let foreign = AtomicBool::new(false);
        let owned_by_caller = |record: &RefreshToken| {
            let matches = record.client_id == client_id;
            if !matches {
                foreign.store(true, Ordering::Relaxed);
            }
            matches
        };

        let Some(record) = self.refresh_tokens.take_if(refresh_token, &owned_by_caller).await else {
            let reason = if foreign.load(Ordering::Relaxed) {
                GrantFailure::ClientMismatch
            } else {
                GrantFailure::NotFound
            };
            tracing::debug!(client_id = %client_id, reason = reason.as_str(), "Rejected refresh token");
            return Err(TokenError::InvalidRefreshToken(reason));
        };

        let access_token = match self.sign_access_token(client_id, &record.subject, &record.scope, now) {
            Ok(token) => token,
            Err(e) => {
                tracing::error!(client_id = %client_id, error = %e, "Failed to sign access token");
                self.refresh_tokens.put(refresh_token.to_owned(), record).await;
                return Err(e.into());
            }
        };
        let scope = record.scope.clone();
        let rotated = self.issue_refresh_token(client_id, record.subject, record.scope, now).await;

        tracing::info!(client_id = %client_id, "Rotated refresh token");

        Ok(self.response(access_token, rotated, &scope))
    }

    fn sign_access_token(
        &self,
        client_id: &str,
        subject: &SubjectClaims,
        scope: &Scope,
        now: DateTime<Utc>,
    ) -> Result<String, KeyError> {
        let claims = AccessClaims {
            iss: self.issuer.clone(),
            aud: client_id.to_owned(),
            sub: subject.sub.clone(),
            scope: scope.to_string(),
            name: subject.name.clone(),
            email: subject.email.clone(),
            iat: now.timestamp(),
            exp: (now + self.access_token_ttl).timestamp(),
        };
        self.keys.sign(&claims, &HeaderOverrides::access_token())
    }

    async fn issue_refresh_token(
        &self,
        client_id: &str,
        subject: SubjectClaims,
        scope: Scope,
        now: DateTime<Utc>,
    ) -> String {
        let token = pkce::random_token();
        let record = RefreshToken {
            token: token.clone(),
            client_id: client_id.to_owned(),
            subject,
            scope,
            expires_at: now + self.refresh_token_ttl,
        };
        self.refresh_tokens.put(token.clone(), record).await;
        token
    }

    fn response(&self, access_token: String, refresh_token: String, scope: &Scope) -> TokenResponse {
        TokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_ttl.num_seconds(),
            refresh_token: Some(refresh_token),
            scope: scope.to_string(),
        }
    }
}

impl std::fmt::Debug for TokenEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenEngine")
            .field("issuer", &self.issuer)
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

fn required<'a>(value: Option<&'a str>, name: &'static str) -> TokenResult<&'a str> {
    value.filter(|v| !v.is_empty()).ok_or(TokenError::InvalidRequest(name))
}

fn reject_code(client_id: &str, reason: GrantFailure) -> TokenError {
    tracing::debug!(client_id = %client_id, reason = reason.as_str(), "Rejected authorization code");
    TokenError::InvalidCode(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::store::{MemoryStore, RecordStore};
    use crate::oauth::types::AuthorizationCode;

    fn engine() -> TokenEngine {
        let keys = KeyManager::from_pem(include_str!("../../tests/fixtures/signing_key.pem"), "demo-key-1")
            .unwrap();
        TokenEngine::new(
            &Config::default(),
            Arc::new(MemoryStore::<AuthorizationCode>::new()),
            Arc::new(MemoryStore::<RefreshToken>::new()),
            Arc::new(keys),
        )
    }

    #[tokio::test]
    async fn test_unsupported_grant_type() {
        let request = TokenRequest { grant_type: Some("password".into()), ..Default::default() };
        assert!(matches!(engine().token(&request).await, Err(TokenError::UnsupportedGrantType)));

        let request = TokenRequest::default();
        assert!(matches!(engine().token(&request).await, Err(TokenError::UnsupportedGrantType)));
    }

    #[tokio::test]
    async fn test_missing_parameters() {
        let request = TokenRequest {
            grant_type: Some("authorization_code".into()),
            code: Some("abc".into()),
            ..Default::default()
        };
        assert!(matches!(
            engine().token(&request).await,
            Err(TokenError::InvalidRequest("redirect_uri"))
        ));

        let request = TokenRequest {
            grant_type: Some("refresh_token".into()),
            client_id: Some("demo-client".into()),
            ..Default::default()
        };
        assert!(matches!(
            engine().token(&request).await,
            Err(TokenError::InvalidRequest("refresh_token"))
        ));
    }

    #[tokio::test]
    async fn test_unknown_code() {
        let err = engine()
            .exchange_code("never-issued", "http://localhost:4000/callback", "demo-client", "v")
            .await
            .unwrap_err();
        assert_eq!(err.grant_failure(), Some(GrantFailure::NotFound));
        assert_eq!(err.code(), "invalid_grant");
    }

    #[tokio::test]
    async fn test_unknown_refresh_token_mints_nothing() {
        let engine = engine();
        let err = engine.refresh("garbage", "demo-client").await.unwrap_err();
        assert_eq!(err.grant_failure(), Some(GrantFailure::NotFound));
        assert_eq!(engine.refresh_tokens.len().await, 0);
    }
}
