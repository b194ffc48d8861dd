//! Error types for the authorization server, token engine and resource guard.
//!
//! Uses `thiserror` for structured error handling. Every protocol error knows
//! its OAuth error code and HTTP status, and renders itself as an axum response.

use std::path::PathBuf;

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

/// Errors from the `/authorize` endpoint.
///
/// Variants are listed in validation order; the first failing check wins.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizeError {
    /// `client_id` does not resolve to a registered client.
    #[error("Invalid client_id")]
    InvalidClient,

    /// `redirect_uri` is not an exact member of the client's registered set.
    #[error("Invalid redirect_uri")]
    InvalidRedirectUri,

    /// `response_type` is anything other than `code`.
    #[error("Unsupported response_type")]
    UnsupportedResponseType,

    /// `code_challenge` absent or `code_challenge_method` is not `S256`.
    #[error("PKCE code challenge required")]
    MissingPkceChallenge,
}

impl AuthorizeError {
    /// OAuth error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidClient => "invalid_client",
            Self::InvalidRedirectUri => "invalid_redirect_uri",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::MissingPkceChallenge => "missing_pkce_challenge",
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        StatusCode::BAD_REQUEST
    }
}

impl IntoResponse for AuthorizeError {
    fn into_response(self) -> Response {
        // Never redirect on these errors: the redirect target itself may be untrusted.
        (self.status(), self.to_string()).into_response()
    }
}

/// Which check rejected a grant.
///
/// Only ever logged. Callers see a single `invalid_grant` so they cannot
/// probe which sub-check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantFailure {
    /// Never issued, already redeemed, or already rotated.
    NotFound,
    Expired,
    ClientMismatch,
    RedirectMismatch,
    PkceMismatch,
}

impl GrantFailure {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::Expired => "expired",
            Self::ClientMismatch => "client_mismatch",
            Self::RedirectMismatch => "redirect_mismatch",
            Self::PkceMismatch => "pkce_mismatch",
        }
    }
}

/// Errors from the `/token` endpoint.
#[derive(thiserror::Error, Debug)]
pub enum TokenError {
    /// A parameter the grant needs is missing.
    #[error("Missing {0}")]
    InvalidRequest(&'static str),

    /// The request body is not a well-formed token request.
    #[error("{0}")]
    MalformedRequest(String),

    /// The authorization code could not be redeemed.
    #[error("Invalid or expired authorization code")]
    InvalidCode(GrantFailure),

    /// The refresh token could not be redeemed.
    #[error("Invalid or expired refresh token")]
    InvalidRefreshToken(GrantFailure),

    #[error("Unsupported grant_type")]
    UnsupportedGrantType,

    /// The signing key could not produce a token. Never downgraded to an unsigned token.
    #[error("Token signing failed: {0}")]
    Signing(#[from] KeyError),
}

impl TokenError {
    /// OAuth error code (RFC 6749 §5.2).
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) | Self::MalformedRequest(_) => "invalid_request",
            Self::InvalidCode(_) | Self::InvalidRefreshToken(_) => "invalid_grant",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::Signing(_) => "server_error",
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// The failed sub-check, if this is an `invalid_grant`.
    #[must_use]
    pub const fn grant_failure(&self) -> Option<GrantFailure> {
        match self {
            Self::InvalidCode(reason) | Self::InvalidRefreshToken(reason) => Some(*reason),
            _ => None,
        }
    }
}

impl IntoResponse for TokenError {
    fn into_response(self) -> Response {
        let description = match &self {
            Self::Signing(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        let mut response = (
            self.status(),
            Json(serde_json::json!({
                "error": self.code(),
                "error_description": description
            })),
        )
            .into_response();

        let headers = response.headers_mut();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        response
    }
}

/// Why a bearer token was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    /// Not a well-formed JWS compact token.
    Malformed,
    /// No verification key matches the token's `kid`.
    UnknownKey,
    BadSignature,
    Expired,
    WrongIssuer,
    WrongAudience,
    /// Verification keys could not be obtained.
    KeysUnavailable,
}

impl TokenRejection {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Malformed => "malformed",
            Self::UnknownKey => "unknown_key",
            Self::BadSignature => "bad_signature",
            Self::Expired => "expired",
            Self::WrongIssuer => "wrong_issuer",
            Self::WrongAudience => "wrong_audience",
            Self::KeysUnavailable => "keys_unavailable",
        }
    }
}

/// Errors from the resource guard.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GuardError {
    /// No `Authorization: Bearer <token>` header.
    #[error("Missing or invalid Authorization header")]
    MissingHeader,

    /// Signature, issuer, audience or expiry check failed.
    #[error("Invalid token")]
    InvalidToken(TokenRejection),

    /// Token is valid but does not carry the required scope.
    #[error("Insufficient scope: {required} required")]
    InsufficientScope {
        /// The scope the operation needs.
        required: String,
    },
}

impl GuardError {
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingHeader | Self::InvalidToken(_) => "unauthenticated",
            Self::InsufficientScope { .. } => "insufficient_scope",
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::MissingHeader | Self::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            Self::InsufficientScope { .. } => StatusCode::FORBIDDEN,
        }
    }

    /// `WWW-Authenticate` challenge per RFC 6750 §3.
    fn challenge(&self) -> String {
        match self {
            Self::MissingHeader => "Bearer".to_string(),
            Self::InvalidToken(_) => r#"Bearer error="invalid_token""#.to_string(),
            Self::InsufficientScope { required } => {
                format!(r#"Bearer error="insufficient_scope", scope="{required}""#)
            }
        }
    }
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        let body = match &self {
            // The rejection reason is logged by the guard, never returned.
            Self::MissingHeader | Self::InvalidToken(_) => serde_json::json!({
                "error": self.code(),
                "message": self.to_string()
            }),
            Self::InsufficientScope { required } => serde_json::json!({
                "error": self.code(),
                "message": self.to_string(),
                "required": required
            }),
        };

        let mut response = (self.status(), Json(body)).into_response();
        if let Ok(value) = HeaderValue::from_str(&self.challenge()) {
            response.headers_mut().insert(header::WWW_AUTHENTICATE, value);
        }
        response
    }
}

/// Errors loading key material or signing with it.
#[derive(thiserror::Error, Debug)]
pub enum KeyError {
    /// Key file could not be read.
    #[error("Failed to read key file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// PEM was neither PKCS#8 nor PKCS#1 RSA.
    #[error("Invalid RSA private key: {0}")]
    InvalidKey(String),

    #[error("RSA error: {0}")]
    Rsa(#[from] rsa::Error),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

/// Errors obtaining verification keys.
#[derive(thiserror::Error, Debug)]
pub enum JwksError {
    /// HTTP transport error (connection, DNS, TLS, timeout)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JWKS endpoint returned status {0}")]
    Status(u16),

    /// Token names a key the source does not hold.
    #[error("No key with kid {0:?}")]
    UnknownKid(Option<String>),

    /// JWK could not be turned into a verification key.
    #[error("Unusable JWK: {0}")]
    InvalidJwk(String),
}

impl JwksError {
    /// Map to the rejection reported for the token that needed the key.
    #[must_use]
    pub const fn rejection(&self) -> TokenRejection {
        match self {
            Self::UnknownKid(_) | Self::InvalidJwk(_) => TokenRejection::UnknownKey,
            Self::Http(_) | Self::Status(_) => TokenRejection::KeysUnavailable,
        }
    }
}

/// Result type alias for token endpoint operations.
pub type TokenResult<T> = Result<T, TokenError>;

/// Result type alias for guard operations.
pub type GuardResult<T> = Result<T, GuardError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorize_error_codes() {
        assert_eq!(AuthorizeError::InvalidClient.code(), "invalid_client");
        assert_eq!(AuthorizeError::InvalidRedirectUri.code(), "invalid_redirect_uri");
        assert_eq!(AuthorizeError::UnsupportedResponseType.code(), "unsupported_response_type");
        assert_eq!(AuthorizeError::MissingPkceChallenge.code(), "missing_pkce_challenge");
        assert_eq!(AuthorizeError::InvalidClient.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_invalid_grant_is_coarse() {
        let not_found = TokenError::InvalidCode(GrantFailure::NotFound);
        let pkce = TokenError::InvalidCode(GrantFailure::PkceMismatch);

        assert_eq!(not_found.code(), "invalid_grant");
        assert_eq!(pkce.code(), "invalid_grant");
        // Same description regardless of which check failed
        assert_eq!(not_found.to_string(), pkce.to_string());
        assert_eq!(pkce.grant_failure(), Some(GrantFailure::PkceMismatch));
    }

    #[test]
    fn test_token_error_status() {
        assert_eq!(TokenError::UnsupportedGrantType.status(), StatusCode::BAD_REQUEST);
        assert_eq!(TokenError::InvalidRequest("code").code(), "invalid_request");
        assert_eq!(
            TokenError::Signing(KeyError::InvalidKey("bad".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_guard_error_status() {
        assert_eq!(GuardError::MissingHeader.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            GuardError::InvalidToken(TokenRejection::Expired).status(),
            StatusCode::UNAUTHORIZED
        );
        let scope = GuardError::InsufficientScope { required: "api.read".into() };
        assert_eq!(scope.status(), StatusCode::FORBIDDEN);
        assert!(scope.to_string().contains("api.read"));
    }

    #[tokio::test]
    async fn test_invalid_token_body_hides_reason() {
        let response = GuardError::InvalidToken(TokenRejection::BadSignature).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "unauthenticated");
        assert_eq!(body["message"], "Invalid token");
        assert!(body.get("reason").is_none());
    }

    #[test]
    fn test_guard_error_challenge_header() {
        let response = GuardError::InsufficientScope { required: "api.read".into() }.into_response();
        let challenge = response.headers().get(header::WWW_AUTHENTICATE).unwrap().to_str().unwrap();
        assert!(challenge.contains("insufficient_scope"));
        assert!(challenge.contains("api.read"));
    }
}
