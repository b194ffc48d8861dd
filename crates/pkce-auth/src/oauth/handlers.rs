//! OAuth 2.0 endpoint handlers.
//!
//! Implements:
//! - RFC 8414: OAuth Authorization Server Metadata
//! - RFC 7517: JWK Set publication
//! - RFC 6749: Authorization and Token endpoints

use std::sync::Arc;

use axum::{
    Form, Json,
    extract::{Query, State, rejection::FormRejection},
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

use super::authorize::AuthorizationRequest;
use super::pkce;
use super::token::TokenRequest;
use crate::error::TokenError;
use crate::server::transport::AuthState;

// ─── RFC 8414: Authorization Server Metadata ─────────────────────────────────

/// `GET /.well-known/oauth-authorization-server`
pub async fn handle_auth_server_metadata(State(state): State<Arc<AuthState>>) -> impl IntoResponse {
    let issuer = state.issuer.trim_end_matches('/');
    Json(serde_json::json!({
        "issuer": state.issuer,
        "authorization_endpoint": format!("{issuer}/authorize"),
        "token_endpoint": format!("{issuer}/token"),
        "jwks_uri": format!("{issuer}/.well-known/jwks.json"),
        "response_types_supported": ["code"],
        "grant_types_supported": ["authorization_code", "refresh_token"],
        "token_endpoint_auth_methods_supported": ["none"],
        "code_challenge_methods_supported": [pkce::METHOD_S256]
    }))
}

// ─── RFC 7517: JWK Set ───────────────────────────────────────────────────────

/// `GET /.well-known/jwks.json`
pub async fn handle_jwks(State(state): State<Arc<AuthState>>) -> impl IntoResponse {
    Json(state.keys.jwks())
}

// ─── Authorization Endpoint ──────────────────────────────────────────────────

/// `GET /authorize`
///
/// The end user is already authenticated, so a valid request is approved
/// immediately. Errors are shown to the user agent and never redirected.
pub async fn handle_authorize(
    State(state): State<Arc<AuthState>>,
    Query(query): Query<AuthorizationRequest>,
) -> Response {
    match state.authorization.authorize(&query).await {
        Ok(redirect) => {
            (StatusCode::FOUND, [(header::LOCATION, redirect.location.to_string())]).into_response()
        }
        Err(e) => {
            tracing::info!(client_id = ?query.client_id, error = e.code(), "Rejected authorization request");
            e.into_response()
        }
    }
}

// ─── Token Endpoint ──────────────────────────────────────────────────────────

/// `POST /token`
///
/// Exchange an authorization code for tokens, or rotate a refresh token.
/// A body that is not a single-valued form is answered as `invalid_request`.
pub async fn handle_token(
    State(state): State<Arc<AuthState>>,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Response {
    let form = match form {
        Ok(Form(form)) => form,
        Err(rejection) => {
            tracing::debug!(status = rejection.status().as_u16(), "Rejected malformed token request");
            return TokenError::MalformedRequest(rejection.body_text()).into_response();
        }
    };

    match state.tokens.token(&form).await {
        Ok(tokens) => {
            // RFC 6749 §5.1
            let mut response = Json(tokens).into_response();
            let headers = response.headers_mut();
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
            headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
            response
        }
        Err(e) => e.into_response(),
    }
}
