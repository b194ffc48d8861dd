//! HTTP routers for the authorization server and the resource server.

use std::sync::Arc;

use axum::{
    Json, Router, middleware,
    extract::State,
    response::IntoResponse,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::resource::{ResourceState, handle_profile, require_bearer};
use crate::config::Config;
use crate::guard::ResourceGuard;
use crate::keys::KeyManager;
use crate::oauth::handlers::{handle_auth_server_metadata, handle_authorize, handle_jwks, handle_token};
use crate::oauth::identity::StaticIdentity;
use crate::oauth::store::{CodeStore, MemoryStore, RefreshStore};
use crate::oauth::types::{AuthorizationCode, RefreshToken};
use crate::oauth::{AuthorizationEngine, TokenEngine};

/// Shared state for authorization server handlers.
pub struct AuthState {
    pub authorization: AuthorizationEngine,
    pub tokens: TokenEngine,
    pub keys: Arc<KeyManager>,
    pub issuer: String,
}

impl AuthState {
    /// State backed by fresh in-memory stores.
    #[must_use]
    pub fn new(config: &Config, keys: Arc<KeyManager>) -> Self {
        Self::with_stores(
            config,
            keys,
            Arc::new(MemoryStore::<AuthorizationCode>::new()),
            Arc::new(MemoryStore::<RefreshToken>::new()),
        )
    }

    /// State backed by the given stores. The authorization and token engines share `codes`.
    #[must_use]
    pub fn with_stores(
        config: &Config,
        keys: Arc<KeyManager>,
        codes: CodeStore,
        refresh_tokens: RefreshStore,
    ) -> Self {
        let identity = Arc::new(StaticIdentity::new(config.subject.clone()));
        let authorization = AuthorizationEngine::new(
            Arc::new(config.client_registry()),
            Arc::clone(&codes),
            identity,
            config.auth_code_ttl,
        );
        let tokens = TokenEngine::new(config, codes, refresh_tokens, Arc::clone(&keys));

        Self { authorization, tokens, keys, issuer: config.issuer.clone() }
    }
}

impl std::fmt::Debug for AuthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthState")
            .field("issuer", &self.issuer)
            .field("kid", &self.keys.key_id())
            .finish_non_exhaustive()
    }
}

/// Create the authorization server router.
pub fn create_auth_router(state: AuthState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        // RFC 8414 + JWKS discovery
        .route("/.well-known/oauth-authorization-server", get(handle_auth_server_metadata))
        .route("/.well-known/jwks.json", get(handle_jwks))
        // OAuth endpoints
        .route("/authorize", get(handle_authorize))
        .route("/token", post(handle_token))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Create the resource server router. Everything except `/health` requires a bearer token.
pub fn create_resource_router(guard: ResourceGuard) -> Router {
    let state = Arc::new(ResourceState::new(guard));

    Router::new()
        .route("/profile", get(handle_profile))
        .route_layer(middleware::from_fn_with_state(Arc::clone(&state), require_bearer))
        .route("/health", get(health_check))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

async fn readiness_check(State(state): State<Arc<AuthState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ready",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "issuer": state.issuer,
        "kid": state.keys.key_id()
    }))
}
