//! Protected resource endpoints.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::defaults;
use crate::error::GuardResult;
use crate::guard::{ResourceGuard, authorize_scope};
use crate::oauth::types::AccessClaims;

/// Shared state for resource server handlers.
#[derive(Debug)]
pub struct ResourceState {
    pub guard: ResourceGuard,
}

impl ResourceState {
    #[must_use]
    pub const fn new(guard: ResourceGuard) -> Self {
        Self { guard }
    }
}

/// Reject requests without a valid bearer token; otherwise attach the
/// verified [`AccessClaims`] to the request extensions.
pub async fn require_bearer(
    State(state): State<Arc<ResourceState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let authorization = request.headers().get(header::AUTHORIZATION).and_then(|v| v.to_str().ok());
    let result = state.guard.authenticate(authorization).await;

    match result {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// `GET /profile`
///
/// Requires the `api.read` scope.
pub async fn handle_profile(Extension(claims): Extension<AccessClaims>) -> GuardResult<impl IntoResponse> {
    authorize_scope(&claims, defaults::PROFILE_SCOPE)?;

    Ok(Json(serde_json::json!({
        "message": "Protected profile data",
        "user": {
            "sub": claims.sub,
            "name": claims.name,
            "email": claims.email,
            "scope": claims.scope
        }
    })))
}
