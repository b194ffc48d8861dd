//! Authorization engine.
//!
//! Validates an authorization request, binds it to a PKCE challenge and
//! issues a one-time authorization code.

use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use serde::Deserialize;
use url::Url;

use super::identity::IdentityProvider;
use super::pkce;
use super::scope::Scope;
use super::store::CodeStore;
use super::types::{AuthorizationCode, ClientRegistry};
use crate::error::AuthorizeError;

/// Parameters of `GET /authorize`. Every field is optional on the wire.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizationRequest {
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

/// Where to send the user agent after a successful authorization.
#[derive(Debug, Clone)]
pub struct AuthorizationRedirect {
    /// `redirect_uri` with `code` and, if supplied, `state` appended.
    pub location: Url,
    /// The issued authorization code.
    pub code: String,
}

pub struct AuthorizationEngine {
    clients: Arc<ClientRegistry>,
    codes: CodeStore,
    identity: Arc<dyn IdentityProvider>,
    code_ttl: TimeDelta,
}

impl AuthorizationEngine {
    #[must_use]
    pub fn new(
        clients: Arc<ClientRegistry>,
        codes: CodeStore,
        identity: Arc<dyn IdentityProvider>,
        code_ttl: TimeDelta,
    ) -> Self {
        Self { clients, codes, identity, code_ttl }
    }

    /// Validate `request` and issue a code.
    ///
    /// Checks run in a fixed order and the first failure wins: client, redirect
    /// URI, response type, PKCE. No state changes on failure.
    pub async fn authorize(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<AuthorizationRedirect, AuthorizeError> {
        let client = request
            .client_id
            .as_deref()
            .and_then(|id| self.clients.get(id))
            .ok_or(AuthorizeError::InvalidClient)?;

        let redirect_uri = request
            .redirect_uri
            .as_deref()
            .filter(|uri| client.allows_redirect(uri))
            .ok_or(AuthorizeError::InvalidRedirectUri)?;
        // A registered URI that does not parse cannot be redirected to.
        let mut location = Url::parse(redirect_uri).map_err(|_| AuthorizeError::InvalidRedirectUri)?;

        if request.response_type.as_deref() != Some("code") {
            return Err(AuthorizeError::UnsupportedResponseType);
        }

        let code_challenge = request
            .code_challenge
            .as_deref()
            .filter(|challenge| !challenge.is_empty())
            .ok_or(AuthorizeError::MissingPkceChallenge)?;
        if request.code_challenge_method.as_deref() != Some(pkce::METHOD_S256) {
            return Err(AuthorizeError::MissingPkceChallenge);
        }

        let subject = self.identity.current_subject();
        let code = pkce::random_token();

        let record = AuthorizationCode {
            code: code.clone(),
            client_id: client.id.clone(),
            redirect_uri: redirect_uri.to_owned(),
            code_challenge: code_challenge.to_owned(),
            scope: Scope::parse(request.scope.as_deref().unwrap_or_default()),
            subject,
            expires_at: Utc::now() + self.code_ttl,
        };
        self.codes.put(code.clone(), record).await;

        {
            let mut query = location.query_pairs_mut();
            query.append_pair("code", &code);
            if let Some(state) = &request.state {
                query.append_pair("state", state);
            }
        }

        tracing::info!(client_id = %client.id, "Issued authorization code");

        Ok(AuthorizationRedirect { location, code })
    }
}

impl std::fmt::Debug for AuthorizationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationEngine")
            .field("clients", &self.clients.len())
            .field("code_ttl", &self.code_ttl)
            .finish_non_exhaustive()
    }
}
