//! OAuth 2.0 authorization code flow with PKCE.
//!
//! ## Supported Standards
//! - RFC 6749: Authorization Code and Refresh Token grants
//! - RFC 7636: PKCE (S256 only)
//! - RFC 8414: Authorization Server Metadata
//! - RFC 9068: JWT access tokens (`typ: at+jwt`)

pub mod authorize;
pub mod handlers;
pub mod identity;
pub mod pkce;
pub mod scope;
pub mod store;
pub mod token;
pub mod types;

pub use authorize::{AuthorizationEngine, AuthorizationRedirect, AuthorizationRequest};
pub use identity::{IdentityProvider, StaticIdentity};
pub use scope::Scope;
pub use store::{CodeStore, MemoryStore, RecordStore, RefreshStore};
pub use token::{TokenEngine, TokenRequest, TokenResponse};
pub use types::{AccessClaims, AuthorizationCode, Client, ClientRegistry, RefreshToken, SubjectClaims};
