//! OAuth 2.0 Authorization Code + PKCE
//!
//! An authorization server that issues single-use authorization codes bound
//! to a PKCE challenge, exchanges them for RS256-signed access tokens and
//! rotating refresh tokens, and publishes its verification key as a JWKS.
//! A resource guard verifies those tokens in the same process or, through
//! the published JWKS, in another one.
//!
//! # Features
//!
//! - **PKCE S256 only**: plain and absent challenges are rejected
//! - **Single-use codes**: atomic fetch-and-delete under concurrent redemption
//! - **Refresh rotation**: every refresh invalidates the presented token
//! - **Remote verification**: JWKS fetched over HTTP and cached by `kid`
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use pkce_auth::{config::Config, keys::KeyManager, server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::default();
//!     let keys = Arc::new(KeyManager::generate(&config.key_id)?);
//!     let router = server::create_auth_router(server::AuthState::new(&config, keys));
//!
//!     server::serve(router, ([127, 0, 0, 1], 3000).into()).await
//! }
//! ```

pub mod config;
pub mod error;
pub mod guard;
pub mod keys;
pub mod oauth;
pub mod server;

pub use config::Config;
pub use error::{AuthorizeError, GuardError, JwksError, KeyError, TokenError};
pub use guard::ResourceGuard;
pub use keys::{KeyManager, KeySource, RemoteJwks};
