//! pkce-auth - Entry Point
//!
//! Runs either the authorization server or the resource server.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use pkce_auth::{
    config::{Config, defaults},
    guard::ResourceGuard,
    keys::KeyManager,
    server,
};

#[derive(Parser, Debug)]
#[command(name = "pkce-auth")]
#[command(about = "OAuth 2.0 authorization code + PKCE server and resource guard")]
#[command(version)]
struct Cli {
    /// Server role: auth or resource
    #[arg(long, default_value = "auth", env = "PKCE_AUTH_ROLE")]
    role: Role,

    /// HTTP port (default 3000 for auth, 5000 for resource)
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0", env = "BIND_ADDRESS")]
    bind: IpAddr,

    /// Issuer URL placed in and expected from the `iss` claim
    #[arg(long, default_value = defaults::ISSUER, env = "ISSUER")]
    issuer: String,

    /// Audience the resource server requires in the `aud` claim
    #[arg(long, default_value = defaults::AUDIENCE, env = "AUDIENCE")]
    audience: String,

    /// Key id published in the JWKS
    #[arg(long, default_value = defaults::KEY_ID, env = "KEY_ID")]
    key_id: String,

    /// PEM RSA private key (PKCS#8 or PKCS#1). A key is generated when omitted.
    #[arg(long, env = "PRIVATE_KEY_PATH")]
    private_key: Option<PathBuf>,

    /// JSON file of registered clients
    #[arg(long, env = "CLIENTS_FILE")]
    clients: Option<PathBuf>,

    /// JWKS URL for the resource server (default `{issuer}/.well-known/jwks.json`)
    #[arg(long, env = "JWKS_URL")]
    jwks_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "RUST_LOG")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum Role {
    /// Authorization server: /authorize, /token, JWKS
    #[default]
    Auth,
    /// Resource server: /profile behind the bearer-token guard
    Resource,
}

impl Role {
    const fn default_port(self) -> u16 {
        match self {
            Self::Auth => 3000,
            Self::Resource => 5000,
        }
    }
}

fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if json {
        subscriber.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        subscriber.with(tracing_subscriber::fmt::layer().compact()).init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = Config::new(&cli.issuer, &cli.audience);
    config.key_id.clone_from(&cli.key_id);
    config.private_key_path.clone_from(&cli.private_key);
    config.jwks_url.clone_from(&cli.jwks_url);

    if let Some(path) = &cli.clients {
        config = config.with_clients_file(path)?;
    }
    Ok(config)
}

fn load_keys(config: &Config) -> anyhow::Result<KeyManager> {
    if let Some(path) = &config.private_key_path {
        tracing::info!(path = %path.display(), kid = %config.key_id, "Loading signing key");
        return KeyManager::from_pem_file(path, &config.key_id).context("Failed to load signing key");
    }

    tracing::warn!(kid = %config.key_id, "No private key configured, generating an ephemeral key");
    KeyManager::generate(&config.key_id).context("Failed to generate signing key")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, cli.json_logs);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        role = ?cli.role,
        "Starting pkce-auth"
    );

    let config = load_config(&cli)?;
    let addr = SocketAddr::new(cli.bind, cli.port.unwrap_or_else(|| cli.role.default_port()));

    let router = match cli.role {
        Role::Auth => {
            let keys = Arc::new(load_keys(&config)?);
            tracing::info!(issuer = %config.issuer, clients = config.clients.len(), "Running authorization server");
            server::create_auth_router(server::AuthState::new(&config, keys))
        }
        Role::Resource => {
            let guard = ResourceGuard::remote(&config).context("Failed to build JWKS client")?;
            tracing::info!(issuer = %config.issuer, audience = %config.audience, "Running resource server");
            server::create_resource_router(guard)
        }
    };

    server::serve(router, addr).await
}
