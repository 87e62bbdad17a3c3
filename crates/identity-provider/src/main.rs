//! Identity provider server
//!
//! Loads the YAML configuration, generates a signing key, and serves the
//! OAuth2 / OpenID Connect endpoints and the login API until interrupted.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use identity_provider::config::Config;
use identity_provider::{app, AppState};

/// How often expired challenges, codes and refresh tokens are swept.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[command(name = "identity-provider")]
#[command(about = "OAuth2 / OpenID Connect identity provider")]
struct Cli {
    /// Path to the YAML config file
    #[arg(short = 'c', long, default_value = "/config.yaml", env = "CONFIG_PATH")]
    config_path: String,

    /// Port to listen on (overrides the config file)
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Address to bind to
    #[arg(long, default_value = "0.0.0.0", env = "IDP_BIND")]
    bind: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "identity_provider=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let mut config = Config::load(&cli.config_path)?;
    if let Some(port) = cli.port {
        config.override_port(port);
    }

    let state = Arc::new(AppState::new(config)?);

    tracing::info!(
        "Loaded {} users, {} clients, {} signing keys",
        state.users.len(),
        state.clients.len(),
        state.keys.public_jwks().keys.len()
    );
    tracing::info!("Issuer: {}", state.config.issuer);

    let sweeper = tokio::spawn(sweep_expired(state.clone()));

    let addr: SocketAddr = format!("{}:{}", cli.bind, state.config.port).parse()?;
    let router = app(state);

    tracing::info!("Starting identity-provider on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    tracing::info!("Identity provider shut down");
    Ok(())
}

/// Periodically drop expired flow state. Expiry is also enforced on every
/// read, so this only bounds memory.
async fn sweep_expired(state: Arc<AppState>) {
    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    // The first tick completes immediately
    interval.tick().await;
    loop {
        interval.tick().await;
        state.flows.cleanup_expired();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
