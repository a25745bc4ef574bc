// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 DID Auth Server Contributors

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

use did_auth_server::agent::AgentRegistry;
use did_auth_server::api::router;
use did_auth_server::auth::resolver::DidResolver;
use did_auth_server::config::{Settings, ENV_DATA_DIR, ENV_HOST, ENV_LOG_FORMAT, ENV_PORT};
use did_auth_server::state::AppState;

#[tokio::main]
async fn main() {
    init_tracing();

    let settings = Settings::from_env();
    tracing::info!(
        algorithm = ?settings.jwt_algorithm,
        nonce_window_min = settings.nonce_expire_minutes,
        token_lifetime_min = settings.token_expire_minutes,
        "settings loaded"
    );

    let data_dir: PathBuf = env::var(ENV_DATA_DIR)
        .unwrap_or_else(|_| "./data".to_string())
        .into();
    let agents = AgentRegistry::load_from_dir(&data_dir);
    if agents.is_empty() {
        tracing::warn!(dir = %data_dir.display(), "no agents loaded, handshakes will fail");
    }

    // Hosted documents resolve locally; peers still go over the network.
    let resolver = DidResolver::new();
    for did in agents.dids() {
        if let Some(agent) = agents.get(did) {
            match agent.load_document() {
                Ok(document) => resolver.register_local(document).await,
                Err(err) => tracing::warn!(did, %err, "could not publish local document"),
            }
        }
    }

    let state = AppState::new(settings, agents, resolver);
    let app = router(state);

    let host = env::var(ENV_HOST).unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env::var(ENV_PORT)
        .unwrap_or_else(|_| "9527".to_string())
        .parse()
        .unwrap_or(9527);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .expect("Failed to parse bind address");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listen address");
    tracing::info!(%addr, "DID auth server listening (docs at /docs)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("HTTP server failed");
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,did_auth_server=debug"));

    let json_logs = env::var(ENV_LOG_FORMAT)
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("shutdown signal received");
}
