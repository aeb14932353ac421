// ABOUTME: Server binary for the Threadline resumable chat API
// ABOUTME: Loads configuration, opens the message log and serves the HTTP router until shutdown
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Threadline Server Binary
//!
//! Starts the chat API with session authentication, the SQLite message log
//! and the configured model backend.

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use threadline_server::{
    auth::{generate_jwt_secret, AuthManager},
    config::{DatabaseUrl, ServerConfig},
    database::{ChatStore, Database},
    llm::build_model,
    logging,
    resources::ServerResources,
    routes::build_router,
};
use tokio::net::TcpListener;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "threadline-server")]
#[command(about = "Threadline - resumable chat streaming server")]
pub struct Args {
    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,

    /// Override database URL (`sqlite:<path>` or `sqlite::memory:`)
    #[arg(long)]
    database_url: Option<String>,

    /// Print a freshly generated value for `JWT_SECRET` and exit
    #[arg(long)]
    generate_jwt_secret: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.generate_jwt_secret {
        let secret = generate_jwt_secret()?;
        let encoded = secret.iter().fold(String::with_capacity(128), |mut out, b| {
            let _ = write!(out, "{b:02x}");
            out
        });
        println!("{encoded}");
        return Ok(());
    }

    logging::init_from_env()?;

    let mut config = ServerConfig::from_env()?;
    if let Some(http_port) = args.http_port {
        config.http_port = http_port;
    }
    if let Some(database_url) = args.database_url {
        config.database.url = DatabaseUrl::parse_url(&database_url);
    }

    info!("Starting Threadline server");
    info!("{}", config.summary());

    let database = Database::new(&config.database.url).await?;
    info!("Database initialized: {}", config.database.url);
    let store: Arc<dyn ChatStore> = Arc::new(database);

    let model = build_model(&config.llm)?;
    info!("Model backend ready: {}", model.name());

    let auth_manager = AuthManager::new(
        config.auth.jwt_secret.as_bytes(),
        config.auth.jwt_expiry_hours,
    );

    let addr: SocketAddr = format!("{}:{}", config.host, config.http_port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", config.host, config.http_port))?;

    let resources = Arc::new(ServerResources::new(
        store,
        auth_manager,
        model,
        Arc::new(config),
    ));
    let app = build_router(resources);

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on http://{addr}");
    info!("  POST   /api/chat                      - start a response stream");
    info!("  GET    /api/chat/stream?chatId=&from= - reattach to the latest stream");
    info!("  DELETE /api/chat?id=                  - delete a conversation");
    info!("  GET    /api/chat/:id/messages         - list persisted turns");
    info!("  GET    /health                        - liveness");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server stopped");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Shutdown signal received");
}
