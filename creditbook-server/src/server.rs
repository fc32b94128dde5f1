//! creditbook-server/src/server.rs
//!
//! Binds the HTTP listener and serves the API until ctrl-c.

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info};

use creditbook_core::api::router;

use crate::context::ServerContext;
use crate::Args;

pub async fn run_server(args: Args) -> anyhow::Result<()> {
    let ctx = ServerContext::new(&args).await?;
    let app = router(ctx.state.clone());

    let listener = TcpListener::bind(&args.bind_addr)
        .await
        .with_context(|| format!("binding {}", args.bind_addr))?;
    info!("HTTP API listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    if let Some(db) = ctx.db {
        db.close().await;
    }
    info!("Server shutting down.");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Ctrl-C received; shutting down."),
        Err(e) => error!("Failed to listen for ctrl-c: {:?}", e),
    }
}
