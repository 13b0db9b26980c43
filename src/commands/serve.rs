use anyhow::{Context, Result};

use shardstore::coordinator::{NodeConfig, NodeServer};

/// Run one node until Ctrl-C
pub async fn serve(config: NodeConfig) -> Result<()> {
    let role = config.role;
    let server = NodeServer::bind(config)
        .await
        .with_context(|| format!("Failed to start {role} node"))?;

    let info = server.info().await;
    tracing::info!(role = %role, "\n{}", info.display());

    server
        .serve_with_shutdown(shutdown_signal())
        .await
        .with_context(|| format!("{role} node failed"))?;

    tracing::info!(role = %role, "shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl-C; serving until killed");
        std::future::pending::<()>().await;
    }
}
