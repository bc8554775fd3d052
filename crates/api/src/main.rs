use anyhow::Context;

use tilestock_infra::{InventoryConfig, InventoryService};

const BIND_ADDR_VAR: &str = "TILESTOCK_BIND_ADDR";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tilestock_observability::init();

    let config = InventoryConfig::from_env().context("invalid inventory configuration")?;
    let sweep_interval = config.sweep_interval;
    let service = InventoryService::in_memory(config);

    let sweeper = service
        .sweeper()
        .spawn(sweep_interval)
        .context("failed to start expiry sweeper")?;

    let bind_addr =
        std::env::var(BIND_ADDR_VAR).unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;

    tracing::info!(
        addr = %listener.local_addr()?,
        sweep_interval_secs = sweep_interval.as_secs(),
        "listening"
    );

    let app = tilestock_api::app::build_app(service);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("server error")?;

    tokio::task::spawn_blocking(move || sweeper.shutdown())
        .await
        .context("expiry sweeper shutdown")?;
    tracing::info!("shut down");
    Ok(())
}
