//! Serve command implementation.

use super::{env_config, open_data_dir};
use pixboard_server::{Backends, PixboardServer};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Runs the server until Ctrl-C.
pub fn run(
    data_dir: Option<&Path>,
    bind: Option<SocketAddr>,
    admin_bind: Option<SocketAddr>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = env_config()?;
    if let Some(bind) = bind {
        config.bind_addr = bind;
    }
    if let Some(admin_bind) = admin_bind {
        config.admin_addr = Some(admin_bind);
    }

    let backends = match data_dir {
        Some(dir) => {
            let (kv, store) = open_data_dir(dir)?;
            info!(path = %dir.display(), "using data directory");
            Backends::new(Arc::new(kv), Arc::new(store))
        }
        None => {
            warn!("running in memory, nothing will be persisted");
            Backends::in_memory()
        }
    };

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async move {
        let server = PixboardServer::bind(config, backends).await?;
        if let Some(admin) = server.admin_addr() {
            info!(%admin, "admin events accepted");
        }
        server.run(shutdown_signal()).await
    })?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "cannot listen for Ctrl-C, stop the process to exit");
        std::future::pending::<()>().await;
    }
}
