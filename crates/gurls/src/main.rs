use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use gurls_core::{config::Config, logging};
use gurls_grpc::GrpcBackend;

#[tokio::main]
async fn main() -> Result<(), gurls_core::Error> {
    let cfg = Arc::new(Config::load()?);
    logging::init("gurls", &cfg.env)?;

    info!(
        env = %cfg.env,
        backend = %cfg.backend_address,
        timeout = ?cfg.backend_timeout,
        base_url = %cfg.base_url,
        "starting gurls"
    );

    let backend = GrpcBackend::connect(
        &cfg.backend_address,
        cfg.backend_timeout,
        cfg.base_url.clone(),
    )
    .await
    .map_err(|e| {
        error!(error = %e, "failed to connect to backend");
        e
    })?;

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    gurls_telegram::router::run_polling(cfg, Arc::new(backend), shutdown)
        .await
        .map_err(|e| gurls_core::Error::External(format!("telegram bot failed: {e}")))?;

    info!("gurls stopped");
    Ok(())
}

async fn wait_for_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("shutdown signal received");
    shutdown.cancel();
}
