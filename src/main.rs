use anyhow::Result;
use axum::Router;
use local_s3::{
    config::{AppConfig, BackendKind},
    routes,
    services::storage_service::StorageService,
    storage::{backend::StorageBackend, local::LocalBackend, memory::MemoryBackend},
};
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = AppConfig::from_env_and_args()?;

    tracing::info!("Starting local-s3 with config: {:?}", cfg);

    // --- Initialize storage backend ---
    let backend: Arc<dyn StorageBackend> = match cfg.backend {
        BackendKind::Fs => {
            let backend = LocalBackend::new(&cfg.root_dir).await?;
            tracing::info!("Storing objects under {}", backend.root().display());
            Arc::new(backend)
        }
        BackendKind::Memory => {
            tracing::warn!("Using in-memory storage; objects are lost on exit");
            Arc::new(MemoryBackend::new())
        }
    };

    // --- Initialize core service ---
    let storage = StorageService::new(backend);

    // --- Build router ---
    let app: Router = routes::routes().with_state(storage);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
