use anyhow::{Context, Result};
use axum::Router;
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod config;
mod db;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

use config::{AppConfig, ObjectBackend};
use services::{
    object_store::{LocalObjectStore, ObjectStore},
    photo_service::{PhotoService, PublicUrl},
    s3_store::S3ObjectStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    if let Err(err) = dotenvy::dotenv() {
        if !err.not_found() {
            tracing::warn!("Ignoring unreadable .env file: {}", err);
        }
    }
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting photo-store with config: {:?}", cfg);

    // --- Initialize SQLite connection ---
    let db = Arc::new(db::connect(&cfg.database_url).await?);
    db::run_migrations(&db).await?;

    // --- Handle migration mode ---
    if migrate {
        tracing::info!("Database migration complete.");
        db.close().await;
        return Ok(()); // exit after migration
    }

    // --- Initialize object store + core service ---
    let objects: Arc<dyn ObjectStore> = match cfg.backend {
        ObjectBackend::Local => {
            tokio::fs::create_dir_all(&cfg.storage_dir)
                .await
                .with_context(|| format!("creating storage directory {}", cfg.storage_dir))?;
            tracing::info!("Storing objects on disk under {}", cfg.storage_dir);
            Arc::new(LocalObjectStore::new(&cfg.storage_dir))
        }
        ObjectBackend::S3 => {
            let settings = cfg
                .s3
                .as_ref()
                .context("S3 backend selected without S3 settings")?;
            Arc::new(S3ObjectStore::new(settings).await)
        }
    };
    let urls = PublicUrl::new(cfg.public_url_base());
    tracing::info!("Public photo URLs resolve under {}", cfg.public_url_base());

    let photos = PhotoService::new(db.clone(), objects, urls)
        .await
        .context("initializing photo id counter")?;

    // --- Build router ---
    let app: Router = routes::routes::routes(cfg.max_upload_bytes).with_state(photos);

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
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- Teardown ---
    db.close().await;
    tracing::info!("Shut down cleanly.");

    Ok(())
}

/// Resolve on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("failed to listen for SIGTERM: {}", err);
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

    tracing::info!("Shutdown signal received; draining connections");
}
