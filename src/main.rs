use anyhow::{Context, Result};
use axum::Router;
use media_catalog::{
    config::AppConfig,
    db,
    routes,
    services::object_store::{LocalObjectStore, ObjectStore},
    state::AppState,
};
use std::{fs, io::ErrorKind, path::Path, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting media-catalog with config: {:?}", cfg);

    // --- Initialize SQLite connection ---
    let db = db::connect(&cfg.database_url, cfg.max_connections, cfg.min_connections).await?;

    // --- Apply schema (idempotent); exit in migration mode ---
    db::run_migrations(&db).await?;
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(());
    }

    // --- Select object store backend ---
    let (objects, local_objects) = object_store(&cfg).await?;
    tracing::info!("Object store backend: {}", objects.backend());

    // --- Build router ---
    let state = AppState::new(&cfg, db, objects, local_objects);
    let app: Router = routes::routes::routes(state, cfg.max_upload_bytes);

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

type Backends = (Arc<dyn ObjectStore>, Option<Arc<LocalObjectStore>>);

/// S3 when a bucket is configured (feature `s3`), local disk otherwise.
async fn object_store(cfg: &AppConfig) -> Result<Backends> {
    #[cfg(feature = "s3")]
    if let Some(s3) = &cfg.s3 {
        let store = media_catalog::services::object_store::S3ObjectStore::new(
            s3.bucket.clone(),
            s3.region.clone(),
            s3.endpoint_url.clone(),
        )
        .await;
        return Ok((Arc::new(store), None));
    }

    // --- Ensure storage directory exists ---
    if !Path::new(&cfg.storage_dir).exists() {
        fs::create_dir_all(&cfg.storage_dir)
            .with_context(|| format!("creating storage directory {}", cfg.storage_dir))?;
        tracing::info!("Created storage directory at {}", cfg.storage_dir);
    }

    let local = Arc::new(LocalObjectStore::new(
        cfg.storage_dir.clone(),
        cfg.public_base_url.clone(),
        cfg.url_signing_secret.expose(),
    ));
    Ok((local.clone(), Some(local)))
}
