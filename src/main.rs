use std::sync::Arc;
use tracing::{info, warn, Subscriber};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use grc_evidence::{
    api, audit_log,
    config::{Config, DatabaseBackend, StorageBackend},
    health,
    object_store as obj,
    storage::{Database, MySqlRecordStore, RecordStore},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?;

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,audit_trail=debug".into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    match log_format.to_lowercase().as_str() {
        "gcp" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_stackdriver::layer())
                .with(audit_files(&config)?)
                .init();
        }
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_span_list(false),
                )
                .with(audit_files(&config)?)
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .with(audit_files(&config)?)
                .init();
        }
    }

    info!(version = env!("CARGO_PKG_VERSION"), "grc-evidence starting");
    if let Some(ref dir) = config.audit_log_dir {
        info!("Audit trail files in: {}", dir);
    }

    let object_store = build_object_store(&config);
    let records = build_record_store(&config).await?;

    let report = health::check(object_store.as_ref(), records.as_ref()).await;
    info!(
        status = ?report.status,
        storage = report.storage.status,
        storage_error = report.storage.error.as_deref().unwrap_or(""),
        database = report.database.status,
        database_error = report.database.error.as_deref().unwrap_or(""),
        "Dependency status"
    );

    let state = Arc::new(AppState::new(config.clone(), object_store, records));

    // Build and start the HTTP server
    let app = api::create_router(Arc::clone(&state));
    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    info!("Listening on: {}", config.server.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(ref records) = state.records {
        info!("Closing database connections");
        records.close().await;
    }

    info!("Shutdown complete");
    Ok(())
}

/// Audit-trail file sinks, when a directory is configured.
fn audit_files<S>(config: &Config) -> anyhow::Result<Option<impl Layer<S>>>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    match config.audit_log_dir {
        Some(ref dir) => Ok(Some(audit_log::file_layers(dir.clone())?)),
        None => Ok(None),
    }
}

/// Object storage is optional: without it uploads take the fallback path.
fn build_object_store(config: &Config) -> Option<Arc<dyn obj::ObjectStore>> {
    match config.storage.backend {
        StorageBackend::Disabled => {
            warn!("Object storage disabled; uploads will return fallback URLs");
            None
        }
        StorageBackend::Local => {
            let secret = match config.storage.local_signing_secret {
                Some(ref secret) => secret.as_bytes().to_vec(),
                None => {
                    warn!("LOCAL_SIGNING_SECRET not set; download links will not survive a restart");
                    let mut secret = uuid::Uuid::new_v4().as_bytes().to_vec();
                    secret.extend_from_slice(uuid::Uuid::new_v4().as_bytes());
                    secret
                }
            };

            match obj::LocalStore::new(
                &config.storage.local_storage_path,
                &config.server.public_base_url,
                &secret,
            ) {
                Ok(store) => {
                    info!(
                        "Using local storage backend at: {}",
                        config.storage.local_storage_path
                    );
                    Some(Arc::new(store))
                }
                Err(e) => {
                    tracing::error!(
                        path = %config.storage.local_storage_path,
                        error = %e,
                        "Local storage unavailable; uploads will return fallback URLs"
                    );
                    None
                }
            }
        }
        StorageBackend::S3 => {
            let s3 = config.storage.s3.as_ref()?;
            match obj::S3Store::new(s3) {
                Ok(store) => {
                    info!(bucket = %s3.bucket, region = %s3.region, "Using S3 storage backend");
                    Some(Arc::new(store))
                }
                Err(e) => {
                    tracing::error!(error = %e, "S3 storage unavailable; uploads will return fallback URLs");
                    None
                }
            }
        }
    }
}

async fn build_record_store(config: &Config) -> anyhow::Result<Option<Arc<dyn RecordStore>>> {
    match config.database.backend {
        DatabaseBackend::Redb => {
            let db = Database::open(&config.database.data_dir)?;
            info!("Database opened at: {}", config.database.data_dir);
            Ok(Some(Arc::new(db)))
        }
        DatabaseBackend::MySql => {
            let mysql = config
                .database
                .mysql
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("MySQL settings missing"))?;
            let store = MySqlRecordStore::new(mysql);
            if let Err(e) = store.migrate().await {
                warn!(error = %e, "Could not prepare s3_files table; continuing degraded");
            }
            Ok(Some(Arc::new(store)))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining connections");
}
