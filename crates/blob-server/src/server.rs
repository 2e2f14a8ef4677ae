use std::future::{Future, IntoFuture};
use std::sync::Arc;

use blob_manifest::Manifest;
use blob_store::FsBlobStore;
use blob_types::PathValidator;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use crate::admin::build_admin_router;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::router::build_router;
use crate::state::AppState;

/// Blob server: the blob service plus the optional admin service, sharing
/// one manifest.
pub struct BlobServer {
    config: ServerConfig,
    state: AppState,
}

impl BlobServer {
    /// Prepare the storage root, recover the manifest and reconcile it with
    /// the blob store. Nothing is served until this returns.
    pub async fn open(config: ServerConfig) -> ServerResult<Self> {
        tokio::fs::create_dir_all(&config.storage_root).await?;
        let store = FsBlobStore::open(&config.storage_root, config.sync_writes).await?;
        let manifest =
            Manifest::open(config.journal_path(), Arc::new(store), config.sync_writes).await?;
        let validator = PathValidator::new(&config.storage_root);
        Ok(Self::with_state(config, AppState::new(manifest, validator)))
    }

    /// Assemble a server around existing state.
    pub fn with_state(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Build the blob router (useful for testing).
    pub fn router(&self) -> axum::Router {
        build_router(self.state.clone())
    }

    /// Build the admin router (useful for testing).
    pub fn admin_router(&self) -> axum::Router {
        build_admin_router(self.state.clone())
    }

    /// Serve until Ctrl-C.
    pub async fn serve(self) -> ServerResult<()> {
        self.serve_with_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("shutdown signal received");
        })
        .await
    }

    /// Bind the configured addresses and serve until `shutdown` resolves.
    pub async fn serve_with_shutdown<F>(self, shutdown: F) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let admin = match self.config.admin_addr {
            Some(addr) => Some(TcpListener::bind(addr).await?),
            None => None,
        };
        self.serve_on(listener, admin, shutdown).await
    }

    /// Serve on already-bound listeners until `shutdown` resolves.
    ///
    /// In-flight requests on both services are drained before returning.
    pub async fn serve_on<F>(
        self,
        listener: TcpListener,
        admin: Option<TcpListener>,
        shutdown: F,
    ) -> ServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            shutdown.await;
            let _ = tx.send(true);
        });

        info!(addr = %listener.local_addr()?, "blob service listening");
        let blob = axum::serve(listener, self.router())
            .with_graceful_shutdown(wait_for(rx.clone()));

        match admin {
            Some(admin) => {
                info!(addr = %admin.local_addr()?, "admin service listening");
                let admin = axum::serve(admin, self.admin_router())
                    .with_graceful_shutdown(wait_for(rx));
                tokio::try_join!(blob.into_future(), admin.into_future())
                    .map_err(|e| ServerError::Internal(e.to_string()))?;
            }
            None => blob.await.map_err(|e| ServerError::Internal(e.to_string()))?,
        }

        info!("server stopped");
        Ok(())
    }
}

async fn wait_for(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}
