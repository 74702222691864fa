use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, Result};
use axum::Router;
use axum_server::Handle;
use blob_store::BlobStorage;
use state_store::RegistryState;
use tokio::signal;
use tracing::{error, info};

use crate::{
    catalog::Catalog,
    config::ServerConfig,
    ingest::BuildIngestor,
    routes::{create_routes, RouteState},
};

#[derive(Clone)]
pub struct Service {
    pub config: ServerConfig,
    pub blob_storage: Arc<BlobStorage>,
    pub registry_state: Arc<RegistryState>,
    pub ingestor: Arc<BuildIngestor>,
    pub catalog: Arc<Catalog>,
}

impl Service {
    pub async fn new(config: ServerConfig) -> Result<Self> {
        let blob_storage = Arc::new(
            BlobStorage::new(config.blob_storage.clone())
                .context("error initializing BlobStorage")?,
        );
        let registry_state = RegistryState::new(config.state_store_path.parse()?)
            .await
            .context("error initializing state store")?;
        let ingestor = Arc::new(BuildIngestor::new(
            registry_state.clone(),
            blob_storage.clone(),
        ));
        let catalog = Arc::new(Catalog::new(registry_state.clone(), blob_storage.clone()));

        Ok(Self {
            config,
            blob_storage,
            registry_state,
            ingestor,
            catalog,
        })
    }

    pub fn routes(&self) -> Router {
        let route_state = RouteState {
            ingestor: self.ingestor.clone(),
            catalog: self.catalog.clone(),
            blob_storage: self.blob_storage.clone(),
            create_key: self.config.create_key.as_str().into(),
            api_prefix: self.config.api_prefix.as_str().into(),
        };
        create_routes(route_state, &self.config)
    }

    pub async fn start(&self) -> Result<()> {
        let handle = Handle::new();
        let handle_sh = handle.clone();
        tokio::spawn(async move {
            shutdown_signal(handle_sh).await;
            info!("graceful shutdown signal received, shutting down server gracefully");
        });

        let addr: SocketAddr = self.config.listen_addr.parse()?;
        info!(
            version = env!("CARGO_PKG_VERSION"),
            db_version = self.registry_state.db_version,
            "server api listening on {}, api prefix {}",
            self.config.listen_addr,
            self.config.api_prefix
        );
        axum_server::bind(addr)
            .handle(handle)
            .serve(self.routes().into_make_service())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal(handle: Handle) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {:?}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {:?}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
        },
        _ = terminate => {
        },
    }
    handle.graceful_shutdown(None);
    info!("signal received, shutting down server gracefully");
}
