//! Server setup and lifecycle management

use crate::api::{create_router, AppState};
use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult};
use crate::storage;
use convoy_inventory::{InMemoryInventory, Inventory};
use convoy_invoker::{ReconcilerEndpoints, RemoteInvoker};
use convoy_scheduler::{Bookkeeper, Cleaner, ClusterStatusTransition, Scheduler};
use convoy_store::ReconciliationRepository;
use convoy_worker::{InventoryRetriever, WorkerPool};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Convoy daemon server
pub struct Server {
    config: DaemonConfig,
    inventory: Arc<dyn Inventory>,
    repo: Arc<dyn ReconciliationRepository>,
}

impl Server {
    pub async fn new(config: DaemonConfig) -> DaemonResult<Self> {
        let repo = storage::connect(&config.storage).await?;
        let inventory: Arc<dyn Inventory> = Arc::new(InMemoryInventory::new());
        Ok(Self {
            config,
            inventory,
            repo,
        })
    }

    /// Run the API and all background loops until a shutdown signal arrives
    pub async fn run(self) -> DaemonResult<()> {
        let addr = self.config.server.listen_addr;
        let cancel = CancellationToken::new();
        let loops = self.spawn_loops(&cancel)?;

        let state = AppState::new(self.inventory.clone(), self.repo.clone());
        let app = create_router(state, self.config.server.enable_cors);
        let listener = TcpListener::bind(addr).await?;
        tracing::info!("Convoy daemon listening on {}", addr);

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| DaemonError::Server(e.to_string()));

        tracing::info!("Convoy daemon shutting down");
        cancel.cancel();
        for handle in loops {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Background loop panicked");
            }
        }

        served
    }

    fn spawn_loops(&self, cancel: &CancellationToken) -> DaemonResult<Vec<JoinHandle<()>>> {
        let transition = Arc::new(ClusterStatusTransition::new(
            self.inventory.clone(),
            self.repo.clone(),
        ));

        let invoker_config = &self.config.invoker;
        let mut endpoints = ReconcilerEndpoints::new();
        for (component, url) in &invoker_config.endpoints {
            endpoints = endpoints.register(component.clone(), url.clone());
        }
        if let Some(fallback) = &invoker_config.fallback {
            endpoints = endpoints.with_fallback(fallback.clone());
        }
        tracing::info!(reconcilers = ?endpoints.names(), "Component reconcilers configured");

        let invoker = RemoteInvoker::new(
            self.repo.clone(),
            Arc::new(endpoints),
            invoker_config.callback.clone(),
            Duration::from_secs(invoker_config.request_timeout_secs),
        )?;
        let pool = Arc::new(WorkerPool::new(
            Arc::new(InventoryRetriever::new(self.inventory.clone())),
            self.repo.clone(),
            Arc::new(invoker),
            &self.config.worker,
        )?);

        let scheduler = Arc::new(Scheduler::new(
            transition.clone(),
            self.config.scheduler.clone(),
        ));
        let bookkeeper = Arc::new(Bookkeeper::new(
            transition,
            self.config.bookkeeper.clone(),
        ));
        let cleaner = Arc::new(Cleaner::new(self.repo.clone(), self.config.cleaner.clone()));

        let mut handles = Vec::new();

        let token = cancel.clone();
        handles.push(tokio::spawn(async move { scheduler.run(&token).await }));

        let token = cancel.clone();
        handles.push(tokio::spawn(async move {
            if let Err(e) = pool.run(&token).await {
                tracing::error!(error = %e, "Worker pool stopped with error");
            }
        }));

        let token = cancel.clone();
        handles.push(tokio::spawn(async move { bookkeeper.run(&token).await }));

        let token = cancel.clone();
        handles.push(tokio::spawn(async move { cleaner.run(&token).await }));

        Ok(handles)
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
