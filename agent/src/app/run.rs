//! Main application run loop

use std::future::Future;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::app::options::{AppOptions, LifecycleOptions};
use crate::app::state::AppState;
use crate::errors::AgentError;
use crate::server::serve::serve;
use crate::server::state::ServerState;
use crate::workers::{scheduler, watcher};

/// Run the deployd agent
pub async fn run(
    agent_version: String,
    options: AppOptions,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<(), AgentError> {
    info!("Initializing deployd agent v{}...", agent_version);

    // Create shutdown channel
    let (shutdown_tx, _shutdown_rx): (broadcast::Sender<()>, _) = broadcast::channel(1);
    let mut shutdown_manager = ShutdownManager::new(shutdown_tx.clone(), options.lifecycle.clone());

    if let Err(e) = init(&options, shutdown_tx.clone(), &mut shutdown_manager).await {
        error!("Failed to start agent: {}", e);
        shutdown_manager.shutdown().await?;
        return Err(e);
    }

    shutdown_signal.await;
    info!("Shutdown signal received, shutting down...");

    drop(shutdown_tx);
    shutdown_manager.shutdown().await
}

// =============================== INITIALIZATION ================================== //

async fn init(
    options: &AppOptions,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_manager: &mut ShutdownManager,
) -> Result<(), AgentError> {
    let app_state = Arc::new(AppState::init(&options.layout, options.deploy_user.clone())?);

    init_scheduler_worker(
        options,
        app_state.clone(),
        shutdown_manager,
        shutdown_tx.subscribe(),
    )?;

    if options.enable_http_server {
        init_http_server(
            options,
            shutdown_manager,
            shutdown_tx.subscribe(),
        )
        .await?;
    }

    Ok(())
}

fn init_scheduler_worker(
    options: &AppOptions,
    app_state: Arc<AppState>,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), AgentError> {
    info!("Initializing scheduler worker...");

    let (watch_tx, watch_rx) = tokio::sync::mpsc::unbounded_channel();
    let inbox_watcher = watcher::watch_inbox(options.layout.pending_dir().path(), watch_tx)?;
    let scheduler_options = options.scheduler.clone();

    let scheduler_handle = tokio::spawn(async move {
        // The watcher stops when dropped, keep it alive with the task
        let _inbox_watcher = inbox_watcher;
        scheduler::run(
            &scheduler_options,
            app_state.lifecycle.as_ref(),
            app_state.runner.as_ref(),
            watch_rx,
            tokio::time::sleep,
            Box::pin(async move {
                let _ = shutdown_rx.recv().await;
            }),
        )
        .await;
    });

    shutdown_manager.with_scheduler_worker_handle(scheduler_handle)?;
    Ok(())
}

async fn init_http_server(
    options: &AppOptions,
    shutdown_manager: &mut ShutdownManager,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), AgentError> {
    info!("Initializing HTTP trigger server...");

    let server_state = ServerState::new(&options.layout);

    let server_handle = serve(&options.server, Arc::new(server_state), async move {
        let _ = shutdown_rx.recv().await;
    })
    .await?;

    shutdown_manager.with_http_server_handle(server_handle)?;
    Ok(())
}

// ================================= SHUTDOWN ===================================== //

struct ShutdownManager {
    shutdown_tx: broadcast::Sender<()>,
    lifecycle_options: LifecycleOptions,
    scheduler_worker_handle: Option<JoinHandle<()>>,
    http_server_handle: Option<JoinHandle<Result<(), AgentError>>>,
}

impl ShutdownManager {
    pub fn new(shutdown_tx: broadcast::Sender<()>, lifecycle_options: LifecycleOptions) -> Self {
        Self {
            shutdown_tx,
            lifecycle_options,
            scheduler_worker_handle: None,
            http_server_handle: None,
        }
    }

    pub fn with_scheduler_worker_handle(
        &mut self,
        handle: JoinHandle<()>,
    ) -> Result<(), AgentError> {
        if self.scheduler_worker_handle.is_some() {
            return Err(AgentError::ShutdownError(
                "scheduler_handle already set".to_string(),
            ));
        }
        self.scheduler_worker_handle = Some(handle);
        Ok(())
    }

    pub fn with_http_server_handle(
        &mut self,
        handle: JoinHandle<Result<(), AgentError>>,
    ) -> Result<(), AgentError> {
        if self.http_server_handle.is_some() {
            return Err(AgentError::ShutdownError(
                "server_handle already set".to_string(),
            ));
        }
        self.http_server_handle = Some(handle);
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<(), AgentError> {
        let _ = self.shutdown_tx.send(());

        match tokio::time::timeout(
            self.lifecycle_options.max_shutdown_delay,
            self.shutdown_impl(),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(
                    "Shutdown timed out after {:?}, forcing shutdown...",
                    self.lifecycle_options.max_shutdown_delay
                );
                std::process::exit(1);
            }
        }
    }

    async fn shutdown_impl(&mut self) -> Result<(), AgentError> {
        info!("Shutting down deployd agent...");

        // 1. Scheduler worker (finishes the in-flight job first)
        if let Some(handle) = self.scheduler_worker_handle.take() {
            handle
                .await
                .map_err(|e| AgentError::ShutdownError(e.to_string()))?;
        }

        // 2. HTTP server
        if let Some(handle) = self.http_server_handle.take() {
            handle
                .await
                .map_err(|e| AgentError::ShutdownError(e.to_string()))??;
        }

        info!("Shutdown complete");
        Ok(())
    }
}
