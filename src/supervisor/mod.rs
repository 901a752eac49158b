//! The Supervisor module manages the lifecycle of the Herald application.
//!
//! This module implements the **Supervisor Pattern**: one top-level owner for
//! the long-running tasks of the engine.
//!
//! ## Responsibilities
//!
//! - **Initialization**: The `SupervisorBuilder` wires the resource store, the
//!   configuration provider and the controller together, and validates the
//!   notification settings before anything starts.
//! - **Lifecycle Management**: The `Supervisor` starts the reconcile workers,
//!   the periodic resync and the settings watcher.
//! - **Graceful Shutdown**: It listens for shutdown signals (Ctrl+C or
//!   SIGTERM), stops the work queue and waits for in-flight passes up to the
//!   configured timeout.
//! - **Task Supervision**: If a supervised task fails, every other task is
//!   shut down so the process never keeps running half-functional.

mod builder;

use std::sync::Arc;

pub use builder::SupervisorBuilder;
use thiserror::Error;
use tokio::{signal, task::JoinSet};
use tokio_util::sync::CancellationToken;

use crate::{
    config::AppConfig,
    controller::{ControllerBuildError, NotificationController, WorkQueue},
    settings::{CachedConfigProvider, SettingsError},
    store::{ResourceStore, StoreError},
};

/// Represents the set of errors that can occur during the supervisor's
/// operation.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// A required configuration was not provided to the `SupervisorBuilder`.
    #[error("Missing configuration for Supervisor")]
    MissingConfig,

    /// The notification settings are invalid.
    #[error("Invalid notification settings: {0}")]
    Settings(#[from] SettingsError),

    /// The controller could not be built.
    #[error("Controller error: {0}")]
    Controller(#[from] ControllerBuildError),

    /// The resource store failed.
    #[error("Resource store error: {0}")]
    Store(#[from] StoreError),
}

/// The primary runtime manager for the application.
pub struct Supervisor {
    config: Arc<AppConfig>,
    store: Arc<dyn ResourceStore>,
    config_provider: Arc<CachedConfigProvider>,
    controller: Arc<NotificationController>,
    queue: Arc<WorkQueue>,
    cancellation_token: CancellationToken,
    join_set: JoinSet<()>,
}

impl Supervisor {
    /// Returns a new `SupervisorBuilder` instance.
    pub fn builder() -> SupervisorBuilder {
        SupervisorBuilder::new()
    }

    /// A token that stops the supervisor when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    /// The queue feeding the workers.
    pub fn queue(&self) -> Arc<WorkQueue> {
        Arc::clone(&self.queue)
    }

    /// Enqueues every resource of the store.
    pub async fn enqueue_all(&self) -> Result<usize, StoreError> {
        enqueue_all(self.store.as_ref(), &self.queue).await
    }

    /// Starts every service and runs until a shutdown signal, a cancellation
    /// of [`cancellation_token`](Self::cancellation_token) or the failure of a
    /// supervised task.
    pub async fn run(mut self) -> Result<(), SupervisorError> {
        self.spawn_signal_handler();

        // Workers.
        let controller = Arc::clone(&self.controller);
        let queue = Arc::clone(&self.queue);
        let workers = self.config.workers;
        let token = self.cancellation_token.clone();
        self.join_set.spawn(async move { controller.run(queue, workers, token).await });

        // Resync: every resource is enqueued periodically, starting now.
        let store = Arc::clone(&self.store);
        let queue = Arc::clone(&self.queue);
        let token = self.cancellation_token.clone();
        let resync_interval = self.config.resync_interval_secs;
        self.join_set.spawn(async move {
            let mut interval = tokio::time::interval(resync_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match enqueue_all(store.as_ref(), &queue).await {
                            Ok(count) => tracing::debug!(count, "Enqueued resources for resync"),
                            Err(e) => tracing::error!(error = %e, "Failed to list resources"),
                        }
                    }
                    _ = token.cancelled() => break,
                }
            }
        });

        // Settings watcher: a changed settings file invalidates the cached
        // configuration and triggers a full resync.
        let provider = Arc::clone(&self.config_provider);
        let store = Arc::clone(&self.store);
        let queue = Arc::clone(&self.queue);
        let token = self.cancellation_token.clone();
        let poll_interval = self.config.config_poll_interval_secs;
        self.join_set.spawn(async move {
            let mut interval = tokio::time::interval(poll_interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if provider.poll_changes() {
                            if let Err(e) = enqueue_all(store.as_ref(), &queue).await {
                                tracing::error!(error = %e, "Failed to list resources");
                            }
                        }
                    }
                    _ = token.cancelled() => break,
                }
            }
        });

        tracing::info!(workers = self.config.workers, "Supervisor started");

        loop {
            tokio::select! {
                maybe_result = self.join_set.join_next() => {
                    match maybe_result {
                        Some(Ok(())) => {
                            if !self.cancellation_token.is_cancelled() {
                                tracing::warn!("A supervised task exited early. Initiating shutdown.");
                                self.cancellation_token.cancel();
                            }
                        }
                        Some(Err(e)) => {
                            tracing::error!("A critical task failed: {:?}. Initiating shutdown.", e);
                            self.cancellation_token.cancel();
                        }
                        None => break,
                    }
                }
                _ = self.cancellation_token.cancelled() => break,
            }
        }

        // --- Graceful Shutdown ---
        self.queue.shut_down();
        let shutdown_timeout = self.config.shutdown_timeout;
        let drain = async { while self.join_set.join_next().await.is_some() {} };
        if tokio::time::timeout(shutdown_timeout, drain).await.is_err() {
            tracing::warn!(
                "In-flight work did not complete within the timeout of {:?}. Aborting.",
                shutdown_timeout
            );
            self.join_set.shutdown().await;
        }

        tracing::info!("Supervisor shutdown complete.");
        Ok(())
    }

    fn spawn_signal_handler(&mut self) {
        let cancellation_token = self.cancellation_token.clone();
        self.join_set.spawn(async move {
            let ctrl_c = signal::ctrl_c();
            #[cfg(unix)]
            let terminate = async {
                match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(mut stream) => {
                        stream.recv().await;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to register SIGTERM handler");
                        std::future::pending::<()>().await;
                    }
                }
            };
            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => tracing::info!("SIGINT (Ctrl+C) received, initiating graceful shutdown."),
                _ = terminate => tracing::info!("SIGTERM received, initiating graceful shutdown."),
                _ = cancellation_token.cancelled() => return,
            }

            cancellation_token.cancel();
        });
    }
}

async fn enqueue_all(store: &dyn ResourceStore, queue: &WorkQueue) -> Result<usize, StoreError> {
    let keys = store.list_keys().await?;
    for key in &keys {
        queue.add(key);
    }
    Ok(keys.len())
}
