//! # Notification Controller
//!
//! The controller reconciles one resource at a time:
//!
//! 1. The resource is read from the [`ResourceStore`]; a deleted resource is
//!    dropped.
//! 2. The optional skip predicate may leave the resource alone.
//! 3. Destinations are resolved per trigger, then passed to the optional
//!    [`DestinationsHook`].
//! 4. Every condition of every trigger is evaluated. A condition that does
//!    not hold clears its notification records; one that holds notifies each
//!    destination that has no record yet.
//! 5. The notification state is persisted on the resource when it changed.
//!
//! Evaluation errors count as "not triggered", a render error abandons the
//! trigger and a failed delivery reverts its record so the next pass retries.
//! None of these fail the pass.

mod builder;
pub mod hooks;
pub mod queue;
mod state_tracker;

use std::{panic::AssertUnwindSafe, sync::Arc};

pub use builder::{ControllerBuildError, ControllerBuilder};
use futures::FutureExt;
pub use hooks::{
    DestinationsHook, ParentSubscriptionsHook, SkipProcessing, operation_finished_after_refresh,
};
pub use queue::WorkQueue;
use serde_json::{Map, Value};
use state_tracker::StateTracker;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{
    metrics::MetricsSink,
    models::Resource,
    settings::{ConfigProvider, EngineConfig, SettingsError},
    store::{ResourceStore, StoreError},
};

/// Errors that fail a reconcile pass.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The engine configuration is unavailable.
    #[error("Configuration error: {0}")]
    Config(#[from] SettingsError),

    /// Reading or patching the resource failed.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Counters of a completed pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Notifications delivered.
    pub sent: usize,
    /// Deliveries that failed.
    pub failed: usize,
    /// Triggered destinations skipped because they were already notified.
    pub already_notified: usize,
    /// Whether the notification state was written back.
    pub persisted: bool,
}

/// How a reconcile pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// The resource no longer exists.
    NotFound,
    /// The skip predicate left the resource alone.
    Skipped(String),
    /// No destination is subscribed to the resource.
    NoDestinations,
    /// Triggers were evaluated.
    Processed(PassReport),
}

/// Reconciles resources against the notification configuration.
pub struct NotificationController {
    store: Arc<dyn ResourceStore>,
    config_provider: Arc<dyn ConfigProvider>,
    metrics: Arc<dyn MetricsSink>,
    resource_variable: String,
    max_state_size: usize,
    skip_processing: Option<SkipProcessing>,
    destinations_hook: Option<Arc<dyn DestinationsHook>>,
}

impl NotificationController {
    /// Returns a builder.
    pub fn builder() -> ControllerBuilder {
        ControllerBuilder::new()
    }

    /// Reconciles the resource stored under `key`.
    #[tracing::instrument(level = "debug", skip(self))]
    pub async fn process_key(&self, key: &str) -> Result<PassOutcome, ControllerError> {
        let Some(resource) = self.store.get(key).await? else {
            tracing::debug!(resource = %key, "Resource no longer exists");
            return Ok(PassOutcome::NotFound);
        };

        if let Some(skip) = &self.skip_processing
            && let Some(reason) = skip(&resource)
        {
            tracing::info!(resource = %key, reason = %reason, "Skipping resource");
            return Ok(PassOutcome::Skipped(reason));
        }

        let config = self.config_provider.get_config()?;
        self.process_resource(&resource, &config).await
    }

    /// The variables bound into conditions and templates.
    pub fn variables(&self, resource: &Resource, config: &EngineConfig) -> Map<String, Value> {
        let mut vars = Map::new();
        vars.insert(self.resource_variable.clone(), resource.as_variable_map().clone());
        vars.insert("context".to_string(), Value::Object(config.context.clone()));
        vars
    }

    /// Runs one reconcile pass over `resource` with `config`.
    pub async fn process_resource(
        &self,
        resource: &Resource,
        config: &EngineConfig,
    ) -> Result<PassOutcome, ControllerError> {
        let mut destinations = config.destinations(resource);
        if let Some(hook) = &self.destinations_hook {
            destinations = hook.alter(resource, destinations, config).await;
        }
        if destinations.is_empty() {
            tracing::debug!(resource = %resource.key(), "No destinations");
            return Ok(PassOutcome::NoDestinations);
        }

        tracing::info!(resource = %resource.key(), triggers = destinations.len(), "Processing resource");
        let vars = self.variables(resource, config);
        let mut tracker = StateTracker::new(self.store.as_ref(), resource, &config.state_annotation());
        let mut report = PassReport::default();

        'triggers: for (trigger, trigger_destinations) in destinations.iter() {
            let results = match config.triggers.run(trigger, &vars) {
                Ok(results) => results,
                Err(e) => {
                    tracing::error!(resource = %tracker.key(), trigger = %trigger, error = %e, "Failed to execute trigger");
                    continue;
                }
            };

            for result in &results {
                self.metrics.inc_trigger_evaluations(trigger, result.triggered);

                if !result.triggered {
                    for destination in trigger_destinations {
                        tracker.set_already_notified(trigger, result, destination, false).await;
                    }
                    continue;
                }

                for destination in trigger_destinations {
                    if !tracker.set_already_notified(trigger, result, destination, true).await {
                        tracing::info!(
                            resource = %tracker.key(),
                            trigger = %trigger,
                            condition = %result.key,
                            destination = %destination,
                            "Notification already sent"
                        );
                        report.already_notified += 1;
                        continue;
                    }

                    let mut render_vars = vars.clone();
                    render_vars.insert("serviceType".to_string(), Value::String(destination.service.clone()));

                    let notification = match config.templates.render(&result.templates, &Value::Object(render_vars)) {
                        Ok(notification) => notification,
                        Err(e) => {
                            tracing::error!(
                                resource = %tracker.key(),
                                trigger = %trigger,
                                templates = ?result.templates,
                                error = %e,
                                "Failed to render notification"
                            );
                            tracker.set_already_notified(trigger, result, destination, false).await;
                            continue 'triggers;
                        }
                    };

                    tracing::info!(
                        resource = %tracker.key(),
                        trigger = %trigger,
                        condition = %result.key,
                        destination = %destination,
                        preview = %notification.preview(),
                        "Sending notification"
                    );
                    match config.services.send(&notification, destination).await {
                        Ok(()) => {
                            self.metrics.inc_deliveries(trigger, &destination.service, true);
                            report.sent += 1;
                        }
                        Err(e) => {
                            tracing::error!(
                                resource = %tracker.key(),
                                trigger = %trigger,
                                destination = %destination,
                                error = %e,
                                "Failed to notify recipient"
                            );
                            tracker.set_already_notified(trigger, result, destination, false).await;
                            self.metrics.inc_deliveries(trigger, &destination.service, false);
                            report.failed += 1;
                        }
                    }
                }
            }
        }

        let key = tracker.key().to_string();
        if let Some(patch) = tracker.into_patch(self.max_state_size) {
            self.store.patch(&key, &patch).await?;
            tracing::debug!(resource = %key, "Persisted notification state");
            report.persisted = true;
        }
        Ok(PassOutcome::Processed(report))
    }

    /// Processes keys from `queue` until it is shut down and drained.
    ///
    /// A pass that fails or panics is logged and its key marked done; the
    /// next change or resync of the resource retries it.
    pub async fn run_worker(&self, id: usize, queue: &WorkQueue) {
        tracing::debug!(worker = id, "Worker started");
        while let Some(key) = queue.get().await {
            let pass = AssertUnwindSafe(self.process_key(&key)).catch_unwind().await;
            match pass {
                Ok(Ok(outcome)) => {
                    tracing::debug!(worker = id, resource = %key, ?outcome, "Resource processed")
                }
                Ok(Err(e)) => {
                    tracing::error!(worker = id, resource = %key, error = %e, "Failed to process resource")
                }
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    tracing::error!(worker = id, resource = %key, panic = %message, "Recovered from panic while processing resource");
                }
            }
            queue.done(&key);
        }
        tracing::debug!(worker = id, "Worker stopped");
    }

    /// Runs `workers` workers over `queue`. The queue is shut down when
    /// `cancellation_token` is cancelled; in-flight passes complete.
    pub async fn run(
        self: Arc<Self>,
        queue: Arc<WorkQueue>,
        workers: usize,
        cancellation_token: CancellationToken,
    ) {
        let mut join_set = tokio::task::JoinSet::new();
        for id in 0..workers.max(1) {
            let controller = Arc::clone(&self);
            let queue = Arc::clone(&queue);
            join_set.spawn(async move { controller.run_worker(id, &queue).await });
        }

        cancellation_token.cancelled().await;
        queue.shut_down();
        while let Some(result) = join_set.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Worker task failed");
            }
        }
        tracing::info!("All workers stopped");
    }
}
