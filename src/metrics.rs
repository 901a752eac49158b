//! Delivery and evaluation counters.

use dashmap::DashMap;
use metrics::{counter, describe_counter};

/// Notifications delivered, labelled by trigger, service and outcome.
pub const DELIVERIES_TOTAL: &str = "herald_deliveries_total";

/// Trigger conditions evaluated, labelled by trigger and outcome.
pub const TRIGGER_EVALUATIONS_TOTAL: &str = "herald_trigger_eval_total";

/// Registers the metric descriptions with the installed recorder.
pub fn register_metrics() {
    describe_counter!(DELIVERIES_TOTAL, "Number of notification deliveries");
    describe_counter!(TRIGGER_EVALUATIONS_TOTAL, "Number of trigger condition evaluations");
}

/// Receives the controller's counters.
#[cfg_attr(test, mockall::automock)]
pub trait MetricsSink: Send + Sync {
    /// Counts one delivery attempt.
    fn inc_deliveries(&self, trigger: &str, service: &str, succeeded: bool);

    /// Counts one condition evaluation.
    fn inc_trigger_evaluations(&self, trigger: &str, triggered: bool);
}

/// Forwards counters to the global `metrics` recorder.
#[derive(Debug, Default, Clone, Copy)]
pub struct RecorderMetrics;

impl MetricsSink for RecorderMetrics {
    fn inc_deliveries(&self, trigger: &str, service: &str, succeeded: bool) {
        counter!(
            DELIVERIES_TOTAL,
            "trigger" => trigger.to_string(),
            "service" => service.to_string(),
            "succeeded" => succeeded.to_string()
        )
        .increment(1);
    }

    fn inc_trigger_evaluations(&self, trigger: &str, triggered: bool) {
        counter!(
            TRIGGER_EVALUATIONS_TOTAL,
            "name" => trigger.to_string(),
            "triggered" => triggered.to_string()
        )
        .increment(1);
    }
}

/// Keeps counters in memory; used to inspect a controller in tests.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    deliveries: DashMap<(String, String, bool), u64>,
    evaluations: DashMap<(String, bool), u64>,
}

impl InMemoryMetrics {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliveries counted for the labels.
    pub fn deliveries(&self, trigger: &str, service: &str, succeeded: bool) -> u64 {
        self.deliveries
            .get(&(trigger.to_string(), service.to_string(), succeeded))
            .map(|count| *count)
            .unwrap_or_default()
    }

    /// Evaluations counted for the labels.
    pub fn trigger_evaluations(&self, trigger: &str, triggered: bool) -> u64 {
        self.evaluations
            .get(&(trigger.to_string(), triggered))
            .map(|count| *count)
            .unwrap_or_default()
    }
}

impl MetricsSink for InMemoryMetrics {
    fn inc_deliveries(&self, trigger: &str, service: &str, succeeded: bool) {
        *self
            .deliveries
            .entry((trigger.to_string(), service.to_string(), succeeded))
            .or_default() += 1;
    }

    fn inc_trigger_evaluations(&self, trigger: &str, triggered: bool) {
        *self.evaluations.entry((trigger.to_string(), triggered)).or_default() += 1;
    }
}
