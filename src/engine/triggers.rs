//! Trigger evaluation.
//!
//! A trigger is an ordered list of conditions. Every condition is compiled
//! once when the service is built; evaluation never fails because of a
//! condition, only because the trigger itself is unknown.

use std::{collections::BTreeMap, sync::Arc};

use rhai::AST;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::rhai::{ExpressionError, RhaiCompiler, dynamic_to_string, scope_from_vars};
use crate::models::{Condition, ConditionResult};

/// Errors raised by the trigger service.
#[derive(Debug, Error)]
pub enum TriggerError {
    /// The requested trigger does not exist.
    #[error("trigger '{0}' is not configured")]
    NotConfigured(String),

    /// A condition of a trigger could not be compiled.
    #[error("failed to compile condition [{index}] of trigger '{trigger}': {source}")]
    Compilation {
        /// Trigger name.
        trigger: String,
        /// Position of the condition within the trigger.
        index: usize,
        /// Underlying compiler error.
        #[source]
        source: ExpressionError,
    },

    /// The `oncePer` expression of a condition could not be compiled.
    #[error("failed to compile oncePer of condition [{index}] of trigger '{trigger}': {source}")]
    OncePerCompilation {
        /// Trigger name.
        trigger: String,
        /// Position of the condition within the trigger.
        index: usize,
        /// Underlying compiler error.
        #[source]
        source: ExpressionError,
    },
}

#[derive(Debug)]
struct CompiledCondition {
    key: String,
    when: Arc<AST>,
    once_per: Option<Arc<AST>>,
    templates: Vec<String>,
}

/// Compiled triggers, ready to be evaluated against a variable binding.
#[derive(Debug)]
pub struct TriggerService {
    compiler: Arc<RhaiCompiler>,
    triggers: BTreeMap<String, Vec<CompiledCondition>>,
}

/// Stable key of the condition at `index`: `[<index>].<hash of when>`.
pub fn condition_key(index: usize, when: &str) -> String {
    let digest = Sha256::digest(when.as_bytes());
    format!("[{index}].{}", hex::encode(&digest[..8]))
}

impl TriggerService {
    /// Compiles every condition of `triggers`. A `when` or `oncePer`
    /// expression that does not compile fails the whole service.
    pub fn new(
        compiler: Arc<RhaiCompiler>,
        triggers: &BTreeMap<String, Vec<Condition>>,
    ) -> Result<Self, TriggerError> {
        let mut compiled = BTreeMap::new();
        for (name, conditions) in triggers {
            let mut compiled_conditions = Vec::with_capacity(conditions.len());
            for (index, condition) in conditions.iter().enumerate() {
                let when = compiler.compile(&condition.when).map_err(|source| {
                    TriggerError::Compilation { trigger: name.clone(), index, source }
                })?;
                let once_per = match condition.once_per.as_deref().map(str::trim) {
                    Some(expression) if !expression.is_empty() => {
                        Some(compiler.compile(expression).map_err(|source| {
                            TriggerError::OncePerCompilation { trigger: name.clone(), index, source }
                        })?)
                    }
                    _ => None,
                };
                compiled_conditions.push(CompiledCondition {
                    key: condition_key(index, &condition.when),
                    when,
                    once_per,
                    templates: condition.send.clone(),
                });
            }
            compiled.insert(name.clone(), compiled_conditions);
        }
        Ok(Self { compiler, triggers: compiled })
    }

    /// Whether `trigger` is configured.
    pub fn contains(&self, trigger: &str) -> bool {
        self.triggers.contains_key(trigger)
    }

    /// Names of the configured triggers.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.triggers.keys().map(String::as_str)
    }

    /// Evaluates every condition of `trigger` against `vars`, in order.
    pub fn run(
        &self,
        trigger: &str,
        vars: &Map<String, Value>,
    ) -> Result<Vec<ConditionResult>, TriggerError> {
        let conditions =
            self.triggers.get(trigger).ok_or_else(|| TriggerError::NotConfigured(trigger.into()))?;

        let mut results = Vec::with_capacity(conditions.len());
        for condition in conditions {
            let mut scope = scope_from_vars(vars);
            let triggered = match self.compiler.eval(&condition.when, &mut scope) {
                Ok(value) => value.as_bool().unwrap_or_else(|_| {
                    tracing::debug!(trigger, key = %condition.key, "Condition returned a non boolean value");
                    false
                }),
                Err(e) => {
                    tracing::warn!(trigger, key = %condition.key, error = %e, "Failed to evaluate condition");
                    false
                }
            };

            let once_per = match &condition.once_per {
                Some(ast) => match self.compiler.eval(ast, &mut scope) {
                    Ok(value) => dynamic_to_string(value),
                    Err(e) => {
                        tracing::debug!(trigger, key = %condition.key, error = %e, "Failed to evaluate oncePer");
                        String::new()
                    }
                },
                None => String::new(),
            };

            results.push(ConditionResult {
                key: condition.key.clone(),
                once_per,
                templates: condition.templates.clone(),
                triggered,
            });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::RhaiConfig;

    fn service(triggers: &[(&str, Vec<Condition>)]) -> Result<TriggerService, TriggerError> {
        let triggers =
            triggers.iter().map(|(name, conditions)| (name.to_string(), conditions.clone())).collect();
        TriggerService::new(Arc::new(RhaiCompiler::new(RhaiConfig::default())), &triggers)
    }

    fn vars(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_run_triggered() {
        let svc = service(&[(
            "on-sync-failed",
            vec![Condition::new(r#"app.status.phase == "Failed""#, &["app-sync-failed"])],
        )])
        .unwrap();

        let results =
            svc.run("on-sync-failed", &vars(json!({ "app": { "status": { "phase": "Failed" } } })))
                .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].triggered);
        assert_eq!(results[0].templates, vec!["app-sync-failed".to_string()]);
        assert_eq!(results[0].once_per, "");
        assert!(results[0].key.starts_with("[0]."));
    }

    #[test]
    fn test_unknown_trigger() {
        let svc = service(&[]).unwrap();
        let err = svc.run("missing", &Map::new()).unwrap_err();
        assert!(matches!(err, TriggerError::NotConfigured(name) if name == "missing"));
    }

    #[test]
    fn test_invalid_when_fails_construction() {
        let err = service(&[("broken", vec![Condition::new("app.status ==", &[])])]).unwrap_err();
        assert!(matches!(err, TriggerError::Compilation { index: 0, .. }));
    }

    #[test]
    fn test_runtime_error_is_not_triggered() {
        let svc =
            service(&[("t", vec![Condition::new(r#"app.status.phase == "Failed""#, &[])])]).unwrap();
        let results = svc.run("t", &vars(json!({ "app": { "metadata": {} } }))).unwrap();
        assert!(!results[0].triggered);
    }

    #[test]
    fn test_non_boolean_result_is_not_triggered() {
        let svc = service(&[("t", vec![Condition::new("app.metadata.name", &[])])]).unwrap();
        let results = svc.run("t", &vars(json!({ "app": { "metadata": { "name": "x" } } }))).unwrap();
        assert!(!results[0].triggered);
    }

    #[test]
    fn test_once_per_value() {
        let svc = service(&[(
            "t",
            vec![Condition::new("true", &[]).with_once_per("app.status.sync.revision")],
        )])
        .unwrap();

        let results =
            svc.run("t", &vars(json!({ "app": { "status": { "sync": { "revision": "abc" } } } })))
                .unwrap();
        assert_eq!(results[0].once_per, "abc");

        let results = svc.run("t", &vars(json!({ "app": { "status": {} } }))).unwrap();
        assert_eq!(results[0].once_per, "");
    }

    #[test]
    fn test_invalid_once_per_fails_construction() {
        let err = service(&[(
            "t",
            vec![Condition::new("true", &[]), Condition::new("true", &[]).with_once_per("app.(")],
        )])
        .unwrap_err();
        assert!(matches!(err, TriggerError::OncePerCompilation { index: 1, .. }));
    }

    #[test]
    fn test_sync_fields_are_addressable() {
        let svc = service(&[(
            "on-deployed",
            vec![
                Condition::new(r#"app.status.sync.status == "Synced""#, &["app-deployed"])
                    .with_once_per("app.status.sync.revision"),
            ],
        )])
        .unwrap();

        let app = json!({ "app": { "status": { "sync": { "status": "Synced", "revision": "9f2c" } } } });
        let results = svc.run("on-deployed", &vars(app)).unwrap();
        assert!(results[0].triggered);
        assert_eq!(results[0].once_per, "9f2c");
    }

    #[test]
    fn test_keys_are_stable_and_positional() {
        let when = r#"app.status.phase == "Failed""#;
        let svc = service(&[(
            "t",
            vec![Condition::new("false", &[]), Condition::new(when, &[])],
        )])
        .unwrap();
        let results = svc.run("t", &Map::new()).unwrap();

        assert_eq!(results[1].key, condition_key(1, when));
        assert_eq!(condition_key(1, when), condition_key(1, when));
        assert_ne!(condition_key(0, when), condition_key(1, when));
        assert_ne!(condition_key(1, when), condition_key(1, "true"));
    }

    #[test]
    fn test_context_is_available() {
        let svc =
            service(&[("t", vec![Condition::new(r#"context.env == "prod""#, &[])])]).unwrap();
        let results = svc.run("t", &vars(json!({ "context": { "env": "prod" } }))).unwrap();
        assert!(results[0].triggered);
    }
}
