//! Helper namespaces available to condition expressions.

use std::fmt;

use chrono::{DateTime, Utc};
use rhai::{Engine, EvalAltResult, ImmutableString, Module, Shared};

use crate::engine::git_url;

/// A set of Rhai modules installed into the evaluation engine, each under its
/// own namespace.
///
/// [`ExpressionHelpers::builtin`] provides:
/// - `time::parse(rfc3339)`: Unix seconds of an RFC 3339 timestamp.
/// - `time::now()`: current Unix seconds.
/// - `repo::to_https(url)`: a git URL rewritten as an `https://` URL.
/// - `repo::full_name(url)`: `owner/name` of a git URL.
///
/// Embedders can add their own namespaces with [`ExpressionHelpers::register`].
#[derive(Clone, Default)]
pub struct ExpressionHelpers {
    modules: Vec<(String, Shared<Module>)>,
}

impl fmt::Debug for ExpressionHelpers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.modules.iter().map(|(namespace, _)| namespace)).finish()
    }
}

impl ExpressionHelpers {
    /// No helper namespaces.
    pub fn new() -> Self {
        Self::default()
    }

    /// The `time` and `repo` namespaces.
    pub fn builtin() -> Self {
        let mut helpers = Self::new();
        helpers.register("time", time_module());
        helpers.register("repo", repo_module());
        helpers
    }

    /// Adds `module` under `namespace`, replacing a previous module with the
    /// same namespace.
    pub fn register(&mut self, namespace: impl Into<String>, module: Module) -> &mut Self {
        let namespace = namespace.into();
        self.modules.retain(|(existing, _)| *existing != namespace);
        self.modules.push((namespace, module.into()));
        self
    }

    /// Registered namespaces, in registration order.
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(|(namespace, _)| namespace.as_str())
    }

    pub(crate) fn install(&self, engine: &mut Engine) {
        for (namespace, module) in &self.modules {
            engine.register_static_module(namespace.as_str(), module.clone());
        }
    }
}

fn time_module() -> Module {
    let mut module = Module::new();
    module.set_native_fn("parse", |timestamp: ImmutableString| {
        DateTime::parse_from_rfc3339(timestamp.as_str()).map(|time| time.timestamp()).map_err(
            |e| -> Box<EvalAltResult> {
                format!("invalid RFC 3339 timestamp '{timestamp}': {e}").into()
            },
        )
    });
    module.set_native_fn("now", || Ok(Utc::now().timestamp()));
    module
}

fn repo_module() -> Module {
    let mut module = Module::new();
    module.set_native_fn("to_https", |url: ImmutableString| {
        git_url::to_https(url.as_str()).map_err(|e| -> Box<EvalAltResult> { e.to_string().into() })
    });
    module.set_native_fn("full_name", |url: ImmutableString| {
        git_url::full_name(url.as_str()).map_err(|e| -> Box<EvalAltResult> { e.to_string().into() })
    });
    module
}
