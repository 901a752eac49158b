//! Rhai compiler for condition expressions.
//! Compiles expressions into an AST and keeps them in a local cache keyed by
//! the hash of their source.

use std::sync::Arc;

use dashmap::DashMap;
use rhai::{AST, Dynamic, Engine, EvalAltResult, Scope};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::{create_engine, helpers::ExpressionHelpers};
use crate::config::RhaiConfig;

/// A type alias for the hash of an expression.
type ExpressionHash = [u8; 32];

/// Errors that can occur while compiling or evaluating an expression.
#[derive(Debug, Error)]
pub enum ExpressionError {
    /// The expression does not parse.
    #[error("Rhai compilation error: {0}")]
    CompilationError(#[from] rhai::ParseError),

    /// The expression failed during evaluation.
    #[error("Rhai runtime error: {0}")]
    RuntimeError(#[from] Box<EvalAltResult>),
}

/// The Rhai compiler that compiles expressions and evaluates them.
/// It caches compiled ASTs to avoid redundant compilations.
#[derive(Debug)]
pub struct RhaiCompiler {
    /// The Rhai engine used for compiling and evaluating expressions.
    pub engine: Arc<Engine>,
    cache: DashMap<ExpressionHash, Arc<AST>>,
}

impl RhaiCompiler {
    /// Creates a compiler with the builtin helper namespaces.
    pub fn new(rhai_config: RhaiConfig) -> Self {
        Self::with_helpers(rhai_config, &ExpressionHelpers::builtin())
    }

    /// Creates a compiler with a custom set of helper namespaces.
    pub fn with_helpers(rhai_config: RhaiConfig, helpers: &ExpressionHelpers) -> Self {
        let engine = create_engine(&rhai_config, helpers);
        RhaiCompiler { engine: Arc::new(engine), cache: DashMap::new() }
    }

    fn hash_expression(source: &str) -> ExpressionHash {
        let mut hasher = Sha256::new();
        hasher.update(source.as_bytes());
        hasher.finalize().into()
    }

    /// Compiles a single expression. Statements (`let`, `;`) are rejected.
    pub fn compile(&self, source: &str) -> Result<Arc<AST>, ExpressionError> {
        let key = Self::hash_expression(source);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.value().clone());
        }

        let ast = Arc::new(self.engine.compile_expression(source)?);
        self.cache.insert(key, ast.clone());
        Ok(ast)
    }

    /// Evaluates a compiled expression against `scope`.
    pub fn eval(&self, ast: &AST, scope: &mut Scope<'_>) -> Result<Dynamic, ExpressionError> {
        Ok(self.engine.eval_ast_with_scope::<Dynamic>(scope, ast)?)
    }

    /// Drops every cached expression. Compiled ASTs already handed out stay
    /// valid.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Number of cached expressions.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}
