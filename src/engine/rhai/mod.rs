//! The sandboxed Rhai engine used to evaluate trigger conditions.

pub mod compiler;
pub mod conversions;
mod create_engine;
pub mod helpers;

pub use compiler::{ExpressionError, RhaiCompiler};
pub use conversions::{dynamic_to_string, json_to_dynamic, scope_from_vars};
pub use create_engine::create_engine;
pub use helpers::ExpressionHelpers;
