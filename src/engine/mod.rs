//! The evaluation core: condition expressions, trigger evaluation, templates
//! and the per-resource notification state.

pub mod git_url;
pub mod rhai;
pub mod state;
pub mod templates;
pub mod triggers;
