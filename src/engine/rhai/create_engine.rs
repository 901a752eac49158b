use rhai::{Engine, Token};

use super::helpers::ExpressionHelpers;
use crate::config::RhaiConfig;

/// Words Rhai reserves for future use that are common field names in resource
/// manifests (`app.status.sync.status`, `spec.template.default`). They are
/// read as plain identifiers. Disabled symbols are never in this list.
const RESERVED_FIELD_NAMES: &[&str] = &[
    "sync", "async", "await", "default", "static", "shared", "match", "case", "new", "public",
    "private", "protected", "package", "module", "var", "thread", "spawn", "yield", "with", "go",
    "goto", "exit", "super", "use",
];

/// Creates the sandboxed Rhai engine used to evaluate conditions.
///
/// Loops are disabled and every evaluation is bounded by the operation, call
/// depth and size limits of `rhai_config`. The helper namespaces are installed
/// as static modules (`time::now()`, `repo::full_name(url)`).
pub fn create_engine(rhai_config: &RhaiConfig, helpers: &ExpressionHelpers) -> Engine {
    let mut engine = Engine::new();

    engine.set_max_operations(rhai_config.max_operations);
    engine.set_max_call_levels(rhai_config.max_call_levels);
    engine.set_max_string_size(rhai_config.max_string_size);
    engine.set_max_array_size(rhai_config.max_array_size);
    engine.set_max_map_size(rhai_config.max_map_size);
    engine.set_max_expr_depths(rhai_config.max_expr_depth, rhai_config.max_expr_depth);
    engine.set_allow_looping(false);

    const DANGEROUS_SYMBOLS: &[&str] =
        &["eval", "import", "export", "print", "debug", "File", "file", "http", "net", "system"];
    for &symbol in DANGEROUS_SYMBOLS {
        engine.disable_symbol(symbol);
    }

    #[allow(deprecated)]
    engine.on_parse_token(|token, _, _| match token {
        Token::Reserved(word) if RESERVED_FIELD_NAMES.contains(&word.as_str()) => {
            Token::Identifier(word)
        }
        token => token,
    });

    helpers.install(&mut engine);

    engine
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::rhai::conversions::scope_from_vars;

    fn engine() -> Engine {
        create_engine(&RhaiConfig::default(), &ExpressionHelpers::builtin())
    }

    #[test]
    fn test_loops_are_rejected() {
        let engine = engine();
        assert!(engine.compile("let x = 0; while true { x += 1; }").is_err());
        assert!(engine.compile("for i in 0..10 { }").is_err());
        assert!(engine.compile("loop { }").is_err());
    }

    #[test]
    fn test_eval_is_disabled() {
        assert!(engine().compile(r#"eval("1 + 1")"#).is_err());
    }

    #[test]
    fn test_operation_limit_stops_runaway_recursion() {
        let config = RhaiConfig { max_operations: 500, ..Default::default() };
        let engine = create_engine(&config, &ExpressionHelpers::new());
        let result = engine.eval::<i64>("fn f(n) { f(n + 1) } f(0)");
        assert!(result.is_err());
    }

    #[test]
    fn test_membership_and_comparison() {
        let engine = engine();
        assert!(engine.eval::<bool>(r#""Failed" in ["Error", "Failed"]"#).unwrap());
        assert!(!engine.eval::<bool>(r#""Running" in ["Error", "Failed"]"#).unwrap());
        assert!(engine.eval::<bool>("2 > 1 && !(1 == 2)").unwrap());
    }

    #[test]
    fn test_reserved_words_are_field_names() {
        let engine = engine();
        let vars = serde_json::json!({
            "app": { "status": { "sync": { "status": "Synced", "revision": "abc" } } }
        });
        let mut scope = scope_from_vars(vars.as_object().unwrap());

        let synced = engine
            .eval_expression_with_scope::<bool>(&mut scope, r#"app.status.sync.status == "Synced""#)
            .unwrap();
        assert!(synced);
        let revision = engine
            .eval_expression_with_scope::<String>(&mut scope, "app.status.sync.revision")
            .unwrap();
        assert_eq!(revision, "abc");
    }

    #[test]
    fn test_disabled_symbols_stay_disabled() {
        let engine = engine();
        assert!(engine.compile_expression(r#"eval("1")"#).is_err());
        assert!(engine.compile_expression(r#"print("x")"#).is_err());
    }

    #[test]
    fn test_helpers_are_installed() {
        let engine = engine();
        let year = engine.eval::<i64>(r#"time::parse("2024-01-01T00:00:00Z")"#).unwrap();
        assert_eq!(year, 1_704_067_200);
    }
}
