use serde::Deserialize;

const MAX_OPERATIONS: u64 = 100_000;
const MAX_CALL_LEVELS: usize = 10;
// Manifests carry long strings such as sync messages and last-applied configs.
const MAX_STRING_SIZE: usize = 65_536;
const MAX_COLLECTION_SIZE: usize = 10_000;
const MAX_EXPR_DEPTH: usize = 64;

/// Limits applied to the Rhai engine that evaluates trigger conditions and
/// `oncePer` expressions.
///
/// Loops are disabled in condition expressions, so these bounds cap the cost
/// of a single evaluation.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RhaiConfig {
    /// Maximum number of operations a single evaluation may perform.
    pub max_operations: u64,
    /// Maximum function call nesting depth.
    pub max_call_levels: usize,
    /// Maximum length of a string value, in characters.
    pub max_string_size: usize,
    /// Maximum number of elements in an array value.
    pub max_array_size: usize,
    /// Maximum number of properties in an object map value.
    pub max_map_size: usize,
    /// Maximum nesting depth of a parsed expression.
    pub max_expr_depth: usize,
}

impl Default for RhaiConfig {
    fn default() -> Self {
        Self {
            max_operations: MAX_OPERATIONS,
            max_call_levels: MAX_CALL_LEVELS,
            max_string_size: MAX_STRING_SIZE,
            max_array_size: MAX_COLLECTION_SIZE,
            max_map_size: MAX_COLLECTION_SIZE,
            max_expr_depth: MAX_EXPR_DEPTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_section_uses_defaults() {
        let config: RhaiConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config, RhaiConfig::default());
        assert_eq!(config.max_string_size, 65_536);
    }

    #[test]
    fn test_overrides_keep_other_limits() {
        let config: RhaiConfig =
            serde_yaml::from_str("max_operations: 500\nmax_expr_depth: 8").unwrap();

        assert_eq!(config.max_operations, 500);
        assert_eq!(config.max_expr_depth, 8);
        assert_eq!(config.max_call_levels, MAX_CALL_LEVELS);
        assert_eq!(config.max_map_size, MAX_COLLECTION_SIZE);
    }
}
