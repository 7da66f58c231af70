//! Configuration and constants for the snapshot tools.

/// Current version of the post-processed output
pub const SCHEMA_VERSION: &str = "1.0.0";

// Key prefixes used by the malloc-tag JSON snapshot format
pub const TREE_PREFIX: &str = "tree_for_";
pub const TREE_OUTPUT_PREFIX: &str = "tree_for_TID";
pub const SCOPE_PREFIX: &str = "scope_";

// Aggregation rule file conventions
pub const RULE_KEY_PREFIX: &str = "rule";
pub const AGGREGATE_TREES_MODE: &str = "aggregate_trees";
pub const MATCHING_PREFIX_FIELD: &str = "matching_prefix";

/// Separator used when joining thread names of aggregated trees
pub const THREAD_NAME_SEPARATOR: &str = ",";

/// Path meaning "read from stdin"
pub const STDIN_PATH: &str = "-";

/// Environment variable holding a default rule file for `postprocess`
pub const RULES_ENV_VAR: &str = "MTAG_RULES";

/// Number of decimals kept for weight percentages in any output
pub const WEIGHT_DECIMALS: i32 = 2;
