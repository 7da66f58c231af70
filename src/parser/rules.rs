//! Rule file parser.
//!
//! A rule file is a JSON object whose keys starting with `rule` each hold one
//! rule. A rule object has exactly one key: its mode.
//!
//! ```json
//! { "rule_workers": { "aggregate_trees": { "matching_prefix": "worker-.*" } } }
//! ```

use crate::aggregator::rules::{AggregationRule, RuleKind, ThreadNameMatcher};
use crate::utils::config::{AGGREGATE_TREES_MODE, MATCHING_PREFIX_FIELD, RULE_KEY_PREFIX};
use crate::utils::error::ConfigError;
use log::{debug, info, warn};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Load the rules of a rule file
///
/// **Public** - main entry point for rule configuration
///
/// # Errors
/// * `ConfigError::IoError` / `ConfigError::JsonError` - unreadable file
/// * any error from [`parse_rules`]
pub fn load_rules(path: impl AsRef<Path>) -> Result<Vec<AggregationRule>, ConfigError> {
    let path = path.as_ref();
    debug!("Reading rule file: {}", path.display());

    let text = fs::read_to_string(path)?;
    let raw: Value = serde_json::from_str(&text)?;
    let rules = parse_rules(&raw)?;

    info!(
        "Loaded {} postprocessing rules from config file '{}'",
        rules.len(),
        path.display()
    );
    Ok(rules)
}

/// Build rules from an already parsed rule file
///
/// Rules are numbered from 0 in file order; ignored keys take no number.
///
/// # Errors
/// * `ConfigError::NotAnObject` - the document or a rule body is not an object
/// * `ConfigError::ModeCount` - a rule has zero or several modes
/// * `ConfigError::UnsupportedMode` - a rule names an unknown mode
/// * `ConfigError::MissingField` / `ConfigError::InvalidPattern` - bad mode parameters
pub fn parse_rules(raw: &Value) -> Result<Vec<AggregationRule>, ConfigError> {
    let obj = raw.as_object().ok_or(ConfigError::NotAnObject)?;

    let mut rules = Vec::new();
    for (name, body) in obj {
        if !name.starts_with(RULE_KEY_PREFIX) {
            warn!(
                "Ignoring key not starting with [{}] prefix: '{}'",
                RULE_KEY_PREFIX, name
            );
            continue;
        }
        let rule = parse_rule(rules.len(), name, body)?;
        debug!("Parsed {}", rule);
        rules.push(rule);
    }

    Ok(rules)
}

/// **Private** - one rule body
fn parse_rule(index: usize, name: &str, body: &Value) -> Result<AggregationRule, ConfigError> {
    let modes = body.as_object().ok_or(ConfigError::NotAnObject)?;

    let mut entries = modes.iter();
    let (mode, params) = match (entries.next(), entries.next()) {
        (Some(only), None) => only,
        _ => {
            return Err(ConfigError::ModeCount {
                rule: name.to_string(),
                found: modes.len(),
            })
        }
    };

    let kind = match mode.as_str() {
        AGGREGATE_TREES_MODE => RuleKind::AggregateTrees(parse_matcher(name, params)?),
        other => {
            return Err(ConfigError::UnsupportedMode {
                rule: name.to_string(),
                mode: other.to_string(),
            })
        }
    };

    Ok(AggregationRule::new(index, name, kind))
}

/// **Private** - `aggregate_trees` parameters
fn parse_matcher(rule: &str, params: &Value) -> Result<ThreadNameMatcher, ConfigError> {
    let pattern = params
        .get(MATCHING_PREFIX_FIELD)
        .and_then(Value::as_str)
        .ok_or_else(|| ConfigError::MissingField {
            rule: rule.to_string(),
            field: MATCHING_PREFIX_FIELD.to_string(),
        })?;

    ThreadNameMatcher::new(pattern).map_err(|source| ConfigError::InvalidPattern {
        rule: rule.to_string(),
        source,
    })
}
