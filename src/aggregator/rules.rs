//! Post-processing rules applied to a loaded snapshot.
//!
//! Rule kinds form a closed set: a rule file naming any other mode is
//! rejected by the parser before a [`AggregationRule`] can exist.

use regex::Regex;
use std::fmt;

/// What a rule does, with its validated parameters
#[derive(Debug, Clone)]
pub enum RuleKind {
    /// Merge every tree whose thread name matches the pattern into one tree
    AggregateTrees(ThreadNameMatcher),
}

/// Thread-name pattern, anchored at the start of the name
#[derive(Debug, Clone)]
pub struct ThreadNameMatcher {
    source: String,
    regex: Regex,
}

impl ThreadNameMatcher {
    /// Compile a matcher from a user pattern
    ///
    /// The pattern must match at the start of the thread name but may stop
    /// before its end: `worker` matches `worker-1`.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let regex = Regex::new(&format!("^(?:{})", pattern))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn is_match(&self, thread_name: &str) -> bool {
        self.regex.is_match(thread_name)
    }

    /// The pattern as written by the user
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// One numbered post-processing rule
#[derive(Debug, Clone)]
pub struct AggregationRule {
    index: usize,
    name: String,
    kind: RuleKind,
}

impl AggregationRule {
    pub fn new(index: usize, name: impl Into<String>, kind: RuleKind) -> Self {
        Self {
            index,
            name: name.into(),
            kind,
        }
    }

    /// Shorthand for an `aggregate_trees` rule
    pub fn aggregate_trees(
        index: usize,
        name: impl Into<String>,
        matching_prefix: &str,
    ) -> Result<Self, regex::Error> {
        let matcher = ThreadNameMatcher::new(matching_prefix)?;
        Ok(Self::new(index, name, RuleKind::AggregateTrees(matcher)))
    }

    /// Position of the rule in its rule file; also the key of the tree it produces
    pub fn index(&self) -> usize {
        self.index
    }

    /// Display name, given to the root scope of the aggregated tree
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &RuleKind {
        &self.kind
    }

    /// Prefix for every log line about this rule
    pub fn log_prefix(&self) -> String {
        format!("Rule#{}:", self.index)
    }

    /// Human-readable description of what the rule does
    pub fn description(&self) -> String {
        match &self.kind {
            RuleKind::AggregateTrees(matcher) => format!(
                "aggregate all trees whose thread name matches [{}]",
                matcher.as_str()
            ),
        }
    }
}

impl fmt::Display for AggregationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.log_prefix(), self.name, self.description())
    }
}
