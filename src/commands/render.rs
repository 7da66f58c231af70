//! Render command implementation.
//!
//! Loads a snapshot, optionally applies aggregation rules, and writes the
//! result as a Graphviz DOT graph.

use super::models::RenderArgs;
use super::utils::{load_rule_file, validate_input_path};
use crate::output::dot::DOT_EXTENSION;
use crate::output::write_dot;
use crate::parser::read_snapshot;
use anyhow::{Context, Result};
use log::info;

/// Execute the render command
///
/// **Public** - main entry point called from main.rs
pub fn execute_render(args: RenderArgs) -> Result<()> {
    let mut snapshot = read_snapshot(&args.input)
        .with_context(|| format!("Failed to load snapshot {}", args.input.display()))?;

    if let Some(path) = &args.rules {
        let rules = load_rule_file(path)?;
        snapshot.apply_rules(&rules);
    }

    write_dot(&snapshot, &args.output)
        .with_context(|| format!("Failed to write DOT graph {}", args.output.display()))?;
    info!("✓ DOT graph written to: {}", args.output.display());

    Ok(())
}

/// Validate render arguments
///
/// **Public** - can be called before execute_render for early validation
pub fn validate_args(args: &RenderArgs) -> Result<()> {
    validate_input_path(&args.input)?;

    let is_dot = args
        .output
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(DOT_EXTENSION));
    if !is_dot {
        anyhow::bail!(
            "Unsupported output format for {}: only .{} files can be rendered",
            args.output.display(),
            DOT_EXTENSION
        );
    }

    if let Some(rules) = &args.rules {
        if !rules.is_file() {
            anyhow::bail!("Rule file not found: {}", rules.display());
        }
    }

    Ok(())
}
