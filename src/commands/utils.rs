use anyhow::{Context, Result};
use serde_json::json;
use std::path::Path;

use crate::aggregator::{calculate_hot_scopes, AggregationRule, HotScope};
use crate::model::Snapshot;
use crate::output::pretty_print_bytes;
use crate::parser::{load_rules, read_snapshot};
use crate::utils::config::{SCHEMA_VERSION, STDIN_PATH};

/// Load a rule file with command-level context
pub fn load_rule_file(path: &Path) -> Result<Vec<AggregationRule>> {
    load_rules(path).with_context(|| format!("Invalid configuration JSON file '{}'", path.display()))
}

/// Check that an input snapshot path is `-` or an existing file
pub fn validate_input_path(input: &Path) -> Result<()> {
    if input.as_os_str().is_empty() {
        anyhow::bail!("Input path cannot be empty");
    }
    if input.as_os_str() != STDIN_PATH && !input.is_file() {
        anyhow::bail!("Input snapshot not found: {}", input.display());
    }
    Ok(())
}

/// Print snapshot statistics and the heaviest scopes
pub fn print_summary(snapshot: &Snapshot, hot_scopes: &[HotScope]) {
    let stats = snapshot.stats();

    println!("\n{}", "=".repeat(80));
    println!("MALLOC-TAG SNAPSHOT SUMMARY");
    println!("{}", "=".repeat(80));
    println!("PID:           {}", stats.pid);
    println!("Started:       {}", snapshot.tm_start_profiling());
    println!("Snapshot:      {}", snapshot.tm_current_snapshot());
    println!(
        "Trees:         {} ({} aggregated)",
        stats.tree_count, stats.aggregated_tree_count
    );
    println!("Nodes:         {}", stats.node_count);
    println!("Max depth:     {}", stats.max_levels);
    println!("Allocated:     {}", pretty_print_bytes(stats.total_allocated));
    println!("Freed:         {}", pretty_print_bytes(stats.total_freed));
    println!("Net tracked:   {}", pretty_print_bytes(stats.net_tracked));
    println!("VM size now:   {}", pretty_print_bytes(stats.vm_size_now_bytes));
    println!("VM RSS now:    {}", pretty_print_bytes(stats.vm_rss_now_bytes));
    if stats.has_tracking_failures() {
        println!(
            "WARNING: {} push-node failures, {} free-tracking failures",
            stats.push_node_failures, stats.free_tracking_failures
        );
    }

    if !hot_scopes.is_empty() {
        println!("\nTop {} scopes by self-allocated bytes:", hot_scopes.len());
        for (i, scope) in hot_scopes.iter().enumerate() {
            println!(
                "{:>3}. {:>8} ({:>6.2}%) [{}] {}",
                i + 1,
                pretty_print_bytes(scope.self_allocated),
                scope.self_weight,
                scope.tree,
                scope.path
            );
        }
    }
    println!("{}", "=".repeat(80));
}

/// Load a snapshot and print its statistics, as text or as JSON
pub fn display_stats(input: &Path, top_scopes: usize, as_json: bool) -> Result<()> {
    validate_input_path(input)?;

    let snapshot = read_snapshot(input)
        .with_context(|| format!("Failed to load snapshot {}", input.display()))?;
    let hot = calculate_hot_scopes(&snapshot, top_scopes);

    if as_json {
        let report = json!({ "stats": snapshot.stats(), "hot_scopes": hot });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&snapshot, &hot);
    }

    Ok(())
}

/// Display version information
pub fn display_version() {
    println!("malloc-tag-tools v{}", env!("CARGO_PKG_VERSION"));
    println!("Post-processed snapshot format: v{}", SCHEMA_VERSION);
    println!();
    println!("Post-processing and rendering of malloc-tag memory profiling snapshots.");
}
