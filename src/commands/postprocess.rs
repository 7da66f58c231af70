//! Postprocess command implementation.
//!
//! The postprocess command:
//! 1. Loads the malloc-tag snapshot
//! 2. Loads the aggregation rules
//! 3. Applies the rules in order
//! 4. Writes the post-processed snapshot

use super::models::PostprocessArgs;
use super::utils::{load_rule_file, print_summary, validate_input_path};
use crate::aggregator::calculate_hot_scopes;
use crate::model::{AggregationOutcome, Snapshot};
use crate::output::write_snapshot;
use crate::parser::read_snapshot;
use anyhow::{Context, Result};
use log::{debug, info};
use std::time::Instant;

/// Execute the postprocess command
///
/// **Public** - main entry point called from main.rs
///
/// # Arguments
/// * `args` - Postprocess command arguments
///
/// # Returns
/// The post-processed snapshot, also written to `args.output` when set
///
/// # Errors
/// * Snapshot read or format errors
/// * Rule file errors
/// * File write errors
pub fn execute_postprocess(args: PostprocessArgs) -> Result<Snapshot> {
    let start_time = Instant::now();

    info!("Step 1/4: Loading snapshot from {}...", args.input.display());
    let mut snapshot = read_snapshot(&args.input)
        .with_context(|| format!("Failed to load snapshot {}", args.input.display()))?;
    info!("{}", snapshot.stats().summary());

    info!("Step 2/4: Loading postprocessing rules...");
    let rules = match &args.rules {
        Some(path) => load_rule_file(path)?,
        None => Vec::new(),
    };

    info!("Step 3/4: Applying {} rules...", rules.len());
    if rules.is_empty() {
        info!("No postprocessing rules specified (see --config). The malloc-tag snapshot will not be manipulated.");
    }
    for (rule, outcome) in rules.iter().zip(snapshot.apply_rules(&rules)) {
        if let AggregationOutcome::Merged { survivor, merged } = outcome {
            debug!(
                "{} merged {} trees into {}",
                rule.log_prefix(),
                merged.len(),
                survivor
            );
        }
    }

    match &args.output {
        Some(path) => {
            info!("Step 4/4: Writing output file...");
            write_snapshot(&snapshot, path)
                .with_context(|| format!("Failed to write snapshot {}", path.display()))?;
            info!("✓ Post-processed snapshot written to: {}", path.display());
        }
        None => info!("Step 4/4: Skipping output (not requested)"),
    }

    if args.print_summary {
        let hot = calculate_hot_scopes(&snapshot, args.top_scopes);
        print_summary(&snapshot, &hot);
    }

    let elapsed = start_time.elapsed();
    info!("Postprocessing completed in {:.2}s", elapsed.as_secs_f64());

    Ok(snapshot)
}

/// Validate postprocess arguments
///
/// **Public** - can be called before execute_postprocess for early validation
///
/// # Arguments
/// * `args` - Arguments to validate
///
/// # Returns
/// Ok if arguments are valid, Err with message if not
pub fn validate_args(args: &PostprocessArgs) -> Result<()> {
    validate_input_path(&args.input)?;

    if let Some(rules) = &args.rules {
        if !rules.is_file() {
            anyhow::bail!("Rule file not found: {}", rules.display());
        }
    }

    if let Some(output) = &args.output {
        if output.as_os_str().is_empty() {
            anyhow::bail!("Output path cannot be empty");
        }
        if *output == args.input {
            anyhow::bail!("Output path must differ from the input snapshot");
        }
    }

    if args.top_scopes == 0 {
        anyhow::bail!("top_scopes must be greater than 0");
    }

    Ok(())
}
