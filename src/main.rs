//! malloc-tag snapshot tools CLI
//!
//! Post-processes JSON snapshots produced by the malloc-tag library:
//! aggregates per-thread trees and renders them as Graphviz graphs.

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;

use malloc_tag_tools::commands::{
    display_stats, display_version, execute_postprocess, execute_render, postprocess, render,
    PostprocessArgs, RenderArgs,
};
use malloc_tag_tools::utils::config::RULES_ENV_VAR;

/// malloc-tag tools - post-processing of memory profiling snapshots
#[derive(Parser, Debug)]
#[command(name = "mtag")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply aggregation rules to a snapshot
    Postprocess {
        /// The JSON snapshot to process, `-` for stdin
        input: PathBuf,

        /// Output path for the post-processed JSON snapshot
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// JSON file specifying the postprocessing rules
        #[arg(short, long, env = RULES_ENV_VAR)]
        config: Option<PathBuf>,

        /// Number of top scopes in the summary
        #[arg(long, default_value = "10")]
        top_scopes: usize,

        /// Print text summary to stdout
        #[arg(long)]
        summary: bool,
    },

    /// Render a snapshot as a Graphviz DOT graph
    Render {
        /// The JSON snapshot to render, `-` for stdin
        input: PathBuf,

        /// Output path for the DOT graph
        #[arg(short, long, default_value = "snapshot.dot")]
        output: PathBuf,

        /// JSON file with rules applied before rendering
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Print statistics of a snapshot
    Stats {
        /// The JSON snapshot to inspect, `-` for stdin
        input: PathBuf,

        /// Number of top scopes to list
        #[arg(long, default_value = "10")]
        top_scopes: usize,

        /// Print the statistics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Display version information
    Version,
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Postprocess {
            input,
            output,
            config,
            top_scopes,
            summary,
        } => {
            let args = PostprocessArgs {
                input,
                output,
                rules: config,
                top_scopes,
                print_summary: summary,
            };

            postprocess::validate_args(&args)?;
            execute_postprocess(args)?;
        }

        Commands::Render {
            input,
            output,
            config,
        } => {
            let args = RenderArgs {
                input,
                output,
                rules: config,
            };

            render::validate_args(&args)?;
            execute_render(args)?;
        }

        Commands::Stats {
            input,
            top_scopes,
            json,
        } => {
            display_stats(&input, top_scopes, json)?;
        }

        Commands::Version => {
            display_version();
        }
    }

    Ok(())
}
