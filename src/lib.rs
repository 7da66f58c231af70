//! malloc-tag tools
//!
//! Post-processing of memory profiling snapshots produced by the
//! malloc-tag instrumentation library.
//!
//! A snapshot holds one call-scope tree per thread, each node carrying the
//! bytes allocated and freed inside that scope. This crate loads snapshots,
//! merges per-thread trees by thread-name pattern, recomputes totals and
//! weights, and writes the result back as JSON or Graphviz DOT.
//!
//! This crate provides the core implementation for the `mtag` CLI tool.
//!
//! ## Getting Started
//!
//! ```bash
//! mtag postprocess snapshot.json -c rules.json -o postprocessed.json
//! mtag render postprocessed.json -o snapshot.dot
//! ```
//!
//! From code:
//!
//! ```ignore
//! let mut snapshot = malloc_tag_tools::parser::read_snapshot("snapshot.json")?;
//! let rules = malloc_tag_tools::parser::load_rules("rules.json")?;
//! snapshot.apply_rules(&rules);
//! malloc_tag_tools::output::write_snapshot(&snapshot, "postprocessed.json")?;
//! ```

pub mod aggregator;
pub mod commands;
pub mod model;
pub mod output;
pub mod parser;
pub mod utils;
