//! Graphviz DOT output.
//!
//! Renders a snapshot as one digraph: a node carrying the whole-process
//! stats, one cluster per tree, and one graph node per scope. Scope nodes are
//! filled darker and drawn bigger the more bytes they allocated themselves.

use super::prepare_output_path;
use crate::model::{Snapshot, TreeKey, WeightedNode, WeightedTree};
use crate::utils::error::OutputError;
use log::{debug, info};
use std::fmt::Write as _;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Graphviz colour scheme applied to every node
const COLORSCHEME: &str = "reds9";

/// Extension accepted by [`write_dot`]
pub const DOT_EXTENSION: &str = "dot";

/// Self-weight thresholds (exclusive upper bounds) with the fill colour and
/// font size used below each one
const SELF_WEIGHT_STYLES: [(f64, u8, u8); 6] = [
    (5.0, 1, 9),
    (10.0, 2, 10),
    (20.0, 3, 12),
    (40.0, 4, 14),
    (60.0, 5, 16),
    (80.0, 6, 18),
];
const HEAVIEST_STYLE: (u8, u8) = (7, 20);

/// Render bytes with decimal multipliers, truncating: 1999 → `1kB`
///
/// **Public** - shared by the DOT renderer and the stats summary
pub fn pretty_print_bytes(bytes: u64) -> String {
    match bytes {
        0..=999 => format!("{}B", bytes),
        1_000..=999_999 => format!("{}kB", bytes / 1_000),
        1_000_000..=999_999_999 => format!("{}MB", bytes / 1_000_000),
        _ => format!("{}GB", bytes / 1_000_000_000),
    }
}

/// Render a snapshot as a DOT document
///
/// **Public** - main entry point for DOT output
pub fn render_dot(snapshot: &Snapshot) -> String {
    let mut out = String::new();
    out.push_str("digraph MallocTagSnapshot {\n");
    push_node_defaults(&mut out);

    let process_node = format!("Process_{}", snapshot.pid());
    let process_labels = [
        "Whole process stats".to_string(),
        format!(
            "allocated_mem_before_malloctag_init={}",
            pretty_print_bytes(snapshot.bytes_alloc_before_init())
        ),
        format!(
            "allocated_mem_by_malloctag_itself={}",
            pretty_print_bytes(snapshot.bytes_malloc_tag_self_usage())
        ),
        format!("allocated_mem={}", pretty_print_bytes(snapshot.net_tracked_bytes())),
        format!("vm_size_now={}", pretty_print_bytes(snapshot.vm_size_now_bytes())),
        format!("vm_rss_now={}", pretty_print_bytes(snapshot.vm_rss_now_bytes())),
        format!("malloctag_start_ts={}", snapshot.tm_start_profiling()),
        format!("this_snapshot_ts={}", snapshot.tm_current_snapshot()),
    ];
    push_node(&mut out, &process_node, &process_labels);

    for tree in snapshot.weighted_trees() {
        push_tree(&mut out, &tree);

        let root = tree.root();
        let _ = writeln!(
            out,
            "\"{}\" -> \"{}\" [label=\"{:.2}%\"]",
            escape(&process_node),
            escape(&node_name(tree.key(), &path_segment(root.name()))),
            root.weight().total_percent()
        );
    }

    out.push_str("}\n");
    debug!(
        "Rendered DOT graph for {} trees ({} bytes)",
        snapshot.len(),
        out.len()
    );
    out
}

/// Write the DOT rendering of a snapshot to a `.dot` file
///
/// **Public** - used by the `render` command
///
/// # Errors
/// * `OutputError::UnsupportedFormat` - extension other than `.dot`
/// * `OutputError::InvalidPath` - a directory, or parents that cannot be created
/// * `OutputError::WriteFailed` - I/O error during write
pub fn write_dot(snapshot: &Snapshot, output_path: impl AsRef<Path>) -> Result<(), OutputError> {
    let output_path = output_path.as_ref();

    info!("Writing DOT graph to: {}", output_path.display());

    validate_dot_extension(output_path)?;
    prepare_output_path(output_path)?;

    let content = render_dot(snapshot);
    let mut writer = BufWriter::new(File::create(output_path)?);
    writer.write_all(content.as_bytes())?;
    writer.flush()?;

    info!("DOT graph written successfully ({} bytes)", content.len());
    Ok(())
}

/// **Private** - only `.dot` is written, in any letter case
fn validate_dot_extension(path: &Path) -> Result<(), OutputError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case(DOT_EXTENSION) => Ok(()),
        Some(ext) => Err(OutputError::UnsupportedFormat(format!(
            "'.{}' (only .{} is supported)",
            ext, DOT_EXTENSION
        ))),
        None => Err(OutputError::UnsupportedFormat(format!(
            "missing extension (only .{} is supported)",
            DOT_EXTENSION
        ))),
    }
}

/// **Private** - one cluster per tree
fn push_tree(out: &mut String, tree: &WeightedTree<'_>) {
    let _ = writeln!(out, "subgraph \"cluster_{}\" {{", escape(&tree.key().to_string()));
    push_node_defaults(out);

    let mut labels = vec![
        format!("TID={}", tree.tid()),
        format!("nPushNodeFailures={}", tree.push_node_failures()),
        format!(
            "nTreeNodesInUse/Max={}/{}",
            tree.num_nodes(),
            tree.max_tree_nodes()
        ),
    ];
    if let Some(rule) = tree.aggregated_by() {
        labels.push(format!("AggregatedByRule={}", rule));
    }
    let _ = writeln!(out, "labelloc=\"b\"\nlabel=\"{}\"", join_labels(&labels));

    push_scope(out, tree.key(), tree.root(), &path_segment(tree.root().name()));
    out.push_str("}\n");
}

/// **Private** - a scope node, its edges, then its children
fn push_scope(out: &mut String, key: TreeKey, node: WeightedNode<'_>, path: &str) {
    let mut labels = Vec::new();
    let shape = if node.level() == 1 {
        labels.push(format!("thread={}", node.name()));
        labels.push(format!("TID={}", node.owner_tid()));
        "box"
    } else {
        labels.push(format!("scope={}", node.name()));
        "ellipse"
    };

    if node.self_allocated() != node.total_allocated() {
        labels.push(format!("total_alloc={}", pretty_print_bytes(node.total_allocated())));
        labels.push(format!("self_alloc={}", pretty_print_bytes(node.self_allocated())));
    } else {
        labels.push(format!(
            "total_alloc=self_alloc={}",
            pretty_print_bytes(node.total_allocated())
        ));
    }
    let c = node.counters();
    labels.push(format!("self_freed={}", pretty_print_bytes(c.bytes_self_freed)));
    labels.push(format!("visited_times={}", c.times_entered_and_exited));
    labels.push(format!(
        "self_alloc_per_visit={}",
        pretty_print_bytes(node.average_self_bytes_per_visit())
    ));
    labels.push(format!("nCallsTo_malloc={}", c.calls_to_malloc));
    labels.push(format!("nCallsTo_realloc={}", c.calls_to_realloc));
    labels.push(format!("nCallsTo_calloc={}", c.calls_to_calloc));
    labels.push(format!("nCallsTo_free={}", c.calls_to_free));

    let name = node_name(key, path);
    let (fillcolor, fontsize) = self_weight_style(node.weight().rounded_self_percent());
    let _ = writeln!(
        out,
        "\"{}\" [label=\"{}\" shape={} fillcolor={} fontsize={}]",
        escape(&name),
        join_labels(&labels),
        shape,
        fillcolor,
        fontsize
    );

    let children: Vec<(WeightedNode<'_>, String)> = node
        .children()
        .map(|child| {
            let child_path = format!("{}/{}", path, path_segment(child.name()));
            (child, child_path)
        })
        .collect();

    for (child, child_path) in &children {
        let _ = writeln!(
            out,
            "\"{}\" -> \"{}\" [label=\"w={:.2}%\"]",
            escape(&name),
            escape(&node_name(key, child_path)),
            child.weight().rounded_total_percent()
        );
    }
    for (child, child_path) in children {
        push_scope(out, key, child, &child_path);
    }
}

/// **Private** - fill colour and font size for a self weight
fn self_weight_style(self_percent: f64) -> (u8, u8) {
    SELF_WEIGHT_STYLES
        .iter()
        .find(|(limit, _, _)| self_percent < *limit)
        .map(|(_, fill, font)| (*fill, *font))
        .unwrap_or(HEAVIEST_STYLE)
}

/// **Private** - scope name with `/` escaped, so it can be joined into a path
fn path_segment(name: &str) -> String {
    name.replace('%', "%25").replace('/', "%2F")
}

/// **Private** - graph node name, unique across the document
fn node_name(key: TreeKey, scope_path: &str) -> String {
    format!("{}_{}", key, scope_path)
}

fn push_node_defaults(out: &mut String) {
    let _ = writeln!(out, "node [colorscheme={} style=filled]", COLORSCHEME);
}

fn push_node(out: &mut String, name: &str, labels: &[String]) {
    let _ = writeln!(out, "\"{}\" [label=\"{}\"]", escape(name), join_labels(labels));
}

/// **Private** - DOT `\n` separated label text
fn join_labels(labels: &[String]) -> String {
    labels
        .iter()
        .map(|l| escape(l))
        .collect::<Vec<_>>()
        .join("\\n")
}

fn escape(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}
