use malloc_tag_tools::aggregator::AggregationRule;
use malloc_tag_tools::model::Snapshot;
use malloc_tag_tools::output::{pretty_print_bytes, render_dot, snapshot_to_string, write_dot, write_snapshot};
use malloc_tag_tools::parser::read_snapshot;
use malloc_tag_tools::utils::OutputError;
use serde_json::{json, Value};

fn scope(self_alloc: u64, visits: u64, nested: Value) -> Value {
    json!({
        "nBytesTotalAllocated": self_alloc,
        "nBytesSelfAllocated": self_alloc,
        "nBytesSelfFreed": 0,
        "nTimesEnteredAndExited": visits,
        "nCallsTo_malloc": visits,
        "nCallsTo_realloc": 0,
        "nCallsTo_calloc": 0,
        "nCallsTo_free": 0,
        "nestedScopes": nested
    })
}

fn create_test_snapshot() -> Snapshot {
    let raw = json!({
        "PID": 31,
        "tmStartProfiling": "2023-10-01 10:00:00",
        "tmCurrentSnapshot": "2023-10-01 10:00:05",
        "nBytesAllocBeforeInit": 2_000,
        "nBytesMallocTagSelfUsage": 3_000_000,
        "vmSizeNowBytes": 4_000_000_000u64,
        "vmRSSNowBytes": 5,
        "tree_for_TID31": {
            "TID": 31,
            "ThreadName": "main",
            "nPushNodeFailures": 0,
            "nFreeTrackingFailed": 0,
            "nMaxTreeNodes": 64,
            "nVmSizeAtCreation": 0,
            "scope_main": scope(100, 1, json!({
                "scope_load": scope(8_000, 4, json!({}))
            }))
        },
        "tree_for_TID32": {
            "TID": 32,
            "ThreadName": "worker-1",
            "nPushNodeFailures": 3,
            "nFreeTrackingFailed": 0,
            "nMaxTreeNodes": 64,
            "nVmSizeAtCreation": 0,
            "scope_worker-1": scope(1_900, 0, json!({}))
        }
    });
    Snapshot::load(&raw).unwrap()
}

#[test]
fn test_render_dot_structure() {
    let dot = render_dot(&create_test_snapshot());

    assert!(dot.starts_with("digraph MallocTagSnapshot {\n"));
    assert!(dot.ends_with("}\n"));
    assert!(dot.contains("node [colorscheme=reds9 style=filled]"));
    assert!(dot.contains("subgraph \"cluster_TID31\" {"));
    assert!(dot.contains("subgraph \"cluster_TID32\" {"));
    assert!(dot.contains("TID=32\\nnPushNodeFailures=3\\nnTreeNodesInUse/Max=1/64"));
}

#[test]
fn test_render_dot_process_node() {
    let dot = render_dot(&create_test_snapshot());

    assert!(dot.contains("\"Process_31\" [label=\"Whole process stats\\nallocated_mem_before_malloctag_init=2kB\\nallocated_mem_by_malloctag_itself=3MB\\nallocated_mem=10kB\\nvm_size_now=4GB\\nvm_rss_now=5B"));
    assert!(dot.contains("\"Process_31\" -> \"TID31_main\" [label=\"81.00%\"]"));
    assert!(dot.contains("\"Process_31\" -> \"TID32_worker-1\" [label=\"19.00%\"]"));
}

#[test]
fn test_render_dot_scope_nodes() {
    let dot = render_dot(&create_test_snapshot());

    // root node: thread label, box shape, light fill for a 1% self weight
    assert!(dot.contains(
        "\"TID31_main\" [label=\"thread=main\\nTID=31\\ntotal_alloc=8kB\\nself_alloc=100B\\nself_freed=0B\\nvisited_times=1\\nself_alloc_per_visit=100B\\nnCallsTo_malloc=1\\nnCallsTo_realloc=0\\nnCallsTo_calloc=0\\nnCallsTo_free=0\" shape=box fillcolor=1 fontsize=9]"
    ));
    // nested node: scope label, ellipse, dark fill for an 80% self weight
    assert!(dot.contains(
        "\"TID31_main/load\" [label=\"scope=load\\ntotal_alloc=self_alloc=8kB\\nself_freed=0B\\nvisited_times=4\\nself_alloc_per_visit=2kB"
    ));
    assert!(dot.contains("shape=ellipse fillcolor=7 fontsize=20]"));
    assert!(dot.contains("\"TID31_main\" -> \"TID31_main/load\" [label=\"w=80.00%\"]"));
    // never-visited scope
    assert!(dot.contains("visited_times=0\\nself_alloc_per_visit=0B"));
}

#[test]
fn test_render_dot_aggregated_tree() {
    let mut snapshot = create_test_snapshot();
    let rule = AggregationRule::aggregate_trees(0, "rule_everything", ".*").unwrap();
    snapshot.apply_aggregation_rule(&rule);

    let dot = render_dot(&snapshot);

    assert!(dot.contains("subgraph \"cluster_rule0\" {"));
    assert!(dot.contains("AggregatedByRule=rule_everything"));
    assert!(dot.contains("\"rule0_rule_everything\" [label=\"thread=rule_everything\\nTID=31"));
    assert!(dot.contains("\"Process_31\" -> \"rule0_rule_everything\" [label=\"100.00%\"]"));
}

#[test]
fn test_write_dot() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("graphs/snapshot.dot");
    let snapshot = create_test_snapshot();

    write_dot(&snapshot, &path).unwrap();

    let written = std::fs::read_to_string(&path).unwrap();
    assert_eq!(written, render_dot(&snapshot));
}

#[test]
fn test_write_dot_rejects_other_formats() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = create_test_snapshot();

    for name in ["snapshot.svg", "snapshot.png", "snapshot.jpeg"] {
        let result = write_dot(&snapshot, dir.path().join(name));
        assert!(matches!(result, Err(OutputError::UnsupportedFormat(_))));
        assert!(!dir.path().join(name).exists());
    }
}

#[test]
fn test_write_snapshot_and_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out/postprocessed.json");
    let snapshot = create_test_snapshot();

    write_snapshot(&snapshot, &path).unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    let value: Value = serde_json::from_str(&text).unwrap();
    assert!(value.get("tmPostProcessed").is_some());
    assert_eq!(value["nTotalAllocatedBytes"], json!(10_000));
    assert_eq!(value["tree_for_TID31"]["nTreeLevels"], json!(2));
    assert_eq!(
        value["tree_for_TID31"]["scope_main"]["nestedScopes"]["scope_load"]["nSelfWeightPercentage"],
        json!(80.0)
    );

    let reloaded = read_snapshot(&path).unwrap();
    assert_eq!(reloaded.totals(), snapshot.totals());
}

#[test]
fn test_write_snapshot_into_directory_fails() {
    let dir = tempfile::tempdir().unwrap();
    let result = write_snapshot(&create_test_snapshot(), dir.path());
    assert!(matches!(result, Err(OutputError::InvalidPath(_))));
}

#[test]
fn test_snapshot_to_string_key_order() {
    let text = snapshot_to_string(&create_test_snapshot()).unwrap();

    let pid = text.find("\"PID\"").unwrap();
    let tree = text.find("\"tree_for_TID31\"").unwrap();
    let total = text.find("\"nTotalTrackedBytes\"").unwrap();
    assert!(pid < tree && tree < total);
}

#[test]
fn test_pretty_print_bytes_boundaries() {
    assert_eq!(pretty_print_bytes(999_999), "999kB");
    assert_eq!(pretty_print_bytes(1_000_000), "1MB");
    assert_eq!(pretty_print_bytes(999_999_999), "999MB");
    assert_eq!(pretty_print_bytes(1_000_000_000), "1GB");
}

#[test]
fn test_render_dot_slash_in_scope_name() {
    let raw = json!({
        "PID": 5,
        "tmStartProfiling": "2023-10-01 10:00:00",
        "tmCurrentSnapshot": "2023-10-01 10:00:05",
        "nBytesAllocBeforeInit": 0,
        "nBytesMallocTagSelfUsage": 0,
        "vmSizeNowBytes": 0,
        "vmRSSNowBytes": 0,
        "tree_for_TID5": {
            "TID": 5,
            "ThreadName": "main",
            "nPushNodeFailures": 0,
            "nFreeTrackingFailed": 0,
            "nMaxTreeNodes": 64,
            "nVmSizeAtCreation": 0,
            "scope_main": scope(0, 1, json!({
                "scope_a/b": scope(10, 1, json!({})),
                "scope_a": scope(20, 1, json!({ "scope_b": scope(30, 1, json!({})) }))
            }))
        }
    });
    let dot = render_dot(&Snapshot::load(&raw).unwrap());

    assert!(dot.contains("\"TID5_main/a%2Fb\" [label=\"scope=a/b"));
    assert!(dot.contains("\"TID5_main/a/b\" [label=\"scope=b"));
    let declarations = dot.lines().filter(|l| l.contains("shape=")).count();
    assert_eq!(declarations, 4);
}
