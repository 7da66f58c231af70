//! Field names of the malloc-tag JSON snapshot format, plus small typed
//! accessors used by the model loaders.
//!
//! The snapshot keys are dynamic (`tree_for_*`, `scope_*`), so records are
//! walked as `serde_json::Value` rather than deserialized into fixed structs.

use crate::utils::error::LoadError;
use serde_json::{Map, Value};

// Process-level fields
pub const PID: &str = "PID";
pub const TM_START_PROFILING: &str = "tmStartProfiling";
pub const TM_CURRENT_SNAPSHOT: &str = "tmCurrentSnapshot";
pub const TM_POST_PROCESSED: &str = "tmPostProcessed";
pub const N_BYTES_ALLOC_BEFORE_INIT: &str = "nBytesAllocBeforeInit";
pub const N_BYTES_MALLOC_TAG_SELF_USAGE: &str = "nBytesMallocTagSelfUsage";
pub const VM_SIZE_NOW_BYTES: &str = "vmSizeNowBytes";
pub const VM_RSS_NOW_BYTES: &str = "vmRSSNowBytes";
pub const N_TOTAL_TRACKED_BYTES: &str = "nTotalTrackedBytes";
pub const N_TOTAL_ALLOCATED_BYTES: &str = "nTotalAllocatedBytes";
pub const N_TOTAL_FREED_BYTES: &str = "nTotalFreedBytes";

// Tree-level fields
pub const TID: &str = "TID";
pub const THREAD_NAME: &str = "ThreadName";
pub const N_TREE_LEVELS: &str = "nTreeLevels";
pub const N_TREE_NODES_IN_USE: &str = "nTreeNodesInUse";
pub const N_MAX_TREE_NODES: &str = "nMaxTreeNodes";
pub const N_PUSH_NODE_FAILURES: &str = "nPushNodeFailures";
pub const N_FREE_TRACKING_FAILED: &str = "nFreeTrackingFailed";
pub const N_VM_SIZE_AT_CREATION: &str = "nVmSizeAtCreation";
pub const AGGREGATED_BY_RULE: &str = "AggregatedByRule";

// Node-level fields
pub const N_BYTES_TOTAL_ALLOCATED: &str = "nBytesTotalAllocated";
pub const N_BYTES_TOTAL_FREED: &str = "nBytesTotalFreed";
pub const N_BYTES_SELF_ALLOCATED: &str = "nBytesSelfAllocated";
pub const N_BYTES_SELF_FREED: &str = "nBytesSelfFreed";
pub const N_TIMES_ENTERED_AND_EXITED: &str = "nTimesEnteredAndExited";
pub const N_WEIGHT_PERCENTAGE: &str = "nWeightPercentage";
pub const N_SELF_WEIGHT_PERCENTAGE: &str = "nSelfWeightPercentage";
pub const N_CALLS_TO_MALLOC: &str = "nCallsTo_malloc";
pub const N_CALLS_TO_REALLOC: &str = "nCallsTo_realloc";
pub const N_CALLS_TO_CALLOC: &str = "nCallsTo_calloc";
pub const N_CALLS_TO_FREE: &str = "nCallsTo_free";
pub const NESTED_SCOPES: &str = "nestedScopes";

/// Borrow `value` as a JSON object
pub fn as_object<'a>(value: &'a Value, context: &str) -> Result<&'a Map<String, Value>, LoadError> {
    value
        .as_object()
        .ok_or_else(|| LoadError::InvalidFormat(format!("{} must be a JSON object", context)))
}

/// Read a mandatory non-negative integer field
pub fn required_u64(obj: &Map<String, Value>, field: &str, context: &str) -> Result<u64, LoadError> {
    match obj.get(field) {
        Some(value) => value.as_u64().ok_or_else(|| LoadError::InvalidCounter {
            context: context.to_string(),
            field: field.to_string(),
        }),
        None => Err(missing(field, context)),
    }
}

/// Read an optional non-negative integer field
///
/// A present field with the wrong type is still an error.
pub fn optional_u64(
    obj: &Map<String, Value>,
    field: &str,
    context: &str,
) -> Result<Option<u64>, LoadError> {
    match obj.get(field) {
        Some(_) => required_u64(obj, field, context).map(Some),
        None => Ok(None),
    }
}

/// Read a mandatory text field
///
/// Numbers are accepted and kept in their JSON textual form: some producers
/// emit timestamps and thread names as plain numbers.
pub fn required_text(
    obj: &Map<String, Value>,
    field: &str,
    context: &str,
) -> Result<String, LoadError> {
    match obj.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(_) => Err(LoadError::InvalidFormat(format!(
            "Field '{}' in {} must be a string",
            field, context
        ))),
        None => Err(missing(field, context)),
    }
}

fn missing(field: &str, context: &str) -> LoadError {
    LoadError::MissingField {
        context: context.to_string(),
        field: field.to_string(),
    }
}
