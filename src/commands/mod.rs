//! CLI command implementations.
//!
//! Each command is implemented in its own module.
//! Commands orchestrate the various library components to perform user tasks.

pub mod models;
pub mod postprocess;
pub mod render;
pub mod utils;

// Re-export main command functions
pub use models::{PostprocessArgs, RenderArgs};
pub use postprocess::execute_postprocess;
pub use render::execute_render;
pub use utils::{display_stats, display_version};
