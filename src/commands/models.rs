use std::path::PathBuf;

use crate::utils::config::STDIN_PATH;

/// Arguments for the postprocess command
///
/// **Public** - used by main.rs to construct from CLI args
#[derive(Debug, Clone)]
pub struct PostprocessArgs {
    /// Input snapshot, `-` for stdin
    pub input: PathBuf,

    /// Output path for the post-processed JSON (optional)
    pub output: Option<PathBuf>,

    /// Rule file (optional)
    pub rules: Option<PathBuf>,

    /// Number of hot scopes printed with the summary
    pub top_scopes: usize,

    /// Print text summary to stdout
    pub print_summary: bool,
}

impl Default for PostprocessArgs {
    fn default() -> Self {
        Self {
            input: PathBuf::from(STDIN_PATH),
            output: None,
            rules: None,
            top_scopes: 10,
            print_summary: false,
        }
    }
}

/// Arguments for the render command
///
/// **Public** - used by main.rs to construct from CLI args
#[derive(Debug, Clone)]
pub struct RenderArgs {
    /// Input snapshot, `-` for stdin
    pub input: PathBuf,

    /// Output path for the DOT graph
    pub output: PathBuf,

    /// Rule file applied before rendering (optional)
    pub rules: Option<PathBuf>,
}

impl Default for RenderArgs {
    fn default() -> Self {
        Self {
            input: PathBuf::from(STDIN_PATH),
            output: PathBuf::from("snapshot.dot"),
            rules: None,
        }
    }
}
