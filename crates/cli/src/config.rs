//! Environment-driven defaults.
//!
//! ```text
//! SSTABLE_TOOL_OUTPUT_DIR   where files such as histogram.json are written (default: ".")
//! SSTABLE_TOOL_MAX_READERS  concurrent reader permits (default: 0 = unlimited)
//! ```
//!
//! Command-line flags take precedence over the environment.

use std::path::PathBuf;

pub const OUTPUT_DIR_VAR: &str = "SSTABLE_TOOL_OUTPUT_DIR";
pub const MAX_READERS_VAR: &str = "SSTABLE_TOOL_MAX_READERS";

/// Reads a configuration value from the environment, falling back to `default`.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolConfig {
    pub output_dir: PathBuf,
    /// `None` admits any number of readers.
    pub max_readers: Option<usize>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            max_readers: None,
        }
    }
}

impl ToolConfig {
    pub fn from_env() -> Self {
        let output_dir = PathBuf::from(env_or(OUTPUT_DIR_VAR, "."));
        let max_readers: usize = env_or(MAX_READERS_VAR, "0").parse().unwrap_or(0);
        Self {
            output_dir,
            max_readers: (max_readers > 0).then_some(max_readers),
        }
    }

    #[must_use]
    pub fn with_output_dir(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dir {
            self.output_dir = dir;
        }
        self
    }
}
