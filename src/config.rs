//! # Engine Configuration
//!
//! Plain serde structs. Every field has a default so a partial JSON file
//! (or no file at all) yields a usable configuration.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Tuning knobs for [`Interpreter`](crate::interpreter::Interpreter).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpreterConfig {
    /// Capacity of the broadcast channel events are published on. Slow
    /// subscribers start lagging once it fills up.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Call depth at which the runtime raises a recursion fault.
    #[serde(default = "default_max_call_depth")]
    pub max_call_depth: usize,

    /// Stack size of the worker thread in bytes. `None` keeps the
    /// platform default.
    #[serde(default)]
    pub worker_stack_size: Option<usize>,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            event_capacity: default_event_capacity(),
            max_call_depth: default_max_call_depth(),
            worker_stack_size: None,
        }
    }
}

impl InterpreterConfig {
    // JSONファイルから設定を読み込む
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let config = serde_json::from_reader(reader)?;
        Ok(config)
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to open config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

// デフォルト値の定義
fn default_event_capacity() -> usize {
    64
}

fn default_max_call_depth() -> usize {
    200
}
