//! AI opponent configuration
//!
//! [`AiConfig`] is plain serde data so it can come from a JSON file, a CLI or
//! the wasm front end. Missing fields take their defaults:
//!
//! ```json
//! { "strategy": "greedy", "depth": 2, "timeout_ms": 1000 }
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::engine::Strategy;
use crate::error::Result;

/// Deepest minimax search a controller will run.
pub const MAX_DEPTH: u32 = 4;

pub const DEFAULT_DEPTH: u32 = 3;

pub const DEFAULT_TIMEOUT_MS: u64 = 2500;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Debug)]
#[serde(default)]
pub struct AiConfig {
    pub strategy: Strategy,
    pub depth: u32,
    /// How long to wait for the background search before searching in the
    /// foreground.
    pub timeout_ms: u64,
}

impl Default for AiConfig {
    fn default() -> Self {
        AiConfig {
            strategy: Strategy::Minimax,
            depth: DEFAULT_DEPTH,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

impl AiConfig {
    pub fn from_json_str(json: &str) -> Result<AiConfig> {
        let mut config: AiConfig = serde_json::from_str(json)?;
        config.depth = clamp_depth(config.depth);
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<AiConfig> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let config = Self::from_json_str(&contents)?;
        info!(path = %path.display(), ?config, "loaded AI config");
        Ok(config)
    }

    /// Like [`load`](Self::load), but a missing or broken file yields the
    /// defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> AiConfig {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "using default AI config");
                AiConfig::default()
            }
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Clamp a requested search depth into `1..=MAX_DEPTH`.
pub fn clamp_depth(depth: u32) -> u32 {
    depth.clamp(1, MAX_DEPTH)
}
