use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_CONFIG_NAME: &str = "armature.config.json";

/// Engine configuration file format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Undo levels kept (0 = unbounded)
    #[serde(default = "default_history_depth")]
    pub history_depth: usize,

    /// Rounds of subscriber follow-up commands drained per execute
    #[serde(default = "default_max_follow_up_rounds")]
    pub max_follow_up_rounds: usize,

    /// Run the mirror/relabel passes after every accepted command
    #[serde(default = "default_true")]
    pub synchronize_on_execute: bool,
}

fn default_history_depth() -> usize {
    crate::undo_stack::DEFAULT_MAX_LEVELS
}

fn default_max_follow_up_rounds() -> usize {
    16
}

fn default_true() -> bool {
    true
}

impl EngineConfig {
    /// Load config from a directory
    pub fn load(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let config_path = dir.as_ref().join(DEFAULT_CONFIG_NAME);

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config: EngineConfig = serde_json::from_str(&content)?;
            Ok(config)
        } else {
            // Return default config if none exists
            Ok(EngineConfig::default())
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            history_depth: default_history_depth(),
            max_follow_up_rounds: default_max_follow_up_rounds(),
            synchronize_on_execute: true,
        }
    }
}
