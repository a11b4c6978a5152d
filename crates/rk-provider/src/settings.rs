use std::path::Path;
use std::time::Duration;

use rk_data::NullConfig;
use serde::{Deserialize, Serialize};

use crate::Result;

/// Provider settings
///
/// Every field has a default, so a config file only needs the values it
/// changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Maximum number of sort criteria per ranking
    pub max_sort_criteria: usize,

    /// Maximum number of group criteria per ranking
    pub max_group_criteria: usize,

    /// Window in which dirty notifications coalesce into one re-sort
    pub debounce_ms: u64,

    /// Whether more than one row can be selected
    pub multi_selection: bool,

    /// Add a rank column to new rankings
    pub auto_rank_column: bool,

    /// Add a selection column to new rankings
    pub auto_selection_column: bool,

    /// Add a group aggregation column to new rankings
    pub aggregate_column: bool,

    /// Missing value detection
    pub nulls: NullConfig,

    /// Width of columns whose descriptor sets none
    pub default_width: f64,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            max_sort_criteria: 1,
            max_group_criteria: 1,
            debounce_ms: 50,
            multi_selection: true,
            auto_rank_column: true,
            auto_selection_column: false,
            aggregate_column: false,
            nulls: NullConfig::default(),
            default_width: 100.0,
        }
    }
}

impl ProviderSettings {
    /// Load settings from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}
