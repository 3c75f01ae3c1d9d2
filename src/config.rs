//! Engine configuration handling

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadConfig {
    /// Top-level comments requested per page.
    pub top_level_page_size: usize,
    /// Replies requested per "show more replies".
    pub reply_page_size: usize,
    /// Delay between two height-convergence passes.
    pub height_tick_interval_ms: u64,
    /// Height difference that still counts as "unchanged".
    pub height_tolerance: f64,
    /// Stale passes tolerated before a row height is frozen.
    pub max_stale_ticks: u32,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            top_level_page_size: 20,
            reply_page_size: 20,
            height_tick_interval_ms: 500,
            height_tolerance: 1.0,
            max_stale_ticks: 3,
        }
    }
}

impl ThreadConfig {
    #[must_use]
    pub fn top_level_page_size(&self) -> usize {
        self.top_level_page_size.max(1)
    }

    #[must_use]
    pub fn reply_page_size(&self) -> usize {
        self.reply_page_size.max(1)
    }

    #[must_use]
    pub const fn height_tick_interval(&self) -> Duration {
        Duration::from_millis(self.height_tick_interval_ms)
    }
}

/// Load engine configuration from the user's config directory.
///
/// # Errors
///
/// Returns an error if the config file exists but cannot be read or parsed.
pub fn load_thread_config() -> anyhow::Result<Option<ThreadConfig>> {
    let Some(path) = config_path() else {
        return Ok(None);
    };
    load_thread_config_from(&path)
}

/// Load engine configuration from an explicit path.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_thread_config_from(path: &Path) -> anyhow::Result<Option<ThreadConfig>> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let config = serde_json::from_str(&contents)
        .with_context(|| format!("Failed to parse config: {}", path.display()))?;
    Ok(Some(config))
}

fn config_path() -> Option<PathBuf> {
    let base = if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg)
    } else if let Ok(home) = std::env::var("HOME") {
        Path::new(&home).join(".config")
    } else {
        return None;
    };

    Some(base.join("discussion-thread").join("config.json"))
}
