//! Configuration
//!
//! Tunables for the reactive runtime and the frame driver. Every field has a
//! default, so a partial JSON document (or `{}`) is a valid configuration.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Reactive runtime settings.
    pub runtime: RuntimeConfig,
    /// Frame driver settings.
    pub frame: FrameConfig,
}

/// Settings of the reactive runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// How many further propagation rounds effect writes may trigger within
    /// one transaction before it is aborted with `MaxDepthExceeded`.
    pub max_reentrancy_depth: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_reentrancy_depth: 100,
        }
    }
}

/// Settings of the frame driver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Skip frames with no writes and no dirty widget.
    pub skip_idle_frames: bool,
    /// Lay out at most this many layout roots per frame; the rest wait for
    /// the next frame. `None` means no budget.
    pub max_layout_roots_per_frame: Option<usize>,
    /// Merge overlapping dirty rectangles before presenting.
    pub coalesce_dirty_rects: bool,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            skip_idle_frames: true,
            max_layout_roots_per_frame: None,
            coalesce_dirty_rects: true,
        }
    }
}

impl Config {
    /// Parse and validate a JSON configuration document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as pretty-printed JSON.
    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject values that would make the driver unable to progress.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame.max_layout_roots_per_frame == Some(0) {
            return Err(ConfigError::Invalid {
                field: "frame.max_layout_roots_per_frame",
                reason: "a budget of zero roots never lays anything out".into(),
            });
        }
        Ok(())
    }
}
