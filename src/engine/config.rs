//! Coordinator configuration.
//!
//! `CoordinatorConfig` controls the frame loop and the defaults used for surfaces driven by
//! the coordinator. It provides sensible defaults via [`Default`], a fluent
//! [`CoordinatorConfig::builder()`] with validation, and JSON loading for hosts that ship
//! their settings as a file.
//!
//! # Examples
//!
//! ## Use defaults
//! ```rust
//! use render_coordinator::CoordinatorConfig;
//! let cfg = CoordinatorConfig::default();
//! assert_eq!(cfg.touched_capacity, 20);
//! ```
//!
//! ## Customize with the builder
//! ```rust
//! use render_coordinator::CoordinatorConfig;
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let cfg = CoordinatorConfig::builder()
//!     .frame_interval_ms(8)
//!     .default_font_size(48.0)
//!     .default_font_weight(700.0)
//!     .build()?;
//! # Ok(()) }
//! ```
//!
//! # Fields (summary)
//! - `touched_capacity`: initial capacity of the per-frame touched surface buffer (default: 20).
//! - `event_channel_capacity`: capacity of the event bus (default: 128).
//! - `frame_interval_ms`: cadence of the [`IntervalFrameClock`](crate::engine::frame::IntervalFrameClock) (default: 16).
//! - `dispatch_empty_frames`: call the renderer even when nothing was touched (default: false).
//! - `default_text`, `default_font_size`, `default_font_weight`: initial attributes of a
//!   variable font surface that is created implicitly by `set_attribute`.
//! - `base_color`: colour surfaces are cleared to (default: opaque white).
//!
//! # Errors
//!
//! Validation returns [`ConfigError`] for zero capacities, a zero frame interval, a
//! non-positive font size, or a font weight outside `1.0..=1000.0`.

use std::path::Path;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::engine::DEFAULT_CHANNEL_CAPACITY;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub touched_capacity: usize,
    pub event_channel_capacity: usize,
    pub frame_interval_ms: u64,
    pub dispatch_empty_frames: bool,
    pub default_text: String,
    pub default_font_size: f32,
    pub default_font_weight: f32,
    pub base_color: [u8; 4],
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            touched_capacity: 20,
            event_channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            frame_interval_ms: 16,
            dispatch_empty_frames: false,
            default_text: String::new(),
            default_font_size: 24.0,
            default_font_weight: 400.0,
            base_color: [0xff, 0xff, 0xff, 0xff],
        }
    }
}

impl CoordinatorConfig {
    pub fn builder() -> CoordinatorConfigBuilder {
        CoordinatorConfigBuilder::default()
    }

    /// Parse and validate a JSON document. Missing fields take their default value.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: CoordinatorConfig = serde_json::from_str(json)?;
        validate(&config)?;
        Ok(config)
    }

    /// Read, parse and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

/// Builder for [`CoordinatorConfig`].
#[derive(Debug, Clone, Default)]
pub struct CoordinatorConfigBuilder {
    inner: CoordinatorConfig,
}

impl CoordinatorConfigBuilder {
    #[inline]
    fn map(mut self, f: impl FnOnce(&mut CoordinatorConfig)) -> Self {
        f(&mut self.inner);
        self
    }

    pub fn touched_capacity(self, n: usize) -> Self { self.map(|c| c.touched_capacity = n) }
    pub fn event_channel_capacity(self, n: usize) -> Self { self.map(|c| c.event_channel_capacity = n) }
    pub fn frame_interval_ms(self, ms: u64) -> Self { self.map(|c| c.frame_interval_ms = ms) }
    pub fn dispatch_empty_frames(self, on: bool) -> Self { self.map(|c| c.dispatch_empty_frames = on) }
    pub fn default_text<S: Into<String>>(self, text: S) -> Self { self.map(|c| c.default_text = text.into()) }
    pub fn default_font_size(self, px: f32) -> Self { self.map(|c| c.default_font_size = px) }
    pub fn default_font_weight(self, weight: f32) -> Self { self.map(|c| c.default_font_weight = weight) }
    pub fn base_color(self, rgba: [u8; 4]) -> Self { self.map(|c| c.base_color = rgba) }

    /// Apply multiple changes in one go.
    pub fn with(self, f: impl FnOnce(&mut CoordinatorConfig)) -> Self { self.map(f) }

    /// Validate and build the final config.
    pub fn build(self) -> Result<CoordinatorConfig, ConfigError> {
        validate(&self.inner)?;
        Ok(self.inner)
    }
}

// ---------- Validation ----------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("touched_capacity must be at least 1")]
    ZeroTouchedCapacity,

    #[error("event_channel_capacity must be at least 1")]
    ZeroEventCapacity,

    #[error("frame_interval_ms must be at least 1")]
    ZeroFrameInterval,

    #[error("default_font_size {0} must be positive")]
    InvalidFontSize(f32),

    #[error("default_font_weight {0} is out of range (expected 1.0..=1000.0)")]
    InvalidFontWeight(f32),

    #[error("Cannot parse config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cannot read config: {0}")]
    Io(#[from] std::io::Error),
}

fn validate(c: &CoordinatorConfig) -> Result<(), ConfigError> {
    if c.touched_capacity == 0 {
        return Err(ConfigError::ZeroTouchedCapacity);
    }
    if c.event_channel_capacity == 0 {
        return Err(ConfigError::ZeroEventCapacity);
    }
    if c.frame_interval_ms == 0 {
        return Err(ConfigError::ZeroFrameInterval);
    }
    if !(c.default_font_size > 0.0) {
        return Err(ConfigError::InvalidFontSize(c.default_font_size));
    }
    if !(1.0..=1000.0).contains(&c.default_font_weight) {
        return Err(ConfigError::InvalidFontWeight(c.default_font_weight));
    }
    Ok(())
}
