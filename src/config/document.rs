//! The overlay configuration document
//!
//! Read once at startup. A missing or malformed document is fatal; the caller
//! reports the [`ConfigError`] and exits before any window exists.

use serde::{Deserialize, Deserializer};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::SourceDescriptor;
use crate::constants::{bounds, config, hotkey, validation};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

/// Overlay configuration, immutable after load
#[derive(Debug, Clone, Deserialize)]
pub struct OverlayConfig {
    /// Content regions in stacking order (later entries on top)
    #[serde(default, deserialize_with = "null_as_empty")]
    pub sources: Vec<SourceDescriptor>,

    /// Text painted in the header strip
    #[serde(default = "default_title")]
    pub title: String,

    /// Accelerator that drives the Framed/Frameless/Hidden cycle
    #[serde(default = "default_hotkey")]
    pub hotkey: String,

    /// Whole-window opacity, 0-100
    #[serde(default = "default_opacity_percent", deserialize_with = "opacity_percent")]
    pub opacity_percent: u8,

    /// Coalescing window for bounds saves (0 = save on every move/resize)
    #[serde(default = "default_save_debounce_ms", deserialize_with = "save_debounce_ms")]
    pub save_debounce_ms: u64,

    /// Embedder argv; `{window}` and `{url}` are substituted per source
    #[serde(default)]
    pub embed_command: Option<Vec<String>>,

    /// Fontconfig family used for the header title
    #[serde(default)]
    pub title_font: Option<String>,
}

/// `"sources": null` reads like an absent list
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<SourceDescriptor>, D::Error> {
    Ok(Option::<Vec<SourceDescriptor>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Read any JSON number and clamp it into `[0, max]`, rounding fractions
fn clamped_number<'de, D: Deserializer<'de>>(deserializer: D, field: &str, max: u64) -> Result<u64, D::Error> {
    let raw = f64::deserialize(deserializer)?;
    let clamped = if raw.is_nan() { 0.0 } else { raw.round().clamp(0.0, max as f64) };
    if clamped != raw {
        warn!(field = field, value = raw, using = clamped, max = max, "config value out of range, clamping");
    }
    Ok(clamped as u64)
}

fn opacity_percent<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let max = validation::MAX_OPACITY_PERCENT;
    clamped_number(deserializer, "opacity_percent", max as u64).map(|n| n as u8)
}

fn save_debounce_ms<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    clamped_number(deserializer, "save_debounce_ms", validation::MAX_SAVE_DEBOUNCE_MS)
}

fn default_title() -> String {
    config::DEFAULT_TITLE.to_string()
}

fn default_hotkey() -> String {
    hotkey::DEFAULT_ACCELERATOR.to_string()
}

fn default_opacity_percent() -> u8 {
    validation::MAX_OPACITY_PERCENT
}

fn default_save_debounce_ms() -> u64 {
    bounds::DEFAULT_SAVE_DEBOUNCE_MS
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            title: default_title(),
            hotkey: default_hotkey(),
            opacity_percent: default_opacity_percent(),
            save_debounce_ms: default_save_debounce_ms(),
            embed_command: None,
            title_font: None,
        }
    }
}

impl OverlayConfig {
    /// `$XDG_CONFIG_HOME/web-overlay/config.json`
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(config::APP_DIR);
        path.push(config::FILENAME);
        path
    }

    /// Window-state file kept beside the given config file
    pub fn state_path_for(config_path: &Path) -> PathBuf {
        config_path
            .parent()
            .map(|dir| dir.join(config::STATE_FILENAME))
            .unwrap_or_else(|| PathBuf::from(config::STATE_FILENAME))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate_and_clamp();
        info!(path = %path.display(), sources = config.sources.len(), "Loaded overlay config");
        Ok(config)
    }

    pub fn from_json(contents: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(contents)
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    /// Embedder argv, ignoring an empty list
    pub fn embed_argv(&self) -> Option<&[String]> {
        self.embed_command.as_deref().filter(|argv| !argv.is_empty())
    }

    /// Numeric ranges are clamped while deserializing; this covers the
    /// remaining fields that parse but are unusable
    fn validate_and_clamp(&mut self) {
        if self.hotkey.trim().is_empty() {
            warn!(using = hotkey::DEFAULT_ACCELERATOR, "hotkey is empty, using default");
            self.hotkey = default_hotkey();
        }

        if matches!(&self.embed_command, Some(argv) if argv.is_empty()) {
            warn!("embed_command is empty, sources will show placeholders");
        }
    }
}
