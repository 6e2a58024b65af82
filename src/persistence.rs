//! Window bounds persistence
//!
//! The store is a best-effort cache: a missing or corrupt file degrades to
//! default bounds and never blocks startup, and a failed write is reported
//! by the caller without stopping the overlay.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::constants::bounds::{DEFAULT_HEIGHT, DEFAULT_WIDTH};

/// Persisted overlay geometry. `x`/`y` unset lets the window manager place
/// the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowBounds {
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<i32>,
}

impl Default for WindowBounds {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            x: None,
            y: None,
        }
    }
}

impl WindowBounds {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            x: Some(x),
            y: Some(y),
        }
    }

    /// Position, only when both coordinates are known
    pub fn position(&self) -> Option<(i32, i32)> {
        self.x.zip(self.y)
    }

    pub fn same_size(&self, other: &WindowBounds) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// Zero-sized records are not usable geometry
    fn sanitized(mut self) -> Self {
        if self.width == 0 {
            self.width = DEFAULT_WIDTH;
        }
        if self.height == 0 {
            self.height = DEFAULT_HEIGHT;
        }
        self
    }
}

/// Why `load` fell back to defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultReason {
    Missing,
    Unreadable(String),
    Corrupt(String),
}

/// Result of reading the bounds file: either what was stored or the defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundsLoad {
    Loaded(WindowBounds),
    Defaulted(WindowBounds, DefaultReason),
}

impl BoundsLoad {
    pub fn bounds(&self) -> WindowBounds {
        match self {
            BoundsLoad::Loaded(bounds) | BoundsLoad::Defaulted(bounds, _) => *bounds,
        }
    }

    #[cfg(test)]
    pub fn is_defaulted(&self) -> bool {
        matches!(self, BoundsLoad::Defaulted(..))
    }
}

#[derive(Debug, Clone)]
pub struct BoundsStore {
    path: PathBuf,
}

impl BoundsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Read the persisted record. Never fails; see [`BoundsLoad`].
    pub fn load(&self) -> BoundsLoad {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No saved window bounds, using defaults");
                return BoundsLoad::Defaulted(WindowBounds::default(), DefaultReason::Missing);
            }
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "Cannot read window bounds, using defaults");
                return BoundsLoad::Defaulted(
                    WindowBounds::default(),
                    DefaultReason::Unreadable(e.to_string()),
                );
            }
        };

        match serde_json::from_str::<WindowBounds>(&contents) {
            Ok(bounds) => {
                let bounds = bounds.sanitized();
                info!(path = %self.path.display(), ?bounds, "Loaded saved window bounds");
                BoundsLoad::Loaded(bounds)
            }
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "Corrupt window bounds file, using defaults");
                BoundsLoad::Defaulted(WindowBounds::default(), DefaultReason::Corrupt(e.to_string()))
            }
        }
    }

    /// Write to a sibling temp file and rename it over the record, so a
    /// reader sees either the old or the new file, never a partial one.
    pub fn save(&self, bounds: &WindowBounds) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .context(format!("Failed to create state directory: {}", parent.display()))?;
        }
        let contents = serde_json::to_string(bounds).context("Failed to serialize window bounds")?;
        let temp = self.temp_path();
        fs::write(&temp, contents)
            .context(format!("Failed to write window bounds to {}", temp.display()))?;
        fs::rename(&temp, &self.path).context(format!(
            "Failed to move {} over {}",
            temp.display(),
            self.path.display()
        ))?;
        debug!(path = %self.path.display(), ?bounds, "Saved window bounds");
        Ok(())
    }
}

/// Transient window-manager states during which bounds are not saved
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowFlags {
    pub minimized: bool,
    pub maximized: bool,
}

impl WindowFlags {
    pub fn is_transient(&self) -> bool {
        self.minimized || self.maximized
    }
}

/// Tracks the last representative bounds and coalesces saves.
///
/// Move/resize events arriving while the window is minimized or maximized
/// are dropped. Accepted events arm a deadline; the event loop calls
/// [`BoundsTracker::flush_due`] once it passes. A zero debounce saves on
/// every accepted event.
#[derive(Debug)]
pub struct BoundsTracker {
    store: BoundsStore,
    debounce: Duration,
    last: WindowBounds,
    flags: WindowFlags,
    deadline: Option<Instant>,
}

impl BoundsTracker {
    pub fn new(store: BoundsStore, initial: WindowBounds, debounce: Duration) -> Self {
        Self {
            store,
            debounce,
            last: initial,
            flags: WindowFlags::default(),
            deadline: None,
        }
    }

    /// Last bounds accepted for persistence
    pub fn last(&self) -> WindowBounds {
        self.last
    }

    pub fn set_flags(&mut self, flags: WindowFlags) {
        if flags != self.flags {
            debug!(minimized = flags.minimized, maximized = flags.maximized, "Window state changed");
            self.flags = flags;
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Record a move/resize at `now`. Returns whether it was accepted.
    pub fn record(&mut self, bounds: WindowBounds, now: Instant) -> bool {
        if self.flags.is_transient() {
            debug!(?bounds, minimized = self.flags.minimized, maximized = self.flags.maximized, "Ignoring bounds change in transient window state");
            return false;
        }
        if bounds == self.last && self.deadline.is_none() {
            return true;
        }
        self.last = bounds;
        if self.debounce.is_zero() {
            self.persist();
        } else {
            self.deadline = Some(now + self.debounce);
        }
        true
    }

    /// Save if the coalescing deadline has passed
    pub fn flush_due(&mut self, now: Instant) {
        if self.deadline.is_some_and(|deadline| now >= deadline) {
            self.flush();
        }
    }

    /// Save any pending bounds immediately
    pub fn flush(&mut self) {
        if self.deadline.take().is_some() {
            self.persist();
        }
    }

    fn persist(&mut self) {
        self.deadline = None;
        if let Err(e) = self.store.save(&self.last) {
            error!(path = %self.store.path().display(), error = ?e, "Failed to save window bounds");
        }
    }
}
