//! Content host: hands each source URL to an external embedder
//!
//! The overlay creates one child window per source; an XEmbed-capable
//! program (`surf -e {window} {url}`, `tabbed`-style clients) is spawned to
//! draw into it. Without an embedder, or when spawning fails, the region is
//! painted as a placeholder showing its URL.

use anyhow::{Context, Result};
use std::process::{Child, Command, Stdio};
use tracing::{error, info, warn};
use x11rb::protocol::xproto::Window;

const WINDOW_PLACEHOLDER: &str = "{window}";
const URL_PLACEHOLDER: &str = "{url}";

/// Argv template for the embedder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedCommand {
    argv: Vec<String>,
}

impl EmbedCommand {
    pub fn new(argv: &[String]) -> Option<Self> {
        if argv.is_empty() {
            return None;
        }
        if !argv.iter().any(|arg| arg.contains(WINDOW_PLACEHOLDER)) {
            warn!(command = ?argv, "embed_command has no {{window}} placeholder, content will open outside the overlay");
        }
        Some(Self { argv: argv.to_vec() })
    }

    /// Argv with `{window}` (decimal XID) and `{url}` substituted; the URL is
    /// passed through verbatim
    pub fn argv_for(&self, window: Window, url: &str) -> Vec<String> {
        let window = window.to_string();
        self.argv
            .iter()
            .map(|arg| arg.replace(WINDOW_PLACEHOLDER, &window).replace(URL_PLACEHOLDER, url))
            .collect()
    }

    fn spawn(&self, window: Window, url: &str) -> Result<Child> {
        let argv = self.argv_for(window, url);
        let (program, args) = argv.split_first().context("embed_command is empty")?;
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to spawn embedder '{}' for {}", program, url))
    }
}

/// How a region gets its content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionContent {
    Embedded,
    Placeholder,
}

/// Embedder processes owned by the overlay; killed on shutdown
#[derive(Debug, Default)]
pub struct ContentHost {
    command: Option<EmbedCommand>,
    children: Vec<(String, Child)>,
}

impl ContentHost {
    pub fn new(command: Option<EmbedCommand>) -> Self {
        Self {
            command,
            children: Vec::new(),
        }
    }

    /// Start loading `url` into `region`. Failures degrade to a placeholder.
    pub fn attach(&mut self, region: Window, url: &str) -> RegionContent {
        let Some(command) = &self.command else {
            return RegionContent::Placeholder;
        };
        if url.is_empty() {
            return RegionContent::Placeholder;
        }
        match command.spawn(region, url) {
            Ok(child) => {
                info!(url = %url, region = region, pid = child.id(), "Started embedder");
                self.children.push((url.to_string(), child));
                RegionContent::Embedded
            }
            Err(e) => {
                error!(url = %url, error = ?e, "Failed to start embedder, showing placeholder");
                RegionContent::Placeholder
            }
        }
    }

    /// Kill and reap every embedder. Safe to call more than once.
    pub fn shutdown(&mut self) {
        for (url, mut child) in self.children.drain(..) {
            match child.try_wait() {
                Ok(Some(status)) => info!(url = %url, status = %status, "Embedder already exited"),
                _ => {
                    if let Err(e) = child.kill() {
                        warn!(url = %url, error = %e, "Failed to kill embedder");
                    }
                    let _ = child.wait();
                }
            }
        }
    }
}

impl Drop for ContentHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}
