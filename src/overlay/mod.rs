//! Overlay runtime: X11 setup and the single event loop
//!
//! The loop multiplexes the X connection and the shutdown-signal pipe with
//! `poll`, sleeping no longer than the next pending bounds save.

mod dispatch;
mod event_handler;
mod signals;
mod window;

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use std::os::fd::AsFd;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use x11rb::connection::Connection;
use x11rb::rust_connection::RustConnection;

use crate::config::OverlayConfig;
use crate::constants::layout;
use crate::content::{ContentHost, EmbedCommand};
use crate::font::FontRenderer;
use crate::hotkeys::{self, Accelerator, HotkeyError, HotkeyRegistration, RootGrabber};
use crate::layout::compose;
use crate::persistence::{BoundsLoad, BoundsStore, BoundsTracker};
use crate::x11_utils::{AppContext, CachedAtoms};

use dispatch::{Flow, Overlay, OverlayEvent};
use event_handler::handle_event;
use signals::ShutdownSignals;
use window::OverlayWindow;

fn load_font(config: &OverlayConfig) -> Option<FontRenderer> {
    let size = layout::TITLE_TEXT_SIZE;
    let renderer = match &config.title_font {
        Some(family) => FontRenderer::from_font_name(family, size).or_else(|e| {
            warn!(font = %family, error = ?e, "Failed to load configured font, falling back to system default");
            FontRenderer::from_system_font(size)
        }),
        None => FontRenderer::from_system_font(size),
    };
    renderer
        .inspect_err(|e| warn!(error = ?e, "No usable font, header and placeholders are drawn without text"))
        .ok()
}

/// Parse and grab the accelerator. A failure is logged and the overlay keeps
/// running without a hotkey.
fn register_hotkey(conn: &RustConnection, grabber: &RootGrabber, text: &str) -> Option<HotkeyRegistration> {
    let registration = Accelerator::parse(text).and_then(|accelerator| {
        let keycodes = hotkeys::keycodes_for_keysym(conn, accelerator.keysym).map_err(|e| {
            HotkeyError::Connection {
                accelerator: accelerator.to_string(),
                reason: format!("{e:#}"),
            }
        })?;
        HotkeyRegistration::register(grabber, accelerator, keycodes)
    });
    registration
        .inspect_err(|e| error!(accelerator = %text, error = %e, "Global hotkey unavailable, toggling is disabled"))
        .ok()
}

/// Milliseconds to sleep in `poll`, rounded up so a pending save is never
/// woken for early
fn poll_timeout(remaining: Option<Duration>) -> PollTimeout {
    match remaining {
        Some(remaining) => {
            let millis = remaining.as_micros().div_ceil(1000);
            PollTimeout::from(u16::try_from(millis).unwrap_or(u16::MAX))
        }
        None => PollTimeout::NONE,
    }
}

fn event_loop(ctx: &AppContext, overlay: &mut Overlay<OverlayWindow<'_>>, signals: &mut ShutdownSignals) -> Result<()> {
    loop {
        ctx.conn.flush().context("Failed to flush X11 connection")?;
        if let Some(event) = ctx.conn.poll_for_event().context("Failed to poll for X11 event")? {
            match handle_event(ctx, overlay, event, Instant::now()) {
                Ok(Flow::Exit) => return Ok(()),
                Ok(Flow::Continue) => {}
                Err(e) => error!(error = ?e, "Event handling error"),
            }
            continue;
        }

        overlay.tick(Instant::now());

        let signalled = {
            let mut fds = [
                PollFd::new(ctx.conn.stream().as_fd(), PollFlags::POLLIN),
                PollFd::new(signals.as_fd(), PollFlags::POLLIN),
            ];
            match poll(&mut fds, poll_timeout(overlay.poll_timeout(Instant::now()))) {
                Ok(_) | Err(Errno::EINTR) => {}
                Err(e) => return Err(e).context("Failed to wait for events"),
            }
            fds[1].revents().is_some_and(|revents| revents.contains(PollFlags::POLLIN))
        };

        if signalled && signals.take_pending() && overlay.dispatch(OverlayEvent::Shutdown, Instant::now()) == Flow::Exit {
            return Ok(());
        }
    }
}

/// Create the overlay and run until the window is closed or the process is
/// asked to terminate. Pending bounds are flushed and the hotkey released on
/// every exit path past window creation.
pub fn run_overlay(config: &OverlayConfig, state_path: &Path) -> Result<()> {
    let (conn, screen_num) = x11rb::connect(None)
        .context("Failed to connect to X11 server. Is DISPLAY set correctly?")?;
    let screen = &conn.setup().roots[screen_num];
    info!(
        screen = screen_num,
        width = screen.width_in_pixels,
        height = screen.height_in_pixels,
        "Connected to X11 server"
    );

    let atoms = CachedAtoms::new(&conn).context("Failed to cache X11 atoms at startup")?;
    let ctx = AppContext {
        conn: &conn,
        screen,
        atoms: &atoms,
    };

    let store = BoundsStore::new(state_path);
    let loaded = store.load();
    if let BoundsLoad::Defaulted(bounds, reason) = &loaded {
        info!(path = %store.path().display(), reason = ?reason, bounds = ?bounds, "Using default window bounds");
    }
    let bounds = loaded.bounds();

    let composition = compose(&config.sources);
    let content = ContentHost::new(config.embed_argv().and_then(EmbedCommand::new));
    let surface = OverlayWindow::new(ctx, config, composition, bounds, load_font(config), content)
        .context("Failed to create overlay window")?;

    let grabber = RootGrabber {
        conn: &conn,
        root: screen.root,
    };
    let hotkey = register_hotkey(&conn, &grabber, &config.hotkey);
    let tracker = BoundsTracker::new(store, bounds, config.save_debounce());
    let mut overlay = Overlay::new(surface, tracker, hotkey);

    let result = ShutdownSignals::register().and_then(|mut signals| {
        info!(title = %config.title, sources = config.sources.len(), "Overlay running");
        event_loop(&ctx, &mut overlay, &mut signals)
    });

    overlay.shutdown(&grabber);
    if let Err(e) = conn.flush() {
        warn!(error = %e, "Failed to flush X11 connection during shutdown");
    }
    info!("Overlay stopped");
    result
}
