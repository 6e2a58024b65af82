use anyhow::{Context, Result};
use std::time::Instant;
use tracing::{debug, warn};
use x11rb::protocol::Event::{self, ButtonPress, ClientMessage, ConfigureNotify, Error, Expose, KeyPress, PropertyNotify};

use crate::constants::mouse;
use crate::x11_utils::{self, AppContext};

use super::dispatch::{Flow, Overlay, OverlayEvent};
use super::window::{GeometryChange, OverlayWindow};

/// Translate one X event into overlay events. Pure painting and drag
/// requests are handled here directly; everything that touches toggle or
/// bounds state goes through [`Overlay::dispatch`].
pub fn handle_event(
    ctx: &AppContext,
    overlay: &mut Overlay<OverlayWindow<'_>>,
    event: Event,
    now: Instant,
) -> Result<Flow> {
    let window = overlay.surface().window;
    match event {
        KeyPress(event) => {
            let fired = overlay
                .hotkey()
                .is_some_and(|hotkey| hotkey.matches(event.detail, u16::from(event.state)));
            if fired {
                return Ok(overlay.dispatch(OverlayEvent::HotkeyFired, now));
            }
        }
        ConfigureNotify(event) if event.window == window => {
            let flags = x11_utils::read_window_flags(ctx.conn, window, ctx.atoms)
                .context("Failed to read window state after configure")?;
            overlay.dispatch(OverlayEvent::WindowStateChanged(flags), now);

            let bounds = x11_utils::root_bounds(ctx.conn, window, ctx.screen.root)
                .context("Failed to read overlay geometry after configure")?;
            let change = overlay.surface_mut().observe_geometry(bounds)?;
            let flow = match change {
                GeometryChange::Moved => overlay.dispatch(OverlayEvent::WindowMoved(bounds), now),
                GeometryChange::Resized => overlay.dispatch(OverlayEvent::WindowResized(bounds), now),
                GeometryChange::Unchanged => Flow::Continue,
            };
            let last = overlay.last_bounds();
            overlay.surface_mut().set_restore_bounds(last);
            return Ok(flow);
        }
        PropertyNotify(event) if event.window == window && event.atom == ctx.atoms.net_wm_state => {
            let flags = x11_utils::read_window_flags(ctx.conn, window, ctx.atoms)
                .context("Failed to read window state after property change")?;
            return Ok(overlay.dispatch(OverlayEvent::WindowStateChanged(flags), now));
        }
        ClientMessage(event)
            if event.window == window
                && event.type_ == ctx.atoms.wm_protocols
                && event.data.as_data32()[0] == ctx.atoms.wm_delete_window =>
        {
            debug!(window = window, "WM_DELETE_WINDOW received");
            return Ok(overlay.dispatch(OverlayEvent::Shutdown, now));
        }
        Expose(event) if event.count == 0 => {
            overlay.surface().paint(event.window)?;
        }
        ButtonPress(event) if event.event == window && event.detail == mouse::BUTTON_LEFT => {
            overlay.surface().begin_drag(&event)?;
        }
        Error(e) => {
            warn!(error = ?e, "X11 error");
        }
        _ => {}
    }
    Ok(Flow::Continue)
}
