use anyhow::{Context, Result};
use tracing::debug;
use x11rb::connection::Connection;
use x11rb::protocol::xproto::*;
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as WrapperExt;

use crate::constants::x11;
use crate::persistence::{WindowBounds, WindowFlags};

/// Pre-cached X11 atoms to avoid repeated roundtrips
pub struct CachedAtoms {
    pub wm_protocols: Atom,
    pub wm_delete_window: Atom,
    pub wm_class: Atom,
    pub net_wm_name: Atom,
    pub utf8_string: Atom,
    pub net_wm_state: Atom,
    pub net_wm_state_above: Atom,
    pub net_wm_state_hidden: Atom,
    pub net_wm_state_maximized_vert: Atom,
    pub net_wm_state_maximized_horz: Atom,
    pub net_wm_window_opacity: Atom,
    pub net_wm_moveresize: Atom,
    pub motif_wm_hints: Atom,
}

fn intern(conn: &RustConnection, name: &str) -> Result<Atom> {
    Ok(conn
        .intern_atom(false, name.as_bytes())
        .context(format!("Failed to intern {name} atom"))?
        .reply()
        .context(format!("Failed to get reply for {name} atom"))?
        .atom)
}

impl CachedAtoms {
    pub fn new(conn: &RustConnection) -> Result<Self> {
        // Do all intern_atom roundtrips once at startup
        Ok(Self {
            wm_protocols: intern(conn, "WM_PROTOCOLS")?,
            wm_delete_window: intern(conn, "WM_DELETE_WINDOW")?,
            wm_class: intern(conn, "WM_CLASS")?,
            net_wm_name: intern(conn, "_NET_WM_NAME")?,
            utf8_string: intern(conn, "UTF8_STRING")?,
            net_wm_state: intern(conn, "_NET_WM_STATE")?,
            net_wm_state_above: intern(conn, "_NET_WM_STATE_ABOVE")?,
            net_wm_state_hidden: intern(conn, "_NET_WM_STATE_HIDDEN")?,
            net_wm_state_maximized_vert: intern(conn, "_NET_WM_STATE_MAXIMIZED_VERT")?,
            net_wm_state_maximized_horz: intern(conn, "_NET_WM_STATE_MAXIMIZED_HORZ")?,
            net_wm_window_opacity: intern(conn, "_NET_WM_WINDOW_OPACITY")?,
            net_wm_moveresize: intern(conn, "_NET_WM_MOVERESIZE")?,
            motif_wm_hints: intern(conn, "_MOTIF_WM_HINTS")?,
        })
    }
}

/// Connection, screen and atoms shared by the window controller and the event
/// translator
#[derive(Clone, Copy)]
pub struct AppContext<'a> {
    pub conn: &'a RustConnection,
    pub screen: &'a Screen,
    pub atoms: &'a CachedAtoms,
}

/// 32-bit TrueColor visual for a window with a transparent background
#[derive(Debug, Clone, Copy)]
pub struct ArgbVisual {
    pub visual: Visualid,
    pub depth: u8,
}

pub fn find_argb_visual(screen: &Screen) -> Result<ArgbVisual> {
    screen
        .allowed_depths
        .iter()
        .filter(|depth| depth.depth == x11::ARGB_DEPTH)
        .flat_map(|depth| depth.visuals.iter())
        .find(|visual| visual.class == VisualClass::TRUE_COLOR)
        .map(|visual| {
            debug!(visual = visual.visual_id, "using 32-bit TrueColor visual");
            ArgbVisual {
                visual: visual.visual_id,
                depth: x11::ARGB_DEPTH,
            }
        })
        .context("No 32-bit TrueColor visual available. A compositing-capable X server is required for transparency.")
}

/// Minimized/maximized flags from `_NET_WM_STATE`
pub fn read_window_flags(conn: &RustConnection, window: Window, atoms: &CachedAtoms) -> Result<WindowFlags> {
    let reply = conn
        .get_property(false, window, atoms.net_wm_state, AtomEnum::ATOM, 0, 1024)
        .context(format!("Failed to query _NET_WM_STATE for window {}", window))?
        .reply()
        .context(format!("Failed to get _NET_WM_STATE reply for window {}", window))?;
    let states: Vec<Atom> = reply.value32().map(|v| v.collect()).unwrap_or_default();
    Ok(flags_from_states(&states, atoms))
}

fn flags_from_states(states: &[Atom], atoms: &CachedAtoms) -> WindowFlags {
    WindowFlags {
        minimized: states.contains(&atoms.net_wm_state_hidden),
        maximized: states.contains(&atoms.net_wm_state_maximized_vert)
            && states.contains(&atoms.net_wm_state_maximized_horz),
    }
}

/// Window geometry with the position translated to root coordinates, so a
/// reparenting window manager's frame does not skew saved bounds
pub fn root_bounds(conn: &RustConnection, window: Window, root: Window) -> Result<WindowBounds> {
    let geom = conn
        .get_geometry(window)
        .context("Failed to send geometry query for overlay window")?
        .reply()
        .context(format!("Failed to get geometry for window {}", window))?;
    let origin = conn
        .translate_coordinates(window, root, 0, 0)
        .context("Failed to send translate_coordinates request")?
        .reply()
        .context(format!("Failed to translate coordinates for window {}", window))?;
    Ok(WindowBounds::new(
        origin.dst_x as i32,
        origin.dst_y as i32,
        geom.width as u32,
        geom.height as u32,
    ))
}

/// Ask the window manager for borderless decoration via `_MOTIF_WM_HINTS`
pub fn set_no_decorations(conn: &RustConnection, window: Window, atoms: &CachedAtoms) -> Result<()> {
    let mut hints = [0u32; x11::MOTIF_HINTS_LEN];
    hints[0] = x11::MOTIF_HINTS_DECORATIONS;
    conn.change_property32(
        PropMode::REPLACE,
        window,
        atoms.motif_wm_hints,
        atoms.motif_wm_hints,
        &hints,
    )
    .context(format!("Failed to set _MOTIF_WM_HINTS for window {}", window))?;
    Ok(())
}

/// Initial `_NET_WM_STATE` (set before the first map)
pub fn set_always_on_top(conn: &RustConnection, window: Window, atoms: &CachedAtoms) -> Result<()> {
    conn.change_property32(
        PropMode::REPLACE,
        window,
        atoms.net_wm_state,
        AtomEnum::ATOM,
        &[atoms.net_wm_state_above],
    )
    .context(format!("Failed to set window always-on-top for window {}", window))?;
    Ok(())
}

/// Re-assert `_NET_WM_STATE_ABOVE` on a mapped window (the WM owns the
/// property once mapped, so this goes through a client message)
pub fn request_always_on_top(conn: &RustConnection, screen: &Screen, atoms: &CachedAtoms, window: Window) -> Result<()> {
    let event = ClientMessageEvent {
        response_type: CLIENT_MESSAGE_EVENT,
        format: 32,
        sequence: 0,
        window,
        type_: atoms.net_wm_state,
        data: ClientMessageData::from([
            x11::NET_WM_STATE_ADD,
            atoms.net_wm_state_above,
            0,
            x11::SOURCE_APPLICATION,
            0,
        ]),
    };
    conn.send_event(
        false,
        screen.root,
        EventMask::SUBSTRUCTURE_NOTIFY | EventMask::SUBSTRUCTURE_REDIRECT,
        &event,
    )
    .context(format!("Failed to send _NET_WM_STATE_ABOVE request for window {}", window))?;
    Ok(())
}

pub fn set_opacity(conn: &RustConnection, window: Window, atoms: &CachedAtoms, opacity_percent: u8) -> Result<()> {
    conn.change_property32(
        PropMode::REPLACE,
        window,
        atoms.net_wm_window_opacity,
        AtomEnum::CARDINAL,
        &[opacity_to_cardinal(opacity_percent)],
    )
    .context(format!("Failed to set window opacity for window {}", window))?;
    Ok(())
}

/// Percent → `_NET_WM_WINDOW_OPACITY` (0 = transparent, u32::MAX = opaque)
fn opacity_to_cardinal(percent: u8) -> u32 {
    let percent = percent.min(100) as u64;
    (u32::MAX as u64 * percent / 100) as u32
}

/// Hand a pointer-driven move or edge resize to the window manager via
/// `_NET_WM_MOVERESIZE`. `direction` is 0-7 for edges, 8 for move.
pub fn begin_moveresize(
    conn: &RustConnection,
    screen: &Screen,
    atoms: &CachedAtoms,
    window: Window,
    root_x: i16,
    root_y: i16,
    direction: u32,
    button: u8,
) -> Result<()> {
    // The WM takes its own pointer grab; ours from the press must go first
    conn.ungrab_pointer(x11rb::CURRENT_TIME)
        .context("Failed to release pointer before move/resize")?;

    let event = ClientMessageEvent {
        response_type: CLIENT_MESSAGE_EVENT,
        format: 32,
        sequence: 0,
        window,
        type_: atoms.net_wm_moveresize,
        data: ClientMessageData::from([
            root_x as i32 as u32,
            root_y as i32 as u32,
            direction,
            button as u32,
            x11::SOURCE_APPLICATION,
        ]),
    };
    conn.send_event(
        false,
        screen.root,
        EventMask::SUBSTRUCTURE_NOTIFY | EventMask::SUBSTRUCTURE_REDIRECT,
        &event,
    )
    .context(format!("Failed to send _NET_WM_MOVERESIZE for window {}", window))?;
    conn.flush()
        .context("Failed to flush X11 connection after move/resize request")?;
    Ok(())
}

/// Convert premultiplied ARGB pixels to X11 Z-pixmap bytes (little-endian BGRA)
pub fn argb_to_bytes(pixels: &[u32]) -> Vec<u8> {
    let mut image_data = Vec::with_capacity(pixels.len() * 4);
    for pixel in pixels {
        image_data.push(*pixel as u8); // B
        image_data.push((pixel >> 8) as u8); // G
        image_data.push((pixel >> 16) as u8); // R
        image_data.push((pixel >> 24) as u8); // A
    }
    image_data
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atoms() -> CachedAtoms {
        CachedAtoms {
            wm_protocols: 1,
            wm_delete_window: 2,
            wm_class: 3,
            net_wm_name: 4,
            utf8_string: 5,
            net_wm_state: 6,
            net_wm_state_above: 7,
            net_wm_state_hidden: 8,
            net_wm_state_maximized_vert: 9,
            net_wm_state_maximized_horz: 10,
            net_wm_window_opacity: 11,
            net_wm_moveresize: 12,
            motif_wm_hints: 13,
        }
    }

    #[test]
    fn test_flags_from_states() {
        let atoms = atoms();
        assert_eq!(flags_from_states(&[], &atoms), WindowFlags::default());
        assert_eq!(
            flags_from_states(&[7, 8], &atoms),
            WindowFlags { minimized: true, maximized: false }
        );
        assert_eq!(
            flags_from_states(&[9, 10], &atoms),
            WindowFlags { minimized: false, maximized: true }
        );
        // half-maximized (one axis) is a user-sized window, not maximized
        assert_eq!(flags_from_states(&[9], &atoms), WindowFlags::default());
    }

    #[test]
    fn test_opacity_to_cardinal() {
        assert_eq!(opacity_to_cardinal(100), u32::MAX);
        assert_eq!(opacity_to_cardinal(0), 0);
        assert_eq!(opacity_to_cardinal(50), u32::MAX / 2);
    }

    #[test]
    fn test_argb_to_bytes_is_bgra() {
        assert_eq!(argb_to_bytes(&[0xAA_11_22_33]), vec![0x33, 0x22, 0x11, 0xAA]);
    }
}
