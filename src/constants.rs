//! Application-wide constants
//!
//! Magic numbers and string literals used throughout the overlay, kept in
//! one place so the layout, persistence and X11 code agree on them.

/// X11 protocol and rendering constants
pub mod x11 {
    /// ARGB color depth (32-bit: 8 bits each for Alpha, Red, Green, Blue)
    pub const ARGB_DEPTH: u8 = 32;

    /// Header strip background, premultiplied rgba(50, 50, 50, 0.8)
    pub const HEADER_BACKGROUND: u32 = 0xCC_28_28_28;

    /// Title text color (opaque white)
    pub const TITLE_COLOR: u32 = 0xFF_FF_FF_FF;

    /// Placeholder region background, premultiplied rgba(20, 20, 20, 0.6)
    pub const PLACEHOLDER_BACKGROUND: u32 = 0x99_0C_0C_0C;

    /// `_MOTIF_WM_HINTS` flag: the decorations field is valid
    pub const MOTIF_HINTS_DECORATIONS: u32 = 1 << 1;

    /// Number of 32-bit fields in `_MOTIF_WM_HINTS`
    pub const MOTIF_HINTS_LEN: usize = 5;

    /// `_NET_WM_STATE` client message action: add
    pub const NET_WM_STATE_ADD: u32 = 1;

    /// `_NET_WM_MOVERESIZE` direction for a keyboard-less move
    pub const MOVERESIZE_MOVE: u32 = 8;

    /// Source indication for EWMH client messages (1 = normal application)
    pub const SOURCE_APPLICATION: u32 = 1;
}

/// Mouse button constants
pub mod mouse {
    /// Left mouse button number
    pub const BUTTON_LEFT: u8 = 1;
}

/// Layout constants shared by the layout engine and the window controller
pub mod layout {
    /// Height of the drag-enabled header strip in pixels
    pub const HEADER_HEIGHT: u16 = 30;

    /// Width/height used when a source omits them or gives a bad value
    pub const DEFAULT_SOURCE_SIZE: u32 = 300;

    /// Left padding of the header title text
    pub const TITLE_PADDING_LEFT: i32 = 10;

    /// Width of the invisible resize border along the window edges
    pub const RESIZE_BORDER: i16 = 6;

    /// Title text size in pixels
    pub const TITLE_TEXT_SIZE: f32 = 14.0;
}

/// Window bounds persistence defaults
pub mod bounds {
    /// Width used when no persisted record exists
    pub const DEFAULT_WIDTH: u32 = 1920;

    /// Height used when no persisted record exists
    pub const DEFAULT_HEIGHT: u32 = 1080;

    /// Coalescing window for bounds saves during a drag
    pub const DEFAULT_SAVE_DEBOUNCE_MS: u64 = 250;
}

/// Hotkey defaults
pub mod hotkey {
    /// Accelerator that cycles Framed → Frameless → Hidden
    pub const DEFAULT_ACCELERATOR: &str = "Control+Shift+M";
}

/// Configuration file locations
pub mod config {
    /// Directory under the XDG config dir
    pub const APP_DIR: &str = "web-overlay";

    /// Configuration document filename
    pub const FILENAME: &str = "config.json";

    /// Persisted window bounds filename (stored beside the config)
    pub const STATE_FILENAME: &str = "window-state.json";

    /// Title painted in the header strip when none is configured
    pub const DEFAULT_TITLE: &str = "Overlay";

    /// WM_CLASS instance and class name
    pub const WM_CLASS: &[u8] = b"web-overlay\0web-overlay\0";
}

/// Validation bounds for configuration values
pub mod validation {
    /// Maximum opacity percentage
    pub const MAX_OPACITY_PERCENT: u8 = 100;

    /// Maximum debounce window for bounds saves (10 seconds)
    pub const MAX_SAVE_DEBOUNCE_MS: u64 = 10_000;
}
