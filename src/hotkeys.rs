//! Global hotkey: accelerator parsing and X11 key grabs on the root window
//!
//! A grab on the root window delivers the key press to us regardless of which
//! client has focus. The X server answers `BadAccess` when another client
//! already holds the same grab, which is surfaced as
//! [`HotkeyError::AlreadyClaimed`] instead of being ignored.

use anyhow::{Context, Result};
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, warn};
use x11rb::connection::Connection;
use x11rb::errors::ReplyError;
use x11rb::protocol::ErrorKind;
use x11rb::protocol::xproto::{ConnectionExt as _, GrabMode, Keycode, Keysym, ModMask, Window};
use x11rb::rust_connection::RustConnection;

#[derive(Debug, Error)]
pub enum HotkeyError {
    #[error("invalid accelerator '{accelerator}': {reason}")]
    Parse { accelerator: String, reason: String },
    #[error("hotkey {accelerator} is already claimed by another client")]
    AlreadyClaimed { accelerator: String },
    #[error("no keycode on this keyboard produces the key in {accelerator}")]
    NoKeycode { accelerator: String },
    #[error("failed to grab {accelerator}: {reason}")]
    Connection { accelerator: String, reason: String },
}

/// Modifiers a user can put in an accelerator
const ACCELERATOR_MODIFIERS: u16 = 0x0001 | 0x0004 | 0x0008 | 0x0040; // Shift | Control | Mod1 | Mod4

/// CapsLock / NumLock combinations grabbed alongside the accelerator
fn lock_variants() -> [ModMask; 4] {
    [
        ModMask::from(0u16),
        ModMask::LOCK,
        ModMask::M2,
        ModMask::LOCK | ModMask::M2,
    ]
}

/// Parsed `Control+Shift+M` style shortcut
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accelerator {
    pub modifiers: ModMask,
    pub keysym: Keysym,
}

impl Accelerator {
    pub fn parse(text: &str) -> Result<Self, HotkeyError> {
        let fail = |reason: String| HotkeyError::Parse {
            accelerator: text.to_string(),
            reason,
        };

        let mut modifiers = ModMask::from(0u16);
        let mut keysym = None;

        for token in text.split('+').map(str::trim) {
            if token.is_empty() {
                return Err(fail("empty key name".to_string()));
            }
            if let Some(modifier) = modifier_for(token) {
                modifiers = modifiers | modifier;
                continue;
            }
            let sym = keysym_for(token).ok_or_else(|| fail(format!("unknown key '{token}'")))?;
            if keysym.replace(sym).is_some() {
                return Err(fail("more than one non-modifier key".to_string()));
            }
        }

        let keysym = keysym.ok_or_else(|| fail("no key after modifiers".to_string()))?;
        Ok(Self { modifiers, keysym })
    }
}

impl fmt::Display for Accelerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bits = u16::from(self.modifiers);
        for (mask, name) in [
            (ModMask::CONTROL, "Control"),
            (ModMask::SHIFT, "Shift"),
            (ModMask::M1, "Alt"),
            (ModMask::M4, "Super"),
        ] {
            if bits & u16::from(mask) != 0 {
                write!(f, "{name}+")?;
            }
        }
        match self.keysym {
            sym @ 0x21..=0x7e => write!(f, "{}", (sym as u8 as char).to_ascii_uppercase()),
            sym => write!(f, "0x{sym:x}"),
        }
    }
}

fn modifier_for(token: &str) -> Option<ModMask> {
    match token.to_ascii_lowercase().as_str() {
        "control" | "ctrl" | "commandorcontrol" | "cmdorctrl" => Some(ModMask::CONTROL),
        "shift" => Some(ModMask::SHIFT),
        "alt" | "option" => Some(ModMask::M1),
        "super" | "meta" | "cmd" | "command" => Some(ModMask::M4),
        _ => None,
    }
}

fn keysym_for(token: &str) -> Option<Keysym> {
    let lower = token.to_ascii_lowercase();
    let mut chars = lower.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        return (c.is_ascii_alphanumeric()).then_some(c as Keysym);
    }
    match lower.as_str() {
        "space" => Some(0x0020),
        "tab" => Some(0xff09),
        "escape" | "esc" => Some(0xff1b),
        "return" | "enter" => Some(0xff0d),
        _ => {
            let n: u32 = lower.strip_prefix('f')?.parse().ok()?;
            (1..=24).contains(&n).then(|| 0xffbe + n - 1)
        }
    }
}

/// One passive grab: a keycode plus an exact modifier set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyGrab {
    pub keycode: Keycode,
    pub modifiers: ModMask,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrabFailure {
    Claimed,
    Other(String),
}

/// Establishes and releases passive key grabs
pub trait KeyGrabber {
    fn grab(&self, grab: KeyGrab) -> Result<(), GrabFailure>;
    fn ungrab(&self, grab: KeyGrab) -> Result<(), GrabFailure>;
}

/// Grabs on the X11 root window
pub struct RootGrabber<'a> {
    pub conn: &'a RustConnection,
    pub root: Window,
}

impl KeyGrabber for RootGrabber<'_> {
    fn grab(&self, grab: KeyGrab) -> Result<(), GrabFailure> {
        let cookie = self
            .conn
            .grab_key(true, self.root, grab.modifiers, grab.keycode, GrabMode::ASYNC, GrabMode::ASYNC)
            .map_err(|e| GrabFailure::Other(e.to_string()))?;
        match cookie.check() {
            Ok(()) => Ok(()),
            Err(ReplyError::X11Error(e)) if e.error_kind == ErrorKind::Access => Err(GrabFailure::Claimed),
            Err(e) => Err(GrabFailure::Other(e.to_string())),
        }
    }

    fn ungrab(&self, grab: KeyGrab) -> Result<(), GrabFailure> {
        self.conn
            .ungrab_key(grab.keycode, self.root, grab.modifiers)
            .map_err(|e| GrabFailure::Other(e.to_string()))?
            .check()
            .map_err(|e| GrabFailure::Other(e.to_string()))
    }
}

/// Keycodes whose unshifted or shifted keysym is `keysym`
pub fn keycodes_for_keysym(conn: &RustConnection, keysym: Keysym) -> Result<Vec<Keycode>> {
    let setup = conn.setup();
    let (min, max) = (setup.min_keycode, setup.max_keycode);
    let mapping = conn
        .get_keyboard_mapping(min, max - min + 1)
        .context("Failed to request keyboard mapping")?
        .reply()
        .context("Failed to get keyboard mapping reply")?;
    Ok(keycodes_in_mapping(min, mapping.keysyms_per_keycode, &mapping.keysyms, keysym))
}

fn keycodes_in_mapping(min: Keycode, per_keycode: u8, keysyms: &[Keysym], keysym: Keysym) -> Vec<Keycode> {
    if per_keycode == 0 {
        return Vec::new();
    }
    keysyms
        .chunks(per_keycode as usize)
        .enumerate()
        .filter(|(_, syms)| syms.iter().take(2).any(|&sym| sym == keysym))
        .filter_map(|(index, _)| Keycode::try_from(min as usize + index).ok())
        .collect()
}

/// Live grabs for one accelerator
#[derive(Debug)]
pub struct HotkeyRegistration {
    accelerator: Accelerator,
    keycodes: Vec<Keycode>,
    grabs: Vec<KeyGrab>,
}

impl HotkeyRegistration {
    /// Grab every keycode/lock combination for `accelerator`. On failure
    /// the grabs made so far are released again.
    pub fn register(
        grabber: &impl KeyGrabber,
        accelerator: Accelerator,
        keycodes: Vec<Keycode>,
    ) -> Result<Self, HotkeyError> {
        if keycodes.is_empty() {
            return Err(HotkeyError::NoKeycode {
                accelerator: accelerator.to_string(),
            });
        }

        let mut registration = Self {
            accelerator,
            keycodes: Vec::new(),
            grabs: Vec::new(),
        };

        for &keycode in &keycodes {
            for lock in lock_variants() {
                let grab = KeyGrab {
                    keycode,
                    modifiers: accelerator.modifiers | lock,
                };
                if let Err(failure) = grabber.grab(grab) {
                    registration.unregister_all(grabber);
                    return Err(match failure {
                        GrabFailure::Claimed => HotkeyError::AlreadyClaimed {
                            accelerator: accelerator.to_string(),
                        },
                        GrabFailure::Other(reason) => HotkeyError::Connection {
                            accelerator: accelerator.to_string(),
                            reason,
                        },
                    });
                }
                registration.grabs.push(grab);
            }
        }

        info!(accelerator = %accelerator, keycodes = ?keycodes, grabs = registration.grabs.len(), "Registered global hotkey");
        registration.keycodes = keycodes;
        Ok(registration)
    }

    pub fn is_registered(&self) -> bool {
        !self.grabs.is_empty()
    }

    /// Whether a key press (keycode + event state) is this hotkey
    pub fn matches(&self, keycode: Keycode, state: u16) -> bool {
        self.is_registered()
            && self.keycodes.contains(&keycode)
            && state & ACCELERATOR_MODIFIERS == u16::from(self.accelerator.modifiers)
    }

    /// Release every grab. Safe to call repeatedly.
    pub fn unregister_all(&mut self, grabber: &impl KeyGrabber) {
        if self.grabs.is_empty() {
            return;
        }
        for grab in self.grabs.drain(..) {
            if let Err(e) = grabber.ungrab(grab) {
                warn!(keycode = grab.keycode, error = ?e, "Failed to release key grab");
            }
        }
        debug!(accelerator = %self.accelerator, "Released global hotkey");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct FakeGrabber {
        claimed: Vec<Keycode>,
        held: RefCell<Vec<KeyGrab>>,
        ungrabs: RefCell<usize>,
    }

    impl KeyGrabber for FakeGrabber {
        fn grab(&self, grab: KeyGrab) -> Result<(), GrabFailure> {
            if self.claimed.contains(&grab.keycode) {
                return Err(GrabFailure::Claimed);
            }
            self.held.borrow_mut().push(grab);
            Ok(())
        }

        fn ungrab(&self, grab: KeyGrab) -> Result<(), GrabFailure> {
            *self.ungrabs.borrow_mut() += 1;
            self.held.borrow_mut().retain(|held| *held != grab);
            Ok(())
        }
    }

    fn ctrl_shift_m() -> Accelerator {
        Accelerator::parse("Control+Shift+M").unwrap()
    }

    #[test]
    fn test_parse_default_accelerator() {
        let accelerator = ctrl_shift_m();
        assert_eq!(accelerator.modifiers, ModMask::CONTROL | ModMask::SHIFT);
        assert_eq!(accelerator.keysym, 0x6d);
        assert_eq!(accelerator.to_string(), "Control+Shift+M");
    }

    #[test]
    fn test_parse_aliases_and_case() {
        let accelerator = Accelerator::parse("ctrl + alt + f5").unwrap();
        assert_eq!(accelerator.modifiers, ModMask::CONTROL | ModMask::M1);
        assert_eq!(accelerator.keysym, 0xffc2);

        let accelerator = Accelerator::parse("CmdOrCtrl+Space").unwrap();
        assert_eq!(accelerator.modifiers, ModMask::CONTROL);
        assert_eq!(accelerator.keysym, 0x20);
    }

    #[test]
    fn test_parse_errors() {
        for bad in ["", "Control+", "Control+Shift", "Control+M+N", "Hyper+M", "Control+F25"] {
            assert!(
                matches!(Accelerator::parse(bad), Err(HotkeyError::Parse { .. })),
                "expected parse error for {bad:?}"
            );
        }
    }

    #[test]
    fn test_keycodes_in_mapping() {
        // keycodes 8..=10, two keysyms each; 'm' lives on keycode 9
        let keysyms = [0x61, 0x41, 0x6d, 0x4d, 0x20, 0x0];
        assert_eq!(keycodes_in_mapping(8, 2, &keysyms, 0x6d), vec![9]);
        assert!(keycodes_in_mapping(8, 2, &keysyms, 0x7a).is_empty());
        assert!(keycodes_in_mapping(8, 0, &keysyms, 0x6d).is_empty());
    }

    #[test]
    fn test_register_grabs_lock_variants() {
        let grabber = FakeGrabber::default();
        let registration = HotkeyRegistration::register(&grabber, ctrl_shift_m(), vec![58]).unwrap();
        assert!(registration.is_registered());
        assert_eq!(grabber.held.borrow().len(), 4);
    }

    #[test]
    fn test_register_already_claimed_fails_loudly() {
        let grabber = FakeGrabber {
            claimed: vec![59],
            ..Default::default()
        };
        let err = HotkeyRegistration::register(&grabber, ctrl_shift_m(), vec![58, 59]).unwrap_err();
        assert!(matches!(err, HotkeyError::AlreadyClaimed { .. }));
        assert!(err.to_string().contains("Control+Shift+M"));
        // grabs made before the conflict are released again
        assert!(grabber.held.borrow().is_empty());
    }

    #[test]
    fn test_register_without_keycode() {
        let grabber = FakeGrabber::default();
        let err = HotkeyRegistration::register(&grabber, ctrl_shift_m(), Vec::new()).unwrap_err();
        assert!(matches!(err, HotkeyError::NoKeycode { .. }));
    }

    #[test]
    fn test_matches_ignores_lock_modifiers() {
        let grabber = FakeGrabber::default();
        let registration = HotkeyRegistration::register(&grabber, ctrl_shift_m(), vec![58]).unwrap();
        let ctrl_shift = u16::from(ModMask::CONTROL | ModMask::SHIFT);
        assert!(registration.matches(58, ctrl_shift));
        assert!(registration.matches(58, ctrl_shift | u16::from(ModMask::LOCK | ModMask::M2)));
        assert!(!registration.matches(58, u16::from(ModMask::CONTROL)));
        assert!(!registration.matches(57, ctrl_shift));
    }

    #[test]
    fn test_unregister_twice_is_noop() {
        let grabber = FakeGrabber::default();
        let mut registration = HotkeyRegistration::register(&grabber, ctrl_shift_m(), vec![58]).unwrap();
        registration.unregister_all(&grabber);
        assert!(grabber.held.borrow().is_empty());
        assert_eq!(*grabber.ungrabs.borrow(), 4);

        registration.unregister_all(&grabber);
        assert_eq!(*grabber.ungrabs.borrow(), 4);
        assert!(!registration.is_registered());
        assert!(!registration.matches(58, u16::from(ModMask::CONTROL | ModMask::SHIFT)));
    }
}
