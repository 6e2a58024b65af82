//! Typed overlay events and the single handler that owns overlay state
//!
//! Every state change (hotkey, move, resize, WM state, shutdown) arrives here
//! as an [`OverlayEvent`] from one event loop, so toggle transitions and
//! bounds writes never run concurrently.

use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::hotkeys::{HotkeyRegistration, KeyGrabber};
use crate::persistence::{BoundsTracker, WindowBounds, WindowFlags};
use crate::toggle::{OverlaySurface, ToggleMachine, ToggleState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayEvent {
    HotkeyFired,
    WindowMoved(WindowBounds),
    WindowResized(WindowBounds),
    WindowStateChanged(WindowFlags),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

/// Process-wide overlay context: the window surface, the toggle state, the
/// bounds tracker and the hotkey grab
pub struct Overlay<S> {
    surface: S,
    toggle: ToggleMachine,
    bounds: BoundsTracker,
    hotkey: Option<HotkeyRegistration>,
}

impl<S: OverlaySurface> Overlay<S> {
    pub fn new(surface: S, bounds: BoundsTracker, hotkey: Option<HotkeyRegistration>) -> Self {
        Self {
            surface,
            toggle: ToggleMachine::new(),
            bounds,
            hotkey,
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    #[cfg(test)]
    pub fn toggle_state(&self) -> ToggleState {
        self.toggle.state()
    }

    pub fn hotkey(&self) -> Option<&HotkeyRegistration> {
        self.hotkey.as_ref()
    }

    pub fn last_bounds(&self) -> WindowBounds {
        self.bounds.last()
    }

    pub fn dispatch(&mut self, event: OverlayEvent, now: Instant) -> Flow {
        match event {
            OverlayEvent::HotkeyFired => {
                self.toggle.trigger(&mut self.surface);
            }
            OverlayEvent::WindowMoved(bounds) | OverlayEvent::WindowResized(bounds) => {
                if self.toggle.state() == ToggleState::Hidden {
                    debug!(?bounds, "Ignoring bounds change while hidden");
                } else {
                    self.bounds.record(bounds, now);
                }
            }
            OverlayEvent::WindowStateChanged(flags) => {
                self.bounds.set_flags(flags);
            }
            OverlayEvent::Shutdown => {
                info!("Shutdown requested");
                return Flow::Exit;
            }
        }
        Flow::Continue
    }

    /// How long the event loop may sleep before a pending save is due
    pub fn poll_timeout(&self, now: Instant) -> Option<Duration> {
        self.bounds
            .deadline()
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    /// Called by the loop after waking; writes coalesced bounds when due
    pub fn tick(&mut self, now: Instant) {
        self.bounds.flush_due(now);
    }

    /// Flush pending bounds and release the global hotkey. Idempotent, and
    /// safe when the hotkey was never registered.
    pub fn shutdown(&mut self, grabber: &impl KeyGrabber) {
        self.bounds.flush();
        if let Some(mut registration) = self.hotkey.take() {
            registration.unregister_all(grabber);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkeys::{Accelerator, GrabFailure, KeyGrab};
    use crate::persistence::{BoundsLoad, BoundsStore};
    use crate::toggle::tests::FakeSurface;
    use std::cell::Cell;
    use std::fs;
    use std::path::PathBuf;

    #[derive(Default)]
    struct CountingGrabber {
        grabs: Cell<usize>,
        ungrabs: Cell<usize>,
    }

    impl KeyGrabber for CountingGrabber {
        fn grab(&self, _grab: KeyGrab) -> Result<(), GrabFailure> {
            self.grabs.set(self.grabs.get() + 1);
            Ok(())
        }

        fn ungrab(&self, _grab: KeyGrab) -> Result<(), GrabFailure> {
            self.ungrabs.set(self.ungrabs.get() + 1);
            Ok(())
        }
    }

    fn unique_store(name: &str) -> (BoundsStore, PathBuf) {
        let unique = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("web_overlay_dispatch_{name}_{}_{unique}", std::process::id()));
        (BoundsStore::new(dir.join("window-state.json")), dir)
    }

    fn overlay(store: BoundsStore, initial: WindowBounds, debounce: Duration) -> Overlay<FakeSurface> {
        Overlay::new(
            FakeSurface::default(),
            BoundsTracker::new(store, initial, debounce),
            None,
        )
    }

    #[test]
    fn test_hotkey_events_drive_toggle() {
        let (store, dir) = unique_store("toggle");
        let mut overlay = overlay(store, WindowBounds::default(), Duration::ZERO);
        let now = Instant::now();

        assert_eq!(overlay.dispatch(OverlayEvent::HotkeyFired, now), Flow::Continue);
        assert_eq!(overlay.toggle_state(), ToggleState::Frameless);
        assert!(overlay.surface().window_visible);
        assert!(!overlay.surface().header_visible);

        overlay.dispatch(OverlayEvent::HotkeyFired, now);
        assert_eq!(overlay.toggle_state(), ToggleState::Hidden);
        assert!(!overlay.surface().window_visible);

        overlay.dispatch(OverlayEvent::HotkeyFired, now);
        assert_eq!(overlay.toggle_state(), ToggleState::Framed);
        assert!(overlay.surface().window_visible);
        assert!(overlay.surface().header_visible);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_move_and_resize_persist() {
        let (store, dir) = unique_store("persist");
        let mut overlay = overlay(store.clone(), WindowBounds::default(), Duration::ZERO);
        let now = Instant::now();

        let moved = WindowBounds::new(50, 60, 1920, 1080);
        overlay.dispatch(OverlayEvent::WindowMoved(moved), now);
        assert_eq!(store.load(), BoundsLoad::Loaded(moved));

        let resized = WindowBounds::new(50, 60, 1024, 768);
        overlay.dispatch(OverlayEvent::WindowResized(resized), now);
        assert_eq!(store.load(), BoundsLoad::Loaded(resized));
        assert_eq!(overlay.last_bounds(), resized);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_minimize_restore_cycle_keeps_b0() {
        let (store, dir) = unique_store("minimize");
        let b0 = WindowBounds::new(200, 150, 900, 700);
        store.save(&b0).unwrap();
        let mut overlay = overlay(store.clone(), b0, Duration::ZERO);
        let now = Instant::now();

        overlay.dispatch(OverlayEvent::WindowStateChanged(WindowFlags { minimized: true, maximized: false }), now);
        overlay.dispatch(OverlayEvent::WindowMoved(WindowBounds::new(0, 0, 900, 700)), now);
        overlay.dispatch(OverlayEvent::WindowStateChanged(WindowFlags::default()), now);
        assert_eq!(store.load(), BoundsLoad::Loaded(b0));

        // a legitimate resize after restore is persisted
        let resized = WindowBounds::new(200, 150, 640, 480);
        overlay.dispatch(OverlayEvent::WindowResized(resized), now);
        assert_eq!(store.load(), BoundsLoad::Loaded(resized));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_maximized_resize_not_persisted() {
        let (store, dir) = unique_store("maximize");
        let b0 = WindowBounds::new(10, 10, 800, 600);
        store.save(&b0).unwrap();
        let mut overlay = overlay(store.clone(), b0, Duration::ZERO);
        let now = Instant::now();

        overlay.dispatch(OverlayEvent::WindowStateChanged(WindowFlags { minimized: false, maximized: true }), now);
        overlay.dispatch(OverlayEvent::WindowResized(WindowBounds::new(0, 0, 2560, 1440)), now);
        assert_eq!(store.load(), BoundsLoad::Loaded(b0));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_poll_timeout_tracks_pending_save() {
        let (store, dir) = unique_store("timeout");
        let mut overlay = overlay(store.clone(), WindowBounds::default(), Duration::from_millis(250));
        let start = Instant::now();
        assert_eq!(overlay.poll_timeout(start), None);

        let moved = WindowBounds::new(1, 2, 300, 300);
        overlay.dispatch(OverlayEvent::WindowMoved(moved), start);
        assert_eq!(overlay.poll_timeout(start), Some(Duration::from_millis(250)));
        assert_eq!(overlay.poll_timeout(start + Duration::from_secs(1)), Some(Duration::ZERO));

        overlay.tick(start + Duration::from_millis(300));
        assert_eq!(store.load(), BoundsLoad::Loaded(moved));
        assert_eq!(overlay.poll_timeout(start), None);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_shutdown_flushes_pending_bounds() {
        let (store, dir) = unique_store("shutdown_flush");
        let mut overlay = overlay(store.clone(), WindowBounds::default(), Duration::from_secs(5));
        let moved = WindowBounds::new(7, 8, 640, 480);
        overlay.dispatch(OverlayEvent::WindowMoved(moved), Instant::now());
        assert_eq!(overlay.dispatch(OverlayEvent::Shutdown, Instant::now()), Flow::Exit);

        overlay.shutdown(&CountingGrabber::default());
        assert_eq!(store.load(), BoundsLoad::Loaded(moved));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_shutdown_without_hotkey_is_noop() {
        let (store, dir) = unique_store("no_hotkey");
        let mut overlay = overlay(store, WindowBounds::default(), Duration::ZERO);
        let grabber = CountingGrabber::default();
        overlay.shutdown(&grabber);
        overlay.shutdown(&grabber);
        assert_eq!(grabber.ungrabs.get(), 0);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn test_shutdown_releases_hotkey_once() {
        let (store, dir) = unique_store("release");
        let grabber = CountingGrabber::default();
        let accelerator = Accelerator::parse("Control+Shift+M").unwrap();
        let registration = HotkeyRegistration::register(&grabber, accelerator, vec![58]).unwrap();
        let mut overlay = Overlay::new(
            FakeSurface::default(),
            BoundsTracker::new(store, WindowBounds::default(), Duration::ZERO),
            Some(registration),
        );
        assert!(overlay.hotkey().is_some());

        overlay.shutdown(&grabber);
        overlay.shutdown(&grabber);
        assert_eq!(grabber.ungrabs.get(), grabber.grabs.get());
        assert!(overlay.hotkey().is_none());
        let _ = fs::remove_dir_all(dir);
    }
}
