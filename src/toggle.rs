//! Three-state presentation cycle driven by the global hotkey
//!
//! Framed → Frameless → Hidden → Framed → ...

use anyhow::Result;
use tracing::{error, info};

/// Presentation state of the overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ToggleState {
    /// Window visible with the header strip
    #[default]
    Framed,
    /// Window visible, header strip hidden
    Frameless,
    /// Window hidden
    Hidden,
}

/// Side effect of a transition, applied in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    SetHeaderVisible(bool),
    SetWindowVisible(bool),
}

const HIDE_HEADER: &[Effect] = &[Effect::SetHeaderVisible(false)];
const HIDE_WINDOW: &[Effect] = &[Effect::SetWindowVisible(false)];
const SHOW_ALL: &[Effect] = &[Effect::SetWindowVisible(true), Effect::SetHeaderVisible(true)];

impl ToggleState {
    /// Next state and the effects that get there
    pub fn transition(self) -> (ToggleState, &'static [Effect]) {
        match self {
            ToggleState::Framed => (ToggleState::Frameless, HIDE_HEADER),
            ToggleState::Frameless => (ToggleState::Hidden, HIDE_WINDOW),
            ToggleState::Hidden => (ToggleState::Framed, SHOW_ALL),
        }
    }

    #[cfg(test)]
    pub fn next(self) -> ToggleState {
        self.transition().0
    }
}

/// Effects the toggle machine drives on the overlay window
pub trait OverlaySurface {
    /// Show/hide the header strip without destroying the window
    fn set_header_visible(&mut self, visible: bool) -> Result<()>;

    /// Show/hide the whole window, keeping its bounds for the next show
    fn set_window_visible(&mut self, visible: bool) -> Result<()>;
}

/// Owns the process-wide [`ToggleState`]. The state can only move through
/// [`ToggleMachine::trigger`].
#[derive(Debug, Default)]
pub struct ToggleMachine {
    state: ToggleState,
}

impl ToggleMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ToggleState {
        self.state
    }

    /// Apply the current state's transition. If an effect fails the state
    /// stays put, so the next trigger retries the same transition.
    pub fn trigger(&mut self, surface: &mut impl OverlaySurface) -> ToggleState {
        let (next, effects) = self.state.transition();
        for effect in effects {
            let applied = match *effect {
                Effect::SetHeaderVisible(visible) => surface.set_header_visible(visible),
                Effect::SetWindowVisible(visible) => surface.set_window_visible(visible),
            };
            if let Err(e) = applied {
                error!(from = ?self.state, to = ?next, effect = ?effect, error = ?e, "Toggle transition failed");
                return self.state;
            }
        }
        info!(from = ?self.state, to = ?next, "Toggled overlay");
        self.state = next;
        next
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Records visibility like a real window would
    #[derive(Debug)]
    pub(crate) struct FakeSurface {
        pub window_visible: bool,
        pub header_visible: bool,
        pub calls: Vec<Effect>,
        pub fail_next: bool,
    }

    impl Default for FakeSurface {
        fn default() -> Self {
            Self {
                window_visible: true,
                header_visible: true,
                calls: Vec::new(),
                fail_next: false,
            }
        }
    }

    impl OverlaySurface for FakeSurface {
        fn set_header_visible(&mut self, visible: bool) -> Result<()> {
            if std::mem::take(&mut self.fail_next) {
                anyhow::bail!("header unavailable");
            }
            self.calls.push(Effect::SetHeaderVisible(visible));
            self.header_visible = visible;
            Ok(())
        }

        fn set_window_visible(&mut self, visible: bool) -> Result<()> {
            if std::mem::take(&mut self.fail_next) {
                anyhow::bail!("window unavailable");
            }
            self.calls.push(Effect::SetWindowVisible(visible));
            self.window_visible = visible;
            Ok(())
        }
    }

    #[test]
    fn test_initial_state_is_framed() {
        assert_eq!(ToggleMachine::new().state(), ToggleState::Framed);
    }

    #[test]
    fn test_cycle_order() {
        assert_eq!(ToggleState::Framed.next(), ToggleState::Frameless);
        assert_eq!(ToggleState::Frameless.next(), ToggleState::Hidden);
        assert_eq!(ToggleState::Hidden.next(), ToggleState::Framed);
    }

    #[test]
    fn test_multiples_of_three_return_to_framed() {
        for k in 0..5 {
            let mut machine = ToggleMachine::new();
            let mut surface = FakeSurface::default();
            for _ in 0..3 * k {
                machine.trigger(&mut surface);
            }
            assert_eq!(machine.state(), ToggleState::Framed, "k = {k}");
        }
    }

    #[test]
    fn test_five_triggers_end_frameless() {
        let mut machine = ToggleMachine::new();
        let mut surface = FakeSurface::default();
        for _ in 0..5 {
            machine.trigger(&mut surface);
        }
        assert_eq!(machine.state(), ToggleState::Frameless);
        assert!(surface.window_visible);
        assert!(!surface.header_visible);
    }

    #[test]
    fn test_framed_to_frameless_hides_header_only() {
        let mut machine = ToggleMachine::new();
        let mut surface = FakeSurface::default();
        assert_eq!(machine.trigger(&mut surface), ToggleState::Frameless);
        assert!(surface.window_visible);
        assert!(!surface.header_visible);
        assert_eq!(surface.calls, vec![Effect::SetHeaderVisible(false)]);
    }

    #[test]
    fn test_frameless_to_hidden_hides_window() {
        let mut machine = ToggleMachine::new();
        let mut surface = FakeSurface::default();
        machine.trigger(&mut surface);
        surface.calls.clear();
        assert_eq!(machine.trigger(&mut surface), ToggleState::Hidden);
        assert!(!surface.window_visible);
        assert_eq!(surface.calls, vec![Effect::SetWindowVisible(false)]);
    }

    #[test]
    fn test_hidden_to_framed_shows_window_then_header() {
        let mut machine = ToggleMachine::new();
        let mut surface = FakeSurface::default();
        machine.trigger(&mut surface);
        machine.trigger(&mut surface);
        surface.calls.clear();
        assert_eq!(machine.trigger(&mut surface), ToggleState::Framed);
        assert!(surface.window_visible);
        assert!(surface.header_visible);
        assert_eq!(
            surface.calls,
            vec![Effect::SetWindowVisible(true), Effect::SetHeaderVisible(true)]
        );
    }

    #[test]
    fn test_failed_effect_keeps_state() {
        let mut machine = ToggleMachine::new();
        let mut surface = FakeSurface { fail_next: true, ..Default::default() };
        assert_eq!(machine.trigger(&mut surface), ToggleState::Framed);
        assert!(surface.header_visible);
        assert_eq!(machine.trigger(&mut surface), ToggleState::Frameless);
    }
}
