//! Double-tap recognition over the raw key event stream
//!
//! A switch activates on its fourth transition: down, up, down, up, with
//! every transition at least `MIN_DELAY_MS` after the previous press and no
//! more than the tap timeout apart. Anything that breaks the rhythm drops
//! the sequence into a sentinel count that can never reach the activation
//! value; only a fresh press (other key, timeout, or a completed sequence)
//! starts counting again.

use tracing::{debug, trace};

use super::keys::{Key, ModifierSet};

/// Default double-tap timeout
pub const DEFAULT_TAP_TIMEOUT_MS: u32 = 300;

/// Transitions closer than this are autorepeat or injected noise
pub const MIN_DELAY_MS: u32 = 10;

const COUNT_ACTIVATE: u32 = 4;
/// Sequence is dead, switch is up
const COUNT_OFF_UP: u32 = 8;
/// Sequence is dead, switch is down
const COUNT_OFF_DOWN: u32 = 9;

fn is_down(transitions: u32) -> bool {
    transitions & 1 == 1
}

/// A raw physical key transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub is_up: bool,
    /// Milliseconds on a wrapping monotonic clock
    pub timestamp_ms: u32,
    /// Synthesized by some process rather than typed
    pub injected: bool,
}

impl KeyEvent {
    pub fn down(key: Key, timestamp_ms: u32) -> Self {
        Self {
            key,
            is_up: false,
            timestamp_ms,
            injected: false,
        }
    }

    pub fn up(key: Key, timestamp_ms: u32) -> Self {
        Self {
            is_up: true,
            ..Self::down(key, timestamp_ms)
        }
    }

    pub fn injected(self) -> Self {
        Self {
            injected: true,
            ..self
        }
    }
}

/// A completed double tap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Activation {
    /// Index of the switch in configuration order
    pub switch: usize,
    /// Some other modifier was physically held when the tap completed
    pub modifier_held: bool,
}

/// Live query of the modifiers currently held down
pub trait ModifierProbe {
    fn held_modifiers(&self) -> ModifierSet;
}

impl ModifierProbe for ModifierSet {
    fn held_modifiers(&self) -> ModifierSet {
        *self
    }
}

/// Turns key transitions into switch activations
#[derive(Debug)]
pub struct SwitchDetector {
    triggers: Vec<Key>,
    tap_timeout_ms: u32,
    enabled: bool,
    /// Index into `triggers` of the sequence in progress
    current: Option<usize>,
    last_press_ms: u32,
    /// Counts presses and releases; odd = switch is down
    transitions: u32,
}

impl SwitchDetector {
    pub fn new(triggers: Vec<Key>, tap_timeout_ms: u32) -> Self {
        Self {
            triggers,
            tap_timeout_ms,
            enabled: true,
            current: None,
            last_press_ms: 0,
            transitions: 0,
        }
    }

    /// Pause or resume; either way any sequence in progress is dropped
    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            debug!(enabled, "switch detector toggled");
        }
        self.enabled = enabled;
        self.current = None;
    }

    /// Switch index of the sequence in progress
    pub fn current_switch(&self) -> Option<usize> {
        self.current
    }

    pub fn transitions(&self) -> u32 {
        self.transitions
    }

    /// Feed one key transition
    pub fn on_key_event<P>(&mut self, event: KeyEvent, probe: &P) -> Option<Activation>
    where
        P: ModifierProbe + ?Sized,
    {
        if !self.enabled || event.injected {
            return None;
        }

        let Some(switch) = self.triggers.iter().position(|&k| k == event.key) else {
            // any other key breaks the sequence
            self.current = None;
            return None;
        };

        if event.is_up {
            self.switch_up(switch, event.timestamp_ms, probe)
        } else {
            self.switch_down(switch, event.timestamp_ms);
            None
        }
    }

    fn switch_down(&mut self, switch: usize, timestamp_ms: u32) {
        let elapsed_ms = timestamp_ms.wrapping_sub(self.last_press_ms);
        self.last_press_ms = timestamp_ms;

        if self.current != Some(switch)
            || elapsed_ms > self.tap_timeout_ms
            || self.transitions == COUNT_ACTIVATE
        {
            // could be a new double-tap
            self.current = Some(switch);
            self.transitions = 1;
            return;
        }

        if is_down(self.transitions) || elapsed_ms <= MIN_DELAY_MS {
            trace!(switch, elapsed_ms, "autorepeat or duplicate press");
            self.transitions = COUNT_OFF_DOWN;
            return;
        }

        self.transitions += 1;
    }

    fn switch_up<P>(&mut self, switch: usize, timestamp_ms: u32, probe: &P) -> Option<Activation>
    where
        P: ModifierProbe + ?Sized,
    {
        if self.current != Some(switch) {
            self.current = None;
            return None;
        }

        let elapsed_ms = timestamp_ms.wrapping_sub(self.last_press_ms);

        if !is_down(self.transitions)
            || elapsed_ms <= MIN_DELAY_MS
            || elapsed_ms > self.tap_timeout_ms
        {
            self.transitions = COUNT_OFF_UP;
            return None;
        }

        self.transitions += 1;

        if self.transitions != COUNT_ACTIVATE {
            return None;
        }

        let trigger = self.triggers[switch];
        let modifier_held = probe.held_modifiers().any_except(trigger);
        debug!(switch, key = %trigger, modifier_held, "switch activated");

        Some(Activation {
            switch,
            modifier_held,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const K: Key = Key::RightCtrl;

    fn detector() -> SwitchDetector {
        SwitchDetector::new(vec![Key::LeftCtrl, K, Key::CapsLock], 300)
    }

    fn feed(detector: &mut SwitchDetector, events: &[KeyEvent]) -> Vec<(u32, Activation)> {
        let none = ModifierSet::new();
        events
            .iter()
            .filter_map(|&ev| detector.on_key_event(ev, &none).map(|a| (ev.timestamp_ms, a)))
            .collect()
    }

    fn double_tap(key: Key, start: u32) -> [KeyEvent; 4] {
        [
            KeyEvent::down(key, start),
            KeyEvent::up(key, start + 50),
            KeyEvent::down(key, start + 120),
            KeyEvent::up(key, start + 160),
        ]
    }

    #[test]
    fn test_double_tap_activates_on_fourth_transition() {
        let mut d = detector();
        let fired = feed(&mut d, &double_tap(K, 0));
        assert_eq!(
            fired,
            vec![(
                160,
                Activation {
                    switch: 1,
                    modifier_held: false
                }
            )]
        );
    }

    #[test]
    fn test_press_after_activation_starts_new_sequence() {
        let mut d = detector();
        feed(&mut d, &double_tap(K, 0));

        let fired = feed(&mut d, &[KeyEvent::down(K, 400)]);
        assert!(fired.is_empty());
        assert_eq!(d.current_switch(), Some(1));
        assert_eq!(d.transitions(), 1);
    }

    #[test]
    fn test_third_tap_is_not_a_double_tap() {
        let mut d = detector();
        let mut events = double_tap(K, 0).to_vec();
        events.push(KeyEvent::down(K, 200));
        events.push(KeyEvent::up(K, 240));
        assert_eq!(feed(&mut d, &events).len(), 1);

        // a fourth tap completes the next pair
        let fired = feed(&mut d, &[KeyEvent::down(K, 300), KeyEvent::up(K, 340)]);
        assert_eq!(fired.len(), 1);
    }

    #[test]
    fn test_autorepeat_never_activates() {
        let mut d = detector();
        let mut events = vec![KeyEvent::down(K, 0)];
        // held key repeating, then released and tapped again
        events.extend((1..20).map(|i| KeyEvent::down(K, 500 + i * 33)));
        events.push(KeyEvent::up(K, 1200));
        events.push(KeyEvent::down(K, 1260));
        events.push(KeyEvent::up(K, 1300));
        assert!(feed(&mut d, &events).is_empty());
    }

    #[test]
    fn test_fast_duplicate_press_kills_sequence() {
        let mut d = detector();
        let events = [
            KeyEvent::down(K, 0),
            KeyEvent::down(K, 5),
            KeyEvent::up(K, 50),
            KeyEvent::down(K, 120),
            KeyEvent::up(K, 160),
        ];
        assert!(feed(&mut d, &events).is_empty());
        assert_eq!(d.current_switch(), Some(1));
    }

    #[test]
    fn test_fast_release_kills_sequence() {
        let mut d = detector();
        let events = [
            KeyEvent::down(K, 0),
            KeyEvent::up(K, 5),
            KeyEvent::down(K, 100),
            KeyEvent::up(K, 150),
        ];
        assert!(feed(&mut d, &events).is_empty());
    }

    #[test]
    fn test_slow_taps_do_not_activate() {
        let mut d = detector();
        let events = [
            KeyEvent::down(K, 0),
            KeyEvent::up(K, 50),
            KeyEvent::down(K, 400),
            KeyEvent::up(K, 450),
        ];
        assert!(feed(&mut d, &events).is_empty());

        // a held press is too long
        let mut d = detector();
        let events = [
            KeyEvent::down(K, 0),
            KeyEvent::up(K, 350),
            KeyEvent::down(K, 400),
            KeyEvent::up(K, 450),
        ];
        assert!(feed(&mut d, &events).is_empty());
    }

    #[test]
    fn test_injected_events_are_invisible() {
        let mut d = detector();
        feed(&mut d, &[KeyEvent::down(K, 0), KeyEvent::up(K, 50)]);
        assert_eq!(d.current_switch(), Some(1));

        let injected = [
            KeyEvent::down(Key::Other(30), 60).injected(),
            KeyEvent::down(Key::LeftCtrl, 70).injected(),
            KeyEvent::down(K, 80).injected(),
            KeyEvent::up(K, 90).injected(),
        ];
        assert!(feed(&mut d, &injected).is_empty());
        assert_eq!(d.current_switch(), Some(1));
        assert_eq!(d.transitions(), 2);

        let fired = feed(&mut d, &[KeyEvent::down(K, 120), KeyEvent::up(K, 160)]);
        assert_eq!(fired.len(), 1);
    }

    #[test]
    fn test_injected_double_tap_does_not_activate() {
        let mut d = detector();
        let events = double_tap(K, 0).map(KeyEvent::injected);
        assert!(feed(&mut d, &events).is_empty());
        assert_eq!(d.current_switch(), None);
    }

    #[test]
    fn test_other_key_breaks_sequence() {
        let mut d = detector();
        let events = [
            KeyEvent::down(K, 0),
            KeyEvent::up(K, 50),
            KeyEvent::down(Key::Other(30), 80),
            KeyEvent::down(K, 120),
            KeyEvent::up(K, 160),
        ];
        assert!(feed(&mut d, &events).is_empty());
    }

    #[test]
    fn test_other_trigger_breaks_sequence() {
        let mut d = detector();
        let events = [
            KeyEvent::down(K, 0),
            KeyEvent::up(K, 50),
            KeyEvent::down(Key::LeftCtrl, 80),
            KeyEvent::up(Key::LeftCtrl, 100),
            KeyEvent::down(K, 120),
            KeyEvent::up(K, 160),
        ];
        assert!(feed(&mut d, &events).is_empty());
        assert_eq!(d.transitions(), 2);
    }

    #[test]
    fn test_each_trigger_reports_its_index() {
        let mut d = detector();
        let fired = feed(&mut d, &double_tap(Key::CapsLock, 1000));
        assert_eq!(fired[0].1.switch, 2);
    }

    #[test]
    fn test_modifier_held_is_polled_at_activation() {
        let mut d = detector();
        let own: ModifierSet = [K].into_iter().collect();
        let with_shift: ModifierSet = [K, Key::LeftShift].into_iter().collect();

        let [a, b, c, e] = double_tap(K, 0);
        assert!(d.on_key_event(a, &own).is_none());
        assert!(d.on_key_event(b, &own).is_none());
        assert!(d.on_key_event(c, &own).is_none());
        let fired = d.on_key_event(e, &with_shift).unwrap();
        assert!(fired.modifier_held);

        let mut d = detector();
        let [a, b, c, e] = double_tap(K, 0);
        for ev in [a, b, c] {
            d.on_key_event(ev, &own);
        }
        assert!(!d.on_key_event(e, &own).unwrap().modifier_held);
    }

    #[test]
    fn test_disable_resets_and_ignores() {
        let mut d = detector();
        feed(&mut d, &[KeyEvent::down(K, 0), KeyEvent::up(K, 50)]);
        d.set_enabled(false);
        assert_eq!(d.current_switch(), None);
        assert!(feed(&mut d, &double_tap(K, 100)).is_empty());

        d.set_enabled(true);
        assert_eq!(feed(&mut d, &double_tap(K, 1000)).len(), 1);
    }

    #[test]
    fn test_timestamps_going_backwards_do_not_panic() {
        let mut d = detector();
        let events = [
            KeyEvent::down(K, 1000),
            KeyEvent::up(K, 900),
            KeyEvent::down(K, 10),
            KeyEvent::up(K, 0),
        ];
        assert!(feed(&mut d, &events).is_empty());
    }

    #[test]
    fn test_clock_wraparound() {
        let mut d = detector();
        let start = u32::MAX - 60;
        let events = [
            KeyEvent::down(K, start),
            KeyEvent::up(K, start.wrapping_add(50)),
            KeyEvent::down(K, start.wrapping_add(120)),
            KeyEvent::up(K, start.wrapping_add(160)),
        ];
        assert_eq!(feed(&mut d, &events).len(), 1);
    }
}
