//! Global key handling
//!
//! The hook thread (`listener`) feeds platform key events through the
//! double-tap `detector` and forwards activations to the main context.

mod detector;
mod keys;
mod listener;

pub use detector::{
    Activation, KeyEvent, ModifierProbe, SwitchDetector, DEFAULT_TAP_TIMEOUT_MS, MIN_DELAY_MS,
};
pub use keys::{Key, KeyAction, ModifierSet, UnknownKey, MODIFIERS};
pub use listener::{HookCommand, HookControl, HotkeyError, HotkeyEvent, HotkeyListener, KeySource};
