//! Key definitions and modifier state tracking
//!
//! `Key` names the physical keys the daemon cares about: the trigger
//! candidates (sided modifiers and lock keys) and the keys that appear in
//! synthesized copy/paste chords. Everything else is `Key::Other`.

use std::fmt;
use std::str::FromStr;

/// A physical key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    LeftCtrl,
    RightCtrl,
    LeftShift,
    RightShift,
    LeftAlt,
    RightAlt,
    LeftMeta,
    RightMeta,
    CapsLock,
    NumLock,
    ScrollLock,
    /// Side-less Control, as used in shortcut chords
    Control,
    /// Side-less Shift, as used in shortcut chords
    Shift,
    Insert,
    C,
    V,
    /// Any other key, by platform key code
    Other(u32),
}

/// The sided modifier keys, in the order they are released and restored
pub const MODIFIERS: [Key; 8] = [
    Key::LeftShift,
    Key::LeftCtrl,
    Key::LeftAlt,
    Key::LeftMeta,
    Key::RightShift,
    Key::RightCtrl,
    Key::RightAlt,
    Key::RightMeta,
];

/// Accepted spellings for trigger keys (matched case-insensitively)
const KEY_NAMES: &[(Key, &[&str])] = &[
    (Key::LeftCtrl, &["LC", "LCtrl", "LeftCtrl", "LeftControl"]),
    (Key::RightCtrl, &["RC", "RCtrl", "RightCtrl", "RightControl"]),
    (Key::LeftShift, &["LS", "LShift", "LeftShift"]),
    (Key::RightShift, &["RS", "RShift", "RightShift"]),
    (Key::LeftAlt, &["LA", "LAlt", "LeftAlt", "LOpt", "LeftOption"]),
    (Key::RightAlt, &["RA", "RAlt", "RightAlt", "ROpt", "RightOption"]),
    (Key::LeftMeta, &["LW", "LWin", "LeftWin", "LCmd", "LeftCommand"]),
    (Key::RightMeta, &["RW", "RWin", "RightWin", "RCmd", "RightCommand"]),
    (Key::CapsLock, &["CL", "Caps", "CapsLock"]),
    (Key::NumLock, &["NL", "NumLock"]),
    (Key::ScrollLock, &["SL", "ScrollLock"]),
];

impl Key {
    /// True for the eight sided modifiers
    pub fn is_modifier(self) -> bool {
        self.modifier_bit().is_some()
    }

    fn modifier_bit(self) -> Option<u8> {
        MODIFIERS
            .iter()
            .position(|&m| m == self)
            .map(|idx| 1 << idx)
    }

    /// Short command-line name, if this key can be a trigger
    pub fn short_name(self) -> Option<&'static str> {
        KEY_NAMES
            .iter()
            .find(|(key, _)| *key == self)
            .map(|(_, names)| names[0])
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.short_name(), self) {
            (Some(name), _) => f.write_str(name),
            (None, Key::Other(code)) => write!(f, "key#{code}"),
            (None, other) => write!(f, "{other:?}"),
        }
    }
}

/// A key name that is not in the trigger key list
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown key name '{0}'")]
pub struct UnknownKey(pub String);

impl FromStr for Key {
    type Err = UnknownKey;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KEY_NAMES
            .iter()
            .find(|(_, names)| names.iter().any(|n| n.eq_ignore_ascii_case(s)))
            .map(|(key, _)| *key)
            .ok_or_else(|| UnknownKey(s.to_string()))
    }
}

/// Tracks which sided modifier keys are currently pressed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierSet(u8);

impl ModifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `key` as held; non-modifiers are ignored
    pub fn insert(&mut self, key: Key) {
        if let Some(bit) = key.modifier_bit() {
            self.0 |= bit;
        }
    }

    pub fn contains(&self, key: Key) -> bool {
        key.modifier_bit().is_some_and(|bit| self.0 & bit != 0)
    }

    /// Check if all modifiers are released
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Check if anything other than `key` is held
    pub fn any_except(&self, key: Key) -> bool {
        let own = key.modifier_bit().unwrap_or(0);
        self.0 & !own != 0
    }

    /// Held modifiers in `MODIFIERS` order
    pub fn iter(&self) -> impl Iterator<Item = Key> + '_ {
        MODIFIERS.into_iter().filter(move |&m| self.contains(m))
    }
}

impl FromIterator<Key> for ModifierSet {
    fn from_iter<I: IntoIterator<Item = Key>>(iter: I) -> Self {
        let mut set = Self::new();
        for key in iter {
            set.insert(key);
        }
        set
    }
}

/// One synthesized key transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyAction {
    pub key: Key,
    pub down: bool,
}

impl KeyAction {
    pub fn press(key: Key) -> Self {
        Self { key, down: true }
    }

    pub fn release(key: Key) -> Self {
        Self { key, down: false }
    }
}
