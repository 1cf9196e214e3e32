//! Character tables for the keyboard layouts we know how to retype
//!
//! Every table covers the same 48 physical positions: the four ANSI
//! character rows (with the backslash key at the end of the top letter row)
//! plus the space bar. A character is "mappable" under a layout when some
//! position produces it, with or without Shift.
//!
//! Hosts that can read layouts from the OS add their tables in front of
//! the built-in ones.

use super::LayoutId;

/// Number of key positions shared by all tables
pub const KEY_POSITIONS: usize = 48;

/// A physical key position plus shift level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyStroke {
    pub position: u8,
    pub shift: bool,
}

/// Character <-> key stroke lookups per layout
///
/// Implemented by hosts (usually by delegating to [`Keymaps`]) so the
/// detector and the retyping transform never talk to the OS directly.
pub trait KeyMapping {
    /// Key stroke that types `ch` under `layout`, if any
    fn stroke_for(&self, layout: &LayoutId, ch: char) -> Option<KeyStroke>;

    /// Character produced by `stroke` under `layout`, if any
    fn char_for(&self, layout: &LayoutId, stroke: KeyStroke) -> Option<char>;

    /// True if there is a table for `layout` at all
    fn has_keymap(&self, layout: &LayoutId) -> bool;
}

/// One layout's table
#[derive(Debug, Clone)]
pub struct Keymap {
    name: String,
    aliases: &'static [&'static str],
    plain: Vec<Option<char>>,
    shifted: Vec<Option<char>>,
}

impl Keymap {
    fn from_rows(
        name: &'static str,
        aliases: &'static [&'static str],
        plain: &str,
        shifted: &str,
    ) -> Self {
        let plain: Vec<_> = plain.chars().map(Some).collect();
        let shifted: Vec<_> = shifted.chars().map(Some).collect();
        debug_assert_eq!(plain.len(), KEY_POSITIONS, "{name}: plain row");
        debug_assert_eq!(shifted.len(), KEY_POSITIONS, "{name}: shifted row");
        Self {
            name: name.to_string(),
            aliases,
            plain,
            shifted,
        }
    }

    /// Table read from the OS; positions it leaves out produce nothing
    pub fn from_positions(
        name: impl Into<String>,
        mut plain: Vec<Option<char>>,
        mut shifted: Vec<Option<char>>,
    ) -> Self {
        plain.resize(KEY_POSITIONS, None);
        shifted.resize(KEY_POSITIONS, None);
        Self {
            name: name.into(),
            aliases: &[],
            plain,
            shifted,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check whether a host layout id refers to this table
    pub fn answers_to(&self, layout: &LayoutId) -> bool {
        layout.matches(&self.name) || self.aliases.iter().any(|alias| layout.matches(alias))
    }

    pub fn stroke_for(&self, ch: char) -> Option<KeyStroke> {
        let find = |row: &[Option<char>], shift: bool| {
            row.iter().position(|&c| c == Some(ch)).map(|pos| KeyStroke {
                position: pos as u8,
                shift,
            })
        };
        find(&self.plain, false).or_else(|| find(&self.shifted, true))
    }

    pub fn char_for(&self, stroke: KeyStroke) -> Option<char> {
        let row = if stroke.shift { &self.shifted } else { &self.plain };
        row.get(usize::from(stroke.position)).copied().flatten()
    }
}

/// The set of tables available to a host
#[derive(Debug, Clone)]
pub struct Keymaps {
    maps: Vec<Keymap>,
}

impl Keymaps {
    /// US English, Russian and German tables
    pub fn builtin() -> Self {
        Self {
            maps: vec![
                Keymap::from_rows(
                    "us",
                    &["en-us", "00000409", "com.apple.keylayout.US", "com.apple.keylayout.ABC"],
                    "`1234567890-=qwertyuiop[]\\asdfghjkl;'zxcvbnm,./ ",
                    "~!@#$%^&*()_+QWERTYUIOP{}|ASDFGHJKL:\"ZXCVBNM<>? ",
                ),
                Keymap::from_rows(
                    "ru",
                    &["ru-ru", "00000419", "com.apple.keylayout.Russian", "com.apple.keylayout.RussianWin"],
                    "ё1234567890-=йцукенгшщзхъ\\фывапролджэячсмитьбю. ",
                    "Ё!\"№;%:?*()_+ЙЦУКЕНГШЩЗХЪ/ФЫВАПРОЛДЖЭЯЧСМИТЬБЮ, ",
                ),
                Keymap::from_rows(
                    "de",
                    &["de-de", "00000407", "com.apple.keylayout.German"],
                    "^1234567890ß´qwertzuiopü+#asdfghjklöäyxcvbnm,.- ",
                    "°!\"§$%&/()=?`QWERTZUIOPÜ*'ASDFGHJKLÖÄYXCVBNM;:_ ",
                ),
            ],
        }
    }

    /// Built-in tables behind `system`, which take precedence
    pub fn with_system(system: Vec<Keymap>) -> Self {
        let mut maps = system;
        maps.extend(Self::builtin().maps);
        Self { maps }
    }

    /// Table for a host layout id
    pub fn find(&self, layout: &LayoutId) -> Option<&Keymap> {
        self.maps.iter().find(|map| map.answers_to(layout))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Keymap> {
        self.maps.iter()
    }
}

impl Default for Keymaps {
    fn default() -> Self {
        Self::builtin()
    }
}

impl KeyMapping for Keymaps {
    fn stroke_for(&self, layout: &LayoutId, ch: char) -> Option<KeyStroke> {
        self.find(layout)?.stroke_for(ch)
    }

    fn char_for(&self, layout: &LayoutId, stroke: KeyStroke) -> Option<char> {
        self.find(layout)?.char_for(stroke)
    }

    fn has_keymap(&self, layout: &LayoutId) -> bool {
        self.find(layout).is_some()
    }
}
