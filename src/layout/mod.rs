//! Keyboard layout identifiers, character tables and text conversion
//!
//! - `codec`: `U+XXXX` notation for the HEX pseudo-layout
//! - `keymap`: per-layout key position tables and the `KeyMapping` seam
//! - `detect`: guesses which layout a piece of text was typed in
//! - `transform`: retypes text from one layout into another

pub mod codec;
pub mod detect;
pub mod keymap;
pub mod transform;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use keymap::{KeyMapping, KeyStroke, Keymaps};

/// Upper bound on the number of installed layouts the host reports
pub const MAX_LAYOUTS: usize = 8;

/// An OS-level keyboard layout identifier
///
/// The exact format is host specific (a KLID such as `00000409` on Windows,
/// an input source id such as `com.apple.keylayout.US` on macOS).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LayoutId(String);

impl LayoutId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check whether `name` refers to this layout
    ///
    /// Comparison ignores ASCII case; for purely hexadecimal ids leading
    /// zeros are not significant (`409` matches `00000409`).
    pub fn matches(&self, name: &str) -> bool {
        if self.0.eq_ignore_ascii_case(name) {
            return true;
        }
        let is_hex = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_hexdigit());
        if is_hex(&self.0) && is_hex(name) {
            let ours = self.0.trim_start_matches('0');
            let theirs = name.trim_start_matches('0');
            return ours.eq_ignore_ascii_case(theirs);
        }
        false
    }
}

impl fmt::Display for LayoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a switch activates: a real layout or one of the pseudo-layouts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutTarget {
    /// A concrete installed layout
    Layout(LayoutId),
    /// Resolved at startup to an installed layout no other switch uses
    AutoAssign,
    /// Replace `U+XXXX` tokens with the characters they name
    HexToUnicode,
    /// Annotate every character with its `U+XXXX` code point
    UnicodeToHex,
}

impl LayoutTarget {
    /// Name of the HEX pseudo-layout on the command line
    pub const HEX: &'static str = "HEX";

    /// Parse the `LAYOUT` half of a `KEY=LAYOUT` argument
    pub fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case(Self::HEX) {
            Self::HexToUnicode
        } else {
            Self::Layout(LayoutId::new(value))
        }
    }

    /// True for both directions of the HEX pseudo-layout
    pub fn is_hex(&self) -> bool {
        matches!(self, Self::HexToUnicode | Self::UnicodeToHex)
    }
}

impl fmt::Display for LayoutTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayoutTarget::Layout(id) => write!(f, "{}", id),
            LayoutTarget::AutoAssign => write!(f, "auto"),
            LayoutTarget::HexToUnicode => write!(f, "HEX"),
            LayoutTarget::UnicodeToHex => write!(f, "HEX (reverse)"),
        }
    }
}
