//! Virtual key codes, modifier flag masks and tap event translation
//!
//! Chords use Command where other platforms use Control, so
//! `Key::Control` maps to the Command key here.

use crate::hotkey::{Key, KeyEvent, ModifierSet, MIN_DELAY_MS, MODIFIERS};
use crate::layout::keymap::KEY_POSITIONS;

const VK_C: u16 = 0x08;
const VK_V: u16 = 0x09;
const VK_RIGHT_COMMAND: u16 = 0x36;
const VK_COMMAND: u16 = 0x37;
const VK_SHIFT: u16 = 0x38;
const VK_CAPS_LOCK: u16 = 0x39;
const VK_OPTION: u16 = 0x3A;
const VK_CONTROL: u16 = 0x3B;
const VK_RIGHT_SHIFT: u16 = 0x3C;
const VK_RIGHT_OPTION: u16 = 0x3D;
const VK_RIGHT_CONTROL: u16 = 0x3E;
const VK_HELP: u16 = 0x72;

/// ANSI virtual key codes of the keymap positions, in table order
pub const POSITION_CODES: [u16; KEY_POSITIONS] = [
    // ` 1 2 3 4 5 6 7 8 9 0 - =
    0x32, 0x12, 0x13, 0x14, 0x15, 0x17, 0x16, 0x1A, 0x1C, 0x19, 0x1D, 0x1B, 0x18,
    // q w e r t y u i o p [ ] \
    0x0C, 0x0D, 0x0E, 0x0F, 0x11, 0x10, 0x20, 0x22, 0x1F, 0x23, 0x21, 0x1E, 0x2A,
    // a s d f g h j k l ; '
    0x00, 0x01, 0x02, 0x03, 0x05, 0x04, 0x26, 0x28, 0x25, 0x29, 0x27,
    // z x c v b n m , . /
    0x06, 0x07, 0x08, 0x09, 0x0B, 0x2D, 0x2E, 0x2B, 0x2F, 0x2C,
    // space
    0x31,
];

// device-dependent bits of CGEventFlags (NX_DEVICE*KEYMASK)
const DEVICE_LCTL: u64 = 0x0000_0001;
const DEVICE_LSHIFT: u64 = 0x0000_0002;
const DEVICE_RSHIFT: u64 = 0x0000_0004;
const DEVICE_LCMD: u64 = 0x0000_0008;
const DEVICE_RCMD: u64 = 0x0000_0010;
const DEVICE_LALT: u64 = 0x0000_0020;
const DEVICE_RALT: u64 = 0x0000_0040;
const DEVICE_RCTL: u64 = 0x0000_2000;

// device-independent bits
const FLAG_SHIFT: u64 = 0x0002_0000;
const FLAG_CONTROL: u64 = 0x0004_0000;
const FLAG_OPTION: u64 = 0x0008_0000;
const FLAG_COMMAND: u64 = 0x0010_0000;

/// Kind of keyboard event delivered by the tap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Down,
    Up,
    FlagsChanged,
}

/// Key for a virtual key code reported by the tap
pub fn key_for(code: u16) -> Key {
    match code {
        VK_CONTROL => Key::LeftCtrl,
        VK_RIGHT_CONTROL => Key::RightCtrl,
        VK_SHIFT => Key::LeftShift,
        VK_RIGHT_SHIFT => Key::RightShift,
        VK_OPTION => Key::LeftAlt,
        VK_RIGHT_OPTION => Key::RightAlt,
        VK_COMMAND => Key::LeftMeta,
        VK_RIGHT_COMMAND => Key::RightMeta,
        VK_CAPS_LOCK => Key::CapsLock,
        VK_C => Key::C,
        VK_V => Key::V,
        VK_HELP => Key::Insert,
        other => Key::Other(u32::from(other)),
    }
}

/// Virtual key code to synthesize `key`
pub fn code_for(key: Key) -> Option<u16> {
    let code = match key {
        Key::LeftCtrl => VK_CONTROL,
        Key::RightCtrl => VK_RIGHT_CONTROL,
        Key::LeftShift | Key::Shift => VK_SHIFT,
        Key::RightShift => VK_RIGHT_SHIFT,
        Key::LeftAlt => VK_OPTION,
        Key::RightAlt => VK_RIGHT_OPTION,
        Key::LeftMeta | Key::Control => VK_COMMAND,
        Key::RightMeta => VK_RIGHT_COMMAND,
        Key::CapsLock => VK_CAPS_LOCK,
        Key::C => VK_C,
        Key::V => VK_V,
        Key::Insert => VK_HELP,
        Key::NumLock | Key::ScrollLock => return None,
        Key::Other(code) => u16::try_from(code).ok()?,
    };
    Some(code)
}

/// Device-dependent flag bit that is set while the sided modifier is down
pub fn device_mask(key: Key) -> Option<u64> {
    let mask = match key {
        Key::LeftCtrl => DEVICE_LCTL,
        Key::RightCtrl => DEVICE_RCTL,
        Key::LeftShift => DEVICE_LSHIFT,
        Key::RightShift => DEVICE_RSHIFT,
        Key::LeftAlt => DEVICE_LALT,
        Key::RightAlt => DEVICE_RALT,
        Key::LeftMeta => DEVICE_LCMD,
        Key::RightMeta => DEVICE_RCMD,
        _ => return None,
    };
    Some(mask)
}

/// True if the tap reports presses of `key`
///
/// Sided modifiers show up through their device bits and Caps Lock through
/// its toggle. Num Lock and Scroll Lock have no key on Mac keyboards.
pub fn observable(key: Key) -> bool {
    key == Key::CapsLock || device_mask(key).is_some()
}

/// Append the key transitions one tap event stands for
///
/// Caps Lock reports a single flags change per press and nothing on
/// release, so that change becomes a full press whose release lands just
/// past the autorepeat floor.
pub fn translate(code: u16, kind: KeyKind, flags: u64, timestamp_ms: u32, out: &mut Vec<KeyEvent>) {
    let key = key_for(code);
    match kind {
        KeyKind::Down => out.push(KeyEvent::down(key, timestamp_ms)),
        KeyKind::Up => out.push(KeyEvent::up(key, timestamp_ms)),
        KeyKind::FlagsChanged if key == Key::CapsLock => {
            out.push(KeyEvent::down(key, timestamp_ms));
            out.push(KeyEvent::up(key, timestamp_ms.wrapping_add(MIN_DELAY_MS + 1)));
        }
        KeyKind::FlagsChanged => {
            // a modifier went down if its device bit is now set
            if let Some(mask) = device_mask(key) {
                out.push(if flags & mask == 0 {
                    KeyEvent::up(key, timestamp_ms)
                } else {
                    KeyEvent::down(key, timestamp_ms)
                });
            }
        }
    }
}

/// Device-independent flag bit a synthesized modifier contributes
pub fn flag_mask(key: Key) -> Option<u64> {
    let mask = match key {
        Key::LeftShift | Key::RightShift | Key::Shift => FLAG_SHIFT,
        Key::LeftCtrl | Key::RightCtrl => FLAG_CONTROL,
        Key::LeftAlt | Key::RightAlt => FLAG_OPTION,
        Key::LeftMeta | Key::RightMeta | Key::Control => FLAG_COMMAND,
        _ => return None,
    };
    Some(mask)
}

/// Sided modifiers whose device bits are set in `flags`
pub fn held_from_flags(flags: u64) -> ModifierSet {
    MODIFIERS
        .into_iter()
        .filter(|&key| device_mask(key).is_some_and(|mask| flags & mask != 0))
        .collect()
}
