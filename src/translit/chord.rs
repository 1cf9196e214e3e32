//! Synthesized key chords that do not compound with held modifiers

use tracing::debug;

use crate::host::{Host, HostError};
use crate::hotkey::{Key, KeyAction, ModifierSet};

/// Key transitions for `modifier+key`, wrapped so held modifiers don't leak in
///
/// Every held modifier is released first, the chord is pressed and
/// released, then the held modifiers are pressed again.
pub fn chord_sequence(held: ModifierSet, modifier: Key, key: Key) -> Vec<KeyAction> {
    let mut keys: Vec<KeyAction> = held.iter().map(KeyAction::release).collect();

    keys.extend([
        KeyAction::press(modifier),
        KeyAction::press(key),
        KeyAction::release(key),
        KeyAction::release(modifier),
    ]);

    keys.extend(held.iter().map(KeyAction::press));
    keys
}

/// Poll held modifiers and inject `modifier+key`
pub fn send_chord(host: &dyn Host, modifier: Key, key: Key) -> Result<(), HostError> {
    let held = host.held_modifiers();
    debug!(%modifier, %key, ?held, "sending chord");
    host.send_keys(&chord_sequence(held, modifier, key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::mock::{HostCall, MockHost};

    #[test]
    fn test_plain_chord() {
        let keys = chord_sequence(ModifierSet::new(), Key::Control, Key::C);
        assert_eq!(
            keys,
            vec![
                KeyAction::press(Key::Control),
                KeyAction::press(Key::C),
                KeyAction::release(Key::C),
                KeyAction::release(Key::Control),
            ]
        );
    }

    #[test]
    fn test_held_modifiers_are_released_and_restored() {
        let held: ModifierSet = [Key::RightAlt, Key::LeftShift].into_iter().collect();
        let keys = chord_sequence(held, Key::Shift, Key::Insert);
        assert_eq!(
            keys,
            vec![
                KeyAction::release(Key::LeftShift),
                KeyAction::release(Key::RightAlt),
                KeyAction::press(Key::Shift),
                KeyAction::press(Key::Insert),
                KeyAction::release(Key::Insert),
                KeyAction::release(Key::Shift),
                KeyAction::press(Key::LeftShift),
                KeyAction::press(Key::RightAlt),
            ]
        );
    }

    #[test]
    fn test_send_chord_polls_host() {
        let mut host = MockHost::new();
        host.held = [Key::LeftCtrl].into_iter().collect();
        send_chord(&host, Key::Control, Key::V).unwrap();

        let calls = host.calls();
        assert_eq!(calls.len(), 1);
        let HostCall::Keys(keys) = &calls[0] else {
            panic!("expected key injection, got {calls:?}");
        };
        assert_eq!(keys.first(), Some(&KeyAction::release(Key::LeftCtrl)));
        assert_eq!(keys.last(), Some(&KeyAction::press(Key::LeftCtrl)));
        assert_eq!(keys.len(), 6);
    }
}
