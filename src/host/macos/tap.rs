//! Global key tap using macOS CGEventTap
//!
//! The tap runs on the hook thread's CFRunLoop. The callback only copies
//! the interesting bits of each event into a channel; `poll` runs the loop
//! for a slice of time and drains it.

use std::sync::mpsc as std_mpsc;
use std::time::{Duration, Instant};

use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions, CGEventTapPlacement,
    CGEventTapProxy, CGEventType, EventField,
};
use core_graphics::event_source::CGEventSourceStateID;
use tracing::{error, info, trace};

use super::keycodes::{self, KeyKind};
use crate::hotkey::{HotkeyError, KeyEvent, KeySource};

/// What the tap callback hands to the hook thread
#[derive(Debug, Clone, Copy)]
enum TapMessage {
    Key {
        keycode: u16,
        kind: KeyKind,
        flags: u64,
        injected: bool,
        at: Instant,
    },
    Disabled,
}

/// Listen-only tap on key and modifier events
pub struct EventTapSource {
    tap: CGEventTap<'static>,
    rx: std_mpsc::Receiver<TapMessage>,
    started: Instant,
    disabled: bool,
}

impl EventTapSource {
    /// Create the tap on the current thread's run loop
    pub fn new() -> Result<Self, HotkeyError> {
        let (tx, rx) = std_mpsc::channel::<TapMessage>();

        // must be fast and non-blocking
        let callback = move |_proxy: CGEventTapProxy,
                             event_type: CGEventType,
                             event: &CGEvent|
              -> Option<CGEvent> {
            let kind = match event_type {
                CGEventType::KeyDown => Some(KeyKind::Down),
                CGEventType::KeyUp => Some(KeyKind::Up),
                CGEventType::FlagsChanged => Some(KeyKind::FlagsChanged),
                CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                    let _ = tx.send(TapMessage::Disabled);
                    None
                }
                _ => None,
            };

            if let Some(kind) = kind {
                let keycode = event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE);
                let state_id = event.get_integer_value_field(EventField::EVENT_SOURCE_STATE_ID);
                let _ = tx.send(TapMessage::Key {
                    keycode: keycode as u16,
                    kind,
                    flags: event.get_flags().bits(),
                    injected: state_id != CGEventSourceStateID::HIDSystemState as i64,
                    at: Instant::now(),
                });
            }
            Some(event.clone())
        };

        let tap = CGEventTap::new(
            CGEventTapLocation::Session,
            CGEventTapPlacement::HeadInsertEventTap,
            CGEventTapOptions::ListenOnly,
            vec![
                CGEventType::KeyDown,
                CGEventType::KeyUp,
                CGEventType::FlagsChanged,
            ],
            callback,
        )
        .map_err(|_| {
            error!("failed to create event tap - is Accessibility permission granted?");
            HotkeyError::TapCreation("check Accessibility permissions".into())
        })?;

        let run_loop_source = tap
            .mach_port
            .create_runloop_source(0)
            .map_err(|_| HotkeyError::TapCreation("no run loop source for the tap".into()))?;
        let run_loop = CFRunLoop::get_current();
        unsafe {
            run_loop.add_source(&run_loop_source, kCFRunLoopCommonModes);
        }
        tap.enable();

        info!("event tap created and enabled");

        Ok(Self {
            tap,
            rx,
            started: Instant::now(),
            disabled: false,
        })
    }

    /// Wrapping millisecond timestamp relative to tap creation
    fn timestamp_ms(&self, at: Instant) -> u32 {
        at.saturating_duration_since(self.started).as_millis() as u32
    }
}

impl KeySource for EventTapSource {
    fn poll(&mut self, timeout: Duration, events: &mut Vec<KeyEvent>) -> Result<(), HotkeyError> {
        unsafe {
            CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, timeout, true);
        }

        while let Ok(message) = self.rx.try_recv() {
            match message {
                TapMessage::Disabled => {
                    self.disabled = true;
                    self.tap.enable();
                }
                TapMessage::Key {
                    keycode,
                    kind,
                    flags,
                    injected,
                    at,
                } => {
                    let first = events.len();
                    keycodes::translate(keycode, kind, flags, self.timestamp_ms(at), events);
                    for event in &mut events[first..] {
                        trace!(key = %event.key, up = event.is_up, injected, "key event");
                        if injected {
                            *event = event.injected();
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn take_disabled(&mut self) -> bool {
        std::mem::take(&mut self.disabled)
    }
}
