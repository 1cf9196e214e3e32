//! macOS backend
//!
//! Windows are identified by the pid of the frontmost application. Input
//! sources are global on macOS, so a layout change applies to every
//! window. There is no message that asks an application to copy, so the
//! passive copy always reports `Unsupported` and the engine falls back to
//! the copy chord.

mod input_source;
mod keycodes;
mod tap;

use std::cell::RefCell;
use std::thread;
use std::time::Duration;

use arboard::Clipboard;
use core_foundation::base::{CFType, TCFType};
use core_foundation::dictionary::{CFDictionary, CFDictionaryRef};
use core_foundation::number::CFNumber;
use core_foundation::string::CFString;
use core_graphics::display::CGDisplay;
use core_graphics::event::{CGEvent, CGEventFlags, CGEventTapLocation};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use core_graphics::geometry::CGRect;
use core_graphics::window::{
    copy_window_info, kCGNullWindowID, kCGWindowBounds, kCGWindowLayer,
    kCGWindowListExcludeDesktopElements, kCGWindowListOptionOnScreenOnly, kCGWindowOwnerPID,
};
use objc2::rc::Retained;
use objc2_app_kit::{NSPasteboard, NSRunningApplication, NSWorkspace};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::{ClipboardChanged, Host, HostError, WindowId};
use crate::hotkey::{Key, KeyAction, ModifierProbe, ModifierSet};
use crate::layout::{KeyMapping, KeyStroke, Keymaps, LayoutId};

pub use tap::EventTapSource;

/// How often the pasteboard change counter is sampled
const CLIPBOARD_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Reads the physical modifier state from the HID system
#[derive(Debug, Clone, Copy, Default)]
pub struct FlagsProbe;

impl ModifierProbe for FlagsProbe {
    fn held_modifiers(&self) -> ModifierSet {
        let flags = CGEventSource::new(CGEventSourceStateID::HIDSystemState)
            .and_then(CGEvent::new)
            .map(|event| event.get_flags().bits())
            .unwrap_or(0);
        keycodes::held_from_flags(flags)
    }
}

/// Lock keys other than Caps Lock have no key on Mac keyboards
pub fn can_observe(key: Key) -> bool {
    keycodes::observable(key)
}

pub struct MacHost {
    /// Refreshed whenever the installed layouts are listed
    keymaps: RefCell<Keymaps>,
}

impl MacHost {
    pub fn new() -> Self {
        let host = Self {
            keymaps: RefCell::new(Keymaps::builtin()),
        };
        host.refresh_keymaps();
        host
    }

    /// Reread the key tables of the enabled layouts from the OS
    fn refresh_keymaps(&self) {
        match input_source::system_keymaps() {
            Ok(system) => *self.keymaps.borrow_mut() = Keymaps::with_system(system),
            Err(e) => warn!(%e, "cannot read key tables, keeping the previous ones"),
        }
    }

    fn running_app(&self, window: WindowId) -> Result<Retained<NSRunningApplication>, HostError> {
        let pid = i32::try_from(window).map_err(|_| HostError::Window(format!("bad pid {window}")))?;
        unsafe { NSRunningApplication::runningApplicationWithProcessIdentifier(pid) }
            .ok_or_else(|| HostError::Window(format!("no application with pid {pid}")))
    }
}

fn clipboard() -> Result<Clipboard, HostError> {
    Clipboard::new().map_err(|e| HostError::Clipboard(e.to_string()))
}

fn change_count() -> isize {
    unsafe { NSPasteboard::generalPasteboard().changeCount() }
}

/// Report every change of `count` until the receiver of `tx` is dropped
fn watch_changes(
    tx: &mpsc::Sender<ClipboardChanged>,
    interval: Duration,
    mut count: impl FnMut() -> isize,
) {
    let mut last = count();
    while !tx.is_closed() {
        thread::sleep(interval);
        let current = count();
        if current == last {
            continue;
        }
        last = current;
        if tx.blocking_send(ClipboardChanged).is_err() {
            break;
        }
    }
}

/// Bounds of the frontmost normal-level window owned by `pid`
fn window_bounds(pid: i32) -> Option<CGRect> {
    let windows = copy_window_info(
        kCGWindowListOptionOnScreenOnly | kCGWindowListExcludeDesktopElements,
        kCGNullWindowID,
    )?;
    let (pid_key, layer_key, bounds_key) = unsafe {
        (
            CFString::wrap_under_get_rule(kCGWindowOwnerPID),
            CFString::wrap_under_get_rule(kCGWindowLayer),
            CFString::wrap_under_get_rule(kCGWindowBounds),
        )
    };

    // the list is ordered front to back
    windows.iter().find_map(|window| {
        let info: CFDictionary<CFString, CFType> =
            unsafe { CFDictionary::wrap_under_get_rule(*window as CFDictionaryRef) };
        let number = |key: &CFString| {
            info.find(key)
                .and_then(|value| value.downcast::<CFNumber>())
                .and_then(|n| n.to_i64())
        };
        if number(&pid_key)? != i64::from(pid) || number(&layer_key)? != 0 {
            return None;
        }
        let bounds = info.find(&bounds_key)?.downcast::<CFDictionary>()?;
        CGRect::from_dict_representation(&bounds)
    })
}

/// True if `window` covers all of `display`
fn covers(window: &CGRect, display: &CGRect) -> bool {
    window.origin.x <= display.origin.x
        && window.origin.y <= display.origin.y
        && window.origin.x + window.size.width >= display.origin.x + display.size.width
        && window.origin.y + window.size.height >= display.origin.y + display.size.height
}

impl KeyMapping for MacHost {
    fn stroke_for(&self, layout: &LayoutId, ch: char) -> Option<KeyStroke> {
        self.keymaps.borrow().stroke_for(layout, ch)
    }

    fn char_for(&self, layout: &LayoutId, stroke: KeyStroke) -> Option<char> {
        self.keymaps.borrow().char_for(layout, stroke)
    }

    fn has_keymap(&self, layout: &LayoutId) -> bool {
        self.keymaps.borrow().has_keymap(layout)
    }
}

impl Host for MacHost {
    fn focused_window(&self) -> Result<WindowId, HostError> {
        let app = unsafe { NSWorkspace::sharedWorkspace().frontmostApplication() }
            .ok_or(HostError::NoFocusedWindow)?;
        let pid = unsafe { app.processIdentifier() };
        WindowId::try_from(pid).map_err(|_| HostError::NoFocusedWindow)
    }

    fn is_fullscreen_app_running(&self) -> Result<bool, HostError> {
        let window = self.focused_window()?;
        let pid = i32::try_from(window).map_err(|_| HostError::Window(format!("bad pid {window}")))?;
        let Some(bounds) = window_bounds(pid) else {
            return Ok(false);
        };

        let displays = CGDisplay::active_displays()
            .map_err(|e| HostError::Window(format!("cannot list displays: error {e}")))?;
        Ok(displays
            .into_iter()
            .any(|id| covers(&bounds, &CGDisplay::new(id).bounds())))
    }

    fn request_layout_change(&self, window: WindowId, layout: &LayoutId) -> Result<(), HostError> {
        debug!(window, %layout, "selecting input source");
        input_source::select(layout)
    }

    fn owner_process_name(&self, window: WindowId) -> Result<String, HostError> {
        let app = self.running_app(window)?;
        unsafe { app.executableURL() }
            .and_then(|url| unsafe { url.lastPathComponent() })
            .map(|name| name.to_string())
            .ok_or_else(|| HostError::Window("application has no executable".into()))
    }

    fn window_class(&self, window: WindowId) -> Result<String, HostError> {
        let app = self.running_app(window)?;
        unsafe { app.bundleIdentifier() }
            .map(|id| id.to_string())
            .ok_or_else(|| HostError::Window("application has no bundle identifier".into()))
    }

    fn request_clipboard_copy(&self, _window: WindowId) -> Result<(), HostError> {
        Err(HostError::Unsupported)
    }

    fn held_modifiers(&self) -> ModifierSet {
        FlagsProbe.held_modifiers()
    }

    fn send_keys(&self, keys: &[KeyAction]) -> Result<(), HostError> {
        // a private source keeps our events apart from the hardware state
        let source = CGEventSource::new(CGEventSourceStateID::Private)
            .map_err(|_| HostError::Injection("cannot create event source".into()))?;
        let mut flags = 0u64;

        for action in keys {
            let code = keycodes::code_for(action.key)
                .ok_or_else(|| HostError::Injection(format!("no key code for {}", action.key)))?;

            if let Some(mask) = keycodes::flag_mask(action.key) {
                if action.down {
                    flags |= mask;
                } else {
                    flags &= !mask;
                }
            }

            let event = CGEvent::new_keyboard_event(source.clone(), code, action.down)
                .map_err(|_| HostError::Injection(format!("cannot create event for {}", action.key)))?;
            event.set_flags(CGEventFlags::from_bits_truncate(flags));
            event.post(CGEventTapLocation::HID);
        }

        Ok(())
    }

    fn read_clipboard_text(&self) -> Result<String, HostError> {
        clipboard()?.get_text().map_err(|e| match e {
            arboard::Error::ContentNotAvailable => HostError::NoClipboardText,
            other => HostError::Clipboard(other.to_string()),
        })
    }

    fn write_clipboard_text(&self, text: &str) -> Result<(), HostError> {
        clipboard()?
            .set_text(text)
            .map_err(|e| HostError::Clipboard(e.to_string()))
    }

    fn list_installed_layouts(&self) -> Result<Vec<LayoutId>, HostError> {
        self.refresh_keymaps();
        Ok(input_source::keyboard_layouts()?
            .into_iter()
            .map(|source| source.id)
            .collect())
    }

    fn layout_name(&self, layout: &LayoutId) -> Option<String> {
        input_source::keyboard_layouts()
            .ok()?
            .into_iter()
            .find(|source| layout.matches(source.id.as_str()))
            .map(|source| source.name)
    }

    fn watch_clipboard(&self, tx: mpsc::Sender<ClipboardChanged>) -> Result<(), HostError> {
        thread::Builder::new()
            .name("clipboard-watch".to_string())
            .spawn(move || {
                info!("clipboard watcher started");
                watch_changes(&tx, CLIPBOARD_POLL_INTERVAL, change_count);
                info!("clipboard watcher stopped");
            })
            .map(|_| ())
            .map_err(|e| HostError::Clipboard(format!("cannot start clipboard watcher: {e}")))
    }
}
