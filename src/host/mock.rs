//! Recording host for tests

use std::cell::RefCell;
use std::rc::Rc;

use tokio::sync::mpsc;

use super::{ClipboardChanged, Host, HostError, WindowId};
use crate::hotkey::{KeyAction, ModifierSet};
use crate::layout::{KeyMapping, KeyStroke, Keymaps, LayoutId};

/// Side effects the code under test asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
    LayoutChange(WindowId, LayoutId),
    CopyRequest(WindowId),
    Keys(Vec<KeyAction>),
    ClipboardWrite(String),
}

/// Clones share the clipboard and the call log
#[derive(Debug, Clone)]
pub struct MockHost {
    pub keymaps: Keymaps,
    pub layouts: Vec<LayoutId>,
    pub focused: Option<WindowId>,
    pub fullscreen: bool,
    pub process_name: String,
    pub class_name: String,
    pub held: ModifierSet,
    pub fail_keys: bool,
    pub fail_layout_list: bool,
    clipboard: Rc<RefCell<Option<String>>>,
    calls: Rc<RefCell<Vec<HostCall>>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self {
            keymaps: Keymaps::builtin(),
            layouts: vec![LayoutId::new("us"), LayoutId::new("ru")],
            focused: Some(7),
            fullscreen: false,
            process_name: "notepad.exe".to_string(),
            class_name: "Edit".to_string(),
            held: ModifierSet::new(),
            fail_keys: false,
            fail_layout_list: false,
            clipboard: Rc::new(RefCell::new(None)),
            calls: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Simulate another application writing the clipboard
    pub fn set_clipboard(&self, text: &str) {
        *self.clipboard.borrow_mut() = Some(text.to_string());
    }

    pub fn clipboard(&self) -> Option<String> {
        self.clipboard.borrow().clone()
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    fn record(&self, call: HostCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl KeyMapping for MockHost {
    fn stroke_for(&self, layout: &LayoutId, ch: char) -> Option<KeyStroke> {
        self.keymaps.stroke_for(layout, ch)
    }

    fn char_for(&self, layout: &LayoutId, stroke: KeyStroke) -> Option<char> {
        self.keymaps.char_for(layout, stroke)
    }

    fn has_keymap(&self, layout: &LayoutId) -> bool {
        self.keymaps.has_keymap(layout)
    }
}

impl Host for MockHost {
    fn focused_window(&self) -> Result<WindowId, HostError> {
        self.focused.ok_or(HostError::NoFocusedWindow)
    }

    fn is_fullscreen_app_running(&self) -> Result<bool, HostError> {
        Ok(self.fullscreen)
    }

    fn request_layout_change(&self, window: WindowId, layout: &LayoutId) -> Result<(), HostError> {
        self.record(HostCall::LayoutChange(window, layout.clone()));
        Ok(())
    }

    fn owner_process_name(&self, _window: WindowId) -> Result<String, HostError> {
        Ok(self.process_name.clone())
    }

    fn window_class(&self, _window: WindowId) -> Result<String, HostError> {
        Ok(self.class_name.clone())
    }

    fn request_clipboard_copy(&self, window: WindowId) -> Result<(), HostError> {
        self.record(HostCall::CopyRequest(window));
        Ok(())
    }

    fn held_modifiers(&self) -> ModifierSet {
        self.held
    }

    fn send_keys(&self, keys: &[KeyAction]) -> Result<(), HostError> {
        if self.fail_keys {
            return Err(HostError::Injection("blocked".into()));
        }
        self.record(HostCall::Keys(keys.to_vec()));
        Ok(())
    }

    fn read_clipboard_text(&self) -> Result<String, HostError> {
        self.clipboard.borrow().clone().ok_or(HostError::NoClipboardText)
    }

    fn write_clipboard_text(&self, text: &str) -> Result<(), HostError> {
        self.set_clipboard(text);
        self.record(HostCall::ClipboardWrite(text.to_string()));
        Ok(())
    }

    fn list_installed_layouts(&self) -> Result<Vec<LayoutId>, HostError> {
        if self.fail_layout_list {
            return Err(HostError::LayoutList("mock".into()));
        }
        Ok(self.layouts.clone())
    }

    fn layout_name(&self, layout: &LayoutId) -> Option<String> {
        self.keymaps.find(layout).map(|map| map.name().to_uppercase())
    }

    fn watch_clipboard(&self, _tx: mpsc::Sender<ClipboardChanged>) -> Result<(), HostError> {
        Ok(())
    }
}
