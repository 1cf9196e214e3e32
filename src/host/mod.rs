//! Host adapter: everything the daemon needs from the OS
//!
//! The switcher and the transliteration engine only ever talk to the
//! desktop through [`Host`]; the hook thread uses a [`KeySource`] and a
//! [`ModifierProbe`]. Each platform backend provides all three.

#[cfg(target_os = "macos")]
mod macos;

#[cfg(test)]
pub(crate) mod mock;

use tokio::sync::mpsc;

use crate::hotkey::{HotkeyError, Key, KeyAction, KeySource, ModifierProbe, ModifierSet};
use crate::layout::{KeyMapping, LayoutId};

/// Opaque handle for a window (or whatever the host can target)
pub type WindowId = u64;

/// Notification that the clipboard content changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipboardChanged;

/// Errors from individual host calls; each can fail independently
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("not supported on this platform")]
    Unsupported,

    #[error("no focused window")]
    NoFocusedWindow,

    #[error("window query failed: {0}")]
    Window(String),

    #[error("clipboard access failed: {0}")]
    Clipboard(String),

    #[error("clipboard holds no text")]
    NoClipboardText,

    #[error("key injection failed: {0}")]
    Injection(String),

    #[error("keyboard layout list unavailable: {0}")]
    LayoutList(String),

    #[error("keyboard layout {0} is not installed")]
    UnknownLayout(LayoutId),
}

/// OS services used from the main context
pub trait Host: KeyMapping {
    /// Window that currently has keyboard focus
    fn focused_window(&self) -> Result<WindowId, HostError>;

    /// True while the foreground application covers a whole display
    fn is_fullscreen_app_running(&self) -> Result<bool, HostError>;

    /// Ask `window` to switch its input layout
    fn request_layout_change(&self, window: WindowId, layout: &LayoutId) -> Result<(), HostError>;

    /// Executable name of the process owning `window`
    fn owner_process_name(&self, window: WindowId) -> Result<String, HostError>;

    /// Window class (or the nearest platform equivalent)
    fn window_class(&self, window: WindowId) -> Result<String, HostError>;

    /// Ask `window` to copy its selection without synthesizing keys
    fn request_clipboard_copy(&self, window: WindowId) -> Result<(), HostError>;

    /// Sided modifiers physically held right now
    fn held_modifiers(&self) -> ModifierSet;

    /// Inject key transitions, in order
    fn send_keys(&self, keys: &[KeyAction]) -> Result<(), HostError>;

    fn read_clipboard_text(&self) -> Result<String, HostError>;

    fn write_clipboard_text(&self, text: &str) -> Result<(), HostError>;

    /// Installed layouts in OS order, at most `MAX_LAYOUTS`
    fn list_installed_layouts(&self) -> Result<Vec<LayoutId>, HostError>;

    /// Human-readable layout name
    fn layout_name(&self, layout: &LayoutId) -> Option<String>;

    /// Deliver a notification on `tx` whenever the clipboard changes
    fn watch_clipboard(&self, tx: mpsc::Sender<ClipboardChanged>) -> Result<(), HostError>;
}

/// The host backend for this platform
pub fn platform() -> Result<Box<dyn Host>, HostError> {
    #[cfg(target_os = "macos")]
    {
        Ok(Box::new(macos::MacHost::new()))
    }
    #[cfg(not(target_os = "macos"))]
    {
        Err(HostError::Unsupported)
    }
}

/// Key tap for the hook thread; must be called on that thread
pub fn key_source() -> Result<Box<dyn KeySource>, HotkeyError> {
    #[cfg(target_os = "macos")]
    {
        Ok(Box::new(macos::EventTapSource::new()?))
    }
    #[cfg(not(target_os = "macos"))]
    {
        Err(HotkeyError::Unsupported)
    }
}

/// True if the key source reports presses of `key`
pub fn can_observe(key: Key) -> bool {
    #[cfg(target_os = "macos")]
    {
        macos::can_observe(key)
    }
    #[cfg(not(target_os = "macos"))]
    {
        let _ = key;
        true
    }
}

/// Modifier poller for the hook thread
pub fn modifier_probe() -> Box<dyn ModifierProbe + Send> {
    #[cfg(target_os = "macos")]
    {
        Box::new(macos::FlagsProbe)
    }
    #[cfg(not(target_os = "macos"))]
    {
        Box::new(ModifierSet::new())
    }
}
