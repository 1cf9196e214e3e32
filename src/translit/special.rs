//! Per-application copy/paste quirks

use tracing::{debug, warn};

use crate::host::{Host, WindowId};
use crate::hotkey::Key;

/// How to talk to the target window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpecialHandling {
    /// Ctrl+C / Ctrl+V
    #[default]
    Standard,
    /// The application misbehaves; leave it alone
    Ignore,
    /// Terminal-style Ctrl+Insert / Shift+Insert
    CtrlInsert,
    /// macOS terminal: Command+C / Command+V, since Control+C interrupts
    Terminal,
}

/// Executables that need special treatment (compared case-insensitively)
const EXE_SPECIAL_HANDLING: &[(&str, SpecialHandling)] = &[
    ("putty.exe", SpecialHandling::Ignore),
    ("kitty.exe", SpecialHandling::Ignore),
    ("mintty.exe", SpecialHandling::CtrlInsert),
];

/// Window classes (bundle ids on macOS) that need special treatment
const CLASS_SPECIAL_HANDLING: &[(&str, SpecialHandling)] = &[
    // classic console windows only understand the Insert chords
    ("ConsoleWindowClass", SpecialHandling::CtrlInsert),
    ("com.apple.Terminal", SpecialHandling::Terminal),
    ("com.googlecode.iterm2", SpecialHandling::Terminal),
    ("net.kovidgoyal.kitty", SpecialHandling::Terminal),
    ("org.alacritty", SpecialHandling::Terminal),
    ("com.mitchellh.ghostty", SpecialHandling::Terminal),
    ("com.github.wez.wezterm", SpecialHandling::Terminal),
];

impl SpecialHandling {
    /// Decide from the owner process name and window class
    ///
    /// `process` may be a full path; only its last component counts.
    /// The executable list takes precedence over the window class.
    pub fn classify(process: Option<&str>, class: Option<&str>) -> Self {
        if let Some(process) = process {
            let exe = process.rsplit(['/', '\\']).next().unwrap_or(process);
            let hit = EXE_SPECIAL_HANDLING
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(exe));
            if let Some((_, handling)) = hit {
                return *handling;
            }
        }

        class
            .and_then(|class| {
                CLASS_SPECIAL_HANDLING
                    .iter()
                    .find(|(name, _)| name.eq_ignore_ascii_case(class))
            })
            .map(|(_, handling)| *handling)
            .unwrap_or(SpecialHandling::Standard)
    }

    /// Query the host about `window` and classify it
    ///
    /// Failed lookups count as "no information", not as errors.
    pub fn for_window(host: &dyn Host, window: WindowId) -> Self {
        let process = host
            .owner_process_name(window)
            .map_err(|e| warn!(%e, window, "owner process lookup failed"))
            .ok();
        let class = host
            .window_class(window)
            .map_err(|e| warn!(%e, window, "window class lookup failed"))
            .ok();

        let handling = Self::classify(process.as_deref(), class.as_deref());
        debug!(?process, ?class, ?handling, "special handling");
        handling
    }

    /// (modifier, key) that copies the selection
    pub fn copy_chord(self) -> Option<(Key, Key)> {
        match self {
            SpecialHandling::Standard => Some((Key::Control, Key::C)),
            SpecialHandling::CtrlInsert => Some((Key::Control, Key::Insert)),
            SpecialHandling::Terminal => Some((Key::LeftMeta, Key::C)),
            SpecialHandling::Ignore => None,
        }
    }

    /// (modifier, key) that pastes over the selection
    pub fn paste_chord(self) -> Option<(Key, Key)> {
        match self {
            SpecialHandling::Standard => Some((Key::Control, Key::V)),
            SpecialHandling::CtrlInsert => Some((Key::Shift, Key::Insert)),
            SpecialHandling::Terminal => Some((Key::LeftMeta, Key::V)),
            SpecialHandling::Ignore => None,
        }
    }
}
