//! Events module for switch and transliteration activity
//!
//! Emitted by the switcher and the transliteration engine on a broadcast
//! channel; the IPC server folds them into its status snapshot.

use serde::{Deserialize, Serialize};

/// Events emitted while the daemon runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SwitchEvent {
    /// A layout change was requested for the focused window
    LayoutRequested {
        switch: usize,
        layout: String,
    },

    /// An activation was dropped (busy engine, no focus, ...)
    ActivationIgnored {
        switch: usize,
        reason: String,
    },

    /// The engine started capturing the selection
    TransliterationStarted {
        target: String,
    },

    /// Transformed text was pasted back
    TransliterationCompleted {
        /// Milliseconds from request to paste
        duration_ms: u64,
    },

    /// The engine gave up and returned to idle
    TransliterationAborted {
        duration_ms: u64,
        reason: String,
    },

    /// Switch detection paused
    Paused,

    /// Switch detection resumed
    Resumed,
}

impl std::fmt::Display for SwitchEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwitchEvent::LayoutRequested { switch, layout } => {
                write!(f, "LAYOUT_REQUESTED (switch {}, {})", switch, layout)
            }
            SwitchEvent::ActivationIgnored { switch, reason } => {
                write!(f, "ACTIVATION_IGNORED (switch {}: {})", switch, reason)
            }
            SwitchEvent::TransliterationStarted { target } => {
                write!(f, "TRANSLITERATION_STARTED ({})", target)
            }
            SwitchEvent::TransliterationCompleted { duration_ms } => {
                write!(f, "TRANSLITERATION_COMPLETED ({}ms)", duration_ms)
            }
            SwitchEvent::TransliterationAborted { duration_ms, reason } => {
                write!(f, "TRANSLITERATION_ABORTED ({}ms: {})", duration_ms, reason)
            }
            SwitchEvent::Paused => write!(f, "PAUSED"),
            SwitchEvent::Resumed => write!(f, "RESUMED"),
        }
    }
}
