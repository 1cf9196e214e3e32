//! Clipboard transliteration state machine
//!
//! Captures the selection of the focused window through the clipboard,
//! rewrites it for the requested target and pastes it back:
//!
//! ```text
//! Idle -> AwaitingPassiveCopy -> AwaitingSimulatedCopy -> DelayBeforePaste -> Idle
//!                 \______________________________________/
//!                        clipboard changed
//! ```
//!
//! The engine never sleeps. Each state that waits arms a deadline; the
//! owner calls [`Engine::on_timer`] once it passes and
//! [`Engine::on_clipboard_changed`] for every clipboard notification.

use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use super::chord;
use super::special::SpecialHandling;
use crate::events::SwitchEvent;
use crate::host::{Host, HostError, WindowId};
use crate::layout::{codec, detect, transform, KeyMapping, LayoutTarget};

/// How long the target gets to answer the passive copy request
pub const PASSIVE_COPY_TIMEOUT: Duration = Duration::from_millis(100);

/// How long the clipboard may take to change after the copy chord
pub const SIMULATED_COPY_TIMEOUT: Duration = Duration::from_millis(300);

/// Pause between writing the clipboard and pasting it
pub const PASTE_DELAY: Duration = Duration::from_millis(100);

/// Engine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    /// Nothing in flight
    #[default]
    Idle,
    /// Copy requested without synthesized keys
    AwaitingPassiveCopy,
    /// Copy chord sent, waiting for the clipboard to change
    AwaitingSimulatedCopy,
    /// Clipboard rewritten, paste pending
    DelayBeforePaste,
}

impl State {
    /// Deadline armed when entering this state
    fn timeout(self) -> Option<Duration> {
        match self {
            State::Idle => None,
            State::AwaitingPassiveCopy => Some(PASSIVE_COPY_TIMEOUT),
            State::AwaitingSimulatedCopy => Some(SIMULATED_COPY_TIMEOUT),
            State::DelayBeforePaste => Some(PASTE_DELAY),
        }
    }

    fn is_awaiting_copy(self) -> bool {
        matches!(self, State::AwaitingPassiveCopy | State::AwaitingSimulatedCopy)
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            State::Idle => write!(f, "Idle"),
            State::AwaitingPassiveCopy => write!(f, "AwaitingPassiveCopy"),
            State::AwaitingSimulatedCopy => write!(f, "AwaitingSimulatedCopy"),
            State::DelayBeforePaste => write!(f, "DelayBeforePaste"),
        }
    }
}

/// Result of [`Engine::request`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Capture started
    Started,
    /// Another request is in flight; nothing changed
    Busy,
    /// The target window is on the ignore list (or the target is unusable)
    Ignored,
    /// No key table for the target layout, so the text cannot be retyped
    Unmapped,
}

/// The transliteration engine
pub struct Engine {
    state: State,
    /// Set while a request is in flight
    target: Option<LayoutTarget>,
    special: SpecialHandling,
    /// When the request that is in flight was accepted
    started_at: Option<Instant>,
    /// When the current state was entered
    state_entered_at: Option<Instant>,
    deadline: Option<Instant>,
    event_tx: broadcast::Sender<SwitchEvent>,
}

impl Engine {
    pub fn new(event_tx: broadcast::Sender<SwitchEvent>) -> Self {
        Self {
            state: State::Idle,
            target: None,
            special: SpecialHandling::Standard,
            started_at: None,
            state_entered_at: None,
            deadline: None,
            event_tx,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    /// True whenever a request is in flight
    pub fn is_busy(&self) -> bool {
        self.state != State::Idle
    }

    /// When [`Engine::on_timer`] should be called next
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Start transliterating the selection of `window` into `target`
    pub fn request(
        &mut self,
        host: &dyn Host,
        window: WindowId,
        target: LayoutTarget,
        now: Instant,
    ) -> RequestOutcome {
        if self.is_busy() {
            debug!(state = %self.state, "transliteration already in flight");
            return RequestOutcome::Busy;
        }

        match &target {
            LayoutTarget::AutoAssign => {
                warn!("transliteration requested for an unresolved layout");
                return RequestOutcome::Ignored;
            }
            LayoutTarget::Layout(layout) if !host.has_keymap(layout) => {
                warn!(%layout, "no key table for layout, cannot retype into it");
                return RequestOutcome::Unmapped;
            }
            _ => {}
        }

        let special = SpecialHandling::for_window(host, window);
        if special == SpecialHandling::Ignore {
            info!(window, "window ignored for transliteration");
            return RequestOutcome::Ignored;
        }

        info!(window, %target, ?special, "transliteration requested");

        let _ = self.event_tx.send(SwitchEvent::TransliterationStarted {
            target: target.to_string(),
        });

        self.target = Some(target);
        self.special = special;
        self.started_at = Some(now);

        if let Err(e) = host.request_clipboard_copy(window) {
            // the copy chord follows once the deadline passes
            debug!(%e, "passive copy request failed");
        }

        self.transition_to(State::AwaitingPassiveCopy, now);
        RequestOutcome::Started
    }

    /// Handle a clipboard change notification
    ///
    /// Only meaningful while waiting for a copy; a notification in any
    /// other state (including the one caused by our own write) is dropped.
    pub fn on_clipboard_changed(&mut self, host: &dyn Host, now: Instant) {
        if !self.state.is_awaiting_copy() {
            trace!(state = %self.state, "clipboard change ignored");
            return;
        }

        match self.rewrite_clipboard(host) {
            Ok(Some(chars)) => {
                debug!(chars, "clipboard rewritten");
                self.transition_to(State::DelayBeforePaste, now);
            }
            Ok(None) => {
                debug!(state = %self.state, "nothing to transliterate");
            }
            Err(e) => {
                warn!(%e, state = %self.state, "clipboard transliteration failed");
            }
        }
    }

    /// Handle the armed deadline
    ///
    /// Calls before the deadline are no-ops.
    pub fn on_timer(&mut self, host: &dyn Host, now: Instant) {
        let Some(deadline) = self.deadline else {
            return;
        };
        if now < deadline {
            return;
        }

        match self.state {
            State::Idle => {
                self.deadline = None;
            }
            State::AwaitingPassiveCopy => {
                debug!("passive copy timed out, sending copy chord");
                let Some((modifier, key)) = self.special.copy_chord() else {
                    self.abort("no copy chord", now);
                    return;
                };
                match chord::send_chord(host, modifier, key) {
                    Ok(()) => self.transition_to(State::AwaitingSimulatedCopy, now),
                    Err(e) => {
                        warn!(%e, "copy chord failed");
                        self.abort("copy chord failed", now);
                    }
                }
            }
            State::AwaitingSimulatedCopy => {
                info!("clipboard did not change after copy chord");
                self.abort("copy timed out", now);
            }
            State::DelayBeforePaste => {
                let duration_ms = self.elapsed_ms(now);
                let special = self.special;
                self.transition_to(State::Idle, now);

                let pasted = match special.paste_chord() {
                    Some((modifier, key)) => chord::send_chord(host, modifier, key),
                    None => Err(HostError::Unsupported),
                };
                let event = match pasted {
                    Ok(()) => SwitchEvent::TransliterationCompleted { duration_ms },
                    Err(e) => {
                        warn!(%e, "paste chord failed");
                        SwitchEvent::TransliterationAborted {
                            duration_ms,
                            reason: "paste failed".into(),
                        }
                    }
                };
                let _ = self.event_tx.send(event);
            }
        }
    }

    /// Rewrite the clipboard for the pending target
    ///
    /// Returns the number of characters written, or `None` when the text
    /// needs no change.
    fn rewrite_clipboard(&self, host: &dyn Host) -> Result<Option<usize>, HostError> {
        let Some(target) = &self.target else {
            return Ok(None);
        };

        let text = host.read_clipboard_text()?;
        let converted = match target {
            LayoutTarget::HexToUnicode => codec::hex_to_unicode(&text),
            LayoutTarget::UnicodeToHex => codec::unicode_to_hex(&text),
            LayoutTarget::Layout(layout) => {
                let layouts = host.list_installed_layouts()?;
                let Some(source) = detect::detect(&text, layout, &layouts, host) else {
                    return Ok(None);
                };
                if source == *layout {
                    debug!(%layout, "text already in target layout");
                    return Ok(None);
                }
                debug!(%source, %layout, "retyping");
                transform::retype(&text, &source, layout, host)
            }
            LayoutTarget::AutoAssign => return Ok(None),
        };

        host.write_clipboard_text(&converted)?;
        Ok(Some(converted.chars().count()))
    }

    fn abort(&mut self, reason: &str, now: Instant) {
        let duration_ms = self.elapsed_ms(now);
        self.transition_to(State::Idle, now);
        let _ = self.event_tx.send(SwitchEvent::TransliterationAborted {
            duration_ms,
            reason: reason.to_string(),
        });
    }

    fn elapsed_ms(&self, now: Instant) -> u64 {
        self.started_at
            .map(|t| now.saturating_duration_since(t).as_millis() as u64)
            .unwrap_or(0)
    }

    /// Perform a state transition and arm the new state's deadline
    fn transition_to(&mut self, new_state: State, now: Instant) {
        let old_state = self.state;
        let duration_ms = self
            .state_entered_at
            .map(|t| now.saturating_duration_since(t).as_millis() as u64)
            .unwrap_or(0);

        info!(
            from = %old_state,
            to = %new_state,
            duration_ms = duration_ms,
            "state transition"
        );

        self.state = new_state;
        self.deadline = new_state.timeout().map(|t| now + t);

        if new_state == State::Idle {
            self.state_entered_at = None;
            self.started_at = None;
            self.target = None;
        } else {
            self.state_entered_at = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::mock::{HostCall, MockHost};
    use crate::hotkey::{Key, KeyAction};
    use crate::layout::LayoutId;

    fn create_engine() -> (Engine, broadcast::Receiver<SwitchEvent>) {
        let (tx, rx) = broadcast::channel(16);
        (Engine::new(tx), rx)
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn ru() -> LayoutTarget {
        LayoutTarget::Layout(LayoutId::new("ru"))
    }

    fn chord(modifier: Key, key: Key) -> HostCall {
        HostCall::Keys(vec![
            KeyAction::press(modifier),
            KeyAction::press(key),
            KeyAction::release(key),
            KeyAction::release(modifier),
        ])
    }

    #[test]
    fn test_initial_state() {
        let (engine, _) = create_engine();
        assert_eq!(engine.state(), State::Idle);
        assert!(!engine.is_busy());
        assert_eq!(engine.deadline(), None);
    }

    #[test]
    fn test_request_starts_passive_copy() {
        let (mut engine, mut rx) = create_engine();
        let host = MockHost::new();
        let t0 = Instant::now();

        let outcome = engine.request(&host, 7, ru(), t0);
        assert_eq!(outcome, RequestOutcome::Started);
        assert_eq!(engine.state(), State::AwaitingPassiveCopy);
        assert_eq!(engine.deadline(), Some(t0 + PASSIVE_COPY_TIMEOUT));
        assert_eq!(host.calls(), vec![HostCall::CopyRequest(7)]);
        assert_eq!(
            rx.try_recv().unwrap(),
            SwitchEvent::TransliterationStarted { target: "ru".into() }
        );
    }

    #[test]
    fn test_request_while_busy() {
        let (mut engine, _) = create_engine();
        let host = MockHost::new();
        let t0 = Instant::now();

        engine.request(&host, 7, ru(), t0);
        let outcome = engine.request(&host, 7, LayoutTarget::HexToUnicode, t0 + ms(10));
        assert_eq!(outcome, RequestOutcome::Busy);
        assert_eq!(engine.state(), State::AwaitingPassiveCopy);
        assert_eq!(engine.deadline(), Some(t0 + PASSIVE_COPY_TIMEOUT));
        assert_eq!(engine.target, Some(ru()));
        assert_eq!(host.calls().len(), 1);
    }

    #[test]
    fn test_ignored_application() {
        let (mut engine, _) = create_engine();
        let mut host = MockHost::new();
        host.process_name = "putty.exe".into();

        let outcome = engine.request(&host, 7, ru(), Instant::now());
        assert_eq!(outcome, RequestOutcome::Ignored);
        assert_eq!(engine.state(), State::Idle);
        assert!(host.calls().is_empty());
    }

    #[test]
    fn test_layout_without_key_table_is_refused() {
        let (mut engine, mut rx) = create_engine();
        let mut host = MockHost::new();
        host.layouts = vec![LayoutId::new("com.apple.keylayout.French"), LayoutId::new("us")];
        host.set_clipboard("qzerty");

        let french = LayoutTarget::Layout(LayoutId::new("com.apple.keylayout.French"));
        let outcome = engine.request(&host, 7, french, Instant::now());

        assert_eq!(outcome, RequestOutcome::Unmapped);
        assert!(!engine.is_busy());
        assert!(host.calls().is_empty());
        assert_eq!(host.clipboard().as_deref(), Some("qzerty"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_passive_copy_then_paste() {
        let (mut engine, mut rx) = create_engine();
        let host = MockHost::new();
        let t0 = Instant::now();

        engine.request(&host, 7, ru(), t0);
        host.set_clipboard("ghbdtn");
        engine.on_clipboard_changed(&host, t0 + ms(20));

        assert_eq!(host.clipboard().as_deref(), Some("привет"));
        assert_eq!(engine.state(), State::DelayBeforePaste);
        assert_eq!(engine.deadline(), Some(t0 + ms(20) + PASTE_DELAY));

        // not yet
        engine.on_timer(&host, t0 + ms(119));
        assert_eq!(engine.state(), State::DelayBeforePaste);

        host.clear_calls();
        engine.on_timer(&host, t0 + ms(120));
        assert_eq!(engine.state(), State::Idle);
        assert_eq!(engine.deadline(), None);
        assert_eq!(host.calls(), vec![chord(Key::Control, Key::V)]);

        let _started = rx.try_recv().unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            SwitchEvent::TransliterationCompleted { duration_ms: 120 }
        );
    }

    #[test]
    fn test_simulated_copy_path() {
        let (mut engine, _) = create_engine();
        let host = MockHost::new();
        let t0 = Instant::now();

        engine.request(&host, 7, LayoutTarget::HexToUnicode, t0);
        host.clear_calls();

        engine.on_timer(&host, t0 + PASSIVE_COPY_TIMEOUT);
        assert_eq!(engine.state(), State::AwaitingSimulatedCopy);
        assert_eq!(host.calls(), vec![chord(Key::Control, Key::C)]);
        assert_eq!(
            engine.deadline(),
            Some(t0 + PASSIVE_COPY_TIMEOUT + SIMULATED_COPY_TIMEOUT)
        );

        host.set_clipboard("U+0040");
        engine.on_clipboard_changed(&host, t0 + ms(150));
        assert_eq!(host.clipboard().as_deref(), Some("@"));
        assert_eq!(engine.state(), State::DelayBeforePaste);
    }

    #[test]
    fn test_simulated_copy_timeout() {
        let (mut engine, mut rx) = create_engine();
        let host = MockHost::new();
        let t0 = Instant::now();

        engine.request(&host, 7, ru(), t0);
        engine.on_timer(&host, t0 + ms(100));
        host.clear_calls();

        engine.on_timer(&host, t0 + ms(399));
        assert_eq!(engine.state(), State::AwaitingSimulatedCopy);

        engine.on_timer(&host, t0 + ms(400));
        assert_eq!(engine.state(), State::Idle);
        assert!(host.calls().is_empty());

        let _started = rx.try_recv().unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            SwitchEvent::TransliterationAborted {
                duration_ms: 400,
                reason: "copy timed out".into(),
            }
        );
    }

    #[test]
    fn test_copy_chord_failure_returns_to_idle() {
        let (mut engine, _) = create_engine();
        let mut host = MockHost::new();
        host.fail_keys = true;
        let t0 = Instant::now();

        engine.request(&host, 7, ru(), t0);
        engine.on_timer(&host, t0 + ms(100));
        assert_eq!(engine.state(), State::Idle);
    }

    #[test]
    fn test_console_uses_insert_chords() {
        let (mut engine, _) = create_engine();
        let mut host = MockHost::new();
        host.class_name = "ConsoleWindowClass".into();
        let t0 = Instant::now();

        engine.request(&host, 7, LayoutTarget::UnicodeToHex, t0);
        host.clear_calls();
        engine.on_timer(&host, t0 + ms(100));
        assert_eq!(host.calls(), vec![chord(Key::Control, Key::Insert)]);

        host.set_clipboard("@");
        engine.on_clipboard_changed(&host, t0 + ms(200));
        assert_eq!(host.clipboard().as_deref(), Some("@=U+40 "));

        host.clear_calls();
        engine.on_timer(&host, t0 + ms(300));
        assert_eq!(host.calls(), vec![chord(Key::Shift, Key::Insert)]);
    }

    #[test]
    fn test_text_already_in_target_layout() {
        let (mut engine, _) = create_engine();
        let host = MockHost::new();
        let t0 = Instant::now();

        engine.request(&host, 7, ru(), t0);
        host.clear_calls();
        host.set_clipboard("привет");
        engine.on_clipboard_changed(&host, t0 + ms(20));

        assert_eq!(engine.state(), State::AwaitingPassiveCopy);
        assert_eq!(engine.deadline(), Some(t0 + PASSIVE_COPY_TIMEOUT));
        assert!(host.calls().is_empty());
    }

    #[test]
    fn test_retype_into_latin() {
        let (mut engine, _) = create_engine();
        let host = MockHost::new();
        let t0 = Instant::now();

        engine.request(&host, 7, LayoutTarget::Layout(LayoutId::new("us")), t0);
        host.set_clipboard("Руддщ цщкдв");
        engine.on_clipboard_changed(&host, t0 + ms(20));
        assert_eq!(host.clipboard().as_deref(), Some("Hello world"));
    }

    #[test]
    fn test_clipboard_failures_keep_waiting() {
        let (mut engine, _) = create_engine();
        let mut host = MockHost::new();
        let t0 = Instant::now();

        // no text on the clipboard
        engine.request(&host, 7, ru(), t0);
        engine.on_clipboard_changed(&host, t0 + ms(10));
        assert_eq!(engine.state(), State::AwaitingPassiveCopy);

        host.fail_layout_list = true;
        host.set_clipboard("ghbdtn");
        engine.on_clipboard_changed(&host, t0 + ms(20));
        assert_eq!(engine.state(), State::AwaitingPassiveCopy);
        assert_eq!(host.clipboard().as_deref(), Some("ghbdtn"));
    }

    #[test]
    fn test_notifications_outside_copy_states() {
        let (mut engine, _) = create_engine();
        let host = MockHost::new();
        let t0 = Instant::now();

        host.set_clipboard("U+0041");
        engine.on_clipboard_changed(&host, t0);
        assert_eq!(engine.state(), State::Idle);
        assert!(host.calls().is_empty());

        engine.request(&host, 7, LayoutTarget::HexToUnicode, t0);
        engine.on_clipboard_changed(&host, t0 + ms(5));
        assert_eq!(engine.state(), State::DelayBeforePaste);
        assert_eq!(host.clipboard().as_deref(), Some("A"));

        // our own write echoes back; it must not be transformed again
        host.set_clipboard("U+0042");
        engine.on_clipboard_changed(&host, t0 + ms(10));
        assert_eq!(engine.state(), State::DelayBeforePaste);
        assert_eq!(host.clipboard().as_deref(), Some("U+0042"));
    }

    #[test]
    fn test_timer_without_deadline() {
        let (mut engine, _) = create_engine();
        let host = MockHost::new();
        engine.on_timer(&host, Instant::now());
        assert_eq!(engine.state(), State::Idle);
        assert!(host.calls().is_empty());
    }

    #[test]
    fn test_auto_assign_is_rejected() {
        let (mut engine, _) = create_engine();
        let host = MockHost::new();
        let outcome = engine.request(&host, 7, LayoutTarget::AutoAssign, Instant::now());
        assert_eq!(outcome, RequestOutcome::Ignored);
        assert!(!engine.is_busy());
    }
}
