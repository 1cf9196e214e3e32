//! Dedicated input-hook thread
//!
//! Owns the platform key tap and the `SwitchDetector`. Raw events never
//! leave this thread; only completed activations are forwarded to the main
//! context, and forwarding never blocks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

use super::detector::{Activation, KeyEvent, ModifierProbe, SwitchDetector};
use super::keys::Key;

/// How long a key source may wait for events before the loop checks
/// for commands and shutdown
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long `start` waits for the tap to come up
const STARTUP_TIMEOUT: Duration = Duration::from_secs(1);

/// Events sent from the hook thread to the main context
#[derive(Debug, Clone)]
pub enum HotkeyEvent {
    /// A switch was double-tapped
    Activated(Activation),
    /// The OS disabled the key tap
    TapDisabled,
}

/// Commands sent from the main context to the hook thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookCommand {
    /// Pause (false) or resume (true) the switch detector
    SetEnabled(bool),
}

/// Platform key tap, created and polled on the hook thread
pub trait KeySource {
    /// Wait up to `timeout` and append whatever key events arrived
    fn poll(&mut self, timeout: Duration, events: &mut Vec<KeyEvent>) -> Result<(), HotkeyError>;

    /// True if the OS turned the tap off since the last call
    fn take_disabled(&mut self) -> bool {
        false
    }
}

/// Builds the key source on the hook thread itself
pub type KeySourceFactory = fn() -> Result<Box<dyn KeySource>, HotkeyError>;

/// Sending half of the command channel into the hook thread
#[derive(Debug, Clone)]
pub struct HookControl {
    tx: std_mpsc::Sender<HookCommand>,
}

impl HookControl {
    pub(crate) fn new(tx: std_mpsc::Sender<HookCommand>) -> Self {
        Self { tx }
    }

    /// Pause or resume switch detection
    pub fn set_enabled(&self, enabled: bool) -> Result<(), HotkeyError> {
        self.tx
            .send(HookCommand::SetEnabled(enabled))
            .map_err(|_| HotkeyError::ChannelSend)
    }
}

/// Global key listener running the switch detector on its own thread
pub struct HotkeyListener {
    event_tx: mpsc::Sender<HotkeyEvent>,
    command_tx: std_mpsc::Sender<HookCommand>,
    command_rx: Option<std_mpsc::Receiver<HookCommand>>,
    detector: Option<SwitchDetector>,
    running: Arc<AtomicBool>,
}

impl HotkeyListener {
    /// Create a new listener for the given trigger keys
    pub fn new(event_tx: mpsc::Sender<HotkeyEvent>, triggers: Vec<Key>, tap_timeout_ms: u32) -> Self {
        let (command_tx, command_rx) = std_mpsc::channel();
        Self {
            event_tx,
            command_tx,
            command_rx: Some(command_rx),
            detector: Some(SwitchDetector::new(triggers, tap_timeout_ms)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Handle for pausing and resuming the detector
    pub fn control(&self) -> HookControl {
        HookControl::new(self.command_tx.clone())
    }

    /// Start the hook thread
    ///
    /// The key source is built on the new thread; this waits until it is
    /// up (or failed) so a missing tap is reported to the caller.
    pub fn start(
        &mut self,
        make_source: KeySourceFactory,
        probe: Box<dyn ModifierProbe + Send>,
    ) -> Result<(), HotkeyError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(HotkeyError::AlreadyRunning);
        }

        let (Some(detector), Some(commands)) = (self.detector.take(), self.command_rx.take()) else {
            self.running.store(false, Ordering::SeqCst);
            return Err(HotkeyError::AlreadyRunning);
        };

        let event_tx = self.event_tx.clone();
        let running = Arc::clone(&self.running);
        let (ready_tx, ready_rx) = std_mpsc::sync_channel(1);

        let spawned = thread::Builder::new()
            .name("hotkey-listener".to_string())
            .spawn(move || {
                let source = match make_source() {
                    Ok(source) => {
                        let _ = ready_tx.send(Ok(()));
                        source
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        running.store(false, Ordering::SeqCst);
                        return;
                    }
                };

                info!("hotkey listener thread started");

                let mut hook = HookLoop {
                    source,
                    detector,
                    probe,
                    commands,
                    event_tx,
                };
                if let Err(e) = hook.run(&running) {
                    error!(?e, "hotkey listener error");
                }

                running.store(false, Ordering::SeqCst);
                info!("hotkey listener thread stopped");
            });

        if let Err(e) = spawned {
            self.running.store(false, Ordering::SeqCst);
            return Err(HotkeyError::ThreadSpawn(e.to_string()));
        }

        match ready_rx.recv_timeout(STARTUP_TIMEOUT) {
            Ok(result) => result,
            Err(_) => {
                self.running.store(false, Ordering::SeqCst);
                Err(HotkeyError::StartupTimeout)
            }
        }
    }

    /// Stop the hook thread; it exits within one poll interval
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the listener is currently running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// Errors that can occur in the hotkey listener
#[derive(Debug, thiserror::Error)]
pub enum HotkeyError {
    #[error("hotkey listener is already running")]
    AlreadyRunning,

    #[error("failed to create the key tap: {0}")]
    TapCreation(String),

    #[error("key capture is not supported on this platform")]
    Unsupported,

    #[error("failed to spawn listener thread: {0}")]
    ThreadSpawn(String),

    #[error("key tap did not come up in time")]
    StartupTimeout,

    #[error("failed to send command to the hook thread")]
    ChannelSend,
}

/// State owned by the hook thread
struct HookLoop {
    source: Box<dyn KeySource>,
    detector: SwitchDetector,
    probe: Box<dyn ModifierProbe + Send>,
    commands: std_mpsc::Receiver<HookCommand>,
    event_tx: mpsc::Sender<HotkeyEvent>,
}

impl HookLoop {
    fn run(&mut self, running: &AtomicBool) -> Result<(), HotkeyError> {
        let mut batch = Vec::new();

        while running.load(Ordering::SeqCst) {
            self.source.poll(POLL_INTERVAL, &mut batch)?;
            if !self.step(&mut batch) {
                return Ok(());
            }
        }

        Ok(())
    }

    /// Handle one polled batch; false once the main context is gone
    ///
    /// Keys in the batch arrived before any command still queued, so they
    /// are classified under the old enabled state.
    fn step(&mut self, batch: &mut Vec<KeyEvent>) -> bool {
        for event in batch.drain(..) {
            if let Some(activation) = self.detector.on_key_event(event, self.probe.as_ref()) {
                if !self.forward(HotkeyEvent::Activated(activation)) {
                    return false;
                }
            }
        }

        while let Ok(command) = self.commands.try_recv() {
            match command {
                HookCommand::SetEnabled(enabled) => self.detector.set_enabled(enabled),
            }
        }

        if self.source.take_disabled() {
            warn!("key tap disabled by the OS");
            if !self.forward(HotkeyEvent::TapDisabled) {
                return false;
            }
        }

        true
    }

    /// Returns false once the main context is gone
    fn forward(&self, event: HotkeyEvent) -> bool {
        match self.event_tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(event)) => {
                warn!(?event, "main context lagging, dropping hotkey event");
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!("hotkey channel closed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hotkey::keys::ModifierSet;

    /// Replays a fixed script once, then idles
    struct ScriptedSource {
        script: Vec<KeyEvent>,
    }

    impl KeySource for ScriptedSource {
        fn poll(&mut self, timeout: Duration, events: &mut Vec<KeyEvent>) -> Result<(), HotkeyError> {
            if self.script.is_empty() {
                thread::sleep(timeout.min(Duration::from_millis(5)));
            }
            events.append(&mut self.script);
            Ok(())
        }
    }

    fn scripted_double_tap() -> Result<Box<dyn KeySource>, HotkeyError> {
        let key = Key::RightCtrl;
        Ok(Box::new(ScriptedSource {
            script: vec![
                KeyEvent::down(key, 0),
                KeyEvent::up(key, 50),
                KeyEvent::down(key, 120),
                KeyEvent::up(key, 160),
            ],
        }))
    }

    fn no_tap() -> Result<Box<dyn KeySource>, HotkeyError> {
        Err(HotkeyError::TapCreation("denied".into()))
    }

    #[test]
    fn test_listener_creation() {
        let (tx, _rx) = mpsc::channel(32);
        let listener = HotkeyListener::new(tx, vec![Key::RightCtrl], 300);
        assert!(!listener.is_running());
    }

    #[test]
    fn test_activation_reaches_main_context() {
        let (tx, mut rx) = mpsc::channel(32);
        let mut listener = HotkeyListener::new(tx, vec![Key::LeftCtrl, Key::RightCtrl], 300);
        listener
            .start(scripted_double_tap, Box::new(ModifierSet::new()))
            .unwrap();

        match rx.blocking_recv() {
            Some(HotkeyEvent::Activated(activation)) => {
                assert_eq!(activation.switch, 1);
                assert!(!activation.modifier_held);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        listener.stop();
    }

    #[test]
    fn test_tap_failure_is_reported() {
        let (tx, _rx) = mpsc::channel(32);
        let mut listener = HotkeyListener::new(tx, vec![Key::RightCtrl], 300);
        let result = listener.start(no_tap, Box::new(ModifierSet::new()));
        assert!(matches!(result, Err(HotkeyError::TapCreation(_))));
    }

    #[test]
    fn test_double_start_is_rejected() {
        let (tx, _rx) = mpsc::channel(32);
        let mut listener = HotkeyListener::new(tx, vec![Key::RightCtrl], 300);
        listener
            .start(scripted_double_tap, Box::new(ModifierSet::new()))
            .unwrap();
        let again = listener.start(scripted_double_tap, Box::new(ModifierSet::new()));
        assert!(matches!(again, Err(HotkeyError::AlreadyRunning)));
        listener.stop();
    }

    fn hook_loop(
        commands: std_mpsc::Receiver<HookCommand>,
        event_tx: mpsc::Sender<HotkeyEvent>,
    ) -> HookLoop {
        HookLoop {
            source: Box::new(ScriptedSource { script: Vec::new() }),
            detector: SwitchDetector::new(vec![Key::RightCtrl], 300),
            probe: Box::new(ModifierSet::new()),
            commands,
            event_tx,
        }
    }

    #[test]
    fn test_pause_applies_after_keys_already_polled() {
        let (command_tx, commands) = std_mpsc::channel();
        let (tx, mut rx) = mpsc::channel(32);
        let mut hook = hook_loop(commands, tx);

        command_tx.send(HookCommand::SetEnabled(false)).unwrap();
        let key = Key::RightCtrl;
        let mut batch = vec![
            KeyEvent::down(key, 0),
            KeyEvent::up(key, 50),
            KeyEvent::down(key, 120),
            KeyEvent::up(key, 160),
        ];
        assert!(hook.step(&mut batch));
        assert!(batch.is_empty());
        assert!(matches!(rx.try_recv(), Ok(HotkeyEvent::Activated(_))));

        // the pause now holds for later keys
        let mut batch = vec![
            KeyEvent::down(key, 1000),
            KeyEvent::up(key, 1050),
            KeyEvent::down(key, 1120),
            KeyEvent::up(key, 1160),
        ];
        assert!(hook.step(&mut batch));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_step_stops_when_main_context_is_gone() {
        let (_command_tx, commands) = std_mpsc::channel();
        let (tx, rx) = mpsc::channel(32);
        drop(rx);
        let mut hook = hook_loop(commands, tx);

        let key = Key::RightCtrl;
        let mut batch = vec![
            KeyEvent::down(key, 0),
            KeyEvent::up(key, 50),
            KeyEvent::down(key, 120),
            KeyEvent::up(key, 160),
        ];
        assert!(!hook.step(&mut batch));
    }

    #[test]
    fn test_control_after_thread_exit_fails() {
        let (tx, _rx) = mpsc::channel(32);
        let listener = HotkeyListener::new(tx, vec![Key::RightCtrl], 300);
        let control = listener.control();
        drop(listener);
        assert!(matches!(control.set_enabled(false), Err(HotkeyError::ChannelSend)));
    }
}
