//! Main-context dispatcher
//!
//! Receives activations from the hook thread and turns them into layout
//! changes or transliteration requests. Owns the host and the engine, and
//! drives the engine from clipboard notifications and its deadline.

use std::time::Instant;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::config::SwitchTable;
use crate::events::SwitchEvent;
use crate::host::{ClipboardChanged, Host};
use crate::hotkey::{Activation, HookControl, HotkeyEvent};
use crate::layout::LayoutTarget;
use crate::translit::{Engine, RequestOutcome};

/// Messages from the IPC server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Pause,
    Resume,
    Shutdown,
}

/// What an activation led to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationOutcome {
    /// Layout change requested; `transliterating` if the engine started too
    Switched { transliterating: bool },
    /// Engine started without a layout change
    Transliterating,
    /// Nothing happened
    Ignored(&'static str),
}

pub struct Switcher {
    host: Box<dyn Host>,
    engine: Engine,
    switches: SwitchTable,
    hook: HookControl,
    paused: bool,
    /// Drop activations while a fullscreen app is in front
    ignore_fullscreen: bool,
    event_tx: broadcast::Sender<SwitchEvent>,
}

impl Switcher {
    pub fn new(
        host: Box<dyn Host>,
        switches: SwitchTable,
        hook: HookControl,
        ignore_fullscreen: bool,
        event_tx: broadcast::Sender<SwitchEvent>,
    ) -> Self {
        Self {
            host,
            engine: Engine::new(event_tx.clone()),
            switches,
            hook,
            paused: false,
            ignore_fullscreen,
            event_tx,
        }
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_busy(&self) -> bool {
        self.engine.is_busy()
    }

    /// Run until shutdown is requested or the hotkey channel closes
    pub async fn run(
        &mut self,
        mut activations: mpsc::Receiver<HotkeyEvent>,
        mut clipboard: mpsc::Receiver<ClipboardChanged>,
        mut control: mpsc::Receiver<Control>,
    ) {
        info!(switches = self.switches.len(), "switcher started");

        loop {
            let deadline = self.engine.deadline();

            tokio::select! {
                event = activations.recv() => match event {
                    Some(HotkeyEvent::Activated(activation)) => {
                        self.on_activation(activation, Instant::now());
                    }
                    Some(HotkeyEvent::TapDisabled) => {
                        warn!("key tap disabled, events may be missed");
                    }
                    None => {
                        info!("hotkey channel closed");
                        break;
                    }
                },

                Some(ClipboardChanged) = clipboard.recv() => {
                    self.engine.on_clipboard_changed(self.host.as_ref(), Instant::now());
                }

                message = control.recv() => {
                    let keep_running = message.map(|m| self.on_control(m)).unwrap_or(false);
                    if !keep_running {
                        break;
                    }
                }

                _ = wait_for(deadline) => {
                    self.engine.on_timer(self.host.as_ref(), Instant::now());
                }
            }
        }

        info!("switcher stopped");
    }

    /// Dispatch one activation
    pub fn on_activation(&mut self, activation: Activation, now: Instant) -> ActivationOutcome {
        let idx = activation.switch;
        let Some(target) = self.switches.get(idx).map(|s| s.target.clone()) else {
            return self.ignore(idx, "unknown switch");
        };

        // most likely a game, where a double tap is not meant for us
        if self.ignore_fullscreen && self.fullscreen_app_running() {
            return self.ignore(idx, "fullscreen");
        }

        if self.engine.is_busy() {
            return self.ignore(idx, "busy");
        }

        let window = match self.host.focused_window() {
            Ok(window) => window,
            Err(e) => {
                warn!(%e, "focused window lookup failed");
                return self.ignore(idx, "no focused window");
            }
        };

        debug!(switch = idx, window, %target, modifier_held = activation.modifier_held, "activation");

        match target {
            LayoutTarget::HexToUnicode | LayoutTarget::UnicodeToHex => {
                let direction = if activation.modifier_held {
                    LayoutTarget::UnicodeToHex
                } else {
                    LayoutTarget::HexToUnicode
                };
                match self.engine.request(self.host.as_ref(), window, direction, now) {
                    RequestOutcome::Started => ActivationOutcome::Transliterating,
                    RequestOutcome::Busy => self.ignore(idx, "busy"),
                    RequestOutcome::Ignored => self.ignore(idx, "window ignored"),
                    RequestOutcome::Unmapped => self.ignore(idx, "no key table"),
                }
            }
            LayoutTarget::Layout(layout) => {
                let transliterating = activation.modifier_held
                    && self.engine.request(
                        self.host.as_ref(),
                        window,
                        LayoutTarget::Layout(layout.clone()),
                        now,
                    ) == RequestOutcome::Started;

                match self.host.request_layout_change(window, &layout) {
                    Ok(()) => {
                        info!(switch = idx, layout = %layout, "layout change requested");
                        let _ = self.event_tx.send(SwitchEvent::LayoutRequested {
                            switch: idx,
                            layout: layout.to_string(),
                        });
                        ActivationOutcome::Switched { transliterating }
                    }
                    Err(e) => {
                        warn!(%e, layout = %layout, "layout change failed");
                        if transliterating {
                            ActivationOutcome::Transliterating
                        } else {
                            self.ignore(idx, "layout change failed")
                        }
                    }
                }
            }
            LayoutTarget::AutoAssign => self.ignore(idx, "unresolved layout"),
        }
    }

    /// Handle a control message; false means stop
    pub fn on_control(&mut self, control: Control) -> bool {
        match control {
            Control::Pause | Control::Resume => {
                let enable = control == Control::Resume;
                if let Err(e) = self.hook.set_enabled(enable) {
                    warn!(%e, "cannot reach the hook thread");
                }
                self.paused = !enable;
                info!(paused = self.paused, "switch detection toggled");
                let event = if enable {
                    SwitchEvent::Resumed
                } else {
                    SwitchEvent::Paused
                };
                let _ = self.event_tx.send(event);
                true
            }
            Control::Shutdown => {
                info!("shutdown requested");
                false
            }
        }
    }

    fn fullscreen_app_running(&self) -> bool {
        self.host.is_fullscreen_app_running().unwrap_or_else(|e| {
            debug!(%e, "fullscreen check failed");
            false
        })
    }

    fn ignore(&self, switch: usize, reason: &'static str) -> ActivationOutcome {
        info!(switch, reason, "activation ignored");
        let _ = self.event_tx.send(SwitchEvent::ActivationIgnored {
            switch,
            reason: reason.to_string(),
        });
        ActivationOutcome::Ignored(reason)
    }
}

/// Sleep until `deadline`, or forever without one
async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline.into()).await,
        None => std::future::pending().await,
    }
}
