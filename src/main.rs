//! kbsw: switch keyboard layouts by double-tapping a modifier key
//!
//! The daemon provides:
//! - Global key tap on a dedicated thread, detecting double taps
//! - Layout switching for the focused window
//! - Clipboard transliteration of the selection (retype in another
//!   layout, or convert to and from `U+XXXX` notation)
//! - IPC socket so a second invocation can pause, resume, query or stop it

mod config;
mod events;
mod host;
mod hotkey;
mod ipc;
mod layout;
mod lifecycle;
mod switcher;
mod translit;

use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Cli, Command, Config, ConfigError, SwitchTable};
use crate::events::SwitchEvent;
use crate::hotkey::HotkeyListener;
use crate::ipc::{DaemonStatus, Request, Response, Server};
use crate::layout::KeyMapping;
use crate::lifecycle::ShutdownSignal;
use crate::switcher::Switcher;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if !cli.quiet {
                eprintln!("kbsw: {e:#}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let config = Config::load(cli)?;
    debug!(?config.socket_path, "configuration loaded");

    match cli.command() {
        Command::Run => run_daemon(cli, config).await,
        Command::Resume => control(&config, Request::Resume, Response::Resumed).await,
        Command::Pause => control(&config, Request::Pause, Response::Paused).await,
        Command::ListLayouts => list_layouts(),
        Command::Status => match ipc::send_request(&config.socket_path, &Request::GetStatus).await? {
            Response::Status(status) => {
                println!("{status}");
                Ok(())
            }
            other => bail!("unexpected reply: {other:?}"),
        },
        Command::Exit => {
            if !ipc::stop_running(&config.socket_path).await? {
                bail!(ipc::ClientError::NotRunning);
            }
            Ok(())
        }
    }
}

/// Send a pause/resume request to the running instance
async fn control(config: &Config, request: Request, expected: Response) -> Result<()> {
    let reply = ipc::send_request(&config.socket_path, &request).await?;
    if reply != expected {
        bail!("unexpected reply: {reply:?}");
    }
    Ok(())
}

fn list_layouts() -> Result<()> {
    let host = host::platform()?;
    for layout in host.list_installed_layouts()? {
        let name = host.layout_name(&layout).unwrap_or_default();
        println!("{layout}\t{name}");
    }
    Ok(())
}

async fn run_daemon(cli: &Cli, config: Config) -> Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "kbsw starting");

    // Configuration errors surface before anything starts
    let mut switches = SwitchTable::parse(&cli.switches)?;
    switches.check_keys(host::can_observe)?;
    let host = host::platform().context("no keyboard backend for this platform")?;
    let installed = host
        .list_installed_layouts()
        .map_err(|e| ConfigError::LayoutList(e.to_string()))?;
    switches.resolve(&installed)?;

    for layout in installed.iter().filter(|layout| !host.has_keymap(layout)) {
        warn!(%layout, "no key table for layout, selections cannot be retyped into it");
    }

    if ipc::stop_running(&config.socket_path).await? {
        info!("replaced the running instance");
    }

    // Hook thread -> switcher
    let (hotkey_tx, hotkey_rx) = mpsc::channel(32);
    // Clipboard watcher -> switcher
    let (clipboard_tx, clipboard_rx) = mpsc::channel(16);
    // IPC server -> switcher
    let (control_tx, control_rx) = mpsc::channel(8);
    // Switcher -> IPC server (status updates)
    let (event_tx, _event_rx) = broadcast::channel::<SwitchEvent>(64);

    let mut listener = HotkeyListener::new(hotkey_tx, switches.triggers(), config.tap_timeout_ms);
    listener
        .start(host::key_source, host::modifier_probe())
        .context("failed to start the key listener - check Accessibility permissions")?;
    info!("hotkey listener started");

    host.watch_clipboard(clipboard_tx)
        .context("failed to watch the clipboard")?;

    let status = DaemonStatus::new(&switches, config.tap_timeout_ms, &config.command_line);
    let server = Server::bind(&config.socket_path, status, control_tx)?;

    let mut switcher = Switcher::new(
        host,
        switches,
        listener.control(),
        config.ignore_fullscreen,
        event_tx.clone(),
    );
    let mut shutdown = ShutdownSignal::new().context("failed to register signal handlers")?;
    let mut event_rx = event_tx.subscribe();

    info!("daemon initialized, entering main loop");

    tokio::select! {
        _ = switcher.run(hotkey_rx, clipboard_rx, control_rx) => {
            info!("switcher exited");
        }

        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Keep the IPC status snapshot in sync
        _ = async {
            loop {
                match event_rx.recv().await {
                    Ok(event) => {
                        debug!(%event, "switch event");
                        server.apply_event(&event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "switch event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("event handler exited");
        }

        _ = shutdown.wait() => {
            info!("shutdown signal received");
        }
    }

    info!("shutting down...");

    listener.stop();
    server.shutdown().await;

    info!("kbsw stopped");

    Ok(())
}
