//! Unix domain socket server for IPC
//!
//! Answers status queries and forwards pause/resume/shutdown to the
//! switcher. Only one daemon owns the socket at a time.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixListener;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, error, info, warn};

use super::frame::{read_frame, write_frame, FrameError};
use super::protocol::{DaemonStatus, Request, Response};
use crate::events::SwitchEvent;
use crate::switcher::Control;

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    state: Arc<RwLock<ServerState>>,
    control_tx: mpsc::Sender<Control>,
    shutdown_tx: broadcast::Sender<()>,
}

/// Shared server state
struct ServerState {
    status: DaemonStatus,
    start_time: std::time::Instant,
}

impl Server {
    /// Bind the control socket
    pub fn bind(socket_path: &Path, status: DaemonStatus, control_tx: mpsc::Sender<Control>) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            warn!(?socket_path, "removing stale socket");
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        let state = Arc::new(RwLock::new(ServerState {
            status,
            start_time: std::time::Instant::now(),
        }));

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            state,
            control_tx,
            shutdown_tx,
        })
    }

    /// Fold a switcher event into the status snapshot
    pub async fn apply_event(&self, event: &SwitchEvent) {
        let mut state = self.state.write().await;
        let status = &mut state.status;
        match event {
            SwitchEvent::Paused => status.paused = true,
            SwitchEvent::Resumed => status.paused = false,
            SwitchEvent::TransliterationStarted { .. } => status.busy = true,
            SwitchEvent::TransliterationCompleted { .. }
            | SwitchEvent::TransliterationAborted { .. } => status.busy = false,
            SwitchEvent::LayoutRequested { .. } | SwitchEvent::ActivationIgnored { .. } => {}
        }
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let state = Arc::clone(&self.state);
                    let control_tx = self.control_tx.clone();
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, state, control_tx) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client<S>(
        mut stream: S,
        state: Arc<RwLock<ServerState>>,
        control_tx: mpsc::Sender<Control>,
    ) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        loop {
            let request: Request = match read_frame(&mut stream).await {
                Ok(request) => request,
                Err(FrameError::Closed) => {
                    debug!("client disconnected");
                    return Ok(());
                }
                Err(FrameError::TooLarge(len)) => {
                    warn!(len, "message too large, disconnecting");
                    return Ok(());
                }
                Err(e) => return Err(e).context("failed to read request"),
            };

            debug!(?request, "received request");

            let response = Self::process_request(request, &state, &control_tx).await;
            write_frame(&mut stream, &response)
                .await
                .context("failed to send response")?;
        }
    }

    /// Process a request and return a response
    async fn process_request(
        request: Request,
        state: &RwLock<ServerState>,
        control_tx: &mpsc::Sender<Control>,
    ) -> Response {
        let (control, reply) = match request {
            Request::Ping => return Response::Pong,

            Request::GetStatus => {
                let mut state = state.write().await;
                state.status.uptime_secs = state.start_time.elapsed().as_secs();
                return Response::Status(state.status.clone());
            }

            Request::Pause => (Control::Pause, Response::Paused),
            Request::Resume => (Control::Resume, Response::Resumed),
            Request::Shutdown => (Control::Shutdown, Response::ShuttingDown),
        };

        info!(?control, "control request via IPC");
        match control_tx.send(control).await {
            Ok(()) => reply,
            Err(_) => Response::Error {
                code: "unavailable".to_string(),
                message: "the switcher is not running".to_string(),
            },
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}
