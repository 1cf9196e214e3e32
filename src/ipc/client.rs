//! Talking to an already running daemon

use std::io;
use std::path::Path;
use std::time::Duration;

use tokio::net::UnixStream;
use tracing::{debug, warn};

use super::frame::{read_frame, write_frame, FrameError};
use super::protocol::{Request, Response};

/// How long a replaced daemon gets to release the socket
const HANDOVER_TIMEOUT: Duration = Duration::from_secs(1);
const HANDOVER_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("kbsw is not running")]
    NotRunning,

    #[error("cannot reach the running instance: {0}")]
    Io(#[from] io::Error),

    #[error("bad reply from the running instance: {0}")]
    Protocol(#[from] FrameError),
}

/// Send one request and wait for the reply
pub async fn send_request(socket_path: &Path, request: &Request) -> Result<Response, ClientError> {
    let mut stream = match UnixStream::connect(socket_path).await {
        Ok(stream) => stream,
        Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused) => {
            return Err(ClientError::NotRunning);
        }
        Err(e) => return Err(e.into()),
    };

    debug!(?request, "sending request");
    write_frame(&mut stream, request).await?;
    Ok(read_frame(&mut stream).await?)
}

/// Ask a running daemon to exit and wait for it to release the socket
///
/// Returns false if nothing was running.
pub async fn stop_running(socket_path: &Path) -> Result<bool, ClientError> {
    match send_request(socket_path, &Request::Shutdown).await {
        Ok(Response::ShuttingDown) => {}
        Ok(other) => warn!(?other, "unexpected reply to shutdown"),
        Err(ClientError::NotRunning) => return Ok(false),
        Err(e) => return Err(e),
    }

    let waited = tokio::time::timeout(HANDOVER_TIMEOUT, async {
        while socket_path.exists() {
            tokio::time::sleep(HANDOVER_POLL).await;
        }
    })
    .await;

    if waited.is_err() {
        warn!(?socket_path, "previous instance did not release the socket in time");
    }
    Ok(true)
}
