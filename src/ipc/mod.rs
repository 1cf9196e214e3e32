//! IPC module: the single-instance control socket

mod client;
mod frame;
mod protocol;
mod server;

pub use client::{send_request, stop_running, ClientError};
pub use protocol::{DaemonStatus, Request, Response};
pub use server::Server;
