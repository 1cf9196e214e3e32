//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::SwitchTable;

/// Requests from a second invocation to the running daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Ping to check connectivity
    Ping,

    /// Request current daemon status
    GetStatus,

    /// Stop reacting to double taps
    Pause,

    /// React to double taps again
    Resume,

    /// Exit the daemon
    Shutdown,
}

/// Responses from the daemon
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Pong response to ping
    Pong,

    /// Current daemon status
    Status(DaemonStatus),

    Paused,

    Resumed,

    ShuttingDown,

    /// Error response
    Error { code: String, message: String },
}

/// One registered switch as reported by status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchStatus {
    pub key: String,
    pub target: String,
}

/// Full daemon status snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Switch detection paused
    pub paused: bool,

    /// A transliteration is in flight
    pub busy: bool,

    pub tap_timeout_ms: u32,

    pub switches: Vec<SwitchStatus>,

    /// Uptime in seconds
    pub uptime_secs: u64,

    /// How the daemon was started
    pub command_line: String,
}

impl DaemonStatus {
    pub fn new(switches: &SwitchTable, tap_timeout_ms: u32, command_line: &str) -> Self {
        Self {
            switches: switches
                .iter()
                .map(|s| SwitchStatus {
                    key: s.key.to_string(),
                    target: s.target.to_string(),
                })
                .collect(),
            tap_timeout_ms,
            command_line: command_line.to_string(),
            ..Self::default()
        }
    }
}

impl Default for DaemonStatus {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            paused: false,
            busy: false,
            tap_timeout_ms: 0,
            switches: Vec::new(),
            uptime_secs: 0,
            command_line: String::new(),
        }
    }
}

impl fmt::Display for DaemonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match (self.paused, self.busy) {
            (true, _) => "paused",
            (false, true) => "running (transliterating)",
            (false, false) => "running",
        };
        writeln!(f, "kbsw {} {}, up {}s", self.version, state, self.uptime_secs)?;
        writeln!(f, "tap timeout: {}ms", self.tap_timeout_ms)?;
        for (idx, switch) in self.switches.iter().enumerate() {
            writeln!(f, "switch {}: {} -> {}", idx, switch.key, switch.target)?;
        }
        write!(f, "command line: {}", self.command_line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let json = serde_json::to_string(&Request::GetStatus).unwrap();
        assert_eq!(json, r#"{"type":"get_status"}"#);
        let req: Request = serde_json::from_str(r#"{"type":"shutdown"}"#).unwrap();
        assert_eq!(req, Request::Shutdown);
    }

    #[test]
    fn test_response_serialization() {
        let resp = Response::Status(DaemonStatus::default());
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains(r#""type":"status""#));
        assert!(json.contains(r#""paused":false"#));

        let json = serde_json::to_string(&Response::ShuttingDown).unwrap();
        assert_eq!(json, r#"{"type":"shutting_down"}"#);
    }

    #[test]
    fn test_status_from_switch_table() {
        let switches = SwitchTable::parse(["LC=409", "RA=HEX"]).unwrap();
        let status = DaemonStatus::new(&switches, 300, "kbsw LC=409 RA=HEX");
        assert_eq!(
            status.switches,
            vec![
                SwitchStatus {
                    key: "LC".into(),
                    target: "409".into()
                },
                SwitchStatus {
                    key: "RA".into(),
                    target: "HEX".into()
                },
            ]
        );

        let text = status.to_string();
        assert!(text.contains("switch 1: RA -> HEX"));
        assert!(text.contains("tap timeout: 300ms"));
    }
}
