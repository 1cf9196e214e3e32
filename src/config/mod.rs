//! Configuration loading and management
//!
//! Everything comes from the command line and the environment and lives
//! only as long as the process.

mod switches;

use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;

use crate::hotkey::DEFAULT_TAP_TIMEOUT_MS;

pub use switches::{ConfigError, SwitchTable};

const SOCKET_NAME: &str = "kbsw.sock";

/// Switch keyboard layouts by double-tapping a modifier key
#[derive(Parser, Debug, Clone)]
#[command(name = "kbsw")]
#[command(version)]
#[command(about = "Switch keyboard layouts by double-tapping a modifier key", long_about = None)]
pub struct Cli {
    /// Switches as KEY or KEY=LAYOUT; LAYOUT is a layout id or HEX, omitted means auto
    #[arg(value_name = "KEY[=LAYOUT]")]
    pub switches: Vec<String>,

    /// Longest time between the taps of a double tap
    #[arg(short, long, value_name = "MS", default_value_t = DEFAULT_TAP_TIMEOUT_MS,
          value_parser = clap::value_parser!(u32).range(1..))]
    pub timeout: u32,

    /// Don't report errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Don't ignore activations while a fullscreen app is running
    #[arg(short = 'F', long)]
    pub fullscreen: bool,

    /// Stop the running instance
    #[arg(short = 'x', long)]
    pub exit: bool,

    /// Pause the running instance
    #[arg(short, long)]
    pub pause: bool,

    /// Resume the running instance
    #[arg(short, long)]
    pub resume: bool,

    /// Show the status of the running instance
    #[arg(short, long)]
    pub status: bool,

    /// List installed keyboard layouts
    #[arg(short, long)]
    pub list_layouts: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

/// What this invocation does
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Run,
    Resume,
    Pause,
    ListLayouts,
    Status,
    Exit,
}

impl Cli {
    /// The highest-precedence command given
    pub fn command(&self) -> Command {
        if self.exit {
            Command::Exit
        } else if self.status {
            Command::Status
        } else if self.list_layouts {
            Command::ListLayouts
        } else if self.pause {
            Command::Pause
        } else if self.resume {
            Command::Resume
        } else {
            Command::Run
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    pub tap_timeout_ms: u32,

    /// Drop activations while a fullscreen app (likely a game) is in front
    pub ignore_fullscreen: bool,

    /// The command line this process was started with
    pub command_line: String,
}

impl Config {
    /// Load configuration from the command line and the environment
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let socket_path = socket_path(
            std::env::var_os("XDG_RUNTIME_DIR"),
            std::env::var_os("HOME"),
        )?;

        let command_line = std::env::args().collect::<Vec<_>>().join(" ");

        Ok(Self {
            socket_path,
            tap_timeout_ms: cli.timeout,
            ignore_fullscreen: !cli.fullscreen,
            command_line,
        })
    }
}

/// `$XDG_RUNTIME_DIR/kbsw.sock`, else `$HOME/.local/share/kbsw/kbsw.sock`
fn socket_path(runtime_dir: Option<OsString>, home: Option<OsString>) -> Result<PathBuf, ConfigError> {
    if let Some(dir) = runtime_dir.filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir).join(SOCKET_NAME));
    }

    let home = home.filter(|h| !h.is_empty()).ok_or(ConfigError::NoHome)?;
    Ok(PathBuf::from(home)
        .join(".local")
        .join("share")
        .join("kbsw")
        .join(SOCKET_NAME))
}
