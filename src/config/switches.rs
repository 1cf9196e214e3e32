//! The switch table: which key double-tap selects which layout

use tracing::{debug, info};

use crate::hotkey::{Key, UnknownKey};
use crate::layout::{LayoutId, LayoutTarget};

/// Most switches that can be registered
pub const MAX_SWITCHES: usize = 8;

/// Configuration errors, all reported before anything starts
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    UnknownKey(#[from] UnknownKey),

    #[error("key {0} is used by more than one switch")]
    DuplicateKey(Key),

    #[error("key {0} cannot be detected on this platform")]
    UnobservableKey(Key),

    #[error("too many switches, at most {} are supported", MAX_SWITCHES)]
    TooManySwitches,

    #[error("keyboard layout '{0}' is not installed")]
    UnknownLayout(String),

    #[error("no installed layout left to assign to {0}")]
    AutoAssignExhausted(Key),

    #[error("no switches given")]
    NoSwitches,

    #[error("cannot list keyboard layouts: {0}")]
    LayoutList(String),

    #[error("cannot determine the socket path: neither XDG_RUNTIME_DIR nor HOME is set")]
    NoHome,
}

/// One registered switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Switch {
    pub key: Key,
    pub target: LayoutTarget,
}

/// Parse a `KEY[=LAYOUT]` argument
///
/// A missing or empty layout means auto-assign.
pub fn parse_switch(arg: &str) -> Result<Switch, ConfigError> {
    let (key, layout) = match arg.split_once('=') {
        Some((key, layout)) => (key, layout.trim()),
        None => (arg, ""),
    };

    let key: Key = key.trim().parse()?;
    let target = if layout.is_empty() {
        LayoutTarget::AutoAssign
    } else {
        LayoutTarget::parse(layout)
    };

    Ok(Switch { key, target })
}

/// Ordered switches; indices are the switch numbers the detector reports
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwitchTable {
    switches: Vec<Switch>,
}

impl SwitchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from command-line arguments
    pub fn parse<I, S>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table = Self::new();
        for arg in args {
            let switch = parse_switch(arg.as_ref())?;
            table.register(switch.key, switch.target)?;
        }

        if table.is_empty() {
            return Err(ConfigError::NoSwitches);
        }
        Ok(table)
    }

    /// Add a switch, returning its index
    pub fn register(&mut self, key: Key, target: LayoutTarget) -> Result<usize, ConfigError> {
        if self.switches.iter().any(|s| s.key == key) {
            return Err(ConfigError::DuplicateKey(key));
        }
        if self.switches.len() >= MAX_SWITCHES {
            return Err(ConfigError::TooManySwitches);
        }

        self.switches.push(Switch { key, target });
        Ok(self.switches.len() - 1)
    }

    /// Reject trigger keys the platform key source never reports
    pub fn check_keys(&self, observable: impl Fn(Key) -> bool) -> Result<(), ConfigError> {
        match self.switches.iter().find(|s| !observable(s.key)) {
            Some(switch) => Err(ConfigError::UnobservableKey(switch.key)),
            None => Ok(()),
        }
    }

    /// Check explicit layouts against `installed` and fill in auto switches
    ///
    /// Explicit layouts are rewritten to the installed id they match.
    /// Auto switches take, in switch order, the next installed layout that
    /// no other switch names explicitly and no earlier auto switch took.
    pub fn resolve(&mut self, installed: &[LayoutId]) -> Result<(), ConfigError> {
        for switch in &mut self.switches {
            if let LayoutTarget::Layout(wanted) = &switch.target {
                let found = installed
                    .iter()
                    .find(|id| id.matches(wanted.as_str()))
                    .ok_or_else(|| ConfigError::UnknownLayout(wanted.to_string()))?;
                switch.target = LayoutTarget::Layout(found.clone());
            }
        }

        let mut taken: Vec<LayoutId> = self
            .switches
            .iter()
            .filter_map(|s| match &s.target {
                LayoutTarget::Layout(id) => Some(id.clone()),
                _ => None,
            })
            .collect();

        for switch in &mut self.switches {
            if switch.target != LayoutTarget::AutoAssign {
                continue;
            }
            let free = installed
                .iter()
                .find(|id| !taken.contains(id))
                .ok_or(ConfigError::AutoAssignExhausted(switch.key))?;

            debug!(key = %switch.key, layout = %free, "auto-assigned layout");
            taken.push(free.clone());
            switch.target = LayoutTarget::Layout(free.clone());
        }

        for (idx, switch) in self.switches.iter().enumerate() {
            info!(switch = idx, key = %switch.key, target = %switch.target, "switch registered");
        }
        Ok(())
    }

    pub fn get(&self, idx: usize) -> Option<&Switch> {
        self.switches.get(idx)
    }

    /// Trigger keys in switch order
    pub fn triggers(&self) -> Vec<Key> {
        self.switches.iter().map(|s| s.key).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Switch> {
        self.switches.iter()
    }

    pub fn len(&self) -> usize {
        self.switches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.switches.is_empty()
    }
}
