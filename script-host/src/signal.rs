//! Signals the engine sends and listens to.
//!
//! Script signals are prefixed with the plugin name (`lua_script_loaded`,
//! …), so one host bus can carry the signals of several script engines.

use std::fmt;
use std::str::FromStr;

use crate::actions::ActionKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Sent after a script loaded; data is its file name.
    ScriptLoaded,
    /// Sent after a script unloaded; data is its file name.
    ScriptUnloaded,
    /// Request: install the comma-separated script files in data.
    ScriptInstall,
    /// Request: remove the comma-separated scripts in data.
    ScriptRemove,
    /// Request: toggle autoload for the comma-separated scripts in data.
    ScriptAutoload,
    /// Request: dump engine state to the log.
    DebugDump,
}

impl Signal {
    pub const ALL: &'static [Signal] = &[
        Signal::ScriptLoaded,
        Signal::ScriptUnloaded,
        Signal::ScriptInstall,
        Signal::ScriptRemove,
        Signal::ScriptAutoload,
        Signal::DebugDump,
    ];

    /// The name used on the signal bus.
    pub fn name(self) -> &'static str {
        match self {
            Signal::ScriptLoaded   => "lua_script_loaded",
            Signal::ScriptUnloaded => "lua_script_unloaded",
            Signal::ScriptInstall  => "lua_script_install",
            Signal::ScriptRemove   => "lua_script_remove",
            Signal::ScriptAutoload => "lua_script_autoload",
            Signal::DebugDump      => "debug_dump",
        }
    }

    /// The deferred action this signal requests, if any.
    pub fn action(self) -> Option<ActionKind> {
        match self {
            Signal::ScriptInstall => Some(ActionKind::Install),
            Signal::ScriptRemove => Some(ActionKind::Remove),
            Signal::ScriptAutoload => Some(ActionKind::Autoload),
            _ => None,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Signal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Signal::ALL
            .iter()
            .copied()
            .find(|sig| sig.name() == s)
            .ok_or_else(|| format!("unknown signal: {s}"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
