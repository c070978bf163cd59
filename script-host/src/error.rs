//! Error types for the script host.
//!
//! Most failures are also reported to the user through [`crate::host::Host`];
//! the variants here let embedders match on what went wrong.

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by [`crate::engine::ScriptEngine`] operations.
#[derive(Debug, Error)]
pub enum HostError {
    /// The interpreter could not be started or queried at engine creation.
    #[error("unable to initialize interpreter: {0}")]
    Init(String),

    /// A fresh isolated context could not be created for a script.
    #[error("unable to create new interpreter context: {0}")]
    Context(#[source] mlua::Error),

    /// A script file could not be read, moved or removed.
    #[error("{}: {source}", path.display())]
    Io {
        /// Path of the file involved.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The script source failed to compile or raised while running.
    #[error("error in script \"{filename}\": {message}")]
    Source {
        filename: String,
        message: String,
    },

    /// The script ran but never registered itself.
    #[error("function \"register\" not found (or failed) in file \"{0}\"")]
    NotRegistered(String),

    /// No loaded script has this name.
    #[error("script \"{0}\" not loaded")]
    NotLoaded(String),

    /// The scratch evaluation script could not be loaded.
    #[error("unable to evaluate code: {0}")]
    Eval(String),

    /// The configuration file could not be read.
    #[error("config: {0}")]
    Config(String),
}

impl HostError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HostError::Io { path: path.into(), source }
    }
}

pub type Result<T, E = HostError> = std::result::Result<T, E>;
