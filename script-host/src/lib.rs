//! Lua script engine host.
//!
//! Loads Lua scripts into isolated interpreter states, calls their
//! functions with typed arguments and coerced results, captures what they
//! print, and runs install / remove / autoload requests from a timer once
//! no script code is running.
//!
//! ```rust,ignore
//! let host = Rc::new(RecordingHost::new());
//! let mut engine = ScriptEngine::new(host.clone(), HostConfig::default())?;
//! let id = engine.load_path("hello.lua")?;
//! engine.invoke(id, ResultKind::Int, "greet", &[ExecArg::Str("world".into())]);
//! ```

pub mod actions;
pub(crate) mod api;
pub mod cli;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod eval;
pub mod host;
pub mod lifecycle;
pub mod output;
pub mod paths;
pub mod script;
pub mod signal;
pub mod timer;
pub mod value;

/// Name of this engine; prefixes its messages and signals.
pub const PLUGIN_NAME: &str = "lua";

/// Global table holding the host API inside every script.
pub const API_TABLE: &str = "weechat";

pub use actions::ActionKind;
pub use api::{WEECHAT_RC_ERROR, WEECHAT_RC_OK, WEECHAT_RC_OK_EAT};
pub use config::HostConfig;
pub use dispatch::{ExecArg, ExecValue, ResultKind, MAX_ARGS};
pub use engine::ScriptEngine;
pub use error::HostError;
pub use host::{Host, Pointer, RecordingHost};
pub use script::{ScriptId, ScriptInfo};
pub use signal::Signal;
pub use value::HashTable;
