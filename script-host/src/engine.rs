//! The script engine and the state it shares with running scripts.
//!
//! [`ScriptEngine`] is the entry point.  Its state lives in a [`Shared`]
//! behind an `Rc`; functions installed into script contexts hold a `Weak`
//! reference to it, so scripts can write output, register themselves and
//! queue actions while the engine is in the middle of a call.  Borrows of
//! the state are always short and never span a call into Lua or the host.
//!
//! The operations themselves are spread over several modules:
//!
//! | Module                  | Operations                                   |
//! |-------------------------|----------------------------------------------|
//! | [`crate::dispatch`]     | `invoke`                                     |
//! | [`crate::lifecycle`]    | `load`, `unload`, `reload_name`, listings    |
//! | [`crate::eval`]         | `eval`, `eval_to_string`                     |
//! | [`crate::actions`]      | `request_action`, `handle_signal`, timers    |

use std::cell::RefCell;
use std::rc::Rc;

use mlua::prelude::*;
use mlua::{LuaOptions, StdLib};

use crate::actions::ActionQueue;
use crate::config::HostConfig;
use crate::context::ContextStats;
use crate::error::{HostError, Result};
use crate::host::Host;
use crate::output::{split_lines, OutputCapture};
use crate::paths::ScriptDirs;
use crate::script::{ScriptId, ScriptRegistry};
use crate::timer::TimerScheduler;
use crate::PLUGIN_NAME;

// ── Shared state ──────────────────────────────────────────────────────────────

/// A script being loaded, between context creation and registration.
pub(crate) struct LoadSlot {
    pub(crate) filename: String,
    /// Handed to the registry by `register`.
    pub(crate) context: Option<crate::context::Context>,
    pub(crate) registered: Option<ScriptId>,
}

pub(crate) struct EngineState {
    pub(crate) registry: ScriptRegistry,
    /// The script whose context is running, if any.
    pub(crate) active: Option<ScriptId>,
    pub(crate) output: OutputCapture,
    pub(crate) loading: Option<LoadSlot>,
    pub(crate) quiet: bool,
    pub(crate) config: HostConfig,
    pub(crate) actions: ActionQueue,
    pub(crate) timers: TimerScheduler,
    pub(crate) stats: ContextStats,
}

pub(crate) struct Shared {
    pub(crate) host: Rc<dyn Host>,
    pub(crate) state: RefCell<EngineState>,
}

impl Shared {
    pub(crate) fn new(host: Rc<dyn Host>, config: HostConfig) -> Rc<Self> {
        Rc::new(Self {
            host,
            state: RefCell::new(EngineState {
                registry: ScriptRegistry::new(),
                active: None,
                output: OutputCapture::new(),
                loading: None,
                quiet: false,
                config,
                actions: ActionQueue::default(),
                timers: TimerScheduler::new(),
                stats: ContextStats::default(),
            }),
        })
    }

    /// Append script output, flushing after every complete line.
    pub(crate) fn write(&self, text: &str) {
        let (lines, rest) = split_lines(text);
        for line in lines {
            self.state.borrow_mut().output.push(line);
            self.flush();
        }
        if !rest.is_empty() {
            self.state.borrow_mut().output.push(rest);
        }
    }

    /// Deliver the output buffer to the host.
    pub(crate) fn flush(&self) {
        let delivery = {
            let mut st = self.state.borrow_mut();
            let script = st
                .active
                .and_then(|id| st.registry.get(id))
                .map(|s| s.name().to_owned());
            st.output.take_delivery(script.as_deref())
        };
        if let Some(delivery) = delivery {
            delivery.deliver(&*self.host);
        }
    }

    /// Report an error raised by script code, the way the script itself
    /// would have printed it.
    pub(crate) fn report_lua_error(&self, err: &LuaError) {
        tracing::warn!("script error: {err}");
        self.write(&format!("{err}\n"));
    }

    /// Whether informational messages are shown.
    pub(crate) fn verbose(&self) -> bool {
        let st = self.state.borrow();
        !st.quiet || st.config.debug >= 2
    }

    pub(crate) fn info(&self, message: &str) {
        self.host.print(None, &format!("{PLUGIN_NAME}: {message}"));
    }

    pub(crate) fn error(&self, message: &str) {
        tracing::debug!("{message}");
        self.host.print_error(&format!("{PLUGIN_NAME}: {message}"));
    }

    pub(crate) fn dirs(&self) -> ScriptDirs {
        ScriptDirs::new(self.state.borrow().config.home.clone())
    }

    /// Dump every script to the log.
    pub(crate) fn print_log(&self) {
        let st = self.state.borrow();
        tracing::info!("***** {PLUGIN_NAME} scripts: {} *****", st.registry.len());
        for script in st.registry.iter() {
            let info = script.info();
            tracing::info!(
                id = %info.id,
                context = %info.context,
                filename = %info.filename,
                author = %info.author,
                version = %info.version,
                license = %info.license,
                shutdown_func = %info.shutdown_func,
                charset = %info.charset,
                registered = info.registered,
                "[script {}]",
                info.name,
            );
        }
        tracing::info!(
            active = ?st.active,
            created = st.stats.created,
            destroyed = st.stats.destroyed,
            pending_output = st.output.pending().len(),
            "engine state"
        );
    }
}

// ── ScriptEngine ──────────────────────────────────────────────────────────────

/// Hosts Lua scripts for one host application.
pub struct ScriptEngine {
    pub(crate) shared: Rc<Shared>,
    /// The scratch script used by eval, while it is kept loaded.
    pub(crate) eval_script: Option<ScriptId>,
    interpreter: String,
    ended: bool,
}

impl ScriptEngine {
    /// Start an engine.
    ///
    /// Fails when the interpreter cannot be started at all; nothing is
    /// loaded yet (see [`Self::autoload`]).
    pub fn new(host: Rc<dyn Host>, config: HostConfig) -> Result<Self> {
        let probe = Lua::new_with(StdLib::ALL_SAFE, LuaOptions::default())
            .map_err(|e| HostError::Init(format!("unable to launch global interpreter: {e}")))?;
        let interpreter: String = probe
            .globals()
            .get("_VERSION")
            .map_err(|e| HostError::Init(format!("unable to get interpreter version: {e}")))?;
        drop(probe);
        tracing::debug!(%interpreter, home = %config.home.display(), "script engine started");

        Ok(Self {
            shared: Shared::new(host, config),
            eval_script: None,
            interpreter,
            ended: false,
        })
    }

    /// Interpreter name and version, e.g. `Lua 5.4`.
    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }

    pub fn host(&self) -> Rc<dyn Host> {
        Rc::clone(&self.shared.host)
    }

    pub fn config(&self) -> HostConfig {
        self.shared.state.borrow().config.clone()
    }

    pub fn set_eval_keep_context(&mut self, keep: bool) {
        self.shared.state.borrow_mut().config.eval_keep_context = keep;
    }

    pub fn set_check_license(&mut self, check: bool) {
        self.shared.state.borrow_mut().config.check_license = check;
    }

    /// Set quiet mode, returning the previous setting.
    ///
    /// Quiet mode hides informational messages; errors are always shown.
    pub fn set_quiet(&self, quiet: bool) -> bool {
        std::mem::replace(&mut self.shared.state.borrow_mut().quiet, quiet)
    }

    pub fn is_quiet(&self) -> bool {
        self.shared.state.borrow().quiet
    }

    /// The script whose context is active right now.
    pub fn current_script(&self) -> Option<ScriptId> {
        self.shared.state.borrow().active
    }

    pub fn context_stats(&self) -> ContextStats {
        self.shared.state.borrow().stats
    }

    /// Output written but not flushed yet.
    pub fn pending_output(&self) -> String {
        self.shared.state.borrow().output.pending().to_owned()
    }

    /// Script directories under the configured home.
    pub fn dirs(&self) -> ScriptDirs {
        self.shared.dirs()
    }

    /// Dump the engine state to the log.
    pub fn print_log(&self) {
        self.shared.print_log();
    }

    /// Unload everything: the eval script first, then every script.
    ///
    /// Pending actions are dropped.  Called on drop if not called before.
    pub fn end(&mut self) {
        if self.ended {
            return;
        }
        self.set_quiet(true);
        if let Some(id) = self.eval_script.take() {
            let _ = self.unload(id);
        }
        self.unload_all();
        let mut st = self.shared.state.borrow_mut();
        st.actions.clear();
        st.timers.clear();
        st.quiet = false;
        self.ended = true;
        tracing::debug!("script engine ended");
    }
}

impl Drop for ScriptEngine {
    fn drop(&mut self) {
        self.end();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
