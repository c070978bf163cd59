//! Loading, unloading and listing scripts.
//!
//! A load runs the script source in a fresh context.  The script must call
//! `weechat.register(...)` while it runs; that moves it into the registry.
//! Whatever goes wrong, the context is destroyed and the registry is left
//! as it was.

use std::borrow::Cow;
use std::path::Path;
use std::rc::Rc;

use crate::context::{self, Context, ContextGuard};
use crate::dispatch::ResultKind;
use crate::engine::{LoadSlot, ScriptEngine};
use crate::error::{HostError, Result};
use crate::script::{ScriptId, ScriptInfo};
use crate::signal::Signal;
use crate::PLUGIN_NAME;

/// Steps of one load, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    ContextCreated,
    RunningSource,
    AwaitingRegistration,
    Registered,
    Failed,
}

fn chunk_name(filename: &str) -> String {
    format!("@{filename}")
}

impl ScriptEngine {
    /// Load a script from `filename`, or from `code` when given (then
    /// `filename` only names it).
    pub fn load(&mut self, filename: &str, code: Option<&str>) -> Result<ScriptId> {
        let shared = Rc::clone(&self.shared);

        let source: Cow<'_, [u8]> = match code {
            Some(code) => Cow::Borrowed(code.as_bytes()),
            None => match std::fs::read(filename) {
                Ok(bytes) => Cow::Owned(bytes),
                Err(e) => {
                    shared.error(&format!("script \"{filename}\" not found"));
                    return Err(HostError::io(filename, e));
                }
            },
        };

        if shared.verbose() {
            shared.info(&format!("loading script \"{filename}\""));
        }

        let context = match Context::create(&shared) {
            Ok(context) => context,
            Err(e) => {
                shared.error("unable to create new interpreter context");
                return Err(e);
            }
        };
        trace_state(filename, LoadState::ContextCreated);
        let lua = context.lua();
        shared.state.borrow_mut().loading = Some(LoadSlot {
            filename: filename.to_owned(),
            context: Some(context),
            registered: None,
        });

        trace_state(filename, LoadState::RunningSource);
        let outcome = {
            let _guard = ContextGuard::enter(&shared, None);
            let outcome = lua.load(&*source).set_name(chunk_name(filename)).exec();
            if let Err(e) = &outcome {
                if code.is_some() {
                    shared.error("unable to execute source code");
                } else {
                    shared.error(&format!("unable to parse file \"{filename}\""));
                }
                shared.report_lua_error(e);
            }
            shared.flush();
            outcome
        };
        drop(lua);
        trace_state(filename, LoadState::AwaitingRegistration);

        let slot = shared.state.borrow_mut().loading.take();
        let Some(slot) = slot else {
            return Err(HostError::NotRegistered(filename.to_owned()));
        };

        match (outcome, slot.registered) {
            (Err(e), registered) => {
                trace_state(filename, LoadState::Failed);
                if let Some(id) = registered {
                    self.destroy_script(id);
                }
                if let Some(context) = slot.context {
                    context::destroy(&shared, context);
                }
                Err(HostError::Source { filename: filename.to_owned(), message: e.to_string() })
            }
            (Ok(()), None) => {
                trace_state(filename, LoadState::Failed);
                shared.error(&format!(
                    "function \"register\" not found (or failed) in file \"{filename}\""
                ));
                if let Some(context) = slot.context {
                    context::destroy(&shared, context);
                }
                Err(HostError::NotRegistered(filename.to_owned()))
            }
            (Ok(()), Some(id)) => {
                trace_state(filename, LoadState::Registered);
                let name = {
                    let mut st = shared.state.borrow_mut();
                    match st.registry.get_mut(id) {
                        Some(script) => {
                            script.registered = true;
                            script.name().to_owned()
                        }
                        None => String::new(),
                    }
                };
                shared.host.set_buffer_callbacks(&name);
                shared.host.signal_send(Signal::ScriptLoaded.name(), filename);
                Ok(id)
            }
        }
    }

    /// Load a script by name, looking it up in the script directories.
    pub fn load_path(&mut self, name: &str) -> Result<ScriptId> {
        let path = self.dirs().search_path(name);
        self.load(&path.to_string_lossy(), None)
    }

    /// Load every script in the autoload directory, quietly.
    ///
    /// Returns how many loaded.
    pub fn autoload(&mut self) -> usize {
        let scripts = match self.dirs().autoload_scripts() {
            Ok(scripts) => scripts,
            Err(e) => {
                tracing::debug!("no autoload directory: {e}");
                return 0;
            }
        };
        let was_quiet = self.set_quiet(true);
        let loaded = scripts
            .iter()
            .filter(|path| self.load(&path.to_string_lossy(), None).is_ok())
            .count();
        self.set_quiet(was_quiet);
        loaded
    }

    /// Unload one script: shutdown function, teardown, `…_unloaded` signal.
    pub fn unload(&mut self, id: ScriptId) -> Result<()> {
        let found = {
            let st = self.shared.state.borrow();
            st.registry.get(id).map(|s| {
                (s.name().to_owned(), s.filename.clone(), s.shutdown_func().map(str::to_owned))
            })
        };
        let Some((name, filename, shutdown_func)) = found else {
            return Err(HostError::NotLoaded(id.to_string()));
        };

        if self.shared.verbose() {
            self.shared.info(&format!("unloading script \"{name}\""));
        }
        if let Some(function) = shutdown_func {
            let _ = self.invoke(id, ResultKind::Int, &function, &[]);
        }

        self.destroy_script(id);
        if self.eval_script == Some(id) {
            self.eval_script = None;
        }
        self.shared.host.signal_send(Signal::ScriptUnloaded.name(), &filename);
        Ok(())
    }

    pub fn unload_name(&mut self, name: &str) -> Result<()> {
        let Some(id) = self.find(name) else {
            self.shared.error(&format!("script \"{name}\" not loaded"));
            return Err(HostError::NotLoaded(name.to_owned()));
        };
        self.unload(id)?;
        if self.shared.verbose() {
            self.shared.info(&format!("script \"{name}\" unloaded"));
        }
        Ok(())
    }

    /// Unload a script and load it again from the same file.
    pub fn reload_name(&mut self, name: &str) -> Result<ScriptId> {
        let Some(id) = self.find(name) else {
            self.shared.error(&format!("script \"{name}\" not loaded"));
            return Err(HostError::NotLoaded(name.to_owned()));
        };
        let filename = self
            .script(id)
            .map(|info| info.filename)
            .ok_or_else(|| HostError::NotLoaded(name.to_owned()))?;
        self.unload(id)?;
        if self.shared.verbose() {
            self.shared.info(&format!("script \"{name}\" unloaded"));
        }
        self.load(&filename, None)
    }

    /// Unload every script, oldest first.
    pub fn unload_all(&mut self) {
        loop {
            let head = self.shared.state.borrow().registry.first();
            match head {
                Some(id) if self.unload(id).is_ok() => {}
                _ => break,
            }
        }
    }

    /// Take a script out of the registry and close its context.
    ///
    /// Finalizers run first, with the script still registered and active,
    /// so what they print is attributed to it.  Afterwards, if it was
    /// active, the script loaded before it (else after it) becomes active.
    pub(crate) fn destroy_script(&self, id: ScriptId) {
        let lua = self.shared.state.borrow().registry.get(id).map(|s| s.context.lua());
        let Some(lua) = lua else { return };
        {
            let _guard = ContextGuard::enter(&self.shared, Some(id));
            if let Err(e) = context::release(&lua) {
                tracing::warn!(script = %id, "unable to release context: {e}");
            }
            self.shared.flush();
        }
        drop(lua);

        let script = {
            let mut st = self.shared.state.borrow_mut();
            let st = &mut *st;
            let next_active = if st.active == Some(id) { st.registry.neighbour(id) } else { st.active };
            let script = st.registry.remove(id);
            st.active = next_active;
            script
        };
        if let Some(script) = script {
            context::destroy(&self.shared, script.context);
            self.shared.flush();
        }
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub fn find(&self, name: &str) -> Option<ScriptId> {
        self.shared.state.borrow().registry.find(name)
    }

    pub fn script(&self, id: ScriptId) -> Option<ScriptInfo> {
        self.shared.state.borrow().registry.get(id).map(|s| s.info())
    }

    /// Every loaded script, oldest first.
    pub fn scripts(&self) -> Vec<ScriptInfo> {
        self.shared.state.borrow().registry.iter().map(|s| s.info()).collect()
    }

    /// Names for completion.
    pub fn script_names(&self) -> Vec<String> {
        self.shared.state.borrow().registry.iter().map(|s| s.name().to_owned()).collect()
    }

    pub fn len(&self) -> usize {
        self.shared.state.borrow().registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.state.borrow().registry.is_empty()
    }

    // ── Display ───────────────────────────────────────────────────────────────

    /// Print the scripts whose name contains `filter` (all when `None`).
    pub fn display_list(&self, filter: Option<&str>, full: bool) {
        let host = self.host();
        host.print(None, "");
        host.print(None, &format!("{PLUGIN_NAME} scripts loaded:"));
        let scripts: Vec<ScriptInfo> = self
            .scripts()
            .into_iter()
            .filter(|s| filter.map_or(true, |f| s.name.contains(f)))
            .collect();
        if scripts.is_empty() {
            host.print(None, "  (none)");
        }
        for s in scripts {
            host.print(None, &format!("  {} v{} - {}", s.name, s.version, s.description));
            if full {
                host.print(None, &format!("    file: {}", s.filename));
                host.print(None, &format!("    written by \"{}\", license: {}", s.author, s.license));
            }
        }
    }

    /// One line naming every loaded script; nothing when none are loaded.
    pub fn display_short_list(&self) {
        let names = self.script_names();
        if !names.is_empty() {
            self.host()
                .print(None, &format!("{PLUGIN_NAME} scripts loaded: {}", names.join(", ")));
        }
    }

    pub fn display_interpreter(&self) {
        self.host().print(None, &format!("{PLUGIN_NAME}: {}", self.interpreter()));
    }
}

fn trace_state(filename: &str, state: LoadState) {
    tracing::debug!(script = %Path::new(filename).display(), ?state, "load");
}

// ── Tests ─────────────────────────────────────────────────────────────────────
