//! Isolated interpreter contexts and the active-context guard.
//!
//! Every script owns one [`Context`]: a separate Lua state with the host API
//! and output redirection installed.  Nothing is shared between states, so a
//! global defined by one script is invisible to the others.
//!
//! The engine tracks which script is currently running in its active
//! pointer.  [`ContextGuard`] sets it for the duration of a call and puts the
//! previous value back when dropped, whichever way the call ends.

use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use mlua::prelude::*;
use mlua::{LuaOptions, StdLib};

use crate::api;
use crate::engine::Shared;
use crate::error::HostError;
use crate::script::ScriptId;

/// Serial number of a context, unique within one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx{}", self.0)
    }
}

/// How many contexts an engine created and destroyed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextStats {
    pub created: u64,
    pub destroyed: u64,
}

impl ContextStats {
    /// Contexts currently alive.
    pub fn live(&self) -> u64 {
        self.created - self.destroyed
    }
}

// ── Context ───────────────────────────────────────────────────────────────────

/// One isolated Lua state.
pub struct Context {
    id: ContextId,
    lua: Rc<Lua>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context").field("id", &self.id).finish_non_exhaustive()
    }
}

impl Context {
    /// Create a fresh state with the host API installed.
    pub(crate) fn create(shared: &Rc<Shared>) -> Result<Self, HostError> {
        let lua = Lua::new_with(StdLib::ALL_SAFE, LuaOptions::default())
            .map_err(HostError::Context)?;
        api::install(&lua, Rc::downgrade(shared)).map_err(HostError::Context)?;
        let names = global_names(&lua).map_err(HostError::Context)?;
        lua.set_app_data(Builtins(names));

        let id = {
            let mut st = shared.state.borrow_mut();
            st.stats.created += 1;
            ContextId(st.stats.created)
        };
        tracing::debug!(context = %id, "interpreter context created");
        Ok(Self { id, lua: Rc::new(lua) })
    }

    /// A state with nothing installed, for registry tests.
    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        Self { id: ContextId(0), lua: Rc::new(Lua::new()) }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Handle used to run code in this state.
    ///
    /// Callers drop it before the context is destroyed.
    pub(crate) fn lua(&self) -> Rc<Lua> {
        Rc::clone(&self.lua)
    }
}

/// Globals present before any script code ran.
struct Builtins(HashSet<String>);

fn global_names(lua: &Lua) -> LuaResult<HashSet<String>> {
    let mut names = HashSet::new();
    for pair in lua.globals().pairs::<LuaValue, LuaValue>() {
        if let (LuaValue::String(name), _) = pair? {
            names.insert(name.to_string_lossy());
        }
    }
    Ok(names)
}

/// Unset every global the script defined and collect garbage, so that
/// finalizers run while the state is still usable.
///
/// Must be called with no borrow of the engine state held: finalizers may
/// print.
pub(crate) fn release(lua: &Lua) -> LuaResult<()> {
    let globals = lua.globals();
    let defined: Vec<LuaValue> = {
        let builtins = lua.app_data_ref::<Builtins>();
        let mut defined = Vec::new();
        for pair in globals.pairs::<LuaValue, LuaValue>() {
            let (key, _) = pair?;
            let builtin = match (&key, builtins.as_deref()) {
                (LuaValue::String(name), Some(Builtins(names))) => names.contains(&name.to_string_lossy()),
                _ => false,
            };
            if !builtin {
                defined.push(key);
            }
        }
        defined
    };
    for key in defined {
        globals.raw_set(key, LuaValue::Nil)?;
    }
    // The first cycle runs finalizers, the second frees what they released.
    lua.gc_collect()?;
    lua.gc_collect()
}

/// Close a context.
///
/// Must be called with no borrow of the engine state held: closing the
/// state runs finalizers, and those may print.
pub(crate) fn destroy(shared: &Shared, context: Context) {
    let id = context.id;
    if let Err(e) = release(&context.lua) {
        tracing::warn!(context = %id, "unable to release context: {e}");
    }
    shared.flush();
    if Rc::strong_count(&context.lua) > 1 {
        tracing::warn!(context = %id, "context still referenced while being destroyed");
    }
    drop(context);
    shared.state.borrow_mut().stats.destroyed += 1;
    tracing::debug!(context = %id, "interpreter context destroyed");
}

// ── ContextGuard ──────────────────────────────────────────────────────────────

/// Makes a script active until dropped.
pub(crate) struct ContextGuard<'a> {
    shared: &'a Shared,
    previous: Option<ScriptId>,
}

impl<'a> ContextGuard<'a> {
    /// Activate `target` (or nothing, while a script is being loaded).
    pub(crate) fn enter(shared: &'a Shared, target: Option<ScriptId>) -> Self {
        let previous = std::mem::replace(&mut shared.state.borrow_mut().active, target);
        Self { shared, previous }
    }
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        let mut st = self.shared.state.borrow_mut();
        // A script unloaded meanwhile cannot become active again.
        let restored = self.previous.filter(|id| st.registry.contains(*id));
        st.active = restored;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HostConfig;
    use crate::host::RecordingHost;
    use crate::script::Registration;

    fn shared() -> Rc<Shared> {
        Shared::new(Rc::new(RecordingHost::new()), HostConfig::default())
    }

    #[test]
    fn create_counts_and_isolates() {
        let shared = shared();
        let a = Context::create(&shared).unwrap();
        let b = Context::create(&shared).unwrap();
        assert_ne!(a.id(), b.id());

        a.lua().load("x = 1").exec().unwrap();
        let seen: LuaValue = b.lua().globals().get("x").unwrap();
        assert!(seen.is_nil());

        destroy(&shared, a);
        destroy(&shared, b);
        let stats = shared.state.borrow().stats;
        assert_eq!(stats, ContextStats { created: 2, destroyed: 2 });
        assert_eq!(stats.live(), 0);
    }

    #[test]
    fn guard_restores_previous() {
        let shared = shared();
        let ctx = Context::create(&shared).unwrap();
        let id = shared.state.borrow_mut().registry.add(
            "a.lua",
            Registration { name: "a".into(), ..Default::default() },
            ctx,
        );
        shared.state.borrow_mut().active = Some(id);
        {
            let _outer = ContextGuard::enter(&shared, None);
            assert_eq!(shared.state.borrow().active, None);
        }
        assert_eq!(shared.state.borrow().active, Some(id));
    }

    #[test]
    fn guard_drops_stale_previous() {
        let shared = shared();
        let ctx = Context::create(&shared).unwrap();
        let id = shared.state.borrow_mut().registry.add(
            "a.lua",
            Registration { name: "a".into(), ..Default::default() },
            ctx,
        );
        shared.state.borrow_mut().active = Some(id);
        let guard = ContextGuard::enter(&shared, None);
        let script = shared.state.borrow_mut().registry.remove(id).unwrap();
        drop(guard);
        assert_eq!(shared.state.borrow().active, None);
        destroy(&shared, script.context);
    }
}
