//! Loaded scripts and the registry that owns them.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::context::{Context, ContextId};

// ── ScriptId ──────────────────────────────────────────────────────────────────

/// Handle to a loaded script.  Never reused within one engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptId(u64);

impl fmt::Display for ScriptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ── Registration ──────────────────────────────────────────────────────────────

/// Metadata a script passes to `register`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registration {
    pub name: String,
    pub author: String,
    pub version: String,
    pub license: String,
    pub description: String,
    /// Function called just before unload; empty for none.
    pub shutdown_func: String,
    pub charset: String,
}

// ── Script ────────────────────────────────────────────────────────────────────

/// A loaded script and the interpreter context it runs in.
#[derive(Debug)]
pub struct Script {
    pub(crate) id: ScriptId,
    pub(crate) filename: String,
    pub(crate) meta: Registration,
    pub(crate) context: Context,
    /// Set once the load that created this script has completed.
    pub(crate) registered: bool,
}

impl Script {
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// File name without directories, as used by install/remove requests.
    pub fn full_name(&self) -> &str {
        Path::new(&self.filename)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.filename)
    }

    pub fn shutdown_func(&self) -> Option<&str> {
        Some(self.meta.shutdown_func.as_str()).filter(|f| !f.is_empty())
    }

    pub fn info(&self) -> ScriptInfo {
        ScriptInfo {
            id: self.id,
            filename: self.filename.clone(),
            name: self.meta.name.clone(),
            author: self.meta.author.clone(),
            version: self.meta.version.clone(),
            license: self.meta.license.clone(),
            description: self.meta.description.clone(),
            shutdown_func: self.meta.shutdown_func.clone(),
            charset: self.meta.charset.clone(),
            context: self.context.id(),
            registered: self.registered,
        }
    }
}

/// Read-only snapshot of a [`Script`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptInfo {
    pub id: ScriptId,
    pub filename: String,
    pub name: String,
    pub author: String,
    pub version: String,
    pub license: String,
    pub description: String,
    pub shutdown_func: String,
    pub charset: String,
    pub context: ContextId,
    pub registered: bool,
}

// ── ScriptRegistry ────────────────────────────────────────────────────────────

/// Every loaded script, oldest first, with a name index.
#[derive(Debug, Default)]
pub struct ScriptRegistry {
    scripts: Vec<Script>,
    by_name: HashMap<String, ScriptId>,
    next_id: u64,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a script built from `meta` around `context`.
    ///
    /// Names must be unique; the caller checks [`Self::find`] first.
    pub fn add(&mut self, filename: &str, meta: Registration, context: Context) -> ScriptId {
        self.next_id += 1;
        let id = ScriptId(self.next_id);
        self.by_name.insert(meta.name.clone(), id);
        self.scripts.push(Script {
            id,
            filename: filename.to_owned(),
            meta,
            context,
            registered: false,
        });
        id
    }

    /// Remove a script and hand back ownership of it.
    pub fn remove(&mut self, id: ScriptId) -> Option<Script> {
        let pos = self.position(id)?;
        let script = self.scripts.remove(pos);
        self.by_name.remove(script.name());
        Some(script)
    }

    pub fn get(&self, id: ScriptId) -> Option<&Script> {
        self.scripts.iter().find(|s| s.id == id)
    }

    pub fn get_mut(&mut self, id: ScriptId) -> Option<&mut Script> {
        self.scripts.iter_mut().find(|s| s.id == id)
    }

    pub fn contains(&self, id: ScriptId) -> bool {
        self.position(id).is_some()
    }

    pub fn find(&self, name: &str) -> Option<ScriptId> {
        self.by_name.get(name).copied()
    }

    /// Find a script by the file name it was loaded from (no directories).
    pub fn find_by_full_name(&self, full_name: &str) -> Option<ScriptId> {
        self.scripts.iter().find(|s| s.full_name() == full_name).map(|s| s.id)
    }

    /// The oldest script.
    pub fn first(&self) -> Option<ScriptId> {
        self.scripts.first().map(|s| s.id)
    }

    /// The script loaded just before `id`, else the one just after.
    pub fn neighbour(&self, id: ScriptId) -> Option<ScriptId> {
        let pos = self.position(id)?;
        pos.checked_sub(1)
            .and_then(|p| self.scripts.get(p))
            .or_else(|| self.scripts.get(pos + 1))
            .map(|s| s.id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Script> {
        self.scripts.iter()
    }

    pub fn len(&self) -> usize {
        self.scripts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scripts.is_empty()
    }

    fn position(&self, id: ScriptId) -> Option<usize> {
        self.scripts.iter().position(|s| s.id == id)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
