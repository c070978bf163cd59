//! Deferred install / remove / autoload requests.
//!
//! Such requests may arrive while a script is running, and executing them
//! right away could unload that very script.  They are appended to a
//! per-kind list instead, and a one-shot timer runs the whole list later,
//! from the host loop, when no script code is on the stack.
//!
//! A list is comma-separated.  Each entry may start with flags that apply
//! to the whole batch: `-q` (quiet) and `-a` (autoload).

use std::path::Path;
use std::time::Instant;

use crate::engine::{ScriptEngine, Shared};
use crate::paths::move_file;
use crate::signal::Signal;
use crate::timer::ACTION_DELAY;
use crate::PLUGIN_NAME;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Install,
    Remove,
    Autoload,
}

impl ActionKind {
    pub const ALL: &'static [ActionKind] = &[ActionKind::Install, ActionKind::Remove, ActionKind::Autoload];
}

// ── ActionQueue ───────────────────────────────────────────────────────────────

/// The three pending action lists.
#[derive(Debug, Default)]
pub struct ActionQueue {
    install: String,
    remove: String,
    autoload: String,
}

impl ActionQueue {
    fn list_mut(&mut self, kind: ActionKind) -> &mut String {
        match kind {
            ActionKind::Install => &mut self.install,
            ActionKind::Remove => &mut self.remove,
            ActionKind::Autoload => &mut self.autoload,
        }
    }

    /// Append `item` to the list for `kind`.
    pub fn add(&mut self, kind: ActionKind, item: &str) {
        let list = self.list_mut(kind);
        if !list.is_empty() {
            list.push(',');
        }
        list.push_str(item);
    }

    pub fn pending(&self, kind: ActionKind) -> &str {
        match kind {
            ActionKind::Install => &self.install,
            ActionKind::Remove => &self.remove,
            ActionKind::Autoload => &self.autoload,
        }
    }

    /// Take the list for `kind`, leaving it empty.
    pub fn take(&mut self, kind: ActionKind) -> String {
        std::mem::take(self.list_mut(kind))
    }

    pub fn clear(&mut self) {
        for &kind in ActionKind::ALL {
            self.list_mut(kind).clear();
        }
    }
}

/// A parsed action list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionBatch {
    pub quiet: bool,
    pub autoload: bool,
    pub names: Vec<String>,
}

pub fn parse_action_list(list: &str) -> ActionBatch {
    let mut batch = ActionBatch::default();
    for entry in list.split(',') {
        let mut rest = entry.trim_start();
        while let Some(flags) = rest.strip_prefix('-') {
            let mut chars = flags.chars();
            match chars.next() {
                Some('q') => batch.quiet = true,
                Some('a') => batch.autoload = true,
                _ => {}
            }
            rest = chars.as_str().trim_start();
        }
        let name = rest.trim();
        if !name.is_empty() {
            batch.names.push(name.to_owned());
        }
    }
    batch
}

// ── Requests ──────────────────────────────────────────────────────────────────

impl Shared {
    pub(crate) fn request_action(&self, kind: ActionKind, item: &str) {
        let mut st = self.state.borrow_mut();
        st.actions.add(kind, item);
        st.timers.arm(kind, ACTION_DELAY);
        tracing::debug!(?kind, item, "action queued");
    }

    /// Act on a signal meant for this engine.  Returns `false` for other
    /// signals.
    pub(crate) fn handle_signal(&self, signal: &str, data: &str) -> bool {
        let Ok(signal) = signal.parse::<Signal>() else { return false };
        if let Some(kind) = signal.action() {
            self.request_action(kind, data);
            return true;
        }
        if signal == Signal::DebugDump && (data.is_empty() || data == PLUGIN_NAME) {
            self.print_log();
            return true;
        }
        false
    }
}

impl ScriptEngine {
    /// Queue an action; it runs at the next [`Self::run_timers`] after
    /// the action delay.
    pub fn request_action(&self, kind: ActionKind, item: &str) {
        self.shared.request_action(kind, item);
    }

    /// Feed a signal from the host bus.  Returns `true` if it was for this
    /// engine.
    pub fn handle_signal(&self, signal: &str, data: &str) -> bool {
        self.shared.handle_signal(signal, data)
    }

    pub fn pending_actions(&self, kind: ActionKind) -> String {
        self.shared.state.borrow().actions.pending(kind).to_owned()
    }

    /// When [`Self::run_timers`] next has work.
    pub fn next_timer(&self) -> Option<Instant> {
        self.shared.state.borrow().timers.next_wakeup()
    }

    /// Run every action list whose timer is due.  Returns how many ran.
    pub fn run_timers(&mut self, now: Instant) -> usize {
        let ready = self.shared.state.borrow_mut().timers.take_ready(now);
        for timer in &ready {
            self.on_timer(timer.kind);
        }
        ready.len()
    }

    /// Run the pending list for `kind` now.
    pub fn on_timer(&mut self, kind: ActionKind) {
        let list = self.shared.state.borrow_mut().actions.take(kind);
        if list.is_empty() {
            return;
        }
        let batch = parse_action_list(&list);
        tracing::debug!(?kind, ?batch, "running actions");
        let was_quiet = self.set_quiet(batch.quiet);
        match kind {
            ActionKind::Install => self.install_batch(&batch),
            ActionKind::Remove => self.remove_batch(&batch),
            ActionKind::Autoload => self.autoload_batch(&batch),
        }
        self.set_quiet(was_quiet);
    }

    // ── Handlers ──────────────────────────────────────────────────────────────

    fn install_batch(&mut self, batch: &ActionBatch) {
        let dirs = self.dirs();
        if let Err(e) = dirs.create() {
            self.shared.error(&format!(
                "unable to create directory \"{}\" ({e})",
                dirs.autoload_dir().display()
            ));
            return;
        }
        for source in &batch.names {
            let Some(base) = Path::new(source).file_name().and_then(|n| n.to_str()) else {
                self.shared.error(&format!("invalid script path \"{source}\""));
                continue;
            };

            let loaded = self.shared.state.borrow().registry.find_by_full_name(base);
            if let Some(id) = loaded {
                let _ = self.unload(id);
            }
            let existed = self.remove_script_file(base, batch.quiet, false);

            let target = dirs.language_dir().join(base);
            if let Err(e) = move_file(Path::new(source), &target) {
                self.shared.error(&format!(
                    "failed to move script {source} to {} ({e})",
                    target.display()
                ));
                continue;
            }
            if batch.autoload {
                if let Err(e) = dirs.link_autoload(base) {
                    self.shared.error(&format!("failed to autoload script {base} ({e})"));
                }
            }
            if (!existed && batch.autoload) || loaded.is_some() {
                let _ = self.load(&target.to_string_lossy(), None);
            }
        }
    }

    fn remove_batch(&mut self, batch: &ActionBatch) {
        for name in &batch.names {
            let loaded = self.shared.state.borrow().registry.find_by_full_name(name);
            if let Some(id) = loaded {
                let _ = self.unload(id);
            }
            self.remove_script_file(name, batch.quiet, true);
        }
    }

    fn autoload_batch(&mut self, batch: &ActionBatch) {
        let dirs = self.dirs();
        for name in &batch.names {
            if !dirs.language_dir().join(name).exists() {
                continue;
            }
            let result = if batch.autoload {
                dirs.link_autoload(name)
            } else {
                dirs.unlink_autoload(name)
            };
            if let Err(e) = result {
                self.shared.error(&format!("failed to update autoload for script {name} ({e})"));
            }
        }
    }

    /// Delete the installed copies of `name` (autoload link and script
    /// file).  Returns whether anything was found.
    fn remove_script_file(&self, name: &str, quiet: bool, report_missing: bool) -> bool {
        let dirs = self.dirs();
        let mut found = 0;
        for _ in 0..2 {
            let path = dirs.search_path(name);
            if path == Path::new(name) {
                break;
            }
            found += 1;
            match std::fs::remove_file(&path) {
                Ok(()) if !quiet => self.shared.info(&format!("script removed: {}", path.display())),
                Ok(()) => {}
                Err(e) => {
                    self.shared.error(&format!("failed to remove script: {} ({e})", path.display()));
                    break;
                }
            }
        }
        if found == 0 && report_missing {
            self.shared.error(&format!("script \"{name}\" not found, nothing was removed"));
        }
        found > 0
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_appends_with_commas() {
        let mut q = ActionQueue::default();
        q.add(ActionKind::Install, "a.lua");
        q.add(ActionKind::Install, "b.lua");
        q.add(ActionKind::Remove, "c.lua");
        assert_eq!(q.pending(ActionKind::Install), "a.lua,b.lua");
        assert_eq!(q.take(ActionKind::Install), "a.lua,b.lua");
        assert_eq!(q.pending(ActionKind::Install), "");
        assert_eq!(q.pending(ActionKind::Remove), "c.lua");
        q.clear();
        assert_eq!(q.pending(ActionKind::Remove), "");
    }

    #[test]
    fn parse_plain_list() {
        let batch = parse_action_list("a.lua,b.lua");
        assert_eq!(batch.names, ["a.lua", "b.lua"]);
        assert!(!batch.quiet && !batch.autoload);
    }

    #[test]
    fn parse_flags() {
        let batch = parse_action_list("-q -a /tmp/a.lua,-q b.lua");
        assert!(batch.quiet);
        assert!(batch.autoload);
        assert_eq!(batch.names, ["/tmp/a.lua", "b.lua"]);
    }

    #[test]
    fn parse_skips_empty_entries() {
        assert!(parse_action_list("").names.is_empty());
        assert_eq!(parse_action_list(",x.lua,,").names, ["x.lua"]);
    }
}
