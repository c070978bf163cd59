/// End-to-end tests of the engine through its public API, with a
/// `RecordingHost` standing in for the host application.
use std::path::Path;
use std::rc::Rc;
use std::time::{Duration, Instant};

use script_host::{
    ActionKind, ExecArg, ExecValue, HashTable, HostConfig, RecordingHost, ResultKind, ScriptEngine,
    MAX_ARGS,
};

// ── Helpers ───────────────────────────────────────────────────────────────────

fn engine_in(home: &Path) -> (ScriptEngine, Rc<RecordingHost>) {
    let host = Rc::new(RecordingHost::new());
    let config = HostConfig { home: home.to_path_buf(), ..HostConfig::default() };
    let engine = ScriptEngine::new(host.clone(), config).unwrap();
    (engine, host)
}

fn register(name: &str) -> String {
    format!(r#"weechat.register("{name}", "tester", "1.0", "GPL3", "{name} script", "", "")"#)
}

fn write_script(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.join(format!("{name}.lua"));
    std::fs::write(&path, format!("{}\n{body}\n", register(name))).unwrap();
    path
}

/// Let every pending action timer fire.
fn fire_timers(engine: &mut ScriptEngine) -> usize {
    engine.run_timers(Instant::now() + Duration::from_secs(1))
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

#[test]
fn every_context_is_destroyed_exactly_once() {
    let home = tempfile::tempdir().unwrap();
    let (mut engine, _host) = engine_in(home.path());

    engine.load("a.lua", Some(&register("a"))).unwrap();
    engine.load("b.lua", Some(&register("b"))).unwrap();
    assert!(engine.load("bad.lua", Some("error('no')")).is_err());
    engine.unload_name("a").unwrap();
    engine.load("c.lua", Some(&register("c"))).unwrap();
    assert!(engine.load("dup.lua", Some(&register("c"))).is_err());

    engine.unload_all();
    assert!(engine.is_empty());
    let stats = engine.context_stats();
    assert_eq!(stats.created, 5);
    assert_eq!(stats.destroyed, 5);
}

#[test]
fn reload_keeps_filename_with_new_context() {
    let home = tempfile::tempdir().unwrap();
    let path = write_script(home.path(), "foo", "");
    let (mut engine, host) = engine_in(home.path());

    let before = engine.load(&path.to_string_lossy(), None).unwrap();
    let old = engine.script(before).unwrap();

    let after = engine.reload_name("foo").unwrap();
    let new = engine.script(after).unwrap();
    assert_eq!(new.filename, path.to_string_lossy());
    assert_ne!(new.context, old.context);
    assert_ne!(after, before);
    assert!(host.core_lines().contains(&"lua: script \"foo\" unloaded".to_owned()));
}

#[test]
fn load_path_searches_the_language_directory() {
    let home = tempfile::tempdir().unwrap();
    let (mut engine, _host) = engine_in(home.path());
    engine.dirs().create().unwrap();
    write_script(&engine.dirs().language_dir(), "found", "");

    let id = engine.load_path("found.lua").unwrap();
    assert_eq!(engine.script(id).unwrap().name, "found");
}

#[test]
fn autoload_loads_sorted_and_quietly() {
    let home = tempfile::tempdir().unwrap();
    let (mut engine, host) = engine_in(home.path());
    let dirs = engine.dirs();
    dirs.create().unwrap();
    write_script(&dirs.autoload_dir(), "zeta", "");
    write_script(&dirs.autoload_dir(), "alpha", "");
    std::fs::write(dirs.autoload_dir().join("broken.lua"), "x = 1").unwrap();

    assert_eq!(engine.autoload(), 2);
    assert_eq!(engine.script_names(), ["alpha", "zeta"]);
    assert!(!host.core_lines().iter().any(|l| l.contains("loading script")));
    assert!(!engine.is_quiet());
}

// ── Calls ─────────────────────────────────────────────────────────────────────

#[test]
fn active_script_is_restored_after_failed_calls() {
    let home = tempfile::tempdir().unwrap();
    let (mut engine, _host) = engine_in(home.path());
    let code = format!("{}\nfunction boom() error('boom') end", register("calls"));
    let id = engine.load("calls.lua", Some(&code)).unwrap();
    assert_eq!(engine.current_script(), None);

    assert_eq!(engine.invoke(id, ResultKind::Int, "boom", &[]), None);
    assert_eq!(engine.current_script(), None);

    assert_eq!(engine.invoke(id, ResultKind::Int, "missing", &[]), None);
    assert_eq!(engine.current_script(), None);
}

#[test]
fn no_return_counts_as_zero() {
    let home = tempfile::tempdir().unwrap();
    let (mut engine, host) = engine_in(home.path());
    let code = format!("{}\nfunction quiet() end", register("zero"));
    let id = engine.load("zero.lua", Some(&code)).unwrap();

    assert_eq!(engine.invoke(id, ResultKind::Int, "quiet", &[]), Some(ExecValue::Int(0)));
    assert!(host.errors().is_empty());
}

#[test]
fn table_for_string_result_fails() {
    let home = tempfile::tempdir().unwrap();
    let (mut engine, host) = engine_in(home.path());
    let code = format!("{}\nfunction tbl() return {{ a = 1 }} end", register("tbl"));
    let id = engine.load("tbl.lua", Some(&code)).unwrap();

    assert_eq!(engine.invoke(id, ResultKind::String, "tbl", &[]), None);
    let errors = host.errors();
    assert!(errors.iter().any(|e| e.contains("must return a valid value")));
    assert!(errors.iter().any(|e| e.contains("error in function \"tbl\"")));
}

#[test]
fn arguments_reach_the_script() {
    let home = tempfile::tempdir().unwrap();
    let (mut engine, _host) = engine_in(home.path());
    let code = format!(
        "{}\nfunction join(s, n, t) return s .. ':' .. n .. ':' .. t.key end",
        register("args")
    );
    let id = engine.load("args.lua", Some(&code)).unwrap();
    let table = HashTable::from_pairs([("key", "value")]);

    let result = engine.invoke(
        id,
        ResultKind::String,
        "join",
        &[ExecArg::Str("s".into()), ExecArg::Int(7), ExecArg::HashTable(table)],
    );
    assert_eq!(result, Some(ExecValue::Str("s:7:value".into())));
}

#[test]
fn too_many_arguments_are_refused() {
    let home = tempfile::tempdir().unwrap();
    let (mut engine, host) = engine_in(home.path());
    let code = format!("{}\nfunction f() return 1 end", register("many"));
    let id = engine.load("many.lua", Some(&code)).unwrap();

    let args = vec![ExecArg::Int(1); MAX_ARGS + 1];
    assert_eq!(engine.invoke(id, ResultKind::Int, "f", &args), None);
    assert!(host.errors().iter().any(|e| e.contains("too many arguments")));

    let args = vec![ExecArg::Int(1); MAX_ARGS];
    assert_eq!(engine.invoke(id, ResultKind::Int, "f", &args), Some(ExecValue::Int(1)));
}

#[test]
fn contexts_do_not_share_globals() {
    let home = tempfile::tempdir().unwrap();
    let (mut engine, _host) = engine_in(home.path());
    let a = engine
        .load("a.lua", Some(&format!("{}\nshared = 'a'\nfunction get() return shared end", register("a"))))
        .unwrap();
    let b = engine
        .load("b.lua", Some(&format!("{}\nfunction get() return shared or 'unset' end", register("b"))))
        .unwrap();

    assert_eq!(engine.invoke(a, ResultKind::String, "get", &[]), Some(ExecValue::Str("a".into())));
    assert_eq!(engine.invoke(b, ResultKind::String, "get", &[]), Some(ExecValue::Str("unset".into())));
}

// ── Eval ──────────────────────────────────────────────────────────────────────

#[test]
fn eval_retention_controls_shared_state() {
    let home = tempfile::tempdir().unwrap();
    let (mut engine, _host) = engine_in(home.path());

    engine.eval_to_string("counter = 1").unwrap();
    assert_eq!(engine.eval_to_string("print(counter)").as_deref(), Some("nil"));

    engine.set_eval_keep_context(true);
    engine.eval_to_string("counter = 1").unwrap();
    assert_eq!(engine.eval_to_string("print(counter)").as_deref(), Some("1"));

    engine.end();
    assert_eq!(engine.context_stats().live(), 0);
}

// ── Deferred actions ──────────────────────────────────────────────────────────

#[test]
fn two_installs_run_in_one_batch() {
    let home = tempfile::tempdir().unwrap();
    let downloads = tempfile::tempdir().unwrap();
    let a = write_script(downloads.path(), "one", "");
    let b = write_script(downloads.path(), "two", "");
    let (mut engine, _host) = engine_in(home.path());

    engine.request_action(ActionKind::Install, &format!("-a {}", a.display()));
    engine.request_action(ActionKind::Install, &b.to_string_lossy());
    assert_eq!(engine.len(), 0);
    assert!(engine.next_timer().is_some());

    assert_eq!(fire_timers(&mut engine), 1);
    assert_eq!(engine.pending_actions(ActionKind::Install), "");
    assert!(engine.next_timer().is_none());

    let dirs = engine.dirs();
    assert!(dirs.language_dir().join("one.lua").exists());
    assert!(dirs.language_dir().join("two.lua").exists());
    assert!(dirs.autoload_dir().join("two.lua").exists());
    assert!(!a.exists());
    assert_eq!(engine.script_names(), ["one", "two"]);
}

#[test]
fn install_replaces_a_loaded_script() {
    let home = tempfile::tempdir().unwrap();
    let downloads = tempfile::tempdir().unwrap();
    let (mut engine, _host) = engine_in(home.path());
    let dirs = engine.dirs();
    dirs.create().unwrap();
    let installed = write_script(&dirs.language_dir(), "up", "version = 1");
    engine.load(&installed.to_string_lossy(), None).unwrap();

    let update = write_script(downloads.path(), "up", "version = 2\nfunction v() return version end");
    engine.request_action(ActionKind::Install, &update.to_string_lossy());
    fire_timers(&mut engine);

    let id = engine.find("up").unwrap();
    assert_eq!(engine.invoke(id, ResultKind::Int, "v", &[]), Some(ExecValue::Int(2)));
}

#[test]
fn remove_unloads_and_deletes() {
    let home = tempfile::tempdir().unwrap();
    let (mut engine, host) = engine_in(home.path());
    let dirs = engine.dirs();
    dirs.create().unwrap();
    let path = write_script(&dirs.language_dir(), "gone", "");
    dirs.link_autoload("gone.lua").unwrap();
    engine.load(&path.to_string_lossy(), None).unwrap();

    engine.request_action(ActionKind::Remove, "gone.lua,missing.lua");
    fire_timers(&mut engine);

    assert!(engine.find("gone").is_none());
    assert!(!path.exists());
    assert!(dirs.autoload_dir().join("gone.lua").symlink_metadata().is_err());
    assert!(host.errors().iter().any(|e| e.contains("script \"missing.lua\" not found")));
    assert_eq!(host.core_lines().iter().filter(|l| l.contains("script removed:")).count(), 2);
}

#[test]
fn autoload_request_toggles_link() {
    let home = tempfile::tempdir().unwrap();
    let (mut engine, _host) = engine_in(home.path());
    let dirs = engine.dirs();
    dirs.create().unwrap();
    write_script(&dirs.language_dir(), "auto", "");

    engine.request_action(ActionKind::Autoload, "-q -a auto.lua");
    fire_timers(&mut engine);
    assert!(dirs.autoload_dir().join("auto.lua").exists());

    engine.request_action(ActionKind::Autoload, "auto.lua");
    fire_timers(&mut engine);
    assert!(!dirs.autoload_dir().join("auto.lua").exists());
}

#[test]
fn script_signal_is_deferred_until_timer() {
    let home = tempfile::tempdir().unwrap();
    let downloads = tempfile::tempdir().unwrap();
    let target = write_script(downloads.path(), "late", "");
    let (mut engine, host) = engine_in(home.path());

    let code = format!(
        "{}\nfunction ask(path) return weechat.signal_send('lua_script_install', '-a ' .. path) end",
        register("asker")
    );
    let asker = engine.load("asker.lua", Some(&code)).unwrap();
    let rc = engine.invoke(asker, ResultKind::Int, "ask", &[ExecArg::Str(target.to_string_lossy().into_owned())]);
    assert_eq!(rc, Some(ExecValue::Int(0)));

    assert!(engine.find("late").is_none());
    assert!(!host.signals().iter().any(|(s, _)| s == "lua_script_install"));

    fire_timers(&mut engine);
    assert!(engine.find("late").is_some());
}

#[test]
fn handle_signal_ignores_foreign_signals() {
    let home = tempfile::tempdir().unwrap();
    let (engine, _host) = engine_in(home.path());
    assert!(!engine.handle_signal("python_script_install", "x.py"));
    assert!(engine.handle_signal("lua_script_remove", "x.lua"));
    assert!(engine.handle_signal("debug_dump", "lua"));
    assert_eq!(engine.pending_actions(ActionKind::Remove), "x.lua");
}
