use std::io::Write as _;
use std::rc::Rc;
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::sleep_until;
use tracing_subscriber::EnvFilter;

use script_host::cli::{self, ConfigFile};
use script_host::config::{find_user_config, ConfigError, HostConfig};
use script_host::{Host, Pointer, ScriptEngine};

/// Host that prints everything on the terminal.
struct ConsoleHost;

impl Host for ConsoleHost {
    fn print(&self, buffer: Option<Pointer>, line: &str) {
        let mut out = std::io::stdout().lock();
        let _ = match buffer {
            Some(buffer) => writeln!(out, "[{buffer}] {line}"),
            None => writeln!(out, "{line}"),
        };
    }

    fn command(&self, buffer: Pointer, text: &str) {
        println!("[{buffer}] > {text}");
    }

    fn signal_send(&self, signal: &str, data: &str) {
        tracing::debug!(signal, data, "signal");
    }
}

fn report_config_errors(path: &std::path::Path, errors: &[ConfigError]) {
    for e in errors {
        eprintln!("script-host: {}: {e}", path.display());
    }
}

fn load_config(args: &cli::CliArgs) -> HostConfig {
    let base = HostConfig::default();
    let home = args.home.clone().unwrap_or(base.home);
    let path = match &args.config {
        ConfigFile::Skip => None,
        ConfigFile::Explicit(path) => Some(path.clone()),
        ConfigFile::Search => find_user_config(&home),
    };
    let mut config = match path {
        None => HostConfig { home: home.clone(), ..HostConfig::default() },
        Some(path) => match HostConfig::load_file(&path) {
            Ok((config, errors)) => {
                report_config_errors(&path, &errors);
                config
            }
            Err(e) => {
                eprintln!("script-host: warning: {e}");
                HostConfig::default()
            }
        },
    };
    if let Some(home) = &args.home {
        config.home = home.clone();
    }
    if args.keep_eval_context {
        config.eval_keep_context = true;
    }
    config
}

/// Handle one line typed on stdin.
fn handle_line(engine: &mut ScriptEngine, line: &str) {
    let line = line.trim_end();
    let (cmd, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim();
    match cmd {
        "" => {}
        "/signal" => {
            let (signal, data) = rest.split_once(' ').unwrap_or((rest, ""));
            if !engine.handle_signal(signal, data) {
                eprintln!("script-host: signal \"{signal}\" not handled");
            }
        }
        "/load" => {
            let _ = engine.load_path(rest);
        }
        "/unload" if rest.is_empty() => engine.unload_all(),
        "/unload" => {
            let _ = engine.unload_name(rest);
        }
        "/reload" => {
            let _ = engine.reload_name(rest);
        }
        "/list" => engine.display_list((!rest.is_empty()).then_some(rest), false),
        "/listfull" => engine.display_list((!rest.is_empty()).then_some(rest), true),
        "/version" => engine.display_interpreter(),
        _ => {
            match engine.eval_to_string(line) {
                Some(output) if !output.is_empty() => {
                    println!("{output}");
                    let _ = std::io::stdout().flush();
                }
                _ => {}
            }
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let args = match cli::parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("script-host: {e}");
            eprintln!("Usage: script-host [-d<home>] [-f[<file>]] [-e<code>]... [-knqv] [<script>...]");
            std::process::exit(1);
        }
    };

    let default_filter = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args);
    let mut engine = match ScriptEngine::new(Rc::new(ConsoleHost), config) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("script-host: {e}");
            std::process::exit(1);
        }
    };

    let was_quiet = engine.set_quiet(args.quiet);
    if !args.no_autoload {
        engine.autoload();
    }
    for script in &args.scripts {
        let _ = engine.load_path(&script.to_string_lossy());
    }
    engine.set_quiet(was_quiet);
    engine.display_short_list();

    for code in &args.eval {
        handle_line(&mut engine, code);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    #[cfg(unix)]
    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("script-host: {e}");
            std::process::exit(1);
        }
    };

    loop {
        let deadline = engine.next_timer();
        let timer = async {
            match deadline {
                Some(dl) => sleep_until(dl.into()).await,
                None => std::future::pending::<()>().await,
            }
        };
        #[cfg(unix)]
        let terminate = sigterm.recv();
        #[cfg(not(unix))]
        let terminate = std::future::pending::<Option<()>>();

        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_line(&mut engine, &line),
                Ok(None) => break,
                Err(e) => {
                    eprintln!("script-host: stdin: {e}");
                    break;
                }
            },
            _ = timer => {
                engine.run_timers(Instant::now());
            }
            _ = tokio::signal::ctrl_c() => break,
            _ = terminate => break,
        }
    }

    engine.end();
}
