//! Command-line argument parsing.
//!
//! Usage:
//!   script-host [-d<home>] [-f[<file>]] [-e<code>]... [-knqv] [<script>...]

use std::iter::Peekable;
use std::path::PathBuf;
use std::slice::Iter;

// ── Public types ──────────────────────────────────────────────────────────────

/// Parsed command-line arguments.
#[derive(Debug, Default)]
pub struct CliArgs {
    /// Home directory override (`-d<home>`).
    pub home: Option<PathBuf>,
    /// Which config file to read.
    pub config: ConfigFile,
    /// Code to evaluate after startup (`-e<code>`, repeatable).
    pub eval: Vec<String>,
    /// Keep the eval context between evaluations (`-k`).
    pub keep_eval_context: bool,
    /// Skip the autoload directory (`-n`).
    pub no_autoload: bool,
    /// Hide informational messages while loading (`-q`).
    pub quiet: bool,
    /// Debug logging (`-v`).
    pub verbose: bool,
    /// Script files to load after autoload.
    pub scripts: Vec<PathBuf>,
}

/// How to choose the config file.
#[derive(Debug, Default)]
pub enum ConfigFile {
    /// Use `<home>/script-host.conf` if it exists (default).
    #[default]
    Search,
    /// `-f` with no file argument: skip the config file.
    Skip,
    /// `-f<file>`: load this specific file.
    Explicit(PathBuf),
}

// ── Parsing ───────────────────────────────────────────────────────────────────

/// Parse `std::env::args()` and return [`CliArgs`] or an error message.
pub fn parse_args() -> Result<CliArgs, String> {
    let raw: Vec<String> = std::env::args().collect();
    parse_argv(&raw[1..])
}

/// Parse a slice of argument strings (exposed for testing).
pub fn parse_argv(argv: &[String]) -> Result<CliArgs, String> {
    let mut args = CliArgs::default();
    let mut rest = argv.iter().peekable();

    while let Some(arg) = rest.next() {
        let flags = match arg.strip_prefix('-') {
            Some("-") => {
                args.scripts.extend(rest.by_ref().map(PathBuf::from));
                break;
            }
            Some(flags) if !flags.is_empty() => flags,
            _ => {
                args.scripts.push(PathBuf::from(arg));
                continue;
            }
        };

        for (at, flag) in flags.char_indices() {
            let attached = &flags[at + flag.len_utf8()..];
            match flag {
                'k' => args.keep_eval_context = true,
                'n' => args.no_autoload = true,
                'q' => args.quiet = true,
                'v' => args.verbose = true,
                'f' => {
                    args.config = match flag_value(attached, &mut rest, |next| !next.starts_with('-')) {
                        Some(file) => ConfigFile::Explicit(PathBuf::from(file)),
                        None => ConfigFile::Skip,
                    };
                    break;
                }
                'e' => {
                    let code = flag_value(attached, &mut rest, |_| true)
                        .ok_or("-e requires a code argument")?;
                    args.eval.push(code);
                    break;
                }
                'd' => {
                    let dir = flag_value(attached, &mut rest, |_| true)
                        .ok_or("-d requires a directory argument")?;
                    args.home = Some(PathBuf::from(dir));
                    break;
                }
                c => return Err(format!("unknown option: -{c}")),
            }
        }
    }

    Ok(args)
}

/// Value of a flag: the rest of its cluster, else the next argument if
/// `accept` takes it.
fn flag_value(
    attached: &str,
    rest: &mut Peekable<Iter<'_, String>>,
    accept: impl Fn(&str) -> bool,
) -> Option<String> {
    if !attached.is_empty() {
        return Some(attached.to_owned());
    }
    rest.next_if(|next| accept(next.as_str())).cloned()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|&s| s.to_owned()).collect()
    }

    #[test]
    fn empty_args() {
        let a = parse_argv(&argv(&[])).unwrap();
        assert!(a.home.is_none());
        assert!(matches!(a.config, ConfigFile::Search));
        assert!(a.scripts.is_empty() && a.eval.is_empty());
    }

    #[test]
    fn combined_bool_flags() {
        let a = parse_argv(&argv(&["-knqv"])).unwrap();
        assert!(a.keep_eval_context && a.no_autoload && a.quiet && a.verbose);
    }

    #[test]
    fn home_embedded_and_separate() {
        let a = parse_argv(&argv(&["-d/srv/scripts"])).unwrap();
        assert_eq!(a.home, Some(PathBuf::from("/srv/scripts")));
        let a = parse_argv(&argv(&["-d", "/srv/scripts"])).unwrap();
        assert_eq!(a.home, Some(PathBuf::from("/srv/scripts")));
    }

    #[test]
    fn config_forms() {
        assert!(matches!(parse_argv(&argv(&["-f"])).unwrap().config, ConfigFile::Skip));
        let a = parse_argv(&argv(&["-fhost.conf"])).unwrap();
        assert!(matches!(&a.config, ConfigFile::Explicit(p) if p == &PathBuf::from("host.conf")));
        let a = parse_argv(&argv(&["-f", "host.conf"])).unwrap();
        assert!(matches!(&a.config, ConfigFile::Explicit(p) if p == &PathBuf::from("host.conf")));
    }

    #[test]
    fn eval_is_repeatable() {
        let a = parse_argv(&argv(&["-eprint(1)", "-e", "print(2)"])).unwrap();
        assert_eq!(a.eval, ["print(1)", "print(2)"]);
    }

    #[test]
    fn value_flag_ends_cluster() {
        let a = parse_argv(&argv(&["-qe", "print(1)", "-kdhome"])).unwrap();
        assert!(a.quiet && a.keep_eval_context);
        assert_eq!(a.eval, ["print(1)"]);
        assert_eq!(a.home, Some(PathBuf::from("home")));
        let a = parse_argv(&argv(&["-nf", "-v", "x.lua"])).unwrap();
        assert!(a.no_autoload && a.verbose);
        assert!(matches!(a.config, ConfigFile::Skip));
        assert_eq!(a.scripts, [PathBuf::from("x.lua")]);
    }

    #[test]
    fn positional_scripts() {
        let a = parse_argv(&argv(&["-q", "a.lua", "--", "-odd.lua"])).unwrap();
        assert_eq!(a.scripts, [PathBuf::from("a.lua"), PathBuf::from("-odd.lua")]);
    }

    #[test]
    fn missing_values_and_unknown_flags() {
        assert!(parse_argv(&argv(&["-e"])).is_err());
        assert!(parse_argv(&argv(&["-d"])).is_err());
        assert!(parse_argv(&argv(&["-z"])).is_err());
    }
}
