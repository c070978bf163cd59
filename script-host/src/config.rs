//! Configuration file parser.
//!
//! The file is a list of `/set` directives:
//!
//! | Directive | Action |
//! |-----------|--------|
//! | `/set <name>=<value>` or `/set <name> <value>` | set an option |
//! | Lines starting with `;` or `#` | comment, ignored |
//! | Any other `/command` | silently skipped |
//!
//! | Option | Type | Default |
//! |--------|------|---------|
//! | `look.check_license` | bool | off |
//! | `look.eval_keep_context` | bool | off |
//! | `home` | path (`~` expanded) | per-user data directory |
//! | `debug` | 0–3 | 0 |

use std::iter::Peekable;
use std::path::{Path, PathBuf};
use std::str::Chars;

use crate::error::HostError;
use crate::paths::{expand_tilde, ScriptDirs};

// ── Public API ────────────────────────────────────────────────────────────────

/// A non-fatal error encountered while loading a config file.
#[derive(Debug)]
pub struct ConfigError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Engine options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    /// Root of the script directories.
    pub home: PathBuf,
    /// Warn when a script's license differs from the host's.
    pub check_license: bool,
    /// Keep the eval scratch script loaded between evaluations.
    pub eval_keep_context: bool,
    /// Debug level; 2 and up shows load messages even in quiet mode.
    pub debug: u8,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            home: default_home(),
            check_license: false,
            eval_keep_context: false,
            debug: 0,
        }
    }
}

impl HostConfig {
    /// Parse a config string on top of the defaults.
    ///
    /// Returns the config and a list of any errors on recognised lines.
    pub fn load_str(s: &str) -> (Self, Vec<ConfigError>) {
        let mut config = HostConfig::default();
        let mut errors = Vec::new();

        for (i, raw) in s.lines().enumerate() {
            let lineno = i + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            let Some(rest) = line.strip_prefix('/') else { continue };

            let (cmd, args_str) = rest
                .split_once(|c: char| c.is_ascii_whitespace())
                .unwrap_or((rest, ""));

            if cmd == "set" {
                let tokens = split_args(args_str.trim());
                if let Err(message) = parse_set(&tokens, &mut config) {
                    errors.push(ConfigError { line: lineno, message });
                }
            }
        }

        (config, errors)
    }

    /// Read and parse a config file from disk.
    pub fn load_file(path: &Path) -> Result<(Self, Vec<ConfigError>), HostError> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| HostError::Config(format!("{}: {e}", path.display())))?;
        Ok(Self::load_str(&s))
    }

    /// Set one option by name.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), String> {
        match name {
            "look.check_license" => self.check_license = parse_bool(value)?,
            "look.eval_keep_context" => self.eval_keep_context = parse_bool(value)?,
            "home" => {
                if value.is_empty() {
                    return Err("home cannot be empty".into());
                }
                self.home = expand_tilde(value);
            }
            "debug" => {
                self.debug = value
                    .parse::<u8>()
                    .ok()
                    .filter(|level| *level <= 3)
                    .ok_or_else(|| format!("invalid debug level '{value}' (0-3)"))?;
            }
            _ => return Err(format!("unknown option '{name}'")),
        }
        Ok(())
    }

    pub fn dirs(&self) -> ScriptDirs {
        ScriptDirs::new(self.home.clone())
    }
}

/// Per-user data directory, e.g. `~/.local/share/script-host`.
pub fn default_home() -> PathBuf {
    directories::ProjectDirs::from("", "", "script-host")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| expand_tilde("~/.script-host"))
}

/// Config file looked for when none is given: `<home>/script-host.conf`.
pub fn find_user_config(home: &Path) -> Option<PathBuf> {
    Some(home.join("script-host.conf")).filter(|p| p.exists())
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "yes" | "1" => Ok(true),
        "off" | "false" | "no" | "0" => Ok(false),
        _ => Err(format!("invalid boolean value '{value}'")),
    }
}

// ── Argument tokenizer ────────────────────────────────────────────────────────

/// Words of a `/set` line.  Double quotes group words and allow `\"`
/// inside them; `""` is an empty word.
struct Words<'a> {
    chars: Peekable<Chars<'a>>,
}

impl Iterator for Words<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        while self.chars.next_if(char::is_ascii_whitespace).is_some() {}
        self.chars.peek()?;

        let mut word = String::new();
        let mut quoted = false;
        while let Some(c) = self.chars.next() {
            match (c, quoted) {
                ('"', _) => quoted = !quoted,
                ('\\', true) => word.extend(self.chars.next()),
                (c, false) if c.is_ascii_whitespace() => break,
                (c, _) => word.push(c),
            }
        }
        Some(word)
    }
}

fn split_args(s: &str) -> Vec<String> {
    Words { chars: s.chars().peekable() }.collect()
}

// ── /set ──────────────────────────────────────────────────────────────────────

fn parse_set(tokens: &[String], config: &mut HostConfig) -> Result<(), String> {
    let Some(first) = tokens.first() else {
        return Err("/set: requires an argument".into());
    };

    let (name, value) = if let Some((name, value)) = first.split_once('=') {
        (name.to_owned(), value.to_owned())
    } else if tokens.len() >= 2 {
        (first.clone(), tokens[1..].join(" "))
    } else {
        return Err(format!("/set: missing value for '{first}'"));
    };

    if name.is_empty() {
        return Err("/set: option name cannot be empty".into());
    }
    config.set(&name, &value).map_err(|e| format!("/set: {e}"))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
