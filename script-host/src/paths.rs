//! Script directories.
//!
//! ```text
//! <home>/lua/             installed scripts
//! <home>/lua/autoload/    links to scripts loaded at startup
//! ```

use std::io;
use std::path::{Path, PathBuf};

use crate::PLUGIN_NAME;

/// Script file extension.
pub const SCRIPT_EXTENSION: &str = "lua";

/// Replace a leading `~` with `$HOME`.
pub fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix('~') {
        Some(rest) => {
            let home = std::env::var("HOME").unwrap_or_default();
            PathBuf::from(format!("{home}{rest}"))
        }
        None => PathBuf::from(path),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptDirs {
    home: PathBuf,
}

impl ScriptDirs {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn language_dir(&self) -> PathBuf {
        self.home.join(PLUGIN_NAME)
    }

    pub fn autoload_dir(&self) -> PathBuf {
        self.language_dir().join("autoload")
    }

    /// Create the language and autoload directories.
    pub fn create(&self) -> io::Result<()> {
        std::fs::create_dir_all(self.autoload_dir())
    }

    /// Where a script called `name` lives.
    ///
    /// Tries the autoload directory, the language directory, then the home
    /// directory; `~` paths are expanded.  Returns `name` unchanged when
    /// nothing matches.
    pub fn search_path(&self, name: &str) -> PathBuf {
        if name.starts_with('~') {
            return expand_tilde(name);
        }
        [self.autoload_dir(), self.language_dir(), self.home.clone()]
            .into_iter()
            .map(|dir| dir.join(name))
            .find(|candidate| candidate.exists())
            .unwrap_or_else(|| PathBuf::from(name))
    }

    /// Scripts in the autoload directory, sorted by file name.
    ///
    /// Hidden files and files without the script extension are skipped.
    pub fn autoload_scripts(&self) -> io::Result<Vec<PathBuf>> {
        let mut scripts: Vec<PathBuf> = std::fs::read_dir(self.autoload_dir())?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                let visible = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| !n.starts_with('.'));
                visible
                    && path.extension().is_some_and(|ext| ext == SCRIPT_EXTENSION)
                    && path.is_file()
            })
            .collect();
        scripts.sort();
        Ok(scripts)
    }

    /// Make `<autoload>/<name>` point at `../<name>`.
    pub fn link_autoload(&self, name: &str) -> io::Result<()> {
        std::fs::create_dir_all(self.autoload_dir())?;
        let link = self.autoload_dir().join(name);
        if link.symlink_metadata().is_ok() {
            std::fs::remove_file(&link)?;
        }
        make_link(&Path::new("..").join(name), &self.language_dir().join(name), &link)
    }

    /// Remove `<autoload>/<name>`; a missing link is not an error.
    pub fn unlink_autoload(&self, name: &str) -> io::Result<()> {
        match std::fs::remove_file(self.autoload_dir().join(name)) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

#[cfg(unix)]
fn make_link(relative: &Path, _target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(relative, link)
}

#[cfg(not(unix))]
fn make_link(_relative: &Path, target: &Path, link: &Path) -> io::Result<()> {
    std::fs::copy(target, link).map(|_| ())
}

/// Move a file, copying when a rename is not possible.
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    if std::fs::rename(from, to).is_ok() {
        return Ok(());
    }
    std::fs::copy(from, to)?;
    std::fs::remove_file(from)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
