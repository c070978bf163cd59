//! The host application as seen from the script engine.
//!
//! Everything the engine needs from the outside world goes through the
//! [`Host`] trait: printing, synthesized input, the signal bus and the
//! string ↔ handle registry.  [`RecordingHost`] keeps every event in memory
//! and is what the test-suite (and simple embedders) use.

use std::cell::RefCell;
use std::fmt;

/// Prefix put in front of error lines by [`Host::print_error`].
pub const ERROR_PREFIX: &str = "=!= ";

// ── Pointer ───────────────────────────────────────────────────────────────────

/// An opaque host object handle (a buffer, a window, …).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pointer(pub usize);

impl fmt::Display for Pointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Parse the `0x…` form produced by [`Pointer`]'s `Display`.
pub fn parse_pointer(text: &str) -> Option<Pointer> {
    let hex = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))?;
    usize::from_str_radix(hex, 16).ok().map(Pointer)
}

// ── Host trait ────────────────────────────────────────────────────────────────

/// Services the host application provides to the engine.
///
/// Only [`print`](Host::print) and [`command`](Host::command) are required;
/// the rest have sensible defaults.
pub trait Host {
    /// Print a line on `buffer`, or on the core buffer when `None`.
    fn print(&self, buffer: Option<Pointer>, line: &str);

    /// Print an error line on the core buffer.
    fn print_error(&self, line: &str) {
        self.print(None, &format!("{ERROR_PREFIX}{line}"));
    }

    /// Execute `text` on `buffer` as if the user typed it.
    fn command(&self, buffer: Pointer, text: &str);

    /// Return the text to send when `text` is plain input, `None` when it is
    /// a command directive.
    fn input_for_buffer<'a>(&self, text: &'a str) -> Option<&'a str> {
        default_input_for_buffer(text)
    }

    /// Resolve a textual handle produced by a script.
    ///
    /// `script` and `function` identify the caller for diagnostics.
    fn str_to_ptr(
        &self,
        _script: Option<&str>,
        _function: Option<&str>,
        text: &str,
    ) -> Option<Pointer> {
        parse_pointer(text)
    }

    /// Render a handle as text for a script.
    fn ptr_to_str(&self, pointer: Pointer) -> String {
        pointer.to_string()
    }

    /// Broadcast a signal on the host's notification bus.
    fn signal_send(&self, _signal: &str, _data: &str) {}

    /// Re-attach buffers owned by a freshly loaded script to its callbacks.
    fn set_buffer_callbacks(&self, _script: &str) {}

    /// License of the host application, compared against a script's license
    /// when the `check_license` option is on.
    fn license(&self) -> &str {
        "GPL3"
    }
}

/// Command-prefix rule: `/cmd` is a command; `//text` is the literal
/// `/text`; `/*` and `/path/file` (a second `/` before any space) are plain
/// input.
pub fn default_input_for_buffer(text: &str) -> Option<&str> {
    let Some(rest) = text.strip_prefix('/') else {
        return Some(text);
    };
    if rest.starts_with('/') {
        return Some(rest);
    }
    if rest.starts_with('*') {
        return Some(text);
    }
    match (rest.find('/'), rest.find(' ')) {
        (Some(_), None) => Some(text),
        (Some(slash), Some(space)) if slash < space => Some(text),
        _ => None,
    }
}

// ── RecordingHost ─────────────────────────────────────────────────────────────

/// One call made by the engine into a [`RecordingHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Print { buffer: Option<Pointer>, line: String },
    Command { buffer: Pointer, text: String },
    Signal { signal: String, data: String },
    BufferCallbacks { script: String },
}

/// A [`Host`] that records every call.
#[derive(Debug, Default)]
pub struct RecordingHost {
    events: RefCell<Vec<HostEvent>>,
    license: Option<String>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// A recording host that reports `license` as its own.
    pub fn with_license(license: impl Into<String>) -> Self {
        Self { events: RefCell::default(), license: Some(license.into()) }
    }

    /// Snapshot of every recorded event, oldest first.
    pub fn events(&self) -> Vec<HostEvent> {
        self.events.borrow().clone()
    }

    /// Remove and return every recorded event.
    pub fn take(&self) -> Vec<HostEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    /// Lines printed on the core buffer.
    pub fn core_lines(&self) -> Vec<String> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                HostEvent::Print { buffer: None, line } => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    /// Error lines, without [`ERROR_PREFIX`].
    pub fn errors(&self) -> Vec<String> {
        self.core_lines()
            .into_iter()
            .filter_map(|l| l.strip_prefix(ERROR_PREFIX).map(str::to_owned))
            .collect()
    }

    /// Signals sent, as `(signal, data)` pairs.
    pub fn signals(&self) -> Vec<(String, String)> {
        self.events
            .borrow()
            .iter()
            .filter_map(|e| match e {
                HostEvent::Signal { signal, data } => Some((signal.clone(), data.clone())),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: HostEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl Host for RecordingHost {
    fn print(&self, buffer: Option<Pointer>, line: &str) {
        self.record(HostEvent::Print { buffer, line: line.to_owned() });
    }

    fn command(&self, buffer: Pointer, text: &str) {
        self.record(HostEvent::Command { buffer, text: text.to_owned() });
    }

    fn signal_send(&self, signal: &str, data: &str) {
        self.record(HostEvent::Signal { signal: signal.to_owned(), data: data.to_owned() });
    }

    fn set_buffer_callbacks(&self, script: &str) {
        self.record(HostEvent::BufferCallbacks { script: script.to_owned() });
    }

    fn license(&self) -> &str {
        self.license.as_deref().unwrap_or("GPL3")
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
