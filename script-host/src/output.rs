//! Captured script output (stdout/stderr) and where it goes.
//!
//! Scripts never write to the real standard streams.  Everything they print
//! lands in one [`OutputCapture`] buffer which is flushed line by line:
//! normally to the core buffer with the script name attached, during an
//! eval to the eval's destination buffer, either printed or sent as input.

use crate::host::{Host, Pointer};
use crate::PLUGIN_NAME;

/// Destination of output produced during one eval call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalSession {
    /// Buffer receiving the output; `None` keeps it captured.
    pub buffer: Option<Pointer>,
    /// Send output as input on the buffer instead of printing it.
    pub send_input: bool,
    /// With `send_input`, let commands in the output execute.
    pub exec_commands: bool,
}

/// Text taken out of the buffer, ready to hand to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Input for a buffer; commands allowed when `exec_commands`.
    Input { buffer: Pointer, text: String, exec_commands: bool },
    /// Printed on an eval destination buffer.
    Print { buffer: Pointer, text: String },
    /// Printed on the core buffer, attributed to a script.
    Log { script: Option<String>, text: String },
}

impl Delivery {
    pub fn deliver(&self, host: &dyn Host) {
        match self {
            Delivery::Input { buffer, text, exec_commands: true } => host.command(*buffer, text),
            Delivery::Input { buffer, text, exec_commands: false } => {
                if host.input_for_buffer(text).is_some() {
                    host.command(*buffer, text);
                } else {
                    host.command(*buffer, &escape_directive(text));
                }
            }
            Delivery::Print { buffer, text } => host.print(Some(*buffer), text),
            Delivery::Log { script, text } => host.print(
                None,
                &format!(
                    "{PLUGIN_NAME}: stdout/stderr ({}): {text}",
                    script.as_deref().unwrap_or("?")
                ),
            ),
        }
    }
}

/// Double the leading character so the host reads a directive as literal
/// text.  An empty result becomes a single space.
fn escape_directive(text: &str) -> String {
    let escaped = match text.chars().next() {
        Some(first) => format!("{first}{text}"),
        None => String::new(),
    };
    if escaped.is_empty() {
        " ".to_owned()
    } else {
        escaped
    }
}

// ── OutputCapture ─────────────────────────────────────────────────────────────

/// The output buffer plus the current eval session, if any.
#[derive(Debug, Default)]
pub struct OutputCapture {
    buffer: String,
    eval: Option<EvalSession>,
}

impl OutputCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append text without flushing.
    pub fn push(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    /// Text accumulated since the last flush.
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Empty the buffer and return what it held.
    pub fn take_buffer(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }

    pub fn begin_eval(&mut self, session: EvalSession) {
        self.eval = Some(session);
    }

    pub fn end_eval(&mut self) {
        self.eval = None;
    }

    pub fn eval_session(&self) -> Option<EvalSession> {
        self.eval
    }

    /// An eval without destination is running: output is kept, not flushed.
    pub fn is_capturing(&self) -> bool {
        matches!(self.eval, Some(EvalSession { buffer: None, .. }))
    }

    /// Take the buffer for delivery.
    ///
    /// Returns `None` (and keeps the text) when there is nothing to flush or
    /// when an eval without destination is capturing.  The buffer is empty
    /// before the returned delivery reaches the host, so output written
    /// during delivery starts a fresh line.
    pub fn take_delivery(&mut self, script: Option<&str>) -> Option<Delivery> {
        if self.buffer.is_empty() {
            return None;
        }
        let delivery = match self.eval {
            Some(EvalSession { buffer: None, .. }) => return None,
            Some(EvalSession { buffer: Some(buffer), send_input: true, exec_commands }) => {
                Delivery::Input { buffer, text: self.take_buffer(), exec_commands }
            }
            Some(EvalSession { buffer: Some(buffer), send_input: false, .. }) => {
                Delivery::Print { buffer, text: self.take_buffer() }
            }
            None => Delivery::Log { script: script.map(str::to_owned), text: self.take_buffer() },
        };
        Some(delivery)
    }
}

/// Split `text` on newlines for [`OutputCapture`].
///
/// Returns the complete lines (each of which must be followed by a flush)
/// and the trailing partial line.
pub fn split_lines(text: &str) -> (Vec<&str>, &str) {
    let mut lines: Vec<&str> = text.split('\n').collect();
    let rest = lines.pop().unwrap_or("");
    (lines, rest)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{HostEvent, RecordingHost};

    const BUF: Pointer = Pointer(0x42);

    fn session(buffer: Option<Pointer>, send_input: bool, exec_commands: bool) -> EvalSession {
        EvalSession { buffer, send_input, exec_commands }
    }

    #[test]
    fn split_lines_keeps_partial_tail() {
        assert_eq!(split_lines("a\nb\nc"), (vec!["a", "b"], "c"));
        assert_eq!(split_lines("\n"), (vec![""], ""));
        assert_eq!(split_lines("abc"), (vec![], "abc"));
    }

    #[test]
    fn empty_buffer_never_delivers() {
        let mut out = OutputCapture::new();
        assert!(out.take_delivery(Some("s")).is_none());
    }

    #[test]
    fn normal_output_is_attributed() {
        let host = RecordingHost::new();
        let mut out = OutputCapture::new();
        out.push("hello");
        out.take_delivery(Some("myscript")).unwrap().deliver(&host);
        assert_eq!(host.core_lines(), vec!["lua: stdout/stderr (myscript): hello"]);
        assert_eq!(out.pending(), "");
    }

    #[test]
    fn unknown_script_is_question_mark() {
        let host = RecordingHost::new();
        let mut out = OutputCapture::new();
        out.push("x");
        out.take_delivery(None).unwrap().deliver(&host);
        assert_eq!(host.core_lines(), vec!["lua: stdout/stderr (?): x"]);
    }

    #[test]
    fn eval_without_destination_keeps_text() {
        let mut out = OutputCapture::new();
        out.begin_eval(session(None, false, false));
        out.push("kept");
        assert!(out.is_capturing());
        assert!(out.take_delivery(Some("__eval__")).is_none());
        assert_eq!(out.pending(), "kept");
        out.end_eval();
        assert!(out.eval_session().is_none());
    }

    #[test]
    fn eval_print_goes_to_destination() {
        let host = RecordingHost::new();
        let mut out = OutputCapture::new();
        out.begin_eval(session(Some(BUF), false, false));
        out.push("42");
        out.take_delivery(None).unwrap().deliver(&host);
        assert_eq!(host.events(), vec![HostEvent::Print { buffer: Some(BUF), line: "42".into() }]);
    }

    #[test]
    fn eval_exec_commands_sends_verbatim() {
        let host = RecordingHost::new();
        let mut out = OutputCapture::new();
        out.begin_eval(session(Some(BUF), true, true));
        out.push("/quit");
        out.take_delivery(None).unwrap().deliver(&host);
        assert_eq!(host.events(), vec![HostEvent::Command { buffer: BUF, text: "/quit".into() }]);
    }

    #[test]
    fn eval_input_escapes_directives() {
        let host = RecordingHost::new();
        let mut out = OutputCapture::new();
        out.begin_eval(session(Some(BUF), true, false));
        out.push("/quit");
        out.take_delivery(None).unwrap().deliver(&host);
        out.push("hello");
        out.take_delivery(None).unwrap().deliver(&host);
        assert_eq!(
            host.events(),
            vec![
                HostEvent::Command { buffer: BUF, text: "//quit".into() },
                HostEvent::Command { buffer: BUF, text: "hello".into() },
            ]
        );
    }

    #[test]
    fn escape_directive_never_empty() {
        assert_eq!(escape_directive(""), " ");
        assert_eq!(escape_directive("/x"), "//x");
    }
}
