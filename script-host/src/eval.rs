//! Evaluating code typed by the user.
//!
//! Code runs inside a scratch script, [`EVAL_SCRIPT_NAME`], loaded on
//! demand.  Unless `eval_keep_context` is set the scratch script is unloaded
//! again after each evaluation, so nothing survives from one eval to the
//! next.

use crate::dispatch::{ExecArg, ResultKind};
use crate::engine::ScriptEngine;
use crate::error::{HostError, Result};
use crate::host::Pointer;
use crate::output::EvalSession;
use crate::script::ScriptId;

/// Name (and file name) of the scratch script.
pub const EVAL_SCRIPT_NAME: &str = "__eval__";

const EVAL_FUNCTION: &str = "script_lua_eval";

const EVAL_SCRIPT: &str = r#"
function script_lua_eval(code)
    local chunk, err = load(code, "=eval", "t", _ENV)
    if not chunk then
        error(err, 0)
    end
    chunk()
    return weechat.WEECHAT_RC_OK
end

weechat.register("__eval__", "", "1.0", "GPL3", "Evaluation of source code", "", "")
"#;

impl ScriptEngine {
    /// Run `code`, sending what it prints to `buffer`.
    ///
    /// With `send_input` the output is typed into the buffer instead of
    /// printed; `exec_commands` then lets commands in it execute.  With no
    /// buffer the output is captured and returned instead.
    pub fn eval(
        &mut self,
        buffer: Option<Pointer>,
        send_input: bool,
        exec_commands: bool,
        code: &str,
    ) -> Result<Option<String>> {
        let id = self.eval_script_id()?;

        self.shared.flush();
        self.shared
            .state
            .borrow_mut()
            .output
            .begin_eval(EvalSession { buffer, send_input, exec_commands });

        let _ = self.invoke(id, ResultKind::Ignore, EVAL_FUNCTION, &[ExecArg::Str(code.to_owned())]);

        self.shared.flush();
        let captured = {
            let mut st = self.shared.state.borrow_mut();
            let captured = st.output.is_capturing().then(|| st.output.take_buffer());
            st.output.end_eval();
            captured
        };

        let keep = self.shared.state.borrow().config.eval_keep_context;
        if !keep {
            let was_quiet = self.set_quiet(true);
            let _ = self.unload(id);
            self.set_quiet(was_quiet);
            self.eval_script = None;
        }
        Ok(captured)
    }

    /// Run `code` and return everything it printed.
    ///
    /// `None` when the scratch script could not be loaded.
    pub fn eval_to_string(&mut self, code: &str) -> Option<String> {
        self.eval(None, false, false, code).ok().flatten()
    }

    fn eval_script_id(&mut self) -> Result<ScriptId> {
        if let Some(id) = self.eval_script {
            return Ok(id);
        }
        let was_quiet = self.set_quiet(true);
        let loaded = self.load(EVAL_SCRIPT_NAME, Some(EVAL_SCRIPT));
        self.set_quiet(was_quiet);
        let id = loaded.map_err(|e| HostError::Eval(e.to_string()))?;
        self.eval_script = Some(id);
        Ok(id)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
