//! Standard stream redirection for a single execution.
//!
//! Input is handed to the interpreter as a bound global rather than
//! spliced into source text, so quotes, backslashes and newlines in the
//! payload need no escaping and cannot alter the preamble.

use serde_json::Value;

use crate::{
    constants::{STDIN_GLOBAL, STDOUT_GLOBAL},
    core::{
        errors::{HarnessError, Result},
        traits::runtime::Interpreter,
    },
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRedirector {
    stdin_buffer: String,
}

impl StreamRedirector {
    pub fn new(stdin_payload: &[String]) -> Self {
        Self {
            stdin_buffer: stdin_payload.join("\n"),
        }
    }

    pub fn stdin_buffer(&self) -> &str {
        &self.stdin_buffer
    }

    /// Source that must run immediately before the submission.
    pub fn preamble() -> String {
        format!(
            "import sys\n\
             import io\n\
             sys.stdin = io.StringIO({STDIN_GLOBAL})\n\
             {STDOUT_GLOBAL} = sys.stdout = io.StringIO()\n"
        )
    }

    /// Preamble and submission as one unit of evaluation.
    pub fn wrap(&self, source_code: &str) -> String {
        let mut unit = Self::preamble();
        unit.push_str(source_code);
        unit
    }

    /// Binds the input buffer inside the interpreter.
    pub async fn bind(&self, interpreter: &dyn Interpreter) -> Result<()> {
        interpreter
            .set_global(STDIN_GLOBAL, Value::String(self.stdin_buffer.clone()))
            .await
    }

    /// Reads what the submission wrote to standard output.
    pub async fn capture(interpreter: &dyn Interpreter) -> Result<String> {
        let value = interpreter
            .evaluate_expression(&format!("{STDOUT_GLOBAL}.getvalue()"))
            .await?;

        match value {
            Value::String(s) => Ok(s),
            other => Err(HarnessError::Protocol(format!(
                "capture buffer is not a string: {other}"
            ))),
        }
    }
}
