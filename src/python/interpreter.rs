use serde_json::Value;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines},
    process::{Child, ChildStderr, ChildStdin, ChildStdout},
    sync::Mutex,
};

use crate::{
    core::{
        errors::{HarnessError, Result},
        traits::runtime::Interpreter,
    },
    python::protocol::{self, Request},
};

#[derive(Debug)]
struct DriverProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl DriverProcess {
    /// Writes one request line and reads one reply line. `None` means the
    /// driver closed its end.
    async fn exchange(&mut self, line: &str) -> std::io::Result<Option<String>> {
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;
        self.stdout.next_line().await
    }
}

/// Client side of a running driver process.
#[derive(Debug)]
pub struct PythonInterpreter {
    pid: Option<u32>,
    process: Mutex<Option<DriverProcess>>,
}

impl PythonInterpreter {
    pub(crate) fn new(child: Child, stdin: ChildStdin, stdout: Lines<BufReader<ChildStdout>>) -> Self {
        Self {
            pid: child.id(),
            process: Mutex::new(Some(DriverProcess {
                child,
                stdin,
                stdout,
            })),
        }
    }

    /// One request, one reply.
    ///
    /// The process is taken out of its slot for the duration of the
    /// exchange and only put back once a well-formed reply has been read.
    /// A failed or interrupted exchange drops it, which kills the child,
    /// and every later call reports [`HarnessError::RuntimeLost`].
    async fn round_trip(&self, request: Request<'_>) -> Result<Value> {
        let line = protocol::encode(&request)?;
        let mut slot = self.process.lock().await;
        let mut process = slot
            .take()
            .ok_or_else(|| HarnessError::RuntimeLost("interpreter is not running".to_string()))?;

        let reply = match process.exchange(&line).await {
            Ok(Some(reply)) => reply,
            Ok(None) => return Err(self.lost("interpreter exited".to_string())),
            Err(e) => return Err(self.lost(e.to_string())),
        };
        let response = protocol::decode(&reply).map_err(|e| match e {
            HarnessError::Protocol(msg) => self.lost(format!("unreadable reply: {msg}")),
            other => other,
        })?;

        *slot = Some(process);
        response.into_result()
    }

    fn lost(&self, reason: String) -> HarnessError {
        tracing::warn!(pid = ?self.pid, reason = %reason, "Interpreter channel lost");
        HarnessError::RuntimeLost(reason)
    }
}

#[async_trait::async_trait]
impl Interpreter for PythonInterpreter {
    #[tracing::instrument(skip_all)]
    async fn evaluate(&self, source: &str) -> Result<()> {
        tracing::debug!(pid = ?self.pid, bytes = source.len(), "Evaluating source");
        self.round_trip(Request::Exec { source }).await.map(|_| ())
    }

    async fn evaluate_expression(&self, source: &str) -> Result<Value> {
        self.round_trip(Request::Eval { source }).await
    }

    async fn set_global(&self, name: &str, value: Value) -> Result<()> {
        self.round_trip(Request::Set {
            name,
            value: &value,
        })
        .await
        .map(|_| ())
    }

    async fn get_global(&self, name: &str) -> Result<Value> {
        self.round_trip(Request::Get { name }).await
    }

    #[tracing::instrument(skip_all)]
    async fn shutdown(&self) {
        let Some(mut process) = self.process.lock().await.take() else {
            return;
        };

        if let Err(e) = process.child.kill().await {
            tracing::warn!(pid = ?self.pid, "Failed to kill interpreter process: {}", e);
        } else {
            tracing::info!(pid = ?self.pid, "Interpreter process stopped");
        }
    }
}

/// Forwards the driver's stderr to the log. Stray writes from
/// submissions that bypass the redirect end up here too.
pub(crate) fn forward_stderr(stderr: ChildStderr, pid: Option<u32>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::debug!(pid = ?pid, "interpreter stderr: {}", line);
        }
    });
}
