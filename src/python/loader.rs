use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use tempfile::NamedTempFile;
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    process::Command,
};

use crate::{
    core::{
        errors::{HarnessError, Result},
        traits::runtime::{Interpreter, RuntimeLoader},
    },
    python::{
        DRIVER_SOURCE,
        interpreter::{PythonInterpreter, forward_stderr},
        protocol,
    },
};

/// Starts a Python interpreter process running the embedded driver.
#[derive(Clone, Debug)]
pub struct PythonLoader {
    python: PathBuf,
}

impl PythonLoader {
    pub fn new<T: AsRef<Path>>(python: T) -> Self {
        PythonLoader {
            python: python.as_ref().into(),
        }
    }

    pub fn python(&self) -> &Path {
        &self.python
    }

    fn write_driver() -> Result<NamedTempFile> {
        let mut script = tempfile::Builder::new()
            .prefix("coderunner-driver-")
            .suffix(".py")
            .tempfile()?;
        script.write_all(DRIVER_SOURCE.as_bytes())?;
        script.flush()?;
        Ok(script)
    }

    async fn bootstrap(&self, script: &Path) -> Result<PythonInterpreter> {
        let mut child = Command::new(&self.python)
            .arg("-u")
            .arg(script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                HarnessError::BootstrapFailed(format!(
                    "failed to start {}: {}",
                    self.python.display(),
                    e
                ))
            })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            return Err(HarnessError::BootstrapFailed(
                "interpreter pipes are unavailable".to_string(),
            ));
        };
        forward_stderr(stderr, child.id());

        let mut stdout = BufReader::new(stdout).lines();
        let line = stdout.next_line().await?.ok_or_else(|| {
            HarnessError::BootstrapFailed("interpreter exited during bootstrap".to_string())
        })?;
        let handshake = protocol::decode_handshake(&line)?;
        if !handshake.ready {
            return Err(HarnessError::BootstrapFailed(
                "driver reported it is not ready".to_string(),
            ));
        }

        tracing::info!(
            pid = ?child.id(),
            version = %handshake.version,
            "Interpreter process ready"
        );
        Ok(PythonInterpreter::new(child, stdin, stdout))
    }
}

#[async_trait::async_trait]
impl RuntimeLoader for PythonLoader {
    #[tracing::instrument]
    async fn load(&self) -> Result<Box<dyn Interpreter>> {
        // The script only has to exist until the driver has started; it
        // is removed when `script` drops, on success and on failure.
        let script = Self::write_driver()?;
        tracing::debug!(script = %script.path().display(), "Driver script written");

        let interpreter = self.bootstrap(script.path()).await?;
        Ok(Box::new(interpreter))
    }
}
