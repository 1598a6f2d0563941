use std::collections::HashMap;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use std::time::Duration;

use serde_json::Value;

use crate::{
    constants::{STDIN_GLOBAL, STDOUT_GLOBAL},
    core::{
        errors::{HarnessError, Result},
        traits::runtime::{Interpreter, RuntimeLoader},
    },
};

/// Behaviour of a stubbed program: `(source, stdin) -> stdout | error`.
pub type Program = Arc<dyn Fn(&str, &str) -> std::result::Result<String, String> + Send + Sync>;

/// In-memory interpreter that runs a Rust closure instead of real code.
///
/// It honours the redirect contract: stdin is read from the bound
/// global, and the produced output is returned by any expression on the
/// capture buffer.
#[derive(Clone)]
pub struct InterpreterStub {
    program: Program,
    delay: Duration,
    globals: Arc<Mutex<HashMap<String, Value>>>,
    evaluations: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl std::fmt::Debug for InterpreterStub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterpreterStub")
            .field("delay", &self.delay)
            .field("evaluations", &self.evaluations)
            .finish()
    }
}

impl InterpreterStub {
    pub fn new<F>(program: F, delay: Duration) -> Self
    where
        F: Fn(&str, &str) -> std::result::Result<String, String> + Send + Sync + 'static,
    {
        Self {
            program: Arc::new(program),
            delay,
            globals: Arc::new(Mutex::new(HashMap::new())),
            evaluations: Arc::new(AtomicUsize::new(0)),
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Prints every input line back.
    pub fn echo() -> Self {
        Self::new(|_, stdin| Ok(stdin.to_string()), Duration::ZERO)
    }

    pub fn evaluations(&self) -> Arc<AtomicUsize> {
        self.evaluations.clone()
    }

    /// Highest number of evaluations observed running at the same time.
    pub fn peak_concurrency(&self) -> Arc<AtomicUsize> {
        self.peak.clone()
    }

    fn global(&self, name: &str) -> Value {
        self.globals
            .lock()
            .ok()
            .and_then(|g| g.get(name).cloned())
            .unwrap_or(Value::Null)
    }

    fn store(&self, name: &str, value: Value) {
        if let Ok(mut globals) = self.globals.lock() {
            globals.insert(name.to_string(), value);
        }
    }
}

#[async_trait::async_trait]
impl Interpreter for InterpreterStub {
    #[tracing::instrument(skip(source))]
    async fn evaluate(&self, source: &str) -> Result<()> {
        tracing::debug!("Start evaluation: source={:?}", source);
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);

        let stdin = match self.global(STDIN_GLOBAL) {
            Value::String(s) => s,
            _ => String::new(),
        };
        let outcome = (self.program)(source, &stdin);
        tracing::debug!("Evaluation result: {:?}", outcome);

        match outcome {
            Ok(stdout) => {
                self.store(STDOUT_GLOBAL, Value::String(stdout));
                Ok(())
            }
            Err(msg) => Err(HarnessError::Evaluation(msg)),
        }
    }

    async fn evaluate_expression(&self, source: &str) -> Result<Value> {
        if source.starts_with(STDOUT_GLOBAL) {
            return Ok(self.global(STDOUT_GLOBAL));
        }
        Ok(self.global(source))
    }

    async fn set_global(&self, name: &str, value: Value) -> Result<()> {
        self.store(name, value);
        Ok(())
    }

    async fn get_global(&self, name: &str) -> Result<Value> {
        Ok(self.global(name))
    }

    async fn shutdown(&self) {}
}

#[derive(Debug, Clone)]
pub struct LoaderStub {
    result: std::result::Result<InterpreterStub, String>,
    delay: Duration,
    loads: Arc<AtomicUsize>,
}

impl LoaderStub {
    pub fn ready(interpreter: InterpreterStub, delay: Duration) -> Self {
        Self {
            result: Ok(interpreter),
            delay,
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(reason: &str, delay: Duration) -> Self {
        Self {
            result: Err(reason.to_string()),
            delay,
            loads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of times the loader was asked for a runtime.
    pub fn loads(&self) -> Arc<AtomicUsize> {
        self.loads.clone()
    }
}

#[async_trait::async_trait]
impl RuntimeLoader for LoaderStub {
    #[tracing::instrument]
    async fn load(&self) -> Result<Box<dyn Interpreter>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        tracing::debug!("Start bootstrap");
        tokio::time::sleep(self.delay).await;
        tracing::debug!("Bootstrap result: {:?}", self.result);

        match &self.result {
            Ok(interpreter) => Ok(Box::new(interpreter.clone())),
            Err(reason) => Err(HarnessError::BootstrapFailed(reason.clone())),
        }
    }
}
