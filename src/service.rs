use std::sync::Arc;

use tokio_stream::wrappers::ReceiverStream;

use crate::{
    config::HarnessConfig,
    core::{
        domain::{Evaluation, EvaluationEvent, ExecutionRequest, ExecutionResult, Example, RuntimeState},
        engine::ExecutionEngine,
        errors::Result,
        evaluator::TestEvaluator,
        runtime_handle::RuntimeHandle,
        traits::runtime::RuntimeLoader,
    },
    python::PythonLoader,
};

/// One grading session: a single runtime, one engine in front of it and
/// an evaluator on top.
///
/// Cloning is cheap and every clone talks to the same runtime.
#[derive(Clone, Debug)]
pub struct Harness {
    runtime: Arc<RuntimeHandle>,
    engine: Arc<ExecutionEngine>,
    evaluator: TestEvaluator,
}

impl Harness {
    /// A session backed by a real interpreter process.
    pub fn new(config: &HarnessConfig) -> Self {
        Self::with_loader(Arc::new(PythonLoader::new(&config.python)), config)
    }

    pub fn with_loader(loader: Arc<dyn RuntimeLoader>, config: &HarnessConfig) -> Self {
        let runtime = Arc::new(RuntimeHandle::new(loader, config.bootstrap_timeout));
        let engine = Arc::new(ExecutionEngine::new(
            runtime.clone(),
            Arc::new(config.guard()),
            config.execution_timeout,
        ));
        let evaluator = TestEvaluator::new(engine.clone());

        Self {
            runtime,
            engine,
            evaluator,
        }
    }

    /// Kicks off the bootstrap in the background and returns at once.
    /// Runs submitted before it settles report the runtime as not ready.
    pub fn start(&self) {
        let runtime = self.runtime.clone();
        tokio::spawn(async move {
            if let Err(e) = runtime.initialize().await {
                tracing::error!("Background bootstrap failed: {}", e);
            }
        });
    }

    /// Brings the runtime up and waits for the outcome.
    pub async fn initialize(&self) -> Result<()> {
        self.runtime.initialize().await
    }

    pub fn state(&self) -> RuntimeState {
        self.runtime.state()
    }

    #[tracing::instrument(skip_all)]
    pub async fn run(&self, code: &str, input: &str) -> ExecutionResult {
        self.engine.run(ExecutionRequest::from_text(code, input)).await
    }

    pub async fn evaluate(&self, code: &str, examples: &[Example]) -> Evaluation {
        self.evaluator.evaluate_all(code, examples).await
    }

    pub fn stream(&self, code: String, examples: Vec<Example>) -> ReceiverStream<EvaluationEvent> {
        self.evaluator.stream_all(code, examples)
    }

    /// Stops the interpreter process, if one is running. The session
    /// reports the runtime as not ready from then on.
    pub async fn shutdown(&self) {
        self.runtime.shutdown().await;
    }
}
