use std::sync::Arc;
use std::time::Duration;

use tokio::{sync::Mutex, time::Instant};
use tracing::Instrument;

use crate::{
    constants::TIMEOUT_MSG,
    core::{
        domain::{ExecutionRequest, ExecutionResult, ExecutionStatus},
        errors::HarnessError,
        redirect::StreamRedirector,
        runtime_handle::RuntimeHandle,
        traits::guard::{Guard, GuardVerdict},
    },
};

/// Runs one submission against one input payload.
///
/// Every run holds `gate` from before the readiness check until the
/// capture buffer has been read, so at most one execution touches the
/// shared interpreter at a time. Waiters are served in arrival order.
///
/// The interpreter namespace is not reset between runs: anything a
/// submission defines stays visible to the next one. Only the standard
/// streams are rebound each time.
#[derive(Debug)]
pub struct ExecutionEngine {
    worker: Worker,
    gate: Arc<Mutex<()>>,
}

#[derive(Debug, Clone)]
struct Worker {
    runtime: Arc<RuntimeHandle>,
    guard: Arc<dyn Guard>,
    timeout: Option<Duration>,
}

impl ExecutionEngine {
    pub fn new(runtime: Arc<RuntimeHandle>, guard: Arc<dyn Guard>, timeout: Option<Duration>) -> Self {
        Self {
            worker: Worker {
                runtime,
                guard,
                timeout,
            },
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// The execution itself runs on its own task and keeps the gate until
    /// it is done, so a caller that stops waiting never leaves the
    /// interpreter halfway through an exchange.
    #[tracing::instrument(skip(self, request), fields(request_id = %request.id))]
    pub async fn run(&self, request: ExecutionRequest) -> ExecutionResult {
        let turn = self.gate.clone().lock_owned().await;
        let started = Instant::now();
        let request_id = request.id;
        let worker = self.worker.clone();

        let task = tokio::spawn(
            async move {
                let _turn = turn;
                worker.execute(&request).await
            }
            .in_current_span(),
        );
        let status = match task.await {
            Ok(status) => status,
            Err(e) => {
                tracing::error!("Execution task failed: {}", e);
                ExecutionStatus::RuntimeError(e.to_string())
            }
        };
        tracing::debug!("Execution status: {:?}", status);

        ExecutionResult {
            request_id,
            status,
            elapsed: started.elapsed(),
        }
    }
}

impl Worker {
    async fn execute(&self, request: &ExecutionRequest) -> ExecutionStatus {
        let interpreter = match self.runtime.get() {
            Ok(interpreter) => interpreter,
            Err(_) => {
                tracing::info!("Runtime not ready, skipping execution");
                return ExecutionStatus::RuntimeNotReady;
            }
        };

        if let GuardVerdict::Rejected(reason) = self.guard.check(&request.source_code) {
            tracing::info!(reason = %reason, "Submission rejected by guard");
            return ExecutionStatus::GuardRejected(reason);
        }

        let redirector = StreamRedirector::new(&request.stdin_payload);
        let unit = redirector.wrap(&request.source_code);

        let evaluation = async {
            redirector.bind(interpreter.as_ref()).await?;
            interpreter.evaluate(&unit).await?;
            StreamRedirector::capture(interpreter.as_ref()).await
        };

        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, evaluation).await {
                Ok(outcome) => outcome,
                Err(_) => Err(HarnessError::Timeout(limit)),
            },
            None => evaluation.await,
        };

        match outcome {
            Ok(output) => ExecutionStatus::Ok(output),
            Err(HarnessError::Evaluation(msg)) => ExecutionStatus::RuntimeError(msg),
            Err(HarnessError::Timeout(limit)) => {
                tracing::warn!("Execution exceeded {:?}", limit);
                self.replace_runtime().await;
                ExecutionStatus::RuntimeError(TIMEOUT_MSG.to_string())
            }
            Err(e) => {
                tracing::error!("Runtime failure during execution: {}", e);
                self.replace_runtime().await;
                ExecutionStatus::RuntimeError(e.to_string())
            }
        }
    }

    /// Anything but an exception raised by the submission leaves the
    /// interpreter in an unknown state.
    async fn replace_runtime(&self) {
        if let Err(e) = self.runtime.recycle().await {
            tracing::error!("Failed to recycle runtime: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        constants::{INFINITE_LOOP_MSG, STDIN_GLOBAL},
        core::{
            domain::RuntimeState,
            guard::LoopGuard,
            traits::runtime::{Interpreter, MockInterpreter, MockRuntimeLoader},
        },
        stubs::runtime::{InterpreterStub, LoaderStub},
    };
    use serde_json::Value;
    use std::sync::atomic::Ordering;

    async fn ready_engine(interpreter: InterpreterStub, timeout: Option<Duration>) -> ExecutionEngine {
        let handle = Arc::new(RuntimeHandle::new(
            Arc::new(LoaderStub::ready(interpreter, Duration::ZERO)),
            Duration::from_secs(1),
        ));
        handle.initialize().await.unwrap();
        ExecutionEngine::new(handle, Arc::new(LoopGuard::new()), timeout)
    }

    async fn engine_with_mock(interpreter: MockInterpreter) -> ExecutionEngine {
        let interpreter = Arc::new(std::sync::Mutex::new(Some(interpreter)));
        let mut loader = MockRuntimeLoader::new();
        loader.expect_load().times(1).returning(move || {
            let interpreter = interpreter.lock().unwrap().take().unwrap();
            Ok(Box::new(interpreter) as Box<dyn Interpreter>)
        });
        let handle = Arc::new(RuntimeHandle::new(Arc::new(loader), Duration::from_secs(1)));
        handle.initialize().await.unwrap();
        ExecutionEngine::new(handle, Arc::new(LoopGuard::new()), None)
    }

    #[tokio::test]
    async fn test_not_ready_runtime() {
        let handle = Arc::new(RuntimeHandle::new(
            Arc::new(LoaderStub::ready(InterpreterStub::echo(), Duration::ZERO)),
            Duration::from_secs(1),
        ));
        let engine = ExecutionEngine::new(handle, Arc::new(LoopGuard::new()), None);

        let result = engine.run(ExecutionRequest::new("print(1)", ["x"])).await;

        assert_eq!(result.status, ExecutionStatus::RuntimeNotReady);
    }

    #[tokio::test]
    async fn test_failed_runtime_is_not_ready() {
        let handle = Arc::new(RuntimeHandle::new(
            Arc::new(LoaderStub::failing("offline", Duration::ZERO)),
            Duration::from_secs(1),
        ));
        let _ = handle.initialize().await;
        let engine = ExecutionEngine::new(handle.clone(), Arc::new(LoopGuard::new()), None);

        let result = engine.run(ExecutionRequest::new("print(1)", Vec::<String>::new())).await;

        assert!(matches!(handle.state(), RuntimeState::Failed(_)));
        assert_eq!(result.status, ExecutionStatus::RuntimeNotReady);
    }

    #[tokio::test]
    async fn test_guard_rejection_skips_runtime() {
        let interpreter = InterpreterStub::echo();
        let evaluations = interpreter.evaluations();
        let engine = ready_engine(interpreter, None).await;

        let result = engine
            .run(ExecutionRequest::new("while True:\n    pass", ["x"]))
            .await;

        assert_eq!(
            result.status,
            ExecutionStatus::GuardRejected(INFINITE_LOOP_MSG.to_string())
        );
        assert_eq!(evaluations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_echo_round_trip() {
        let engine = ready_engine(InterpreterStub::echo(), None).await;

        let result = engine
            .run(ExecutionRequest::new("for line in sys.stdin: print(line, end='')", ["a", "b", "c"]))
            .await;

        assert!(result.is_ok());
        assert_eq!(result.status, ExecutionStatus::Ok("a\nb\nc".to_string()));
    }

    #[tokio::test]
    async fn test_user_exception_becomes_runtime_error() {
        let interpreter = InterpreterStub::new(
            |_, _| Err("SyntaxError: '(' was never closed".to_string()),
            Duration::ZERO,
        );
        let engine = ready_engine(interpreter, None).await;

        let result = engine.run(ExecutionRequest::new("print(", ["x"])).await;

        assert_eq!(
            result.status,
            ExecutionStatus::RuntimeError("SyntaxError: '(' was never closed".to_string())
        );
        assert_eq!(result.render(), "Error: SyntaxError: '(' was never closed");
    }

    #[tokio::test]
    async fn test_preamble_and_source_evaluated_as_one_unit() {
        let mut seq = mockall::Sequence::new();
        let mut interpreter = MockInterpreter::new();
        interpreter
            .expect_set_global()
            .withf(|name, value| name == STDIN_GLOBAL && value == &Value::from("hello"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| Ok(()));
        interpreter
            .expect_evaluate()
            .withf(|src| src == format!("{}print(input())", StreamRedirector::preamble()))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        interpreter
            .expect_evaluate_expression()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(Value::from("hello\n")));
        let engine = engine_with_mock(interpreter).await;

        let result = engine.run(ExecutionRequest::new("print(input())", ["hello"])).await;

        assert_eq!(result.status, ExecutionStatus::Ok("hello\n".to_string()));
    }

    #[tokio::test]
    async fn test_lost_runtime_is_replaced() {
        let mut seq = mockall::Sequence::new();
        let mut loader = MockRuntimeLoader::new();
        loader
            .expect_load()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| {
                let mut dead = MockInterpreter::new();
                dead.expect_set_global().returning(|_, _| Ok(()));
                dead.expect_evaluate()
                    .returning(|_| Err(HarnessError::RuntimeLost("interpreter exited".to_string())));
                dead.expect_shutdown().times(1).return_const(());
                Ok(Box::new(dead) as Box<dyn Interpreter>)
            });
        loader
            .expect_load()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|| {
                let mut fresh = MockInterpreter::new();
                fresh.expect_set_global().returning(|_, _| Ok(()));
                fresh.expect_evaluate().returning(|_| Ok(()));
                fresh
                    .expect_evaluate_expression()
                    .returning(|_| Ok(Value::from("ok\n")));
                Ok(Box::new(fresh) as Box<dyn Interpreter>)
            });
        let handle = Arc::new(RuntimeHandle::new(Arc::new(loader), Duration::from_secs(1)));
        handle.initialize().await.unwrap();
        let engine = ExecutionEngine::new(handle.clone(), Arc::new(LoopGuard::new()), None);

        let first = engine.run(ExecutionRequest::new("import os\nos._exit(0)", ["x"])).await;
        let second = engine.run(ExecutionRequest::new("print('ok')", ["x"])).await;

        assert_eq!(
            first.status,
            ExecutionStatus::RuntimeError("runtime lost: interpreter exited".to_string())
        );
        assert_eq!(handle.state(), RuntimeState::Ready);
        assert_eq!(second.status, ExecutionStatus::Ok("ok\n".to_string()));
    }

    #[tokio::test]
    async fn test_abandoned_run_finishes_before_next() {
        let interpreter =
            InterpreterStub::new(|_, stdin| Ok(stdin.to_string()), Duration::from_millis(100));
        let evaluations = interpreter.evaluations();
        let peak = interpreter.peak_concurrency();
        let engine = ready_engine(interpreter, None).await;

        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            engine.run(ExecutionRequest::new("print(input())", ["A"])),
        )
        .await;
        let next = engine.run(ExecutionRequest::new("print(input())", ["B"])).await;

        assert!(abandoned.is_err());
        assert_eq!(next.status, ExecutionStatus::Ok("B".to_string()));
        assert_eq!(evaluations.load(Ordering::SeqCst), 2);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_timeout_reports_and_recycles() {
        let slow = InterpreterStub::new(|_, _| Ok("late".to_string()), Duration::from_secs(5));
        let loader = LoaderStub::ready(slow, Duration::ZERO);
        let loads = loader.loads();
        let handle = Arc::new(RuntimeHandle::new(Arc::new(loader), Duration::from_secs(1)));
        handle.initialize().await.unwrap();
        let engine = ExecutionEngine::new(
            handle.clone(),
            Arc::new(LoopGuard::new()),
            Some(Duration::from_millis(50)),
        );

        let result = engine.run(ExecutionRequest::new("print(1)", ["x"])).await;

        assert_eq!(result.status, ExecutionStatus::RuntimeError(TIMEOUT_MSG.to_string()));
        assert_eq!(handle.state(), RuntimeState::Ready);
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_runs_are_serialized() {
        let interpreter =
            InterpreterStub::new(|_, stdin| Ok(stdin.to_string()), Duration::from_millis(10));
        let peak = interpreter.peak_concurrency();
        let evaluations = interpreter.evaluations();
        let engine = Arc::new(ready_engine(interpreter, None).await);

        let runs = (0..8).map(|i| {
            let engine = engine.clone();
            async move {
                engine
                    .run(ExecutionRequest::new("print(input())", [format!("{i}")]))
                    .await
            }
        });
        let results = futures::future::join_all(runs).await;

        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.status, ExecutionStatus::Ok(format!("{i}")));
        }
        assert_eq!(evaluations.load(Ordering::SeqCst), 8);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }
}
