use std::sync::Arc;

use tokio::sync::mpsc::{Sender, channel};
use tokio_stream::wrappers::ReceiverStream;

use crate::core::{
    domain::{Evaluation, EvaluationEvent, ExecutionRequest, Example, TestVerdict},
    engine::ExecutionEngine,
};

const EVENT_CHANNEL_CAPACITY: usize = 128;

/// Grades a submission against labeled examples.
///
/// Examples run one after another in list order; the engine is shared
/// and never sees two of them at once.
#[derive(Debug, Clone)]
pub struct TestEvaluator {
    engine: Arc<ExecutionEngine>,
}

impl TestEvaluator {
    pub fn new(engine: Arc<ExecutionEngine>) -> Self {
        Self { engine }
    }

    #[tracing::instrument(skip(self, code, example), fields(example_id = %example.id))]
    pub async fn evaluate_one(&self, code: &str, example: &Example) -> TestVerdict {
        let request = ExecutionRequest::new(code, example.input.iter().cloned());
        let result = self.engine.run(request).await;
        let verdict = TestVerdict::judge(example, &result);

        tracing::debug!(passed = verdict.passed, "Example evaluated");
        verdict
    }

    #[tracing::instrument(skip_all, fields(examples = examples.len()))]
    pub async fn evaluate_all(&self, code: &str, examples: &[Example]) -> Evaluation {
        let mut verdicts = Vec::with_capacity(examples.len());
        for example in examples {
            verdicts.push(self.evaluate_one(code, example).await);
        }

        let evaluation = Evaluation::new(verdicts);
        tracing::info!(
            all_passed = evaluation.aggregate.all_passed,
            "Evaluation finished: {}",
            evaluation.aggregate.summary()
        );
        evaluation
    }

    /// Same as [`evaluate_all`](Self::evaluate_all), but reports every
    /// verdict as soon as it is known.
    ///
    /// Dropping the stream stops the evaluation before the next example.
    pub fn stream_all(&self, code: String, examples: Vec<Example>) -> ReceiverStream<EvaluationEvent> {
        let (event_tx, event_rx) = channel(EVENT_CHANNEL_CAPACITY);
        let evaluator = self.clone();

        tokio::spawn(async move {
            if evaluator.stream_events(&code, &examples, &event_tx).await.is_none() {
                tracing::debug!("Evaluation stream closed by receiver");
            }
        });

        ReceiverStream::new(event_rx)
    }

    async fn stream_events(
        &self,
        code: &str,
        examples: &[Example],
        event_tx: &Sender<EvaluationEvent>,
    ) -> Option<()> {
        event_tx
            .send(EvaluationEvent::Started {
                total: examples.len(),
            })
            .await
            .ok()?;

        let mut verdicts = Vec::with_capacity(examples.len());
        for (index, example) in examples.iter().enumerate() {
            let verdict = self.evaluate_one(code, example).await;
            verdicts.push(verdict.clone());
            event_tx
                .send(EvaluationEvent::Verdict { index, verdict })
                .await
                .ok()?;
        }

        event_tx
            .send(EvaluationEvent::Finished(Evaluation::new(verdicts)))
            .await
            .ok()
    }
}
