use serde_json::Value;

use crate::core::errors::Result;

/// A live embedded interpreter.
///
/// Implementations are not required to serialize callers; the
/// `ExecutionEngine` holds its own gate in front of every evaluation.
#[mockall::automock]
#[async_trait::async_trait]
pub trait Interpreter: std::fmt::Debug + Send + Sync {
    /// Executes `source` as a module body in the shared namespace.
    async fn evaluate(&self, source: &str) -> Result<()>;

    async fn evaluate_expression(&self, source: &str) -> Result<Value>;

    async fn set_global(&self, name: &str, value: Value) -> Result<()>;

    async fn get_global(&self, name: &str) -> Result<Value>;

    /// Stops the interpreter. Further calls fail with a protocol error.
    async fn shutdown(&self);
}

/// Produces a fresh [`Interpreter`]. Called once per bootstrap and again
/// for every recycle.
#[mockall::automock]
#[async_trait::async_trait]
pub trait RuntimeLoader: std::fmt::Debug + Send + Sync {
    async fn load(&self) -> Result<Box<dyn Interpreter>>;
}
