#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardVerdict {
    Accepted,
    Rejected(String),
}

/// Cheap static check run before any code reaches the interpreter.
pub trait Guard: std::fmt::Debug + Send + Sync {
    fn check(&self, code: &str) -> GuardVerdict;
}
