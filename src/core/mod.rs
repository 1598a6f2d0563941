pub mod domain;
pub mod engine;
pub mod errors;
pub mod evaluator;
pub mod guard;
pub mod redirect;
pub mod runtime_handle;
pub mod traits;
