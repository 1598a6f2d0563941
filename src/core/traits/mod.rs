pub mod guard;
pub mod runtime;
