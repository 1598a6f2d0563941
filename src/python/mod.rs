//! Python runtime backed by a long-lived interpreter process.
//!
//! The process runs a small driver (`driver.py`) that keeps one shared
//! namespace and answers line-delimited JSON requests. The driver moves
//! its protocol channels off fds 0 and 1 before any submission runs, so
//! submitted code cannot read or corrupt them through the standard
//! streams.

pub mod interpreter;
pub mod loader;
pub mod protocol;

pub use interpreter::PythonInterpreter;
pub use loader::PythonLoader;

pub(crate) const DRIVER_SOURCE: &str = include_str!("driver.py");
