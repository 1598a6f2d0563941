pub mod config;
pub mod constants;
pub mod core;
pub mod problems;
pub mod python;
pub mod service;

#[cfg(test)]
mod stubs;

pub use config::HarnessConfig;
pub use service::Harness;
