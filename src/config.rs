//! Harness configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    constants::{DEFAULT_BOOTSTRAP_TIMEOUT, DEFAULT_EXECUTION_TIMEOUT, DEFAULT_PYTHON},
    core::guard::{GuardChain, KeywordGuard, LoopGuard},
};

pub const ENV_PYTHON: &str = "CODERUNNER_PYTHON";
pub const ENV_BOOTSTRAP_TIMEOUT_MS: &str = "CODERUNNER_BOOTSTRAP_TIMEOUT_MS";
pub const ENV_EXECUTION_TIMEOUT_MS: &str = "CODERUNNER_EXECUTION_TIMEOUT_MS";
pub const ENV_RESTRICTED_KEYWORDS: &str = "CODERUNNER_RESTRICTED_KEYWORDS";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Interpreter executable, looked up on `PATH` when relative
    pub python: PathBuf,

    /// Upper bound for bringing the runtime up
    pub bootstrap_timeout: Duration,

    /// Per-execution limit; `None` lets a run take as long as it likes
    pub execution_timeout: Option<Duration>,

    /// Extra substring blacklist applied before execution. Empty disables it.
    pub restricted_keywords: Vec<String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            python: PathBuf::from(DEFAULT_PYTHON),
            bootstrap_timeout: DEFAULT_BOOTSTRAP_TIMEOUT,
            execution_timeout: Some(DEFAULT_EXECUTION_TIMEOUT),
            restricted_keywords: Vec::new(),
        }
    }
}

impl HarnessConfig {
    /// Defaults overridden by `CODERUNNER_*` environment variables.
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(python) = lookup(ENV_PYTHON).filter(|p| !p.is_empty()) {
            config.python = PathBuf::from(python);
        }

        if let Some(ms) = lookup(ENV_BOOTSTRAP_TIMEOUT_MS).and_then(|v| parse_ms(ENV_BOOTSTRAP_TIMEOUT_MS, &v)) {
            config.bootstrap_timeout = Duration::from_millis(ms);
        }

        if let Some(ms) = lookup(ENV_EXECUTION_TIMEOUT_MS).and_then(|v| parse_ms(ENV_EXECUTION_TIMEOUT_MS, &v)) {
            config.execution_timeout = (ms > 0).then(|| Duration::from_millis(ms));
        }

        if let Some(keywords) = lookup(ENV_RESTRICTED_KEYWORDS) {
            config.restricted_keywords = keywords
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(String::from)
                .collect();
        }

        config
    }

    /// The loop guard always runs; the keyword guard only when keywords
    /// are configured.
    pub fn guard(&self) -> GuardChain {
        let chain = GuardChain::new().with(LoopGuard::new());
        if self.restricted_keywords.is_empty() {
            chain
        } else {
            chain.with(KeywordGuard::new(self.restricted_keywords.iter().cloned()))
        }
    }
}

fn parse_ms(key: &str, value: &str) -> Option<u64> {
    match value.trim().parse() {
        Ok(ms) => Some(ms),
        Err(e) => {
            tracing::warn!("Ignoring {}={:?}: {}", key, value, e);
            None
        }
    }
}
