use regex::Regex;

use crate::constants::{DEFAULT_RESTRICTED_KEYWORDS, INFINITE_LOOP_MSG, RESTRICTED_MSG};
use crate::core::traits::guard::{Guard, GuardVerdict};

/// Rejects the literal `while True` loop, with any run of whitespace
/// between the two words. Purely textual: `while 1:` and friends pass.
#[derive(Debug, Clone)]
pub struct LoopGuard {
    pattern: Regex,
}

impl LoopGuard {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(r"while\s+True").expect("loop pattern is valid"),
        }
    }
}

impl Default for LoopGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Guard for LoopGuard {
    fn check(&self, code: &str) -> GuardVerdict {
        if self.pattern.is_match(code) {
            tracing::debug!("Rejected source with unconditional loop");
            GuardVerdict::Rejected(INFINITE_LOOP_MSG.to_string())
        } else {
            GuardVerdict::Accepted
        }
    }
}

/// Substring blacklist, as used by the grading backend.
#[derive(Debug, Clone)]
pub struct KeywordGuard {
    keywords: Vec<String>,
}

impl KeywordGuard {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(Into::into)
                .filter(|k: &String| !k.is_empty())
                .collect(),
        }
    }
}

impl Default for KeywordGuard {
    fn default() -> Self {
        Self::new(DEFAULT_RESTRICTED_KEYWORDS)
    }
}

impl Guard for KeywordGuard {
    fn check(&self, code: &str) -> GuardVerdict {
        match self.keywords.iter().find(|k| code.contains(k.as_str())) {
            Some(keyword) => {
                tracing::debug!(keyword = %keyword, "Rejected source with restricted keyword");
                GuardVerdict::Rejected(RESTRICTED_MSG.to_string())
            }
            None => GuardVerdict::Accepted,
        }
    }
}

/// Runs guards in order; the first rejection wins.
#[derive(Debug, Default)]
pub struct GuardChain {
    guards: Vec<Box<dyn Guard>>,
}

impl GuardChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, guard: impl Guard + 'static) -> Self {
        self.guards.push(Box::new(guard));
        self
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}

impl Guard for GuardChain {
    fn check(&self, code: &str) -> GuardVerdict {
        self.guards
            .iter()
            .map(|g| g.check(code))
            .find(|v| matches!(v, GuardVerdict::Rejected(_)))
            .unwrap_or(GuardVerdict::Accepted)
    }
}
