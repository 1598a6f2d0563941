use std::time::Duration;

pub const DEFAULT_PYTHON: &str = "python3";
pub const DEFAULT_BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_EXECUTION_TIMEOUT: Duration = Duration::from_secs(10);

pub const NOT_READY_MSG: &str = "Runtime is still loading...";
pub const ERROR_PREFIX: &str = "Error: ";
pub const TIMEOUT_MSG: &str = "timeout";
pub const SHUTDOWN_MSG: &str = "runtime shut down";
pub const INFINITE_LOOP_MSG: &str = "infinite loops are not allowed";
pub const RESTRICTED_MSG: &str = "code contains restricted operations";

pub const DEFAULT_RESTRICTED_KEYWORDS: [&str; 4] = ["import os", "import sys", "open(", "subprocess"];

// Globals owned by the harness inside the interpreter namespace.
pub const STDIN_GLOBAL: &str = "__harness_stdin__";
pub const STDOUT_GLOBAL: &str = "__harness_stdout__";
