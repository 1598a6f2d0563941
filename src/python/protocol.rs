//! Wire protocol spoken with the driver process, one JSON object per line.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::errors::{HarnessError, Result};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request<'a> {
    /// Run statements in the shared namespace.
    Exec { source: &'a str },
    /// Evaluate a single expression and return its value.
    Eval { source: &'a str },
    Set { name: &'a str, value: &'a Value },
    Get { name: &'a str },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub error: Option<String>,
}

impl Response {
    /// Failed responses carry the exception raised inside the driver.
    pub fn into_result(self) -> Result<Value> {
        if self.ok {
            Ok(self.value)
        } else {
            Err(HarnessError::Evaluation(
                self.error.unwrap_or_else(|| "unknown error".to_string()),
            ))
        }
    }
}

/// First message the driver writes once it is ready for requests.
#[derive(Debug, Clone, Deserialize)]
pub struct Handshake {
    pub ready: bool,
    pub version: String,
}

pub fn encode(request: &Request<'_>) -> Result<String> {
    let mut line = serde_json::to_string(request)?;
    line.push('\n');
    Ok(line)
}

pub fn decode(line: &str) -> Result<Response> {
    Ok(serde_json::from_str(line)?)
}

pub fn decode_handshake(line: &str) -> Result<Handshake> {
    let value = decode(line)?.into_result()?;
    Ok(serde_json::from_value(value)?)
}
