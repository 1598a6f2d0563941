//! Loading labeled examples from problem-set JSON files.
//!
//! Two shapes are accepted per entry: a single case
//! (`input` / `expectedOutput`) or a batch of cases
//! (`inputs` / `expectedOutputs`). A batch entry with id `sum` expands to
//! `sum#1`, `sum#2`, ... in order. Inputs are newline-joined text and are
//! split into lines the same way the runner joins them back.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::core::domain::Example;

#[derive(Debug, Error)]
pub enum ProblemError {
    #[error("Failed to read problem set: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid problem set: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Problem {id} has {inputs} inputs but {outputs} expected outputs")]
    Mismatch {
        id: String,
        inputs: usize,
        outputs: usize,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Entry {
    #[serde(rename_all = "camelCase")]
    Batch {
        id: String,
        inputs: Vec<String>,
        expected_outputs: Vec<String>,
        description: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Single {
        id: String,
        #[serde(default)]
        input: String,
        expected_output: String,
        description: Option<String>,
    },
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProblemSet {
    List(Vec<Entry>),
    One(Entry),
}

pub fn parse(json: &str) -> Result<Vec<Example>, ProblemError> {
    let entries = match serde_json::from_str(json)? {
        ProblemSet::List(entries) => entries,
        ProblemSet::One(entry) => vec![entry],
    };

    let mut examples = Vec::new();
    for entry in entries {
        expand(entry, &mut examples)?;
    }

    tracing::debug!(examples = examples.len(), "Problem set parsed");
    Ok(examples)
}

pub fn load<P: AsRef<Path>>(path: P) -> Result<Vec<Example>, ProblemError> {
    let json = std::fs::read_to_string(path)?;
    parse(&json)
}

fn expand(entry: Entry, examples: &mut Vec<Example>) -> Result<(), ProblemError> {
    match entry {
        Entry::Single {
            id,
            input,
            expected_output,
            description,
        } => examples.push(example(id, &input, expected_output, description)),
        Entry::Batch {
            id,
            inputs,
            expected_outputs,
            description,
        } => {
            if inputs.len() != expected_outputs.len() {
                return Err(ProblemError::Mismatch {
                    id,
                    inputs: inputs.len(),
                    outputs: expected_outputs.len(),
                });
            }
            for (n, (input, expected)) in inputs.iter().zip(expected_outputs).enumerate() {
                examples.push(example(
                    format!("{}#{}", id, n + 1),
                    input,
                    expected,
                    description.clone(),
                ));
            }
        }
    }
    Ok(())
}

fn example(id: String, input: &str, expected_output: String, description: Option<String>) -> Example {
    Example {
        id,
        input: input.lines().map(String::from).collect(),
        expected_output,
        description,
    }
}
