//! Per-segment outcomes and how they fold into a job outcome.

use super::jobs::OutputRef;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Diagnostic context for a segment whose transcode did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentFailure {
    pub command: String,
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    /// Tail of the tool's diagnostic stream.
    pub diagnostic: String,
}

impl fmt::Display for SegmentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.timed_out {
            write!(f, "`{}` timed out", self.command)?;
        } else {
            match self.exit_code {
                Some(code) => write!(f, "`{}` exited with code {}", self.command, code)?,
                None => write!(f, "`{}` did not exit normally", self.command)?,
            }
        }
        if !self.diagnostic.is_empty() {
            write!(f, ": {}", self.diagnostic)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentResult {
    pub index: usize,
    pub outcome: Result<OutputRef, SegmentFailure>,
}

impl SegmentResult {
    pub fn succeeded(index: usize, output: OutputRef) -> Self {
        Self {
            index,
            outcome: Ok(output),
        }
    }

    pub fn failed(index: usize, failure: SegmentFailure) -> Self {
        Self {
            index,
            outcome: Err(failure),
        }
    }

    pub fn output(&self) -> Option<&OutputRef> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&SegmentFailure> {
        self.outcome.as_ref().err()
    }
}

/// When partial segment failure still counts as a successful job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuccessPolicy {
    /// At least one segment produced an output.
    #[default]
    AnySegment,
    /// Every segment produced an output.
    AllSegments,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown success policy {0:?}, expected `any` or `all`")]
pub struct UnknownSuccessPolicy(pub String);

impl FromStr for SuccessPolicy {
    type Err = UnknownSuccessPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "any" => Ok(SuccessPolicy::AnySegment),
            "all" => Ok(SuccessPolicy::AllSegments),
            other => Err(UnknownSuccessPolicy(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Aggregate {
    /// Successful outputs, ordered by segment index.
    Succeeded(Vec<OutputRef>),
    /// Job-level failure. `discarded` lists outputs that were produced but
    /// must not be published.
    Failed {
        message: String,
        discarded: Vec<OutputRef>,
    },
}

impl Aggregate {
    pub fn failed(message: impl Into<String>) -> Self {
        Aggregate::Failed {
            message: message.into(),
            discarded: Vec::new(),
        }
    }
}

pub fn aggregate(mut results: Vec<SegmentResult>, policy: SuccessPolicy) -> Aggregate {
    if results.is_empty() {
        return Aggregate::failed("the source produced no segments");
    }
    results.sort_by_key(|result| result.index);

    let total = results.len();
    let mut outputs = Vec::with_capacity(total);
    let mut failures = Vec::new();
    for result in results {
        match result.outcome {
            Ok(output) => outputs.push(output),
            Err(failure) => failures.push((result.index, failure)),
        }
    }

    let Some((first_index, first_failure)) = failures.first() else {
        return Aggregate::Succeeded(outputs);
    };

    if outputs.is_empty() {
        return Aggregate::failed(format!(
            "all {total} segments failed; segment {first_index}: {first_failure}"
        ));
    }

    match policy {
        SuccessPolicy::AnySegment => Aggregate::Succeeded(outputs),
        SuccessPolicy::AllSegments => Aggregate::Failed {
            message: format!(
                "{} of {total} segments failed; segment {first_index}: {first_failure}",
                failures.len()
            ),
            discarded: outputs,
        },
    }
}
