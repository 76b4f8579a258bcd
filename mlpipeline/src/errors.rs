//! Error types for the pipeline orchestration engine.
//!
//! Configuration problems (bad names, unknown stage types, unresolvable or
//! cyclic dependencies, unsupported modes) are always fatal and detected
//! before any stage runs. Stage execution errors are subject to the retry
//! controller before they become fatal.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The main error type for pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration validation failed.
    #[error("{0}")]
    Validation(#[from] ValidationError),

    /// A dependency cycle was detected.
    #[error("{0}")]
    Cycle(#[from] CycleError),

    /// A stage failed after exhausting its retry budget.
    #[error("{0}")]
    StageFailed(#[from] StageFailedError),

    /// The configured execution mode is not recognized.
    #[error("Unsupported execution mode: {mode}")]
    UnsupportedMode {
        /// The unrecognized mode identifier.
        mode: String,
    },

    /// A stage declared a type with no registered executor.
    #[error("Unknown stage type '{stage_type}' for stage '{stage}'")]
    UnknownStageType {
        /// The stage declaring the type.
        stage: String,
        /// The unrecognized type identifier.
        stage_type: String,
    },

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Returns true if this is a configuration error (fatal before any
    /// stage runs) rather than a runtime stage failure.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        !matches!(self, Self::StageFailed(_) | Self::Internal(_))
    }
}

/// A single itemized validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    /// Human-readable description of the problem.
    pub message: String,
    /// The stage the problem belongs to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

impl ValidationIssue {
    /// Creates a pipeline-level issue.
    #[must_use]
    pub fn pipeline(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stage: None,
        }
    }

    /// Creates a stage-scoped issue.
    #[must_use]
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stage: Some(stage.into()),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.stage {
            Some(stage) => write!(f, "Stage '{}': {}", stage, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Error raised when pipeline configuration validation fails.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The itemized validation problems.
    pub issues: Vec<ValidationIssue>,
}

impl std::error::Error for ValidationError {}

impl ValidationError {
    /// Creates a validation error from a list of issues.
    #[must_use]
    pub fn new(issues: Vec<ValidationIssue>) -> Self {
        Self { issues }
    }

    /// Creates a validation error from a single message.
    #[must_use]
    pub fn single(message: impl Into<String>) -> Self {
        Self {
            issues: vec![ValidationIssue::pipeline(message)],
        }
    }

    /// Renders the issues as one message per line.
    #[must_use]
    pub fn messages(&self) -> Vec<String> {
        self.issues.iter().map(ToString::to_string).collect()
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Pipeline validation failed: ")?;
        let rendered: Vec<String> = self.messages();
        write!(f, "{}", rendered.join("; "))
    }
}

/// Error raised when the dependency graph contains a cycle.
#[derive(Debug, Clone, Error)]
#[error("Circular dependency detected: {}", cycle_path.join(" -> "))]
pub struct CycleError {
    /// The stages forming (or suspected of forming) the cycle.
    pub cycle_path: Vec<String>,
}

impl CycleError {
    /// Creates a new cycle error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        Self { cycle_path }
    }
}

/// Error raised by a single stage executor attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct StageExecutionError {
    /// What went wrong in the attempt.
    pub message: String,
}

impl StageExecutionError {
    /// Creates a new stage execution error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error raised once a stage has exhausted its retry budget.
#[derive(Debug, Clone, Error)]
#[error("Stage '{stage}' failed after {attempts} attempt(s): {message}")]
pub struct StageFailedError {
    /// The failing stage.
    pub stage: String,
    /// How many attempts were made.
    pub attempts: u32,
    /// The final attempt's error message.
    pub message: String,
}
