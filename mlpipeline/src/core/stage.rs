//! Stage data model: type identifiers, retry policy, and the mutable
//! per-run stage record.

use super::StageStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The fixed set of stage operations the engine knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageType {
    /// Cleans and normalizes an input dataset.
    DataPreprocessing,
    /// Derives model features from preprocessed data.
    FeatureEngineering,
    /// Checks dataset schema and quality constraints.
    DataValidation,
    /// Trains a model and produces a model handle.
    ModelTraining,
    /// Scores a trained model on held-out data.
    ModelEvaluation,
    /// Gates a model against acceptance thresholds.
    ModelValidation,
    /// Pushes a model to a serving endpoint.
    ModelDeployment,
    /// Compares live data distributions against a baseline.
    DataDriftDetection,
    /// Wires up runtime health checks for a deployed model.
    ModelMonitoring,
    /// Splits traffic between model variants.
    AbTesting,
    /// Runs a user-supplied script step.
    CustomScript,
}

impl StageType {
    /// All stage types, in a stable order.
    pub const ALL: [Self; 11] = [
        Self::DataPreprocessing,
        Self::FeatureEngineering,
        Self::DataValidation,
        Self::ModelTraining,
        Self::ModelEvaluation,
        Self::ModelValidation,
        Self::ModelDeployment,
        Self::DataDriftDetection,
        Self::ModelMonitoring,
        Self::AbTesting,
        Self::CustomScript,
    ];

    /// Parses a raw identifier as received in node parameters.
    ///
    /// Returns `None` for identifiers with no registered executor, which the
    /// caller reports as an "unknown stage type" configuration error.
    #[must_use]
    pub fn from_identifier(raw: &str) -> Option<Self> {
        match raw {
            "data_preprocessing" => Some(Self::DataPreprocessing),
            "feature_engineering" => Some(Self::FeatureEngineering),
            "data_validation" => Some(Self::DataValidation),
            "model_training" => Some(Self::ModelTraining),
            "model_evaluation" => Some(Self::ModelEvaluation),
            "model_validation" => Some(Self::ModelValidation),
            "model_deployment" => Some(Self::ModelDeployment),
            "data_drift_detection" => Some(Self::DataDriftDetection),
            "model_monitoring" => Some(Self::ModelMonitoring),
            "ab_testing" => Some(Self::AbTesting),
            "custom_script" => Some(Self::CustomScript),
            _ => None,
        }
    }

    /// The wire identifier for this stage type.
    #[must_use]
    pub fn identifier(self) -> &'static str {
        match self {
            Self::DataPreprocessing => "data_preprocessing",
            Self::FeatureEngineering => "feature_engineering",
            Self::DataValidation => "data_validation",
            Self::ModelTraining => "model_training",
            Self::ModelEvaluation => "model_evaluation",
            Self::ModelValidation => "model_validation",
            Self::ModelDeployment => "model_deployment",
            Self::DataDriftDetection => "data_drift_detection",
            Self::ModelMonitoring => "model_monitoring",
            Self::AbTesting => "ab_testing",
            Self::CustomScript => "custom_script",
        }
    }
}

impl fmt::Display for StageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

/// Per-stage retry configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// How many retries follow the initial attempt. Zero means a single
    /// failure is immediately fatal.
    pub max_retries: u32,
    /// Base delay between attempts, in seconds.
    pub retry_delay_seconds: f64,
    /// Doubles the delay on each successive retry when set.
    pub exponential_backoff: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_delay_seconds: 1.0,
            exponential_backoff: false,
        }
    }
}

impl RetryPolicy {
    /// The delay in seconds before the retry following `failed_attempt`
    /// (1-indexed).
    #[must_use]
    pub fn delay_for_attempt(&self, failed_attempt: u32) -> f64 {
        if self.exponential_backoff {
            // Cap the exponent so pathological retry counts cannot overflow.
            let exponent = failed_attempt.saturating_sub(1).min(32);
            #[allow(clippy::cast_possible_wrap)]
            let factor = 2f64.powi(exponent as i32);
            self.retry_delay_seconds * factor
        } else {
            self.retry_delay_seconds
        }
    }
}

/// The result payload of one successful stage execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageOutcome {
    /// Free-form output data, visible to downstream stages.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub output: serde_json::Value,
    /// Numeric metrics produced by the stage.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metrics: HashMap<String, f64>,
}

impl StageOutcome {
    /// Creates an empty outcome.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates an outcome carrying output data.
    #[must_use]
    pub fn with_output(output: serde_json::Value) -> Self {
        Self {
            output,
            metrics: HashMap::new(),
        }
    }

    /// Adds a metric.
    #[must_use]
    pub fn metric(mut self, key: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(key.into(), value);
        self
    }
}

/// One timestamped stage log line.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageLogEntry {
    /// When the line was recorded.
    pub timestamp: DateTime<Utc>,
    /// The log message.
    pub message: String,
}

/// The mutable record tracking one stage within one pipeline run.
///
/// Created once per run from static configuration and mutated in place by
/// whichever execution strategy runs the stage. Never deleted; the final
/// execution record retains it for reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRecord {
    /// Unique name within the pipeline run.
    pub name: String,
    /// The operation this stage performs.
    pub stage_type: StageType,
    /// Stage-specific configuration, passed through to the executor.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub config: serde_json::Value,
    /// Names of stages this stage depends on.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    /// Retry configuration.
    #[serde(default)]
    pub retry_policy: RetryPolicy,
    /// Wall-clock budget for a single attempt, in minutes.
    pub timeout_minutes: f64,
    /// Condition expression gating execution (conditional mode only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Current lifecycle status.
    #[serde(default)]
    pub status: StageStatus,
    /// When the stage started running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the stage reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Ordered log lines accumulated during execution.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<StageLogEntry>,
    /// Metrics reported by the executor.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metrics: HashMap<String, f64>,
    /// Output data reported by the executor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,
    /// Final error message for failed stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageRecord {
    /// Creates a pending record.
    #[must_use]
    pub fn new(name: impl Into<String>, stage_type: StageType) -> Self {
        Self {
            name: name.into(),
            stage_type,
            config: serde_json::Value::Null,
            depends_on: Vec::new(),
            retry_policy: RetryPolicy::default(),
            timeout_minutes: 60.0,
            condition: None,
            status: StageStatus::Pending,
            started_at: None,
            finished_at: None,
            logs: Vec::new(),
            metrics: HashMap::new(),
            output: None,
            error: None,
        }
    }

    /// Sets the dependency list.
    #[must_use]
    pub fn with_dependencies(mut self, deps: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Sets the stage-specific configuration.
    #[must_use]
    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }

    /// Sets the condition expression.
    #[must_use]
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    /// Sets the per-attempt timeout in minutes.
    #[must_use]
    pub fn with_timeout_minutes(mut self, minutes: f64) -> Self {
        self.timeout_minutes = minutes;
        self
    }

    /// Appends a timestamped log line.
    pub fn log(&mut self, message: impl Into<String>) {
        self.logs.push(StageLogEntry {
            timestamp: Utc::now(),
            message: message.into(),
        });
    }

    /// Transitions `Pending -> Running` and stamps the start time.
    pub fn mark_running(&mut self) {
        if !self.transition(StageStatus::Running) {
            return;
        }
        self.started_at = Some(Utc::now());
    }

    /// Transitions `Running -> Completed`, recording the outcome.
    pub fn complete(&mut self, outcome: &StageOutcome) {
        if !self.transition(StageStatus::Completed) {
            return;
        }
        self.finished_at = Some(Utc::now());
        self.metrics.extend(outcome.metrics.clone());
        if !outcome.output.is_null() {
            self.output = Some(outcome.output.clone());
        }
    }

    /// Transitions `Running -> Failed` with the final error message.
    pub fn fail(&mut self, error: impl Into<String>) {
        if !self.transition(StageStatus::Failed) {
            return;
        }
        self.finished_at = Some(Utc::now());
        self.error = Some(error.into());
    }

    /// Transitions `Pending -> Skipped` with a reason log line.
    pub fn skip(&mut self, reason: impl Into<String>) {
        if !self.transition(StageStatus::Skipped) {
            return;
        }
        self.finished_at = Some(Utc::now());
        self.log(reason);
    }

    /// The stage duration in milliseconds, once terminal.
    #[must_use]
    pub fn duration_ms(&self) -> Option<f64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => {
                let micros = (end - start).num_microseconds()?;
                #[allow(clippy::cast_precision_loss)]
                let ms = micros as f64 / 1000.0;
                Some(ms)
            }
            _ => None,
        }
    }

    fn transition(&mut self, next: StageStatus) -> bool {
        if self.status.can_transition_to(next) {
            self.status = next;
            true
        } else {
            tracing::warn!(
                stage = %self.name,
                from = %self.status,
                to = %next,
                "ignoring illegal stage status transition"
            );
            false
        }
    }
}
