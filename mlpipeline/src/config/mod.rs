//! Configuration types for the pipeline node's parameters.
//!
//! These mirror the JSON the workflow runtime hands the node. Fields that
//! validation must report as missing are `Option`s rather than hard serde
//! requirements, so `test()` can itemize problems ("Pipeline type is
//! required") instead of surfacing a deserialization error. Identifier
//! fields (stage type, execution mode, pipeline type) stay raw strings
//! here and are parsed into their enums during validation.

use crate::core::{RetryPolicy, StageRecord, StageType};
use crate::errors::{PipelineError, ValidationIssue};
use crate::exec::{Condition, ExecutionMode};
use crate::resolver::{self, DependencyNode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// The high-level purpose of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineType {
    /// Train a new model end to end.
    Training,
    /// Serve predictions with an existing model.
    Inference,
    /// Score a batch of records offline.
    BatchPrediction,
    /// Full train-evaluate-deploy loop.
    EndToEnd,
}

impl PipelineType {
    /// Parses a raw pipeline-type identifier.
    #[must_use]
    pub fn from_identifier(raw: &str) -> Option<Self> {
        match raw {
            "training" => Some(Self::Training),
            "inference" => Some(Self::Inference),
            "batch_prediction" => Some(Self::BatchPrediction),
            "end_to_end" => Some(Self::EndToEnd),
            _ => None,
        }
    }
}

impl fmt::Display for PipelineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let identifier = match self {
            Self::Training => "training",
            Self::Inference => "inference",
            Self::BatchPrediction => "batch_prediction",
            Self::EndToEnd => "end_to_end",
        };
        write!(f, "{identifier}")
    }
}

/// Where the pipeline's initial dataset comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceType {
    /// Consume the upstream workflow node's `main` output.
    WorkflowInput,
    /// Load from a file location.
    File,
    /// Load from a database location.
    Database,
    /// Generate a synthetic dataset.
    Synthetic,
}

impl DataSourceType {
    /// Parses a raw data-source identifier.
    #[must_use]
    pub fn from_identifier(raw: &str) -> Option<Self> {
        match raw {
            "workflow_input" => Some(Self::WorkflowInput),
            "file" => Some(Self::File),
            "database" => Some(Self::Database),
            "synthetic" => Some(Self::Synthetic),
            _ => None,
        }
    }

    /// Returns true if the source needs an explicit location.
    #[must_use]
    pub fn requires_location(self) -> bool {
        matches!(self, Self::File | Self::Database)
    }
}

/// One stage's raw configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StageConfig {
    /// Unique stage name.
    pub stage_name: Option<String>,
    /// Raw stage-type identifier.
    pub stage_type: Option<String>,
    /// Free-form stage configuration forwarded to the executor.
    pub config: serde_json::Value,
    /// Comma-separated dependency stage names.
    pub depends_on: Option<String>,
    /// Retry configuration.
    pub retry_policy: RetryPolicy,
    /// Per-attempt wall-clock budget in minutes.
    pub timeout_minutes: f64,
    /// Condition expression (conditional mode).
    pub condition: Option<String>,
}

impl Default for StageConfig {
    fn default() -> Self {
        Self {
            stage_name: None,
            stage_type: None,
            config: serde_json::Value::Null,
            depends_on: None,
            retry_policy: RetryPolicy::default(),
            timeout_minutes: 60.0,
            condition: None,
        }
    }
}

impl StageConfig {
    /// The parsed dependency names, trimmed, empty entries dropped.
    #[must_use]
    pub fn dependency_names(&self) -> Vec<String> {
        self.depends_on
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(ToString::to_string)
            .collect()
    }
}

/// Initial-dataset configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DataConfig {
    /// Raw data-source identifier. Defaults to `workflow_input`.
    pub data_source_type: Option<String>,
    /// Source location (required for file and database sources).
    pub location: Option<String>,
    /// Fraction of rows held out for validation.
    pub validation_split: f64,
    /// Fraction of rows held out for testing.
    pub test_split: f64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_source_type: None,
            location: None,
            validation_split: 0.2,
            test_split: 0.1,
        }
    }
}

impl DataConfig {
    /// The parsed data source type, defaulting to workflow input.
    #[must_use]
    pub fn source_type(&self) -> Option<DataSourceType> {
        match self.data_source_type.as_deref() {
            None => Some(DataSourceType::WorkflowInput),
            Some(raw) => DataSourceType::from_identifier(raw),
        }
    }
}

/// Automatic model-deployment configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeploymentConfig {
    /// Deploy the trained model automatically when the run succeeds.
    pub auto_deploy: bool,
    /// Target environment name.
    pub environment: String,
    /// Optional explicit endpoint name.
    pub endpoint_name: Option<String>,
}

impl Default for DeploymentConfig {
    fn default() -> Self {
        Self {
            auto_deploy: false,
            environment: "staging".to_string(),
            endpoint_name: None,
        }
    }
}

/// Post-run monitoring configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitoringConfig {
    /// Set up monitoring after a successful run.
    pub enabled: bool,
    /// Include data-drift detection probes.
    pub drift_detection: bool,
    /// Metric-name to threshold map for alert rules.
    pub alert_thresholds: std::collections::HashMap<String, f64>,
}

/// Experiment-tracking configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExperimentConfig {
    /// Record this run with the experiment tracker.
    pub enabled: bool,
    /// Experiment name; defaults to the pipeline name.
    pub experiment_name: Option<String>,
    /// Free-form tags attached to the run.
    pub tags: Vec<String>,
}

/// The full node-parameter configuration for one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PipelineConfig {
    /// Pipeline display name.
    pub pipeline_name: Option<String>,
    /// Raw pipeline-type identifier.
    pub pipeline_type: Option<String>,
    /// Raw execution-mode identifier; defaults to `sequential`.
    pub execution_mode: Option<String>,
    /// The declared stages, in declaration order.
    pub stages: Vec<StageConfig>,
    /// Initial-dataset configuration.
    pub data_config: Option<DataConfig>,
    /// Automatic deployment configuration.
    pub deployment_config: Option<DeploymentConfig>,
    /// Monitoring configuration.
    pub monitoring_config: Option<MonitoringConfig>,
    /// Experiment-tracking configuration.
    pub experiment_config: Option<ExperimentConfig>,
}

impl PipelineConfig {
    /// The parsed execution mode.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnsupportedMode`] for an unrecognized
    /// identifier.
    pub fn execution_mode(&self) -> Result<ExecutionMode, PipelineError> {
        match self.execution_mode.as_deref() {
            None => Ok(ExecutionMode::default()),
            Some(raw) => ExecutionMode::from_identifier(raw).ok_or_else(|| {
                PipelineError::UnsupportedMode {
                    mode: raw.to_string(),
                }
            }),
        }
    }

    /// Builds the runtime stage records from the validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnknownStageType`] for a stage type with no
    /// registered executor. Call [`validate`] first for itemized errors.
    pub fn stage_records(&self) -> Result<Vec<StageRecord>, PipelineError> {
        self.stages
            .iter()
            .map(|stage| {
                let name = stage.stage_name.clone().unwrap_or_default();
                let raw_type = stage.stage_type.as_deref().unwrap_or_default();
                let stage_type = StageType::from_identifier(raw_type).ok_or_else(|| {
                    PipelineError::UnknownStageType {
                        stage: name.clone(),
                        stage_type: raw_type.to_string(),
                    }
                })?;

                let mut record = StageRecord::new(name, stage_type)
                    .with_config(stage.config.clone())
                    .with_dependencies(stage.dependency_names())
                    .with_retry_policy(stage.retry_policy.clone())
                    .with_timeout_minutes(stage.timeout_minutes);
                if let Some(condition) = &stage.condition {
                    record = record.with_condition(condition.clone());
                }
                Ok(record)
            })
            .collect()
    }

    /// The dependency view of the declared stages, for the resolver.
    #[must_use]
    pub fn dependency_nodes(&self) -> Vec<DependencyNode> {
        self.stages
            .iter()
            .map(|stage| {
                (
                    stage.stage_name.clone().unwrap_or_default(),
                    stage.dependency_names(),
                )
            })
            .collect()
    }
}

/// Validates the full configuration, returning every problem found.
///
/// Performs static checks only; no stage is invoked and the configuration
/// is not mutated, so repeated calls yield identical results.
#[must_use]
pub fn validate(config: &PipelineConfig) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if config
        .pipeline_name
        .as_deref()
        .map_or(true, |name| name.trim().is_empty())
    {
        issues.push(ValidationIssue::pipeline("Pipeline name is required"));
    }

    match config.pipeline_type.as_deref() {
        None => issues.push(ValidationIssue::pipeline("Pipeline type is required")),
        Some(raw) if PipelineType::from_identifier(raw).is_none() => {
            issues.push(ValidationIssue::pipeline(format!(
                "Unknown pipeline type: {raw}"
            )));
        }
        Some(_) => {}
    }

    if let Some(raw) = config.execution_mode.as_deref() {
        if ExecutionMode::from_identifier(raw).is_none() {
            issues.push(ValidationIssue::pipeline(format!(
                "Unsupported execution mode: {raw}"
            )));
        }
    }

    if config.stages.is_empty() {
        issues.push(ValidationIssue::pipeline("At least one stage is required"));
    }

    let mut seen_names: HashSet<&str> = HashSet::new();
    for (position, stage) in config.stages.iter().enumerate() {
        let label = stage
            .stage_name
            .clone()
            .unwrap_or_else(|| format!("#{}", position + 1));

        match stage.stage_name.as_deref() {
            None => issues.push(ValidationIssue::stage(label.as_str(), "stage name is required")),
            Some(name) if name.trim().is_empty() => {
                issues.push(ValidationIssue::stage(label.as_str(), "stage name is required"));
            }
            Some(name) => {
                if !seen_names.insert(name) {
                    issues.push(ValidationIssue::pipeline(format!(
                        "Duplicate stage name '{name}'"
                    )));
                }
            }
        }

        match stage.stage_type.as_deref() {
            None => issues.push(ValidationIssue::stage(label.as_str(), "stage type is required")),
            Some(raw) if StageType::from_identifier(raw).is_none() => {
                issues.push(ValidationIssue::stage(
                    label.as_str(),
                    format!("unknown stage type '{raw}'"),
                ));
            }
            Some(_) => {}
        }

        if stage.retry_policy.retry_delay_seconds < 0.0 {
            issues.push(ValidationIssue::stage(label.as_str(), "retry delay cannot be negative"));
        }
        if stage.timeout_minutes <= 0.0 || !stage.timeout_minutes.is_finite() {
            issues.push(ValidationIssue::stage(label.as_str(), "timeout must be positive"));
        }

        if let Some(expression) = &stage.condition {
            if let Err(e) = Condition::parse(expression) {
                issues.push(ValidationIssue::stage(label.as_str(), e.to_string()));
            }
        }
    }

    // Reference and cycle checks only make sense over named stages;
    // missing names were already reported above.
    let nodes: Vec<DependencyNode> = config
        .stages
        .iter()
        .filter(|stage| stage.stage_name.is_some())
        .map(|stage| {
            (
                stage.stage_name.clone().unwrap_or_default(),
                stage.dependency_names(),
            )
        })
        .collect();
    if let Err(reference_errors) = resolver::validate_references(&nodes) {
        issues.extend(reference_errors.issues);
    } else if let Err(cycle) = resolver::topological_order(&nodes) {
        issues.push(ValidationIssue::pipeline(cycle.to_string()));
    }

    if let Some(data_config) = &config.data_config {
        match data_config.source_type() {
            None => {
                let raw = data_config.data_source_type.as_deref().unwrap_or_default();
                issues.push(ValidationIssue::pipeline(format!(
                    "Unknown data source type: {raw}"
                )));
            }
            Some(source) if source.requires_location() && data_config.location.is_none() => {
                issues.push(ValidationIssue::pipeline(format!(
                    "Data location is required for {} sources",
                    data_config.data_source_type.as_deref().unwrap_or_default()
                )));
            }
            Some(_) => {}
        }

        for (field, value) in [
            ("validationSplit", data_config.validation_split),
            ("testSplit", data_config.test_split),
        ] {
            if !(0.0..1.0).contains(&value) {
                issues.push(ValidationIssue::pipeline(format!(
                    "{field} must be in [0, 1)"
                )));
            }
        }
        if data_config.validation_split + data_config.test_split >= 1.0 {
            issues.push(ValidationIssue::pipeline(
                "validationSplit and testSplit must leave data for training",
            ));
        }
    }

    issues
}
