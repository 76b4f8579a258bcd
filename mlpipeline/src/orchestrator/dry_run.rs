//! Static validation and estimation: the node's `test` contract.
//!
//! A dry run checks the configuration shape, the stage shapes, the data
//! configuration, and dependency-graph well-formedness without invoking a
//! single stage, then estimates duration and resource needs from fixed
//! per-stage-type tables.

use super::PipelineOrchestrator;
use crate::config::{self, PipelineConfig};
use crate::core::StageType;
use serde::{Deserialize, Serialize};

/// Coarse resource requirements for a pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceEstimate {
    /// Peak CPU cores across the declared stages.
    pub cpu_cores: u32,
    /// Peak memory in GB across the declared stages.
    pub memory_gb: f64,
    /// True when a training stage is declared.
    pub gpu_required: bool,
    /// Working storage in GB.
    pub storage_gb: f64,
}

/// The result of a dry run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DryRunReport {
    /// True when the configuration passed every static check.
    pub success: bool,
    /// Itemized validation errors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    /// Estimated total duration from the per-stage-type table, in minutes.
    pub estimated_duration_minutes: f64,
    /// Coarse resource requirements.
    pub resources: ResourceEstimate,
}

impl PipelineOrchestrator {
    /// Statically validates a configuration without running any stage.
    ///
    /// The input is not mutated; repeated calls with the same parameters
    /// yield identical reports.
    #[must_use]
    pub fn test(&self, parameters: &serde_json::Value) -> DryRunReport {
        let config: PipelineConfig = match serde_json::from_value(parameters.clone()) {
            Ok(config) => config,
            Err(e) => {
                return DryRunReport {
                    success: false,
                    errors: vec![format!("Invalid node parameters: {e}")],
                    ..DryRunReport::default()
                };
            }
        };

        let issues = config::validate(&config);
        let stage_types: Vec<StageType> = config
            .stages
            .iter()
            .filter_map(|stage| {
                stage
                    .stage_type
                    .as_deref()
                    .and_then(StageType::from_identifier)
            })
            .collect();

        DryRunReport {
            success: issues.is_empty(),
            errors: issues.iter().map(ToString::to_string).collect(),
            estimated_duration_minutes: stage_types
                .iter()
                .map(|t| estimated_duration_minutes(*t))
                .sum(),
            resources: estimate_resources(&stage_types),
        }
    }
}

/// Nominal wall-clock minutes for one stage of the given type.
fn estimated_duration_minutes(stage_type: StageType) -> f64 {
    match stage_type {
        StageType::DataPreprocessing | StageType::ModelValidation
        | StageType::DataDriftDetection => 10.0,
        StageType::FeatureEngineering | StageType::ModelDeployment => 15.0,
        StageType::DataValidation | StageType::ModelMonitoring => 5.0,
        StageType::ModelTraining => 120.0,
        StageType::ModelEvaluation | StageType::CustomScript => 20.0,
        StageType::AbTesting => 30.0,
    }
}

fn stage_resources(stage_type: StageType) -> (u32, f64) {
    match stage_type {
        StageType::ModelTraining => (8, 16.0),
        StageType::DataPreprocessing
        | StageType::FeatureEngineering
        | StageType::ModelEvaluation => (4, 8.0),
        StageType::ModelMonitoring => (1, 2.0),
        _ => (2, 4.0),
    }
}

#[allow(clippy::cast_precision_loss)]
fn estimate_resources(stage_types: &[StageType]) -> ResourceEstimate {
    let mut estimate = ResourceEstimate::default();
    for stage_type in stage_types {
        let (cpu, memory) = stage_resources(*stage_type);
        estimate.cpu_cores = estimate.cpu_cores.max(cpu);
        estimate.memory_gb = estimate.memory_gb.max(memory);
    }
    estimate.gpu_required = stage_types.contains(&StageType::ModelTraining);
    if !stage_types.is_empty() {
        estimate.storage_gb = 10.0 + 5.0 * stage_types.len() as f64;
    }
    estimate
}
