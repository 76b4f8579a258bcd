//! Top-level pipeline orchestration.
//!
//! [`PipelineOrchestrator::execute`] is the node's action handler: it
//! validates the configuration, runs the selected execution strategy over
//! the stage set, finalizes the execution record, and folds every error
//! into a structured failure result. Nothing escapes to the workflow
//! runtime as an uncaught error.

mod dry_run;

pub use dry_run::{DryRunReport, ResourceEstimate};

use crate::config::{self, DataConfig, DataSourceType, PipelineConfig};
use crate::core::{PipelineExecution, PipelineStatus, StageRecord, StageStatus, StageType};
use crate::errors::{PipelineError, ValidationError};
use crate::exec::{self, RunState};
use crate::node::{NodeActionResult, NodeExecutionContext};
use crate::registry::StageRegistry;
use crate::services::{
    DeploymentInfo, ExperimentRun, ExperimentTracker, ModelDeployer, MonitoringInfo,
    MonitoringProvider, SimulatedExperimentTracker, SimulatedModelDeployer,
    SimulatedMonitoringProvider,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

/// The pipeline node's action handler.
#[derive(Debug, Clone)]
pub struct PipelineOrchestrator {
    registry: Arc<StageRegistry>,
    tracker: Arc<dyn ExperimentTracker>,
    deployer: Arc<dyn ModelDeployer>,
    monitoring: Arc<dyn MonitoringProvider>,
}

impl Default for PipelineOrchestrator {
    fn default() -> Self {
        Self::new(StageRegistry::builtin())
    }
}

impl PipelineOrchestrator {
    /// Creates an orchestrator over the given registry with simulated
    /// collaborator services.
    #[must_use]
    pub fn new(registry: StageRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            tracker: Arc::new(SimulatedExperimentTracker),
            deployer: Arc::new(SimulatedModelDeployer),
            monitoring: Arc::new(SimulatedMonitoringProvider),
        }
    }

    /// Replaces the experiment tracker.
    #[must_use]
    pub fn with_experiment_tracker(mut self, tracker: Arc<dyn ExperimentTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    /// Replaces the model deployer.
    #[must_use]
    pub fn with_model_deployer(mut self, deployer: Arc<dyn ModelDeployer>) -> Self {
        self.deployer = deployer;
        self
    }

    /// Replaces the monitoring provider.
    #[must_use]
    pub fn with_monitoring_provider(mut self, monitoring: Arc<dyn MonitoringProvider>) -> Self {
        self.monitoring = monitoring;
        self
    }

    /// Executes the configured pipeline and returns the node result.
    ///
    /// Failures of any kind (configuration or stage execution) produce a
    /// `success: false` result carrying the error message and, when stages
    /// were built, the partial execution record for diagnosis.
    pub async fn execute(&self, ctx: &NodeExecutionContext) -> NodeActionResult {
        let started = Instant::now();
        match self.run(ctx).await {
            Ok(output) => NodeActionResult::ok(output.into_ports(), elapsed_ms(started)),
            Err(failure) => {
                tracing::warn!(error = %failure.error, "pipeline run failed");
                let data = failure.execution.map(|execution| failure_ports(&execution));
                NodeActionResult::fail(failure.error.to_string(), data, elapsed_ms(started))
            }
        }
    }

    async fn run(&self, ctx: &NodeExecutionContext) -> Result<RunOutput, RunFailure> {
        let config: PipelineConfig =
            serde_json::from_value(ctx.parameters.clone()).map_err(|e| {
                RunFailure::bare(
                    ValidationError::single(format!("Invalid node parameters: {e}")).into(),
                )
            })?;

        let issues = config::validate(&config);
        if !issues.is_empty() {
            return Err(RunFailure::bare(ValidationError::new(issues).into()));
        }

        let mode = config.execution_mode().map_err(RunFailure::bare)?;
        let records = config.stage_records().map_err(RunFailure::bare)?;
        let pipeline_name = config.pipeline_name.clone().unwrap_or_default();

        let experiment_run = self.start_experiment(&config, &pipeline_name).await;
        let input = resolve_input(config.data_config.as_ref(), ctx);

        let mut execution = PipelineExecution::new(pipeline_name.clone(), records.clone());
        execution.status = PipelineStatus::Running;
        if let Some(run) = &experiment_run {
            execution.add_artifact("experimentId", json!(run.id));
        }

        let state = RunState::new(records, Arc::clone(&self.registry), input);
        let span = tracing::info_span!(
            "pipeline_run",
            pipeline = %pipeline_name,
            run_id = %execution.id,
            mode = %mode,
        );
        let result = exec::run_mode(mode, &state).instrument(span).await;

        execution.stages = state.snapshot();

        match result {
            Ok(()) => {
                execution.finalize(PipelineStatus::Completed);
                let (model, deployment, monitoring) =
                    self.collect_artifacts(&config, &pipeline_name, &mut execution).await;

                if let Some(run) = &experiment_run {
                    self.tracker
                        .finish_run(run, execution.status, &execution.overall_metrics)
                        .await;
                }
                tracing::info!(
                    pipeline = %pipeline_name,
                    run_id = %execution.id,
                    "pipeline completed"
                );

                Ok(RunOutput {
                    execution,
                    model,
                    deployment,
                    monitoring,
                })
            }
            Err(error) => {
                execution.finalize(PipelineStatus::Failed);
                if let Some(run) = &experiment_run {
                    self.tracker
                        .finish_run(run, PipelineStatus::Failed, &execution.overall_metrics)
                        .await;
                }
                Err(RunFailure {
                    error,
                    execution: Some(execution),
                })
            }
        }
    }

    async fn start_experiment(
        &self,
        config: &PipelineConfig,
        pipeline_name: &str,
    ) -> Option<ExperimentRun> {
        let experiment = config.experiment_config.as_ref().filter(|c| c.enabled)?;
        let name = experiment
            .experiment_name
            .clone()
            .unwrap_or_else(|| pipeline_name.to_string());
        Some(self.tracker.start_run(&name, pipeline_name).await)
    }

    async fn collect_artifacts(
        &self,
        config: &PipelineConfig,
        pipeline_name: &str,
        execution: &mut PipelineExecution,
    ) -> (
        Option<serde_json::Value>,
        Option<DeploymentInfo>,
        Option<MonitoringInfo>,
    ) {
        let model = trained_model(&execution.stages);

        let deployment = match (&config.deployment_config, &model) {
            (Some(deploy_config), Some(model)) if deploy_config.auto_deploy => {
                let info = self.deployer.deploy(model, deploy_config).await;
                execution.add_artifact(
                    "deployment",
                    serde_json::to_value(&info).unwrap_or_default(),
                );
                Some(info)
            }
            _ => None,
        };

        let monitoring = match &config.monitoring_config {
            Some(monitoring_config) if monitoring_config.enabled => {
                let info = self.monitoring.setup(pipeline_name, monitoring_config).await;
                execution.add_artifact(
                    "monitoring",
                    serde_json::to_value(&info).unwrap_or_default(),
                );
                Some(info)
            }
            _ => None,
        };

        (model, deployment, monitoring)
    }
}

/// Successful run payload, prior to node-result shaping.
struct RunOutput {
    execution: PipelineExecution,
    model: Option<serde_json::Value>,
    deployment: Option<DeploymentInfo>,
    monitoring: Option<MonitoringInfo>,
}

impl RunOutput {
    fn into_ports(self) -> HashMap<String, serde_json::Value> {
        let summary = stage_summary(&self.execution);
        let metrics = serde_json::to_value(&self.execution.overall_metrics).unwrap_or_default();
        let mut ports = HashMap::new();
        ports.insert(
            "main".to_string(),
            json!({
                "execution": serde_json::to_value(&self.execution).unwrap_or_default(),
                "summary": summary,
            }),
        );
        ports.insert(
            "ai_model".to_string(),
            self.model.unwrap_or(serde_json::Value::Null),
        );
        ports.insert(
            "deployment_info".to_string(),
            self.deployment
                .and_then(|info| serde_json::to_value(info).ok())
                .unwrap_or(serde_json::Value::Null),
        );
        if let Some(monitoring) = self.monitoring {
            ports.insert(
                "monitoring_info".to_string(),
                serde_json::to_value(monitoring).unwrap_or_default(),
            );
        }
        ports.insert("pipeline_metrics".to_string(), metrics);
        ports
    }
}

/// A run that ended in an error, with the partial record when one exists.
struct RunFailure {
    error: PipelineError,
    execution: Option<PipelineExecution>,
}

impl RunFailure {
    fn bare(error: PipelineError) -> Self {
        Self {
            error,
            execution: None,
        }
    }
}

fn failure_ports(execution: &PipelineExecution) -> HashMap<String, serde_json::Value> {
    let mut ports = HashMap::new();
    ports.insert(
        "main".to_string(),
        json!({
            "execution": serde_json::to_value(execution).unwrap_or_default(),
            "summary": stage_summary(execution),
        }),
    );
    ports.insert(
        "pipeline_metrics".to_string(),
        serde_json::to_value(&execution.overall_metrics).unwrap_or_default(),
    );
    ports
}

fn stage_summary(execution: &PipelineExecution) -> serde_json::Value {
    json!({
        "totalStages": execution.stages.len(),
        "completedStages": execution.count_with_status(StageStatus::Completed),
        "failedStages": execution.count_with_status(StageStatus::Failed),
        "skippedStages": execution.count_with_status(StageStatus::Skipped),
        "pendingStages": execution.count_with_status(StageStatus::Pending),
    })
}

fn trained_model(stages: &[StageRecord]) -> Option<serde_json::Value> {
    stages
        .iter()
        .find(|stage| {
            stage.stage_type == StageType::ModelTraining && stage.status == StageStatus::Completed
        })
        .and_then(|stage| stage.output.as_ref())
        .and_then(|output| output.get("model"))
        .cloned()
}

fn resolve_input(
    data_config: Option<&DataConfig>,
    ctx: &NodeExecutionContext,
) -> serde_json::Value {
    let source = data_config
        .map_or(Some(DataSourceType::WorkflowInput), DataConfig::source_type)
        .unwrap_or(DataSourceType::WorkflowInput);

    match source {
        DataSourceType::WorkflowInput => ctx
            .main_input()
            .cloned()
            .unwrap_or(serde_json::Value::Null),
        DataSourceType::Synthetic => json!({"rows": 1000.0, "synthetic": true}),
        DataSourceType::File | DataSourceType::Database => json!({
            "source": data_config
                .and_then(|c| c.data_source_type.clone())
                .unwrap_or_default(),
            "location": data_config.and_then(|c| c.location.clone()),
        }),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
