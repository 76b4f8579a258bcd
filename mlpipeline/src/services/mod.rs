//! External collaborator seams: experiment tracking, model deployment,
//! and monitoring.
//!
//! The real services (model registries, monitoring platforms) live outside
//! this engine; these traits are the seam the orchestrator calls through.
//! The simulated implementations stand in for them, producing stable
//! handle shapes without any network traffic.

use crate::config::{DeploymentConfig, MonitoringConfig};
use crate::core::PipelineStatus;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use uuid::Uuid;

/// Handle for one tracked experiment run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExperimentRun {
    /// Generated experiment-run id.
    pub id: String,
    /// Experiment name the run belongs to.
    pub experiment_name: String,
    /// When tracking started.
    pub started_at: DateTime<Utc>,
}

/// Records pipeline runs with an experiment tracker.
#[async_trait]
pub trait ExperimentTracker: Send + Sync + Debug {
    /// Opens a tracked run and returns its handle.
    async fn start_run(&self, experiment_name: &str, pipeline_name: &str) -> ExperimentRun;

    /// Closes a tracked run with the final status and metrics.
    async fn finish_run(
        &self,
        run: &ExperimentRun,
        status: PipelineStatus,
        metrics: &HashMap<String, f64>,
    );
}

/// Deployment details for a served model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentInfo {
    /// Serving endpoint URL.
    pub endpoint: String,
    /// Environment the model was deployed to.
    pub environment: String,
    /// The deployed model id, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    /// When the deployment completed.
    pub deployed_at: DateTime<Utc>,
}

/// Pushes trained models to a serving environment.
#[async_trait]
pub trait ModelDeployer: Send + Sync + Debug {
    /// Deploys the given trained-model handle.
    async fn deploy(&self, model: &serde_json::Value, config: &DeploymentConfig) -> DeploymentInfo;
}

/// Handle for a configured monitoring setup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringInfo {
    /// Dashboard URL for the pipeline's monitors.
    pub dashboard_url: String,
    /// Whether drift-detection probes were included.
    pub drift_detection: bool,
    /// Number of alert rules created from the configured thresholds.
    pub alert_rules: usize,
    /// When monitoring was configured.
    pub created_at: DateTime<Utc>,
}

/// Sets up runtime monitoring for a pipeline's outputs.
#[async_trait]
pub trait MonitoringProvider: Send + Sync + Debug {
    /// Configures monitors and returns the setup handle.
    async fn setup(&self, pipeline_name: &str, config: &MonitoringConfig) -> MonitoringInfo;
}

/// In-process experiment tracker that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedExperimentTracker;

#[async_trait]
impl ExperimentTracker for SimulatedExperimentTracker {
    async fn start_run(&self, experiment_name: &str, pipeline_name: &str) -> ExperimentRun {
        let run = ExperimentRun {
            id: format!("exp-{}", Uuid::new_v4()),
            experiment_name: experiment_name.to_string(),
            started_at: Utc::now(),
        };
        tracing::info!(
            experiment = experiment_name,
            pipeline = pipeline_name,
            run_id = %run.id,
            "experiment run started"
        );
        run
    }

    async fn finish_run(
        &self,
        run: &ExperimentRun,
        status: PipelineStatus,
        metrics: &HashMap<String, f64>,
    ) {
        tracing::info!(
            run_id = %run.id,
            status = %status,
            metric_count = metrics.len(),
            "experiment run finished"
        );
    }
}

/// Deployer that fabricates endpoint handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedModelDeployer;

#[async_trait]
impl ModelDeployer for SimulatedModelDeployer {
    async fn deploy(&self, model: &serde_json::Value, config: &DeploymentConfig) -> DeploymentInfo {
        let model_id = model
            .get("modelId")
            .and_then(serde_json::Value::as_str)
            .map(ToString::to_string);
        let endpoint_name = config
            .endpoint_name
            .clone()
            .unwrap_or_else(|| format!("endpoint-{}", Uuid::new_v4()));

        let info = DeploymentInfo {
            endpoint: format!(
                "https://serving.{}.klikkflow.dev/{endpoint_name}",
                config.environment
            ),
            environment: config.environment.clone(),
            model_id,
            deployed_at: Utc::now(),
        };
        tracing::info!(endpoint = %info.endpoint, "model deployed");
        info
    }
}

/// Monitoring provider that fabricates dashboard handles.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedMonitoringProvider;

#[async_trait]
impl MonitoringProvider for SimulatedMonitoringProvider {
    async fn setup(&self, pipeline_name: &str, config: &MonitoringConfig) -> MonitoringInfo {
        let info = MonitoringInfo {
            dashboard_url: format!("https://monitor.klikkflow.dev/pipelines/{pipeline_name}"),
            drift_detection: config.drift_detection,
            alert_rules: config.alert_thresholds.len(),
            created_at: Utc::now(),
        };
        tracing::info!(
            pipeline = pipeline_name,
            alert_rules = info.alert_rules,
            "monitoring configured"
        );
        info
    }
}
