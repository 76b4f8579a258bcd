//! Built-in simulated stage executors.
//!
//! These stand in for the real ML workloads: each sleeps a short simulated
//! work interval, then reports plausible jittered metrics and outputs.
//! Downstream consumers (deployment, monitoring, experiment tracking) only
//! see the outcome shapes, so the engine's control flow can be exercised
//! end to end without a training cluster.

use super::{StageExecutor, StageRunContext};
use crate::core::StageOutcome;
use crate::errors::StageExecutionError;
use async_trait::async_trait;
use rand::Rng;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

async fn simulated_work(base_ms: u64) {
    let jitter = rand::thread_rng().gen_range(0..=base_ms / 4 + 1);
    tokio::time::sleep(Duration::from_millis(base_ms + jitter)).await;
}

fn jittered(base: f64, spread: f64) -> f64 {
    base + rand::thread_rng().gen_range(-spread..=spread)
}

/// Cleans the input dataset: imputes nulls, drops duplicates, normalizes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataPreprocessingExecutor;

#[async_trait]
impl StageExecutor for DataPreprocessingExecutor {
    async fn run(&self, ctx: &StageRunContext) -> Result<StageOutcome, StageExecutionError> {
        simulated_work(30).await;

        let rows = ctx
            .pipeline_input
            .get("rows")
            .and_then(serde_json::Value::as_f64)
            .unwrap_or_else(|| jittered(10_000.0, 2_000.0).round());
        let duplicates = (rows * 0.02).round();

        tracing::debug!(stage = %ctx.stage_name, rows, "preprocessed dataset");

        Ok(StageOutcome::with_output(json!({
            "dataset": {
                "rows": rows - duplicates,
                "normalized": true,
            }
        }))
        .metric("rowsProcessed", rows)
        .metric("duplicatesRemoved", duplicates)
        .metric("nullRatio", jittered(0.015, 0.01).max(0.0)))
    }
}

/// Derives model features from the preprocessed dataset.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureEngineeringExecutor;

#[async_trait]
impl StageExecutor for FeatureEngineeringExecutor {
    async fn run(&self, ctx: &StageRunContext) -> Result<StageOutcome, StageExecutionError> {
        simulated_work(40).await;

        let features = ctx.config_f64("targetFeatures").unwrap_or(64.0);
        Ok(StageOutcome::with_output(json!({
            "featureSet": {
                "count": features,
                "encoding": ctx.config_str("encoding").unwrap_or("one_hot"),
            }
        }))
        .metric("featuresCreated", features)
        .metric("varianceExplained", jittered(0.87, 0.05).clamp(0.0, 1.0)))
    }
}

/// Checks dataset schema and completeness constraints.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataValidationExecutor;

#[async_trait]
impl StageExecutor for DataValidationExecutor {
    async fn run(&self, ctx: &StageRunContext) -> Result<StageOutcome, StageExecutionError> {
        simulated_work(15).await;

        let completeness = jittered(0.985, 0.01).clamp(0.0, 1.0);
        let min_completeness = ctx.config_f64("minCompleteness").unwrap_or(0.0);
        if completeness < min_completeness {
            return Err(StageExecutionError::new(format!(
                "dataset completeness {completeness:.3} below required {min_completeness:.3}"
            )));
        }

        Ok(StageOutcome::empty()
            .metric("schemaViolations", 0.0)
            .metric("completeness", completeness))
    }
}

/// Trains a model and emits the trained-model handle consumed by the
/// deployment path and the `ai_model` node output.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelTrainingExecutor;

#[async_trait]
impl StageExecutor for ModelTrainingExecutor {
    async fn run(&self, ctx: &StageRunContext) -> Result<StageOutcome, StageExecutionError> {
        simulated_work(80).await;

        let algorithm = ctx.config_str("algorithm").unwrap_or("gradient_boosting");
        let epochs = ctx.config_f64("epochs").unwrap_or(10.0);
        let accuracy = jittered(0.92, 0.04).clamp(0.0, 1.0);
        let model_id = format!("model-{}", Uuid::new_v4());

        tracing::info!(
            stage = %ctx.stage_name,
            algorithm,
            accuracy,
            "trained model"
        );

        Ok(StageOutcome::with_output(json!({
            "model": {
                "modelId": model_id,
                "algorithm": algorithm,
                "accuracy": accuracy,
            }
        }))
        .metric("accuracy", accuracy)
        .metric("loss", jittered(0.21, 0.08).max(0.0))
        .metric("epochs", epochs))
    }
}

/// Scores a trained model on held-out data.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelEvaluationExecutor;

#[async_trait]
impl StageExecutor for ModelEvaluationExecutor {
    async fn run(&self, _ctx: &StageRunContext) -> Result<StageOutcome, StageExecutionError> {
        simulated_work(25).await;

        let precision = jittered(0.9, 0.05).clamp(0.0, 1.0);
        let recall = jittered(0.88, 0.05).clamp(0.0, 1.0);
        let f1 = 2.0 * precision * recall / (precision + recall);

        Ok(StageOutcome::empty()
            .metric("precision", precision)
            .metric("recall", recall)
            .metric("f1Score", f1))
    }
}

/// Gates a model against acceptance thresholds before deployment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelValidationExecutor;

#[async_trait]
impl StageExecutor for ModelValidationExecutor {
    async fn run(&self, ctx: &StageRunContext) -> Result<StageOutcome, StageExecutionError> {
        simulated_work(15).await;

        // Validate against the upstream training metrics when available.
        let trained_accuracy = ctx
            .upstream
            .values()
            .find_map(|output| output.pointer("/model/accuracy"))
            .and_then(serde_json::Value::as_f64)
            .unwrap_or_else(|| jittered(0.92, 0.04));
        let min_accuracy = ctx.config_f64("minAccuracy").unwrap_or(0.0);
        if trained_accuracy < min_accuracy {
            return Err(StageExecutionError::new(format!(
                "model accuracy {trained_accuracy:.3} below acceptance threshold {min_accuracy:.3}"
            )));
        }

        Ok(StageOutcome::empty()
            .metric("accuracy", trained_accuracy)
            .metric("checksPassed", 1.0))
    }
}

/// Pushes the trained model to a simulated serving endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelDeploymentExecutor;

#[async_trait]
impl StageExecutor for ModelDeploymentExecutor {
    async fn run(&self, ctx: &StageRunContext) -> Result<StageOutcome, StageExecutionError> {
        simulated_work(35).await;

        let environment = ctx.config_str("environment").unwrap_or("staging");
        Ok(StageOutcome::with_output(json!({
            "endpoint": format!(
                "https://serving.{environment}.klikkflow.dev/models/{}",
                Uuid::new_v4()
            ),
        }))
        .metric("coldStartMs", jittered(320.0, 80.0).max(0.0)))
    }
}

/// Compares the live data distribution against the training baseline.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataDriftDetectionExecutor;

#[async_trait]
impl StageExecutor for DataDriftDetectionExecutor {
    async fn run(&self, _ctx: &StageRunContext) -> Result<StageOutcome, StageExecutionError> {
        simulated_work(20).await;

        Ok(StageOutcome::empty()
            .metric("driftScore", jittered(0.04, 0.03).max(0.0))
            .metric("driftedFeatures", jittered(1.0, 1.0).round().max(0.0)))
    }
}

/// Wires up health checks and alerting for a deployed model.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelMonitoringExecutor;

#[async_trait]
impl StageExecutor for ModelMonitoringExecutor {
    async fn run(&self, _ctx: &StageRunContext) -> Result<StageOutcome, StageExecutionError> {
        simulated_work(10).await;

        Ok(StageOutcome::empty()
            .metric("probesConfigured", 3.0)
            .metric("alertRules", 2.0))
    }
}

/// Splits simulated traffic between two model variants and reports the
/// conversion delta.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbTestingExecutor;

#[async_trait]
impl StageExecutor for AbTestingExecutor {
    async fn run(&self, _ctx: &StageRunContext) -> Result<StageOutcome, StageExecutionError> {
        simulated_work(45).await;

        let variant_a = jittered(0.12, 0.02).max(0.0);
        let variant_b = jittered(0.13, 0.02).max(0.0);
        let winner = if variant_b >= variant_a {
            "variant_b"
        } else {
            "variant_a"
        };
        Ok(StageOutcome::with_output(json!({"winner": winner}))
            .metric("variantAConversion", variant_a)
            .metric("variantBConversion", variant_b))
    }
}

/// Runs a user-supplied script step.
#[derive(Debug, Clone, Copy, Default)]
pub struct CustomScriptExecutor;

#[async_trait]
impl StageExecutor for CustomScriptExecutor {
    async fn run(&self, ctx: &StageRunContext) -> Result<StageOutcome, StageExecutionError> {
        simulated_work(20).await;

        let script = ctx
            .config_str("script")
            .ok_or_else(|| StageExecutionError::new("custom_script stage requires a 'script' entry"))?;

        Ok(StageOutcome::with_output(json!({
            "script": script,
        }))
        .metric("exitCode", 0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageType;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn ctx(stage_type: StageType, config: serde_json::Value) -> StageRunContext {
        StageRunContext {
            stage_name: "test".to_string(),
            stage_type,
            config,
            attempt: 1,
            pipeline_input: Arc::new(serde_json::Value::Null),
            upstream: HashMap::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_training_emits_model_handle() {
        let executor = ModelTrainingExecutor;
        let outcome = executor
            .run(&ctx(
                StageType::ModelTraining,
                serde_json::json!({"algorithm": "xgboost"}),
            ))
            .await
            .unwrap();

        let model = &outcome.output["model"];
        assert_eq!(model["algorithm"], "xgboost");
        assert!(model["modelId"].as_str().unwrap().starts_with("model-"));
        assert!(outcome.metrics.contains_key("accuracy"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_validation_fails_on_impossible_threshold() {
        let executor = DataValidationExecutor;
        let err = executor
            .run(&ctx(
                StageType::DataValidation,
                serde_json::json!({"minCompleteness": 2.0}),
            ))
            .await
            .unwrap_err();
        assert!(err.message.contains("completeness"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_model_validation_reads_upstream_accuracy() {
        let executor = ModelValidationExecutor;
        let mut context = ctx(StageType::ModelValidation, serde_json::json!({"minAccuracy": 0.5}));
        context.upstream.insert(
            "train".to_string(),
            serde_json::json!({"model": {"accuracy": 0.95}}),
        );

        let outcome = executor.run(&context).await.unwrap();
        assert_eq!(outcome.metrics["accuracy"], 0.95);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_script_requires_script() {
        let executor = CustomScriptExecutor;
        let err = executor
            .run(&ctx(StageType::CustomScript, serde_json::Value::Null))
            .await
            .unwrap_err();
        assert!(err.message.contains("script"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_preprocessing_respects_input_rows() {
        let executor = DataPreprocessingExecutor;
        let mut context = ctx(StageType::DataPreprocessing, serde_json::Value::Null);
        context.pipeline_input = Arc::new(serde_json::json!({"rows": 1000.0}));

        let outcome = executor.run(&context).await.unwrap();
        assert_eq!(outcome.metrics["rowsProcessed"], 1000.0);
    }
}
