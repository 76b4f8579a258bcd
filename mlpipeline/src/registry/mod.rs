//! Stage executor trait and the type-keyed registry.
//!
//! The registry is the leaf of the engine: a fixed mapping from
//! [`StageType`] to the executor implementing that operation. Execution
//! strategies look stages up here; an identifier with no entry is the fatal
//! "unknown stage type" configuration error.

mod simulated;

pub use simulated::{
    AbTestingExecutor, CustomScriptExecutor, DataDriftDetectionExecutor,
    DataPreprocessingExecutor, DataValidationExecutor, FeatureEngineeringExecutor,
    ModelDeploymentExecutor, ModelEvaluationExecutor, ModelMonitoringExecutor,
    ModelTrainingExecutor, ModelValidationExecutor,
};

use crate::core::{StageOutcome, StageType};
use crate::errors::StageExecutionError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// Everything an executor may read while running one attempt of a stage.
///
/// All state is passed explicitly; executors hold no ambient context.
#[derive(Debug, Clone)]
pub struct StageRunContext {
    /// The stage's unique name within the run.
    pub stage_name: String,
    /// The operation being executed.
    pub stage_type: StageType,
    /// Stage-specific configuration from the node parameters.
    pub config: serde_json::Value,
    /// 1-indexed attempt number (retries increment this).
    pub attempt: u32,
    /// The pipeline's initial dataset.
    pub pipeline_input: Arc<serde_json::Value>,
    /// Outputs of this stage's completed dependencies, keyed by stage name.
    pub upstream: HashMap<String, serde_json::Value>,
}

impl StageRunContext {
    /// Reads a string field from the stage configuration.
    #[must_use]
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(serde_json::Value::as_str)
    }

    /// Reads a numeric field from the stage configuration.
    #[must_use]
    pub fn config_f64(&self, key: &str) -> Option<f64> {
        self.config.get(key).and_then(serde_json::Value::as_f64)
    }

    /// Reads a boolean field from the stage configuration.
    #[must_use]
    pub fn config_bool(&self, key: &str) -> Option<bool> {
        self.config.get(key).and_then(serde_json::Value::as_bool)
    }
}

/// A stage operation implementation.
///
/// Executors are invoked by the retry controller; a returned error counts
/// as one failed attempt. Implementations must not retain state between
/// attempts; retry bookkeeping belongs to the controller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StageExecutor: Send + Sync + Debug {
    /// Runs one attempt of the stage.
    async fn run(&self, ctx: &StageRunContext) -> Result<StageOutcome, StageExecutionError>;
}

/// Fixed mapping from stage type to executor.
#[derive(Debug, Default, Clone)]
pub struct StageRegistry {
    executors: HashMap<StageType, Arc<dyn StageExecutor>>,
}

impl StageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with the built-in simulated executor for every
    /// stage type.
    #[must_use]
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(StageType::DataPreprocessing, Arc::new(DataPreprocessingExecutor));
        registry.register(StageType::FeatureEngineering, Arc::new(FeatureEngineeringExecutor));
        registry.register(StageType::DataValidation, Arc::new(DataValidationExecutor));
        registry.register(StageType::ModelTraining, Arc::new(ModelTrainingExecutor));
        registry.register(StageType::ModelEvaluation, Arc::new(ModelEvaluationExecutor));
        registry.register(StageType::ModelValidation, Arc::new(ModelValidationExecutor));
        registry.register(StageType::ModelDeployment, Arc::new(ModelDeploymentExecutor));
        registry.register(StageType::DataDriftDetection, Arc::new(DataDriftDetectionExecutor));
        registry.register(StageType::ModelMonitoring, Arc::new(ModelMonitoringExecutor));
        registry.register(StageType::AbTesting, Arc::new(AbTestingExecutor));
        registry.register(StageType::CustomScript, Arc::new(CustomScriptExecutor));
        registry
    }

    /// Registers (or replaces) the executor for a stage type.
    pub fn register(&mut self, stage_type: StageType, executor: Arc<dyn StageExecutor>) {
        self.executors.insert(stage_type, executor);
    }

    /// Looks up the executor for a stage type.
    #[must_use]
    pub fn get(&self, stage_type: StageType) -> Option<Arc<dyn StageExecutor>> {
        self.executors.get(&stage_type).cloned()
    }

    /// Returns true if the stage type has a registered executor.
    #[must_use]
    pub fn contains(&self, stage_type: StageType) -> bool {
        self.executors.contains_key(&stage_type)
    }

    /// Number of registered executors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.executors.len()
    }

    /// Returns true if no executors are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}
