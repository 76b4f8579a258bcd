//! # mlpipeline
//!
//! ML pipeline orchestration engine for KlikkFlow workflow nodes.
//!
//! A pipeline is a set of typed, named stages with declared dependencies,
//! executed under one of four control-flow strategies:
//!
//! - **Sequential**: declaration order, one stage at a time
//! - **Parallel**: dependency groups dispatched together
//! - **Conditional**: declaration order with per-stage condition gates
//! - **DAG**: stages dispatched as soon as their dependencies complete
//!
//! Each stage runs under a bounded retry policy with fixed or exponential
//! backoff and a per-attempt timeout. The finalized execution record
//! (statuses, logs, metrics, artifacts) is returned to the workflow
//! runtime as a structured node result; errors never escape the
//! orchestrator boundary.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mlpipeline::prelude::*;
//!
//! let orchestrator = PipelineOrchestrator::default();
//! let context = NodeExecutionContext::from_parameters(serde_json::json!({
//!     "pipelineName": "churn-model",
//!     "pipelineType": "training",
//!     "executionMode": "dag",
//!     "stages": [
//!         {"stageName": "prep", "stageType": "data_preprocessing"},
//!         {"stageName": "train", "stageType": "model_training", "dependsOn": "prep"}
//!     ]
//! }));
//!
//! let result = orchestrator.execute(&context).await;
//! assert!(result.success);
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod core;
pub mod errors;
pub mod exec;
pub mod node;
pub mod observability;
pub mod orchestrator;
pub mod registry;
pub mod resolver;
pub mod services;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{
        DataConfig, DataSourceType, DeploymentConfig, ExperimentConfig, MonitoringConfig,
        PipelineConfig, PipelineType, StageConfig,
    };
    pub use crate::core::{
        PipelineExecution, PipelineStatus, RetryPolicy, StageLogEntry, StageOutcome,
        StageRecord, StageStatus, StageType,
    };
    pub use crate::errors::{
        CycleError, PipelineError, StageExecutionError, StageFailedError, ValidationError,
        ValidationIssue,
    };
    pub use crate::exec::{Condition, ExecutionMode};
    pub use crate::node::{NodeActionResult, NodeExecutionContext, NodeResultMetadata};
    pub use crate::orchestrator::{DryRunReport, PipelineOrchestrator, ResourceEstimate};
    pub use crate::registry::{StageExecutor, StageRegistry, StageRunContext};
    pub use crate::services::{
        DeploymentInfo, ExperimentRun, ExperimentTracker, ModelDeployer, MonitoringInfo,
        MonitoringProvider,
    };
}
