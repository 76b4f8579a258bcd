//! Execution strategies and the shared per-stage execution path.
//!
//! All four strategies drive the same stage state machine
//! (`pending -> running -> {completed, failed, skipped}`); they differ only
//! in the order they select stages and in how much of the stage set may be
//! in flight at once. Concurrency is cooperative: concurrent stages are
//! joined futures inside one task, never separate threads.

mod conditional;
mod dag;
mod parallel;
mod retry;
mod sequential;

pub use conditional::{Condition, ConditionParseError};

use crate::core::{StageOutcome, StageRecord};
use crate::errors::PipelineError;
use crate::registry::{StageRegistry, StageRunContext};
use crate::resolver::DependencyNode;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The control-flow policy governing stage ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One stage at a time, in declaration order.
    Sequential,
    /// Dependency groups run concurrently, group by group.
    Parallel,
    /// Declaration order with per-stage condition gates.
    Conditional,
    /// Stages dispatched as soon as their dependencies complete.
    Dag,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        Self::Sequential
    }
}

impl ExecutionMode {
    /// Parses a raw mode identifier; `None` is the fatal "unsupported
    /// execution mode" configuration error.
    #[must_use]
    pub fn from_identifier(raw: &str) -> Option<Self> {
        match raw {
            "sequential" => Some(Self::Sequential),
            "parallel" => Some(Self::Parallel),
            "conditional" => Some(Self::Conditional),
            "dag" => Some(Self::Dag),
            _ => None,
        }
    }

    /// The wire identifier for this mode.
    #[must_use]
    pub fn identifier(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
            Self::Conditional => "conditional",
            Self::Dag => "dag",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

/// Shared mutable state for one pipeline run.
///
/// Stage records sit behind individual locks so concurrent branches can
/// mutate their own stage; the results accumulator is keyed by stage name
/// and each stage writes only its own key.
pub(crate) struct RunState {
    pub stages: Vec<Arc<RwLock<StageRecord>>>,
    pub index: HashMap<String, usize>,
    pub results: Arc<DashMap<String, StageOutcome>>,
    pub registry: Arc<StageRegistry>,
    pub pipeline_input: Arc<serde_json::Value>,
}

impl RunState {
    pub fn new(
        records: Vec<StageRecord>,
        registry: Arc<StageRegistry>,
        pipeline_input: serde_json::Value,
    ) -> Self {
        let index = records
            .iter()
            .enumerate()
            .map(|(idx, record)| (record.name.clone(), idx))
            .collect();
        let stages = records
            .into_iter()
            .map(|record| Arc::new(RwLock::new(record)))
            .collect();

        Self {
            stages,
            index,
            results: Arc::new(DashMap::new()),
            registry,
            pipeline_input: Arc::new(pipeline_input),
        }
    }

    /// Stage names and dependencies in declaration order, for the resolver.
    pub fn dependency_nodes(&self) -> Vec<DependencyNode> {
        self.stages
            .iter()
            .map(|stage| {
                let record = stage.read();
                (record.name.clone(), record.depends_on.clone())
            })
            .collect()
    }

    /// Clones the stage records out for the final execution record.
    pub fn snapshot(&self) -> Vec<StageRecord> {
        self.stages.iter().map(|stage| stage.read().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }
}

/// Dispatches to the strategy selected by the execution mode.
pub(crate) async fn run_mode(mode: ExecutionMode, state: &RunState) -> Result<(), PipelineError> {
    match mode {
        ExecutionMode::Sequential => sequential::run(state).await,
        ExecutionMode::Parallel => parallel::run(state).await,
        ExecutionMode::Conditional => conditional::run(state).await,
        ExecutionMode::Dag => dag::run(state).await,
    }
}

/// Runs one stage through the retry controller and records the outcome.
///
/// This is the shared `pending -> running -> terminal` path every strategy
/// funnels through.
pub(crate) async fn run_stage(state: &RunState, idx: usize) -> Result<(), PipelineError> {
    let record = &state.stages[idx];
    let (name, stage_type, config, deps) = {
        let r = record.read();
        (
            r.name.clone(),
            r.stage_type,
            r.config.clone(),
            r.depends_on.clone(),
        )
    };

    let executor =
        state
            .registry
            .get(stage_type)
            .ok_or_else(|| PipelineError::UnknownStageType {
                stage: name.clone(),
                stage_type: stage_type.to_string(),
            })?;

    // Dependencies are guaranteed complete by the strategy's ordering rule,
    // so their keys are present by the time this snapshot is taken.
    let upstream: HashMap<String, serde_json::Value> = deps
        .iter()
        .filter_map(|dep| {
            state
                .results
                .get(dep)
                .map(|entry| (dep.clone(), entry.output.clone()))
        })
        .collect();

    {
        let mut r = record.write();
        r.mark_running();
        r.log("stage started");
    }
    tracing::info!(stage = %name, stage_type = %stage_type, "stage started");

    let ctx = StageRunContext {
        stage_name: name.clone(),
        stage_type,
        config,
        attempt: 1,
        pipeline_input: Arc::clone(&state.pipeline_input),
        upstream,
    };

    match retry::execute_with_retry(record, &executor, ctx).await {
        Ok(outcome) => {
            state.results.insert(name.clone(), outcome.clone());
            let mut r = record.write();
            r.complete(&outcome);
            r.log("stage completed");
            tracing::info!(stage = %name, "stage completed");
            Ok(())
        }
        Err(failed) => {
            let mut r = record.write();
            r.fail(failed.message.clone());
            tracing::warn!(stage = %name, error = %failed, "stage failed");
            Err(failed.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StageType;

    #[test]
    fn test_mode_identifiers_round_trip() {
        for mode in [
            ExecutionMode::Sequential,
            ExecutionMode::Parallel,
            ExecutionMode::Conditional,
            ExecutionMode::Dag,
        ] {
            assert_eq!(ExecutionMode::from_identifier(mode.identifier()), Some(mode));
        }
    }

    #[test]
    fn test_unknown_mode_identifier() {
        assert_eq!(ExecutionMode::from_identifier("round_robin"), None);
    }

    #[test]
    fn test_run_state_indexes_by_name() {
        let records = vec![
            StageRecord::new("a", StageType::CustomScript),
            StageRecord::new("b", StageType::CustomScript),
        ];
        let state = RunState::new(
            records,
            Arc::new(StageRegistry::builtin()),
            serde_json::Value::Null,
        );

        assert_eq!(state.len(), 2);
        assert_eq!(state.index["a"], 0);
        assert_eq!(state.index["b"], 1);
        assert_eq!(state.snapshot().len(), 2);
    }

    #[tokio::test]
    async fn test_run_stage_unknown_type_is_fatal() {
        let records = vec![StageRecord::new("lonely", StageType::ModelTraining)];
        let state = RunState::new(
            records,
            Arc::new(StageRegistry::new()),
            serde_json::Value::Null,
        );

        let err = run_stage(&state, 0).await.unwrap_err();
        assert!(matches!(err, PipelineError::UnknownStageType { .. }));
    }
}
