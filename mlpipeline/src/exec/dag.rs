//! DAG execution: stages dispatched as soon as their dependencies complete.

use super::{run_stage, RunState};
use crate::core::StageStatus;
use crate::errors::PipelineError;
use crate::resolver;
use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;

/// Runs the stage set in dependency order with maximum overlap.
///
/// In-degree scheduling: every stage with no unsatisfied dependencies is
/// in flight at once; completing a stage releases its dependents.
/// Independent branches interleave freely. Any failure aborts the run,
/// dropping in-flight siblings.
pub(crate) async fn run(state: &RunState) -> Result<(), PipelineError> {
    let nodes = state.dependency_nodes();
    // Cycles are fatal before any stage runs.
    resolver::topological_order(&nodes)?;

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut in_degree: Vec<usize> = vec![0; nodes.len()];
    for (idx, (_, deps)) in nodes.iter().enumerate() {
        for dep in deps {
            if let Some(&dep_idx) = state.index.get(dep) {
                children[dep_idx].push(idx);
                in_degree[idx] += 1;
            }
        }
    }

    let mut active: FuturesUnordered<BoxFuture<'_, Result<usize, PipelineError>>> =
        FuturesUnordered::new();
    for (idx, &degree) in in_degree.iter().enumerate() {
        if degree == 0 {
            active.push(stage_future(state, idx));
        }
    }

    let mut completed = 0usize;
    while completed < nodes.len() {
        match active.next().await {
            Some(result) => {
                let idx = result?;
                completed += 1;
                for &child in &children[idx] {
                    in_degree[child] -= 1;
                    if in_degree[child] == 0 {
                        active.push(stage_future(state, child));
                    }
                }
            }
            None => {
                let stuck: Vec<String> = state
                    .snapshot()
                    .into_iter()
                    .filter(|s| s.status == StageStatus::Pending)
                    .map(|s| s.name)
                    .collect();
                return Err(PipelineError::Internal(format!(
                    "deadlocked stage graph; remaining stages: {stuck:?}"
                )));
            }
        }
    }

    Ok(())
}

fn stage_future<'a>(
    state: &'a RunState,
    idx: usize,
) -> BoxFuture<'a, Result<usize, PipelineError>> {
    async move {
        run_stage(state, idx).await?;
        Ok(idx)
    }
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{StageRecord, StageType};
    use crate::registry::StageRegistry;
    use crate::testing::{failing_executor, recording_executor};
    use std::sync::Arc;

    fn stage(name: &str, deps: &[&str]) -> StageRecord {
        StageRecord::new(name, StageType::CustomScript).with_dependencies(deps.iter().copied())
    }

    #[tokio::test(start_paused = true)]
    async fn test_dependencies_complete_before_dependents() {
        let (executor, invocations) = recording_executor();
        let mut registry = StageRegistry::new();
        registry.register(StageType::CustomScript, executor);

        let records = vec![
            stage("fetch", &[]),
            stage("clean", &["fetch"]),
            stage("train", &["clean"]),
        ];
        let state = RunState::new(records, Arc::new(registry), serde_json::Value::Null);

        run(&state).await.unwrap();

        assert_eq!(*invocations.lock(), vec!["fetch", "clean", "train"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_independent_branches_interleave() {
        let (executor, invocations) = recording_executor();
        let mut registry = StageRegistry::new();
        registry.register(StageType::CustomScript, executor);

        // Two roots; the slow one is declared first but must not serialize
        // the fast branch behind it.
        let records = vec![
            stage("slow_root", &[]).with_config(serde_json::json!({"delayMs": 100.0})),
            stage("fast_root", &[]).with_config(serde_json::json!({"delayMs": 5.0})),
            stage("fast_child", &["fast_root"]).with_config(serde_json::json!({"delayMs": 5.0})),
        ];
        let state = RunState::new(records, Arc::new(registry), serde_json::Value::Null);

        run(&state).await.unwrap();

        let order = invocations.lock().clone();
        assert_eq!(order, vec!["fast_root", "fast_child", "slow_root"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_aborts_run() {
        let (ok_executor, _) = recording_executor();
        let mut registry = StageRegistry::new();
        registry.register(StageType::CustomScript, ok_executor);
        registry.register(StageType::ModelTraining, failing_executor("diverged"));

        let records = vec![
            stage("prep", &[]),
            StageRecord::new("train", StageType::ModelTraining)
                .with_dependencies(["prep"]),
            stage("deploy", &["train"]),
        ];
        let state = RunState::new(records, Arc::new(registry), serde_json::Value::Null);

        let err = run(&state).await.unwrap_err();
        assert!(err.to_string().contains("diverged"));

        let stages = state.snapshot();
        assert_eq!(stages[2].status, StageStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_fails_before_any_stage_runs() {
        let (executor, invocations) = recording_executor();
        let mut registry = StageRegistry::new();
        registry.register(StageType::CustomScript, executor);

        let records = vec![stage("a", &["c"]), stage("b", &["a"]), stage("c", &["b"])];
        let state = RunState::new(records, Arc::new(registry), serde_json::Value::Null);

        let err = run(&state).await.unwrap_err();
        assert!(err.to_string().contains("Circular dependency"));
        assert!(invocations.lock().is_empty());
        for stage in state.snapshot() {
            assert_eq!(stage.status, StageStatus::Pending);
        }
    }
}
