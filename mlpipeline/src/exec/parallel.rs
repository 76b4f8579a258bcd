//! Parallel execution: dependency groups dispatched together.

use super::{run_stage, RunState};
use crate::errors::PipelineError;
use crate::resolver;
use futures::future::try_join_all;

/// Runs stages group by group as partitioned by the dependency resolver.
///
/// Stages within a group progress concurrently and the group completes
/// when all members resolve. A failure in any member fails the whole
/// group immediately; later groups never start.
pub(crate) async fn run(state: &RunState) -> Result<(), PipelineError> {
    let nodes = state.dependency_nodes();
    let groups = resolver::group_stages(&nodes)?;

    for group in groups {
        tracing::debug!(stages = ?group, "dispatching dependency group");
        let futures: Vec<_> = group
            .iter()
            .map(|name| run_stage(state, state.index[name]))
            .collect();
        try_join_all(futures).await?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{StageRecord, StageStatus, StageType};
    use crate::registry::StageRegistry;
    use crate::testing::{failing_executor, recording_executor};
    use std::sync::Arc;

    fn stage(name: &str, deps: &[&str]) -> StageRecord {
        StageRecord::new(name, StageType::CustomScript).with_dependencies(deps.iter().copied())
    }

    #[tokio::test(start_paused = true)]
    async fn test_groups_respect_dependency_order() {
        let (executor, invocations) = recording_executor();
        let mut registry = StageRegistry::new();
        registry.register(StageType::CustomScript, executor);

        // Diamond: a -> {b, c} -> d
        let records = vec![
            stage("a", &[]),
            stage("b", &["a"]),
            stage("c", &["a"]),
            stage("d", &["b", "c"]),
        ];
        let state = RunState::new(records, Arc::new(registry), serde_json::Value::Null);

        run(&state).await.unwrap();

        let order = invocations.lock().clone();
        assert_eq!(order.first().map(String::as_str), Some("a"));
        assert_eq!(order.last().map(String::as_str), Some("d"));
        assert_eq!(order.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_group_members_run_concurrently() {
        let (executor, invocations) = recording_executor();
        let mut registry = StageRegistry::new();
        registry.register(StageType::CustomScript, executor);

        // Same group; "slow" is declared first but sleeps longer, so the
        // completion log shows "fast" finishing first.
        let records = vec![
            stage("slow", &[]).with_config(serde_json::json!({"delayMs": 50.0})),
            stage("fast", &[]).with_config(serde_json::json!({"delayMs": 5.0})),
        ];
        let state = RunState::new(records, Arc::new(registry), serde_json::Value::Null);

        run(&state).await.unwrap();

        assert_eq!(*invocations.lock(), vec!["fast", "slow"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_group_failure_stops_later_groups() {
        let (ok_executor, _) = recording_executor();
        let mut registry = StageRegistry::new();
        registry.register(StageType::CustomScript, ok_executor);
        registry.register(StageType::DataValidation, failing_executor("schema mismatch"));

        let records = vec![
            StageRecord::new("bad", StageType::DataValidation),
            stage("after", &["bad"]),
        ];
        let state = RunState::new(records, Arc::new(registry), serde_json::Value::Null);

        let err = run(&state).await.unwrap_err();
        assert!(err.to_string().contains("schema mismatch"));

        let stages = state.snapshot();
        assert_eq!(stages[0].status, StageStatus::Failed);
        assert_eq!(stages[1].status, StageStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cycle_fails_before_any_stage_runs() {
        let (executor, invocations) = recording_executor();
        let mut registry = StageRegistry::new();
        registry.register(StageType::CustomScript, executor);

        let records = vec![stage("a", &["b"]), stage("b", &["a"])];
        let state = RunState::new(records, Arc::new(registry), serde_json::Value::Null);

        let err = run(&state).await.unwrap_err();
        assert!(err.to_string().contains("Circular dependency"));
        assert!(invocations.lock().is_empty());
        for stage in state.snapshot() {
            assert_eq!(stage.status, StageStatus::Pending);
        }
    }
}
