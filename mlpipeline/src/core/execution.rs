//! The pipeline execution record.

use super::{PipelineStatus, StageRecord, StageStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// The record tracking one end-to-end run of a stage set.
///
/// Created at the start of `execute`, mutated throughout by the selected
/// strategy, finalized exactly once, then returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineExecution {
    /// Generated unique id for this run.
    pub id: String,
    /// The configured pipeline name.
    pub pipeline_name: String,
    /// Overall run status.
    pub status: PipelineStatus,
    /// The full ordered stage collection, exclusively owned by this run.
    pub stages: Vec<StageRecord>,
    /// Aggregate metrics, computed when the run reaches a terminal status.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub overall_metrics: HashMap<String, f64>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run reached a terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Total wall-clock duration in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_duration_ms: Option<f64>,
    /// Side-channel outputs: experiment id, deployment info, monitoring info.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub artifacts: HashMap<String, serde_json::Value>,
}

impl PipelineExecution {
    /// Creates a pending execution record over the given stages.
    #[must_use]
    pub fn new(pipeline_name: impl Into<String>, stages: Vec<StageRecord>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            pipeline_name: pipeline_name.into(),
            status: PipelineStatus::Pending,
            stages,
            overall_metrics: HashMap::new(),
            started_at: Utc::now(),
            finished_at: None,
            total_duration_ms: None,
            artifacts: HashMap::new(),
        }
    }

    /// Number of stages in the given terminal status.
    #[must_use]
    pub fn count_with_status(&self, status: StageStatus) -> usize {
        self.stages.iter().filter(|s| s.status == status).count()
    }

    /// Stores a side-channel artifact.
    pub fn add_artifact(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.artifacts.insert(key.into(), value);
    }

    /// Finalizes the record: stamps the end time, computes the total
    /// duration, and aggregates overall metrics. Idempotent; a record
    /// already in a terminal status is left untouched.
    pub fn finalize(&mut self, status: PipelineStatus) {
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        let finished = Utc::now();
        self.finished_at = Some(finished);

        let micros = (finished - self.started_at).num_microseconds();
        #[allow(clippy::cast_precision_loss)]
        let duration_ms = micros.map(|us| us as f64 / 1000.0);
        self.total_duration_ms = duration_ms;

        self.overall_metrics = self.aggregate_metrics();
    }

    #[allow(clippy::cast_precision_loss)]
    fn aggregate_metrics(&self) -> HashMap<String, f64> {
        let total = self.stages.len();
        let completed = self.count_with_status(StageStatus::Completed);
        let failed = self.count_with_status(StageStatus::Failed);
        let skipped = self.count_with_status(StageStatus::Skipped);

        let mut metrics = HashMap::new();
        metrics.insert("totalStages".to_string(), total as f64);
        metrics.insert("completedStages".to_string(), completed as f64);
        metrics.insert("failedStages".to_string(), failed as f64);
        metrics.insert("skippedStages".to_string(), skipped as f64);

        let success_rate = if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64
        };
        metrics.insert("successRate".to_string(), success_rate);

        let durations: Vec<f64> = self.stages.iter().filter_map(StageRecord::duration_ms).collect();
        if !durations.is_empty() {
            let avg = durations.iter().sum::<f64>() / durations.len() as f64;
            metrics.insert("averageStageDurationMs".to_string(), avg);
        }
        if let Some(total_ms) = self.total_duration_ms {
            metrics.insert("totalDurationMs".to_string(), total_ms);
        }

        metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{StageOutcome, StageType};
    use pretty_assertions::assert_eq;

    fn record(name: &str) -> StageRecord {
        StageRecord::new(name, StageType::CustomScript)
    }

    fn completed(name: &str) -> StageRecord {
        let mut r = record(name);
        r.mark_running();
        r.complete(&StageOutcome::empty());
        r
    }

    fn failed(name: &str) -> StageRecord {
        let mut r = record(name);
        r.mark_running();
        r.fail("boom");
        r
    }

    #[test]
    fn test_execution_has_unique_id() {
        let a = PipelineExecution::new("p", vec![]);
        let b = PipelineExecution::new("p", vec![]);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_success_rate_over_mixed_outcomes() {
        let mut exec = PipelineExecution::new(
            "mixed",
            vec![completed("a"), completed("b"), failed("c"), record("d")],
        );
        exec.finalize(PipelineStatus::Failed);

        assert_eq!(exec.overall_metrics["totalStages"], 4.0);
        assert_eq!(exec.overall_metrics["completedStages"], 2.0);
        assert_eq!(exec.overall_metrics["failedStages"], 1.0);
        assert_eq!(exec.overall_metrics["successRate"], 0.5);
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut exec = PipelineExecution::new("p", vec![completed("a")]);
        exec.finalize(PipelineStatus::Completed);
        let first_finished = exec.finished_at;

        exec.finalize(PipelineStatus::Failed);
        assert_eq!(exec.status, PipelineStatus::Completed);
        assert_eq!(exec.finished_at, first_finished);
    }

    #[test]
    fn test_finalize_stamps_duration() {
        let mut exec = PipelineExecution::new("p", vec![]);
        exec.finalize(PipelineStatus::Completed);
        assert!(exec.finished_at.is_some());
        assert!(exec.total_duration_ms.is_some());
    }

    #[test]
    fn test_artifacts_round_trip() {
        let mut exec = PipelineExecution::new("p", vec![]);
        exec.add_artifact("experimentId", serde_json::json!("exp-42"));
        assert_eq!(exec.artifacts["experimentId"], "exp-42");
    }
}
