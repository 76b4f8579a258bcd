//! Test doubles for exercising the engine without real workloads.
//!
//! These executors are deliberately tiny: they record invocations, fail on
//! demand, or succeed after a configurable number of failures, so tests can
//! assert ordering, abort, and retry behavior precisely.

use crate::core::StageOutcome;
use crate::errors::StageExecutionError;
use crate::registry::{StageExecutor, StageRunContext};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Records every invocation's stage name, in call order.
///
/// Honors an optional `delayMs` entry in the stage configuration, sleeping
/// that long before recording, so concurrency tests can shape completion
/// order deterministically under paused time.
#[derive(Debug)]
pub struct RecordingExecutor {
    invocations: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl StageExecutor for RecordingExecutor {
    async fn run(&self, ctx: &StageRunContext) -> Result<StageOutcome, StageExecutionError> {
        if let Some(delay_ms) = ctx.config_f64("delayMs") {
            tokio::time::sleep(Duration::from_millis(delay_ms.max(0.0) as u64)).await;
        }
        self.invocations.lock().push(ctx.stage_name.clone());
        Ok(StageOutcome::with_output(serde_json::json!({"ran": ctx.stage_name})))
    }
}

/// Creates a [`RecordingExecutor`] plus the shared invocation log.
#[must_use]
pub fn recording_executor() -> (Arc<dyn StageExecutor>, Arc<Mutex<Vec<String>>>) {
    let invocations = Arc::new(Mutex::new(Vec::new()));
    (
        Arc::new(RecordingExecutor {
            invocations: Arc::clone(&invocations),
        }),
        invocations,
    )
}

/// Counts invocations and succeeds.
#[derive(Debug)]
pub struct CountingExecutor {
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl StageExecutor for CountingExecutor {
    async fn run(&self, _ctx: &StageRunContext) -> Result<StageOutcome, StageExecutionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(StageOutcome::empty())
    }
}

/// Creates a [`CountingExecutor`] plus the shared call counter.
#[must_use]
pub fn counting_executor() -> (Arc<dyn StageExecutor>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    (
        Arc::new(CountingExecutor {
            calls: Arc::clone(&calls),
        }),
        calls,
    )
}

/// Always fails with the given message.
#[derive(Debug)]
pub struct FailingExecutor {
    message: String,
}

#[async_trait]
impl StageExecutor for FailingExecutor {
    async fn run(&self, _ctx: &StageRunContext) -> Result<StageOutcome, StageExecutionError> {
        Err(StageExecutionError::new(self.message.clone()))
    }
}

/// Creates an executor that fails every attempt.
#[must_use]
pub fn failing_executor(message: impl Into<String>) -> Arc<dyn StageExecutor> {
    Arc::new(FailingExecutor {
        message: message.into(),
    })
}

/// Fails the first `fail_times` attempts, then succeeds.
#[derive(Debug)]
pub struct EventuallySucceedingExecutor {
    fail_times: usize,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl StageExecutor for EventuallySucceedingExecutor {
    async fn run(&self, _ctx: &StageRunContext) -> Result<StageOutcome, StageExecutionError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.fail_times {
            Err(StageExecutionError::new(format!("simulated failure {call}")))
        } else {
            Ok(StageOutcome::empty())
        }
    }
}

/// Creates an executor failing the first `fail_times` attempts, plus its
/// call counter.
#[must_use]
pub fn eventually_succeeding_executor(
    fail_times: usize,
) -> (Arc<dyn StageExecutor>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    (
        Arc::new(EventuallySucceedingExecutor {
            fail_times,
            calls: Arc::clone(&calls),
        }),
        calls,
    )
}
