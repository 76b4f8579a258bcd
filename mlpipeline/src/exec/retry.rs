//! Bounded retry around a single stage execution.
//!
//! The controller owns all retry bookkeeping: attempt counting, backoff
//! delays, per-attempt timeout enforcement, and the structured attempt log
//! on the stage record. Sleeping between attempts suspends only the owning
//! stage's future; sibling stages in a concurrent group keep progressing.

use crate::core::{StageOutcome, StageRecord};
use crate::errors::{StageExecutionError, StageFailedError};
use crate::registry::{StageExecutor, StageRunContext};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

/// Executes a stage's action with the record's retry policy.
///
/// Attempts total `max_retries + 1`. The delay before retry *n*
/// (1-indexed) is the policy's base delay, doubled per attempt when
/// exponential backoff is enabled. Exhaustion returns a
/// [`StageFailedError`] carrying the final attempt's message.
pub(crate) async fn execute_with_retry(
    record: &Arc<RwLock<StageRecord>>,
    executor: &Arc<dyn StageExecutor>,
    mut ctx: StageRunContext,
) -> Result<StageOutcome, StageFailedError> {
    let (policy, timeout_minutes, name) = {
        let r = record.read();
        (r.retry_policy.clone(), r.timeout_minutes, r.name.clone())
    };
    let max_attempts = policy.max_retries + 1;

    let mut attempt = 1u32;
    loop {
        ctx.attempt = attempt;

        match run_attempt(executor, &ctx, timeout_minutes).await {
            Ok(outcome) => {
                if attempt > 1 {
                    record
                        .write()
                        .log(format!("stage '{name}' attempt {attempt}/{max_attempts} succeeded"));
                }
                return Ok(outcome);
            }
            Err(err) => {
                record.write().log(format!(
                    "stage '{name}' attempt {attempt}/{max_attempts} failed: {err}"
                ));
                tracing::warn!(
                    stage = %name,
                    attempt,
                    max_attempts,
                    error = %err,
                    "stage attempt failed"
                );

                if attempt >= max_attempts {
                    return Err(StageFailedError {
                        stage: name,
                        attempts: max_attempts,
                        message: err.message,
                    });
                }

                let delay = policy.delay_for_attempt(attempt).max(0.0);
                record.write().log(format!("retrying in {delay}s"));
                tokio::time::sleep(Duration::from_secs_f64(delay)).await;
                attempt += 1;
            }
        }
    }
}

async fn run_attempt(
    executor: &Arc<dyn StageExecutor>,
    ctx: &StageRunContext,
    timeout_minutes: f64,
) -> Result<StageOutcome, StageExecutionError> {
    if timeout_minutes > 0.0 && timeout_minutes.is_finite() {
        let budget = Duration::from_secs_f64(timeout_minutes * 60.0);
        match tokio::time::timeout(budget, executor.run(ctx)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(StageExecutionError::new(format!(
                "attempt timed out after {timeout_minutes} minutes"
            ))),
        }
    } else {
        executor.run(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RetryPolicy, StageType};
    use crate::registry::MockStageExecutor;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `fail_times` attempts, then succeeds.
    #[derive(Debug)]
    struct FlakyExecutor {
        fail_times: u32,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl StageExecutor for FlakyExecutor {
        async fn run(&self, _ctx: &StageRunContext) -> Result<StageOutcome, StageExecutionError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.fail_times {
                Err(StageExecutionError::new(format!("transient failure {call}")))
            } else {
                Ok(StageOutcome::empty().metric("call", f64::from(call)))
            }
        }
    }

    /// Sleeps longer than any sane timeout.
    #[derive(Debug)]
    struct HangingExecutor;

    #[async_trait]
    impl StageExecutor for HangingExecutor {
        async fn run(&self, _ctx: &StageRunContext) -> Result<StageOutcome, StageExecutionError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(StageOutcome::empty())
        }
    }

    fn record_with_policy(policy: RetryPolicy) -> Arc<RwLock<StageRecord>> {
        Arc::new(RwLock::new(
            StageRecord::new("flaky", StageType::CustomScript).with_retry_policy(policy),
        ))
    }

    fn ctx() -> StageRunContext {
        StageRunContext {
            stage_name: "flaky".to_string(),
            stage_type: StageType::CustomScript,
            config: serde_json::Value::Null,
            attempt: 1,
            pipeline_input: Arc::new(serde_json::Value::Null),
            upstream: HashMap::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_failures_with_exponential_delays() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor: Arc<dyn StageExecutor> = Arc::new(FlakyExecutor {
            fail_times: 2,
            calls: Arc::clone(&calls),
        });
        let record = record_with_policy(RetryPolicy {
            max_retries: 2,
            retry_delay_seconds: 1.0,
            exponential_backoff: true,
        });

        let started = tokio::time::Instant::now();
        let outcome = execute_with_retry(&record, &executor, ctx()).await.unwrap();

        // Exactly three invocations, with 1s + 2s of backoff in between.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.metrics["call"], 3.0);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3), "elapsed {elapsed:?}");
        assert!(elapsed < Duration::from_secs(4), "elapsed {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_fails_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor: Arc<dyn StageExecutor> = Arc::new(FlakyExecutor {
            fail_times: u32::MAX,
            calls: Arc::clone(&calls),
        });
        let record = record_with_policy(RetryPolicy::default());

        let err = execute_with_retry(&record, &executor, ctx()).await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(err.attempts, 1);
        assert!(err.message.contains("transient failure 1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_final_message() {
        let calls = Arc::new(AtomicU32::new(0));
        let executor: Arc<dyn StageExecutor> = Arc::new(FlakyExecutor {
            fail_times: u32::MAX,
            calls: Arc::clone(&calls),
        });
        let record = record_with_policy(RetryPolicy {
            max_retries: 3,
            retry_delay_seconds: 0.5,
            exponential_backoff: false,
        });

        let err = execute_with_retry(&record, &executor, ctx()).await.unwrap_err();
        assert_eq!(err.attempts, 4);
        assert!(err.message.contains("transient failure 4"));

        // One failure line per attempt, plus a retry line per sleep.
        let logs = record.read().logs.len();
        assert_eq!(logs, 4 + 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_number_is_passed_to_executor() {
        let mut mock = MockStageExecutor::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_run()
            .times(1)
            .withf(|ctx| ctx.attempt == 1)
            .in_sequence(&mut seq)
            .returning(|_| Err(StageExecutionError::new("first attempt fails")));
        mock.expect_run()
            .times(1)
            .withf(|ctx| ctx.attempt == 2)
            .in_sequence(&mut seq)
            .returning(|_| Ok(StageOutcome::empty()));

        let executor: Arc<dyn StageExecutor> = Arc::new(mock);
        let record = record_with_policy(RetryPolicy {
            max_retries: 1,
            retry_delay_seconds: 0.1,
            exponential_backoff: false,
        });

        assert!(execute_with_retry(&record, &executor, ctx()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failed_attempt() {
        let executor: Arc<dyn StageExecutor> = Arc::new(HangingExecutor);
        let record = Arc::new(RwLock::new(
            StageRecord::new("slow", StageType::ModelTraining)
                .with_retry_policy(RetryPolicy::default())
                .with_timeout_minutes(0.001),
        ));

        let err = execute_with_retry(&record, &executor, ctx()).await.unwrap_err();
        assert!(err.message.contains("timed out"));
    }
}
