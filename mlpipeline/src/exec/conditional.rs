//! Conditional execution: declaration order with per-stage condition gates.
//!
//! Conditions are small expressions evaluated against the results
//! accumulated so far: `[!] stage[.key...] [op number]` with the comparison
//! operators `== != >= <= > <`. A bare path is truthy when the referenced
//! stage has produced a result and the value at the path is
//! non-null/non-false/non-zero. Paths resolve into the producing stage's
//! output data first, then its metrics. Conditions should only reference
//! stages that run earlier; a missing key evaluates the gate to false
//! rather than erroring.

use super::{run_stage, RunState};
use crate::core::StageOutcome;
use crate::errors::{PipelineError, ValidationError, ValidationIssue};
use dashmap::DashMap;
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

const CONDITION_PATTERN: &str = r"^\s*(!)?\s*([A-Za-z_][A-Za-z0-9_\-]*(?:\.[A-Za-z0-9_\-]+)*)\s*(?:(==|!=|>=|<=|>|<)\s*(-?[0-9]+(?:\.[0-9]+)?))?\s*$";

fn condition_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        #[allow(clippy::expect_used)]
        Regex::new(CONDITION_PATTERN).expect("condition pattern is a valid regex")
    })
}

/// Error raised for a condition expression that does not match the grammar.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid condition '{expression}': {reason}")]
pub struct ConditionParseError {
    /// The offending expression.
    pub expression: String,
    /// Why it was rejected.
    pub reason: String,
}

/// Comparison operator in a condition expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparator {
    Eq,
    Ne,
    Ge,
    Le,
    Gt,
    Lt,
}

impl Comparator {
    fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            ">=" => Some(Self::Ge),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            "<" => Some(Self::Lt),
            _ => None,
        }
    }

    fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Eq => (lhs - rhs).abs() < f64::EPSILON,
            Self::Ne => (lhs - rhs).abs() >= f64::EPSILON,
            Self::Ge => lhs >= rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Lt => lhs < rhs,
        }
    }
}

/// A parsed condition expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    negated: bool,
    path: Vec<String>,
    comparison: Option<(Comparator, f64)>,
}

impl Condition {
    /// Parses a condition expression.
    ///
    /// # Errors
    ///
    /// Returns a [`ConditionParseError`] when the expression does not match
    /// the grammar.
    pub fn parse(expression: &str) -> Result<Self, ConditionParseError> {
        let captures = condition_regex().captures(expression).ok_or_else(|| {
            ConditionParseError {
                expression: expression.to_string(),
                reason: "expected '[!] stage[.key...] [op number]'".to_string(),
            }
        })?;

        let negated = captures.get(1).is_some();
        let path: Vec<String> = captures
            .get(2)
            .map(|m| m.as_str().split('.').map(ToString::to_string).collect())
            .unwrap_or_default();

        let comparison = match (captures.get(3), captures.get(4)) {
            (Some(op), Some(number)) => {
                let comparator = Comparator::from_symbol(op.as_str()).ok_or_else(|| {
                    ConditionParseError {
                        expression: expression.to_string(),
                        reason: format!("unknown operator '{}'", op.as_str()),
                    }
                })?;
                let rhs = number.as_str().parse::<f64>().map_err(|e| ConditionParseError {
                    expression: expression.to_string(),
                    reason: format!("bad number: {e}"),
                })?;
                Some((comparator, rhs))
            }
            _ => None,
        };

        if path.is_empty() {
            return Err(ConditionParseError {
                expression: expression.to_string(),
                reason: "missing stage reference".to_string(),
            });
        }

        Ok(Self {
            negated,
            path,
            comparison,
        })
    }

    /// Evaluates the condition against the results accumulator.
    #[must_use]
    pub fn evaluate(&self, results: &DashMap<String, StageOutcome>) -> bool {
        let value = self.resolve(results);
        let truthy = match (&self.comparison, &value) {
            (Some((comparator, rhs)), Some(v)) => {
                as_number(v).is_some_and(|lhs| comparator.apply(lhs, *rhs))
            }
            (Some(_), None) | (None, None) => false,
            (None, Some(v)) => is_truthy(v),
        };
        truthy != self.negated
    }

    fn resolve(&self, results: &DashMap<String, StageOutcome>) -> Option<serde_json::Value> {
        let stage = self.path.first()?;
        let entry = results.get(stage)?;

        // Bare stage reference: the stage has completed.
        if self.path.len() == 1 {
            return Some(serde_json::Value::Bool(true));
        }

        let mut current = &entry.output;
        let mut found = true;
        for segment in &self.path[1..] {
            match current.get(segment) {
                Some(next) => current = next,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if found {
            return Some(current.clone());
        }

        // A single trailing segment may name a metric instead.
        if self.path.len() == 2 {
            if let Some(metric) = entry.metrics.get(&self.path[1]) {
                return serde_json::Number::from_f64(*metric).map(serde_json::Value::Number);
            }
        }

        None
    }
}

fn as_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::Bool(b) => Some(f64::from(u8::from(*b))),
        _ => None,
    }
}

fn is_truthy(value: &serde_json::Value) -> bool {
    match value {
        serde_json::Value::Null => false,
        serde_json::Value::Bool(b) => *b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        serde_json::Value::String(s) => !s.is_empty(),
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => true,
    }
}

/// Runs stages in declaration order, skipping those whose condition
/// evaluates false. Skipped stages never invoke their executor. A running
/// stage's failure aborts the rest of the run, as in sequential mode.
pub(crate) async fn run(state: &RunState) -> Result<(), PipelineError> {
    for idx in 0..state.len() {
        let (name, expression) = {
            let record = state.stages[idx].read();
            (record.name.clone(), record.condition.clone())
        };

        if let Some(expression) = expression {
            let condition = Condition::parse(&expression).map_err(|e| {
                PipelineError::Validation(ValidationError::new(vec![ValidationIssue::stage(
                    name.as_str(),
                    e.to_string(),
                )]))
            })?;

            if !condition.evaluate(&state.results) {
                state
                    .stages[idx]
                    .write()
                    .skip(format!("condition '{expression}' evaluated to false"));
                tracing::info!(stage = %name, condition = %expression, "stage skipped");
                continue;
            }
        }

        run_stage(state, idx).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{StageRecord, StageStatus, StageType};
    use crate::registry::StageRegistry;
    use crate::testing::{counting_executor, recording_executor};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    fn results_with(name: &str, outcome: StageOutcome) -> DashMap<String, StageOutcome> {
        let results = DashMap::new();
        results.insert(name.to_string(), outcome);
        results
    }

    #[test]
    fn test_parse_bare_stage() {
        let condition = Condition::parse("train").unwrap();
        assert!(!condition.negated);
        assert_eq!(condition.path, vec!["train"]);
        assert!(condition.comparison.is_none());
    }

    #[test]
    fn test_parse_comparison() {
        let condition = Condition::parse("train.accuracy >= 0.9").unwrap();
        assert_eq!(condition.path, vec!["train", "accuracy"]);
        assert_eq!(condition.comparison, Some((Comparator::Ge, 0.9)));
    }

    #[test]
    fn test_parse_negation() {
        let condition = Condition::parse("!drift_check.driftScore > 1").unwrap();
        assert!(condition.negated);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Condition::parse("").is_err());
        assert!(Condition::parse("a b c").is_err());
        assert!(Condition::parse("train.accuracy >=").is_err());
        assert!(Condition::parse("1train").is_err());
    }

    #[test]
    fn test_evaluate_metric_comparison() {
        let results = results_with("train", StageOutcome::empty().metric("accuracy", 0.93));

        assert!(Condition::parse("train.accuracy >= 0.9").unwrap().evaluate(&results));
        assert!(!Condition::parse("train.accuracy >= 0.95").unwrap().evaluate(&results));
    }

    #[test]
    fn test_evaluate_output_path() {
        let results = results_with(
            "train",
            StageOutcome::with_output(serde_json::json!({"model": {"ready": true}})),
        );

        assert!(Condition::parse("train.model.ready").unwrap().evaluate(&results));
        assert!(!Condition::parse("train.model.missing").unwrap().evaluate(&results));
    }

    #[test]
    fn test_evaluate_missing_stage_is_false() {
        let results = DashMap::new();
        assert!(!Condition::parse("ghost").unwrap().evaluate(&results));
        assert!(!Condition::parse("ghost.metric > 0").unwrap().evaluate(&results));

        // Negation flips the missing-stage case.
        assert!(Condition::parse("!ghost").unwrap().evaluate(&results));
    }

    #[tokio::test(start_paused = true)]
    async fn test_false_condition_skips_without_invoking() {
        let (executor, calls) = counting_executor();
        let mut registry = StageRegistry::new();
        registry.register(StageType::CustomScript, executor);

        let records = vec![
            StageRecord::new("gated", StageType::CustomScript)
                .with_condition("upstream.accuracy >= 0.9"),
        ];
        let state = RunState::new(records, Arc::new(registry), serde_json::Value::Null);

        run(&state).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let stages = state.snapshot();
        assert_eq!(stages[0].status, StageStatus::Skipped);
        assert!(stages[0].logs[0].message.contains("evaluated to false"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_true_condition_runs_stage() {
        let (executor, invocations) = recording_executor();
        let mut registry = StageRegistry::new();
        registry.register(StageType::CustomScript, executor);

        let records = vec![
            StageRecord::new("producer", StageType::CustomScript),
            StageRecord::new("consumer", StageType::CustomScript).with_condition("producer"),
        ];
        let state = RunState::new(records, Arc::new(registry), serde_json::Value::Null);

        run(&state).await.unwrap();

        assert_eq!(*invocations.lock(), vec!["producer", "consumer"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_condition_is_fatal() {
        let (executor, calls) = counting_executor();
        let mut registry = StageRegistry::new();
        registry.register(StageType::CustomScript, executor);

        let records = vec![
            StageRecord::new("bad", StageType::CustomScript).with_condition("not a condition !!"),
        ];
        let state = RunState::new(records, Arc::new(registry), serde_json::Value::Null);

        let err = run(&state).await.unwrap_err();
        assert!(err.to_string().contains("invalid condition"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
