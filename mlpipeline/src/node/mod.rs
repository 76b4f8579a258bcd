//! The workflow runtime's node contract.
//!
//! The engine is invoked as one action handler inside the KlikkFlow
//! workflow runtime. The runtime supplies a [`NodeExecutionContext`] and
//! expects a [`NodeActionResult`] back; the handler never surfaces an
//! uncaught error.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Input handed to the node by the workflow runtime.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeExecutionContext {
    /// The node's configured parameters (the pipeline configuration).
    pub parameters: serde_json::Value,
    /// Upstream node outputs, keyed by port name.
    pub input_data: HashMap<String, Vec<serde_json::Value>>,
}

impl NodeExecutionContext {
    /// Creates a context from parameters alone.
    #[must_use]
    pub fn from_parameters(parameters: serde_json::Value) -> Self {
        Self {
            parameters,
            input_data: HashMap::new(),
        }
    }

    /// The first item on the `main` input port, if present.
    #[must_use]
    pub fn main_input(&self) -> Option<&serde_json::Value> {
        self.input_data.get("main").and_then(|items| items.first())
    }
}

/// Execution metadata on a node result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeResultMetadata {
    /// Wall-clock handler duration in milliseconds.
    #[serde(rename = "executionTime")]
    pub execution_time_ms: u64,
}

/// The generic node-result shape the workflow runtime expects.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NodeActionResult {
    /// Whether the handler succeeded.
    pub success: bool,
    /// Output entries; `data[0]` carries this node's ports.
    pub data: Vec<HashMap<String, serde_json::Value>>,
    /// Error message for failed handlers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Execution metadata.
    pub metadata: NodeResultMetadata,
}

impl NodeActionResult {
    /// Creates a success result with one data entry.
    #[must_use]
    pub fn ok(data: HashMap<String, serde_json::Value>, execution_time_ms: u64) -> Self {
        Self {
            success: true,
            data: vec![data],
            error: None,
            metadata: NodeResultMetadata { execution_time_ms },
        }
    }

    /// Creates a failure result, optionally carrying partial output.
    #[must_use]
    pub fn fail(
        error: impl Into<String>,
        data: Option<HashMap<String, serde_json::Value>>,
        execution_time_ms: u64,
    ) -> Self {
        Self {
            success: false,
            data: data.into_iter().collect(),
            error: Some(error.into()),
            metadata: NodeResultMetadata { execution_time_ms },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_main_input() {
        let mut ctx = NodeExecutionContext::from_parameters(json!({}));
        assert!(ctx.main_input().is_none());

        ctx.input_data
            .insert("main".to_string(), vec![json!({"rows": 10})]);
        assert_eq!(ctx.main_input(), Some(&json!({"rows": 10})));
    }

    #[test]
    fn test_result_serializes_execution_time_field() {
        let result = NodeActionResult::ok(HashMap::new(), 42);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["metadata"]["executionTime"], 42);
        assert_eq!(json["success"], true);
    }

    #[test]
    fn test_failure_keeps_partial_data() {
        let mut data = HashMap::new();
        data.insert("main".to_string(), json!({"partial": true}));
        let result = NodeActionResult::fail("boom", Some(data), 7);

        assert!(!result.success);
        assert_eq!(result.data.len(), 1);
        assert_eq!(result.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_context_parses_camel_case() {
        let ctx: NodeExecutionContext = serde_json::from_value(json!({
            "parameters": {"pipelineName": "p"},
            "inputData": {"main": [{"rows": 5}]}
        }))
        .unwrap();
        assert!(ctx.main_input().is_some());
    }
}
