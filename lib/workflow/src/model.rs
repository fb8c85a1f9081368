//! Workflow job and execution record data model.
//!
//! A [`WorkflowJob`] is an ordered list of [`NodeSpec`]s plus a seed
//! [`Context`]. Running it produces one [`NodeResult`] per attempted node and
//! a [`WorkflowResult`] for the whole run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// The key/value data accumulated and merged by nodes during one run.
pub type Context = serde_json::Map<String, JsonValue>;

/// A workflow submitted for execution. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowJob {
    /// Caller-supplied workflow identifier.
    pub workflow_id: String,
    /// Human-readable workflow name.
    pub workflow_name: String,
    /// Nodes in execution order.
    pub nodes: Vec<NodeSpec>,
    /// Seed context.
    #[serde(default)]
    pub input: Context,
}

impl WorkflowJob {
    /// Creates a job with an empty seed context.
    #[must_use]
    pub fn new(
        workflow_id: impl Into<String>,
        workflow_name: impl Into<String>,
        nodes: Vec<NodeSpec>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            workflow_name: workflow_name.into(),
            nodes,
            input: Context::new(),
        }
    }

    /// Sets the seed context.
    #[must_use]
    pub fn with_input(mut self, input: Context) -> Self {
        self.input = input;
        self
    }
}

/// One step of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSpec {
    /// Identifier, unique within the job.
    pub id: String,
    /// Dispatch type.
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Type-specific configuration.
    #[serde(default)]
    pub config: Context,
    /// Carried for forward compatibility; sequencing follows array order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_node_id: Option<String>,
}

impl NodeSpec {
    /// Creates a node with an empty configuration.
    #[must_use]
    pub fn new(id: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id: id.into(),
            node_type,
            config: Context::new(),
            next_node_id: None,
        }
    }

    /// Sets a configuration entry.
    #[must_use]
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }
}

/// The type of a node, which selects its executor branch.
///
/// Unrecognised wire names are preserved in [`NodeType::Other`] so they
/// round-trip and degrade to passthrough at execution time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeType {
    Trigger,
    AiNode,
    Condition,
    Delay,
    Http,
    Email,
    Slack,
    Other(String),
}

impl NodeType {
    /// Returns the wire name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Trigger => "trigger",
            Self::AiNode => "ai-node",
            Self::Condition => "condition",
            Self::Delay => "delay",
            Self::Http => "http",
            Self::Email => "email",
            Self::Slack => "slack",
            Self::Other(name) => name,
        }
    }
}

impl From<String> for NodeType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "trigger" => Self::Trigger,
            "ai-node" => Self::AiNode,
            "condition" => Self::Condition,
            "delay" => Self::Delay,
            "http" => Self::Http,
            "email" => Self::Email,
            "slack" => Self::Slack,
            _ => Self::Other(name),
        }
    }
}

impl From<&str> for NodeType {
    fn from(name: &str) -> Self {
        Self::from(name.to_string())
    }
}

impl From<NodeType> for String {
    fn from(node_type: NodeType) -> Self {
        match node_type {
            NodeType::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Success,
    Failed,
    Skipped,
}

/// Per-node execution record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeResult {
    pub node_id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub status: NodeStatus,
    /// Context as seen by the node, i.e. the merge of every prior node.
    pub input: Context,
    /// Fragment the node produced; empty on failure.
    pub output: Context,
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failed,
}

/// Aggregate record of one run attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowResult {
    pub workflow_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// One entry per attempted node, in execution order.
    pub node_results: Vec<NodeResult>,
    /// Context as of the last attempted node.
    pub final_output: Context,
    /// Identifies the failing node; present iff `status` is failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkflowResult {
    /// Returns true if every node succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

/// Converts a duration to whole milliseconds, saturating.
pub(crate) fn millis(elapsed: std::time::Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn node_type_wire_names() {
        for name in [
            "trigger",
            "ai-node",
            "condition",
            "delay",
            "http",
            "email",
            "slack",
        ] {
            let node_type = NodeType::from(name);
            assert!(!matches!(node_type, NodeType::Other(_)), "{name}");
            assert_eq!(node_type.as_str(), name);
        }
    }

    #[test]
    fn unknown_node_type_is_preserved() {
        let node_type = NodeType::from("unsupported_widget");
        assert_eq!(node_type, NodeType::Other("unsupported_widget".to_string()));
        assert_eq!(String::from(node_type), "unsupported_widget");
    }

    #[test]
    fn deserializes_submitted_job() {
        let job: WorkflowJob = serde_json::from_value(json!({
            "workflowId": "wf-1",
            "workflowName": "Lead scoring",
            "nodes": [
                {"id": "n1", "type": "trigger", "config": {}},
                {"id": "n2", "type": "condition", "config": {"field": "score"}, "nextNodeId": "n3"},
                {"id": "n3", "type": "unsupported_widget"}
            ],
            "input": {"score": 75}
        }))
        .expect("deserialize");

        assert_eq!(job.nodes.len(), 3);
        assert_eq!(job.nodes[0].node_type, NodeType::Trigger);
        assert_eq!(job.nodes[1].next_node_id.as_deref(), Some("n3"));
        assert_eq!(
            job.nodes[2].node_type,
            NodeType::Other("unsupported_widget".to_string())
        );
        assert!(job.nodes[2].config.is_empty());
        assert_eq!(job.input.get("score"), Some(&json!(75)));
    }

    #[test]
    fn node_result_serializes_camel_case() {
        let result = NodeResult {
            node_id: "n1".to_string(),
            node_type: NodeType::AiNode,
            status: NodeStatus::Failed,
            input: Context::new(),
            output: Context::new(),
            execution_time_ms: 3,
            error: Some("boom".to_string()),
        };
        let value = serde_json::to_value(&result).expect("serialize");
        assert_eq!(value["nodeId"], "n1");
        assert_eq!(value["type"], "ai-node");
        assert_eq!(value["status"], "failed");
        assert_eq!(value["executionTimeMs"], 3);
    }

    #[test]
    fn builder_sets_config() {
        let node = NodeSpec::new("d", NodeType::Delay).with_config("delayMs", 5);
        assert_eq!(node.config.get("delayMs"), Some(&json!(5)));
    }
}
