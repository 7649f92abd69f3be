//! Workflow graph types for cronflow.
//!
//! A `WorkflowGraph` is the DAG a cron job executes: nodes carry a typed
//! payload per node kind, edges express "target depends on source". The
//! `position` field is canvas metadata for graph editors and is never read by
//! the engine.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// A directed graph of work nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowGraph {
    #[serde(default)]
    pub nodes: Vec<WorkflowNode>,
    #[serde(default)]
    pub edges: Vec<WorkflowEdge>,
}

impl WorkflowGraph {
    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// An edge `source -> target`: `target` starts only after `source` finished.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowEdge {
    /// Optional editor-assigned edge id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub source: String,
    pub target: String,
}

impl WorkflowEdge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: None,
            source: source.into(),
            target: target.into(),
        }
    }
}

/// Canvas position coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NodePosition {
    pub x: f64,
    pub y: f64,
}

// ---------------------------------------------------------------------------
// Nodes
// ---------------------------------------------------------------------------

/// A single unit of work in a workflow graph.
///
/// Serialized as `{ "id", "type", "position", "data" }` where `data` is the
/// payload matching `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawWorkflowNode", into = "RawWorkflowNode")]
pub struct WorkflowNode {
    /// Node id, unique within its graph.
    pub id: String,
    /// Canvas position (ignored by the engine).
    pub position: NodePosition,
    /// Kind-specific payload.
    pub kind: NodeKind,
}

impl WorkflowNode {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            position: NodePosition::default(),
            kind,
        }
    }

    /// The wire name of this node's type.
    pub fn type_name(&self) -> &str {
        self.kind.type_name()
    }
}

/// The payload of a workflow node, keyed by node type.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Start a long-running headless agent session.
    HeadlessAgent(HeadlessAgentNode),
    /// Start an iterative loop that runs until a completion phrase appears.
    RalphLoop(RalphLoopNode),
    /// Run a shell command.
    ShellCommand(ShellCommandNode),
    /// A node whose `type` this engine does not recognize. Kept verbatim so
    /// the job round-trips and the executor can fail the node explicitly.
    Unknown {
        node_type: String,
        data: serde_json::Value,
    },
}

pub const HEADLESS_AGENT: &str = "headless-agent";
pub const RALPH_LOOP: &str = "ralph-loop";
pub const SHELL_COMMAND: &str = "shell-command";

impl NodeKind {
    pub fn type_name(&self) -> &str {
        match self {
            NodeKind::HeadlessAgent(_) => HEADLESS_AGENT,
            NodeKind::RalphLoop(_) => RALPH_LOOP,
            NodeKind::ShellCommand(_) => SHELL_COMMAND,
            NodeKind::Unknown { node_type, .. } => node_type,
        }
    }
}

/// Payload for `headless-agent` nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeadlessAgentNode {
    /// The agent definition this session is started from.
    #[serde(default)]
    pub reference_agent_id: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Payload for `ralph-loop` nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RalphLoopNode {
    #[serde(default)]
    pub prompt: String,
    /// Phrase whose appearance in the agent's output ends the loop.
    #[serde(default)]
    pub completion_phrase: String,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_agent_id: Option<String>,
}

fn default_max_iterations() -> u32 {
    10
}

impl Default for RalphLoopNode {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            completion_phrase: String::new(),
            max_iterations: default_max_iterations(),
            model: None,
            reference_agent_id: None,
        }
    }
}

/// Payload for `shell-command` nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellCommandNode {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    /// Timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

// ---------------------------------------------------------------------------
// Wire representation
// ---------------------------------------------------------------------------

/// On-disk shape of a node: a string `type` discriminant beside an untyped
/// `data` object.
#[derive(Serialize, Deserialize)]
struct RawWorkflowNode {
    id: String,
    #[serde(rename = "type")]
    node_type: String,
    #[serde(default)]
    position: NodePosition,
    #[serde(default)]
    data: serde_json::Value,
}

impl TryFrom<RawWorkflowNode> for WorkflowNode {
    type Error = String;

    fn try_from(raw: RawWorkflowNode) -> Result<Self, Self::Error> {
        fn payload<T: serde::de::DeserializeOwned>(
            id: &str,
            data: serde_json::Value,
        ) -> Result<T, String> {
            // A missing payload reads the same as an empty one.
            let data = if data.is_null() {
                serde_json::Value::Object(Default::default())
            } else {
                data
            };
            serde_json::from_value(data).map_err(|e| format!("node '{id}': invalid data: {e}"))
        }

        let kind = match raw.node_type.as_str() {
            HEADLESS_AGENT => NodeKind::HeadlessAgent(payload(&raw.id, raw.data)?),
            RALPH_LOOP => NodeKind::RalphLoop(payload(&raw.id, raw.data)?),
            SHELL_COMMAND => NodeKind::ShellCommand(payload(&raw.id, raw.data)?),
            _ => NodeKind::Unknown {
                node_type: raw.node_type,
                data: raw.data,
            },
        };

        Ok(WorkflowNode {
            id: raw.id,
            position: raw.position,
            kind,
        })
    }
}

impl From<WorkflowNode> for RawWorkflowNode {
    fn from(node: WorkflowNode) -> Self {
        let (node_type, data) = match node.kind {
            NodeKind::HeadlessAgent(d) => (HEADLESS_AGENT.to_string(), to_value(&d)),
            NodeKind::RalphLoop(d) => (RALPH_LOOP.to_string(), to_value(&d)),
            NodeKind::ShellCommand(d) => (SHELL_COMMAND.to_string(), to_value(&d)),
            NodeKind::Unknown { node_type, data } => (node_type, data),
        };
        RawWorkflowNode {
            id: node.id,
            node_type,
            position: node.position,
            data,
        }
    }
}

fn to_value<T: Serialize>(payload: &T) -> serde_json::Value {
    // Plain structs of strings and integers always serialize.
    serde_json::to_value(payload).unwrap_or(serde_json::Value::Null)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_editor_graph() {
        let raw = json!({
            "nodes": [
                {
                    "id": "research",
                    "type": "headless-agent",
                    "position": { "x": 10.0, "y": 20.0 },
                    "data": {
                        "referenceAgentId": "agent-1",
                        "prompt": "Summarize the inbox",
                        "model": "opus"
                    }
                },
                {
                    "id": "polish",
                    "type": "ralph-loop",
                    "position": { "x": 10.0, "y": 120.0 },
                    "data": {
                        "prompt": "Fix the failing tests",
                        "completionPhrase": "ALL GREEN",
                        "maxIterations": 4
                    }
                },
                {
                    "id": "publish",
                    "type": "shell-command",
                    "position": { "x": 10.0, "y": 220.0 },
                    "data": { "command": "make publish", "workingDirectory": "/srv", "timeout": 30 }
                }
            ],
            "edges": [
                { "id": "e1", "source": "research", "target": "polish" },
                { "source": "polish", "target": "publish" }
            ]
        });

        let graph: WorkflowGraph = serde_json::from_value(raw).unwrap();
        assert_eq!(graph.nodes.len(), 3);
        assert_eq!(graph.edges.len(), 2);
        assert_eq!(graph.edges[0].id.as_deref(), Some("e1"));

        match &graph.nodes[0].kind {
            NodeKind::HeadlessAgent(a) => {
                assert_eq!(a.reference_agent_id, "agent-1");
                assert_eq!(a.model.as_deref(), Some("opus"));
            }
            other => panic!("expected headless agent, got {other:?}"),
        }
        match &graph.nodes[1].kind {
            NodeKind::RalphLoop(l) => {
                assert_eq!(l.completion_phrase, "ALL GREEN");
                assert_eq!(l.max_iterations, 4);
            }
            other => panic!("expected ralph loop, got {other:?}"),
        }
        match &graph.nodes[2].kind {
            NodeKind::ShellCommand(s) => {
                assert_eq!(s.command, "make publish");
                assert_eq!(s.working_directory.as_deref(), Some("/srv"));
                assert_eq!(s.timeout, Some(30));
            }
            other => panic!("expected shell command, got {other:?}"),
        }
        assert_eq!(graph.nodes[2].position.y, 220.0);
    }

    #[test]
    fn test_unknown_node_type_is_preserved() {
        let raw = json!({
            "id": "mystery",
            "type": "webhook-call",
            "data": { "url": "https://example.com" }
        });
        let node: WorkflowNode = serde_json::from_value(raw).unwrap();
        assert_eq!(node.type_name(), "webhook-call");

        let back = serde_json::to_value(&node).unwrap();
        assert_eq!(back["type"], "webhook-call");
        assert_eq!(back["data"]["url"], "https://example.com");
    }

    #[test]
    fn test_missing_data_uses_defaults() {
        let raw = json!({ "id": "loop", "type": "ralph-loop" });
        let node: WorkflowNode = serde_json::from_value(raw).unwrap();
        match node.kind {
            NodeKind::RalphLoop(l) => assert_eq!(l.max_iterations, 10),
            other => panic!("expected ralph loop, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_known_payload_is_rejected() {
        let raw = json!({ "id": "sh", "type": "shell-command", "data": { "timeout": 5 } });
        let err = serde_json::from_value::<WorkflowNode>(raw).unwrap_err();
        assert!(err.to_string().contains("node 'sh'"), "got: {err}");
    }

    #[test]
    fn test_serialized_shape_uses_type_and_data() {
        let node = WorkflowNode::new(
            "build",
            NodeKind::ShellCommand(ShellCommandNode {
                command: "cargo build".to_string(),
                working_directory: None,
                timeout: Some(60),
            }),
        );
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value["type"], "shell-command");
        assert_eq!(value["data"]["command"], "cargo build");
        assert_eq!(value["data"]["timeout"], 60);
        assert!(value["data"].get("workingDirectory").is_none());
    }
}
