//! Wave compilation for workflow graphs.
//!
//! Uses `petgraph` to model node dependencies as a directed graph and peels
//! it layer by layer: every node whose predecessors have all been emitted
//! joins the next wave. Nodes in one wave have no dependencies on each other
//! and can run concurrently.
//!
//! Cycles never stall compilation. When no node is free but some remain, all
//! remaining nodes are emitted together as a final fallback wave, with no
//! ordering among them. Every node lands in exactly one wave.

use std::collections::{HashMap, HashSet};

use cronflow_types::workflow::{WorkflowGraph, WorkflowNode};
use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

// ---------------------------------------------------------------------------
// Graph construction
// ---------------------------------------------------------------------------

/// Dependency graph over a workflow's nodes. Node weights index into
/// `WorkflowGraph::nodes`.
struct DependencyGraph {
    graph: DiGraph<usize, ()>,
    dangling: Vec<(String, String)>,
}

impl DependencyGraph {
    fn build(workflow: &WorkflowGraph) -> Self {
        let mut graph = DiGraph::<usize, ()>::with_capacity(
            workflow.nodes.len(),
            workflow.edges.len(),
        );
        let mut id_to_idx: HashMap<&str, NodeIndex> = HashMap::new();
        for (i, node) in workflow.nodes.iter().enumerate() {
            let idx = graph.add_node(i);
            id_to_idx.insert(node.id.as_str(), idx);
        }

        let mut dangling = Vec::new();
        for edge in &workflow.edges {
            match (
                id_to_idx.get(edge.source.as_str()),
                id_to_idx.get(edge.target.as_str()),
            ) {
                (Some(&from), Some(&to)) => {
                    graph.add_edge(from, to, ());
                }
                _ => dangling.push((edge.source.clone(), edge.target.clone())),
            }
        }

        Self { graph, dangling }
    }
}

// ---------------------------------------------------------------------------
// Wave computation
// ---------------------------------------------------------------------------

/// Group a workflow's nodes into waves in execution order.
///
/// 1. Count incoming edges per node.
/// 2. Emit every unprocessed node with zero remaining in-degree as a wave.
/// 3. Decrement the in-degree of each emitted node's successors and repeat.
/// 4. If nothing is free but nodes remain (a cycle), emit all of them as one
///    last wave.
///
/// Edges naming unknown node ids are ignored. Within a wave, nodes keep their
/// declaration order. An empty graph yields no waves.
pub fn compile_waves(workflow: &WorkflowGraph) -> Vec<Vec<&WorkflowNode>> {
    if workflow.nodes.is_empty() {
        return vec![];
    }

    let DependencyGraph { graph, dangling } = DependencyGraph::build(workflow);
    for (source, target) in &dangling {
        tracing::warn!(source, target, "ignoring edge that references an unknown node");
    }

    let mut in_degree: Vec<usize> = graph
        .node_indices()
        .map(|idx| graph.neighbors_directed(idx, Direction::Incoming).count())
        .collect();
    let mut processed = vec![false; graph.node_count()];
    let mut remaining = graph.node_count();
    let mut waves: Vec<Vec<&WorkflowNode>> = Vec::new();

    while remaining > 0 {
        let mut wave: Vec<NodeIndex> = graph
            .node_indices()
            .filter(|idx| !processed[idx.index()] && in_degree[idx.index()] == 0)
            .collect();

        if wave.is_empty() {
            wave = graph
                .node_indices()
                .filter(|idx| !processed[idx.index()])
                .collect();
            tracing::warn!(
                nodes = wave.len(),
                "cycle detected; running remaining nodes as one unordered wave"
            );
        }

        for &idx in &wave {
            processed[idx.index()] = true;
            remaining -= 1;
        }
        for &idx in &wave {
            for succ in graph.neighbors_directed(idx, Direction::Outgoing) {
                in_degree[succ.index()] = in_degree[succ.index()].saturating_sub(1);
            }
        }

        waves.push(wave.into_iter().map(|idx| &workflow.nodes[graph[idx]]).collect());
    }

    waves
}

// ---------------------------------------------------------------------------
// Graph inspection (authoring-time warnings, never enforced at run time)
// ---------------------------------------------------------------------------

/// A structural problem worth surfacing to whoever edits a graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphIssue {
    /// Two or more nodes share this id.
    DuplicateNodeId(String),
    /// An edge references a node id that does not exist.
    DanglingEdge { source: String, target: String },
    /// The graph has a cycle through this node; it will run in a fallback wave.
    Cycle(String),
}

impl std::fmt::Display for GraphIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GraphIssue::DuplicateNodeId(id) => write!(f, "duplicate node id '{id}'"),
            GraphIssue::DanglingEdge { source, target } => {
                write!(f, "edge '{source}' -> '{target}' references an unknown node")
            }
            GraphIssue::Cycle(id) => write!(
                f,
                "cycle involving node '{id}'; its nodes will run together without ordering"
            ),
        }
    }
}

/// List structural issues in `workflow`. An empty list means the graph is a
/// well-formed DAG.
pub fn inspect_graph(workflow: &WorkflowGraph) -> Vec<GraphIssue> {
    let mut issues = Vec::new();

    let mut seen = HashSet::new();
    for node in &workflow.nodes {
        if !seen.insert(node.id.as_str()) {
            issues.push(GraphIssue::DuplicateNodeId(node.id.clone()));
        }
    }

    let DependencyGraph { graph, dangling } = DependencyGraph::build(workflow);
    issues.extend(
        dangling
            .into_iter()
            .map(|(source, target)| GraphIssue::DanglingEdge { source, target }),
    );

    if let Err(cycle) = toposort(&graph, None) {
        let node = &workflow.nodes[graph[cycle.node_id()]];
        issues.push(GraphIssue::Cycle(node.id.clone()));
    }

    issues
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
