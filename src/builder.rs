use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::graph::{Graph, Node, ObjectRef};

/// Relation graph as produced by the upstream impact analysis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelationGraph {
    #[serde(default)]
    pub nodes: Vec<RelationNode>,
    #[serde(default)]
    pub edges: Vec<RelationEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelationNode {
    Object {
        id: String,
        #[serde(default)]
        source: bool,
        #[serde(default)]
        sink: bool,
        #[serde(default)]
        reached: bool,
        #[serde(default)]
        developped: bool,
        object: ObjectRef,
    },
    Redundancy {
        id: String,
        min_up: u64,
    },
}

impl RelationNode {
    pub fn id(&self) -> &str {
        match self {
            RelationNode::Object { id, .. } | RelationNode::Redundancy { id, .. } => id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationEdge {
    pub id: String,
    pub source_id: String,
    pub sink_id: String,
}

impl RelationEdge {
    pub fn new(
        id: impl Into<String>,
        source_id: impl Into<String>,
        sink_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            sink_id: sink_id.into(),
        }
    }
}

/// Converts a relation graph into a displayable [`Graph`].
///
/// When `direction_down` is false the graph is an upstream (dependency) view
/// and every object node counts as reached.
pub fn build_graph(relation: &RelationGraph, direction_down: bool) -> Result<Graph> {
    let mut graph = Graph::new();

    for relation_node in &relation.nodes {
        let node = match relation_node {
            RelationNode::Object {
                id,
                source,
                sink,
                reached,
                developped,
                object,
            } => {
                let mut node = Node::plain(id.as_str());
                if *source {
                    node.set("source", true);
                }
                if *sink {
                    node.set("sink", true);
                }
                node.set("class", object.class.as_str());
                node.set("icon_url", object.icon.as_str());
                node.set("label", object.name.as_str());
                node.set("is_reached", if direction_down { *reached } else { true });
                node.set("developped", *developped);
                node.set_object(object.clone());
                node
            }
            RelationNode::Redundancy { id, min_up } => Node::redundancy(id.as_str())
                .with_property("label", *min_up)
                .with_property("is_reached", true),
        };
        graph.add_node(node)?;
    }

    for edge in &relation.edges {
        for endpoint in [&edge.source_id, &edge.sink_id] {
            if !graph.contains_node(endpoint) {
                return Err(Error::DanglingEndpoint {
                    edge_id: edge.id.clone(),
                    node_id: endpoint.clone(),
                });
            }
        }
        graph.add_edge(edge.id.as_str(), edge.source_id.as_str(), edge.sink_id.as_str())?;
    }

    debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "built graph from relation graph"
    );
    Ok(graph)
}

/// Removes self-referring edges and keeps only the first edge between any
/// ordered pair of nodes. Returns the number of removed edges.
pub fn dedup_edges(graph: &mut Graph) -> usize {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut doomed = Vec::new();

    for edge in graph.edges() {
        if edge.is_self_loop() {
            doomed.push(edge.id().to_string());
            continue;
        }
        let key = (edge.source().to_string(), edge.sink().to_string());
        if !seen.insert(key) {
            doomed.push(edge.id().to_string());
        }
    }

    for id in &doomed {
        graph.remove_edge(id);
    }

    if !doomed.is_empty() {
        debug!(removed = doomed.len(), "removed duplicate and self-referring edges");
    }
    doomed.len()
}
