//! Node and edge records consumed by the interactive graph widget.

use serde::Serialize;

use crate::error::Result;
use crate::graph::{Graph, ICON_SIZE, Node, NodeKind, ObjectRef};

const OPAQUE: f64 = 1.0;
const FADED: f64 = 0.4;
const FADED_DISC: f64 = 0.2;
const FADED_EDGE: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Opacity {
    pub opacity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscAttr {
    #[serde(rename = "stroke-width")]
    pub stroke_width: u32,
    pub stroke: String,
    pub fill: String,
    pub opacity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextAttr {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fill: Option<String>,
    pub opacity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IconNode {
    pub id: String,
    pub label: String,
    pub icon_url: String,
    pub width: f64,
    pub x: f64,
    pub y: f64,
    pub source: bool,
    pub sink: bool,
    pub obj_class: Option<String>,
    pub obj_key: Option<String>,
    pub icon_attr: Opacity,
    pub text_attr: TextAttr,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscNode {
    pub id: String,
    pub label: String,
    pub icon_url: String,
    pub width: f64,
    pub x: f64,
    pub y: f64,
    pub source: bool,
    pub disc_attr: DiscAttr,
    pub text_attr: TextAttr,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupNodeView {
    pub id: String,
    pub label: String,
    pub icon_url: String,
    pub width: f64,
    pub x: f64,
    pub y: f64,
    pub source: bool,
    pub group_index: usize,
    pub icon_attr: Opacity,
    pub disc_attr: DiscAttr,
    pub text_attr: TextAttr,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "shape")]
pub enum NodeView {
    #[serde(rename = "icon")]
    Icon(IconNode),
    #[serde(rename = "disc")]
    Disc(DiscNode),
    #[serde(rename = "group")]
    Group(GroupNodeView),
}

impl NodeView {
    pub fn id(&self) -> &str {
        match self {
            NodeView::Icon(node) => &node.id,
            NodeView::Disc(node) => &node.id,
            NodeView::Group(node) => &node.id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeAttr {
    pub opacity: f64,
    pub stroke: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeView {
    pub id: String,
    pub source_node_id: String,
    pub sink_node_id: String,
    pub attr: EdgeAttr,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct InteractiveDiagram {
    pub nodes: Vec<NodeView>,
    pub edges: Vec<EdgeView>,
    /// Objects behind each group node, indexed by `group_index`.
    #[serde(skip)]
    pub groups: Vec<Vec<ObjectRef>>,
}

impl InteractiveDiagram {
    pub fn from_graph(graph: &Graph) -> Self {
        let mut diagram = InteractiveDiagram::default();

        for node in graph.nodes() {
            let view = match node.kind() {
                NodeKind::Plain => NodeView::Icon(icon_view(node)),
                NodeKind::Redundancy => NodeView::Disc(disc_view(node)),
                NodeKind::Group(members) => {
                    let group_index = diagram.groups.len();
                    diagram.groups.push(members.objects().cloned().collect());
                    NodeView::Group(group_view(node, group_index))
                }
            };
            diagram.nodes.push(view);
        }

        for edge in graph.edges() {
            let reached = [edge.source(), edge.sink()]
                .iter()
                .all(|id| graph.node(id).is_some_and(Node::is_reached));
            diagram.edges.push(EdgeView {
                id: edge.id().to_string(),
                source_node_id: edge.source().to_string(),
                sink_node_id: edge.sink().to_string(),
                attr: EdgeAttr {
                    opacity: if reached { OPAQUE } else { FADED_EDGE },
                    stroke: "#000".to_string(),
                },
            });
        }

        diagram
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn faded(reached: bool, faded: f64) -> f64 {
    if reached { OPAQUE } else { faded }
}

fn icon_view(node: &Node) -> IconNode {
    let opacity = faded(node.is_reached(), FADED);
    IconNode {
        id: node.id().to_string(),
        label: node.label(),
        icon_url: node.icon_url(),
        width: ICON_SIZE,
        x: node.position.x,
        y: node.position.y,
        source: node.is_source(),
        sink: node.is_sink(),
        obj_class: node.object().map(|object| object.class.clone()),
        obj_key: node.object().map(|object| object.key.clone()),
        icon_attr: Opacity { opacity },
        text_attr: TextAttr {
            fill: None,
            opacity,
        },
    }
}

fn disc_view(node: &Node) -> DiscNode {
    let reached = node.is_reached();
    DiscNode {
        id: node.id().to_string(),
        label: node.label(),
        icon_url: node.icon_url(),
        width: node.width(),
        x: node.position.x,
        y: node.position.y,
        source: node.is_source(),
        disc_attr: DiscAttr {
            stroke_width: 3,
            stroke: "#000".to_string(),
            fill: "#c33".to_string(),
            opacity: faded(reached, FADED_DISC),
        },
        text_attr: TextAttr {
            fill: Some("#fff".to_string()),
            opacity: faded(reached, FADED),
        },
    }
}

fn group_view(node: &Node, group_index: usize) -> GroupNodeView {
    let reached = node.is_reached();
    GroupNodeView {
        id: node.id().to_string(),
        label: node.label(),
        icon_url: node.icon_url(),
        width: node.width(),
        x: node.position.x,
        y: node.position.y,
        source: node.is_source(),
        group_index,
        icon_attr: Opacity {
            opacity: faded(reached, FADED),
        },
        disc_attr: DiscAttr {
            stroke_width: 3,
            stroke: "#000".to_string(),
            fill: "#fff".to_string(),
            opacity: faded(reached, FADED_DISC),
        },
        text_attr: TextAttr {
            fill: Some("#000".to_string()),
            opacity: faded(reached, FADED),
        },
    }
}
