use std::collections::HashMap;

use indexmap::IndexMap;
use indexmap::map::Entry;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

pub const ICON_SIZE: f64 = 32.0;
pub const NODE_HEIGHT: f64 = 32.0;
pub const REDUNDANCY_WIDTH: f64 = 24.0;
pub const GROUP_WIDTH: f64 = 50.0;

const LABEL_CHAR_WIDTH: f64 = 5.0;
const MIN_DISTANCE2: f64 = 40.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Reference to the domain object a node stands for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub key: String,
    pub class: String,
    pub name: String,
    #[serde(default)]
    pub icon: String,
}

/// Open property bag attached to every node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties(IndexMap<String, Value>);

impl Properties {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.0.get(key).cloned().unwrap_or(default)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.shift_remove(key)
    }

    /// Loose truthiness: missing, `null`, `false`, `0` and `""` are all false.
    pub fn flag(&self, key: &str) -> bool {
        match self.0.get(key) {
            None | Some(Value::Null) => false,
            Some(Value::Bool(value)) => *value,
            Some(Value::Number(number)) => number.as_f64().is_some_and(|n| n != 0.0),
            Some(Value::String(text)) => !text.is_empty() && text != "0",
            Some(_) => true,
        }
    }

    pub fn text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(text) => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            Value::Bool(value) => Some(value.to_string()),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupMembers {
    objects: IndexMap<String, ObjectRef>,
}

impl GroupMembers {
    pub fn insert(&mut self, object: ObjectRef) {
        self.objects.insert(object.key.clone(), object);
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn objects(&self) -> impl Iterator<Item = &ObjectRef> {
        self.objects.values()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Plain,
    Redundancy,
    Group(GroupMembers),
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Plain => "plain",
            NodeKind::Redundancy => "redundancy",
            NodeKind::Group(_) => "group",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    id: String,
    pub position: Point,
    kind: NodeKind,
    properties: Properties,
    object: Option<ObjectRef>,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            position: Point::default(),
            kind,
            properties: Properties::default(),
            object: None,
        }
    }

    pub fn plain(id: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Plain)
    }

    pub fn redundancy(id: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Redundancy)
    }

    pub fn group(id: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Group(GroupMembers::default()))
    }

    pub fn with_property(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.properties.set(key, value);
        self
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Point::new(x, y);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn is_group(&self) -> bool {
        matches!(self.kind, NodeKind::Group(_))
    }

    pub fn is_redundancy(&self) -> bool {
        matches!(self.kind, NodeKind::Redundancy)
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut Properties {
        &mut self.properties
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn get_or(&self, key: &str, default: Value) -> Value {
        self.properties.get_or(key, default)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.properties.set(key, value);
    }

    /// Falls back to the node id when no label was set.
    pub fn label(&self) -> String {
        self.properties.text("label").unwrap_or_else(|| self.id.clone())
    }

    pub fn icon_url(&self) -> String {
        self.properties.text("icon_url").unwrap_or_default()
    }

    pub fn class_tag(&self) -> Option<String> {
        self.properties.text("class")
    }

    pub fn is_reached(&self) -> bool {
        self.properties.flag("is_reached")
    }

    pub fn is_source(&self) -> bool {
        self.properties.flag("source")
    }

    pub fn is_sink(&self) -> bool {
        self.properties.flag("sink")
    }

    /// Aggregate weight, 1 unless the node stands for several objects.
    pub fn count(&self) -> u64 {
        self.properties
            .get("count")
            .and_then(|value| match value {
                Value::Number(number) => number.as_u64(),
                Value::String(text) => text.parse().ok(),
                _ => None,
            })
            .unwrap_or(1)
    }

    pub fn object(&self) -> Option<&ObjectRef> {
        self.object.as_ref()
    }

    pub fn set_object(&mut self, object: ObjectRef) {
        self.object = Some(object);
    }

    pub fn members(&self) -> Option<&GroupMembers> {
        match &self.kind {
            NodeKind::Group(members) => Some(members),
            _ => None,
        }
    }

    /// Attaches a domain object to a group node. Returns false for other shapes.
    pub fn add_object(&mut self, object: ObjectRef) -> bool {
        match &mut self.kind {
            NodeKind::Group(members) => {
                members.insert(object);
                true
            }
            _ => false,
        }
    }

    pub fn width(&self) -> f64 {
        match self.kind {
            // approximation of the label's bounding box
            NodeKind::Plain => {
                let label_len = self.properties.text("label").map_or(0, |l| l.len());
                ICON_SIZE.max(LABEL_CHAR_WIDTH * label_len as f64)
            }
            NodeKind::Redundancy => REDUNDANCY_WIDTH,
            NodeKind::Group(_) => GROUP_WIDTH,
        }
    }

    pub fn height(&self) -> f64 {
        NODE_HEIGHT
    }

    pub fn distance2(&self, other: &Node) -> f64 {
        let dx = self.position.x - other.position.x;
        let dy = self.position.y - other.position.y;
        let d2 = dx * dx + dy * dy - self.height() * self.height();
        d2.max(MIN_DISTANCE2)
    }

    pub fn distance(&self, other: &Node) -> f64 {
        self.distance2(other).sqrt()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    id: String,
    source: String,
    sink: String,
}

impl Edge {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn sink(&self) -> &str {
        &self.sink
    }

    pub fn is_self_loop(&self) -> bool {
        self.source == self.sink
    }
}

/// Directed graph of displayable nodes. Iteration follows insertion order.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: IndexMap<String, Node>,
    edges: IndexMap<String, Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: Node) -> Result<()> {
        match self.nodes.entry(node.id.clone()) {
            Entry::Occupied(_) => Err(Error::DuplicateNode { id: node.id }),
            Entry::Vacant(entry) => {
                entry.insert(node);
                Ok(())
            }
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Removes a node together with every edge touching it.
    pub fn remove_node(&mut self, id: &str) -> Option<Node> {
        let node = self.nodes.shift_remove(id)?;
        self.edges
            .retain(|_, edge| edge.source != id && edge.sink != id);
        Some(node)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.get(id)
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn add_edge(
        &mut self,
        id: impl Into<String>,
        source: impl Into<String>,
        sink: impl Into<String>,
    ) -> Result<()> {
        let id = id.into();
        if self.edges.contains_key(&id) {
            return Err(Error::DuplicateEdge { id });
        }
        self.insert_edge(id, source.into(), sink.into())
    }

    /// Like [`Graph::add_edge`], but an already used edge id is reported as
    /// `Ok(false)` instead of an error.
    pub fn add_edge_if_absent(
        &mut self,
        id: impl Into<String>,
        source: impl Into<String>,
        sink: impl Into<String>,
    ) -> Result<bool> {
        let id = id.into();
        if self.edges.contains_key(&id) {
            return Ok(false);
        }
        self.insert_edge(id, source.into(), sink.into())?;
        Ok(true)
    }

    fn insert_edge(&mut self, id: String, source: String, sink: String) -> Result<()> {
        for endpoint in [&source, &sink] {
            if !self.nodes.contains_key(endpoint.as_str()) {
                return Err(Error::DanglingEndpoint {
                    edge_id: id,
                    node_id: endpoint.clone(),
                });
            }
        }
        self.edges.insert(id.clone(), Edge { id, source, sink });
        Ok(())
    }

    pub fn remove_edge(&mut self, id: &str) -> Option<Edge> {
        self.edges.shift_remove(id)
    }

    pub fn outgoing_edges(&self, id: &str) -> Vec<Edge> {
        self.edges
            .values()
            .filter(|edge| edge.source == id)
            .cloned()
            .collect()
    }

    pub fn incoming_edges(&self, id: &str) -> Vec<Edge> {
        self.edges
            .values()
            .filter(|edge| edge.sink == id)
            .cloned()
            .collect()
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        for node in self.nodes.values_mut() {
            node.position.x += dx;
            node.position.y += dy;
        }
    }

    /// Applies externally known positions. Unknown ids are ignored; returns how
    /// many nodes were moved.
    pub fn update_positions(&mut self, positions: &HashMap<String, Point>) -> usize {
        let mut moved = 0;
        for (id, point) in positions {
            if let Some(node) = self.nodes.get_mut(id) {
                node.position = *point;
                moved += 1;
            }
        }
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn two_nodes() -> Graph {
        let mut graph = Graph::new();
        graph.add_node(Node::plain("a")).unwrap();
        graph.add_node(Node::plain("b")).unwrap();
        graph
    }

    #[test]
    fn duplicate_edge_id_is_rejected() {
        let mut graph = two_nodes();
        graph.add_edge("e1", "a", "b").unwrap();
        let err = graph.add_edge("e1", "b", "a").unwrap_err();
        assert!(matches!(err, Error::DuplicateEdge { ref id } if id == "e1"));
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn dangling_endpoint_is_rejected() {
        let mut graph = two_nodes();
        let err = graph.add_edge("e1", "a", "missing").unwrap_err();
        assert!(
            matches!(err, Error::DanglingEndpoint { ref node_id, .. } if node_id == "missing")
        );
        assert_eq!(graph.edge_count(), 0);
    }

    #[test]
    fn add_edge_if_absent_reports_duplicates() {
        let mut graph = two_nodes();
        assert!(graph.add_edge_if_absent("e1", "a", "b").unwrap());
        assert!(!graph.add_edge_if_absent("e1", "a", "b").unwrap());
        assert!(graph.add_edge_if_absent("e2", "a", "zzz").is_err());
    }

    #[test]
    fn duplicate_node_is_rejected() {
        let mut graph = two_nodes();
        assert!(matches!(
            graph.add_node(Node::plain("a")),
            Err(Error::DuplicateNode { .. })
        ));
    }

    #[test]
    fn removing_a_node_drops_incident_edges() {
        let mut graph = two_nodes();
        graph.add_node(Node::plain("c")).unwrap();
        graph.add_edge("ab", "a", "b").unwrap();
        graph.add_edge("bc", "b", "c").unwrap();
        graph.add_edge("ac", "a", "c").unwrap();

        graph.remove_node("b").unwrap();

        let remaining: Vec<&str> = graph.edges().map(Edge::id).collect();
        assert_eq!(remaining, vec!["ac"]);
        assert!(graph.incoming_edges("c").iter().all(|e| e.source() == "a"));
    }

    #[test]
    fn property_bag_defaults() {
        let node = Node::plain("n").with_property("count", 7);
        assert_eq!(node.get_or("missing", json!("fallback")), json!("fallback"));
        assert_eq!(node.count(), 7);
        assert_eq!(Node::plain("m").count(), 1);
        assert_eq!(node.label(), "n");
        assert!(!node.is_reached());
    }

    #[test]
    fn redundancy_label_may_be_numeric() {
        let node = Node::redundancy("r").with_property("label", 2);
        assert_eq!(node.label(), "2");
    }

    #[test]
    fn widths_depend_on_shape() {
        let short = Node::plain("a").with_property("label", "ab");
        let long = Node::plain("b").with_property("label", "a rather long label");
        assert_eq!(short.width(), 32.0);
        assert_eq!(long.width(), 5.0 * 19.0);
        assert_eq!(Node::redundancy("r").width(), 24.0);
        assert_eq!(Node::group("g").width(), 50.0);
        assert_eq!(Node::group("g").height(), 32.0);
    }

    #[test]
    fn distance_is_floored() {
        let a = Node::plain("a").at(0.0, 0.0);
        let b = Node::plain("b").at(1.0, 1.0);
        assert_eq!(a.distance2(&b), 40.0);

        let far = Node::plain("c").at(100.0, 0.0);
        assert_eq!(a.distance2(&far), 100.0 * 100.0 - 32.0 * 32.0);
        assert!((a.distance(&far) - (10000.0_f64 - 1024.0).sqrt()).abs() < 1e-9);
    }

    #[test]
    fn only_groups_accept_objects() {
        let object = ObjectRef {
            key: "1".into(),
            class: "Server".into(),
            name: "srv".into(),
            icon: String::new(),
        };
        let mut plain = Node::plain("p");
        let mut group = Node::group("g");
        assert!(!plain.add_object(object.clone()));
        assert!(group.add_object(object));
        assert_eq!(group.members().map(GroupMembers::len), Some(1));
    }

    #[test]
    fn update_positions_ignores_unknown_ids() {
        let mut graph = two_nodes();
        let positions = HashMap::from([
            ("a".to_string(), Point::new(3.0, 4.0)),
            ("nope".to_string(), Point::new(1.0, 1.0)),
        ]);
        assert_eq!(graph.update_positions(&positions), 1);
        assert_eq!(graph.node("a").unwrap().position, Point::new(3.0, 4.0));
    }
}
