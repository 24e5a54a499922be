//! Collapsing of large fan-outs of similar nodes into group nodes.
//!
//! Starting from every source node, the outgoing neighbours of a node are
//! bucketed by `(class, reached)`. Buckets holding at least `threshold` nodes
//! are replaced by a single group node, and the walk continues downstream from
//! the group. Redundancy nodes can optionally collapse their unreached
//! predecessors the same way (the upstream variant).

use std::collections::HashSet;

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::error::Result;
use crate::graph::{Graph, Node, ObjectRef};

pub const DEFAULT_THRESHOLD: usize = 20;

const REACHED: &str = "reached";
const NOT_REACHED: &str = "not_reached";

#[derive(Debug, Default)]
struct Bucket {
    members: IndexSet<String>,
    count: u64,
    icon_url: Option<String>,
}

impl Bucket {
    fn add(&mut self, node: &Node) {
        if self.icon_url.is_none() {
            self.icon_url = Some(node.icon_url());
        }
        if self.members.insert(node.id().to_string()) {
            self.count += node.count();
        }
    }

    fn len(&self) -> usize {
        self.members.len()
    }

    /// Drops members another group absorbed since the bucket was filled.
    fn retain_present(&mut self, graph: &Graph) {
        self.members.retain(|id| graph.contains_node(id));
        self.count = self
            .members
            .iter()
            .filter_map(|id| graph.node(id))
            .map(Node::count)
            .sum();
    }
}

#[derive(Debug)]
struct ClassBuckets {
    icon_url: String,
    reached: Bucket,
    not_reached: Bucket,
}

impl ClassBuckets {
    fn new(icon_url: String) -> Self {
        Self {
            icon_url,
            reached: Bucket::default(),
            not_reached: Bucket::default(),
        }
    }
}

#[derive(Debug)]
pub struct GroupingEngine {
    threshold: usize,
    upstream: bool,
    visited: HashSet<String>,
    groups_created: usize,
}

impl GroupingEngine {
    pub fn new(threshold: usize) -> Self {
        Self {
            threshold: threshold.max(1),
            upstream: false,
            visited: HashSet::new(),
            groups_created: 0,
        }
    }

    /// Also collapse unreached predecessors of redundancy nodes.
    pub fn with_upstream(mut self, upstream: bool) -> Self {
        self.upstream = upstream;
        self
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    pub fn groups_created(&self) -> usize {
        self.groups_created
    }

    pub fn is_visited(&self, id: &str) -> bool {
        self.visited.contains(id)
    }

    /// Runs the grouping pass from every node flagged as `source`.
    pub fn group_from_sources(&mut self, graph: &mut Graph) -> Result<usize> {
        let before = self.groups_created;
        for id in graph.node_ids() {
            let is_source = graph.node(&id).is_some_and(Node::is_source);
            if is_source {
                self.group_similar_neighbours(graph, &id)?;
            }
        }
        Ok(self.groups_created - before)
    }

    pub fn group_similar_neighbours(&mut self, graph: &mut Graph, node_id: &str) -> Result<()> {
        if !graph.contains_node(node_id) || !self.visited.insert(node_id.to_string()) {
            return Ok(());
        }

        self.group_downstream(graph, node_id)?;

        if self.upstream && graph.node(node_id).is_some_and(Node::is_redundancy) {
            self.group_upstream(graph, node_id)?;
        }
        Ok(())
    }

    fn group_downstream(&mut self, graph: &mut Graph, node_id: &str) -> Result<()> {
        let mut classes: IndexMap<String, ClassBuckets> = IndexMap::new();

        for edge in graph.outgoing_edges(node_id) {
            let Some(sink) = graph.node(edge.sink()) else {
                continue;
            };
            match sink.class_tag() {
                Some(class) => {
                    let buckets = classes
                        .entry(class)
                        .or_insert_with(|| ClassBuckets::new(sink.icon_url()));
                    if sink.is_reached() {
                        buckets.reached.add(sink);
                    } else {
                        buckets.not_reached.add(sink);
                    }
                }
                None => self.group_similar_neighbours(graph, edge.sink())?,
            }
        }

        for (class, buckets) in classes {
            let ClassBuckets {
                icon_url,
                reached,
                not_reached,
            } = buckets;
            for (is_reached, mut bucket) in [(true, reached), (false, not_reached)] {
                // walking a classless sink above may have grouped some members already
                bucket.retain_present(graph);
                if bucket.len() >= self.threshold {
                    // a deeper level may have swallowed the current node
                    if !graph.contains_node(node_id) {
                        return Ok(());
                    }
                    let group_id =
                        self.collapse_downstream(graph, node_id, &class, is_reached, &icon_url, &bucket)?;
                    self.group_similar_neighbours(graph, &group_id)?;
                } else {
                    for member in &bucket.members {
                        self.group_similar_neighbours(graph, member)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn collapse_downstream(
        &mut self,
        graph: &mut Graph,
        node_id: &str,
        class: &str,
        is_reached: bool,
        icon_url: &str,
        bucket: &Bucket,
    ) -> Result<String> {
        let status = if is_reached { REACHED } else { NOT_REACHED };
        let group_id = format!("{node_id}::{class}/{status}");

        let group = Node::group(group_id.as_str())
            .with_property("label", format!("x{}", bucket.count))
            .with_property("icon_url", icon_url)
            .with_property("class", class)
            .with_property("is_reached", is_reached)
            .with_property("count", bucket.count);
        graph.add_node(group)?;
        graph.add_edge(format!("{node_id}-{group_id}"), node_id, group_id.as_str())?;

        for member in &bucket.members {
            for edge in graph.incoming_edges(member) {
                if edge.source() != node_id {
                    graph.add_edge_if_absent(
                        format!("{}::{class}", edge.id()),
                        edge.source(),
                        group_id.as_str(),
                    )?;
                }
            }
            for edge in graph.outgoing_edges(member) {
                // several members may share a downstream neighbour
                let added = graph.add_edge_if_absent(
                    format!("{}::{class}", edge.id()),
                    group_id.as_str(),
                    edge.sink(),
                )?;
                if !added {
                    debug!(edge = edge.id(), group = %group_id, "edge already rewired");
                }
            }
            absorb(graph, member, &group_id);
        }

        self.groups_created += 1;
        debug!(
            group = %group_id,
            members = bucket.len(),
            count = bucket.count,
            "collapsed similar neighbours"
        );
        Ok(group_id)
    }

    /// Collapses unreached predecessors of `node_id`. Groups formed here are
    /// not walked any further.
    fn group_upstream(&mut self, graph: &mut Graph, node_id: &str) -> Result<()> {
        let mut classes: IndexMap<String, Bucket> = IndexMap::new();

        for edge in graph.incoming_edges(node_id) {
            let Some(source) = graph.node(edge.source()) else {
                continue;
            };
            if source.is_reached() {
                continue;
            }
            if let Some(class) = source.class_tag() {
                classes.entry(class).or_default().add(source);
            }
        }

        for (class, mut bucket) in classes {
            bucket.retain_present(graph);
            if bucket.len() < self.threshold || !graph.contains_node(node_id) {
                continue;
            }
            let status = NOT_REACHED;
            let group_id = format!("-{node_id}::{class}/{status}");

            let group = Node::group(group_id.as_str())
                .with_property("label", format!("x{}", bucket.count))
                .with_property("icon_url", bucket.icon_url.clone().unwrap_or_default())
                .with_property("is_reached", false)
                .with_property("count", bucket.count);
            graph.add_node(group)?;
            graph.add_edge(
                format!("-{node_id}-{group_id}/{status}"),
                group_id.as_str(),
                node_id,
            )?;

            for member in &bucket.members {
                for edge in graph.incoming_edges(member) {
                    graph.add_edge_if_absent(
                        format!("-{}::{class}", edge.id()),
                        edge.source(),
                        group_id.as_str(),
                    )?;
                }
                for edge in graph.outgoing_edges(member) {
                    if edge.sink() != node_id {
                        graph.add_edge_if_absent(
                            format!("-{}::{class}/{status}", edge.id()),
                            group_id.as_str(),
                            edge.sink(),
                        )?;
                    }
                }
                absorb(graph, member, &group_id);
            }

            self.groups_created += 1;
            debug!(
                group = %group_id,
                members = bucket.len(),
                "collapsed unreached predecessors"
            );
        }
        Ok(())
    }
}

impl Default for GroupingEngine {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

/// Removes `member_id` from the graph and hands its domain objects to the group.
fn absorb(graph: &mut Graph, member_id: &str, group_id: &str) {
    let Some(member) = graph.remove_node(member_id) else {
        return;
    };
    let objects: Vec<ObjectRef> = match member.members() {
        Some(members) => members.objects().cloned().collect(),
        None => member.object().cloned().into_iter().collect(),
    };
    if let Some(group) = graph.node_mut(group_id) {
        for object in objects {
            group.add_object(object);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::dedup_edges;

    fn member(id: &str, class: &str, reached: bool) -> Node {
        let mut node = Node::plain(id)
            .with_property("class", class)
            .with_property("label", id)
            .with_property("icon_url", format!("icons/{class}.png"))
            .with_property("is_reached", reached);
        node.set_object(ObjectRef {
            key: id.to_string(),
            class: class.to_string(),
            name: id.to_string(),
            icon: format!("icons/{class}.png"),
        });
        node
    }

    fn source(id: &str) -> Node {
        member(id, "Source", true).with_property("source", true)
    }

    /// A source `S` fanning out to `n` nodes of class `class`.
    fn fan_out(n: usize, class: &str, reached: bool) -> Graph {
        let mut graph = Graph::new();
        graph.add_node(source("S")).unwrap();
        for i in 0..n {
            let id = format!("{class}{i}");
            graph.add_node(member(&id, class, reached)).unwrap();
            graph.add_edge(format!("S->{id}"), "S", id.as_str()).unwrap();
        }
        graph
    }

    fn groups(graph: &Graph) -> Vec<&Node> {
        graph.nodes().filter(|n| n.is_group()).collect()
    }

    #[test]
    fn large_fan_out_becomes_a_single_group() {
        let mut graph = fan_out(25, "X", true);
        let mut engine = GroupingEngine::new(20);

        assert_eq!(engine.group_from_sources(&mut graph).unwrap(), 1);

        let groups = groups(&graph);
        assert_eq!(groups.len(), 1);
        let group = groups[0];
        assert_eq!(group.label(), "x25");
        assert_eq!(group.count(), 25);
        assert!(group.is_reached());
        assert_eq!(group.members().unwrap().len(), 25);
        assert!((0..25).all(|i| !graph.contains_node(&format!("X{i}"))));

        let edges: Vec<_> = graph.edges().collect();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].source(), "S");
        assert_eq!(edges[0].sink(), group.id());
    }

    #[test]
    fn threshold_boundary() {
        let mut below = fan_out(19, "X", true);
        GroupingEngine::new(20).group_from_sources(&mut below).unwrap();
        assert!(groups(&below).is_empty());
        assert_eq!(below.node_count(), 20);

        let mut exact = fan_out(20, "X", true);
        GroupingEngine::new(20).group_from_sources(&mut exact).unwrap();
        assert_eq!(groups(&exact).len(), 1);
        assert_eq!(exact.node_count(), 2);
    }

    #[test]
    fn group_count_sums_member_counts() {
        let mut graph = fan_out(4, "X", true);
        for (i, count) in [1_u64, 2, 3, 4].into_iter().enumerate() {
            graph
                .node_mut(&format!("X{i}"))
                .unwrap()
                .set("count", count);
        }
        GroupingEngine::new(4).group_from_sources(&mut graph).unwrap();

        let group = groups(&graph)[0];
        assert_eq!(group.count(), 10);
        assert_eq!(group.label(), "x10");
        assert_eq!(group.members().unwrap().len(), 4);
    }

    #[test]
    fn reached_and_unreached_are_grouped_separately() {
        let mut graph = fan_out(3, "X", true);
        for i in 0..3 {
            let id = format!("U{i}");
            graph.add_node(member(&id, "X", false)).unwrap();
            graph.add_edge(format!("S->{id}"), "S", id.as_str()).unwrap();
        }
        GroupingEngine::new(3).group_from_sources(&mut graph).unwrap();

        let groups = groups(&graph);
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().any(|g| g.is_reached()));
        assert!(groups.iter().any(|g| !g.is_reached()));
        assert!(groups.iter().all(|g| g.label() == "x3"));
    }

    #[test]
    fn classless_sinks_are_walked_through() {
        let mut graph = Graph::new();
        graph.add_node(source("S")).unwrap();
        graph
            .add_node(Node::redundancy("R").with_property("is_reached", true))
            .unwrap();
        graph.add_edge("S->R", "S", "R").unwrap();
        for i in 0..5 {
            let id = format!("X{i}");
            graph.add_node(member(&id, "X", true)).unwrap();
            graph.add_edge(format!("R->{id}"), "R", id.as_str()).unwrap();
        }

        GroupingEngine::new(5).group_from_sources(&mut graph).unwrap();

        let group = groups(&graph)[0];
        assert_eq!(group.id(), "R::X/reached");
        assert_eq!(graph.incoming_edges(group.id())[0].source(), "R");
    }

    #[test]
    fn grouping_continues_below_a_new_group() {
        let mut graph = fan_out(3, "X", true);
        for i in 0..3 {
            let id = format!("Y{i}");
            graph.add_node(member(&id, "Y", true)).unwrap();
            graph
                .add_edge(format!("X{i}->{id}"), format!("X{i}"), id.as_str())
                .unwrap();
        }

        GroupingEngine::new(3).group_from_sources(&mut graph).unwrap();
        dedup_edges(&mut graph);

        assert_eq!(graph.node_count(), 3);
        let x_group = "S::X/reached";
        let y_group = format!("{x_group}::Y/reached");
        assert!(graph.contains_node(&y_group));
        let pairs: Vec<(&str, &str)> = graph.edges().map(|e| (e.source(), e.sink())).collect();
        assert!(pairs.contains(&("S", x_group)));
        assert!(pairs.contains(&(x_group, y_group.as_str())));
    }

    #[test]
    fn shared_neighbour_keeps_one_edge_after_dedup() {
        let mut graph = fan_out(3, "X", true);
        graph.add_node(member("T", "Target", true)).unwrap();
        for i in 0..3 {
            graph
                .add_edge(format!("X{i}->T"), format!("X{i}"), "T")
                .unwrap();
        }

        GroupingEngine::new(3).group_from_sources(&mut graph).unwrap();
        dedup_edges(&mut graph);

        let into_t = graph.incoming_edges("T");
        assert_eq!(into_t.len(), 1);
        assert_eq!(into_t[0].source(), "S::X/reached");
    }

    #[test]
    fn other_incoming_edges_are_rewired_to_the_group() {
        let mut graph = fan_out(3, "X", true);
        graph.add_node(member("Z", "Other", true)).unwrap();
        graph.add_edge("Z->X1", "Z", "X1").unwrap();

        GroupingEngine::new(3).group_from_sources(&mut graph).unwrap();

        let rewired = graph.edge("Z->X1::X").expect("rewired edge");
        assert_eq!(rewired.source(), "Z");
        assert_eq!(rewired.sink(), "S::X/reached");
    }

    #[test]
    fn upstream_grouping_is_opt_in() {
        let build = || {
            let mut graph = Graph::new();
            graph.add_node(source("S")).unwrap();
            graph
                .add_node(Node::redundancy("R").with_property("is_reached", true))
                .unwrap();
            graph.add_edge("S->R", "S", "R").unwrap();
            for i in 0..4 {
                let id = format!("P{i}");
                graph.add_node(member(&id, "P", false)).unwrap();
                graph.add_edge(format!("{id}->R"), id.as_str(), "R").unwrap();
            }
            graph.add_node(member("Q", "P", true)).unwrap();
            graph.add_edge("Q->R", "Q", "R").unwrap();
            graph
        };

        let mut without = build();
        GroupingEngine::new(4).group_from_sources(&mut without).unwrap();
        assert!(groups(&without).is_empty());

        let mut with = build();
        let mut engine = GroupingEngine::new(4).with_upstream(true);
        assert_eq!(engine.group_from_sources(&mut with).unwrap(), 1);

        let group = with.node("-R::P/not_reached").expect("upstream group");
        assert!(!group.is_reached());
        assert_eq!(group.label(), "x4");
        assert_eq!(group.members().unwrap().len(), 4);
        assert!(with.contains_node("Q"));
        let out: Vec<_> = with.outgoing_edges(group.id());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].sink(), "R");
        // upstream groups are not walked further
        assert!(!engine.is_visited(group.id()));
    }

    #[test]
    fn members_grouped_through_a_later_classless_sink_are_not_counted_twice() {
        let mut graph = fan_out(20, "X", true);
        graph
            .add_node(Node::redundancy("R").with_property("is_reached", true))
            .unwrap();
        graph.add_edge("S->R", "S", "R").unwrap();
        for i in 0..20 {
            graph
                .add_edge(format!("R->X{i}"), "R", format!("X{i}"))
                .unwrap();
        }

        let mut engine = GroupingEngine::new(20);
        assert_eq!(engine.group_from_sources(&mut graph).unwrap(), 1);

        assert!(!graph.contains_node("S::X/reached"));
        let groups = groups(&graph);
        assert_eq!(groups.len(), 1);
        let group = groups[0];
        assert_eq!(group.id(), "R::X/reached");
        assert_eq!(group.label(), "x20");
        assert_eq!(group.count(), 20);
        assert_eq!(group.members().unwrap().len(), 20);
        for group in &groups {
            assert_eq!(group.count() as usize, group.members().unwrap().len());
        }
    }

    #[test]
    fn partially_absorbed_bucket_is_judged_on_what_remains() {
        // R takes X0..X9, leaving S with ten X neighbours of its own
        let mut graph = fan_out(20, "X", true);
        graph
            .add_node(Node::redundancy("R").with_property("is_reached", true))
            .unwrap();
        graph.add_edge("S->R", "S", "R").unwrap();
        for i in 0..10 {
            graph
                .add_edge(format!("R->X{i}"), "R", format!("X{i}"))
                .unwrap();
        }

        GroupingEngine::new(10).group_from_sources(&mut graph).unwrap();

        let s_group = graph.node("S::X/reached").expect("group below S");
        assert_eq!(s_group.count(), 10);
        assert_eq!(s_group.label(), "x10");
        assert_eq!(s_group.members().unwrap().len(), 10);
        let r_group = graph.node("R::X/reached").expect("group below R");
        assert_eq!(r_group.count(), 10);
        assert_eq!(r_group.members().unwrap().len(), 10);
    }

    #[test]
    fn revisiting_a_node_is_a_no_op() {
        let mut graph = fan_out(25, "X", true);
        let mut engine = GroupingEngine::new(20);
        engine.group_from_sources(&mut graph).unwrap();
        let nodes = graph.node_count();
        let edges = graph.edge_count();

        engine.group_similar_neighbours(&mut graph, "S").unwrap();
        assert_eq!(graph.node_count(), nodes);
        assert_eq!(graph.edge_count(), edges);
        assert_eq!(engine.groups_created(), 1);
    }
}
