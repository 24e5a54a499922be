use std::collections::HashMap;

use tracing::info;

use crate::builder::{RelationGraph, build_graph, dedup_edges};
use crate::config::PipelineConfig;
use crate::drawing::{ApproxTextMetrics, Document, DrawingRenderer};
use crate::error::Result;
use crate::graph::{Graph, Point};
use crate::grouping::GroupingEngine;
use crate::icons::{IconFilter, PrefixResolver};
use crate::interactive::InteractiveDiagram;
use crate::layout::{GraphvizOracle, LayoutOracle, init_from_oracle};

/// A displayable graph together with the settings it was built with.
#[derive(Debug, Clone)]
pub struct Pipeline {
    graph: Graph,
    config: PipelineConfig,
}

impl Pipeline {
    /// Builds the displayable graph: conversion, edge cleanup, grouping of the
    /// fan-outs below every source node, then a second cleanup for the edges
    /// the grouping rewired onto the same pairs.
    pub fn build(relation: &RelationGraph, config: PipelineConfig) -> Result<Self> {
        let mut graph = build_graph(relation, config.direction_down)?;
        let removed_before = dedup_edges(&mut graph);

        let mut engine =
            GroupingEngine::new(config.grouping_threshold).with_upstream(config.group_upstream);
        let groups = engine.group_from_sources(&mut graph)?;
        let removed_after = dedup_edges(&mut graph);

        info!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            groups,
            removed_edges = removed_before + removed_after,
            "built displayable graph"
        );
        Ok(Self { graph, config })
    }

    pub fn from_graph(graph: Graph, config: PipelineConfig) -> Self {
        Self { graph, config }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn into_graph(self) -> Graph {
        self.graph
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Places the nodes, either from previously computed positions or by
    /// asking Graphviz. Returns how many nodes received a position.
    pub fn position(&mut self, positions: Option<&HashMap<String, Point>>) -> Result<usize> {
        match positions {
            Some(positions) => Ok(self.graph.update_positions(positions)),
            None => {
                let oracle = GraphvizOracle::new(&self.config.graphviz_path);
                self.position_with(&oracle)
            }
        }
    }

    pub fn position_with(&mut self, oracle: &dyn LayoutOracle) -> Result<usize> {
        init_from_oracle(&mut self.graph, oracle)
    }

    pub fn interactive(&self) -> InteractiveDiagram {
        InteractiveDiagram::from_graph(&self.graph)
    }

    /// Fits the graph to the configured page and draws it. Node positions are
    /// left translated into page space afterwards.
    pub fn document(&mut self) -> Document {
        let resolver = PrefixResolver::new(
            self.config.icon_url_prefix.clone().unwrap_or_default(),
            self.config.icon_root.clone().unwrap_or_default(),
        );
        let filter = icon_filter();
        let metrics = ApproxTextMetrics::default();

        let mut renderer = DrawingRenderer::new(&resolver, filter.as_ref(), &metrics);
        if let Some(dir) = &self.config.temp_dir {
            renderer = renderer.with_temp_dir(dir);
        }
        renderer.render(&mut self.graph, self.config.page_setup(), &self.config.title)
    }
}

#[cfg(feature = "raster")]
fn icon_filter() -> Box<dyn IconFilter> {
    Box::new(crate::icons::WhiteningFilter)
}

#[cfg(not(feature = "raster"))]
fn icon_filter() -> Box<dyn IconFilter> {
    Box::new(crate::icons::NoFilter)
}
