//! Turns relation graphs produced by an impact analysis into something a
//! person can read: similar neighbours are collapsed into groups, Graphviz
//! places the nodes, and the result is exported either as records for an
//! interactive viewer or as paginated vector drawing commands.

pub mod builder;
pub mod config;
pub mod drawing;
pub mod error;
pub mod graph;
pub mod grouping;
pub mod icons;
pub mod interactive;
pub mod layout;
pub mod pipeline;
pub mod svg;
pub mod transform;
pub mod utils;

pub use builder::{RelationEdge, RelationGraph, RelationNode, build_graph, dedup_edges};
pub use config::PipelineConfig;
pub use drawing::{Document, DrawCommand, DrawingRenderer, Page};
pub use error::{Error, Result};
pub use graph::{Edge, Graph, Node, NodeKind, ObjectRef, Point};
pub use grouping::GroupingEngine;
pub use interactive::InteractiveDiagram;
pub use layout::{GraphvizOracle, LayoutOracle};
pub use pipeline::Pipeline;
pub use transform::{BoundingBox, PageFit, PageSetup};
