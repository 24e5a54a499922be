use std::fmt::Write as FmtWrite;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::graph::{Graph, Point};
use crate::utils::{dot_escape, truncate_for_display};

/// Token every graph description returned by the oracle must contain.
pub const GRAPH_MARKER: &str = "digraph";

const POINTS_PER_INCH: f64 = 72.0;

// Labels may hold arbitrary user text that would confuse the statement split.
static LABEL_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r".*label=.*,").expect("label pattern is valid"));

static NODE_POSITION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)"([^"]+)".+pos="([0-9.]+),([0-9.]+)""#).expect("position pattern is valid")
});

/// External component computing node positions from a textual graph
/// description.
pub trait LayoutOracle {
    fn layout(&self, description: &str) -> Result<String>;
}

impl<F> LayoutOracle for F
where
    F: Fn(&str) -> Result<String>,
{
    fn layout(&self, description: &str) -> Result<String> {
        self(description)
    }
}

/// Runs Graphviz `dot` and asks for xdot output.
#[derive(Debug, Clone)]
pub struct GraphvizOracle {
    program: PathBuf,
}

impl GraphvizOracle {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

impl Default for GraphvizOracle {
    fn default() -> Self {
        Self::new("dot")
    }
}

impl LayoutOracle for GraphvizOracle {
    fn layout(&self, description: &str) -> Result<String> {
        let program = self.program.display().to_string();
        let oracle_error = |source| Error::LayoutOracle {
            program: program.clone(),
            source,
        };

        let mut child = Command::new(&self.program)
            .arg("-Txdot")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(oracle_error)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(description.as_bytes())
                .map_err(oracle_error)?;
        }

        let output = child.wait_with_output().map_err(oracle_error)?;
        if !output.status.success() {
            return Err(Error::OracleFailed {
                program,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Serializes the graph in the dot language.
pub fn to_dot(graph: &Graph) -> Result<String> {
    let mut dot = String::new();
    dot.push_str("digraph relation_graph {\n");
    dot.push_str("\tgraph [bgcolor = \"transparent\"];\n");
    dot.push_str("\trankdir=LR;\n");
    dot.push_str("\tnode [shape = box, fixedsize = true];\n");

    for node in graph.nodes() {
        writeln!(
            dot,
            "\t\"{}\" [label=\"{}\", width={:.2}, height={:.2}];",
            dot_escape(node.id()),
            dot_escape(&node.label()),
            node.width() / POINTS_PER_INCH,
            node.height() / POINTS_PER_INCH,
        )?;
    }

    for edge in graph.edges() {
        writeln!(
            dot,
            "\t\"{}\" -> \"{}\";",
            dot_escape(edge.source()),
            dot_escape(edge.sink())
        )?;
    }

    dot.push_str("}\n");
    Ok(dot)
}

/// Extracts `(node id, position)` pairs from an xdot/plain dot layout.
///
/// Statements without a `pos` attribute (graph settings, edges) are skipped.
pub fn parse_positions(output: &str) -> Result<Vec<(String, Point)>> {
    if !output.contains(GRAPH_MARKER) {
        return Err(Error::LayoutOutput {
            output: truncate_for_display(output, 200),
        });
    }

    let cleaned = LABEL_LINE.replace_all(output, "");
    let mut positions = Vec::new();
    for statement in cleaned.split(';') {
        let Some(captures) = NODE_POSITION.captures(statement) else {
            continue;
        };
        let (Ok(x), Ok(y)) = (captures[2].parse::<f64>(), captures[3].parse::<f64>()) else {
            continue;
        };
        positions.push((captures[1].to_string(), Point::new(x, y)));
    }
    Ok(positions)
}

/// Writes the positions found in `output` onto the graph's nodes and returns
/// how many nodes were placed. Nothing is modified when the output is
/// rejected.
pub fn apply_layout_output(graph: &mut Graph, output: &str) -> Result<usize> {
    let positions = parse_positions(output)?;
    let mut placed = 0;
    for (id, point) in positions {
        match graph.node_mut(&id) {
            Some(node) => {
                node.position = point;
                placed += 1;
            }
            None => debug!(node = %id, "layout output mentions an unknown node"),
        }
    }
    Ok(placed)
}

pub fn init_from_oracle(graph: &mut Graph, oracle: &dyn LayoutOracle) -> Result<usize> {
    let description = to_dot(graph)?;
    let output = oracle.layout(&description)?;
    let placed = apply_layout_output(graph, &output)?;
    info!(placed, nodes = graph.node_count(), "applied layout");
    Ok(placed)
}
