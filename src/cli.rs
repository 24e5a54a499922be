use anyhow::{Context, Result, anyhow, bail};
use clap::{ArgAction, Parser, ValueEnum};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use impact_graph::layout::to_dot;
use impact_graph::transform::{Orientation, PageFormat};
use impact_graph::{Pipeline, PipelineConfig, Point, RelationGraph, svg};

#[derive(Debug, Clone, PartialEq, Eq)]
enum InputSource {
    Stdin,
    File(PathBuf),
}

#[derive(Debug, Clone)]
enum OutputDestination {
    Stdout,
    File(PathBuf),
}

#[derive(Debug, Parser)]
#[command(
    name = "impact-graph",
    about = "Group, lay out and render relation graphs as interactive JSON or vector pages."
)]
pub struct RenderArgs {
    /// Path to the relation graph (JSON). Use '-' to read from stdin.
    #[arg(short = 'i', long = "input")]
    input: Option<String>,

    /// Path to the output file. Use '-' to write to stdout.
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// Output format (defaults to the output file extension or json).
    #[arg(short = 'f', long = "format")]
    format: Option<OutputFormat>,

    /// JSON file with pipeline settings; flags below take precedence.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Minimum number of similar neighbours collapsed into a group.
    #[arg(short = 't', long = "threshold")]
    threshold: Option<usize>,

    /// Page format for vector output (A3, A4, Letter).
    #[arg(long = "page-format", value_parser = parse_page_format)]
    page_format: Option<PageFormat>,

    /// Page orientation for vector output (portrait/P or landscape/L).
    #[arg(long = "orientation", value_parser = parse_orientation)]
    orientation: Option<Orientation>,

    /// JSON map of node id to {x, y}; skips running Graphviz.
    #[arg(long = "positions")]
    positions: Option<PathBuf>,

    /// Path to the Graphviz `dot` executable.
    #[arg(long = "dot")]
    dot: Option<PathBuf>,

    /// URL prefix of icon references, replaced by --icon-root.
    #[arg(long = "icon-prefix", requires = "icon_root")]
    icon_prefix: Option<String>,

    /// Local directory holding the icons.
    #[arg(long = "icon-root")]
    icon_root: Option<PathBuf>,

    /// Document title for vector output.
    #[arg(long = "title")]
    title: Option<String>,

    /// Print the Graphviz description of the grouped graph and exit.
    #[arg(long = "emit-dot", action = ArgAction::SetTrue)]
    emit_dot: bool,

    /// Suppress informational output.
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue, conflicts_with = "verbose")]
    quiet: bool,

    /// Log progress details to stderr.
    #[arg(short = 'v', long = "verbose", action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Node and edge records for the interactive viewer.
    Json,
    /// Drawing commands of the paginated document.
    Commands,
    Svg,
}

impl OutputFormat {
    fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(OutputFormat::Json),
            "svg" => Some(OutputFormat::Svg),
            _ => None,
        }
    }
}

fn parse_page_format(value: &str) -> std::result::Result<PageFormat, String> {
    value.parse()
}

fn parse_orientation(value: &str) -> std::result::Result<Orientation, String> {
    value.parse()
}

impl RenderArgs {
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        }
    }

    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::from_path(path)
                .with_context(|| format!("failed to load config '{}'", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(threshold) = self.threshold {
            if threshold == 0 {
                bail!("--threshold must be at least 1");
            }
            config.grouping_threshold = threshold;
        }
        if let Some(format) = self.page_format {
            config.page_format = format;
        }
        if let Some(orientation) = self.orientation {
            config.orientation = orientation;
        }
        if let Some(dot) = &self.dot {
            config.graphviz_path = dot.clone();
        }
        if let Some(prefix) = &self.icon_prefix {
            config.icon_url_prefix = Some(prefix.clone());
        }
        if let Some(root) = &self.icon_root {
            config.icon_root = Some(root.clone());
        }
        if let Some(title) = &self.title {
            config.title = title.clone();
        }
        Ok(config)
    }
}

pub fn run(cli: RenderArgs) -> Result<()> {
    let input_source = parse_input(cli.input.as_deref())?;
    let output_dest = parse_output(cli.output.as_deref())?;
    let config = cli.pipeline_config()?;

    let raw = load_input(&input_source)?;
    let relation: RelationGraph =
        serde_json::from_str(&raw).context("input is not a valid relation graph")?;

    let mut pipeline = Pipeline::build(&relation, config)?;

    if cli.emit_dot {
        return write_output(output_dest, to_dot(pipeline.graph())?.as_bytes(), cli.quiet);
    }

    let format = determine_format(cli.format, &output_dest)?;

    let positions = cli.positions.as_deref().map(load_positions).transpose()?;
    let placed = pipeline
        .position(positions.as_ref())
        .context("failed to lay out the graph")?;
    debug!(placed, "positioned nodes");

    let output_bytes = match format {
        OutputFormat::Json => pipeline.interactive().to_json_pretty()?.into_bytes(),
        OutputFormat::Commands => {
            // image commands name the whitened icons, which must outlive this process
            let mut document = pipeline.document();
            let kept = document
                .keep_artifacts()
                .context("failed to keep whitened icons")?;
            if !kept.is_empty() {
                info!(files = kept.len(), "whitened icons left on disk");
            }
            document.to_json()?.into_bytes()
        }
        OutputFormat::Svg => {
            // the document owns the whitened icons until the pages are embedded
            let document = pipeline.document();
            let page = document
                .pages
                .first()
                .ok_or_else(|| anyhow!("document has no page"))?;
            svg::render_page(page)?.into_bytes()
        }
    };

    info!(format = ?format, bytes = output_bytes.len(), "rendered graph");
    write_output(output_dest, &output_bytes, cli.quiet)
}

fn parse_input(input: Option<&str>) -> Result<InputSource> {
    match input {
        Some("-") => Ok(InputSource::Stdin),
        Some(path_str) => {
            let path = PathBuf::from(path_str);
            if !path.exists() {
                return Err(anyhow!("input file '{path_str}' does not exist"));
            }
            Ok(InputSource::File(path))
        }
        None => Ok(InputSource::Stdin),
    }
}

fn parse_output(output: Option<&str>) -> Result<OutputDestination> {
    match output {
        None | Some("-") => Ok(OutputDestination::Stdout),
        Some(path_str) => {
            let path = PathBuf::from(path_str);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(anyhow!(
                        "output directory '{}' does not exist",
                        parent.display()
                    ));
                }
            }
            Ok(OutputDestination::File(path))
        }
    }
}

fn determine_format(
    preference: Option<OutputFormat>,
    output: &OutputDestination,
) -> Result<OutputFormat> {
    if let Some(fmt) = preference {
        return Ok(fmt);
    }

    match output {
        OutputDestination::Stdout => Ok(OutputFormat::Json),
        OutputDestination::File(path) => OutputFormat::from_path(path).ok_or_else(|| {
            anyhow!(
                "unable to determine output format from '{}'; please specify --format",
                path.display()
            )
        }),
    }
}

fn load_input(source: &InputSource) -> Result<String> {
    match source {
        InputSource::Stdin => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            if buffer.trim().is_empty() {
                Err(anyhow!("no relation graph supplied on stdin"))
            } else {
                Ok(buffer)
            }
        }
        InputSource::File(path) => {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("failed to read '{}'", path.display()))?;
            if contents.trim().is_empty() {
                Err(anyhow!("input file '{}' was empty", path.display()))
            } else {
                Ok(contents)
            }
        }
    }
}

fn load_positions(path: &Path) -> Result<HashMap<String, Point>> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("failed to read '{}'", path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("'{}' is not a map of node positions", path.display()))
}

fn write_output(dest: OutputDestination, bytes: &[u8], quiet: bool) -> Result<()> {
    match dest {
        OutputDestination::Stdout => {
            let mut stdout = io::stdout();
            stdout.write_all(bytes)?;
            stdout.flush()?;
        }
        OutputDestination::File(path) => {
            fs::write(&path, bytes)
                .with_context(|| format!("failed to write '{}'", path.display()))?;
            if !quiet {
                println!("Generated graph -> {}", path.display());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_the_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "grouping_threshold": 7, "title": "From file" }"#).unwrap();

        let args = RenderArgs::parse_from([
            "impact-graph",
            "--config",
            path.to_str().unwrap(),
            "--title",
            "From flag",
            "--orientation",
            "L",
        ]);
        let config = args.pipeline_config().unwrap();
        assert_eq!(config.grouping_threshold, 7);
        assert_eq!(config.title, "From flag");
        assert_eq!(config.orientation, Orientation::Landscape);
    }

    #[test]
    fn zero_threshold_is_rejected() {
        let args = RenderArgs::parse_from(["impact-graph", "--threshold", "0"]);
        assert!(args.pipeline_config().is_err());
    }

    #[test]
    fn format_follows_the_output_extension() {
        let dest = OutputDestination::File(PathBuf::from("graph.svg"));
        assert_eq!(determine_format(None, &dest).unwrap(), OutputFormat::Svg);
        let dest = OutputDestination::File(PathBuf::from("graph.pdf"));
        assert!(determine_format(None, &dest).is_err());
        assert_eq!(
            determine_format(None, &OutputDestination::Stdout).unwrap(),
            OutputFormat::Json
        );
    }
}
