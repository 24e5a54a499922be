//! Paginated vector rendering: the graph becomes a list of drawing commands
//! expressed in page millimetres.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, warn};

use crate::graph::{Graph, Node, NodeKind, Point};
use crate::icons::{AssetResolver, IconFilter, NoAssets, NoFilter, TempArtifacts};
use crate::transform::{PageFit, PageSetup, fit_to_page};

/// Millimetres in a typographic point.
pub const PT_TO_MM: f64 = 25.4 / 72.0;

pub const CREATOR: &str = concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"));

const RING_RADIUS: f64 = 16.0 * 1.25;
const REDUNDANCY_RADIUS: f64 = 16.0;
const ARROW_OFFSET: f64 = 40.0;
const ARROW_SIZE: f64 = 5.0;
const LINE_WIDTH: f64 = 2.0;
const LABEL_FONT: f64 = 24.0;
const REDUNDANCY_FONT: f64 = 28.0;
const FADED: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const EDGE_REACHED: Color = Color::rgb(100, 100, 100);
    pub const EDGE_UNREACHED: Color = Color::rgb(200, 200, 200);
    pub const SOURCE_RING: Color = Color::rgb(204, 51, 51);
    pub const SINK_RING: Color = Color::rgb(51, 51, 204);
    pub const REDUNDANCY_FILL: Color = Color::rgb(200, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Stroke {
    pub color: Color,
    pub width: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    /// `x` is the left edge of the text box.
    Left,
    /// `x` is the horizontal center of the text box.
    Center,
}

/// One primitive on a page. Coordinates are millimetres from the top-left
/// corner; text `y` is the top of the text box and font sizes are in points.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum DrawCommand {
    Line {
        from: Point,
        to: Point,
        stroke: Stroke,
        alpha: f64,
    },
    Circle {
        center: Point,
        radius: f64,
        stroke: Option<Stroke>,
        fill: Option<Color>,
        alpha: f64,
    },
    Rect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        stroke: Option<Stroke>,
        fill: Option<Color>,
        alpha: f64,
    },
    Image {
        path: PathBuf,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        alpha: f64,
    },
    Text {
        x: f64,
        y: f64,
        text: String,
        font_size: f64,
        color: Color,
        align: TextAlign,
        alpha: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub width: f64,
    pub height: f64,
    pub commands: Vec<DrawCommand>,
}

impl Page {
    pub fn new(setup: PageSetup) -> Self {
        Self {
            width: setup.width(),
            height: setup.height(),
            commands: Vec::new(),
        }
    }

    fn push(&mut self, command: DrawCommand) {
        self.commands.push(command);
    }
}

/// A rendered document. Images referenced by the pages may live in the owned
/// temporary artifacts: their paths are only valid while the document is
/// alive, unless [`Document::keep_artifacts`] was called.
#[derive(Debug, Serialize)]
pub struct Document {
    pub title: String,
    pub creator: String,
    pub setup: PageSetup,
    pub scale: f64,
    pub pages: Vec<Page>,
    #[serde(skip)]
    pub artifacts: TempArtifacts,
}

impl Document {
    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Leaves the temporary images on disk after the document is dropped and
    /// returns their paths.
    pub fn keep_artifacts(&mut self) -> crate::error::Result<Vec<PathBuf>> {
        Ok(self.artifacts.keep()?)
    }
}

/// Measures text in page millimetres.
pub trait TextMetrics {
    /// Returns the `(width, height)` of `text` set at `font_size` points.
    fn measure(&self, text: &str, font_size: f64) -> (f64, f64);
}

/// Fixed-advance estimate for a sans-serif face.
#[derive(Debug, Clone, Copy)]
pub struct ApproxTextMetrics {
    pub advance: f64,
    pub line_height: f64,
}

impl ApproxTextMetrics {
    pub const DEFAULT: Self = Self {
        advance: 0.55,
        line_height: 1.25,
    };
}

impl Default for ApproxTextMetrics {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TextMetrics for ApproxTextMetrics {
    fn measure(&self, text: &str, font_size: f64) -> (f64, f64) {
        let em = font_size * PT_TO_MM;
        let chars = text.chars().count() as f64;
        (chars * em * self.advance, em * self.line_height)
    }
}

pub struct DrawingRenderer<'a> {
    resolver: &'a dyn AssetResolver,
    filter: &'a dyn IconFilter,
    metrics: &'a dyn TextMetrics,
    temp_dir: Option<PathBuf>,
}

impl<'a> DrawingRenderer<'a> {
    pub fn new(
        resolver: &'a dyn AssetResolver,
        filter: &'a dyn IconFilter,
        metrics: &'a dyn TextMetrics,
    ) -> Self {
        Self {
            resolver,
            filter,
            metrics,
            temp_dir: None,
        }
    }

    /// Directory receiving whitened icons instead of the system temp dir.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Fits the graph to the page and draws it on a single page.
    pub fn render(&self, graph: &mut Graph, setup: PageSetup, title: &str) -> Document {
        let fit = fit_to_page(graph, setup);
        self.render_fitted(graph, fit, title)
    }

    /// Draws a graph whose positions were already fitted with `fit`.
    pub fn render_fitted(&self, graph: &Graph, fit: PageFit, title: &str) -> Document {
        let mut artifacts = match &self.temp_dir {
            Some(dir) => TempArtifacts::in_dir(dir),
            None => TempArtifacts::new(),
        };
        let mut page = Page::new(fit.setup);
        let scale = fit.scale;

        for edge in graph.edges() {
            let (Some(source), Some(sink)) = (graph.node(edge.source()), graph.node(edge.sink()))
            else {
                continue;
            };
            draw_edge(&mut page, source, sink, scale);
        }

        for node in graph.nodes() {
            match node.kind() {
                NodeKind::Plain => self.draw_plain(&mut page, &mut artifacts, node, scale),
                NodeKind::Redundancy => self.draw_redundancy(&mut page, node, scale),
                NodeKind::Group(_) => self.draw_group(&mut page, node, scale),
            }
        }

        debug!(
            commands = page.commands.len(),
            artifacts = artifacts.len(),
            "rendered page"
        );

        Document {
            title: title.to_string(),
            creator: CREATOR.to_string(),
            setup: fit.setup,
            scale,
            pages: vec![page],
            artifacts,
        }
    }

    fn icon_path(&self, node: &Node) -> Option<PathBuf> {
        let url = node.icon_url();
        let path = self.resolver.resolve(&url);
        if path.is_none() {
            warn!(node = node.id(), icon = %url, "icon not available, skipping it");
        }
        path
    }

    fn draw_plain(&self, page: &mut Page, artifacts: &mut TempArtifacts, node: &Node, s: f64) {
        let (x, y) = (node.position.x, node.position.y);

        let ring = if node.is_source() {
            Some(Color::SOURCE_RING)
        } else if node.is_sink() {
            Some(Color::SINK_RING)
        } else {
            None
        };
        if let Some(color) = ring {
            page.push(DrawCommand::Circle {
                center: Point::new(x * s, y * s),
                radius: RING_RADIUS * s,
                stroke: Some(Stroke {
                    color,
                    width: LINE_WIDTH * s,
                }),
                fill: None,
                alpha: 1.0,
            });
        }

        let icon = self.icon_path(node);
        let mut alpha = 1.0;
        if !node.is_reached() {
            if let Some(white) = icon
                .as_deref()
                .and_then(|path| self.filter.whiten(path, artifacts))
            {
                page.push(icon_image(white, x - 16.0, y - 16.0, 32.0, s, 1.0));
            }
            alpha = FADED;
        }
        if let Some(path) = icon {
            page.push(icon_image(path, x - 16.0, y - 16.0, 32.0, s, alpha));
        }

        let label = node.label();
        let font_size = LABEL_FONT * s;
        let (width, height) = self.metrics.measure(&label, font_size);
        let left = x * s - width / 2.0;
        let top = (y + 18.0) * s;
        page.push(DrawCommand::Rect {
            x: left,
            y: top,
            width,
            height,
            stroke: Some(Stroke {
                color: Color::WHITE,
                width: LINE_WIDTH * s,
            }),
            fill: Some(Color::WHITE),
            alpha: 0.6 * alpha,
        });
        page.push(DrawCommand::Text {
            x: left,
            y: top,
            text: label,
            font_size,
            color: Color::BLACK,
            align: TextAlign::Left,
            alpha,
        });
    }

    fn draw_redundancy(&self, page: &mut Page, node: &Node, s: f64) {
        let (x, y) = (node.position.x, node.position.y);
        page.push(DrawCommand::Circle {
            center: Point::new(x * s, y * s),
            radius: REDUNDANCY_RADIUS * s,
            stroke: Some(Stroke {
                color: Color::BLACK,
                width: LINE_WIDTH * s,
            }),
            fill: Some(Color::REDUNDANCY_FILL),
            alpha: 1.0,
        });

        let label = node.label();
        let font_size = REDUNDANCY_FONT * s;
        let (_, height) = self.metrics.measure(&label, font_size);
        page.push(DrawCommand::Text {
            x: x * s,
            y: y * s - height / 2.0,
            text: label,
            font_size,
            color: Color::WHITE,
            align: TextAlign::Center,
            alpha: 1.0,
        });
    }

    fn draw_group(&self, page: &mut Page, node: &Node, s: f64) {
        let (x, y) = (node.position.x, node.position.y);
        let reached = node.is_reached();
        page.push(DrawCommand::Circle {
            center: Point::new(x * s, y * s),
            radius: node.width() / 2.0 * s,
            stroke: Some(Stroke {
                color: edge_color(reached),
                width: LINE_WIDTH * s,
            }),
            fill: Some(Color::WHITE),
            alpha: 1.0,
        });

        let alpha = if reached { 1.0 } else { FADED };
        if let Some(path) = self.icon_path(node) {
            for (dx, dy) in [(-17.0, -17.0), (1.0, -17.0), (-8.0, 1.0)] {
                page.push(icon_image(path.clone(), x + dx, y + dy, 16.0, s, alpha));
            }
        }

        let label = node.label();
        let font_size = LABEL_FONT * s;
        let (width, _) = self.metrics.measure(&label, font_size);
        page.push(DrawCommand::Text {
            x: x * s - width / 2.0,
            y: (y + 25.0) * s,
            text: label,
            font_size,
            color: Color::BLACK,
            align: TextAlign::Left,
            alpha,
        });
    }
}

impl Default for DrawingRenderer<'static> {
    fn default() -> Self {
        static METRICS: ApproxTextMetrics = ApproxTextMetrics::DEFAULT;
        DrawingRenderer::new(&NoAssets, &NoFilter, &METRICS)
    }
}

fn edge_color(reached: bool) -> Color {
    if reached {
        Color::EDGE_REACHED
    } else {
        Color::EDGE_UNREACHED
    }
}

fn icon_image(path: PathBuf, x: f64, y: f64, size: f64, s: f64, alpha: f64) -> DrawCommand {
    DrawCommand::Image {
        path,
        x: x * s,
        y: y * s,
        width: size * s,
        height: size * s,
        alpha,
    }
}

fn draw_edge(page: &mut Page, source: &Node, sink: &Node, s: f64) {
    let start = Point::new(source.position.x * s, source.position.y * s);
    let end = Point::new(sink.position.x * s, sink.position.y * s);
    let stroke = Stroke {
        color: edge_color(source.is_reached() && sink.is_reached()),
        width: LINE_WIDTH * s,
    };

    page.push(DrawCommand::Line {
        from: start,
        to: end,
        stroke,
        alpha: 1.0,
    });

    let (vx, vy) = (end.x - start.x, end.y - start.y);
    let length = (vx * vx + vy * vy).sqrt();
    if length <= f64::EPSILON {
        return;
    }
    let (vx, vy) = (vx / length, vy / length);
    let (ux, uy) = (-vy, vx);
    let at = (length / 2.0).max(length - ARROW_OFFSET * s);
    let size = ARROW_SIZE * s;

    let tip = Point::new(start.x + at * vx, start.y + at * vy);
    for barb in [
        Point::new(tip.x + size * (ux - vx), tip.y + size * (uy - vy)),
        Point::new(tip.x - size * (ux + vx), tip.y - size * (uy + vy)),
    ] {
        page.push(DrawCommand::Line {
            from: tip,
            to: barb,
            stroke,
            alpha: 1.0,
        });
    }
}
