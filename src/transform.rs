use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::Graph;

/// Room left under the icons for their labels.
pub const LABEL_ALLOWANCE: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl BoundingBox {
    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }
}

/// Extent of all nodes, `None` for an empty graph.
///
/// The first node visited contributes its full width and height on each side,
/// the others only half of it.
pub fn bounding_box(graph: &Graph) -> Option<BoundingBox> {
    let mut nodes = graph.nodes();
    let first = nodes.next()?;
    let mut bbox = BoundingBox {
        x_min: first.position.x - first.width(),
        x_max: first.position.x + first.width(),
        y_min: first.position.y - first.height(),
        y_max: first.position.y + first.height(),
    };

    for node in nodes {
        let half_w = node.width() / 2.0;
        let half_h = node.height() / 2.0;
        bbox.x_min = bbox.x_min.min(node.position.x - half_w);
        bbox.x_max = bbox.x_max.max(node.position.x + half_w);
        bbox.y_min = bbox.y_min.min(node.position.y - half_h);
        bbox.y_max = bbox.y_max.max(node.position.y + half_h);
    }

    Some(bbox)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PageFormat {
    A3,
    #[default]
    A4,
    Letter,
}

impl PageFormat {
    /// Portrait width and height in millimetres.
    pub fn size(&self) -> (f64, f64) {
        match self {
            PageFormat::A3 => (297.0, 420.0),
            PageFormat::A4 => (210.0, 297.0),
            PageFormat::Letter => (215.9, 279.4),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PageFormat::A3 => "A3",
            PageFormat::A4 => "A4",
            PageFormat::Letter => "Letter",
        }
    }
}

impl FromStr for PageFormat {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "a3" => Ok(PageFormat::A3),
            "a4" => Ok(PageFormat::A4),
            "letter" => Ok(PageFormat::Letter),
            other => Err(format!(
                "unsupported page format '{other}'; supported values are A3, A4, Letter"
            )),
        }
    }
}

impl fmt::Display for PageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

impl Orientation {
    /// Horizontal and vertical margins in millimetres.
    pub fn margins(&self) -> (f64, f64) {
        match self {
            Orientation::Portrait => (10.0, 15.0),
            Orientation::Landscape => (15.0, 10.0),
        }
    }
}

impl FromStr for Orientation {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "p" | "portrait" => Ok(Orientation::Portrait),
            "l" | "landscape" => Ok(Orientation::Landscape),
            other => Err(format!(
                "unsupported orientation '{other}'; use portrait (P) or landscape (L)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageSetup {
    pub format: PageFormat,
    pub orientation: Orientation,
}

impl PageSetup {
    pub fn new(format: PageFormat, orientation: Orientation) -> Self {
        Self {
            format,
            orientation,
        }
    }

    pub fn width(&self) -> f64 {
        let (short, long) = self.format.size();
        match self.orientation {
            Orientation::Portrait => short,
            Orientation::Landscape => long,
        }
    }

    pub fn height(&self) -> f64 {
        let (short, long) = self.format.size();
        match self.orientation {
            Orientation::Portrait => long,
            Orientation::Landscape => short,
        }
    }

    pub fn margins(&self) -> (f64, f64) {
        self.orientation.margins()
    }
}

/// Uniform scale to apply to node positions at draw time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageFit {
    pub setup: PageSetup,
    pub scale: f64,
}

/// Moves the graph so that, once every position is multiplied by the returned
/// scale, the whole drawing sits centered inside the page margins.
pub fn fit_to_page(graph: &mut Graph, setup: PageSetup) -> PageFit {
    let Some(bbox) = bounding_box(graph) else {
        return PageFit { setup, scale: 1.0 };
    };
    graph.translate(-bbox.x_min, -bbox.y_min);

    let (h_margin, v_margin) = setup.margins();
    let page_w = setup.width() - 2.0 * h_margin;
    let page_h = setup.height() - 2.0 * v_margin;

    let w = bbox.width();
    let h = bbox.height() + LABEL_ALLOWANCE;

    let scale = (page_w / w).min(page_h / h);
    let dx = (page_w - scale * w) / 2.0;
    let dy = (page_h - scale * h) / 2.0;

    graph.translate((h_margin + dx) / scale, (v_margin + dy) / scale);

    debug!(scale, dx, dy, format = %setup.format, "fitted graph to page");
    PageFit { setup, scale }
}
