use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::grouping::DEFAULT_THRESHOLD;
use crate::transform::{Orientation, PageFormat, PageSetup};

/// Settings for one run of the pipeline. Every field has a default, so a
/// configuration file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub grouping_threshold: usize,
    pub group_upstream: bool,
    pub direction_down: bool,
    pub graphviz_path: PathBuf,
    pub page_format: PageFormat,
    pub orientation: Orientation,
    pub title: String,
    pub icon_url_prefix: Option<String>,
    pub icon_root: Option<PathBuf>,
    pub temp_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            grouping_threshold: DEFAULT_THRESHOLD,
            group_upstream: true,
            direction_down: true,
            graphviz_path: PathBuf::from("dot"),
            page_format: PageFormat::default(),
            orientation: Orientation::default(),
            title: "Untitled".to_string(),
            icon_url_prefix: None,
            icon_root: None,
            temp_dir: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn page_setup(&self) -> PageSetup {
        PageSetup::new(self.page_format, self.orientation)
    }
}
