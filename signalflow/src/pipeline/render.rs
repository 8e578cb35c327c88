//! The render backend boundary.
//!
//! The pipeline stops at a [`RenderableHeatmap`]; turning it into an image
//! is the backend's job. [`JsonRenderBackend`] is a reference backend that
//! writes the heatmap in display order as JSON.

use async_trait::async_trait;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use crate::core::{RenderableHeatmap, TrackRef};
use crate::errors::PipelineError;

/// What a render backend produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedArtifact {
    /// A file written by the backend.
    Path(PathBuf),
    /// Encoded output held in memory.
    Bytes(Vec<u8>),
}

/// Draws a heatmap.
///
/// Errors are returned to the caller unchanged, wrapped as
/// [`PipelineError::Render`], and never retried.
#[async_trait]
pub trait RenderBackend: Send + Sync + fmt::Debug {
    /// Renders `heatmap` with `options`.
    async fn render(
        &self,
        heatmap: &RenderableHeatmap,
        options: &RenderOptions,
    ) -> anyhow::Result<RenderedArtifact>;
}

/// A track-name to display-name function.
#[derive(Clone)]
pub struct NameFn(Arc<dyn Fn(&str) -> String + Send + Sync>);

impl NameFn {
    /// Wraps `f`.
    pub fn new(f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }
}

impl fmt::Debug for NameFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NameFn(..)")
    }
}

/// How track names are shown.
#[derive(Debug, Clone, Default)]
pub enum DisplayNames {
    /// The track names verbatim.
    #[default]
    TrackNames,
    /// Track names without directories or extensions.
    Short,
    /// One name per track, in track order.
    Explicit(Vec<String>),
    /// Names looked up by track name, falling back to the track name.
    Lookup(HashMap<String, String>),
    /// Names computed from the track name.
    Function(NameFn),
}

impl DisplayNames {
    /// Resolves the display name of every track.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if an explicit list has the wrong length.
    pub fn resolve(&self, tracks: &[TrackRef]) -> Result<Vec<String>, PipelineError> {
        let names = tracks.iter().map(|t| t.name());
        Ok(match self {
            Self::TrackNames => names.map(str::to_string).collect(),
            Self::Short => names.map(short_name).collect(),
            Self::Explicit(list) => {
                if list.len() != tracks.len() {
                    return Err(PipelineError::invalid_configuration(format!(
                        "{} display names given for {} tracks",
                        list.len(),
                        tracks.len()
                    )));
                }
                list.clone()
            }
            Self::Lookup(map) => names
                .map(|n| map.get(n).cloned().unwrap_or_else(|| n.to_string()))
                .collect(),
            Self::Function(f) => names.map(|n| (f.0)(n)).collect(),
        })
    }
}

/// Strips directory components and trailing extensions from `name`.
///
/// `data/sample1.sorted.bam` becomes `sample1`.
#[must_use]
pub fn short_name(name: &str) -> String {
    static SHORT: OnceLock<Option<Regex>> = OnceLock::new();
    let re = SHORT.get_or_init(|| Regex::new(r"([^/\\]+?)(?:\.[^/\\.]+)*$").ok());

    re.as_ref()
        .and_then(|re| re.captures(name))
        .and_then(|caps| caps.get(1))
        .map_or_else(|| name.to_string(), |m| m.as_str().to_string())
}

/// Options passed through to the render backend.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Display-name override.
    pub display_names: DisplayNames,
    /// Pixel width of each track's column.
    pub column_width_px: u32,
    /// Draw lines between clusters.
    pub cluster_boundaries: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            display_names: DisplayNames::default(),
            column_width_px: 100,
            cluster_boundaries: true,
        }
    }
}

impl RenderOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the display-name override.
    #[must_use]
    pub fn with_display_names(mut self, names: DisplayNames) -> Self {
        self.display_names = names;
        self
    }

    /// Sets the column width.
    #[must_use]
    pub fn with_column_width(mut self, px: u32) -> Self {
        self.column_width_px = px;
        self
    }

    /// Turns cluster-boundary decoration on or off.
    #[must_use]
    pub fn with_cluster_boundaries(mut self, enabled: bool) -> Self {
        self.cluster_boundaries = enabled;
        self
    }

    /// Checks the options.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` for a zero column width.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.column_width_px == 0 {
            return Err(PipelineError::invalid_configuration(
                "column width must be positive",
            ));
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct JsonTrack<'a> {
    name: &'a str,
    display_name: &'a str,
    rows: Vec<&'a [f64]>,
}

#[derive(Serialize)]
struct JsonHeatmap<'a> {
    width: usize,
    column_width_px: u32,
    windows: Vec<String>,
    row_order: &'a [usize],
    clusters: Option<Vec<u32>>,
    cluster_boundaries: Vec<usize>,
    tracks: Vec<JsonTrack<'a>>,
}

/// Writes the normalized heatmap, in display order, as JSON.
#[derive(Debug, Clone, Default)]
pub struct JsonRenderBackend {
    output: Option<PathBuf>,
}

impl JsonRenderBackend {
    /// Returns the JSON as bytes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes the JSON to `path`.
    #[must_use]
    pub fn to_file(path: impl Into<PathBuf>) -> Self {
        Self {
            output: Some(path.into()),
        }
    }

    /// Encodes `heatmap` without writing it anywhere.
    ///
    /// # Errors
    ///
    /// Fails if a track has no normalized matrix.
    pub fn encode(heatmap: &RenderableHeatmap, options: &RenderOptions) -> anyhow::Result<Vec<u8>> {
        let order = heatmap.ordering.row_order.as_slice();
        let mut tracks = Vec::with_capacity(heatmap.tracks.len());
        for (track, display) in heatmap.tracks.iter().zip(&heatmap.display_names) {
            let rows = heatmap
                .ordered_rows(track.name())
                .ok_or_else(|| anyhow::anyhow!("track '{}' has no normalized matrix", track.name()))?;
            tracks.push(JsonTrack {
                name: track.name(),
                display_name: display,
                rows,
            });
        }

        let document = JsonHeatmap {
            width: heatmap.windows.width(),
            column_width_px: options.column_width_px,
            windows: order
                .iter()
                .filter_map(|&i| heatmap.windows.get(i))
                .map(ToString::to_string)
                .collect(),
            row_order: order,
            clusters: heatmap.ordered_clusters(),
            cluster_boundaries: if options.cluster_boundaries {
                heatmap.cluster_boundaries()
            } else {
                Vec::new()
            },
            tracks,
        };
        Ok(serde_json::to_vec_pretty(&document)?)
    }
}

#[async_trait]
impl RenderBackend for JsonRenderBackend {
    async fn render(
        &self,
        heatmap: &RenderableHeatmap,
        options: &RenderOptions,
    ) -> anyhow::Result<RenderedArtifact> {
        let bytes = Self::encode(heatmap, options)?;
        match self.output {
            Some(ref path) => {
                tokio::fs::write(path, &bytes).await?;
                Ok(RenderedArtifact::Path(path.clone()))
            }
            None => Ok(RenderedArtifact::Bytes(bytes)),
        }
    }
}
