//! Request assembly, the pipeline driver and the render boundary.

mod driver;
mod render;
mod request;

pub use driver::{HeatmapPipeline, StageKeys};
pub use render::{
    short_name, DisplayNames, JsonRenderBackend, NameFn, RenderBackend, RenderOptions,
    RenderedArtifact,
};
pub use request::{HeatmapRequest, HeatmapRequestBuilder};
