//! Heatmap requests and their validating builder.

use std::collections::HashSet;
use std::sync::Arc;

use crate::core::{FeatureSet, TrackRef};
use crate::errors::PipelineError;
use crate::strategies::{
    AsIs, CenteredRegion, IdentityNormalization, NormalizationStrategy, OrderingStrategy,
    ReadCount, RegionStrategy, SmoothingStrategy,
};

/// Everything needed to compute one heatmap.
///
/// Built with [`HeatmapRequest::builder`], which checks the configuration
/// before any job runs.
#[derive(Debug, Clone)]
pub struct HeatmapRequest {
    features: Arc<FeatureSet>,
    tracks: Vec<TrackRef>,
    width: i64,
    region: Arc<dyn RegionStrategy>,
    smoothing: Arc<dyn SmoothingStrategy>,
    normalization: Arc<dyn NormalizationStrategy>,
    ordering: Arc<dyn OrderingStrategy>,
}

impl HeatmapRequest {
    /// Starts a request.
    #[must_use]
    pub fn builder() -> HeatmapRequestBuilder {
        HeatmapRequestBuilder::default()
    }

    /// The features, one heatmap row each.
    #[must_use]
    pub fn features(&self) -> &Arc<FeatureSet> {
        &self.features
    }

    /// The tracks, one heatmap column each.
    #[must_use]
    pub fn tracks(&self) -> &[TrackRef] {
        &self.tracks
    }

    /// Window width in bases.
    #[must_use]
    pub fn width(&self) -> i64 {
        self.width
    }

    /// The region strategy.
    #[must_use]
    pub fn region(&self) -> &Arc<dyn RegionStrategy> {
        &self.region
    }

    /// The smoothing strategy.
    #[must_use]
    pub fn smoothing(&self) -> &Arc<dyn SmoothingStrategy> {
        &self.smoothing
    }

    /// The normalization strategy.
    #[must_use]
    pub fn normalization(&self) -> &Arc<dyn NormalizationStrategy> {
        &self.normalization
    }

    /// The ordering strategy.
    #[must_use]
    pub fn ordering(&self) -> &Arc<dyn OrderingStrategy> {
        &self.ordering
    }

    /// The same request with another ordering strategy.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the strategy does not fit the tracks.
    pub fn with_ordering(&self, ordering: impl OrderingStrategy + 'static) -> Result<Self, PipelineError> {
        ordering.validate(self.tracks.len())?;
        Ok(Self {
            ordering: Arc::new(ordering),
            ..self.clone()
        })
    }

    /// The same request with one more track.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the name is already used.
    pub fn with_track(&self, track: TrackRef) -> Result<Self, PipelineError> {
        let mut tracks = self.tracks.clone();
        tracks.push(track);
        check_tracks(&tracks)?;
        Ok(Self {
            tracks,
            ..self.clone()
        })
    }
}

fn check_tracks(tracks: &[TrackRef]) -> Result<(), PipelineError> {
    if tracks.is_empty() {
        return Err(PipelineError::invalid_configuration(
            "a heatmap needs at least one track",
        ));
    }
    let mut seen = HashSet::new();
    for track in tracks {
        if !seen.insert(track.name()) {
            return Err(PipelineError::invalid_configuration(format!(
                "track name '{}' is used more than once",
                track.name()
            )));
        }
    }
    Ok(())
}

/// Builder for [`HeatmapRequest`].
#[derive(Debug, Default)]
pub struct HeatmapRequestBuilder {
    features: Option<Arc<FeatureSet>>,
    tracks: Vec<TrackRef>,
    width: Option<i64>,
    region: Option<Arc<dyn RegionStrategy>>,
    smoothing: Option<Arc<dyn SmoothingStrategy>>,
    normalization: Option<Arc<dyn NormalizationStrategy>>,
    ordering: Option<Arc<dyn OrderingStrategy>>,
}

impl HeatmapRequestBuilder {
    /// Sets the features.
    #[must_use]
    pub fn features(mut self, features: impl Into<Arc<FeatureSet>>) -> Self {
        self.features = Some(features.into());
        self
    }

    /// Adds a track.
    #[must_use]
    pub fn track(mut self, track: TrackRef) -> Self {
        self.tracks.push(track);
        self
    }

    /// Adds several tracks.
    #[must_use]
    pub fn tracks(mut self, tracks: impl IntoIterator<Item = TrackRef>) -> Self {
        self.tracks.extend(tracks);
        self
    }

    /// Sets the window width.
    #[must_use]
    pub fn width(mut self, width: i64) -> Self {
        self.width = Some(width);
        self
    }

    /// Sets the region strategy. Defaults to [`CenteredRegion`].
    #[must_use]
    pub fn region(mut self, strategy: impl RegionStrategy + 'static) -> Self {
        self.region = Some(Arc::new(strategy));
        self
    }

    /// Sets the smoothing strategy. Defaults to [`ReadCount`].
    #[must_use]
    pub fn smoothing(mut self, strategy: impl SmoothingStrategy + 'static) -> Self {
        self.smoothing = Some(Arc::new(strategy));
        self
    }

    /// Sets the normalization strategy. Defaults to [`IdentityNormalization`].
    #[must_use]
    pub fn normalization(mut self, strategy: impl NormalizationStrategy + 'static) -> Self {
        self.normalization = Some(Arc::new(strategy));
        self
    }

    /// Sets the ordering strategy. Defaults to [`AsIs`].
    #[must_use]
    pub fn ordering(mut self, strategy: impl OrderingStrategy + 'static) -> Self {
        self.ordering = Some(Arc::new(strategy));
        self
    }

    /// Validates and builds the request.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if the features or width are missing,
    /// the width is not positive, there are no tracks, two tracks share a
    /// name, or the ordering strategy does not fit the tracks.
    pub fn build(self) -> Result<HeatmapRequest, PipelineError> {
        let features = self
            .features
            .ok_or_else(|| PipelineError::invalid_configuration("no features given"))?;
        let width = self
            .width
            .ok_or_else(|| PipelineError::invalid_configuration("no window width given"))?;
        if width <= 0 {
            return Err(PipelineError::invalid_configuration(format!(
                "window width must be positive, got {width}"
            )));
        }
        check_tracks(&self.tracks)?;

        let ordering = self.ordering.unwrap_or_else(|| Arc::new(AsIs));
        ordering.validate(self.tracks.len())?;

        Ok(HeatmapRequest {
            features,
            tracks: self.tracks,
            width,
            region: self.region.unwrap_or_else(|| Arc::new(CenteredRegion)),
            smoothing: self.smoothing.unwrap_or_else(|| Arc::new(ReadCount)),
            normalization: self
                .normalization
                .unwrap_or_else(|| Arc::new(IdentityNormalization)),
            ordering,
        })
    }
}
