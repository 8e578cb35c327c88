//! Region strategies: feature set to fixed-width windows.

use serde_json::json;

use super::{Strategy, StrategyIdentity};
use crate::core::{FeatureSet, Interval, WindowSet};
use crate::errors::PipelineError;

/// Turns every feature into one window of width `width`, in feature order.
pub trait RegionStrategy: Strategy {
    /// Places the window for a single feature.
    fn place(&self, feature: &Interval, width: i64) -> Interval;

    /// Produces the window set for `features`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` if `width <= 0`.
    fn windows(&self, features: &FeatureSet, width: i64) -> Result<WindowSet, PipelineError> {
        let w = checked_width(width)?;
        let windows = features.iter().map(|f| self.place(f, width)).collect();
        WindowSet::new(w, windows)
    }
}

fn checked_width(width: i64) -> Result<usize, PipelineError> {
    if width <= 0 {
        return Err(PipelineError::invalid_configuration(format!(
            "window width must be positive, got {width}"
        )));
    }
    usize::try_from(width)
        .map_err(|_| PipelineError::invalid_configuration("window width is too large"))
}

/// Centers each window on its feature's midpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct CenteredRegion;

impl Strategy for CenteredRegion {
    fn identity(&self) -> StrategyIdentity {
        StrategyIdentity::new("centered", 1)
    }
}

impl RegionStrategy for CenteredRegion {
    fn place(&self, feature: &Interval, width: i64) -> Interval {
        let start = feature.midpoint() - width / 2;
        Interval::new(feature.chrom.clone(), start, start + width)
    }
}

/// Anchors each window at its feature's start, truncating or padding the
/// far end.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnchoredRegion;

impl Strategy for AnchoredRegion {
    fn identity(&self) -> StrategyIdentity {
        StrategyIdentity::new("anchored", 1).with_params(json!({ "anchor": "start" }))
    }
}

impl RegionStrategy for AnchoredRegion {
    fn place(&self, feature: &Interval, width: i64) -> Interval {
        Interval::new(feature.chrom.clone(), feature.start, feature.start + width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use pretty_assertions::assert_eq;

    fn features() -> FeatureSet {
        FeatureSet::new(vec![
            Interval::new("chr1", 1000, 1400),
            Interval::new("chr1", 5000, 7000),
            Interval::new("chr2", 10, 60),
        ])
        .unwrap()
    }

    #[test]
    fn test_centered_windows() {
        let windows = CenteredRegion.windows(&features(), 500).unwrap();
        let got: Vec<_> = windows.iter().cloned().collect();

        assert_eq!(
            got,
            vec![
                Interval::new("chr1", 950, 1450),
                Interval::new("chr1", 5750, 6250),
                Interval::new("chr2", -215, 285),
            ]
        );
        assert_eq!(windows.width(), 500);
    }

    #[test]
    fn test_anchored_windows() {
        let windows = AnchoredRegion.windows(&features(), 500).unwrap();
        let got: Vec<_> = windows.iter().map(|w| (w.start, w.stop)).collect();
        assert_eq!(got, vec![(1000, 1500), (5000, 5500), (10, 510)]);
    }

    #[test]
    fn test_non_positive_width_rejected() {
        for width in [0, -5] {
            let err = CenteredRegion.windows(&features(), width).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
        }
    }

    #[test]
    fn test_zero_length_feature() {
        let fs = FeatureSet::new(vec![Interval::new("chr1", 100, 100)]).unwrap();
        let windows = CenteredRegion.windows(&fs, 10).unwrap();
        assert_eq!(windows.get(0), Some(&Interval::new("chr1", 95, 105)));
    }

    #[test]
    fn test_strategies_have_distinct_identities() {
        assert_ne!(CenteredRegion.identity(), AnchoredRegion.identity());
    }
}
