//! End-to-end properties of the heatmap pipeline.

use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;

use signalflow::pipeline::StageKeys;
use signalflow::prelude::*;
use signalflow::testing::{
    synthetic_features, synthetic_track, CountingTrack, FailingRenderBackend, FailingTrack,
    RecordingRenderBackend, SlowTrack, TestPipeline,
};

fn scenario_features() -> FeatureSet {
    FeatureSet::new(vec![
        Interval::new("chr1", 1_000, 1_400),
        Interval::new("chr1", 5_000, 7_000),
        Interval::new("chr1", 10_000, 10_050),
    ])
    .unwrap()
}

fn scenario_tracks() -> (InMemoryTrack, InMemoryTrack) {
    let treated = InMemoryTrack::new("treated.bam").with_read("chr1", Read::new(1_000, 100, Strand::Plus));
    let control = InMemoryTrack::new("control.bam")
        .with_read("chr1", Read::new(6_000, 50, Strand::Minus))
        .with_read("chr1", Read::new(10_000, 30, Strand::Plus));
    (treated, control)
}

fn scenario_request() -> HeatmapRequest {
    let (treated, control) = scenario_tracks();
    HeatmapRequest::builder()
        .features(scenario_features())
        .track(Arc::new(treated))
        .track(Arc::new(control))
        .width(500)
        .region(CenteredRegion)
        .ordering(TrackStatistic::new(0, RowStatistic::Sum))
        .build()
        .unwrap()
}

fn synthetic_request(names: &[&str]) -> HeatmapRequest {
    let features = synthetic_features(12, 300).unwrap();
    let tracks: Vec<TrackRef> = names
        .iter()
        .zip(1_u64..)
        .map(|(name, seed)| Arc::new(synthetic_track(name, &features, 8, 75, seed)) as TrackRef)
        .collect();
    HeatmapRequest::builder()
        .features(features)
        .tracks(tracks)
        .width(400)
        .normalization(ScaleToMeanTotal)
        .build()
        .unwrap()
}

fn restart_request(normalization: impl NormalizationStrategy + 'static) -> HeatmapRequest {
    let features = synthetic_features(30, 350).unwrap();
    let tracks: Vec<TrackRef> = ["input", "h3k4me3", "h3k27ac"]
        .iter()
        .zip(7_u64..)
        .map(|(name, seed)| Arc::new(synthetic_track(name, &features, 20, 60, seed)) as TrackRef)
        .collect();
    HeatmapRequest::builder()
        .features(features)
        .tracks(tracks)
        .width(400)
        .smoothing(ExtendedReads::new(150).unwrap())
        .normalization(normalization)
        .build()
        .unwrap()
}

fn assert_bit_equal(left: &MatrixSet, right: &MatrixSet) {
    assert_eq!(left.names().collect::<Vec<_>>(), right.names().collect::<Vec<_>>());
    for ((name, a), (_, b)) in left.iter().zip(right.iter()) {
        assert_eq!(a.shape(), b.shape(), "{name}");
        for (row, (x, y)) in a.iter_rows().zip(b.iter_rows()).enumerate() {
            let x: Vec<u64> = x.iter().map(|v| v.to_bits()).collect();
            let y: Vec<u64> = y.iter().map(|v| v.to_bits()).collect();
            assert_eq!(x, y, "{name} row {row}");
        }
    }
}

fn executions(pipeline: &HeatmapPipeline) -> [u64; 4] {
    StageKind::ALL.map(|stage| pipeline.engine().stats().executions(stage))
}

#[tokio::test]
async fn test_end_to_end_scenario() {
    let harness = TestPipeline::in_memory().unwrap();
    let heatmap = harness
        .pipeline
        .build(&scenario_request(), &RenderOptions::default())
        .await
        .unwrap();

    let windows: Vec<_> = heatmap.windows.iter().map(|w| (w.start, w.stop)).collect();
    assert_eq!(windows, vec![(950, 1_450), (5_750, 6_250), (9_775, 10_275)]);

    for (_, matrix) in heatmap.raw.iter() {
        assert_eq!(matrix.shape(), (3, 500));
    }
    for (_, matrix) in heatmap.normalized.iter() {
        assert_eq!(matrix.shape(), (3, 500));
    }

    // the last two rows tie at zero and keep their original order
    assert_eq!(heatmap.ordering.row_order.as_slice(), &[1, 2, 0]);
    assert!(heatmap.ordering.clusters.is_none());

    let treated = heatmap.raw.get("treated.bam").unwrap();
    assert!((treated.row(0).iter().sum::<f64>() - 100.0).abs() < f64::EPSILON);
    assert!(treated.row(1).iter().all(|&v| v == 0.0));
    assert_eq!(heatmap.display_names, vec!["treated.bam", "control.bam"]);
}

#[tokio::test]
async fn test_builds_are_deterministic() {
    let request = synthetic_request(&["a", "b"]);
    let options = RenderOptions::default();

    let first = TestPipeline::in_memory().unwrap();
    let second = TestPipeline::in_memory().unwrap();
    let a = first.pipeline.build(&request, &options).await.unwrap();
    let b = second.pipeline.build(&request, &options).await.unwrap();

    assert_eq!(a.raw, b.raw);
    assert_eq!(a.normalized, b.normalized);
    assert_eq!(a.ordering, b.ordering);
}

#[tokio::test]
async fn test_identical_requests_reuse_every_stage() {
    let (treated, control) = scenario_tracks();
    let counting = Arc::new(CountingTrack::new(Arc::new(treated)));
    let request = HeatmapRequest::builder()
        .features(scenario_features())
        .track(counting.clone())
        .track(Arc::new(control))
        .width(500)
        .build()
        .unwrap();

    let harness = TestPipeline::in_memory().unwrap();
    let options = RenderOptions::default();
    harness.pipeline.build(&request, &options).await.unwrap();
    let queries = counting.queries();
    harness.pipeline.build(&request, &options).await.unwrap();

    assert_eq!(executions(&harness.pipeline), [1, 2, 1, 1]);
    assert_eq!(counting.queries(), queries);
    assert_eq!(harness.events.count(EventKind::CacheHit), 5);
    assert_eq!(harness.events.count(EventKind::PipelineCompleted), 2);
}

#[tokio::test]
async fn test_changing_ordering_recomputes_only_ordering() {
    let harness = TestPipeline::in_memory().unwrap();
    let options = RenderOptions::default();
    let request = synthetic_request(&["a", "b"]);

    harness.pipeline.build(&request, &options).await.unwrap();
    let reordered = request
        .with_ordering(TrackStatistic::new(1, RowStatistic::Max))
        .unwrap();
    let heatmap = harness.pipeline.build(&reordered, &options).await.unwrap();

    assert_eq!(executions(&harness.pipeline), [1, 2, 1, 2]);
    assert!(heatmap.ordering.row_order.validate(12).is_ok());
}

#[tokio::test]
async fn test_adding_a_track_reuses_region_and_existing_smoothing() {
    let harness = TestPipeline::in_memory().unwrap();
    let options = RenderOptions::default();
    let request = synthetic_request(&["a", "b"]);
    harness.pipeline.build(&request, &options).await.unwrap();

    let features = synthetic_features(12, 300).unwrap();
    let wider = request
        .with_track(Arc::new(synthetic_track("c", &features, 8, 75, 99)))
        .unwrap();
    let heatmap = harness.pipeline.build(&wider, &options).await.unwrap();

    assert_eq!(executions(&harness.pipeline), [1, 3, 2, 2]);
    assert_eq!(heatmap.normalized.len(), 3);
}

#[tokio::test]
async fn test_overlapping_track_sets_share_smoothing() {
    let features = synthetic_features(12, 300).unwrap();
    let track = |name: &str, seed| -> TrackRef { Arc::new(synthetic_track(name, &features, 8, 75, seed)) };
    let (a, b, c) = (track("a", 1), track("b", 2), track("c", 3));
    let request = |tracks: Vec<TrackRef>| {
        HeatmapRequest::builder()
            .features(features.clone())
            .tracks(tracks)
            .width(400)
            .build()
            .unwrap()
    };

    let harness = TestPipeline::in_memory().unwrap();
    let options = RenderOptions::default();
    let first = harness
        .pipeline
        .build(&request(vec![a, b.clone()]), &options)
        .await
        .unwrap();
    let second_request = request(vec![b, c]);
    let second = harness.pipeline.build(&second_request, &options).await.unwrap();

    assert_eq!(executions(&harness.pipeline), [1, 3, 2, 2]);
    assert_eq!(first.raw.get("b"), second.raw.get("b"));

    let keys = StageKeys::for_request(&second_request);
    assert_eq!(harness.pipeline.engine().stats().executions_for(&keys.smoothing[0]), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_identical_builds_compute_once() {
    let (treated, control) = scenario_tracks();
    let slow: TrackRef = Arc::new(SlowTrack::new(Arc::new(treated), Duration::from_millis(20)));
    let request = HeatmapRequest::builder()
        .features(scenario_features())
        .track(slow)
        .track(Arc::new(control))
        .width(500)
        .build()
        .unwrap();

    let harness = TestPipeline::in_memory().unwrap();
    let options = RenderOptions::default();
    let (a, b, c, d) = tokio::join!(
        harness.pipeline.build(&request, &options),
        harness.pipeline.build(&request, &options),
        harness.pipeline.build(&request, &options),
        harness.pipeline.build(&request, &options),
    );

    let orderings: Vec<_> = [a, b, c, d]
        .into_iter()
        .map(|r| r.unwrap().ordering)
        .collect();
    assert!(orderings.windows(2).all(|w| w[0] == w[1]));
    assert_eq!(executions(&harness.pipeline), [1, 2, 1, 1]);
}

#[tokio::test]
async fn test_track_failure_is_reported_and_remembered() {
    let (treated, _) = scenario_tracks();
    let request = HeatmapRequest::builder()
        .features(scenario_features())
        .track(Arc::new(treated))
        .track(Arc::new(FailingTrack::new("missing.bam", "index not found")))
        .width(500)
        .build()
        .unwrap();

    let harness = TestPipeline::in_memory().unwrap();
    let options = RenderOptions::default();
    let err = harness.pipeline.build(&request, &options).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DependencyUnavailable);
    let ctx = err.context().unwrap();
    assert_eq!(ctx.stage.as_deref(), Some("smoothing"));
    assert_eq!(ctx.detail.get("track").map(String::as_str), Some("missing.bam"));

    let again = harness.pipeline.build(&request, &options).await.unwrap_err();
    assert_eq!(again.to_string(), err.to_string());

    let failing_key = &StageKeys::for_request(&request).smoothing[1];
    let engine = harness.pipeline.engine();
    assert_eq!(engine.stats().executions_for(failing_key), 1);
    assert!(!engine.store().contains(failing_key));
    assert!(engine.failure(failing_key).is_some());
    assert_eq!(engine.stats().executions(StageKind::Normalization), 0);
    assert_eq!(harness.backend.call_count(), 0);
}

#[tokio::test]
async fn test_disk_store_survives_restart() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = PipelineConfig::new().with_max_workers(2).with_cache_dir(dir.path());
    let request = scenario_request();
    let options = RenderOptions::default();

    let first = TestPipeline::new(config.clone()).unwrap();
    let original = first.pipeline.build(&request, &options).await.unwrap();
    assert_eq!(executions(&first.pipeline), [1, 2, 1, 1]);

    let second = TestPipeline::new(config).unwrap();
    let restored = second.pipeline.build(&request, &options).await.unwrap();

    assert_eq!(second.pipeline.engine().stats().total_executions(), 0);
    assert_eq!(second.events.count(EventKind::CacheHit), 5);
    assert_eq!(restored.raw, original.raw);
    assert_eq!(restored.normalized, original.normalized);
    assert_eq!(restored.ordering, original.ordering);
}

async fn check_restart_reproduces(request: HeatmapRequest) {
    let options = RenderOptions::default();
    let fresh = TestPipeline::in_memory()
        .unwrap()
        .pipeline
        .build(&request, &options)
        .await
        .unwrap();

    let dir = tempfile::TempDir::new().unwrap();
    let config = PipelineConfig::new().with_max_workers(3).with_cache_dir(dir.path());
    let cold = TestPipeline::new(config.clone()).unwrap();
    let computed = cold.pipeline.build(&request, &options).await.unwrap();
    drop(cold);

    let warm = TestPipeline::new(config).unwrap();
    let restored = warm.pipeline.build(&request, &options).await.unwrap();
    assert_eq!(warm.pipeline.engine().stats().total_executions(), 0);

    for heatmap in [&computed, &restored] {
        assert_bit_equal(&heatmap.raw, &fresh.raw);
        assert_bit_equal(&heatmap.normalized, &fresh.normalized);
        assert_eq!(heatmap.ordering, fresh.ordering);
    }
}

#[tokio::test]
async fn test_restart_reproduces_counts_per_million() {
    check_restart_reproduces(restart_request(CountsPerMillion)).await;
}

#[tokio::test]
async fn test_restart_reproduces_log2() {
    check_restart_reproduces(restart_request(Log2::new(1.0).unwrap())).await;
}

fn anchored_request() -> HeatmapRequest {
    let (treated, control) = scenario_tracks();
    HeatmapRequest::builder()
        .features(scenario_features())
        .track(Arc::new(treated))
        .track(Arc::new(control))
        .width(500)
        .region(AnchoredRegion)
        .ordering(TrackStatistic::new(0, RowStatistic::Sum))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_anchored_windows_start_at_feature_start() {
    let harness = TestPipeline::in_memory().unwrap();
    let heatmap = harness
        .pipeline
        .build(&anchored_request(), &RenderOptions::default())
        .await
        .unwrap();

    let windows: Vec<_> = heatmap.windows.iter().map(|w| (w.start, w.stop)).collect();
    assert_eq!(windows, vec![(1_000, 1_500), (5_000, 5_500), (10_000, 10_500)]);

    let treated = heatmap.raw.get("treated.bam").unwrap();
    assert!(treated.row(0)[..100].iter().all(|&v| v == 1.0));
    assert!(treated.row(0)[100..].iter().all(|&v| v == 0.0));

    // the control read at 6000 falls past the second window
    let control = heatmap.raw.get("control.bam").unwrap();
    assert!(control.row(1).iter().all(|&v| v == 0.0));
    assert!((control.row(2).iter().sum::<f64>() - 30.0).abs() < f64::EPSILON);
    assert_eq!(heatmap.ordering.row_order.as_slice(), &[1, 2, 0]);
}

#[tokio::test]
async fn test_region_change_invalidates_every_stage() {
    let centered = scenario_request();
    let request = HeatmapRequest::builder()
        .features(Arc::clone(centered.features()))
        .tracks(centered.tracks().iter().cloned())
        .width(500)
        .region(AnchoredRegion)
        .ordering(TrackStatistic::new(0, RowStatistic::Sum))
        .build()
        .unwrap();

    let before = StageKeys::for_request(&centered);
    let after = StageKeys::for_request(&request);
    assert_ne!(before.region, after.region);
    for (a, b) in before.smoothing.iter().zip(&after.smoothing) {
        assert_ne!(a, b);
    }
    assert_ne!(before.normalization, after.normalization);
    assert_ne!(before.ordering, after.ordering);

    let harness = TestPipeline::in_memory().unwrap();
    let options = RenderOptions::default();
    let first = harness.pipeline.build(&centered, &options).await.unwrap();
    let second = harness.pipeline.build(&request, &options).await.unwrap();

    assert_eq!(executions(&harness.pipeline), [2, 4, 2, 2]);
    assert_eq!(harness.events.count(EventKind::CacheHit), 0);
    assert_ne!(first.raw, second.raw);
}

#[tokio::test]
async fn test_evicting_through_pipeline_recomputes() {
    let harness = TestPipeline::in_memory().unwrap();
    let request = synthetic_request(&["a", "b", "c"]);
    let options = RenderOptions::default();
    let original = harness.pipeline.build(&request, &options).await.unwrap();
    assert_eq!(executions(&harness.pipeline), [1, 3, 1, 1]);

    let keys = StageKeys::for_request(&request);
    let engine = harness.pipeline.engine();
    assert!(engine.evict(&keys.smoothing[1]).unwrap());
    assert!(!engine.store().contains(&keys.smoothing[1]));

    // downstream artifacts stay stored under unchanged keys
    harness.pipeline.build(&request, &options).await.unwrap();
    assert_eq!(executions(&harness.pipeline), [1, 4, 1, 1]);

    assert_eq!(harness.pipeline.evict(&request).unwrap(), keys.iter().count());
    assert!(keys.iter().all(|key| !engine.store().contains(key)));
    assert_eq!(harness.pipeline.evict(&request).unwrap(), 0);

    let rebuilt = harness.pipeline.build(&request, &options).await.unwrap();
    assert_eq!(executions(&harness.pipeline), [2, 7, 2, 2]);
    assert_eq!(rebuilt.normalized, original.normalized);
    assert_eq!(rebuilt.ordering, original.ordering);
}

#[tokio::test]
async fn test_invalid_configuration_surfaces_before_running() {
    let harness = TestPipeline::in_memory().unwrap();

    let err = HeatmapRequest::builder()
        .features(scenario_features())
        .track(Arc::new(InMemoryTrack::new("a")))
        .width(0)
        .build()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);

    let options = RenderOptions::new().with_display_names(DisplayNames::Explicit(vec!["one".into()]));
    let err = harness
        .pipeline
        .build(&scenario_request(), &options)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
    assert_eq!(harness.pipeline.engine().stats().total_executions(), 0);
}

#[tokio::test]
async fn test_render_hands_heatmap_to_backend() {
    let harness = TestPipeline::in_memory().unwrap();
    let options = RenderOptions::new().with_display_names(DisplayNames::Short);

    let rendered = harness
        .pipeline
        .render(&scenario_request(), &options)
        .await
        .unwrap();

    let RenderedArtifact::Bytes(bytes) = rendered else {
        panic!("expected bytes");
    };
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["row_order"], serde_json::json!([1, 2, 0]));
    assert_eq!(json["tracks"][0]["display_name"], "treated");
    assert_eq!(harness.backend.call_count(), 1);
}

#[tokio::test]
async fn test_backend_errors_surface_as_render_errors() {
    let store: Arc<dyn ArtifactStore> = Arc::new(InMemoryArtifactStore::new());
    let pipeline = HeatmapPipeline::with_store(
        PipelineConfig::new(),
        store,
        Arc::new(FailingRenderBackend::new("disk full")),
    )
    .unwrap();

    let err = pipeline
        .render(&scenario_request(), &RenderOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Render);
    assert!(err.to_string().contains("disk full"));
}

#[tokio::test]
async fn test_clustered_heatmap() {
    let request = synthetic_request(&["a", "b"])
        .with_ordering(
            Clustering::new(ClusterCount::Fixed(3))
                .unwrap()
                .with_seed(11),
        )
        .unwrap();

    let harness = TestPipeline::in_memory().unwrap();
    let heatmap = harness
        .pipeline
        .build(&request, &RenderOptions::default())
        .await
        .unwrap();

    let clusters = heatmap.ordering.clusters.clone().unwrap();
    assert_eq!(clusters.len(), 12);
    assert!(heatmap.ordering.row_order.validate(12).is_ok());

    // displayed cluster ids never decrease
    let displayed = heatmap.ordered_clusters().unwrap();
    assert!(displayed.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(displayed[0], 0);
}

#[tokio::test]
async fn test_recording_backend_sees_every_render() {
    let backend = Arc::new(RecordingRenderBackend::new());
    let pipeline = HeatmapPipeline::new(PipelineConfig::new(), backend.clone()).unwrap();
    let request = scenario_request();

    pipeline.render(&request, &RenderOptions::default()).await.unwrap();
    pipeline.render(&request, &RenderOptions::default()).await.unwrap();

    let rendered = backend.rendered();
    assert_eq!(rendered.len(), 2);
    assert_eq!(rendered[0].ordering, rendered[1].ordering);
}
