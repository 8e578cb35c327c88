//! Benchmarks for heatmap builds.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

use signalflow::prelude::*;
use signalflow::testing::{synthetic_features, synthetic_track, TestPipeline};

fn request() -> HeatmapRequest {
    let features = synthetic_features(200, 400).unwrap();
    let tracks: Vec<TrackRef> = (0..3)
        .map(|i| Arc::new(synthetic_track(&format!("track{i}"), &features, 20, 50, i)) as TrackRef)
        .collect();
    HeatmapRequest::builder()
        .features(features)
        .tracks(tracks)
        .width(1_000)
        .smoothing(ExtendedReads::new(150).unwrap())
        .normalization(CountsPerMillion)
        .ordering(Clustering::new(ClusterCount::Fixed(4)).unwrap())
        .build()
        .unwrap()
}

fn pipeline_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let request = request();
    let options = RenderOptions::default();

    c.bench_function("cold_build", |b| {
        b.iter(|| {
            let harness = TestPipeline::in_memory().unwrap();
            let heatmap = rt.block_on(harness.pipeline.build(&request, &options)).unwrap();
            black_box(heatmap.row_count())
        });
    });

    let warm = TestPipeline::in_memory().unwrap();
    rt.block_on(warm.pipeline.build(&request, &options)).unwrap();
    c.bench_function("warm_build", |b| {
        b.iter(|| {
            let heatmap = rt.block_on(warm.pipeline.build(&request, &options)).unwrap();
            black_box(heatmap.row_count())
        });
    });

    c.bench_function("content_key", |b| {
        b.iter(|| black_box(signalflow::pipeline::StageKeys::for_request(&request)));
    });
}

criterion_group!(benches, pipeline_benchmark);
criterion_main!(benches);
