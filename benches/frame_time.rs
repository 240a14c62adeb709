//! Renderer benchmarks.
//!
//! CPU-side work done per frame (transform derivation, simulation stepping)
//! and once per bring-up (staging layout, mesh expansion). None of these need
//! a Vulkan driver.

use std::time::Duration;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use vfighter::prelude::*;
use vfighter::renderer::geometry::NormalVertex;
use vfighter::renderer::upload::StagingPlan;

/// Per-frame matrix work: model, view and projection for one draw.
fn transform_derivation(c: &mut Criterion) {
    let mut group = c.benchmark_group("transforms");

    let scene = Scene::default();
    group.bench_function("scene_transforms_16x9", |b| b.iter(|| scene.transforms(16.0 / 9.0)));

    group.bench_function("spinner_step_and_transforms", |b| {
        let mut spinner = Spinner::default();
        b.iter(|| {
            spinner.step(1);
            spinner.scene().transforms(1600.0 / 900.0)
        })
    });

    group.finish();
}

/// Fixed-timestep accumulation at a range of frame times.
fn timestep_accumulation(c: &mut Criterion) {
    let mut group = c.benchmark_group("fixed_timestep");

    for micros in [4_167u64, 16_667, 33_333] {
        group.bench_with_input(BenchmarkId::new("advance", micros), &micros, |b, &micros| {
            let mut timestep = FixedTimestep::default();
            let frame = Duration::from_micros(micros);
            b.iter(|| timestep.advance(frame))
        });
    }

    group.finish();
}

/// Bring-up costs that scale with geometry size.
fn static_upload_preparation(c: &mut Criterion) {
    let mut group = c.benchmark_group("static_upload");

    group.bench_function("pack_quad_payloads", |b| {
        let quad = StaticGeometry::demo_quad();
        let index_bytes = quad.index_bytes().map_or(0, <[u8]>::len);
        let sizes = [index_bytes as u64, quad.vertex_bytes().len() as u64, 48];
        b.iter(|| StagingPlan::pack(&sizes, 1 << 20))
    });

    for triangles in [100usize, 10_000] {
        group.bench_with_input(BenchmarkId::new("mesh_geometry", triangles), &triangles, |b, &n| {
            let vertices: Vec<NormalVertex> = (0..n * 3)
                .map(|i| NormalVertex {
                    position: [i as f32, 0.0, 1.0],
                    normal: [0.0, 0.0, -1.0],
                })
                .collect();
            b.iter(|| StaticGeometry::mesh(&vertices))
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    transform_derivation,
    timestep_accumulation,
    static_upload_preparation
);
criterion_main!(benches);
