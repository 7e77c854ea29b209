// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use canopy_core::{
    Layer, LayerCommon, LayerFeatures, LayerHandle, NodeFlags, NodeHandle, Ui,
};
use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use kurbo::{Size, Vec2};

/// Minimal event layer, enough to give the partitioner data to chew on.
struct BenchLayer {
    common: LayerCommon,
}

impl BenchLayer {
    fn new(handle: LayerHandle) -> Self {
        Self {
            common: LayerCommon::new(handle),
        }
    }
}

impl Layer for BenchLayer {
    fn common(&self) -> &LayerCommon {
        &self.common
    }

    fn common_mut(&mut self) -> &mut LayerCommon {
        &mut self.common
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }

    fn features(&self) -> LayerFeatures {
        LayerFeatures::EVENT | LayerFeatures::DRAW
    }
}

/// Builds a UI with `roots` top-level hierarchies of `depth` nested nodes
/// each, one layer data per leaf.
fn build_ui(roots: usize, depth: usize) -> Ui {
    let mut ui = Ui::with_size(Size::new(1920.0, 1080.0)).expect("non-zero size");
    let layer = ui.create_layer(None).expect("layer capacity");
    let mut instance = BenchLayer::new(layer);

    for root in 0..roots {
        let mut parent: Option<NodeHandle> = None;
        for level in 0..depth {
            let offset = if level == 0 {
                Vec2::new((root % 64) as f64 * 30.0, (root / 64) as f64 * 30.0)
            } else {
                Vec2::new(1.0, 1.0)
            };
            let flags = if level % 4 == 3 {
                NodeFlags::CLIP
            } else {
                NodeFlags::empty()
            };
            let node = ui
                .create_node(parent, offset, Size::new(28.0, 28.0), flags)
                .expect("node capacity");
            parent = Some(node);
        }
        instance
            .common_mut()
            .create_data(parent)
            .expect("data capacity");
    }
    ui.set_layer_instance(Box::new(instance)).expect("fresh slot");
    ui
}

fn bench_full_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("ui_update_full");
    for (roots, depth) in [(100, 4), (1_000, 4), (1_000, 16)] {
        group.bench_function(format!("roots_{roots}_depth_{depth}"), |b| {
            b.iter_batched(
                || build_ui(roots, depth),
                |mut ui| {
                    ui.update().expect("size is set");
                    ui
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_incremental_offset_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("ui_update_offset_only");
    for (roots, depth) in [(1_000, 4)] {
        let mut ui = build_ui(roots, depth);
        ui.update().expect("size is set");
        let moved = ui.node_order_first().expect("has roots");
        group.bench_function(format!("roots_{roots}_depth_{depth}"), |b| {
            b.iter(|| {
                ui.set_node_offset(moved, Vec2::new(3.0, 3.0))
                    .expect("live node");
                ui.update().expect("size is set");
                black_box(&ui);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_full_update, bench_incremental_offset_update);
criterion_main!(benches);
