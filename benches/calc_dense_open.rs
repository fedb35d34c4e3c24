//! Measure a dense FlowField build across a large grid of open ground.
//!
//! The destination sits in the top right corner so the wavefront has to cross
//! the whole grid
//!

use bevy::prelude::*;
use bevy_dynamic_flowfield_plugin::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// Create a field of open ground
fn prepare_field(columns: u32, rows: u32) -> DenseFlowField {
	DenseFlowField::new(FlowFieldSettings::new(columns, rows, 1.0)).unwrap()
}

/// Solve towards the far corner
fn flow_open(mut field: DenseFlowField, destination: FieldCell) {
	field.build(destination).unwrap();
}

pub fn criterion_benchmark(c: &mut Criterion) {
	let mut group = c.benchmark_group("algorithm_use");
	group.significance_level(0.05).sample_size(100);
	let field = prepare_field(200, 200);
	let destination = FieldCell::new(199, 199);
	group.bench_function("calc_dense_open", |b| {
		b.iter(|| flow_open(black_box(field.clone()), black_box(destination)))
	});
	// direction lookups are what agents pay every frame
	let mut built = field.clone();
	built.build(destination).unwrap();
	group.bench_function("sample_dense_open", |b| {
		b.iter(|| built.get_direction_for_world_position(black_box(Vec3::new(12.5, 150.5, 0.0))))
	});
	group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
