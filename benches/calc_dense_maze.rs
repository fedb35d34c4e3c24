//! Measure a dense FlowField build for a grid with a snake-like maze of
//! impassable cells running up and down the entire grid.
//!
//! ```txt
//!  _____________________________
//! |__|__|__|xx|__|__|__|xx|__|__|
//! |__|xx|__|xx|__|xx|__|xx|__|xx|
//! |__|xx|__|xx|__|xx|__|xx|__|xx|
//! |__|xx|__|xx|__|xx|__|xx|__|xx|
//! |__|xx|__|__|__|xx|__|__|__|xx|
//! ```
//!

use bevy_dynamic_flowfield_plugin::prelude::*;
use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// Create a grid where every odd column is a wall with a gap alternating
/// between the top and bottom row
fn prepare_field(columns: u32, rows: u32) -> DenseFlowField {
	let mut field = DenseFlowField::new(FlowFieldSettings::new(columns, rows, 1.0)).unwrap();
	for column in (1..columns as i32).step_by(2) {
		let gap = if (column / 2) % 2 == 0 { 0 } else { rows as i32 - 1 };
		for row in 0..rows as i32 {
			if row != gap {
				field.set_cell_weight(FieldCell::new(column, row), 0);
			}
		}
	}
	field
}

/// Solve from one side of the maze to the other
fn flow_maze(mut field: DenseFlowField, destination: FieldCell) {
	field.build(destination).unwrap();
}

pub fn criterion_benchmark(c: &mut Criterion) {
	let mut group = c.benchmark_group("algorithm_use");
	group.significance_level(0.05).sample_size(100);
	let field = prepare_field(200, 200);
	group.bench_function("calc_dense_maze", |b| {
		b.iter(|| flow_maze(black_box(field.clone()), black_box(FieldCell::new(0, 0))))
	});
	group.finish();
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
