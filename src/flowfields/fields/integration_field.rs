//! The IntegrationField contains a 2D array of `f32` values and it uses a
//! [WeightField] to produce the cumulative cost of reaching the destination.
//!
//! When a new destination needs to be processed the field is reset to
//! [UNREACHED_COST] and the cell containing the destination is set to `0`.
//! The wavefront then expands as a Dijkstra search:
//!
//! 1. The cheapest cell is popped from a min-priority open set, stale entries
//!    (a cheaper cost was recorded after they were pushed) are skipped
//! 2. Each neighbour (orthogonal, plus diagonal when enabled) that lies inside
//!    the grid and has a non-zero weight is considered
//! 3. The cost of stepping into the neighbour is derived from its weight, see
//!    [FlowFieldSettings::step_cost_into]
//! 4. If the popped cost plus the step cost improves on the neighbour it is
//!    recorded and the neighbour is pushed onto the open set
//!
//! With uniform weights and diagonals disabled this produces a diamond-like
//! pattern as the wave expands:
//!
//! ```text
//!  _____________________________
//! |     |     |     |     |     |
//! |  3  |  2  |  1  |  2  |  3  |
//! |_____|_____|_____|_____|_____|
//! |     |     |     |     |     |
//! |  2  |  1  |  0  |  1  |  2  |
//! |_____|_____|_____|_____|_____|
//! |     |     |     |     |     |
//! |  3  |  2  |  1  |  2  |  3  |
//! |_____|_____|_____|_____|_____|
//! ```
//!
//! A diagonal step is never taken when both of the orthogonal cells it would
//! slip between are blocked, so the wave cannot squeeze through the corner of
//! two walls.
//!

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::prelude::*;
use bevy::prelude::*;

/// Accumulated cost to the destination of every cell of a dense grid
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Clone, Debug, PartialEq, Reflect)]
pub struct IntegrationField {
	/// Number of `(columns, rows)`
	dimensions: UVec2,
	/// Row-major costs
	costs: Vec<f32>,
}

impl Default for IntegrationField {
	fn default() -> Self {
		IntegrationField::new(UVec2::ONE)
	}
}

impl Field<f32> for IntegrationField {
	/// Get a reference to the field array
	fn get(&self) -> &[f32] {
		&self.costs
	}
	/// Number of `(columns, rows)` in the field
	fn get_dimensions(&self) -> UVec2 {
		self.dimensions
	}
	/// Retrieve a field cell value, out of bounds cells are unreached
	fn get_field_cell_value(&self, field_cell: FieldCell) -> f32 {
		match linear_index(self.dimensions, field_cell) {
			Some(i) => self.costs[i],
			None => UNREACHED_COST,
		}
	}
	/// Set a field cell to a value
	fn set_field_cell_value(&mut self, value: f32, field_cell: FieldCell) {
		if let Some(i) = linear_index(self.dimensions, field_cell) {
			self.costs[i] = value;
		}
	}
}

/// An entry of the open set, ordered so that [BinaryHeap] pops the cheapest cell first
#[derive(Clone, Copy, Debug)]
struct OpenCell {
	/// Cost recorded when the cell was pushed
	cost: f32,
	/// The cell
	field_cell: FieldCell,
}

impl PartialEq for OpenCell {
	fn eq(&self, other: &Self) -> bool {
		self.cmp(other) == Ordering::Equal
	}
}

impl Eq for OpenCell {}

impl PartialOrd for OpenCell {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for OpenCell {
	fn cmp(&self, other: &Self) -> Ordering {
		// reversed to turn the max-heap into a min-heap
		other
			.cost
			.total_cmp(&self.cost)
			.then_with(|| other.field_cell.cmp(&self.field_cell))
	}
}

impl IntegrationField {
	/// Creates a new [IntegrationField] where all cells are set to [UNREACHED_COST]
	pub fn new(dimensions: UVec2) -> Self {
		IntegrationField {
			dimensions,
			costs: vec![UNREACHED_COST; cell_count(dimensions)],
		}
	}
	/// Reset all the cells of the [IntegrationField] to [UNREACHED_COST] apart
	/// from the `destination` which is set to `0`
	pub fn reset(&mut self, destination: FieldCell) {
		self.costs.fill(UNREACHED_COST);
		self.set_field_cell_value(0.0, destination);
	}
	/// Whether the wavefront reached `field_cell`
	pub fn is_reached(&self, field_cell: FieldCell) -> bool {
		self.get_field_cell_value(field_cell) < UNREACHED_COST
	}
	/// From the `destination` expand a wavefront over the `weight_field`
	/// recording the cheapest cost of reaching the destination from each cell.
	/// The field should have been [IntegrationField::reset] beforehand
	pub fn calculate_field(
		&mut self,
		destination: FieldCell,
		weight_field: &WeightField,
		settings: &FlowFieldSettings,
	) {
		let mut open = BinaryHeap::new();
		open.push(OpenCell {
			cost: self.get_field_cell_value(destination),
			field_cell: destination,
		});
		let offsets = neighbour_offsets(settings.allow_diagonal);
		while let Some(OpenCell { cost, field_cell }) = open.pop() {
			let recorded = self.get_field_cell_value(field_cell);
			if cost > recorded + COST_EPSILON {
				continue;
			}
			for offset in offsets.iter() {
				let neighbour = field_cell.offset(*offset);
				let weight = weight_field.get_field_cell_value(neighbour);
				// ignore impassable and out of bounds cells
				if weight == BLOCKED_WEIGHT {
					continue;
				}
				if is_corner_blocked(field_cell, *offset, weight_field) {
					continue;
				}
				let candidate = recorded + settings.step_cost_into(*offset, weight);
				if candidate + COST_EPSILON < self.get_field_cell_value(neighbour) {
					self.set_field_cell_value(candidate, neighbour);
					open.push(OpenCell {
						cost: candidate,
						field_cell: neighbour,
					});
				}
			}
		}
	}
}

/// A diagonal step from `field_cell` along `offset` would cut between two
/// blocked orthogonal cells
pub fn is_corner_blocked(field_cell: FieldCell, offset: IVec2, weight_field: &WeightField) -> bool {
	if !is_diagonal(offset) {
		return false;
	}
	let horizontal = field_cell.offset(IVec2::new(offset.x, 0));
	let vertical = field_cell.offset(IVec2::new(0, offset.y));
	!weight_field.is_walkable(horizontal) && !weight_field.is_walkable(vertical)
}
