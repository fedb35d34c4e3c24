//! The FlowField contains a 2D array of unit direction vectors derived from
//! the cost gradient of an [IntegrationField]. An actor standing in a cell
//! reads its vector and moves along it to descend towards the destination:
//!
//! ```text
//!  _______________________________
//! |     |     |     |     |     |
//! |  ↘  |  ↘  |  x  |  ↘  |  ↓  |
//! |_____|_____|_____|_____|_____|
//! |     |     |     |     |     |
//! |  →  |  →  |  →  |  →  |  D  |
//! |_____|_____|_____|_____|_____|
//! |     |     |     |     |     |
//! |  ↗  |  ↗  |  x  |  ↗  |  ↑  |
//! |_____|_____|_____|_____|_____|
//! ```
//!
//! For each reached cell the neighbour with the lowest integration cost is
//! the steepest descent. When smoothing is enabled every cheaper neighbour
//! contributes its offset scaled by how much cheaper it is and the normalised
//! sum is used instead, which gives actors diagonal-ish headings across open
//! ground rather than a staircase. Unreached cells and the destination itself
//! have a zero vector.
//!
//! Only the unsmoothed steepest descent guarantees that a vector never points
//! into an impassable cell. A blended heading is continuous, so beside a wall
//! it can lean towards a blocked neighbour, and snapping it to an [Ordinal]
//! may then name that neighbour. Turn `smooth_directions` off when headings
//! are followed cell by cell.
//!

use crate::prelude::*;
use bevy::prelude::*;

/// Direction of travel of every cell of a dense grid
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Clone, Debug, PartialEq, Reflect)]
pub struct FlowField {
	/// Number of `(columns, rows)`
	dimensions: UVec2,
	/// Row-major unit vectors, or zero
	directions: Vec<Vec2>,
}

impl Default for FlowField {
	fn default() -> Self {
		FlowField::new(UVec2::ONE)
	}
}

impl Field<Vec2> for FlowField {
	/// Get a reference to the field array
	fn get(&self) -> &[Vec2] {
		&self.directions
	}
	/// Number of `(columns, rows)` in the field
	fn get_dimensions(&self) -> UVec2 {
		self.dimensions
	}
	/// Retrieve a field cell value, out of bounds cells have no direction
	fn get_field_cell_value(&self, field_cell: FieldCell) -> Vec2 {
		match linear_index(self.dimensions, field_cell) {
			Some(i) => self.directions[i],
			None => Vec2::ZERO,
		}
	}
	/// Set a field cell to a value
	fn set_field_cell_value(&mut self, value: Vec2, field_cell: FieldCell) {
		if let Some(i) = linear_index(self.dimensions, field_cell) {
			self.directions[i] = value;
		}
	}
}

impl FlowField {
	/// Creates a new [FlowField] where every cell has a zero vector
	pub fn new(dimensions: UVec2) -> Self {
		FlowField {
			dimensions,
			directions: vec![Vec2::ZERO; cell_count(dimensions)],
		}
	}
	/// Zero every direction
	pub fn reset(&mut self) {
		self.directions.fill(Vec2::ZERO);
	}
	/// Calculate the [FlowField] from an [IntegrationField]
	pub fn calculate(
		&mut self,
		integration_field: &IntegrationField,
		weight_field: &WeightField,
		settings: &FlowFieldSettings,
	) {
		for field_cell in iter_field_cells(self.dimensions) {
			let direction =
				descend_from_cell(field_cell, integration_field, weight_field, settings);
			self.set_field_cell_value(direction, field_cell);
		}
	}
}

/// Find the heading of a single cell, see the module docs
fn descend_from_cell(
	field_cell: FieldCell,
	integration_field: &IntegrationField,
	weight_field: &WeightField,
	settings: &FlowFieldSettings,
) -> Vec2 {
	let cost = integration_field.get_field_cell_value(field_cell);
	if cost >= UNREACHED_COST {
		return Vec2::ZERO;
	}
	let mut cheapest_value = cost;
	let mut cheapest_offset = None;
	let mut blended = Vec2::ZERO;
	let mut blended_weight = 0.0;
	for offset in neighbour_offsets(settings.allow_diagonal).iter() {
		let neighbour = field_cell.offset(*offset);
		if !weight_field.is_walkable(neighbour)
			|| is_corner_blocked(field_cell, *offset, weight_field)
		{
			continue;
		}
		let neighbour_cost = integration_field.get_field_cell_value(neighbour);
		if neighbour_cost >= UNREACHED_COST {
			continue;
		}
		if neighbour_cost < cheapest_value {
			cheapest_value = neighbour_cost;
			cheapest_offset = Some(*offset);
		}
		let delta = cost - neighbour_cost;
		if delta > 0.0 {
			blended += offset.as_vec2() * delta;
			blended_weight += delta;
		}
	}
	if settings.smooth_directions && blended_weight > 0.0 {
		if let Some(direction) = blended.try_normalize() {
			return direction;
		}
	}
	cheapest_offset
		.and_then(|offset| offset.as_vec2().try_normalize())
		.unwrap_or(Vec2::ZERO)
}
