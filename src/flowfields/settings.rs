//! Configuration of a dense flow field. Settings are immutable for the
//! duration of a build, applying new settings reallocates every field.
//!
//! With the `ron` feature settings can be loaded from disk:
//!
//! ```text
//! (
//! 	grid_size: (20, 20),
//! 	cell_size: 100.0,
//! 	grid_origin: (0.0, 0.0, 0.0),
//! 	allow_diagonal: true,
//! 	diagonal_cost_multiplier: 1.41421356,
//! 	step_cost: 1.0,
//! 	cell_traversal_weight_multiplier: 1.0,
//! 	heuristic_weight: 1.0,
//! 	smooth_directions: true,
//! )
//! ```
//!

use crate::prelude::*;
use bevy::prelude::*;

/// Grid layout and step cost tuning of a dense field
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Clone, Copy, Debug, PartialEq, Reflect)]
pub struct FlowFieldSettings {
	/// Number of `(columns, rows)` in the grid
	pub grid_size: UVec2,
	/// World length of a side of a cell
	pub cell_size: f32,
	/// World position of the corner of cell `(0, 0)`, the grid lies on the `XY` plane
	pub grid_origin: Vec3,
	/// Whether the wavefront may step diagonally
	pub allow_diagonal: bool,
	/// Multiplier applied to the step cost of a diagonal move
	pub diagonal_cost_multiplier: f32,
	/// Base cost of moving from one cell to a neighbour
	pub step_cost: f32,
	/// Scales the contribution of a cell's traversal weight to its step cost
	pub cell_traversal_weight_multiplier: f32,
	/// Scales every step cost
	pub heuristic_weight: f32,
	/// Blend the directions of all cheaper neighbours instead of pointing at the cheapest one
	pub smooth_directions: bool,
}

impl Default for FlowFieldSettings {
	fn default() -> Self {
		FlowFieldSettings {
			grid_size: UVec2::new(1, 1),
			cell_size: 100.0,
			grid_origin: Vec3::ZERO,
			allow_diagonal: true,
			diagonal_cost_multiplier: std::f32::consts::SQRT_2,
			step_cost: 1.0,
			cell_traversal_weight_multiplier: 1.0,
			heuristic_weight: 1.0,
			smooth_directions: true,
		}
	}
}

impl FlowFieldSettings {
	/// Create settings for a grid of `columns x rows` cells of `cell_size`
	/// with every other value left at its default
	pub fn new(columns: u32, rows: u32, cell_size: f32) -> Self {
		FlowFieldSettings {
			grid_size: UVec2::new(columns, rows),
			cell_size,
			..default()
		}
	}
	/// Reject settings that would produce an empty grid or non-positive step costs
	pub fn validate(&self) -> Result<(), FlowFieldError> {
		if self.grid_size.x == 0 || self.grid_size.y == 0 {
			return Err(FlowFieldError::invalid_argument(format!(
				"grid size must be non-zero, found {}",
				self.grid_size
			)));
		}
		if !self.grid_origin.is_finite() {
			return Err(FlowFieldError::invalid_argument("grid origin must be finite"));
		}
		let positives = [
			("cell_size", self.cell_size),
			("diagonal_cost_multiplier", self.diagonal_cost_multiplier),
			("step_cost", self.step_cost),
			(
				"cell_traversal_weight_multiplier",
				self.cell_traversal_weight_multiplier,
			),
			("heuristic_weight", self.heuristic_weight),
		];
		for (name, value) in positives {
			if !(value.is_finite() && value > 0.0) {
				return Err(FlowFieldError::invalid_argument(format!(
					"{} must be a positive number, found {}",
					name, value
				)));
			}
		}
		Ok(())
	}
	/// Total number of cells in the grid
	pub fn cell_count(&self) -> usize {
		cell_count(self.grid_size)
	}
	/// Cost of stepping from one cell into a neighbour of `weight` along `offset`
	pub fn step_cost_into(&self, offset: IVec2, weight: u8) -> f32 {
		let base = if is_diagonal(offset) {
			self.step_cost * self.diagonal_cost_multiplier
		} else {
			self.step_cost
		};
		let normalised_weight = (weight as f32 / DEFAULT_TRAVERSAL_WEIGHT as f32).max(COST_EPSILON);
		base * self.cell_traversal_weight_multiplier / normalised_weight * self.heuristic_weight
	}
	/// From a `ron` file generate the [FlowFieldSettings]
	#[cfg(feature = "ron")]
	pub fn from_ron(path: &str) -> Result<Self, FlowFieldError> {
		let file = std::fs::File::open(path)?;
		let settings: FlowFieldSettings = ron::de::from_reader(file)?;
		settings.validate()?;
		Ok(settings)
	}
}
