//! A single dense grid of cells laid over the `XY` plane of the world. Owns
//! the [WeightField] describing the terrain together with the
//! [IntegrationField] and [FlowField] of the most recent successful build.
//!
//! World positions map to cells from the grid origin, the corner of cell
//! `(0, 0)`, and cells are sampled at their centres:
//!
//! ```text
//!   y
//!   ^   ____________
//!   |  |     |     |
//!   |  | 0,1 | 1,1 |
//!   |  |_____|_____|
//!   |  |     |     |
//!   |  | 0,0 | 1,0 |
//!   |  o_____|_____|  o = grid origin
//!   +----------------> x
//! ```
//!

use crate::prelude::*;
use bevy::prelude::*;

/// A read-only copy of a dense field for visualisation and tooling
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Clone, Debug, Default, PartialEq, Reflect)]
pub struct FlowFieldDebugSnapshot {
	/// Row-major integration costs
	pub integration: Vec<f32>,
	/// Row-major directions
	pub directions: Vec<Vec2>,
	/// Row-major traversal weights
	pub weights: Vec<u8>,
	/// Row-major walkability
	pub walkable: Vec<bool>,
	/// Number of `(columns, rows)`
	pub grid_size: UVec2,
	/// World length of a side of a cell
	pub cell_size: f32,
	/// World position of the corner of cell `(0, 0)`
	pub grid_origin: Vec3,
	/// Destination of the field, [None] when nothing has been built
	pub destination: Option<FieldCell>,
}

/// Builder of a flow field across a dense 2D grid
#[derive(Clone, Debug)]
pub struct DenseFlowField {
	/// Grid layout and step cost tuning
	settings: FlowFieldSettings,
	/// Terrain
	weight_field: WeightField,
	/// Costs of the last successful build
	integration_field: IntegrationField,
	/// Directions of the last successful build
	flow_field: FlowField,
	/// Destination of the last successful build
	destination: Option<FieldCell>,
}

impl DenseFlowField {
	/// Create a new instance of [DenseFlowField] where every cell is open ground
	pub fn new(settings: FlowFieldSettings) -> Result<Self, FlowFieldError> {
		settings.validate()?;
		Ok(DenseFlowField {
			settings,
			weight_field: WeightField::new(settings.grid_size, DEFAULT_TRAVERSAL_WEIGHT),
			integration_field: IntegrationField::new(settings.grid_size),
			flow_field: FlowField::new(settings.grid_size),
			destination: None,
		})
	}
	/// Create a [DenseFlowField] whose grid size is taken from an existing [WeightField]
	pub fn from_weight_field(
		mut settings: FlowFieldSettings,
		weight_field: WeightField,
	) -> Result<Self, FlowFieldError> {
		settings.grid_size = weight_field.get_dimensions();
		let mut field = DenseFlowField::new(settings)?;
		field.weight_field = weight_field;
		Ok(field)
	}
	/// Replace the settings. Every field is reallocated to the new grid size,
	/// weights are reset to open ground and the previous destination is
	/// forgotten. Invalid settings are rejected and the existing configuration kept
	pub fn apply_settings(&mut self, settings: FlowFieldSettings) -> Result<(), FlowFieldError> {
		*self = DenseFlowField::new(settings)?;
		Ok(())
	}
	/// Get the settings
	pub fn get_settings(&self) -> &FlowFieldSettings {
		&self.settings
	}
	/// Get the terrain weights
	pub fn get_weight_field(&self) -> &WeightField {
		&self.weight_field
	}
	/// Get the costs of the last successful build
	pub fn get_integration_field(&self) -> &IntegrationField {
		&self.integration_field
	}
	/// Get the directions of the last successful build
	pub fn get_flow_field(&self) -> &FlowField {
		&self.flow_field
	}
	/// Destination of the last successful build
	pub fn get_destination(&self) -> Option<FieldCell> {
		self.destination
	}
	/// Whether a build has succeeded since the field was created or cleared
	pub fn has_valid_field(&self) -> bool {
		self.destination.is_some()
	}
	/// Replace every traversal weight, the length must equal `columns * rows`
	pub fn set_traversal_weights(&mut self, weights: &[u8]) -> Result<(), FlowFieldError> {
		self.weight_field.set_traversal_weights(weights)
	}
	/// Set the weight of a single cell, returns false when it lies outside the grid
	pub fn set_cell_weight(&mut self, field_cell: FieldCell, weight: u8) -> bool {
		if field_cell.is_within(self.settings.grid_size) {
			self.weight_field.set_field_cell_value(weight, field_cell);
			true
		} else {
			false
		}
	}
	/// True iff the cell is inside the grid with a non-zero weight
	pub fn is_walkable(&self, field_cell: FieldCell) -> bool {
		self.weight_field.is_walkable(field_cell)
	}
	/// Block (weight `0`) or open ([DEFAULT_TRAVERSAL_WEIGHT]) every cell whose
	/// bounds intersect the box of half size `extents` around `center`.
	/// Returns how many cells changed, marking the same box twice changes nothing
	pub fn set_obstacle_box(&mut self, center: Vec3, extents: Vec3, blocked: bool) -> usize {
		if !center.is_finite() || !extents.is_finite() {
			return 0;
		}
		let extents = extents.abs();
		// clamp one cell beyond each edge so the integer range can never overflow
		let lower = Vec2::NEG_ONE;
		let upper = self.settings.grid_size.as_vec2();
		let min = self
			.world_to_grid_units(center - extents)
			.floor()
			.clamp(lower, upper)
			.as_ivec2();
		let max = self
			.world_to_grid_units(center + extents)
			.ceil()
			.clamp(lower, upper)
			.as_ivec2()
			.saturating_sub(IVec2::ONE);
		let weight = if blocked {
			BLOCKED_WEIGHT
		} else {
			DEFAULT_TRAVERSAL_WEIGHT
		};
		self.weight_field.fill_region(min, max, weight)
	}
	/// Build the fields towards `destination`. The destination must be inside
	/// the grid and walkable, otherwise the previous fields are left untouched
	pub fn build(&mut self, destination: FieldCell) -> Result<(), FlowFieldError> {
		let (integration_field, flow_field) =
			solve_dense(&self.weight_field, destination, &self.settings)?;
		self.integration_field = integration_field;
		self.flow_field = flow_field;
		self.destination = Some(destination);
		Ok(())
	}
	/// Forget the destination and zero every cost and direction
	pub fn clear(&mut self) {
		self.integration_field = IntegrationField::new(self.settings.grid_size);
		self.flow_field = FlowField::new(self.settings.grid_size);
		self.destination = None;
	}
	/// Direction of travel out of a cell, zero when out of bounds or unreached
	pub fn get_direction_for_cell(&self, field_cell: FieldCell) -> Vec2 {
		self.flow_field.get_field_cell_value(field_cell)
	}
	/// Integration cost of a cell, [UNREACHED_COST] when out of bounds or unreached
	pub fn get_integration_cost(&self, field_cell: FieldCell) -> f32 {
		self.integration_field.get_field_cell_value(field_cell)
	}
	/// Position measured in cells from the grid origin
	fn world_to_grid_units(&self, world: Vec3) -> Vec2 {
		(world - self.settings.grid_origin).truncate() / self.settings.cell_size
	}
	/// The cell containing `world`, or [FieldCell::INVALID] when it lies outside the grid
	pub fn world_to_cell(&self, world: Vec3) -> FieldCell {
		if !world.is_finite() {
			return FieldCell::INVALID;
		}
		let cell = FieldCell::from(self.world_to_grid_units(world).floor().as_ivec2());
		if cell.is_within(self.settings.grid_size) {
			cell
		} else {
			FieldCell::INVALID
		}
	}
	/// World position of the centre of a cell, `z` is the grid origin's
	pub fn cell_to_world(&self, field_cell: FieldCell) -> Vec3 {
		let centre = (field_cell.as_ivec2().as_vec2() + Vec2::splat(0.5)) * self.settings.cell_size;
		self.settings.grid_origin + centre.extend(0.0)
	}
	/// Direction of travel at a world position, zero when it lies outside the
	/// grid or no field has been built
	pub fn get_direction_for_world_position(&self, world: Vec3) -> Vec3 {
		self.get_direction_for_cell(self.world_to_cell(world)).extend(0.0)
	}
	/// Direction of travel of a 2d sprite whose world is the `XY` plane
	#[cfg(feature = "2d")]
	pub fn get_direction_from_xy(&self, position: Vec2) -> Vec2 {
		self.get_direction_for_cell(self.world_to_cell(position.extend(self.settings.grid_origin.z)))
	}
	/// Direction of travel of a 3d actor whose ground is the `XZ` plane. The
	/// rows of the grid run along world `z`
	#[cfg(feature = "3d")]
	pub fn get_direction_from_xz(&self, position: Vec3) -> Vec3 {
		let on_grid = Vec3::new(position.x, position.z, self.settings.grid_origin.z);
		let direction = self.get_direction_for_cell(self.world_to_cell(on_grid));
		Vec3::new(direction.x, 0.0, direction.y)
	}
	/// Copy every field for visualisation
	pub fn create_debug_snapshot(&self) -> FlowFieldDebugSnapshot {
		let weights = self.weight_field.get().to_vec();
		FlowFieldDebugSnapshot {
			integration: self.integration_field.get().to_vec(),
			directions: self.flow_field.get().to_vec(),
			walkable: weights.iter().map(|w| *w != BLOCKED_WEIGHT).collect(),
			weights,
			grid_size: self.settings.grid_size,
			cell_size: self.settings.cell_size,
			grid_origin: self.settings.grid_origin,
			destination: self.destination,
		}
	}
}

/// Solve a dense grid towards `destination` producing fresh integration and
/// flow fields. Fails when the destination is outside the grid or blocked
pub fn solve_dense(
	weight_field: &WeightField,
	destination: FieldCell,
	settings: &FlowFieldSettings,
) -> Result<(IntegrationField, FlowField), FlowFieldError> {
	if !weight_field.is_walkable(destination) {
		return Err(FlowFieldError::InvalidDestination(destination));
	}
	let dimensions = weight_field.get_dimensions();
	let mut integration_field = IntegrationField::new(dimensions);
	integration_field.reset(destination);
	integration_field.calculate_field(destination, weight_field, settings);
	let mut flow_field = FlowField::new(dimensions);
	flow_field.calculate(&integration_field, weight_field, settings);
	Ok((integration_field, flow_field))
}
