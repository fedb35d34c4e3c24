//! Drives a [DenseFlowField] held as a Bevy [Resource]. Builds are
//! synchronous, any edit to the terrain immediately rebuilds towards the
//! current destination so that the field never points an actor into a freshly
//! placed obstacle.
//!

use rand::Rng;

use crate::prelude::*;
use bevy::prelude::*;

/// Owns the dense field of a level and rebuilds it on request
#[derive(Resource, Clone, Debug)]
pub struct FlowFieldManager {
	/// The field being driven
	flow_field: DenseFlowField,
	/// Weight given to every cell when the grid is (re)allocated
	default_traversal_weight: u8,
	/// Whether a debug snapshot is refreshed after each successful build
	capture_debug_snapshot: bool,
	/// Most recent debug snapshot
	debug_snapshot: Option<FlowFieldDebugSnapshot>,
}

impl FlowFieldManager {
	/// Create a new instance of [FlowFieldManager] over open ground
	pub fn new(settings: FlowFieldSettings) -> Result<Self, FlowFieldError> {
		Ok(FlowFieldManager {
			flow_field: DenseFlowField::new(settings)?,
			default_traversal_weight: DEFAULT_TRAVERSAL_WEIGHT,
			capture_debug_snapshot: false,
			debug_snapshot: None,
		})
	}
	/// Create a new instance of [FlowFieldManager] from pre-authored terrain
	pub fn from_weight_field(
		settings: FlowFieldSettings,
		weight_field: WeightField,
	) -> Result<Self, FlowFieldError> {
		Ok(FlowFieldManager {
			flow_field: DenseFlowField::from_weight_field(settings, weight_field)?,
			default_traversal_weight: DEFAULT_TRAVERSAL_WEIGHT,
			capture_debug_snapshot: false,
			debug_snapshot: None,
		})
	}
	/// Get the field being driven
	pub fn get_flow_field(&self) -> &DenseFlowField {
		&self.flow_field
	}
	/// Get the settings
	pub fn get_settings(&self) -> &FlowFieldSettings {
		self.flow_field.get_settings()
	}
	/// Weight given to every cell when the grid is (re)allocated
	pub fn get_default_traversal_weight(&self) -> u8 {
		self.default_traversal_weight
	}
	/// Set the weight used by [FlowFieldManager::apply_settings]
	pub fn set_default_traversal_weight(&mut self, weight: u8) {
		self.default_traversal_weight = weight;
	}
	/// Reallocate the grid with new settings, every cell takes the default
	/// traversal weight and the previous field is dropped
	pub fn apply_settings(&mut self, settings: FlowFieldSettings) -> Result<(), FlowFieldError> {
		let mut flow_field = DenseFlowField::new(settings)?;
		let weights = vec![self.default_traversal_weight; settings.cell_count()];
		flow_field.set_traversal_weights(&weights)?;
		self.flow_field = flow_field;
		self.debug_snapshot = None;
		Ok(())
	}
	/// Whether a build has succeeded since the grid was allocated
	pub fn has_valid_field(&self) -> bool {
		self.flow_field.has_valid_field()
	}
	/// Destination of the current field
	pub fn get_destination(&self) -> Option<FieldCell> {
		self.flow_field.get_destination()
	}
	/// Build the field towards a cell. On failure the previous field stays in
	/// effect and false is returned
	pub fn build_flow_field_to_cell(&mut self, destination: FieldCell) -> bool {
		match self.flow_field.build(destination) {
			Ok(()) => {
				debug!("Built dense flowfield to {:?}", destination.get_column_row());
				self.refresh_debug_snapshot();
				true
			}
			Err(e) => {
				warn!("Dense flowfield build failed: {}", e);
				false
			}
		}
	}
	/// Build the field towards the cell containing a world position
	pub fn build_flow_field_to_world_location(&mut self, world: Vec3) -> bool {
		let destination = self.flow_field.world_to_cell(world);
		if destination == FieldCell::INVALID {
			warn!("Dense flowfield target {} lies outside the grid", world);
			return false;
		}
		self.build_flow_field_to_cell(destination)
	}
	/// Direction of travel at a world position, zero before any build or
	/// outside the grid
	pub fn get_direction_for_world_position(&self, world: Vec3) -> Vec3 {
		if !self.has_valid_field() {
			return Vec3::ZERO;
		}
		self.flow_field.get_direction_for_world_position(world)
	}
	/// The cell containing `world`, or [FieldCell::INVALID]
	pub fn world_to_cell(&self, world: Vec3) -> FieldCell {
		self.flow_field.world_to_cell(world)
	}
	/// World position of the centre of a cell
	pub fn cell_to_world(&self, field_cell: FieldCell) -> Vec3 {
		self.flow_field.cell_to_world(field_cell)
	}
	/// True iff the cell is inside the grid with a non-zero weight
	pub fn is_walkable(&self, field_cell: FieldCell) -> bool {
		self.flow_field.is_walkable(field_cell)
	}
	/// Block or open the cells under a box and rebuild towards the current
	/// destination. When the box covers the destination the field is cleared
	pub fn mark_obstacle_box(&mut self, center: Vec3, extents: Vec3, blocked: bool) {
		let changed = self.flow_field.set_obstacle_box(center, extents, blocked);
		trace!("Obstacle box changed {} cells", changed);
		if changed > 0 {
			self.rebuild();
		}
	}
	/// Replace every traversal weight and rebuild towards the current destination
	pub fn set_traversal_weights(&mut self, weights: &[u8]) -> Result<(), FlowFieldError> {
		self.flow_field.set_traversal_weights(weights)?;
		self.rebuild();
		Ok(())
	}
	/// Rebuild towards the current destination, dropping the field if the
	/// destination is no longer walkable
	fn rebuild(&mut self) {
		let Some(destination) = self.flow_field.get_destination() else {
			return;
		};
		if !self.build_flow_field_to_cell(destination) {
			warn!("Destination {:?} is no longer walkable, clearing the flowfield", destination.get_column_row());
			self.flow_field.clear();
			self.refresh_debug_snapshot();
		}
	}
	/// Copy every field for visualisation
	pub fn create_debug_snapshot(&self) -> FlowFieldDebugSnapshot {
		self.flow_field.create_debug_snapshot()
	}
	/// Toggle refreshing the debug snapshot after each build
	pub fn set_debug_capture(&mut self, capture: bool) {
		self.capture_debug_snapshot = capture;
		if capture {
			self.debug_snapshot = Some(self.create_debug_snapshot());
		} else {
			self.debug_snapshot = None;
		}
	}
	/// The snapshot captured after the latest build, when capture is enabled
	pub fn get_debug_snapshot(&self) -> Option<&FlowFieldDebugSnapshot> {
		self.debug_snapshot.as_ref()
	}
	/// Update the stored snapshot if capture is enabled
	fn refresh_debug_snapshot(&mut self) {
		if self.capture_debug_snapshot {
			self.debug_snapshot = Some(self.create_debug_snapshot());
		}
	}
	/// Pick a random walkable cell within `search_radius` world units of
	/// `from`, never the cell `from` lies in, and build the field to it.
	/// Gives up after `max_attempts` candidates. Returns the world position of
	/// the new destination
	pub fn try_assign_new_destination<R: Rng + ?Sized>(
		&mut self,
		from: Vec3,
		search_radius: f32,
		max_attempts: u32,
		rng: &mut R,
	) -> Option<Vec3> {
		let current = self.world_to_cell(from);
		if current == FieldCell::INVALID || !search_radius.is_finite() {
			return None;
		}
		let grid_size = self.get_settings().grid_size.as_ivec2();
		let max_radius = grid_size.max_element().max(1);
		let radius = ((search_radius / self.get_settings().cell_size).round() as i32).clamp(1, max_radius);
		for _ in 0..max_attempts {
			let offset = IVec2::new(rng.random_range(-radius..=radius), rng.random_range(-radius..=radius));
			let candidate = FieldCell::from(
				(current.as_ivec2() + offset).clamp(IVec2::ZERO, grid_size - IVec2::ONE),
			);
			if candidate == current || !self.is_walkable(candidate) {
				continue;
			}
			if self.build_flow_field_to_cell(candidate) {
				return Some(self.cell_to_world(candidate));
			}
		}
		debug!("No new destination found within {} of {}", search_radius, from);
		None
	}
}

/// Request that the dense field is rebuilt towards a world position
#[derive(Event, Clone, Copy, Debug)]
pub struct EventBuildDenseField(pub Vec3);

impl EventBuildDenseField {
	/// Create a new instance of [EventBuildDenseField]
	#[cfg(not(tarpaulin_include))]
	pub fn new(target: Vec3) -> Self {
		EventBuildDenseField(target)
	}
	/// World position to build towards
	#[cfg(not(tarpaulin_include))]
	pub fn get_target(&self) -> Vec3 {
		self.0
	}
}

/// Read [EventBuildDenseField] and rebuild the dense field, only the latest
/// request of a frame is built
#[cfg(not(tarpaulin_include))]
pub fn process_dense_build_requests(
	mut events: EventReader<EventBuildDenseField>,
	mut manager: ResMut<FlowFieldManager>,
) {
	// coalesce so that a burst of requests costs a single build
	if let Some(event) = events.read().last() {
		manager.build_flow_field_to_world_location(event.get_target());
	}
}
