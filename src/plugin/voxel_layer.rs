//! Drives the chunked voxel field held as a Bevy [Resource]. Rebuilds run on
//! the [BuildScheduler] workers and the manager moves between two states:
//!
//! ```text
//!          set_global_target
//!  Idle ───────────────────────▶ Building(job)
//!   ▲                              │  │
//!   │  tick, job completed, swap   │  │ set_global_target while building
//!   └──────────────────────────────┘  └──▶ cancel job, Building(new job)
//! ```
//!
//! Only the completion of the job recorded in `Building` is ever swapped into
//! the front buffer, anything else reaching [DynamicFlowFieldManager::tick]
//! is stale and discarded so the last target set always wins.
//!

use std::sync::Arc;

use crate::prelude::*;
use bevy::prelude::*;

/// Whether a rebuild is in flight
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BuildState {
	/// The front buffer reflects the latest request
	#[default]
	Idle,
	/// Waiting on a job
	Building(JobId),
}

/// Owns the voxel world of a level and rebuilds its field in the background
#[derive(Resource, Debug)]
pub struct DynamicFlowFieldManager {
	/// Authoritative voxels
	grid: VoxelGrid,
	/// Worker pool
	scheduler: BuildScheduler,
	/// Shared with every [FlowFieldSampler]
	buffers: Arc<FieldBuffers>,
	/// Current state
	state: BuildState,
	/// Target of the most recent request
	current_target: Option<Vec3>,
	/// Layer builds are solved for
	active_layer: AgentLayer,
	/// Number of builds swapped in
	completed_builds: u64,
	/// Number of stale builds thrown away
	discarded_builds: u64,
}

impl DynamicFlowFieldManager {
	/// Create a new instance of [DynamicFlowFieldManager] and spawn its workers
	pub fn new(
		voxel_settings: VoxelSettings,
		scheduler_settings: BuildSchedulerSettings,
	) -> Result<Self, FlowFieldError> {
		Ok(DynamicFlowFieldManager {
			grid: VoxelGrid::new(voxel_settings)?,
			scheduler: BuildScheduler::new(scheduler_settings)?,
			buffers: Arc::new(FieldBuffers::new()),
			state: BuildState::Idle,
			current_target: None,
			active_layer: AgentLayer::default(),
			completed_builds: 0,
			discarded_builds: 0,
		})
	}
	/// Get the voxel world
	pub fn get_grid(&self) -> &VoxelGrid {
		&self.grid
	}
	/// Replace the world bounds of the grid. Samplers handed out earlier keep
	/// the bounds they were created with
	pub fn set_world_bounds(&mut self, bounds: WorldBounds) -> Result<(), FlowFieldError> {
		self.grid.set_world_bounds(bounds)
	}
	/// Get the current state
	pub fn get_state(&self) -> BuildState {
		self.state
	}
	/// Whether a rebuild is in flight
	pub fn is_building(&self) -> bool {
		matches!(self.state, BuildState::Building(_))
	}
	/// Target of the most recent request
	pub fn get_current_target(&self) -> Option<Vec3> {
		self.current_target
	}
	/// Layer builds are solved for
	pub fn get_active_layer(&self) -> AgentLayer {
		self.active_layer
	}
	/// Generation of the front buffer
	pub fn get_generation(&self) -> u64 {
		self.buffers.get_generation()
	}
	/// Number of builds swapped in so far
	pub fn get_completed_builds(&self) -> u64 {
		self.completed_builds
	}
	/// Number of stale builds thrown away so far
	pub fn get_discarded_builds(&self) -> u64 {
		self.discarded_builds
	}
	/// A read handle onto the front buffer for agents
	pub fn sampler(&self) -> FlowFieldSampler {
		FlowFieldSampler::new(*self.grid.get_settings(), Arc::clone(&self.buffers))
	}
	/// Snapshot the world and rebuild towards `target`, cancelling any build
	/// in flight. A target outside the world or blocked for the active layer
	/// is rejected and the current field stays in effect
	pub fn set_global_target(&mut self, target: Vec3) -> Result<JobId, FlowFieldError> {
		let input = self.grid.fill_build_input(target, self.active_layer);
		if let Err(e) = input.validate() {
			warn!("Rejected flowfield target: {}", e);
			return Err(e);
		}
		if let BuildState::Building(job_id) = self.state {
			debug!("Build {} superseded by a new target", job_id);
			self.scheduler.cancel_all();
		}
		self.current_target = Some(target);
		let handle = self.scheduler.enqueue_build(input, None);
		self.state = BuildState::Building(handle.get_id());
		debug!("Flowfield build {} towards {}", handle.get_id(), target);
		Ok(handle.get_id())
	}
	/// Rebuild towards the current target. When the target has become
	/// invalid every build is cancelled and the field is cleared
	pub fn request_rebuild(&mut self) -> Result<(), FlowFieldError> {
		let Some(target) = self.current_target else {
			return Ok(());
		};
		match self.set_global_target(target) {
			Ok(_) => Ok(()),
			Err(e) => {
				self.scheduler.cancel_all();
				self.buffers.clear();
				self.state = BuildState::Idle;
				Err(e)
			}
		}
	}
	/// Solve for another kind of agent
	pub fn set_agent_layer(&mut self, layer: AgentLayer) -> Result<(), FlowFieldError> {
		if self.active_layer == layer {
			return Ok(());
		}
		self.active_layer = layer;
		self.request_rebuild()
	}
	/// Block or open the voxels under a box and rebuild in the background
	pub fn mark_obstacle_box(
		&mut self,
		center: Vec3,
		extents: Vec3,
		blocked: bool,
	) -> Result<(), FlowFieldError> {
		let regions = self.grid.set_obstacle_box(center, extents, blocked);
		if regions.is_empty() {
			return Ok(());
		}
		self.request_rebuild()
	}
	/// Unit direction of travel at a world position for an agent of `layer`,
	/// zero when nothing has been built for that layer
	pub fn get_flow_direction_at(&self, world: Vec3, layer: AgentLayer) -> Vec3 {
		match self.grid.world_to_voxel(world) {
			Some((chunk, local)) => self.buffers.sample_for_layer(chunk, local, layer),
			None => Vec3::ZERO,
		}
	}
	/// Drain finished builds. The build being waited on is swapped into the
	/// front buffer and written back to the grid, returning the new generation
	pub fn tick(&mut self) -> Option<u64> {
		let mut swapped = None;
		for completed in self.scheduler.tick() {
			match self.state {
				BuildState::Building(job_id) if job_id == completed.job_id => {
					let generation = self.buffers.swap(&completed.output);
					self.grid.consume_build_output(&completed.output);
					self.state = BuildState::Idle;
					self.completed_builds += 1;
					debug!("Flowfield build {} swapped in as generation {}", job_id, generation);
					swapped = Some(generation);
				}
				_ => {
					self.discarded_builds += 1;
					debug!("Discarded stale flowfield build {}", completed.job_id);
				}
			}
		}
		swapped
	}
}

/// Rebuild the voxel field towards a world position
#[derive(Event, Clone, Copy, Debug)]
pub struct EventSetGlobalTarget(pub Vec3);

/// Solve the voxel field for another kind of agent
#[derive(Event, Clone, Copy, Debug)]
pub struct EventSetAgentLayer(pub AgentLayer);

/// Emitted when a new generation of the voxel field has been swapped in
#[derive(Event, Clone, Copy, Debug)]
pub struct EventFlowFieldReady {
	/// Generation of the front buffer
	pub generation: u64,
	/// Target the field flows towards
	pub target: Option<Vec3>,
}

/// Read [EventSetAgentLayer], only the latest request of a frame is applied
#[cfg(not(tarpaulin_include))]
pub fn process_agent_layer_requests(
	mut events: EventReader<EventSetAgentLayer>,
	mut manager: ResMut<DynamicFlowFieldManager>,
) {
	if let Some(event) = events.read().last() {
		if let Err(e) = manager.set_agent_layer(event.0) {
			warn!("Agent layer change left no valid flowfield: {}", e);
		}
	}
}

/// Read [EventSetGlobalTarget], only the latest request of a frame is built
#[cfg(not(tarpaulin_include))]
pub fn process_global_target_requests(
	mut events: EventReader<EventSetGlobalTarget>,
	mut manager: ResMut<DynamicFlowFieldManager>,
) {
	if let Some(event) = events.read().last() {
		if let Err(e) = manager.set_global_target(event.0) {
			trace!("Global target request ignored: {}", e);
		}
	}
}

/// Swap in finished builds and announce new generations
#[cfg(not(tarpaulin_include))]
pub fn tick_dynamic_flowfield(
	mut manager: ResMut<DynamicFlowFieldManager>,
	mut event_ready: EventWriter<EventFlowFieldReady>,
) {
	if let Some(generation) = manager.tick() {
		event_ready.write(EventFlowFieldReady {
			generation,
			target: manager.get_current_target(),
		});
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::{Duration, Instant};
	/// 8x8x1 chunks of 100 unit voxels across -400 to 400
	fn manager(worker_threads: usize) -> DynamicFlowFieldManager {
		let voxel_settings = VoxelSettings {
			voxel_size: 100.0,
			chunk_size: IVec3::new(8, 8, 1),
			grid_origin: Vec3::ZERO,
			world_bounds: Some(WorldBounds::new(Vec3::splat(-400.0), Vec3::splat(400.0))),
		};
		let scheduler_settings = BuildSchedulerSettings {
			worker_threads,
			..default()
		};
		DynamicFlowFieldManager::new(voxel_settings, scheduler_settings).unwrap()
	}
	/// Tick until the manager is idle
	fn settle(manager: &mut DynamicFlowFieldManager) {
		let deadline = Instant::now() + Duration::from_secs(10);
		while manager.is_building() && Instant::now() < deadline {
			manager.tick();
			std::thread::sleep(Duration::from_millis(1));
		}
		assert!(!manager.is_building(), "build never completed");
	}
	#[test]
	fn build_and_sample() {
		let mut manager = manager(2);
		let sampler = manager.sampler();
		let probe = Vec3::new(350.0, 50.0, 50.0);
		assert_eq!(Vec3::ZERO, sampler.get_flow_direction_at(probe, AgentLayer::Ground));
		manager.set_global_target(Vec3::new(50.0, 50.0, 50.0)).unwrap();
		assert!(manager.is_building());
		settle(&mut manager);
		assert_eq!(1, manager.get_generation());
		assert_eq!(Vec3::NEG_X, manager.get_flow_direction_at(probe, AgentLayer::Ground));
		assert_eq!(Vec3::NEG_X, sampler.get_flow_direction_at(probe, AgentLayer::Ground));
		// another layer has no field
		assert_eq!(Vec3::ZERO, manager.get_flow_direction_at(probe, AgentLayer::Flying));
		// the solve was written back into the grid
		let chunk = manager.get_grid().get_chunk(IVec3::ZERO).unwrap();
		assert!(!chunk.is_dirty());
		assert_eq!(3, chunk.get_voxel(IVec3::new(3, 0, 0)).unwrap().distance);
	}
	#[test]
	fn latest_target_wins() {
		let mut manager = manager(1);
		let first = manager.set_global_target(Vec3::new(50.0, 50.0, 50.0)).unwrap();
		let second = manager.set_global_target(Vec3::new(350.0, 350.0, 50.0)).unwrap();
		assert!(second > first);
		assert_eq!(BuildState::Building(second), manager.get_state());
		settle(&mut manager);
		assert_eq!(1, manager.get_generation());
		assert_eq!(1, manager.get_completed_builds());
		let sampler = manager.sampler();
		assert_eq!(
			Vec3::X,
			sampler.get_flow_direction_at(Vec3::new(50.0, 350.0, 50.0), AgentLayer::Ground)
		);
	}
	#[test]
	fn invalid_target_keeps_field() {
		let mut manager = manager(2);
		manager.set_global_target(Vec3::new(50.0, 50.0, 50.0)).unwrap();
		settle(&mut manager);
		assert!(matches!(
			manager.set_global_target(Vec3::splat(5000.0)),
			Err(FlowFieldError::InvalidTarget(_))
		));
		assert_eq!(BuildState::Idle, manager.get_state());
		assert_eq!(Some(Vec3::new(50.0, 50.0, 50.0)), manager.get_current_target());
		assert_ne!(Vec3::ZERO, manager.get_flow_direction_at(Vec3::new(350.0, 50.0, 50.0), AgentLayer::Ground));
	}
	#[test]
	fn obstacle_triggers_rebuild() {
		let mut manager = manager(2);
		manager.set_global_target(Vec3::new(50.0, 50.0, 50.0)).unwrap();
		settle(&mut manager);
		manager.mark_obstacle_box(Vec3::new(150.0, 50.0, 50.0), Vec3::splat(50.0), true).unwrap();
		assert!(manager.is_building());
		settle(&mut manager);
		assert_eq!(2, manager.get_generation());
		let direction = manager.get_flow_direction_at(Vec3::new(250.0, 50.0, 50.0), AgentLayer::Ground);
		assert_ne!(Vec3::NEG_X, direction);
		assert_ne!(Vec3::ZERO, direction);
		assert_eq!(Vec3::ZERO, manager.get_flow_direction_at(Vec3::new(150.0, 50.0, 50.0), AgentLayer::Ground));
	}
	#[test]
	fn blocking_the_target_clears_field() {
		let mut manager = manager(2);
		manager.set_global_target(Vec3::new(50.0, 50.0, 50.0)).unwrap();
		settle(&mut manager);
		let result = manager.mark_obstacle_box(Vec3::new(50.0, 50.0, 50.0), Vec3::splat(10.0), true);
		assert!(result.is_err());
		assert_eq!(BuildState::Idle, manager.get_state());
		assert_eq!(Vec3::ZERO, manager.get_flow_direction_at(Vec3::new(350.0, 50.0, 50.0), AgentLayer::Ground));
		// opening it again rebuilds towards the remembered target
		manager.mark_obstacle_box(Vec3::new(50.0, 50.0, 50.0), Vec3::splat(10.0), false).unwrap();
		settle(&mut manager);
		assert_eq!(Vec3::NEG_X, manager.get_flow_direction_at(Vec3::new(350.0, 50.0, 50.0), AgentLayer::Ground));
	}
	#[test]
	fn layer_change_rebuilds() {
		let mut manager = manager(2);
		manager.set_global_target(Vec3::new(50.0, 50.0, 50.0)).unwrap();
		settle(&mut manager);
		manager.set_agent_layer(AgentLayer::Flying).unwrap();
		assert!(manager.is_building());
		settle(&mut manager);
		let probe = Vec3::new(350.0, 50.0, 50.0);
		assert_eq!(Vec3::NEG_X, manager.get_flow_direction_at(probe, AgentLayer::Flying));
		assert_eq!(Vec3::ZERO, manager.get_flow_direction_at(probe, AgentLayer::Ground));
		// setting the same layer again is a no-op
		manager.set_agent_layer(AgentLayer::Flying).unwrap();
		assert!(!manager.is_building());
	}
}
