//! Double buffering of voxel fields. Agents only ever sample the front
//! generation, a finished build is assembled into the back generation outside
//! of any lock and then exchanged with the front under the writer lock so a
//! reader either sees the old field or the new one, never a mix:
//!
//! ```text
//!            swap(output)
//!  back  ◀── populate ──
//!   │
//!   └──── exchange ────▶ front ──▶ sample(chunk, local)
//! ```
//!

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::prelude::*;
use bevy::prelude::*;

/// Solved buffers keyed by chunk coordinate
pub type ChunkBuffers = HashMap<IVec3, Arc<FlowFieldBuffer>>;

/// State guarded by the [FieldBuffers] lock
#[derive(Debug, Default)]
struct BufferState {
	/// Sampled by agents
	front: ChunkBuffers,
	/// Previous front, recycled by the next swap
	back: ChunkBuffers,
	/// Number of swaps, `0` before the first field arrives
	generation: u64,
	/// Target of the front generation
	target: Option<Vec3>,
	/// Layer of the front generation
	layer: AgentLayer,
}

/// Front and back generations of a voxel field
#[derive(Debug, Default)]
pub struct FieldBuffers {
	/// Both generations and their metadata
	state: RwLock<BufferState>,
}

impl FieldBuffers {
	/// Create a new instance of [FieldBuffers] with empty generations
	pub fn new() -> Self {
		FieldBuffers::default()
	}
	/// Shared access, a poisoned lock still holds plain data
	fn read_state(&self) -> RwLockReadGuard<'_, BufferState> {
		self.state.read().unwrap_or_else(PoisonError::into_inner)
	}
	/// Exclusive access
	fn write_state(&self) -> RwLockWriteGuard<'_, BufferState> {
		self.state.write().unwrap_or_else(PoisonError::into_inner)
	}
	/// Populate the back generation from `output` and make it the front.
	/// Returns the new generation
	pub fn swap(&self, output: &BuildOutput) -> u64 {
		// recycle the old back allocation outside of the writer lock
		let mut back = std::mem::take(&mut self.write_state().back);
		back.clear();
		back.extend(
			output
				.chunk_results
				.iter()
				.map(|(coord, buffer)| (*coord, Arc::clone(buffer))),
		);
		let mut state = self.write_state();
		std::mem::swap(&mut state.front, &mut back);
		state.back = back;
		state.generation += 1;
		state.target = Some(output.target);
		state.layer = output.layer;
		trace!("Swapped flowfield buffers to generation {}", state.generation);
		state.generation
	}
	/// Unit direction of travel of a voxel in the front generation, zero for
	/// an unknown chunk or voxel
	pub fn sample(&self, chunk: IVec3, local: IVec3) -> Vec3 {
		self.read_state()
			.front
			.get(&chunk)
			.map(|buffer| buffer.direction_at(local))
			.unwrap_or(Vec3::ZERO)
	}
	/// Unit direction of travel of a voxel in the front generation for an
	/// agent of `layer`. The layer, the presence of a field and the lookup
	/// are all read under one guard, so a concurrent swap never pairs the
	/// layer of one generation with the directions of another
	pub fn sample_for_layer(&self, chunk: IVec3, local: IVec3, layer: AgentLayer) -> Vec3 {
		let state = self.read_state();
		if state.layer != layer || state.target.is_none() {
			return Vec3::ZERO;
		}
		state
			.front
			.get(&chunk)
			.map(|buffer| buffer.direction_at(local))
			.unwrap_or(Vec3::ZERO)
	}
	/// Distance to the target of a voxel in the front generation
	pub fn sample_distance(&self, chunk: IVec3, local: IVec3) -> i32 {
		self.read_state()
			.front
			.get(&chunk)
			.map(|buffer| buffer.distance_at(local))
			.unwrap_or(UNREACHED_DISTANCE)
	}
	/// Number of swaps so far
	pub fn get_generation(&self) -> u64 {
		self.read_state().generation
	}
	/// Target of the front generation
	pub fn get_target(&self) -> Option<Vec3> {
		self.read_state().target
	}
	/// Layer of the front generation
	pub fn get_layer(&self) -> AgentLayer {
		self.read_state().layer
	}
	/// Whether a field has been swapped in
	pub fn has_field(&self) -> bool {
		self.read_state().target.is_some()
	}
	/// Drop both generations so that every sample is zero. The generation
	/// counter is kept
	pub fn clear(&self) {
		let mut state = self.write_state();
		state.front.clear();
		state.back.clear();
		state.target = None;
	}
}

/// A cheap clonable read handle onto a voxel field, handed to agents so they
/// can steer without access to the manager
#[derive(Clone, Debug)]
pub struct FlowFieldSampler {
	/// Layout of the world
	settings: VoxelSettings,
	/// Shared with the manager
	buffers: Arc<FieldBuffers>,
}

impl FlowFieldSampler {
	/// Create a new instance of [FlowFieldSampler]
	pub fn new(settings: VoxelSettings, buffers: Arc<FieldBuffers>) -> Self {
		FlowFieldSampler { settings, buffers }
	}
	/// Unit direction of travel at a world position for an agent of `layer`.
	/// Zero when the field was solved for another layer or the position is
	/// outside the field
	pub fn get_flow_direction_at(&self, world: Vec3, layer: AgentLayer) -> Vec3 {
		match self.settings.world_to_voxel(world) {
			Some((chunk, local)) => self.buffers.sample_for_layer(chunk, local, layer),
			None => Vec3::ZERO,
		}
	}
	/// Generation of the field being sampled
	pub fn get_generation(&self) -> u64 {
		self.buffers.get_generation()
	}
}
