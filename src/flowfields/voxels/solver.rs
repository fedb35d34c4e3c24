//! Solves distance and direction fields over immutable chunk snapshots so that
//! the work can happen away from the main thread.
//!
//! Each chunk is relaxed on its own with an integer Dijkstra over the 6 face
//! neighbours of a voxel, stepping into a voxel costs its `cost`. Only the
//! chunk containing the target is seeded so every other chunk comes back
//! unreached, a wavefront never crosses from one chunk into the next:
//!
//! ```text
//!  chunk (0, 0)         chunk (1, 0)
//!  _______________      _______________
//! |   |   |   |   |    |   |   |   |   |
//! | 3 | 2 | 1 | 0 |    | ∞ | ∞ | ∞ | ∞ |
//! |___|___|___|___|    |___|___|___|___|
//! ```
//!
//! Once distances are known each voxel points at the face neighbour with the
//! lowest distance strictly below its own.
//!

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;

use crate::prelude::*;
use bevy::prelude::*;

/// An immutable copy of the voxel world taken when a build is requested
#[derive(Clone, Debug, Default)]
pub struct BuildInput {
	/// Copy of every allocated chunk
	pub chunk_snapshots: HashMap<IVec3, VoxelChunk>,
	/// World position the field flows towards
	pub target: Vec3,
	/// Agents the field is solved for
	pub layer: AgentLayer,
	/// Layout of the world at snapshot time
	pub settings: VoxelSettings,
}

impl BuildInput {
	/// The `(chunk, local voxel)` of the target
	pub fn target_voxel(&self) -> Option<(IVec3, IVec3)> {
		self.settings.world_to_voxel(self.target)
	}
	/// Ensure the target lands on an allocated voxel open to the layer
	pub fn validate(&self) -> Result<(), FlowFieldError> {
		let Some((chunk, local)) = self.target_voxel() else {
			return Err(FlowFieldError::InvalidTarget(self.target));
		};
		let walkable = self
			.chunk_snapshots
			.get(&chunk)
			.and_then(|c| c.get_voxel(local))
			.is_some_and(|v| self.layer.can_traverse(v.walkable_mask));
		if walkable {
			Ok(())
		} else {
			Err(FlowFieldError::InvalidTarget(self.target))
		}
	}
}

/// The solved distances and directions of a single chunk
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FlowFieldBuffer {
	/// Distance to the target of each voxel, [UNREACHED_DISTANCE] when unreached
	pub distance_field: Vec<i32>,
	/// Offset to the neighbour nearer the target of each voxel
	pub packed_directions: Vec<IVec3>,
	/// Number of voxels along each axis
	pub dimensions: IVec3,
}

impl FlowFieldBuffer {
	/// Create a new instance of [FlowFieldBuffer] with every voxel unreached
	pub fn new(dimensions: IVec3) -> Self {
		let count = voxel_count(dimensions);
		FlowFieldBuffer {
			distance_field: vec![UNREACHED_DISTANCE; count],
			packed_directions: vec![IVec3::ZERO; count],
			dimensions,
		}
	}
	/// Index of a local voxel
	pub fn index_of(&self, local: IVec3) -> Option<usize> {
		if local.cmpge(IVec3::ZERO).all() && local.cmplt(self.dimensions).all() {
			Some((local.z * self.dimensions.y * self.dimensions.x + local.y * self.dimensions.x + local.x) as usize)
		} else {
			None
		}
	}
	/// Unit direction of travel from a local voxel, zero when it has none
	pub fn direction_at(&self, local: IVec3) -> Vec3 {
		self.index_of(local)
			.and_then(|i| self.packed_directions.get(i))
			.map(|d| d.as_vec3().normalize_or_zero())
			.unwrap_or(Vec3::ZERO)
	}
	/// Distance to the target from a local voxel
	pub fn distance_at(&self, local: IVec3) -> i32 {
		self.index_of(local)
			.and_then(|i| self.distance_field.get(i).copied())
			.unwrap_or(UNREACHED_DISTANCE)
	}
}

/// Every chunk solved by a build
#[derive(Clone, Debug, Default)]
pub struct BuildOutput {
	/// Solved buffer of each chunk in the input
	pub chunk_results: HashMap<IVec3, Arc<FlowFieldBuffer>>,
	/// Target the build flowed towards
	pub target: Vec3,
	/// Layer the build was solved for
	pub layer: AgentLayer,
}

/// Solve every chunk of the `input`, see the module docs
pub fn build_distance_and_flow(input: &BuildInput) -> BuildOutput {
	let target_voxel = input.target_voxel();
	let chunk_results = input
		.chunk_snapshots
		.iter()
		.map(|(coord, chunk)| {
			let seed = match target_voxel {
				Some((target_chunk, local)) if target_chunk == *coord => chunk.get_index(local),
				_ => None,
			};
			(*coord, Arc::new(solve_chunk(chunk, seed, input.layer)))
		})
		.collect();
	BuildOutput {
		chunk_results,
		target: input.target,
		layer: input.layer,
	}
}

/// Solve a build on the calling thread
pub fn run_flow_field_build_immediately(input: &BuildInput) -> Result<BuildOutput, FlowFieldError> {
	input.validate()?;
	Ok(build_distance_and_flow(input))
}

/// Relax a single chunk from an optional seed index
fn solve_chunk(chunk: &VoxelChunk, seed: Option<usize>, layer: AgentLayer) -> FlowFieldBuffer {
	let mut buffer = FlowFieldBuffer::new(chunk.get_dimensions());
	let Some(seed) = seed else {
		return buffer;
	};
	let voxels = chunk.get_voxels();
	let open_to_layer = |i: usize| voxels.get(i).is_some_and(|v| layer.can_traverse(v.walkable_mask));
	if !open_to_layer(seed) {
		return buffer;
	}
	buffer.distance_field[seed] = 0;
	let mut open = BinaryHeap::new();
	open.push(Reverse((0, seed)));
	while let Some(Reverse((distance, index))) = open.pop() {
		if distance > buffer.distance_field[index] {
			continue;
		}
		let local = chunk.get_local(index);
		for offset in VOXEL_OFFSETS.iter() {
			let Some(neighbour) = chunk.get_index(local + *offset) else {
				continue;
			};
			if !open_to_layer(neighbour) {
				continue;
			}
			let step = voxels[neighbour].cost.max(1) as i32;
			let candidate = distance.saturating_add(step);
			if candidate < buffer.distance_field[neighbour] {
				buffer.distance_field[neighbour] = candidate;
				open.push(Reverse((candidate, neighbour)));
			}
		}
	}
	for index in 0..buffer.distance_field.len() {
		let distance = buffer.distance_field[index];
		if distance == UNREACHED_DISTANCE {
			continue;
		}
		let local = chunk.get_local(index);
		let mut best = distance;
		for offset in VOXEL_OFFSETS.iter() {
			if let Some(neighbour) = chunk.get_index(local + *offset) {
				let neighbour_distance = buffer.distance_field[neighbour];
				if neighbour_distance < best {
					best = neighbour_distance;
					buffer.packed_directions[index] = *offset;
				}
			}
		}
	}
	buffer
}
