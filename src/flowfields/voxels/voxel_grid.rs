//! The authoritative store of voxel chunks. The chunk map sits behind a
//! reader/writer lock so that obstacle edits from the main thread can
//! interleave with snapshots taken for background builds, writers hold the
//! lock only for the duration of an edit.
//!

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::prelude::*;
use bevy::prelude::*;

/// Most chunks a single edit may touch in a world without bounds
pub const MAX_CHUNKS_PER_EDIT: i64 = 4096;

/// Chunks of voxels keyed by chunk coordinate
#[derive(Debug, Default)]
pub struct VoxelGrid {
	/// Layout of the world
	settings: VoxelSettings,
	/// Lazily allocated chunks
	chunks: RwLock<HashMap<IVec3, VoxelChunk>>,
}

impl VoxelGrid {
	/// Create a new instance of [VoxelGrid], when world bounds are supplied
	/// every chunk overlapping them is allocated
	pub fn new(settings: VoxelSettings) -> Result<Self, FlowFieldError> {
		settings.validate()?;
		let grid = VoxelGrid {
			settings,
			chunks: RwLock::new(HashMap::new()),
		};
		grid.initialize_if_needed();
		Ok(grid)
	}
	/// Get the settings
	pub fn get_settings(&self) -> &VoxelSettings {
		&self.settings
	}
	/// Get the world length of a side of a voxel
	pub fn get_voxel_size(&self) -> f32 {
		self.settings.voxel_size
	}
	/// Shared access to the chunk map, a poisoned lock still holds plain data
	fn read_chunks(&self) -> RwLockReadGuard<'_, HashMap<IVec3, VoxelChunk>> {
		self.chunks.read().unwrap_or_else(PoisonError::into_inner)
	}
	/// Exclusive access to the chunk map
	fn write_chunks(&self) -> RwLockWriteGuard<'_, HashMap<IVec3, VoxelChunk>> {
		self.chunks.write().unwrap_or_else(PoisonError::into_inner)
	}
	/// Range of chunk coordinates overlapping the world bounds
	fn chunks_within_bounds(&self) -> Option<(IVec3, IVec3)> {
		let bounds = self.settings.world_bounds?;
		let min = self.settings.world_to_global_voxel(bounds.min);
		let max = self.settings.world_to_global_voxel(bounds.max);
		Some((
			self.settings.split_global_voxel(min).0,
			self.settings.split_global_voxel(max).0,
		))
	}
	/// When no chunk has been allocated yet allocate every chunk overlapping
	/// the world bounds. Does nothing without bounds
	pub fn initialize_if_needed(&self) {
		let Some((min, max)) = self.chunks_within_bounds() else {
			return;
		};
		let mut chunks = self.write_chunks();
		if !chunks.is_empty() {
			return;
		}
		for x in min.x..=max.x {
			for y in min.y..=max.y {
				for z in min.z..=max.z {
					let coord = IVec3::new(x, y, z);
					chunks.insert(coord, VoxelChunk::new(coord, self.settings.chunk_size));
				}
			}
		}
		debug!("Allocated {} voxel chunks across the world bounds", chunks.len());
	}
	/// Replace the world bounds and allocate the chunks overlapping them if
	/// the grid is still empty
	pub fn set_world_bounds(&mut self, bounds: WorldBounds) -> Result<(), FlowFieldError> {
		let mut settings = self.settings;
		settings.world_bounds = Some(bounds);
		settings.validate()?;
		self.settings = settings;
		self.initialize_if_needed();
		Ok(())
	}
	/// The `(chunk, local voxel)` containing `world`
	pub fn world_to_voxel(&self, world: Vec3) -> Option<(IVec3, IVec3)> {
		self.settings.world_to_voxel(world)
	}
	/// World position of the centre of a voxel
	pub fn voxel_to_world_center(&self, chunk: IVec3, local: IVec3) -> Vec3 {
		self.settings.voxel_to_world_center(chunk, local)
	}
	/// Visit the chunk at `coord` under the writer lock, allocating it first
	/// if it has never been referenced
	pub fn get_or_create_chunk<R>(&self, coord: IVec3, visitor: impl FnOnce(&mut VoxelChunk) -> R) -> R {
		let mut chunks = self.write_chunks();
		let chunk = chunks
			.entry(coord)
			.or_insert_with(|| VoxelChunk::new(coord, self.settings.chunk_size));
		visitor(chunk)
	}
	/// Copy of the chunk at `coord`
	pub fn get_chunk(&self, coord: IVec3) -> Option<VoxelChunk> {
		self.read_chunks().get(&coord).cloned()
	}
	/// Whether the chunk at `coord` has been allocated
	pub fn contains_chunk(&self, coord: IVec3) -> bool {
		self.read_chunks().contains_key(&coord)
	}
	/// Number of allocated chunks
	pub fn chunk_count(&self) -> usize {
		self.read_chunks().len()
	}
	/// Visit every allocated chunk under the writer lock
	pub fn for_each_chunk(&self, mut visitor: impl FnMut(IVec3, &mut VoxelChunk)) {
		let mut chunks = self.write_chunks();
		for (coord, chunk) in chunks.iter_mut() {
			visitor(*coord, chunk);
		}
	}
	/// Flag a chunk dirty and drop the cached solve of the voxels of the
	/// region, the region is clamped to the chunk
	pub fn mark_region_dirty(&self, region: DirtyRegion) {
		self.get_or_create_chunk(region.chunk, |chunk| {
			chunk.set_dirty(true);
			let upper = chunk.get_dimensions() - IVec3::ONE;
			let min = region.voxel_min.clamp(IVec3::ZERO, upper);
			let max = region.voxel_max.clamp(IVec3::ZERO, upper);
			for z in min.z..=max.z {
				for y in min.y..=max.y {
					for x in min.x..=max.x {
						if let Some(voxel) = chunk.get_voxel_mut(IVec3::new(x, y, z)) {
							voxel.clear_solve();
						}
					}
				}
			}
		});
	}
	/// Split the global voxel box `min..=max` into one [DirtyRegion] per
	/// chunk it overlaps. With world bounds the box is clipped to them,
	/// without bounds a box spanning more than [MAX_CHUNKS_PER_EDIT] chunks
	/// is refused
	pub fn regions_overlapping(&self, min: IVec3, max: IVec3) -> Vec<DirtyRegion> {
		if min.cmpgt(max).any() {
			return Vec::new();
		}
		let limit = IVec3::splat(VOXEL_COORD_LIMIT);
		let mut min = min.clamp(-limit, limit);
		let mut max = max.clamp(-limit, limit);
		if let Some(bounds) = self.settings.world_bounds {
			min = min.max(self.settings.world_to_global_voxel(bounds.min));
			max = max.min(self.settings.world_to_global_voxel(bounds.max));
		}
		if min.cmpgt(max).any() {
			return Vec::new();
		}
		let chunk_size = self.settings.chunk_size;
		let (chunk_min, _) = self.settings.split_global_voxel(min);
		let (chunk_max, _) = self.settings.split_global_voxel(max);
		if self.settings.world_bounds.is_none() {
			let span = (chunk_max - chunk_min + IVec3::ONE).as_i64vec3();
			let touched = span.x * span.y * span.z;
			if touched > MAX_CHUNKS_PER_EDIT {
				warn!(
					"Refusing a voxel edit spanning {} chunks in an unbounded world, the limit is {}",
					touched, MAX_CHUNKS_PER_EDIT
				);
				return Vec::new();
			}
		}
		let mut regions = Vec::new();
		for x in chunk_min.x..=chunk_max.x {
			for y in chunk_min.y..=chunk_max.y {
				for z in chunk_min.z..=chunk_max.z {
					let chunk = IVec3::new(x, y, z);
					let origin = chunk * chunk_size;
					// clip the box to this chunk on every axis independently
					let local_min = (min - origin).max(IVec3::ZERO);
					let local_max = (max - origin).min(chunk_size - IVec3::ONE);
					regions.push(DirtyRegion::new(chunk, local_min, local_max));
				}
			}
		}
		regions
	}
	/// Block (walkable mask `0`) or open (every layer) every voxel whose
	/// bounds intersect the box of half size `extents` around `center`, the
	/// chunks touched are marked dirty. Returns the regions that were edited,
	/// marking the same box twice leaves the voxels unchanged
	pub fn set_obstacle_box(&self, center: Vec3, extents: Vec3, blocked: bool) -> Vec<DirtyRegion> {
		if !center.is_finite() || !extents.is_finite() {
			return Vec::new();
		}
		let (min, max) = self
			.settings
			.voxel_range_of_box(WorldBounds::from_center_extents(center, extents));
		let mask = if blocked { 0 } else { u8::MAX };
		let regions = self.regions_overlapping(min, max);
		for region in regions.iter() {
			self.get_or_create_chunk(region.chunk, |chunk| {
				for z in region.voxel_min.z..=region.voxel_max.z {
					for y in region.voxel_min.y..=region.voxel_max.y {
						for x in region.voxel_min.x..=region.voxel_max.x {
							if let Some(voxel) = chunk.get_voxel_mut(IVec3::new(x, y, z)) {
								voxel.walkable_mask = mask;
							}
						}
					}
				}
				chunk.set_dirty(true);
			});
		}
		trace!("Obstacle box edited {} chunk regions", regions.len());
		regions
	}
	/// Overwrite the walkable mask of the voxel containing `world`. Returns
	/// false when the position does not map onto a voxel
	pub fn set_walkable_mask(&self, world: Vec3, walkable_mask: u8) -> bool {
		let Some((chunk, local)) = self.world_to_voxel(world) else {
			return false;
		};
		self.get_or_create_chunk(chunk, |c| match c.get_voxel_mut(local) {
			Some(voxel) => {
				voxel.walkable_mask = walkable_mask;
				c.set_dirty(true);
				true
			}
			None => false,
		})
	}
	/// Overwrite the step cost of the voxel containing `world`. Returns false
	/// when the position does not map onto a voxel
	pub fn set_voxel_cost(&self, world: Vec3, cost: u16) -> bool {
		let Some((chunk, local)) = self.world_to_voxel(world) else {
			return false;
		};
		self.get_or_create_chunk(chunk, |c| match c.get_voxel_mut(local) {
			Some(voxel) => {
				voxel.cost = cost;
				c.set_dirty(true);
				true
			}
			None => false,
		})
	}
	/// Whether the voxel containing `world` is allocated and open to `layer`
	pub fn is_walkable(&self, world: Vec3, layer: AgentLayer) -> bool {
		let Some((chunk, local)) = self.world_to_voxel(world) else {
			return false;
		};
		self.read_chunks()
			.get(&chunk)
			.and_then(|c| c.get_voxel(local))
			.is_some_and(|v| layer.can_traverse(v.walkable_mask))
	}
	/// Snapshot every chunk into an immutable input for a build towards `target`
	pub fn fill_build_input(&self, target: Vec3, layer: AgentLayer) -> BuildInput {
		let chunk_snapshots = self.read_chunks().clone();
		BuildInput {
			chunk_snapshots,
			target,
			layer,
			settings: self.settings,
		}
	}
	/// Write the distances and directions of a finished build back into the
	/// chunks it solved and mark them clean
	pub fn consume_build_output(&self, output: &BuildOutput) {
		let mut chunks = self.write_chunks();
		for (coord, buffer) in output.chunk_results.iter() {
			if let Some(chunk) = chunks.get_mut(coord) {
				for (i, voxel) in chunk.get_voxels_mut().iter_mut().enumerate() {
					if let (Some(distance), Some(direction)) =
						(buffer.distance_field.get(i), buffer.packed_directions.get(i))
					{
						voxel.distance = *distance;
						voxel.flow_direction = *direction;
					}
				}
				chunk.set_dirty(false);
			}
		}
	}
}
