//! A sparse 3D world of voxels partitioned into fixed size chunks.
//!
//! World positions are floored into global voxel coordinates from the grid
//! origin, global voxels are then split into the coordinate of the chunk that
//! owns them and a local coordinate within that chunk:
//!
//! ```text
//!  chunk (-1, 0)            chunk (0, 0)             chunk (1, 0)
//!  ____________________     ____________________     ____________________
//! |    |    |    |    |   |    |    |    |    |   |    |    |    |    |
//! | -4 | -3 | -2 | -1 |   |  0 |  1 |  2 |  3 |   |  4 |  5 |  6 |  7 |   global x
//! |  0 |  1 |  2 |  3 |   |  0 |  1 |  2 |  3 |   |  0 |  1 |  2 |  3 |   local x
//! |____|____|____|____|   |____|____|____|____|   |____|____|____|____|
//! ```
//!
//! Chunks are allocated lazily the first time they are referenced, or up
//! front across the world bounds when they are supplied. Each voxel carries a
//! walkable bitmask with one bit per [AgentLayer] so that, for instance, water
//! can be open to amphibious and flying agents while blocking ground agents.
//!

pub mod solver;
pub mod voxel_grid;

use crate::prelude::*;
use bevy::prelude::*;

/// Largest number of voxels a single chunk may hold
pub const MAX_CHUNK_VOXELS: usize = 1 << 22;
/// Global voxel coordinates are addressable within `-VOXEL_COORD_LIMIT..=VOXEL_COORD_LIMIT`
/// on every axis, the range over which an `f32` still resolves whole voxels
pub const VOXEL_COORD_LIMIT: i32 = 1 << 24;

/// Number of voxels in a block of `dimensions`, negative axes count as empty
pub fn voxel_count(dimensions: IVec3) -> usize {
	let d = dimensions.max(IVec3::ZERO);
	(d.x as usize)
		.saturating_mul(d.y as usize)
		.saturating_mul(d.z as usize)
}

/// The kind of agent a voxel field is solved for
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Reflect)]
pub enum AgentLayer {
	#[default]
	Ground,
	Flying,
	Amphibious,
	Custom0,
	Custom1,
	Custom2,
	Custom3,
}

impl AgentLayer {
	/// The bit of a voxel's walkable mask that opens it to this layer
	pub fn bit(&self) -> u8 {
		1 << (*self as u8)
	}
	/// Whether `walkable_mask` opens a voxel to this layer
	pub fn can_traverse(&self, walkable_mask: u8) -> bool {
		walkable_mask & self.bit() != 0
	}
}

/// An axis aligned box of world space
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Clone, Copy, Debug, PartialEq, Reflect)]
pub struct WorldBounds {
	/// Lowest corner
	pub min: Vec3,
	/// Highest corner
	pub max: Vec3,
}

impl WorldBounds {
	/// Create a new instance of [WorldBounds]
	pub fn new(min: Vec3, max: Vec3) -> Self {
		WorldBounds { min, max }
	}
	/// Box of half size `extents` around `center`
	pub fn from_center_extents(center: Vec3, extents: Vec3) -> Self {
		WorldBounds {
			min: center - extents.abs(),
			max: center + extents.abs(),
		}
	}
	/// Finite with `min` not exceeding `max` on any axis
	pub fn is_valid(&self) -> bool {
		self.min.is_finite() && self.max.is_finite() && self.min.cmple(self.max).all()
	}
	/// Whether `point` lies inside the box, faces included
	pub fn contains(&self, point: Vec3) -> bool {
		point.cmpge(self.min).all() && point.cmple(self.max).all()
	}
}

/// Layout of a chunked voxel world.
///
/// With the `ron` feature settings can be loaded from disk:
///
/// ```text
/// (
/// 	voxel_size: 100.0,
/// 	chunk_size: (8, 8, 1),
/// 	grid_origin: (0.0, 0.0, 0.0),
/// 	world_bounds: Some((min: (-400.0, -400.0, -400.0), max: (400.0, 400.0, 400.0))),
/// )
/// ```
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Clone, Copy, Debug, PartialEq, Reflect)]
pub struct VoxelSettings {
	/// World length of a side of a voxel
	pub voxel_size: f32,
	/// Number of voxels along each axis of a chunk
	pub chunk_size: IVec3,
	/// World position of the corner of global voxel `(0, 0, 0)`
	pub grid_origin: Vec3,
	/// Optional extent of the world, positions outside it never map onto a voxel
	pub world_bounds: Option<WorldBounds>,
}

impl Default for VoxelSettings {
	fn default() -> Self {
		VoxelSettings {
			voxel_size: 100.0,
			chunk_size: IVec3::new(32, 32, 16),
			grid_origin: Vec3::ZERO,
			world_bounds: None,
		}
	}
}

impl VoxelSettings {
	/// Reject non-positive voxel or chunk sizes, chunks larger than
	/// [MAX_CHUNK_VOXELS], and bounds that are inverted or reach beyond the
	/// addressable voxel range
	pub fn validate(&self) -> Result<(), FlowFieldError> {
		if !(self.voxel_size.is_finite() && self.voxel_size > 0.0) {
			return Err(FlowFieldError::invalid_argument(format!(
				"voxel_size must be a positive number, found {}",
				self.voxel_size
			)));
		}
		if self.chunk_size.cmple(IVec3::ZERO).any() {
			return Err(FlowFieldError::invalid_argument(format!(
				"chunk_size must be positive on every axis, found {}",
				self.chunk_size
			)));
		}
		if voxel_count(self.chunk_size) > MAX_CHUNK_VOXELS {
			return Err(FlowFieldError::invalid_argument(format!(
				"chunk_size {} holds more than {} voxels",
				self.chunk_size, MAX_CHUNK_VOXELS
			)));
		}
		if !self.grid_origin.is_finite() {
			return Err(FlowFieldError::invalid_argument("grid origin must be finite"));
		}
		if let Some(bounds) = self.world_bounds {
			if !bounds.is_valid() {
				return Err(FlowFieldError::invalid_argument(format!(
					"world bounds are inverted or not finite: {:?}",
					bounds
				)));
			}
			if !self.is_addressable(bounds.min) || !self.is_addressable(bounds.max) {
				return Err(FlowFieldError::invalid_argument(format!(
					"world bounds {:?} reach beyond {} voxels from the grid origin",
					bounds, VOXEL_COORD_LIMIT
				)));
			}
		}
		Ok(())
	}
	/// Number of voxels in a chunk
	pub fn chunk_voxel_count(&self) -> usize {
		voxel_count(self.chunk_size)
	}
	/// Unrounded global voxel coordinate of `world`
	fn world_to_voxel_units(&self, world: Vec3) -> Vec3 {
		(world - self.grid_origin) / self.voxel_size
	}
	/// Whether `world` lies within the addressable voxel range
	pub fn is_addressable(&self, world: Vec3) -> bool {
		let limit = Vec3::splat(VOXEL_COORD_LIMIT as f32);
		self.world_to_voxel_units(world).floor().abs().cmple(limit).all()
	}
	/// Global voxel containing `world`, ignoring the world bounds. Positions
	/// beyond the addressable range are clamped onto its edge
	pub fn world_to_global_voxel(&self, world: Vec3) -> IVec3 {
		clamp_voxel_units(self.world_to_voxel_units(world).floor())
	}
	/// Global voxel range `min..=max` of every voxel whose bounds intersect
	/// the world box, clamped to the addressable range
	pub fn voxel_range_of_box(&self, bounds: WorldBounds) -> (IVec3, IVec3) {
		let min = clamp_voxel_units(self.world_to_voxel_units(bounds.min).floor());
		let max = clamp_voxel_units(self.world_to_voxel_units(bounds.max).ceil()).saturating_sub(IVec3::ONE);
		(min, max)
	}
	/// Split a global voxel into its `(chunk, local voxel)` coordinates
	pub fn split_global_voxel(&self, global: IVec3) -> (IVec3, IVec3) {
		(
			global.div_euclid(self.chunk_size),
			global.rem_euclid(self.chunk_size),
		)
	}
	/// The `(chunk, local voxel)` containing `world`, [None] when the position
	/// is not finite or lies outside the world bounds
	pub fn world_to_voxel(&self, world: Vec3) -> Option<(IVec3, IVec3)> {
		if !world.is_finite() || !self.is_addressable(world) {
			return None;
		}
		if let Some(bounds) = self.world_bounds {
			if !bounds.contains(world) {
				return None;
			}
		}
		Some(self.split_global_voxel(self.world_to_global_voxel(world)))
	}
	/// World position of the centre of a voxel
	pub fn voxel_to_world_center(&self, chunk: IVec3, local: IVec3) -> Vec3 {
		let global = chunk.as_vec3() * self.chunk_size.as_vec3() + local.as_vec3();
		self.grid_origin + (global + Vec3::splat(0.5)) * self.voxel_size
	}
	/// From a `ron` file generate the [VoxelSettings]
	#[cfg(feature = "ron")]
	pub fn from_ron(path: &str) -> Result<Self, FlowFieldError> {
		let file = std::fs::File::open(path)?;
		let settings: VoxelSettings = ron::de::from_reader(file)?;
		settings.validate()?;
		Ok(settings)
	}
}

/// Round voxel units into global voxel coordinates within the addressable range
fn clamp_voxel_units(units: Vec3) -> IVec3 {
	let limit = VOXEL_COORD_LIMIT as f32;
	units.clamp(Vec3::splat(-limit), Vec3::splat(limit)).as_ivec3()
}

/// The smallest unit of the voxel world
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Reflect)]
pub struct Voxel {
	/// One bit per [AgentLayer], a set bit opens the voxel to that layer
	pub walkable_mask: u8,
	/// Cost of stepping into the voxel
	pub cost: u16,
	/// Distance to the target written back from the last consumed build
	pub distance: i32,
	/// Offset towards the neighbour nearer the target from the last consumed build
	pub flow_direction: IVec3,
}

impl Default for Voxel {
	fn default() -> Self {
		Voxel {
			walkable_mask: u8::MAX,
			cost: 1,
			distance: UNREACHED_DISTANCE,
			flow_direction: IVec3::ZERO,
		}
	}
}

impl Voxel {
	/// Drop any cached solve
	pub fn clear_solve(&mut self) {
		self.distance = UNREACHED_DISTANCE;
		self.flow_direction = IVec3::ZERO;
	}
}

/// A fixed size block of voxels, the unit of allocation and of solving
#[derive(Clone, Debug, PartialEq)]
pub struct VoxelChunk {
	/// Voxels indexed by `z * dy * dx + y * dx + x`
	voxels: Vec<Voxel>,
	/// Number of voxels along each axis
	dimensions: IVec3,
	/// Global coordinate of local voxel `(0, 0, 0)`
	origin_voxel: IVec3,
	/// Whether the cached solve of any voxel is stale
	is_dirty: bool,
}

impl VoxelChunk {
	/// Create a new instance of [VoxelChunk] at chunk coordinate `chunk` full of open voxels
	pub fn new(chunk: IVec3, dimensions: IVec3) -> Self {
		VoxelChunk {
			voxels: vec![Voxel::default(); voxel_count(dimensions)],
			dimensions,
			origin_voxel: chunk.saturating_mul(dimensions),
			is_dirty: true,
		}
	}
	/// Get the voxels
	pub fn get_voxels(&self) -> &[Voxel] {
		&self.voxels
	}
	/// Number of voxels along each axis
	pub fn get_dimensions(&self) -> IVec3 {
		self.dimensions
	}
	/// Global coordinate of local voxel `(0, 0, 0)`
	pub fn get_origin_voxel(&self) -> IVec3 {
		self.origin_voxel
	}
	/// Whether the cached solve of any voxel is stale
	pub fn is_dirty(&self) -> bool {
		self.is_dirty
	}
	/// Flag the chunk stale or fresh
	pub fn set_dirty(&mut self, dirty: bool) {
		self.is_dirty = dirty;
	}
	/// Whether `local` lies within the chunk
	pub fn is_valid_local(&self, local: IVec3) -> bool {
		local.cmpge(IVec3::ZERO).all() && local.cmplt(self.dimensions).all()
	}
	/// Index of `local` within the voxel array
	pub fn get_index(&self, local: IVec3) -> Option<usize> {
		if self.is_valid_local(local) {
			Some(
				(local.z * self.dimensions.y * self.dimensions.x
					+ local.y * self.dimensions.x
					+ local.x) as usize,
			)
		} else {
			None
		}
	}
	/// Local coordinate of an index of the voxel array
	pub fn get_local(&self, index: usize) -> IVec3 {
		let index = index as i32;
		let layer = self.dimensions.x * self.dimensions.y;
		IVec3::new(
			index % self.dimensions.x,
			(index % layer) / self.dimensions.x,
			index / layer,
		)
	}
	/// Get a voxel
	pub fn get_voxel(&self, local: IVec3) -> Option<&Voxel> {
		self.get_index(local).map(|i| &self.voxels[i])
	}
	/// Get a mutable voxel
	pub fn get_voxel_mut(&mut self, local: IVec3) -> Option<&mut Voxel> {
		match self.get_index(local) {
			Some(i) => Some(&mut self.voxels[i]),
			None => None,
		}
	}
	/// Get the voxels mutably
	pub fn get_voxels_mut(&mut self) -> &mut [Voxel] {
		&mut self.voxels
	}
}

/// An inclusive box of local voxels within one chunk whose cached solve is stale
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Reflect)]
pub struct DirtyRegion {
	/// Coordinate of the chunk
	pub chunk: IVec3,
	/// Lowest local voxel
	pub voxel_min: IVec3,
	/// Highest local voxel
	pub voxel_max: IVec3,
}

impl DirtyRegion {
	/// Create a new instance of [DirtyRegion]
	pub fn new(chunk: IVec3, voxel_min: IVec3, voxel_max: IVec3) -> Self {
		DirtyRegion {
			chunk,
			voxel_min,
			voxel_max,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	#[test]
	fn layer_bits() {
		assert_eq!(0b1, AgentLayer::Ground.bit());
		assert_eq!(0b100, AgentLayer::Amphibious.bit());
		assert_eq!(0b100_0000, AgentLayer::Custom3.bit());
		let water = AgentLayer::Flying.bit() | AgentLayer::Amphibious.bit();
		assert!(!AgentLayer::Ground.can_traverse(water));
		assert!(AgentLayer::Amphibious.can_traverse(water));
	}
	#[test]
	fn default_settings() {
		let settings = VoxelSettings::default();
		assert!(settings.validate().is_ok());
		assert_eq!(32 * 32 * 16, settings.chunk_voxel_count());
	}
	#[test]
	fn reject_bad_settings() {
		let settings = VoxelSettings {
			chunk_size: IVec3::new(8, 0, 1),
			..default()
		};
		assert!(settings.validate().is_err());
		let settings = VoxelSettings {
			world_bounds: Some(WorldBounds::new(Vec3::ONE, Vec3::ZERO)),
			..default()
		};
		assert!(settings.validate().is_err());
	}
	#[test]
	fn reject_oversized_chunks() {
		let settings = VoxelSettings {
			chunk_size: IVec3::new(2048, 2048, 1024),
			world_bounds: Some(WorldBounds::new(Vec3::splat(-400.0), Vec3::splat(400.0))),
			..default()
		};
		assert!(matches!(settings.validate(), Err(FlowFieldError::InvalidArgument(_))));
		assert!(VoxelGrid::new(settings).is_err());
		let settings = VoxelSettings {
			chunk_size: IVec3::new(256, 128, 128),
			..default()
		};
		assert_eq!(MAX_CHUNK_VOXELS, settings.chunk_voxel_count());
		assert!(settings.validate().is_ok());
	}
	#[test]
	fn reject_unaddressable_bounds() {
		let settings = VoxelSettings {
			voxel_size: 1.0,
			world_bounds: Some(WorldBounds::new(Vec3::splat(-1.0e30), Vec3::ZERO)),
			..default()
		};
		assert!(settings.validate().is_err());
	}
	#[test]
	fn far_positions_do_not_map() {
		let settings = VoxelSettings::default();
		assert!(settings.world_to_voxel(Vec3::new(-1.0e30, 0.0, 0.0)).is_none());
		assert!(settings.world_to_voxel(Vec3::new(0.0, 0.0, 1.0e30)).is_none());
		let edge = VOXEL_COORD_LIMIT as f32 * 100.0;
		assert_eq!(IVec3::new(VOXEL_COORD_LIMIT, 0, 0), settings.world_to_global_voxel(Vec3::new(edge * 4.0, 0.0, 0.0)));
		let (min, max) = settings.voxel_range_of_box(WorldBounds::new(Vec3::splat(-1.0e30), Vec3::splat(-1.0e29)));
		assert_eq!(IVec3::splat(-VOXEL_COORD_LIMIT), min);
		assert_eq!(IVec3::splat(-VOXEL_COORD_LIMIT - 1), max);
		// far chunk coordinates resolve in float space rather than overflowing
		let centre = settings.voxel_to_world_center(IVec3::splat(i32::MAX), IVec3::ZERO);
		assert!(centre.is_finite());
	}
	#[test]
	fn negative_positions_floor_into_chunks() {
		let settings = VoxelSettings {
			chunk_size: IVec3::new(4, 4, 1),
			..default()
		};
		let (chunk, local) = settings.world_to_voxel(Vec3::new(-50.0, 50.0, 0.0)).unwrap();
		assert_eq!(IVec3::new(-1, 0, 0), chunk);
		assert_eq!(IVec3::new(3, 0, 0), local);
		let (chunk, local) = settings.world_to_voxel(Vec3::new(-450.0, 450.0, -1.0)).unwrap();
		assert_eq!(IVec3::new(-2, 1, -1), chunk);
		assert_eq!(IVec3::new(3, 0, 0), local);
	}
	#[test]
	fn positions_outside_bounds_are_rejected() {
		let settings = VoxelSettings {
			world_bounds: Some(WorldBounds::new(Vec3::splat(-400.0), Vec3::splat(400.0))),
			..default()
		};
		assert!(settings.world_to_voxel(Vec3::new(401.0, 0.0, 0.0)).is_none());
		assert!(settings.world_to_voxel(Vec3::new(400.0, 0.0, 0.0)).is_some());
		assert!(settings.world_to_voxel(Vec3::NAN).is_none());
	}
	#[test]
	fn voxel_centre_round_trip() {
		let settings = VoxelSettings {
			voxel_size: 25.0,
			chunk_size: IVec3::new(4, 3, 2),
			grid_origin: Vec3::new(10.0, -20.0, 5.0),
			world_bounds: None,
		};
		for chunk in [IVec3::ZERO, IVec3::new(-1, 2, -3)] {
			for local in [IVec3::ZERO, IVec3::new(3, 2, 1), IVec3::new(1, 0, 1)] {
				let world = settings.voxel_to_world_center(chunk, local);
				assert_eq!(Some((chunk, local)), settings.world_to_voxel(world));
			}
		}
	}
	#[test]
	#[cfg(feature = "ron")]
	fn settings_file() {
		let path = env!("CARGO_MANIFEST_DIR").to_string() + "/assets/voxel_settings.ron";
		let settings = VoxelSettings::from_ron(&path).unwrap();
		assert_eq!(IVec3::new(8, 8, 1), settings.chunk_size);
		assert!(settings.world_bounds.is_some());
	}
	#[test]
	fn chunk_indexing() {
		let chunk = VoxelChunk::new(IVec3::new(1, 0, 2), IVec3::new(4, 3, 2));
		assert_eq!(24, chunk.get_voxels().len());
		assert_eq!(IVec3::new(4, 0, 4), chunk.get_origin_voxel());
		assert_eq!(Some(0), chunk.get_index(IVec3::ZERO));
		assert_eq!(Some(3 * 4 + 2 * 4 + 3), chunk.get_index(IVec3::new(3, 2, 1)));
		assert_eq!(None, chunk.get_index(IVec3::new(4, 0, 0)));
		assert_eq!(None, chunk.get_index(IVec3::new(0, -1, 0)));
		for i in 0..24 {
			assert_eq!(Some(i), chunk.get_index(chunk.get_local(i)));
		}
	}
}
