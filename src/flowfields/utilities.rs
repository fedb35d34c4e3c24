//! Useful structures and tools used by the fields
//!

use std::f32::consts::FRAC_PI_4;

use bevy::prelude::*;

/// Tolerance used when comparing accumulated integration costs and when
/// clamping normalised weights away from zero
pub const COST_EPSILON: f32 = 1.0e-4;
/// Integration cost of a [crate::prelude::FieldCell] the wavefront never reached
pub const UNREACHED_COST: f32 = f32::MAX;
/// Distance of a voxel the wavefront never reached
pub const UNREACHED_DISTANCE: i32 = i32::MAX;
/// Traversal weight of a cell that can never be entered
pub const BLOCKED_WEIGHT: u8 = 0;
/// Traversal weight of unobstructed ground, the cheapest possible cell
pub const DEFAULT_TRAVERSAL_WEIGHT: u8 = 255;

/// Orthogonal neighbour offsets in relaxation order: east, west, north, south
pub const CARDINAL_OFFSETS: [IVec2; 4] = [
	IVec2::new(1, 0),
	IVec2::new(-1, 0),
	IVec2::new(0, 1),
	IVec2::new(0, -1),
];

/// The [CARDINAL_OFFSETS] followed by the four diagonals
pub const ALL_OFFSETS: [IVec2; 8] = [
	IVec2::new(1, 0),
	IVec2::new(-1, 0),
	IVec2::new(0, 1),
	IVec2::new(0, -1),
	IVec2::new(1, 1),
	IVec2::new(1, -1),
	IVec2::new(-1, 1),
	IVec2::new(-1, -1),
];

/// Face neighbours of a voxel, voxel fields never relax along edges or corners
pub const VOXEL_OFFSETS: [IVec3; 6] = [
	IVec3::new(1, 0, 0),
	IVec3::new(-1, 0, 0),
	IVec3::new(0, 1, 0),
	IVec3::new(0, -1, 0),
	IVec3::new(0, 0, 1),
	IVec3::new(0, 0, -1),
];

/// Select the neighbour offsets used when stepping between cells
pub fn neighbour_offsets(allow_diagonal: bool) -> &'static [IVec2] {
	if allow_diagonal {
		&ALL_OFFSETS
	} else {
		&CARDINAL_OFFSETS
	}
}

/// Whether an offset moves along both axes at once
pub fn is_diagonal(offset: IVec2) -> bool {
	offset.x != 0 && offset.y != 0
}

/// Convenience way of naming the 8 directions of movement across a grid. Grid
/// rows grow towards `North`, columns grow towards `East`
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[derive(Debug, PartialEq, Eq, Clone, Copy, Reflect)]
pub enum Ordinal {
	North,
	East,
	South,
	West,
	NorthEast,
	SouthEast,
	SouthWest,
	NorthWest,
	/// Special case, a cell with no direction of travel (unreachable or the destination)
	Zero,
}

impl Ordinal {
	/// The cell offset stepped when moving in this direction
	pub fn to_offset(&self) -> IVec2 {
		match self {
			Ordinal::North => IVec2::new(0, 1),
			Ordinal::East => IVec2::new(1, 0),
			Ordinal::South => IVec2::new(0, -1),
			Ordinal::West => IVec2::new(-1, 0),
			Ordinal::NorthEast => IVec2::new(1, 1),
			Ordinal::SouthEast => IVec2::new(1, -1),
			Ordinal::SouthWest => IVec2::new(-1, -1),
			Ordinal::NorthWest => IVec2::new(-1, 1),
			Ordinal::Zero => IVec2::ZERO,
		}
	}
	/// Snap a direction vector to the nearest of the 8 ordinals, a near zero
	/// vector becomes [Ordinal::Zero]
	pub fn from_direction(direction: Vec2) -> Ordinal {
		if !direction.is_finite() || direction.length_squared() < COST_EPSILON * COST_EPSILON {
			return Ordinal::Zero;
		}
		let angle = direction.y.atan2(direction.x);
		let octant = ((angle / FRAC_PI_4).round() as i32).rem_euclid(8);
		match octant {
			0 => Ordinal::East,
			1 => Ordinal::NorthEast,
			2 => Ordinal::North,
			3 => Ordinal::NorthWest,
			4 => Ordinal::West,
			5 => Ordinal::SouthWest,
			6 => Ordinal::South,
			_ => Ordinal::SouthEast,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	#[test]
	fn diagonal_offsets_only_when_enabled() {
		assert_eq!(4, neighbour_offsets(false).len());
		assert_eq!(8, neighbour_offsets(true).len());
		assert!(neighbour_offsets(false).iter().all(|o| !is_diagonal(*o)));
		assert_eq!(4, neighbour_offsets(true).iter().filter(|o| is_diagonal(**o)).count());
	}
	#[test]
	fn snap_direction_to_ordinal() {
		assert_eq!(Ordinal::East, Ordinal::from_direction(Vec2::new(1.0, 0.1)));
		assert_eq!(Ordinal::NorthEast, Ordinal::from_direction(Vec2::new(0.7, 0.7)));
		assert_eq!(Ordinal::North, Ordinal::from_direction(Vec2::new(0.0, 3.0)));
		assert_eq!(Ordinal::West, Ordinal::from_direction(Vec2::new(-1.0, 0.0)));
		assert_eq!(Ordinal::SouthWest, Ordinal::from_direction(Vec2::new(-0.5, -0.6)));
		assert_eq!(Ordinal::South, Ordinal::from_direction(Vec2::new(0.0, -1.0)));
		assert_eq!(Ordinal::SouthEast, Ordinal::from_direction(Vec2::new(0.6, -0.6)));
		assert_eq!(Ordinal::Zero, Ordinal::from_direction(Vec2::ZERO));
		assert_eq!(Ordinal::Zero, Ordinal::from_direction(Vec2::NAN));
	}
	#[test]
	fn ordinal_offset_round_trip() {
		for offset in ALL_OFFSETS.iter() {
			let ordinal = Ordinal::from_direction(offset.as_vec2());
			assert_eq!(*offset, ordinal.to_offset());
		}
	}
}
