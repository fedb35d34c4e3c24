//! Errors surfaced at the validation boundary of field construction and by
//! the optional file loaders
//!

use bevy::prelude::*;

use crate::prelude::FieldCell;

/// Failures reported synchronously by builders, managers and loaders.
///
/// Coordinates outside of a grid are never reported through this type, they
/// resolve to sentinel values so per-agent queries stay branch-cheap
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FlowFieldError {
	/// The destination cell of a dense field is outside the grid or has a weight of `0`
	#[error("destination cell {0:?} is out of bounds or not walkable")]
	InvalidDestination(FieldCell),
	/// The target of a voxel field does not lie on a walkable voxel of an allocated chunk
	#[error("target {0} does not lie on a walkable voxel")]
	InvalidTarget(Vec3),
	/// Mismatched array lengths or malformed settings
	#[error("invalid argument: {0}")]
	InvalidArgument(String),
	/// Reading a file or spawning a worker thread failed
	#[error(transparent)]
	Io(#[from] std::io::Error),
	/// A `ron` file could not be deserialised
	#[cfg(feature = "ron")]
	#[error("failed deserializing ron: {0}")]
	Ron(#[from] ron::error::SpannedError),
	/// A `csv` file could not be read
	#[cfg(feature = "csv")]
	#[error("failed reading csv: {0}")]
	Csv(#[from] csv::Error),
	/// A heightmap image could not be opened
	#[cfg(feature = "heightmap")]
	#[error("failed opening heightmap: {0}")]
	Image(String),
}

impl FlowFieldError {
	/// Creates an [FlowFieldError::InvalidArgument]
	pub fn invalid_argument(reason: impl Into<String>) -> Self {
		Self::InvalidArgument(reason.into())
	}
}
