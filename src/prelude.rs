//! `use bevy_dynamic_flowfield_plugin::prelude::*;` to import common structures and methods
//!

#[doc(hidden)]
pub use crate::flowfields::{
	buffers::*,
	dense::*,
	fields::{flow_field::*, integration_field::*, weight_field::*, *},
	scheduler::*,
	settings::*,
	utilities::*,
	voxels::{solver::*, voxel_grid::*, *},
};

#[doc(hidden)]
pub use crate::{
	error::*,
	plugin::{dense_layer::*, obstacle_layer::*, voxel_layer::*, *},
};
