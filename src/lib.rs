//! This is a plugin for Bevy game engine to build FlowFields over a dense 2D
//! grid, or over a chunked 3D voxel world whose fields are rebuilt on
//! background workers and double buffered for agents to sample
//!

pub mod error;
pub mod flowfields;
pub mod plugin;

pub mod prelude;
