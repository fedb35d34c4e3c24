//! Logic for placing and clearing obstacles. A single event drives whichever
//! managers the app has inserted, the dense field rebuilds synchronously while
//! the voxel field queues a background rebuild
//!

use crate::prelude::*;
use bevy::prelude::*;

/// Block or open every cell and voxel under an axis aligned box
#[derive(Event, Clone, Copy, Debug)]
pub struct EventMarkObstacleBox {
	/// Centre of the box in world space
	center: Vec3,
	/// Half size of the box
	extents: Vec3,
	/// Whether the box is being placed or removed
	blocked: bool,
}

impl EventMarkObstacleBox {
	/// Create a new instance of [EventMarkObstacleBox]
	#[cfg(not(tarpaulin_include))]
	pub fn new(center: Vec3, extents: Vec3, blocked: bool) -> Self {
		EventMarkObstacleBox {
			center,
			extents,
			blocked,
		}
	}
	#[cfg(not(tarpaulin_include))]
	pub fn get_center(&self) -> Vec3 {
		self.center
	}
	#[cfg(not(tarpaulin_include))]
	pub fn get_extents(&self) -> Vec3 {
		self.extents
	}
	#[cfg(not(tarpaulin_include))]
	pub fn is_blocked(&self) -> bool {
		self.blocked
	}
}

/// Read [EventMarkObstacleBox] and apply it to the dense and voxel managers.
/// The voxel grid takes every box of the frame before a single rebuild is
/// requested
#[cfg(not(tarpaulin_include))]
pub fn process_obstacle_boxes(
	mut events: EventReader<EventMarkObstacleBox>,
	dense: Option<ResMut<FlowFieldManager>>,
	dynamic: Option<ResMut<DynamicFlowFieldManager>>,
) {
	let boxes: Vec<EventMarkObstacleBox> = events.read().copied().collect();
	if boxes.is_empty() {
		return;
	}
	if let Some(mut dense) = dense {
		for obstacle in boxes.iter() {
			dense.mark_obstacle_box(obstacle.get_center(), obstacle.get_extents(), obstacle.is_blocked());
		}
	}
	if let Some(mut dynamic) = dynamic {
		let mut edited = false;
		for obstacle in boxes.iter() {
			let regions = dynamic.get_grid().set_obstacle_box(
				obstacle.get_center(),
				obstacle.get_extents(),
				obstacle.is_blocked(),
			);
			edited |= !regions.is_empty();
		}
		if edited {
			if let Err(e) = dynamic.request_rebuild() {
				warn!("Obstacles left no valid flowfield: {}", e);
			}
		}
	}
}
