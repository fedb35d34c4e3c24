//! Defines the Bevy [Plugin] for dynamic FlowFields.
//!
//! The plugin registers the events and systems, the managers themselves are
//! inserted by the app so that it decides which of the dense and voxel fields
//! it needs:
//!
//! ```text
//! app.add_plugins(FlowFieldPlugin)
//!     .insert_resource(FlowFieldManager::new(settings)?)
//!     .insert_resource(DynamicFlowFieldManager::new(voxel_settings, scheduler_settings)?);
//! ```
//!

use crate::prelude::*;
use bevy::prelude::*;

pub mod dense_layer;
pub mod obstacle_layer;
pub mod voxel_layer;

#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum OrderingSet {
	Tidy,
	Calculate,
}

pub struct FlowFieldPlugin;

impl Plugin for FlowFieldPlugin {
	#[cfg(not(tarpaulin_include))]
	fn build(&self, app: &mut App) {
		app.register_type::<Ordinal>()
			.register_type::<FieldCell>()
			.register_type::<FlowFieldSettings>()
			.register_type::<WeightField>()
			.register_type::<IntegrationField>()
			.register_type::<FlowField>()
			.register_type::<FlowFieldDebugSnapshot>()
			.register_type::<AgentLayer>()
			.register_type::<WorldBounds>()
			.register_type::<VoxelSettings>()
			.register_type::<DirtyRegion>()
			.register_type::<BuildSchedulerSettings>()
			.add_event::<obstacle_layer::EventMarkObstacleBox>()
			.add_event::<dense_layer::EventBuildDenseField>()
			.add_event::<voxel_layer::EventSetGlobalTarget>()
			.add_event::<voxel_layer::EventSetAgentLayer>()
			.add_event::<voxel_layer::EventFlowFieldReady>()
			.configure_sets(Update, (OrderingSet::Tidy, OrderingSet::Calculate).chain())
			.add_systems(
				Update,
				(
					obstacle_layer::process_obstacle_boxes.in_set(OrderingSet::Tidy),
					(
						dense_layer::process_dense_build_requests
							.run_if(resource_exists::<FlowFieldManager>),
						(
							voxel_layer::process_agent_layer_requests,
							voxel_layer::process_global_target_requests,
							voxel_layer::tick_dynamic_flowfield,
						)
							.chain()
							.run_if(resource_exists::<DynamicFlowFieldManager>),
					)
						.in_set(OrderingSet::Calculate),
				),
			);
	}
}
