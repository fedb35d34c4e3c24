//! Drive the voxel field through a headless app with the plugin installed
//!

use std::time::{Duration, Instant};

use bevy::prelude::*;
use bevy_dynamic_flowfield_plugin::prelude::*;

/// Generations announced by the plugin
#[derive(Resource, Default)]
struct ReadyGenerations(Vec<u64>);

/// An actor that steers by sampling the field
#[derive(Component)]
struct Agent {
	/// Read handle onto the field
	sampler: FlowFieldSampler,
	/// Kind of agent
	layer: AgentLayer,
	/// Last sampled direction
	heading: Vec3,
}

/// Record every [EventFlowFieldReady]
fn collect_ready(mut events: EventReader<EventFlowFieldReady>, mut ready: ResMut<ReadyGenerations>) {
	for event in events.read() {
		ready.0.push(event.generation);
	}
}

/// Sample a heading for each agent
fn steer(mut agents: Query<(&Transform, &mut Agent)>) {
	for (transform, mut agent) in agents.iter_mut() {
		agent.heading = agent.sampler.get_flow_direction_at(transform.translation, agent.layer);
	}
}

/// An app with 8x8x1 chunks of 100 unit voxels across -400 to 400
fn app() -> App {
	let voxel_settings = VoxelSettings {
		voxel_size: 100.0,
		chunk_size: IVec3::new(8, 8, 1),
		grid_origin: Vec3::ZERO,
		world_bounds: Some(WorldBounds::new(Vec3::splat(-400.0), Vec3::splat(400.0))),
	};
	let scheduler_settings = BuildSchedulerSettings {
		worker_threads: 1,
		..default()
	};
	let mut app = App::new();
	app.add_plugins(FlowFieldPlugin)
		.insert_resource(DynamicFlowFieldManager::new(voxel_settings, scheduler_settings).unwrap())
		.init_resource::<ReadyGenerations>()
		.add_systems(Update, (collect_ready, steer).after(OrderingSet::Calculate));
	app
}

/// Update the app until the voxel field has no build in flight
fn run_until_idle(app: &mut App) {
	let deadline = Instant::now() + Duration::from_secs(10);
	loop {
		app.update();
		if !app.world().resource::<DynamicFlowFieldManager>().is_building() {
			break;
		}
		assert!(Instant::now() < deadline, "build never completed");
		std::thread::sleep(Duration::from_millis(1));
	}
}

#[test]
fn superseded_build_is_never_swapped_in() {
	let mut app = app();
	let first = Vec3::new(50.0, 50.0, 50.0);
	let second = Vec3::new(350.0, 350.0, 50.0);
	app.world_mut().send_event(EventSetGlobalTarget(first));
	app.update();
	app.world_mut().send_event(EventSetGlobalTarget(second));
	app.update();
	run_until_idle(&mut app);
	// one more frame so the last announcement is collected
	app.update();
	let manager = app.world().resource::<DynamicFlowFieldManager>();
	assert_eq!(Some(second), manager.get_current_target());
	assert_eq!(1, manager.get_completed_builds());
	assert_eq!(1, manager.get_generation());
	assert_eq!(
		Vec3::X,
		manager.get_flow_direction_at(Vec3::new(50.0, 350.0, 50.0), AgentLayer::Ground)
	);
	assert_eq!(vec![1], app.world().resource::<ReadyGenerations>().0);
}

#[test]
fn agents_steer_with_their_sampler() {
	let mut app = app();
	let sampler = app.world().resource::<DynamicFlowFieldManager>().sampler();
	let ground = app
		.world_mut()
		.spawn((
			Transform::from_xyz(350.0, 50.0, 50.0),
			Agent {
				sampler: sampler.clone(),
				layer: AgentLayer::Ground,
				heading: Vec3::ZERO,
			},
		))
		.id();
	let flying = app
		.world_mut()
		.spawn((
			Transform::from_xyz(350.0, 50.0, 50.0),
			Agent {
				sampler,
				layer: AgentLayer::Flying,
				heading: Vec3::ZERO,
			},
		))
		.id();
	app.world_mut().send_event(EventSetGlobalTarget(Vec3::new(50.0, 50.0, 50.0)));
	run_until_idle(&mut app);
	app.update();
	assert_eq!(Vec3::NEG_X, app.world().get::<Agent>(ground).unwrap().heading);
	assert_eq!(Vec3::ZERO, app.world().get::<Agent>(flying).unwrap().heading);
	// switch the field over to flying agents
	app.world_mut().send_event(EventSetAgentLayer(AgentLayer::Flying));
	run_until_idle(&mut app);
	app.update();
	assert_eq!(Vec3::ZERO, app.world().get::<Agent>(ground).unwrap().heading);
	assert_eq!(Vec3::NEG_X, app.world().get::<Agent>(flying).unwrap().heading);
}

#[test]
fn obstacles_reach_both_managers() {
	let mut app = app();
	app.insert_resource(FlowFieldManager::new(FlowFieldSettings::new(8, 8, 100.0)).unwrap());
	app.world_mut().send_event(EventBuildDenseField(Vec3::new(50.0, 50.0, 0.0)));
	app.world_mut().send_event(EventSetGlobalTarget(Vec3::new(50.0, 50.0, 50.0)));
	run_until_idle(&mut app);
	assert!(app.world().resource::<FlowFieldManager>().has_valid_field());
	app.world_mut().send_event(EventMarkObstacleBox::new(
		Vec3::new(150.0, 50.0, 50.0),
		Vec3::splat(50.0),
		true,
	));
	app.update();
	let dense = app.world().resource::<FlowFieldManager>();
	assert_eq!(Vec3::ZERO, dense.get_direction_for_world_position(Vec3::new(150.0, 50.0, 0.0)));
	let d = dense.get_direction_for_world_position(Vec3::new(250.0, 50.0, 0.0));
	assert!(d.y > 0.0);
	run_until_idle(&mut app);
	let dynamic = app.world().resource::<DynamicFlowFieldManager>();
	assert_eq!(2, dynamic.get_generation());
	assert_eq!(
		Vec3::Y,
		dynamic.get_flow_direction_at(Vec3::new(250.0, 50.0, 50.0), AgentLayer::Ground)
	);
}

#[test]
fn unreachable_target_request_is_ignored() {
	let mut app = app();
	app.world_mut().send_event(EventSetGlobalTarget(Vec3::new(50.0, 50.0, 50.0)));
	run_until_idle(&mut app);
	// outside the world bounds
	app.world_mut().send_event(EventSetGlobalTarget(Vec3::new(5000.0, 50.0, 50.0)));
	app.update();
	let manager = app.world().resource::<DynamicFlowFieldManager>();
	assert!(!manager.is_building());
	assert_eq!(Some(Vec3::new(50.0, 50.0, 50.0)), manager.get_current_target());
	assert_eq!(1, manager.get_generation());
	assert_eq!(
		Vec3::NEG_X,
		manager.get_flow_direction_at(Vec3::new(150.0, 50.0, 50.0), AgentLayer::Ground)
	);
}

#[test]
fn run_without_any_manager() {
	let mut app = App::new();
	app.add_plugins(FlowFieldPlugin);
	app.world_mut().send_event(EventSetGlobalTarget(Vec3::ZERO));
	app.world_mut().send_event(EventMarkObstacleBox::new(Vec3::ZERO, Vec3::ONE, true));
	app.update();
	app.update();
}
