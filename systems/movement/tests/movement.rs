use std::time::Duration;

use corral_core::{CancelReason, EntityId, PhysicsBodies, Spatial, TaskOutcome};
use corral_system_movement::{MoveOrder, Movement, Resolution};
use corral_world::{query, EntitySpec, World};
use glam::Vec2;

const SECOND: Duration = Duration::from_secs(1);

fn spawn(world: &mut World, position: Vec2) -> EntityId {
    world.spawn(EntitySpec::at(position, Vec2::splat(2.0)).with_body())
}

#[test]
fn task_travels_at_speed_and_completes_once() {
    let mut world = World::new();
    let mut movement = Movement::new();
    let mut resolutions = Vec::new();
    let entity = spawn(&mut world, Vec2::ZERO);

    let handle = movement.start(
        &mut world,
        entity,
        MoveOrder::to_point(Vec2::new(10.0, 0.0), 4.0),
        &mut resolutions,
    );
    assert!(resolutions.is_empty(), "fresh entity has nothing to cancel");

    movement.tick(&mut world, SECOND, &mut resolutions);
    assert_eq!(world.position(entity), Some(Vec2::new(4.0, 0.0)));
    assert_eq!(query::body_velocity(&world, entity), Some(Vec2::new(4.0, 0.0)));

    movement.tick(&mut world, SECOND, &mut resolutions);
    movement.tick(&mut world, SECOND, &mut resolutions);
    assert_eq!(
        world.position(entity),
        Some(Vec2::new(10.0, 0.0)),
        "final step clamps onto the target"
    );
    assert!(resolutions.is_empty());

    movement.tick(&mut world, SECOND, &mut resolutions);
    assert_eq!(
        resolutions,
        vec![Resolution {
            handle,
            outcome: TaskOutcome::Completed,
        }]
    );
    assert_eq!(query::body_velocity(&world, entity), Some(Vec2::ZERO));
    assert!(!movement.is_active(entity));

    movement.tick(&mut world, SECOND, &mut resolutions);
    assert_eq!(resolutions.len(), 1, "a handle resolves exactly once");
}

#[test]
fn restarting_cancels_before_the_new_task_resolves() {
    let mut world = World::new();
    let mut movement = Movement::new();
    let mut resolutions = Vec::new();
    let entity = spawn(&mut world, Vec2::ZERO);

    let first = movement.start(
        &mut world,
        entity,
        MoveOrder::to_point(Vec2::new(100.0, 0.0), 1.0),
        &mut resolutions,
    );
    let second = movement.start(
        &mut world,
        entity,
        MoveOrder::to_point(Vec2::new(0.0, 1.0), 10.0),
        &mut resolutions,
    );
    assert!(!movement.is_current(first));
    assert!(movement.is_current(second));

    for _ in 0..3 {
        movement.tick(&mut world, SECOND, &mut resolutions);
    }

    assert_eq!(
        resolutions,
        vec![
            Resolution {
                handle: first,
                outcome: TaskOutcome::Cancelled(CancelReason::Restarted),
            },
            Resolution {
                handle: second,
                outcome: TaskOutcome::Completed,
            },
        ]
    );
}

#[test]
fn paused_tasks_hold_position_until_resumed() {
    let mut world = World::new();
    let mut movement = Movement::new();
    let mut resolutions = Vec::new();
    let entity = spawn(&mut world, Vec2::ZERO);

    let _ = movement.start(
        &mut world,
        entity,
        MoveOrder::to_point(Vec2::new(0.0, 10.0), 2.0),
        &mut resolutions,
    );
    movement.tick(&mut world, SECOND, &mut resolutions);
    assert!(movement.pause(entity));
    assert!(movement.pause(entity), "pausing twice is harmless");
    assert!(movement.is_paused(entity));

    movement.tick(&mut world, SECOND, &mut resolutions);
    movement.tick(&mut world, SECOND, &mut resolutions);
    assert_eq!(world.position(entity), Some(Vec2::new(0.0, 2.0)));
    assert_eq!(query::body_velocity(&world, entity), Some(Vec2::ZERO));

    assert!(movement.resume(entity));
    movement.tick(&mut world, SECOND, &mut resolutions);
    assert_eq!(world.position(entity), Some(Vec2::new(0.0, 4.0)));
    assert!(resolutions.is_empty());
}

#[test]
fn pause_without_task_is_a_no_op() {
    let mut movement = Movement::new();
    let entity = EntityId::new(3);
    assert!(!movement.pause(entity));
    assert!(!movement.resume(entity));
    assert!(!movement.is_paused(entity));
}

#[test]
fn following_tracks_a_moving_target() {
    let mut world = World::new();
    let mut movement = Movement::new();
    let mut resolutions = Vec::new();
    let chaser = spawn(&mut world, Vec2::ZERO);
    let leader = spawn(&mut world, Vec2::new(10.0, 0.0));

    let _ = movement.start(&mut world, chaser, MoveOrder::follow(leader, 5.0), &mut resolutions);
    movement.tick(&mut world, SECOND, &mut resolutions);
    assert_eq!(world.position(chaser), Some(Vec2::new(5.0, 0.0)));

    world.set_position(leader, Vec2::new(5.0, 5.0));
    movement.tick(&mut world, SECOND, &mut resolutions);
    assert_eq!(world.position(chaser), Some(Vec2::new(5.0, 5.0)));
}

#[test]
fn fixed_entity_targets_are_captured_at_start() {
    let mut world = World::new();
    let mut movement = Movement::new();
    let mut resolutions = Vec::new();
    let mover = spawn(&mut world, Vec2::ZERO);
    let marker = spawn(&mut world, Vec2::new(3.0, 0.0));

    let mut order = MoveOrder::follow(marker, 10.0);
    order.follow = false;
    let _ = movement.start(&mut world, mover, order, &mut resolutions);
    world.set_position(marker, Vec2::new(50.0, 50.0));
    movement.tick(&mut world, SECOND, &mut resolutions);

    assert_eq!(world.position(mover), Some(Vec2::new(3.0, 0.0)));
}

#[test]
fn lifecycle_failures_cancel_with_specific_reasons() {
    let mut world = World::new();
    let mut movement = Movement::new();
    let mut resolutions = Vec::new();
    let chaser = spawn(&mut world, Vec2::ZERO);
    let leader = spawn(&mut world, Vec2::new(50.0, 0.0));
    let doomed = spawn(&mut world, Vec2::new(0.0, 5.0));
    let sleepy = spawn(&mut world, Vec2::new(0.0, 9.0));

    let to_origin = MoveOrder::to_point(Vec2::ZERO, 1.0);
    let chase = movement.start(
        &mut world,
        chaser,
        MoveOrder::follow(leader, 1.0),
        &mut resolutions,
    );
    let fall = movement.start(&mut world, doomed, to_origin, &mut resolutions);
    let nap = movement.start(&mut world, sleepy, to_origin, &mut resolutions);

    assert!(world.despawn(leader));
    assert!(world.despawn(doomed));
    assert!(world.set_enabled(sleepy, false));
    movement.tick(&mut world, SECOND, &mut resolutions);

    assert_eq!(
        resolutions,
        vec![
            Resolution {
                handle: chase,
                outcome: TaskOutcome::Cancelled(CancelReason::TargetDestroyed),
            },
            Resolution {
                handle: fall,
                outcome: TaskOutcome::Cancelled(CancelReason::EntityDestroyed),
            },
            Resolution {
                handle: nap,
                outcome: TaskOutcome::Cancelled(CancelReason::Disabled),
            },
        ]
    );
    assert_eq!(movement.active_count(), 0);
}

#[test]
fn explicit_cancel_reports_stopped_and_zeroes_velocity() {
    let mut world = World::new();
    let mut movement = Movement::new();
    let mut resolutions = Vec::new();
    let entity = spawn(&mut world, Vec2::ZERO);

    let handle = movement.start(
        &mut world,
        entity,
        MoveOrder::to_point(Vec2::new(-8.0, 0.0), 2.0),
        &mut resolutions,
    );
    movement.tick(&mut world, SECOND, &mut resolutions);
    assert!(movement.cancel(&mut world, entity, CancelReason::Stopped, &mut resolutions));
    assert!(!movement.cancel(&mut world, entity, CancelReason::Stopped, &mut resolutions));

    assert_eq!(
        resolutions,
        vec![Resolution {
            handle,
            outcome: TaskOutcome::Cancelled(CancelReason::Stopped),
        }]
    );
    assert!(world.has_body(entity));
    assert_eq!(query::body_velocity(&world, entity), Some(Vec2::ZERO));
}

#[test]
fn stop_distance_snaps_onto_the_target() {
    let mut world = World::new();
    let mut movement = Movement::new();
    let mut resolutions = Vec::new();
    let entity = spawn(&mut world, Vec2::ZERO);

    let _ = movement.start(
        &mut world,
        entity,
        MoveOrder::to_point(Vec2::new(0.4, 0.0), 1.0).with_stop_distance(0.5),
        &mut resolutions,
    );
    movement.tick(&mut world, Duration::ZERO, &mut resolutions);

    assert_eq!(world.position(entity), Some(Vec2::new(0.4, 0.0)));
    assert_eq!(resolutions.len(), 1);
    assert_eq!(resolutions[0].outcome, TaskOutcome::Completed);
}
