#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Deterministic, cancellable movement tasks.
//!
//! Each entity owns at most one active task. Tasks advance once per
//! [`Movement::tick`] in ascending entity order and resolve exactly once,
//! either by arriving at their target or by being cancelled. Resolutions are
//! pushed into a caller-provided buffer so the owner of the entity can react
//! after the tick, without callbacks.

use std::{collections::BTreeMap, time::Duration};

use corral_core::{CancelReason, EntityId, PhysicsBodies, Spatial, TaskId, TaskOutcome};
use glam::Vec2;
use tracing::debug;

/// Destination of a movement task.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MoveTarget {
    /// Fixed world position.
    Point(Vec2),
    /// Logical position of another entity.
    Entity(EntityId),
}

/// Parameters of a single movement task.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MoveOrder {
    /// Where the entity should go.
    pub target: MoveTarget,
    /// Travel speed in world units per second.
    pub speed: f32,
    /// Remaining distance at which the entity snaps onto the target.
    pub stop_distance: f32,
    /// Re-sample an entity target every tick instead of once at start.
    pub follow: bool,
}

impl MoveOrder {
    /// Moves towards a fixed point.
    #[must_use]
    pub const fn to_point(point: Vec2, speed: f32) -> Self {
        Self {
            target: MoveTarget::Point(point),
            speed,
            stop_distance: 0.0,
            follow: false,
        }
    }

    /// Chases another entity, re-sampling its position every tick.
    #[must_use]
    pub const fn follow(entity: EntityId, speed: f32) -> Self {
        Self {
            target: MoveTarget::Entity(entity),
            speed,
            stop_distance: 0.0,
            follow: true,
        }
    }

    /// Returns the order with the provided stop distance.
    #[must_use]
    pub const fn with_stop_distance(mut self, stop_distance: f32) -> Self {
        self.stop_distance = stop_distance;
        self
    }
}

/// Identifies one task instance on one entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskHandle {
    id: TaskId,
    entity: EntityId,
}

impl TaskHandle {
    /// Identifier of the task instance.
    #[must_use]
    pub const fn id(&self) -> TaskId {
        self.id
    }

    /// Entity the task moves.
    #[must_use]
    pub const fn entity(&self) -> EntityId {
        self.entity
    }
}

/// Terminal outcome reported for a task handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Resolution {
    /// Task that finished.
    pub handle: TaskHandle,
    /// How it finished.
    pub outcome: TaskOutcome,
}

/// Owns every active movement task.
#[derive(Debug, Default)]
pub struct Movement {
    tasks: BTreeMap<EntityId, ActiveTask>,
    next_task: u64,
}

impl Movement {
    /// Creates a movement system with no active tasks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a task for `entity`, cancelling the one it already runs.
    ///
    /// The cancelled task's `Restarted` resolution lands in `out` before the
    /// new handle is returned.
    pub fn start<W>(
        &mut self,
        world: &mut W,
        entity: EntityId,
        order: MoveOrder,
        out: &mut Vec<Resolution>,
    ) -> TaskHandle
    where
        W: Spatial + PhysicsBodies + ?Sized,
    {
        let _ = self.cancel(world, entity, CancelReason::Restarted, out);

        let anchor = match order.target {
            MoveTarget::Point(point) => Some(point),
            MoveTarget::Entity(target) => world.position(target),
        };
        let id = TaskId::new(self.next_task);
        self.next_task = self.next_task.wrapping_add(1);
        let handle = TaskHandle { id, entity };
        let _ = self.tasks.insert(
            entity,
            ActiveTask {
                id,
                order,
                anchor,
                paused: false,
            },
        );
        debug!(
            entity = entity.get(),
            task = id.get(),
            speed = order.speed,
            "movement task started"
        );
        handle
    }

    /// Advances every active task by `dt`.
    pub fn tick<W>(&mut self, world: &mut W, dt: Duration, out: &mut Vec<Resolution>)
    where
        W: Spatial + PhysicsBodies + ?Sized,
    {
        let seconds = dt.as_secs_f32();
        let mut finished: Vec<(TaskHandle, TaskOutcome)> = Vec::new();
        for (entity, task) in &mut self.tasks {
            if let Some(outcome) = advance(world, *entity, task, seconds) {
                finished.push((
                    TaskHandle {
                        id: task.id,
                        entity: *entity,
                    },
                    outcome,
                ));
            }
        }

        for (handle, outcome) in finished {
            let _ = self.tasks.remove(&handle.entity);
            resolve(world, handle, outcome, out);
        }
    }

    /// Cancels the active task of `entity`. Returns whether one existed.
    pub fn cancel<W>(
        &mut self,
        world: &mut W,
        entity: EntityId,
        reason: CancelReason,
        out: &mut Vec<Resolution>,
    ) -> bool
    where
        W: Spatial + PhysicsBodies + ?Sized,
    {
        match self.tasks.remove(&entity) {
            Some(task) => {
                let handle = TaskHandle {
                    id: task.id,
                    entity,
                };
                resolve(world, handle, TaskOutcome::Cancelled(reason), out);
                true
            }
            None => false,
        }
    }

    /// Freezes the active task of `entity`. Idempotent.
    pub fn pause(&mut self, entity: EntityId) -> bool {
        self.set_paused(entity, true)
    }

    /// Unfreezes the active task of `entity`. Idempotent.
    pub fn resume(&mut self, entity: EntityId) -> bool {
        self.set_paused(entity, false)
    }

    /// Reports whether `entity` has a paused task.
    #[must_use]
    pub fn is_paused(&self, entity: EntityId) -> bool {
        self.tasks.get(&entity).map_or(false, |task| task.paused)
    }

    /// Reports whether `entity` has any active task.
    #[must_use]
    pub fn is_active(&self, entity: EntityId) -> bool {
        self.tasks.contains_key(&entity)
    }

    /// Reports whether `handle` is still the running task of its entity.
    #[must_use]
    pub fn is_current(&self, handle: TaskHandle) -> bool {
        self.tasks
            .get(&handle.entity)
            .map_or(false, |task| task.id == handle.id)
    }

    /// Handle of the task `entity` currently runs.
    #[must_use]
    pub fn current(&self, entity: EntityId) -> Option<TaskHandle> {
        self.tasks
            .get(&entity)
            .map(|task| TaskHandle { id: task.id, entity })
    }

    /// Number of active tasks.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }

    fn set_paused(&mut self, entity: EntityId, paused: bool) -> bool {
        match self.tasks.get_mut(&entity) {
            Some(task) => {
                task.paused = paused;
                true
            }
            None => false,
        }
    }
}

#[derive(Clone, Debug)]
struct ActiveTask {
    id: TaskId,
    order: MoveOrder,
    anchor: Option<Vec2>,
    paused: bool,
}

fn advance<W>(
    world: &mut W,
    entity: EntityId,
    task: &mut ActiveTask,
    seconds: f32,
) -> Option<TaskOutcome>
where
    W: Spatial + PhysicsBodies + ?Sized,
{
    if let MoveTarget::Entity(target) = task.order.target {
        if !world.is_alive(target) {
            return Some(TaskOutcome::Cancelled(CancelReason::TargetDestroyed));
        }
    }
    if !world.is_alive(entity) {
        return Some(TaskOutcome::Cancelled(CancelReason::EntityDestroyed));
    }
    if !world.is_enabled(entity) {
        return Some(TaskOutcome::Cancelled(CancelReason::Disabled));
    }

    let target = match task.order.target {
        MoveTarget::Entity(target) if task.order.follow => world.position(target),
        _ => task.anchor,
    };
    let Some(target) = target else {
        return Some(TaskOutcome::Cancelled(CancelReason::TargetDestroyed));
    };
    let Some(current) = world.position(entity) else {
        return Some(TaskOutcome::Cancelled(CancelReason::EntityDestroyed));
    };

    let offset = target - current;
    let distance = offset.length();
    let speed = task.order.speed;
    // A non-positive speed would never arrive, so it snaps instead.
    if distance <= task.order.stop_distance || !(speed.is_finite() && speed > 0.0) {
        world.set_position(entity, target);
        return Some(TaskOutcome::Completed);
    }

    if task.paused {
        world.set_velocity(entity, Vec2::ZERO);
        return None;
    }

    let heading = offset / distance;
    let step = speed * seconds;
    if step >= distance {
        world.set_position(entity, target);
    } else {
        world.set_position(entity, current + heading * step);
    }
    world.set_velocity(entity, heading * speed);
    None
}

fn resolve<W>(world: &mut W, handle: TaskHandle, outcome: TaskOutcome, out: &mut Vec<Resolution>)
where
    W: Spatial + PhysicsBodies + ?Sized,
{
    if world.has_body(handle.entity) {
        world.set_velocity(handle.entity, Vec2::ZERO);
    }
    match outcome {
        TaskOutcome::Completed => debug!(
            entity = handle.entity.get(),
            task = handle.id.get(),
            "movement task completed"
        ),
        TaskOutcome::Cancelled(reason) => debug!(
            entity = handle.entity.get(),
            task = handle.id.get(),
            reason = reason.as_str(),
            "movement task cancelled"
        ),
    }
    out.push(Resolution { handle, outcome });
}
