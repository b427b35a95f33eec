#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative entity state and board geometry for Corral.
//!
//! [`World`] stores every entity's transform, visual anchor, enabled flag and
//! optional physics body, and implements the [`Spatial`] and
//! [`PhysicsBodies`] contracts on top of them. The [`board`] module owns the
//! grid geometry and occupancy matrix while [`assignment`] solves the
//! rectangular assignment problem used to snap entities onto cells.

use std::collections::BTreeMap;

use corral_core::{Aabb, BodyMode, EntityId, PhysicsBodies, Spatial};
use glam::Vec2;

pub mod assignment;
pub mod board;

pub use board::{Board, BoardConfig};

/// Blueprint describing an entity to be created in the world.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EntitySpec {
    /// Logical world position of the entity.
    pub position: Vec2,
    /// Uniform scale applied to the local bounds and pivot.
    pub scale: f32,
    /// Visual bounds relative to the logical position, empty for none.
    pub local_bounds: Aabb,
    /// Explicit visual pivot relative to the logical position.
    pub pivot: Option<Vec2>,
    /// Fine-tune offset added whenever the entity is aligned to a point.
    pub anchor_offset: Vec2,
    /// Whether the entity carries a physics body.
    pub body: bool,
}

impl EntitySpec {
    /// Creates a body-less spec with a box of `size` centred on `position`.
    #[must_use]
    pub fn at(position: Vec2, size: Vec2) -> Self {
        Self {
            position,
            scale: 1.0,
            local_bounds: Aabb::from_center_size(Vec2::ZERO, size),
            pivot: None,
            anchor_offset: Vec2::ZERO,
            body: false,
        }
    }

    /// Returns the spec with a physics body attached.
    #[must_use]
    pub fn with_body(mut self) -> Self {
        self.body = true;
        self
    }

    /// Returns the spec with an explicit visual pivot.
    #[must_use]
    pub fn with_pivot(mut self, pivot: Vec2) -> Self {
        self.pivot = Some(pivot);
        self
    }

    /// Returns the spec with the provided uniform scale.
    #[must_use]
    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = scale;
        self
    }
}

/// Represents the authoritative Corral entity store.
#[derive(Debug, Default)]
pub struct World {
    entities: BTreeMap<EntityId, EntityRecord>,
    next_entity: u32,
}

impl World {
    /// Creates an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entity and returns its freshly allocated identifier.
    pub fn spawn(&mut self, spec: EntitySpec) -> EntityId {
        let id = EntityId::new(self.next_entity);
        self.next_entity = self.next_entity.saturating_add(1);
        let record = EntityRecord {
            position: spec.position,
            scale: spec.scale,
            local_bounds: spec.local_bounds,
            pivot: spec.pivot,
            anchor_offset: spec.anchor_offset,
            enabled: true,
            body: spec.body.then_some(Body {
                mode: BodyMode::Movable,
                velocity: Vec2::ZERO,
            }),
        };
        let _ = self.entities.insert(id, record);
        id
    }

    /// Removes an entity. Returns `false` when it did not exist.
    pub fn despawn(&mut self, entity: EntityId) -> bool {
        self.entities.remove(&entity).is_some()
    }

    /// Toggles whether the entity participates in the simulation.
    pub fn set_enabled(&mut self, entity: EntityId, enabled: bool) -> bool {
        match self.entities.get_mut(&entity) {
            Some(record) => {
                record.enabled = enabled;
                true
            }
            None => false,
        }
    }
}

impl Spatial for World {
    fn is_alive(&self, entity: EntityId) -> bool {
        self.entities.contains_key(&entity)
    }

    fn is_enabled(&self, entity: EntityId) -> bool {
        self.entities
            .get(&entity)
            .map_or(false, |record| record.enabled)
    }

    fn position(&self, entity: EntityId) -> Option<Vec2> {
        self.entities.get(&entity).map(|record| record.position)
    }

    fn set_position(&mut self, entity: EntityId, position: Vec2) {
        if let Some(record) = self.entities.get_mut(&entity) {
            record.position = position;
        }
    }

    fn scale(&self, entity: EntityId) -> Option<f32> {
        self.entities.get(&entity).map(|record| record.scale)
    }

    fn set_scale(&mut self, entity: EntityId, scale: f32) {
        if let Some(record) = self.entities.get_mut(&entity) {
            record.scale = scale;
        }
    }

    fn visual_center(&self, entity: EntityId) -> Option<Vec2> {
        self.entities.get(&entity).map(EntityRecord::visual_center)
    }

    fn aligned_position(&self, entity: EntityId, center: Vec2) -> Option<Vec2> {
        let record = self.entities.get(&entity)?;
        let pivot_offset = record.visual_center() - record.position;
        Some(center - pivot_offset + record.anchor_offset)
    }

    fn bounds(&self, entity: EntityId) -> Option<Aabb> {
        self.entities.get(&entity).map(EntityRecord::world_bounds)
    }
}

impl PhysicsBodies for World {
    fn has_body(&self, entity: EntityId) -> bool {
        self.entities
            .get(&entity)
            .map_or(false, |record| record.body.is_some())
    }

    fn body_mode(&self, entity: EntityId) -> Option<BodyMode> {
        self.entities
            .get(&entity)
            .and_then(|record| record.body)
            .map(|body| body.mode)
    }

    fn set_body_mode(&mut self, entity: EntityId, mode: BodyMode) {
        if let Some(body) = self
            .entities
            .get_mut(&entity)
            .and_then(|record| record.body.as_mut())
        {
            body.mode = mode;
        }
    }

    fn set_velocity(&mut self, entity: EntityId, velocity: Vec2) {
        if let Some(body) = self
            .entities
            .get_mut(&entity)
            .and_then(|record| record.body.as_mut())
        {
            body.velocity = velocity;
        }
    }
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use corral_core::EntityId;
    use glam::Vec2;

    use super::World;

    /// Current linear velocity of the entity's body, if it has one.
    #[must_use]
    pub fn body_velocity(world: &World, entity: EntityId) -> Option<Vec2> {
        world
            .entities
            .get(&entity)
            .and_then(|record| record.body)
            .map(|body| body.velocity)
    }
}

#[derive(Clone, Copy, Debug)]
struct Body {
    mode: BodyMode,
    velocity: Vec2,
}

#[derive(Clone, Debug)]
struct EntityRecord {
    position: Vec2,
    scale: f32,
    local_bounds: Aabb,
    pivot: Option<Vec2>,
    anchor_offset: Vec2,
    enabled: bool,
    body: Option<Body>,
}

impl EntityRecord {
    fn world_bounds(&self) -> Aabb {
        if self.local_bounds.is_empty() {
            return Aabb::EMPTY;
        }
        Aabb::from_center_size(
            self.position + self.local_bounds.center() * self.scale,
            self.local_bounds.size() * self.scale,
        )
    }

    // Pivot first, then the bounds centre, then the raw position.
    fn visual_center(&self) -> Vec2 {
        if let Some(pivot) = self.pivot {
            return self.position + pivot * self.scale;
        }
        let bounds = self.world_bounds();
        if bounds.is_empty() {
            self.position
        } else {
            bounds.center()
        }
    }
}
