#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Conflict-based yielding between entities that move at the same time.
//!
//! When two enrolled entities touch, the one with the greater [`EntityId`]
//! yields: its movement task pauses and its body becomes immovable until
//! nothing blocks it any more. Decisions are queued and applied at the start
//! of the following [`TrafficYield::tick`], never inside a contact
//! notification.

use std::collections::{BTreeMap, BTreeSet};

use corral_core::{Aabb, BodyMode, EntityId, Event, PhysicsBodies, Spatial};
use corral_system_movement::Movement;
use glam::Vec2;
use serde::Deserialize;
use tracing::debug;

/// Reports whether `me` has to give way to `other`.
#[must_use]
pub fn must_yield(me: EntityId, other: EntityId) -> bool {
    me > other
}

/// Strategy used to find touching entities.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Detection {
    /// Poll bounding-box overlap of every participant each tick.
    #[default]
    Proximity,
    /// React to contact notifications from the physics layer.
    Contact,
}

/// Tuning for the yield coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct YieldConfig {
    /// How touching entities are found.
    pub detection: Detection,
    /// Both boxes grow by this much before a blocker counts as gone.
    pub separation_padding: f32,
    /// Centre-distance radius used when neither entity has bounds. Zero disables it.
    pub fallback_radius: f32,
}

impl Default for YieldConfig {
    fn default() -> Self {
        Self {
            detection: Detection::Proximity,
            separation_padding: 2.0,
            fallback_radius: 36.0,
        }
    }
}

/// Coordinates yielding between enrolled entities.
#[derive(Debug, Default)]
pub struct TrafficYield {
    config: YieldConfig,
    participants: BTreeMap<EntityId, Participant>,
    pending: BTreeMap<EntityId, YieldChange>,
    contacts: Vec<ContactNote>,
}

impl TrafficYield {
    /// Creates a coordinator with no participants.
    #[must_use]
    pub fn new(config: YieldConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> YieldConfig {
        self.config
    }

    /// Adds `entity` to the set of entities that yield to each other.
    pub fn enroll(&mut self, entity: EntityId) {
        let _ = self.participants.entry(entity).or_default();
    }

    /// Removes `entity`, resuming it first when it was yielding.
    pub fn withdraw<W>(&mut self, world: &mut W, movement: &mut Movement, entity: EntityId)
    where
        W: Spatial + PhysicsBodies + ?Sized,
    {
        let _ = self.pending.remove(&entity);
        self.contacts
            .retain(|note| note.first != entity && note.second != entity);
        if let Some(participant) = self.participants.remove(&entity) {
            if participant.yielding {
                let _ = movement.resume(entity);
                if world.has_body(entity) {
                    world.set_body_mode(entity, BodyMode::Movable);
                }
            }
        }
        for participant in self.participants.values_mut() {
            let _ = participant.blockers.remove(&entity);
        }
    }

    /// Records that two collision shapes started touching.
    pub fn contact_began(&mut self, first: EntityId, second: EntityId) {
        self.contacts.push(ContactNote {
            first,
            second,
            touching: true,
        });
    }

    /// Records that two collision shapes stopped touching.
    pub fn contact_ended(&mut self, first: EntityId, second: EntityId) {
        self.contacts.push(ContactNote {
            first,
            second,
            touching: false,
        });
    }

    /// Reports whether `entity` is currently yielding.
    #[must_use]
    pub fn is_yielding(&self, entity: EntityId) -> bool {
        self.participants
            .get(&entity)
            .map_or(false, |participant| participant.yielding)
    }

    /// Reports whether `entity` is enrolled.
    #[must_use]
    pub fn is_enrolled(&self, entity: EntityId) -> bool {
        self.participants.contains_key(&entity)
    }

    /// Entities `entity` is currently waiting for, in ascending order.
    #[must_use]
    pub fn blockers(&self, entity: EntityId) -> Vec<EntityId> {
        self.participants
            .get(&entity)
            .map(|participant| participant.blockers.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Applies queued decisions, re-asserts pauses and detects new conflicts.
    pub fn tick<W>(&mut self, world: &mut W, movement: &mut Movement, out: &mut Vec<Event>)
    where
        W: Spatial + PhysicsBodies + ?Sized,
    {
        self.apply_pending(world, movement, out);

        for (entity, participant) in &self.participants {
            if participant.yielding {
                let _ = movement.pause(*entity);
            }
        }

        match self.config.detection {
            Detection::Proximity => self.poll(world),
            Detection::Contact => self.drain_contacts(),
        }
        self.prune(world);
        self.decide();
    }

    fn apply_pending<W>(&mut self, world: &mut W, movement: &mut Movement, out: &mut Vec<Event>)
    where
        W: Spatial + PhysicsBodies + ?Sized,
    {
        let pending = std::mem::take(&mut self.pending);
        for (entity, change) in pending {
            let Some(participant) = self.participants.get_mut(&entity) else {
                continue;
            };
            match change {
                YieldChange::Yield => {
                    let _ = movement.pause(entity);
                    if world.has_body(entity) {
                        world.set_body_mode(entity, BodyMode::Immovable);
                    }
                    participant.yielding = true;
                    debug!(
                        entity = entity.get(),
                        blockers = participant.blockers.len(),
                        "yielding"
                    );
                    out.push(Event::Yielded { entity });
                }
                YieldChange::Resume => {
                    let _ = movement.resume(entity);
                    if world.has_body(entity) {
                        world.set_body_mode(entity, BodyMode::Movable);
                    }
                    participant.yielding = false;
                    debug!(entity = entity.get(), "resuming");
                    out.push(Event::Resumed { entity });
                }
            }
        }
    }

    fn poll<W>(&mut self, world: &W)
    where
        W: Spatial + ?Sized,
    {
        let shapes: BTreeMap<EntityId, Shape> = self
            .participants
            .keys()
            .filter(|entity| world.is_enabled(**entity))
            .filter_map(|entity| {
                Some((
                    *entity,
                    Shape {
                        bounds: world.bounds(*entity)?,
                        center: world.position(*entity)?,
                    },
                ))
            })
            .collect();

        let padding = self.config.separation_padding;
        let radius = self.config.fallback_radius;
        for (me, participant) in &mut self.participants {
            let Some(mine) = shapes.get(me) else {
                participant.blockers.clear();
                continue;
            };
            participant.blockers.retain(|other| {
                shapes
                    .get(other)
                    .map_or(false, |theirs| touching(mine, theirs, -padding, radius))
            });
            for (other, theirs) in &shapes {
                if must_yield(*me, *other) && touching(mine, theirs, 0.0, radius) {
                    let _ = participant.blockers.insert(*other);
                }
            }
        }
    }

    fn drain_contacts(&mut self) {
        for note in std::mem::take(&mut self.contacts) {
            if note.first == note.second
                || !self.participants.contains_key(&note.first)
                || !self.participants.contains_key(&note.second)
            {
                continue;
            }
            let (winner, loser) = if must_yield(note.first, note.second) {
                (note.second, note.first)
            } else {
                (note.first, note.second)
            };
            if let Some(participant) = self.participants.get_mut(&loser) {
                if note.touching {
                    let _ = participant.blockers.insert(winner);
                } else {
                    let _ = participant.blockers.remove(&winner);
                }
            }
        }
    }

    fn prune<W>(&mut self, world: &W)
    where
        W: Spatial + ?Sized,
    {
        let enrolled: BTreeSet<EntityId> = self.participants.keys().copied().collect();
        for participant in self.participants.values_mut() {
            participant
                .blockers
                .retain(|blocker| enrolled.contains(blocker) && world.is_enabled(*blocker));
        }
    }

    fn decide(&mut self) {
        for (entity, participant) in &self.participants {
            let blocked = !participant.blockers.is_empty();
            if blocked == participant.yielding {
                let _ = self.pending.remove(entity);
                continue;
            }
            let change = if blocked {
                YieldChange::Yield
            } else {
                YieldChange::Resume
            };
            if self.pending.insert(*entity, change) != Some(change) {
                debug!(entity = entity.get(), ?change, "yield change queued");
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
struct Participant {
    blockers: BTreeSet<EntityId>,
    yielding: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum YieldChange {
    Yield,
    Resume,
}

#[derive(Clone, Copy, Debug)]
struct ContactNote {
    first: EntityId,
    second: EntityId,
    touching: bool,
}

#[derive(Clone, Copy, Debug)]
struct Shape {
    bounds: Aabb,
    center: Vec2,
}

// Positive padding shrinks both shapes, negative padding grows them.
fn touching(a: &Shape, b: &Shape, padding: f32, fallback_radius: f32) -> bool {
    if a.bounds.overlaps(&b.bounds, padding) {
        return true;
    }
    if fallback_radius > 0.0 && a.bounds.is_empty() && b.bounds.is_empty() {
        let reach = 2.0 * (fallback_radius - padding);
        return a.center.distance(b.center) <= reach;
    }
    false
}
