//! Capabilities the systems need from the engine layers around them.
//!
//! Systems never hold a reference to a concrete entity store. They receive a
//! `&mut impl Spatial` (plus `PhysicsBodies` where bodies matter) for the
//! duration of a call.

use glam::Vec2;
use tracing::warn;

use crate::{Aabb, BodyMode, EntityId, FeedbackError};

/// Transform, validity and visual-anchor access for entities.
pub trait Spatial {
    /// Reports whether the entity still exists.
    fn is_alive(&self, entity: EntityId) -> bool;

    /// Reports whether the entity exists and participates in the simulation.
    fn is_enabled(&self, entity: EntityId) -> bool;

    /// Logical world position of the entity.
    fn position(&self, entity: EntityId) -> Option<Vec2>;

    /// Moves the entity. Unknown entities are ignored.
    fn set_position(&mut self, entity: EntityId, position: Vec2);

    /// Uniform scale of the entity.
    fn scale(&self, entity: EntityId) -> Option<f32>;

    /// Rescales the entity. Unknown entities are ignored.
    fn set_scale(&mut self, entity: EntityId, scale: f32);

    /// World point that looks like the centre of the entity on screen.
    fn visual_center(&self, entity: EntityId) -> Option<Vec2>;

    /// Logical position that places the visual centre on `center`.
    fn aligned_position(&self, entity: EntityId, center: Vec2) -> Option<Vec2>;

    /// Moves the entity so its visual centre lands on `center`.
    fn align_to(&mut self, entity: EntityId, center: Vec2) -> bool {
        match self.aligned_position(entity, center) {
            Some(position) => {
                self.set_position(entity, position);
                true
            }
            None => false,
        }
    }

    /// World-space bounds of the entity, empty when it has no extent.
    fn bounds(&self, entity: EntityId) -> Option<Aabb>;
}

/// Minimal view of the physics layer.
pub trait PhysicsBodies {
    /// Reports whether the entity carries a physics body.
    fn has_body(&self, entity: EntityId) -> bool;

    /// Current simulation mode of the entity's body.
    fn body_mode(&self, entity: EntityId) -> Option<BodyMode>;

    /// Switches the body between movable and immovable.
    fn set_body_mode(&mut self, entity: EntityId, mode: BodyMode);

    /// Sets the linear velocity of the body.
    fn set_velocity(&mut self, entity: EntityId, velocity: Vec2);
}

/// Sink for named animation and audio cues.
pub trait Feedback {
    /// Requests playback of `cue` on `entity`.
    fn play(&mut self, entity: EntityId, cue: &str) -> Result<(), FeedbackError>;
}

/// Plays a cue and logs failures instead of propagating them.
///
/// Missing cues never interrupt motion.
pub fn play_cue(feedback: &mut dyn Feedback, entity: EntityId, cue: &str) {
    if let Err(err) = feedback.play(entity, cue) {
        warn!(entity = entity.get(), %err, "feedback cue skipped");
    }
}
