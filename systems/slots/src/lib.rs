#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Ordered slot inventory that merges duplicate deliveries.
//!
//! A delivery of a new kind fills the next free slot with a token. A delivery
//! of a kind that is already stored triggers a merge sequence instead:
//!
//! 1. tokens after the match slide aside while the match plays its cue,
//! 2. once they arrived and the hold time elapsed the match pops,
//! 3. the remaining tokens repack into consecutive slots one at a time.
//!
//! Deliveries that arrive while a sequence runs are queued and processed in
//! order once the inventory is idle again.

use std::{
    collections::{BTreeSet, VecDeque},
    time::Duration,
};

use corral_core::{
    play_cue, AnimalKind, CancelReason, CorralError, EntityId, Event, Feedback, OverflowPolicy,
    Spatial,
};
use corral_system_movement::{MoveOrder, Movement, Resolution, TaskHandle};
use corral_world::{EntitySpec, World};
use glam::Vec2;
use tracing::{debug, info, warn};

/// Cue played on a matched token right before it is removed.
pub const POP_CUE: &str = "pop";

const POP_PEAK_SCALE: f32 = 1.2;
const POP_RISE_SHARE: f32 = 0.4;
const REPACK_DURATION_FACTOR: f32 = 0.8;

/// Layout and timing of the inventory.
#[derive(Clone, Debug, PartialEq)]
pub struct SlotConfig {
    /// World positions of the slots, in fill order.
    pub slots: Vec<Vec2>,
    /// Temporary displacement of the tokens behind a merging entry.
    pub shift_offset: Vec2,
    /// Time the shift takes.
    pub shift_duration: Duration,
    /// Length of the pop pulse on the merged token.
    pub pop_duration: Duration,
    /// Minimum time the match cue plays before the pop.
    pub merge_hold: Duration,
    /// What happens to a delivery when every slot is taken.
    pub overflow: OverflowPolicy,
    /// Visual size of a token before scaling.
    pub token_size: Vec2,
    /// Scale applied to freshly created tokens.
    pub token_scale: f32,
}

impl Default for SlotConfig {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            shift_offset: Vec2::new(100.0, 0.0),
            shift_duration: Duration::from_millis(150),
            pop_duration: Duration::from_millis(250),
            merge_hold: Duration::from_millis(600),
            overflow: OverflowPolicy::Truncate,
            token_size: Vec2::splat(80.0),
            token_scale: 0.8,
        }
    }
}

/// Token stored in a slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SlotEntry {
    entity: EntityId,
    kind: AnimalKind,
}

impl SlotEntry {
    /// Token entity shown in the slot.
    #[must_use]
    pub const fn entity(&self) -> EntityId {
        self.entity
    }

    /// Species the token represents.
    #[must_use]
    pub const fn kind(&self) -> AnimalKind {
        self.kind
    }
}

/// Immediate result of handing a delivery to the inventory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpawnOutcome {
    /// A token now occupies `slot`.
    Filled {
        /// Slot index that was filled.
        slot: usize,
        /// Token entity created for the delivery.
        token: EntityId,
    },
    /// The delivery matched the entry in `slot`, whose merge has begun.
    Merging {
        /// Slot index of the matching entry.
        slot: usize,
    },
    /// A merge is running; the delivery waits its turn.
    Queued,
    /// Every slot is taken and the delivery was dropped.
    Discarded,
}

#[derive(Clone, Debug)]
enum MergeSequence {
    Shifting {
        index: usize,
        pending: BTreeSet<TaskHandle>,
        hold_left: Duration,
    },
    Popping {
        index: usize,
        elapsed: Duration,
        base_scale: f32,
    },
    Repacking {
        next: usize,
        current: Option<TaskHandle>,
    },
}

/// Ordered, duplicate-merging slot inventory.
#[derive(Debug)]
pub struct SlotInventory {
    config: SlotConfig,
    filled: Vec<SlotEntry>,
    sequence: Option<MergeSequence>,
    queued: VecDeque<AnimalKind>,
}

impl SlotInventory {
    /// Creates an empty inventory.
    #[must_use]
    pub fn new(config: SlotConfig) -> Self {
        Self {
            config,
            filled: Vec::new(),
            sequence: None,
            queued: VecDeque::new(),
        }
    }

    /// Number of slots.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.config.slots.len()
    }

    /// Filled entries in slot order.
    #[must_use]
    pub fn entries(&self) -> &[SlotEntry] {
        &self.filled
    }

    /// Number of filled slots.
    #[must_use]
    pub fn filled_count(&self) -> usize {
        self.filled.len()
    }

    /// Reports whether a merge sequence is running.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.sequence.is_some()
    }

    /// Number of deliveries waiting for the current merge to finish.
    #[must_use]
    pub fn queued_count(&self) -> usize {
        self.queued.len()
    }

    /// Hands a delivered animal kind to the inventory.
    pub fn spawn(
        &mut self,
        kind: AnimalKind,
        world: &mut World,
        movement: &mut Movement,
        feedback: &mut dyn Feedback,
        events: &mut Vec<Event>,
        resolutions: &mut Vec<Resolution>,
    ) -> Result<SpawnOutcome, CorralError> {
        if self.is_busy() {
            self.queued.push_back(kind);
            debug!(kind = kind.name(), queued = self.queued.len(), "delivery queued behind merge");
            return Ok(SpawnOutcome::Queued);
        }
        self.ingest(kind, world, movement, feedback, events, resolutions)
    }

    /// Records a finished movement task. Unrelated handles are ignored.
    pub fn on_resolution(&mut self, resolution: &Resolution) {
        match &mut self.sequence {
            Some(MergeSequence::Shifting { pending, .. }) => {
                let _ = pending.remove(&resolution.handle);
            }
            Some(MergeSequence::Repacking { current, .. }) => {
                if *current == Some(resolution.handle) {
                    *current = None;
                }
            }
            _ => {}
        }
    }

    /// Advances merge timers and moves the sequence forward as far as it can.
    pub fn tick(
        &mut self,
        dt: Duration,
        world: &mut World,
        movement: &mut Movement,
        feedback: &mut dyn Feedback,
        events: &mut Vec<Event>,
        resolutions: &mut Vec<Resolution>,
    ) {
        match &mut self.sequence {
            Some(MergeSequence::Shifting { hold_left, .. }) => {
                *hold_left = hold_left.saturating_sub(dt);
            }
            Some(MergeSequence::Popping { elapsed, .. }) => {
                *elapsed = elapsed.saturating_add(dt);
            }
            _ => {}
        }

        while self.step(world, movement, feedback, events, resolutions) {}
    }

    /// Removes every token and forgets queued deliveries.
    pub fn clear_all(
        &mut self,
        world: &mut World,
        movement: &mut Movement,
        resolutions: &mut Vec<Resolution>,
    ) {
        for entry in self.filled.drain(..) {
            let _ = movement.cancel(world, entry.entity, CancelReason::Stopped, resolutions);
            let _ = world.despawn(entry.entity);
        }
        self.sequence = None;
        self.queued.clear();
    }

    fn ingest(
        &mut self,
        kind: AnimalKind,
        world: &mut World,
        movement: &mut Movement,
        feedback: &mut dyn Feedback,
        events: &mut Vec<Event>,
        resolutions: &mut Vec<Resolution>,
    ) -> Result<SpawnOutcome, CorralError> {
        if let Some(index) = self.filled.iter().position(|entry| entry.kind == kind) {
            self.begin_merge(index, world, movement, feedback, resolutions);
            return Ok(SpawnOutcome::Merging { slot: index });
        }

        let slot = self.filled.len();
        let Some(position) = self.config.slots.get(slot).copied() else {
            return match self.config.overflow {
                OverflowPolicy::Truncate => {
                    warn!(
                        kind = kind.name(),
                        capacity = self.capacity(),
                        "inventory full, delivery discarded"
                    );
                    events.push(Event::SlotDiscarded { kind });
                    Ok(SpawnOutcome::Discarded)
                }
                OverflowPolicy::Reject => Err(CorralError::CapacityExceeded {
                    requested: slot + 1,
                    capacity: self.capacity(),
                }),
            };
        };

        let token = world.spawn(
            EntitySpec::at(position, self.config.token_size).with_scale(self.config.token_scale),
        );
        play_cue(feedback, token, &kind.appear_cue());
        self.filled.push(SlotEntry { entity: token, kind });
        events.push(Event::SlotFilled { token, kind, slot });
        debug!(kind = kind.name(), slot, token = token.get(), "slot filled");
        Ok(SpawnOutcome::Filled { slot, token })
    }

    fn begin_merge(
        &mut self,
        index: usize,
        world: &mut World,
        movement: &mut Movement,
        feedback: &mut dyn Feedback,
        resolutions: &mut Vec<Resolution>,
    ) {
        let offset = self.config.shift_offset;
        let speed = offset.length() / self.config.shift_duration.as_secs_f32();
        let mut pending = BTreeSet::new();
        for entry in &self.filled[index + 1..] {
            let Some(position) = world.position(entry.entity) else {
                continue;
            };
            let handle = movement.start(
                world,
                entry.entity,
                MoveOrder::to_point(position + offset, speed),
                resolutions,
            );
            let _ = pending.insert(handle);
        }

        let matched = self.filled[index];
        play_cue(feedback, matched.entity, &matched.kind.match_cue());
        debug!(kind = matched.kind.name(), slot = index, shifting = pending.len(), "merge started");
        self.sequence = Some(MergeSequence::Shifting {
            index,
            pending,
            hold_left: self.config.merge_hold,
        });
    }

    fn step(
        &mut self,
        world: &mut World,
        movement: &mut Movement,
        feedback: &mut dyn Feedback,
        events: &mut Vec<Event>,
        resolutions: &mut Vec<Resolution>,
    ) -> bool {
        let Some(sequence) = self.sequence.take() else {
            let Some(kind) = self.queued.pop_front() else {
                return false;
            };
            if let Err(err) = self.ingest(kind, world, movement, feedback, events, resolutions) {
                warn!(kind = kind.name(), %err, "queued delivery dropped");
                events.push(Event::SlotDiscarded { kind });
            }
            return true;
        };

        match sequence {
            MergeSequence::Shifting {
                index,
                pending,
                hold_left,
            } => {
                if !pending.is_empty() || !hold_left.is_zero() {
                    self.sequence = Some(MergeSequence::Shifting {
                        index,
                        pending,
                        hold_left,
                    });
                    return false;
                }
                let entity = self.filled[index].entity;
                play_cue(feedback, entity, POP_CUE);
                self.sequence = Some(MergeSequence::Popping {
                    index,
                    elapsed: Duration::ZERO,
                    base_scale: world.scale(entity).unwrap_or(self.config.token_scale),
                });
                true
            }
            MergeSequence::Popping {
                index,
                elapsed,
                base_scale,
            } => {
                let entry = self.filled[index];
                if elapsed < self.config.pop_duration {
                    let progress = elapsed.as_secs_f32() / self.config.pop_duration.as_secs_f32();
                    world.set_scale(entry.entity, base_scale * pop_pulse(progress));
                    self.sequence = Some(MergeSequence::Popping {
                        index,
                        elapsed,
                        base_scale,
                    });
                    return false;
                }
                let _ = world.despawn(entry.entity);
                let _ = self.filled.remove(index);
                info!(kind = entry.kind.name(), slot = index, "slots merged");
                events.push(Event::SlotMerged {
                    kind: entry.kind,
                    slot: index,
                });
                self.sequence = Some(MergeSequence::Repacking {
                    next: index,
                    current: None,
                });
                true
            }
            MergeSequence::Repacking { next, current } => {
                if current.is_some() {
                    self.sequence = Some(MergeSequence::Repacking { next, current });
                    return false;
                }
                if next >= self.filled.len() {
                    debug!(filled = self.filled.len(), "merge finished");
                    return true;
                }
                let entry = self.filled[next];
                let target = self.config.slots[next];
                let distance = world
                    .position(entry.entity)
                    .map_or(0.0, |position| position.distance(target));
                let duration = self.config.shift_duration.as_secs_f32() * REPACK_DURATION_FACTOR;
                let handle = movement.start(
                    world,
                    entry.entity,
                    MoveOrder::to_point(target, distance / duration),
                    resolutions,
                );
                self.sequence = Some(MergeSequence::Repacking {
                    next: next + 1,
                    current: Some(handle),
                });
                true
            }
        }
    }
}

// Scale factor over the pop: up to the peak during the rise, then back to 1.
fn pop_pulse(progress: f32) -> f32 {
    let progress = progress.clamp(0.0, 1.0);
    if progress < POP_RISE_SHARE {
        1.0 + (POP_PEAK_SCALE - 1.0) * (progress / POP_RISE_SHARE)
    } else {
        let fall = (progress - POP_RISE_SHARE) / (1.0 - POP_RISE_SHARE);
        POP_PEAK_SCALE - (POP_PEAK_SCALE - 1.0) * fall
    }
}
