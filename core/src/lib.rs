#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Corral engine.
//!
//! This crate defines the message surface that connects adapters, the entity
//! store, and the per-tick systems. Adapters submit [`Command`] values, the
//! simulation executes them through its `apply` entry point, and then reports
//! [`Event`] values describing what happened. The boundary traits in
//! [`contracts`] describe the only capabilities the core needs from the
//! rendering, animation and physics layers.

use std::time::Duration;

use glam::Vec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod contracts;

pub use contracts::{play_cue, Feedback, PhysicsBodies, Spatial};

/// Commands that express all permissible simulation mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Adds a new animal to the board at the provided world position.
    SpawnAnimal {
        /// Species of the animal, used for slot merging.
        kind: AnimalKind,
        /// Viewer-space direction the animal runs in when tapped.
        facing: Direction,
        /// World position of the animal's visual centre.
        position: Vec2,
    },
    /// Removes an animal from the world, cancelling any movement it owns.
    DespawnAnimal {
        /// Identifier of the animal to remove.
        animal: EntityId,
    },
    /// Enables or disables an animal. Disabling cancels its movement task.
    SetAnimalEnabled {
        /// Identifier of the animal to toggle.
        animal: EntityId,
        /// Whether the animal participates in the simulation.
        enabled: bool,
    },
    /// Single activation input for an animal.
    Tap {
        /// Identifier of the tapped animal.
        animal: EntityId,
    },
    /// Advances the simulation clock by the provided delta time.
    Tick {
        /// Duration of simulated time that elapsed since the previous tick.
        dt: Duration,
    },
    /// Physics layer reports that two collision shapes started touching.
    ContactBegan {
        /// First entity of the contact pair.
        first: EntityId,
        /// Second entity of the contact pair.
        second: EntityId,
    },
    /// Physics layer reports that two collision shapes stopped touching.
    ContactEnded {
        /// First entity of the contact pair.
        first: EntityId,
        /// Second entity of the contact pair.
        second: EntityId,
    },
    /// Snaps every animal onto its optimal nearest cell.
    LayoutByNearest,
}

/// Events reported by the simulation after processing commands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Indicates that the simulation clock advanced.
    TimeAdvanced {
        /// Duration of simulated time that elapsed in the tick.
        dt: Duration,
    },
    /// Confirms that an animal was added to the world.
    AnimalSpawned {
        /// Identifier assigned to the animal.
        animal: EntityId,
        /// Species of the animal.
        kind: AnimalKind,
    },
    /// Confirms that an animal was removed from the world.
    AnimalDespawned {
        /// Identifier of the removed animal.
        animal: EntityId,
    },
    /// A tap was refused because the next cell is occupied.
    MoveBlocked {
        /// Identifier of the tapped animal.
        animal: EntityId,
        /// Cell the animal stays on.
        cell: CellCoord,
    },
    /// A tap was refused because the route lacks the exit it would need.
    MoveMisconfigured {
        /// Identifier of the tapped animal.
        animal: EntityId,
        /// Direction whose exit is missing.
        direction: Direction,
    },
    /// An animal started sliding across the board.
    SlideStarted {
        /// Identifier of the sliding animal.
        animal: EntityId,
        /// Viewer-space direction of travel.
        direction: Direction,
        /// Cell the animal left.
        from: CellCoord,
        /// Cell the slide ends on.
        to: CellCoord,
        /// Whether the slide ends flush against the board edge.
        leaves_board: bool,
    },
    /// A slide ended against another animal and the animal is idle again.
    SlideStopped {
        /// Identifier of the animal.
        animal: EntityId,
        /// Cell the animal now occupies.
        cell: CellCoord,
    },
    /// An animal reached the board edge and started its perimeter route.
    LeftBoard {
        /// Identifier of the animal.
        animal: EntityId,
        /// Exit the animal is heading for.
        direction: Direction,
    },
    /// An animal arrived at the delivery point.
    Delivered {
        /// Identifier of the delivered animal.
        animal: EntityId,
        /// Species of the delivered animal.
        kind: AnimalKind,
    },
    /// A journey ended early because its movement task was cancelled.
    JourneyAborted {
        /// Identifier of the animal.
        animal: EntityId,
        /// Why the active task was cancelled.
        reason: CancelReason,
    },
    /// An entity paused to let a lower-identity entity pass.
    Yielded {
        /// Identifier of the yielding entity.
        entity: EntityId,
    },
    /// A yielding entity resumed its movement.
    Resumed {
        /// Identifier of the resumed entity.
        entity: EntityId,
    },
    /// A new token occupies a slot of the inventory.
    SlotFilled {
        /// Token entity created for the slot.
        token: EntityId,
        /// Species stored in the slot.
        kind: AnimalKind,
        /// Index of the slot.
        slot: usize,
    },
    /// A duplicate arrival removed an existing entry from the inventory.
    SlotMerged {
        /// Species that merged.
        kind: AnimalKind,
        /// Slot index the merged entry occupied.
        slot: usize,
    },
    /// A delivery was discarded because the inventory is full.
    SlotDiscarded {
        /// Species that could not be stored.
        kind: AnimalKind,
    },
    /// A command could not be executed.
    CommandRejected {
        /// Reason the command failed.
        error: CorralError,
    },
}

/// Unique, totally ordered identifier of an entity.
///
/// Identifiers are allocated in creation order and never reused, which makes
/// them suitable as the stable tie-breaker for traffic yielding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u32);

impl EntityId {
    /// Creates a new entity identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Identifier of a single movement task instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

impl TaskId {
    /// Creates a new task identifier.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

/// Species of an animal. Two deliveries of the same kind merge in the slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimalKind {
    /// Rabbit.
    Bunny,
    /// Chicken.
    Chicken,
    /// Cow.
    Cow,
    /// Horse.
    Horse,
    /// Pig.
    Pig,
    /// Sheep.
    Sheep,
}

impl AnimalKind {
    /// Lowercase name used to build feedback cue names.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bunny => "bunny",
            Self::Chicken => "chicken",
            Self::Cow => "cow",
            Self::Horse => "horse",
            Self::Pig => "pig",
            Self::Sheep => "sheep",
        }
    }

    /// Cue played when a token of this kind appears in a slot.
    #[must_use]
    pub fn appear_cue(self) -> String {
        format!("{}_appear", self.name())
    }

    /// Cue played while a token of this kind merges with a duplicate.
    #[must_use]
    pub fn match_cue(self) -> String {
        format!("{}_match", self.name())
    }
}

/// Location of a single board cell expressed as row and column indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellCoord {
    row: u32,
    column: u32,
}

impl CellCoord {
    /// Creates a new cell coordinate.
    #[must_use]
    pub const fn new(row: u32, column: u32) -> Self {
        Self { row, column }
    }

    /// Zero-based row index, increasing towards the bottom of the screen.
    #[must_use]
    pub const fn row(&self) -> u32 {
        self.row
    }

    /// Zero-based column index, increasing towards the right of the screen.
    #[must_use]
    pub const fn column(&self) -> u32 {
        self.column
    }
}

/// Viewer-space direction. `Up` always means towards the top of the screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Towards the top of the screen.
    Up,
    /// Towards the right of the screen.
    Right,
    /// Towards the bottom of the screen.
    Down,
    /// Towards the left of the screen.
    Left,
}

impl Direction {
    /// All directions in clockwise order starting from `Up`.
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Right,
        Direction::Down,
        Direction::Left,
    ];

    /// Direction reached by rotating a quarter turn clockwise.
    #[must_use]
    pub const fn clockwise(self) -> Self {
        match self {
            Self::Up => Self::Right,
            Self::Right => Self::Down,
            Self::Down => Self::Left,
            Self::Left => Self::Up,
        }
    }

    /// Grid vector for this direction, honouring mirrored board layouts.
    ///
    /// Rows grow downwards and columns grow to the right. Inversion only
    /// changes the grid logic; feedback must keep using the viewer direction.
    #[must_use]
    pub const fn grid_step(self, inversion: GridInversion) -> GridStep {
        let (mut rows, mut columns) = match self {
            Self::Up => (-1, 0),
            Self::Right => (0, 1),
            Self::Down => (1, 0),
            Self::Left => (0, -1),
        };
        if inversion.horizontal {
            columns = -columns;
        }
        if inversion.vertical {
            rows = -rows;
        }
        GridStep { rows, columns }
    }

    /// Viewer-space direction of a world-space travel vector (y grows upwards).
    ///
    /// Horizontal travel wins ties. Returns `None` for a zero vector.
    #[must_use]
    pub fn from_travel(vector: Vec2) -> Option<Self> {
        if vector == Vec2::ZERO || !vector.is_finite() {
            return None;
        }
        if vector.x.abs() >= vector.y.abs() {
            Some(if vector.x >= 0.0 { Self::Right } else { Self::Left })
        } else {
            Some(if vector.y >= 0.0 { Self::Up } else { Self::Down })
        }
    }
}

/// Per-axis inversion applied to grid vectors of mirrored boards.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridInversion {
    /// Swaps left and right when computing grid movement.
    #[serde(default)]
    pub horizontal: bool,
    /// Swaps up and down when computing grid movement.
    #[serde(default)]
    pub vertical: bool,
}

/// Row and column delta of a single grid step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GridStep {
    /// Row delta, positive towards the bottom.
    pub rows: i32,
    /// Column delta, positive towards the right.
    pub columns: i32,
}

impl GridStep {
    /// Creates a new grid step.
    #[must_use]
    pub const fn new(rows: i32, columns: i32) -> Self {
        Self { rows, columns }
    }

    /// Reports whether the step moves at all.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.rows == 0 && self.columns == 0
    }
}

/// Outcome of a straight-line probe across the board.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProbeResult {
    /// Whether the probing entity may start moving.
    pub can_move: bool,
    /// Last cell inside the board the entity may reach.
    pub end: CellCoord,
    /// Whether the scan stopped because the next step leaves the board.
    pub hit_edge: bool,
}

/// Axis-aligned box in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    min: Vec2,
    max: Vec2,
}

impl Aabb {
    /// Degenerate box at the origin, used when an entity has no extent.
    pub const EMPTY: Aabb = Aabb {
        min: Vec2::ZERO,
        max: Vec2::ZERO,
    };

    /// Creates a box of the given size centred on `center`.
    #[must_use]
    pub fn from_center_size(center: Vec2, size: Vec2) -> Self {
        let half = size.abs() * 0.5;
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Centre point of the box.
    #[must_use]
    pub fn center(&self) -> Vec2 {
        (self.min + self.max) * 0.5
    }

    /// Width and height of the box.
    #[must_use]
    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    /// A box without positive area never overlaps anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let size = self.size();
        !(size.x > 0.0 && size.y > 0.0)
    }


    /// Overlap test where touching edges count as overlapping.
    ///
    /// A positive `padding` shrinks both boxes before testing, a negative one
    /// grows them.
    #[must_use]
    pub fn overlaps(&self, other: &Aabb, padding: f32) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        let a_min = self.min + Vec2::splat(padding);
        let a_max = self.max - Vec2::splat(padding);
        let b_min = other.min + Vec2::splat(padding);
        let b_max = other.max - Vec2::splat(padding);
        let separated =
            a_max.x < b_min.x || b_max.x < a_min.x || a_max.y < b_min.y || b_max.y < a_min.y;
        !separated
    }
}

/// Simulation mode of a physics body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BodyMode {
    /// Kinematic body that follows its velocity and pushes contacts.
    Movable,
    /// Static body that other bodies cannot displace.
    Immovable,
}

/// Behaviour when more entities arrive than there is room for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverflowPolicy {
    /// Keep what fits, log a warning and drop the rest.
    #[default]
    Truncate,
    /// Fail with [`CorralError::CapacityExceeded`].
    Reject,
}

/// Reason a movement task ended without arriving.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CancelReason {
    /// A new task was started on the same entity.
    Restarted,
    /// The followed target entity no longer exists.
    TargetDestroyed,
    /// The moving entity no longer exists.
    EntityDestroyed,
    /// The moving entity was disabled mid-flight.
    Disabled,
    /// The task was stopped explicitly by its owner.
    Stopped,
}

impl CancelReason {
    /// Stable textual form of the reason.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Restarted => "restarted",
            Self::TargetDestroyed => "target-destroyed",
            Self::EntityDestroyed => "entity-destroyed",
            Self::Disabled => "disabled",
            Self::Stopped => "stopped",
        }
    }
}

/// Terminal outcome of a movement task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskOutcome {
    /// The entity arrived at its target.
    Completed,
    /// The task ended early.
    Cancelled(CancelReason),
}

/// Errors raised by the simulation core.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CorralError {
    /// A cell lies outside the configured board.
    #[error("cell ({row}, {column}) lies outside the {rows}x{columns} board")]
    OutOfBounds {
        /// Requested row, possibly negative.
        row: i64,
        /// Requested column, possibly negative.
        column: i64,
        /// Number of rows on the board.
        rows: u32,
        /// Number of columns on the board.
        columns: u32,
    },
    /// More entities were offered than the container can hold.
    #[error("{requested} entities exceed the capacity of {capacity}")]
    CapacityExceeded {
        /// Number of entities offered.
        requested: usize,
        /// Number of places available.
        capacity: usize,
    },
    /// The route has no exit for the requested direction.
    #[error("no exit is configured for {0:?}")]
    MissingExit(Direction),
    /// A required piece of static configuration is absent or malformed.
    #[error("missing or malformed configuration: {0}")]
    MissingConfiguration(String),
    /// The referenced entity does not exist.
    #[error("entity {} does not exist", .0.get())]
    UnknownEntity(EntityId),
}

/// Errors reported by the animation feedback layer.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum FeedbackError {
    /// The requested cue is not known to the entity's animation set.
    #[error("animation cue `{cue}` not found")]
    MissingCue {
        /// Name of the missing cue.
        cue: String,
    },
}
