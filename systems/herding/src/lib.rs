#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Tap-driven herding of animals from the board to the barn.
//!
//! Every enrolled animal runs through an explicit journey:
//! a tap probes the board and starts a straight slide; a slide that ends on
//! the board edge continues along the perimeter route, one movement task per
//! waypoint, until the animal is delivered. Progress is driven by movement
//! [`Resolution`]s handed back through [`Herding::on_resolution`].

use std::collections::{BTreeMap, VecDeque};

use corral_core::{
    play_cue, AnimalKind, CellCoord, CorralError, Direction, EntityId, Event, Feedback,
    GridInversion, PhysicsBodies, Spatial, TaskOutcome,
};
use corral_system_movement::{MoveOrder, Movement, Resolution, TaskHandle};
use corral_system_path_planner::PerimeterRoute;
use corral_world::Board;
use glam::Vec2;
use serde::Deserialize;
use tracing::{debug, error, info};

/// Route legs shorter than this resolve without moving.
const MIN_LEG_DISTANCE: f32 = 0.5;

/// How a tapped animal chooses its direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TapMode {
    /// Always run towards the facing direction.
    #[default]
    Facing,
    /// Run towards the first open direction, clockwise from the facing one.
    FirstOpen,
}

/// Names of the movement cues of an animal rig.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MoveCues {
    /// Travelling towards the left of the screen.
    pub left: String,
    /// Travelling towards the right of the screen.
    pub right: String,
    /// Travelling towards the top of the screen.
    pub up: String,
    /// Travelling towards the bottom of the screen.
    pub down: String,
    /// Played when the animal stands still, if the rig has one.
    pub idle: Option<String>,
}

impl MoveCues {
    /// Cue for travel in `direction`.
    #[must_use]
    pub fn for_direction(&self, direction: Direction) -> &str {
        match direction {
            Direction::Left => &self.left,
            Direction::Right => &self.right,
            Direction::Up => &self.up,
            Direction::Down => &self.down,
        }
    }
}

impl Default for MoveCues {
    fn default() -> Self {
        Self {
            left: "l_move".to_owned(),
            right: "r_move".to_owned(),
            up: "f_move".to_owned(),
            down: "b_move".to_owned(),
            idle: None,
        }
    }
}

/// Static per-animal settings.
#[derive(Clone, Debug, PartialEq)]
pub struct AnimalProfile {
    /// Species delivered to the slots.
    pub kind: AnimalKind,
    /// Viewer-space direction the animal runs in when tapped.
    pub facing: Direction,
    /// Axis inversion of the board the animal stands on.
    pub inversion: GridInversion,
    /// Travel speed in world units per second.
    pub speed: f32,
    /// Stop distance of each movement task.
    pub stop_distance: f32,
    /// Direction selection rule.
    pub tap_mode: TapMode,
    /// Cue names of the rig.
    pub cues: MoveCues,
}

impl AnimalProfile {
    /// Profile with the default speed, cues and tap mode.
    #[must_use]
    pub fn new(kind: AnimalKind, facing: Direction) -> Self {
        Self {
            kind,
            facing,
            inversion: GridInversion::default(),
            speed: 800.0,
            stop_distance: 0.0,
            tap_mode: TapMode::Facing,
            cues: MoveCues::default(),
        }
    }

    /// Directions a tap can send the animal off the board in.
    #[must_use]
    pub fn exit_directions(&self) -> Vec<Direction> {
        match self.tap_mode {
            TapMode::Facing => vec![self.facing],
            TapMode::FirstOpen => Direction::ALL.to_vec(),
        }
    }
}

/// Immediate result of a tap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TapOutcome {
    /// The animal is unknown, disabled or already travelling.
    Ignored,
    /// The next cell is occupied.
    Blocked,
    /// The slide would leave the board towards a direction without an exit.
    Misconfigured,
    /// The animal started sliding.
    Sliding {
        /// Cell the slide ends on.
        to: CellCoord,
        /// Whether the animal leaves the board afterwards.
        leaves_board: bool,
    },
}

/// Animal that reached the delivery point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Delivery {
    /// Delivered animal.
    pub animal: EntityId,
    /// Its species.
    pub kind: AnimalKind,
}

/// Coarse journey state exposed for queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JourneyPhase {
    /// Sliding across the board.
    Sliding,
    /// Following the perimeter route.
    Routing,
}

#[derive(Clone, Debug)]
enum Journey {
    Sliding {
        handle: TaskHandle,
        direction: Direction,
        end: CellCoord,
        leaves_board: bool,
    },
    Routing {
        handle: TaskHandle,
        remaining: VecDeque<Vec2>,
    },
}

impl Journey {
    fn handle(&self) -> TaskHandle {
        match self {
            Self::Sliding { handle, .. } | Self::Routing { handle, .. } => *handle,
        }
    }
}

#[derive(Clone, Debug)]
struct Herd {
    profile: AnimalProfile,
    journey: Option<Journey>,
    last_cue: Option<Direction>,
}

/// Drives every enrolled animal's journey.
#[derive(Debug, Default)]
pub struct Herding {
    animals: BTreeMap<EntityId, Herd>,
}

impl Herding {
    /// Creates a controller with no animals.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an animal.
    pub fn enroll(&mut self, animal: EntityId, profile: AnimalProfile) {
        let _ = self.animals.insert(
            animal,
            Herd {
                profile,
                journey: None,
                last_cue: None,
            },
        );
    }

    /// Drops an animal. Its movement task is left to the caller.
    pub fn forget(&mut self, animal: EntityId) -> Option<AnimalProfile> {
        self.animals.remove(&animal).map(|herd| herd.profile)
    }

    /// Profile of an enrolled animal.
    #[must_use]
    pub fn profile(&self, animal: EntityId) -> Option<&AnimalProfile> {
        self.animals.get(&animal).map(|herd| &herd.profile)
    }

    /// Journey phase of an animal, `None` while it stands still.
    #[must_use]
    pub fn phase(&self, animal: EntityId) -> Option<JourneyPhase> {
        self.animals
            .get(&animal)
            .and_then(|herd| herd.journey.as_ref())
            .map(|journey| match journey {
                Journey::Sliding { .. } => JourneyPhase::Sliding,
                Journey::Routing { .. } => JourneyPhase::Routing,
            })
    }

    /// Enrolled animals in ascending order.
    #[must_use]
    pub fn animals(&self) -> Vec<EntityId> {
        self.animals.keys().copied().collect()
    }

    /// Reacts to a tap on `animal`.
    #[allow(clippy::too_many_arguments)]
    pub fn tap<W>(
        &mut self,
        animal: EntityId,
        world: &mut W,
        board: &mut Board,
        route: &PerimeterRoute,
        movement: &mut Movement,
        feedback: &mut dyn Feedback,
        events: &mut Vec<Event>,
        resolutions: &mut Vec<Resolution>,
    ) -> Result<TapOutcome, CorralError>
    where
        W: Spatial + PhysicsBodies + ?Sized,
    {
        let Some(herd) = self.animals.get_mut(&animal) else {
            return Ok(TapOutcome::Ignored);
        };
        if herd.journey.is_some() || !world.is_enabled(animal) {
            return Ok(TapOutcome::Ignored);
        }

        let Some(cell) = board.locate(animal).or_else(|| {
            world
                .visual_center(animal)
                .map(|center| board.world_to_cell(center))
        }) else {
            return Ok(TapOutcome::Ignored);
        };

        let inversion = herd.profile.inversion;
        let direction = match herd.profile.tap_mode {
            TapMode::Facing => Some(herd.profile.facing),
            TapMode::FirstOpen => board.first_open_direction(cell, herd.profile.facing, inversion),
        };
        let Some(direction) = direction else {
            play_idle(herd, animal, feedback);
            events.push(Event::MoveBlocked { animal, cell });
            return Ok(TapOutcome::Blocked);
        };
        herd.profile.facing = direction;

        let probe = board.probe(cell, direction.grid_step(inversion));
        if !probe.can_move {
            play_idle(herd, animal, feedback);
            events.push(Event::MoveBlocked { animal, cell });
            return Ok(TapOutcome::Blocked);
        }
        if probe.hit_edge && !route.has_exit(direction) {
            error!(animal = animal.get(), ?direction, "no exit configured for slide direction");
            play_idle(herd, animal, feedback);
            events.push(Event::MoveMisconfigured { animal, direction });
            return Ok(TapOutcome::Misconfigured);
        }

        let center = board.cell_to_world(probe.end)?;
        let Some(target) = world.aligned_position(animal, center) else {
            return Ok(TapOutcome::Ignored);
        };
        let _ = board.clear(cell, animal);
        board.occupy(probe.end, animal)?;

        let travel = world
            .visual_center(animal)
            .map_or(Vec2::ZERO, |from| center - from);
        play_move(herd, animal, Direction::from_travel(travel).unwrap_or(direction), feedback);

        let order = MoveOrder::to_point(target, herd.profile.speed)
            .with_stop_distance(herd.profile.stop_distance);
        let handle = movement.start(world, animal, order, resolutions);
        herd.journey = Some(Journey::Sliding {
            handle,
            direction,
            end: probe.end,
            leaves_board: probe.hit_edge,
        });
        debug!(
            animal = animal.get(),
            ?direction,
            row = probe.end.row(),
            column = probe.end.column(),
            leaves_board = probe.hit_edge,
            "slide started"
        );
        events.push(Event::SlideStarted {
            animal,
            direction,
            from: cell,
            to: probe.end,
            leaves_board: probe.hit_edge,
        });
        Ok(TapOutcome::Sliding {
            to: probe.end,
            leaves_board: probe.hit_edge,
        })
    }

    /// Advances the journey that owns `resolution`, if any.
    #[allow(clippy::too_many_arguments)]
    pub fn on_resolution<W>(
        &mut self,
        resolution: &Resolution,
        world: &mut W,
        board: &mut Board,
        route: &PerimeterRoute,
        movement: &mut Movement,
        feedback: &mut dyn Feedback,
        events: &mut Vec<Event>,
        resolutions: &mut Vec<Resolution>,
    ) -> Option<Delivery>
    where
        W: Spatial + PhysicsBodies + ?Sized,
    {
        let animal = resolution.handle.entity();
        let herd = self.animals.get_mut(&animal)?;
        if herd.journey.as_ref().map(Journey::handle) != Some(resolution.handle) {
            return None;
        }
        let journey = herd.journey.take()?;

        if let TaskOutcome::Cancelled(reason) = resolution.outcome {
            debug!(animal = animal.get(), reason = reason.as_str(), "journey aborted");
            play_idle(herd, animal, feedback);
            events.push(Event::JourneyAborted { animal, reason });
            return None;
        }

        let mut remaining = match journey {
            Journey::Sliding {
                leaves_board: false,
                end,
                ..
            } => {
                play_idle(herd, animal, feedback);
                events.push(Event::SlideStopped { animal, cell: end });
                return None;
            }
            Journey::Sliding { direction, .. } => {
                let _ = board.release(animal);
                events.push(Event::LeftBoard { animal, direction });
                match route.build_route(direction) {
                    Ok(points) => VecDeque::from(points),
                    Err(err) => {
                        error!(animal = animal.get(), %err, "perimeter route unavailable");
                        play_idle(herd, animal, feedback);
                        events.push(Event::MoveMisconfigured { animal, direction });
                        return None;
                    }
                }
            }
            Journey::Routing { remaining, .. } => remaining,
        };

        let next = start_next_leg(
            herd,
            animal,
            &mut remaining,
            world,
            movement,
            feedback,
            resolutions,
        );
        if let Some(handle) = next {
            herd.journey = Some(Journey::Routing { handle, remaining });
            return None;
        }

        play_idle(herd, animal, feedback);
        let kind = herd.profile.kind;
        info!(animal = animal.get(), kind = kind.name(), "animal delivered");
        events.push(Event::Delivered { animal, kind });
        Some(Delivery { animal, kind })
    }
}

fn start_next_leg<W>(
    herd: &mut Herd,
    animal: EntityId,
    remaining: &mut VecDeque<Vec2>,
    world: &mut W,
    movement: &mut Movement,
    feedback: &mut dyn Feedback,
    resolutions: &mut Vec<Resolution>,
) -> Option<TaskHandle>
where
    W: Spatial + PhysicsBodies + ?Sized,
{
    while let Some(point) = remaining.pop_front() {
        let from = world.visual_center(animal)?;
        let travel = point - from;
        if travel.length() < MIN_LEG_DISTANCE {
            continue;
        }
        let target = world.aligned_position(animal, point)?;
        if let Some(direction) = Direction::from_travel(travel) {
            play_move(herd, animal, direction, feedback);
        }
        let order = MoveOrder::to_point(target, herd.profile.speed)
            .with_stop_distance(herd.profile.stop_distance);
        return Some(movement.start(world, animal, order, resolutions));
    }
    None
}

fn play_move(herd: &mut Herd, animal: EntityId, direction: Direction, feedback: &mut dyn Feedback) {
    if herd.last_cue == Some(direction) {
        return;
    }
    herd.last_cue = Some(direction);
    play_cue(feedback, animal, herd.profile.cues.for_direction(direction));
}

fn play_idle(herd: &mut Herd, animal: EntityId, feedback: &mut dyn Feedback) {
    herd.last_cue = None;
    if let Some(idle) = &herd.profile.cues.idle {
        play_cue(feedback, animal, idle);
    }
}
