#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Deterministic corral simulation.
//!
//! [`Simulation`] owns the world, the board, the perimeter route and every
//! system, and advances them in a fixed order whenever a [`Command::Tick`]
//! is applied. All outside interaction happens through [`Simulation::apply`]
//! and the read-only [`query`] functions.

mod feedback;
pub mod level;

use std::collections::VecDeque;

use corral_core::{
    AnimalKind, CancelReason, CellCoord, Command, CorralError, Direction, EntityId, Event,
    Spatial,
};
use corral_system_herding::{AnimalProfile, Delivery, Herding, MoveCues};
use corral_system_movement::{Movement, Resolution};
use corral_system_path_planner::PerimeterRoute;
use corral_system_slots::SlotInventory;
use corral_system_traffic_yield::TrafficYield;
use corral_world::{Board, EntitySpec, World};
use glam::Vec2;
use tracing::{debug, info, warn};

pub use feedback::{CueLog, PlayedCue};
pub use level::{LevelConfig, LevelError};

use level::AnimalSection;

/// Share of a cell taken by animals spawned at runtime.
const SPAWN_SIZE_SHARE: f32 = 0.8;

/// Complete simulation state.
pub struct Simulation {
    world: World,
    board: Board,
    route: PerimeterRoute,
    movement: Movement,
    traffic: TrafficYield,
    slots: SlotInventory,
    herding: Herding,
    cues: CueLog,
    move_cues: MoveCues,
}

impl Simulation {
    /// Builds the world described by `level`.
    pub fn from_level(level: LevelConfig) -> Result<Self, LevelError> {
        let board = Board::new(level.board_config())?;
        let route = PerimeterRoute::new(level.route_config())?;
        let slots = SlotInventory::new(level.slot_config()?);
        let cues = match &level.cues.library {
            Some(library) => CueLog::with_library(library.iter().cloned()),
            None => CueLog::new(),
        };

        let mut simulation = Self {
            world: World::new(),
            board,
            route,
            movement: Movement::new(),
            traffic: TrafficYield::new(level.traffic),
            slots,
            herding: Herding::new(),
            cues,
            move_cues: level.cues.moves.clone(),
        };

        for (index, section) in level.animals.iter().enumerate() {
            simulation.spawn_from_section(index, section)?;
        }
        if level.board.layout_by_nearest {
            let animals = simulation.herding.animals();
            let _ = simulation
                .board
                .layout_by_nearest(&mut simulation.world, &animals)?;
        }

        info!(
            rows = simulation.board.rows(),
            columns = simulation.board.columns(),
            animals = level.animals.len(),
            slots = simulation.slots.capacity(),
            "level loaded"
        );
        Ok(simulation)
    }

    /// Parses `contents` as a TOML level and builds it.
    pub fn from_toml_str(contents: &str) -> Result<Self, LevelError> {
        Self::from_level(LevelConfig::from_toml_str(contents)?)
    }

    /// Applies `command` and appends the resulting events to `out_events`.
    pub fn apply(&mut self, command: Command, out_events: &mut Vec<Event>) {
        match command {
            Command::SpawnAnimal {
                kind,
                facing,
                position,
            } => self.spawn_animal(kind, facing, position, out_events),
            Command::DespawnAnimal { animal } => {
                if self.herding.profile(animal).is_none() {
                    reject(CorralError::UnknownEntity(animal), out_events);
                    return;
                }
                self.remove_animal(animal, out_events);
            }
            Command::SetAnimalEnabled { animal, enabled } => {
                let known = self.herding.profile(animal).is_some();
                if !known || !self.world.set_enabled(animal, enabled) {
                    reject(CorralError::UnknownEntity(animal), out_events);
                }
            }
            Command::Tap { animal } => {
                if self.herding.profile(animal).is_none() {
                    reject(CorralError::UnknownEntity(animal), out_events);
                    return;
                }
                let mut resolutions = Vec::new();
                let result = self.herding.tap(
                    animal,
                    &mut self.world,
                    &mut self.board,
                    &self.route,
                    &mut self.movement,
                    &mut self.cues,
                    out_events,
                    &mut resolutions,
                );
                if let Err(error) = result {
                    reject(error, out_events);
                }
                self.settle(resolutions, out_events);
            }
            Command::Tick { dt } => {
                out_events.push(Event::TimeAdvanced { dt });
                self.traffic
                    .tick(&mut self.world, &mut self.movement, out_events);

                let mut resolutions = Vec::new();
                self.movement.tick(&mut self.world, dt, &mut resolutions);
                self.settle(resolutions, out_events);

                let mut resolutions = Vec::new();
                self.slots.tick(
                    dt,
                    &mut self.world,
                    &mut self.movement,
                    &mut self.cues,
                    out_events,
                    &mut resolutions,
                );
                self.settle(resolutions, out_events);
            }
            Command::ContactBegan { first, second } => self.traffic.contact_began(first, second),
            Command::ContactEnded { first, second } => self.traffic.contact_ended(first, second),
            Command::LayoutByNearest => {
                if let Err(error) = self.layout_idle_animals() {
                    reject(error, out_events);
                }
            }
        }
    }

    fn spawn_from_section(
        &mut self,
        index: usize,
        section: &AnimalSection,
    ) -> Result<(), CorralError> {
        let profile = section.profile(&self.move_cues);
        self.route.require_exits(&profile.exit_directions())?;
        let size = Vec2::from_array(section.size);
        let animal = match (section.start_cell(), section.position) {
            (Some(cell), _) => {
                let center = self.board.cell_to_world(cell)?;
                if let Some(holder) = self.board.occupant(cell) {
                    return Err(CorralError::MissingConfiguration(format!(
                        "animals[{index}] starts on cell ({}, {}) already held by entity {}",
                        cell.row(),
                        cell.column(),
                        holder.get()
                    )));
                }
                let animal = self.world.spawn(EntitySpec::at(center, size).with_body());
                self.board.place(&mut self.world, animal, cell)?;
                animal
            }
            (None, Some(position)) => self
                .world
                .spawn(EntitySpec::at(Vec2::from_array(position), size).with_body()),
            (None, None) => {
                return Err(CorralError::MissingConfiguration(format!(
                    "animals[{index}] needs a cell or a position"
                )));
            }
        };

        self.herding.enroll(animal, profile);
        self.traffic.enroll(animal);
        if !section.enabled {
            let _ = self.world.set_enabled(animal, false);
        }
        Ok(())
    }

    fn spawn_animal(
        &mut self,
        kind: AnimalKind,
        facing: Direction,
        position: Vec2,
        out_events: &mut Vec<Event>,
    ) {
        let mut profile = AnimalProfile::new(kind, facing);
        profile.cues = self.move_cues.clone();
        if let Err(error) = self.route.require_exits(&profile.exit_directions()) {
            reject(error, out_events);
            return;
        }
        let size = Vec2::splat(self.board.cell_size().min_element() * SPAWN_SIZE_SHARE);
        let animal = self.world.spawn(EntitySpec::at(position, size).with_body());
        let cell = self.board.world_to_cell(position);
        match self.board.occupant(cell) {
            None => {
                if let Err(error) = self.board.place(&mut self.world, animal, cell) {
                    reject(error, out_events);
                }
            }
            Some(holder) => warn!(
                animal = animal.get(),
                holder = holder.get(),
                row = cell.row(),
                column = cell.column(),
                "spawn cell taken, animal stays off the grid"
            ),
        }

        self.herding.enroll(animal, profile);
        self.traffic.enroll(animal);
        debug!(animal = animal.get(), kind = kind.name(), "animal spawned");
        out_events.push(Event::AnimalSpawned { animal, kind });
    }

    fn remove_animal(&mut self, animal: EntityId, out_events: &mut Vec<Event>) {
        let mut resolutions = Vec::new();
        let _ = self.movement.cancel(
            &mut self.world,
            animal,
            CancelReason::EntityDestroyed,
            &mut resolutions,
        );
        self.settle(resolutions, out_events);
        self.discard(animal);
        out_events.push(Event::AnimalDespawned { animal });
    }

    fn discard(&mut self, animal: EntityId) {
        self.traffic
            .withdraw(&mut self.world, &mut self.movement, animal);
        let _ = self.herding.forget(animal);
        let _ = self.board.release(animal);
        let _ = self.world.despawn(animal);
    }

    /// Dispatches resolutions until no new ones appear, feeding deliveries to the slots.
    fn settle(&mut self, mut pending: Vec<Resolution>, out_events: &mut Vec<Event>) {
        let mut deliveries: VecDeque<Delivery> = VecDeque::new();
        while !pending.is_empty() || !deliveries.is_empty() {
            for resolution in std::mem::take(&mut pending) {
                self.slots.on_resolution(&resolution);
                if let Some(delivery) = self.herding.on_resolution(
                    &resolution,
                    &mut self.world,
                    &mut self.board,
                    &self.route,
                    &mut self.movement,
                    &mut self.cues,
                    out_events,
                    &mut pending,
                ) {
                    deliveries.push_back(delivery);
                }
            }
            if pending.is_empty() {
                if let Some(delivery) = deliveries.pop_front() {
                    self.deliver(delivery, out_events, &mut pending);
                }
            }
        }
    }

    fn deliver(
        &mut self,
        delivery: Delivery,
        out_events: &mut Vec<Event>,
        pending: &mut Vec<Resolution>,
    ) {
        self.discard(delivery.animal);
        out_events.push(Event::AnimalDespawned {
            animal: delivery.animal,
        });
        let result = self.slots.spawn(
            delivery.kind,
            &mut self.world,
            &mut self.movement,
            &mut self.cues,
            out_events,
            pending,
        );
        if let Err(error) = result {
            reject(error, out_events);
        }
    }

    /// Lays idle animals out on the cells not claimed by sliding animals.
    fn layout_idle_animals(&mut self) -> Result<(), CorralError> {
        let mut idle = Vec::new();
        let mut claims: Vec<(EntityId, CellCoord)> = Vec::new();
        for animal in self.herding.animals() {
            if !self.world.is_alive(animal) {
                continue;
            }
            if self.herding.phase(animal).is_none() {
                idle.push(animal);
            } else if let Some(cell) = self.board.locate(animal) {
                claims.push((animal, cell));
            }
        }

        let free: Vec<CellCoord> = self
            .board
            .cells()
            .filter(|cell| claims.iter().all(|(_, claimed)| claimed != cell))
            .collect();
        let placed = self.board.assign_nearest(&mut self.world, &idle, &free)?;
        for (animal, cell) in claims {
            self.board.occupy(cell, animal)?;
        }
        debug!(placed = placed.len(), "idle animals laid out");
        Ok(())
    }
}

fn reject(error: CorralError, out_events: &mut Vec<Event>) {
    warn!(%error, "command rejected");
    out_events.push(Event::CommandRejected { error });
}

/// Read-only views of the simulation state.
pub mod query {
    use corral_core::{AnimalKind, CellCoord, EntityId, Spatial};
    use corral_system_herding::JourneyPhase;
    use glam::Vec2;

    use super::{PlayedCue, Simulation};

    /// Species stored in the slots, in slot order.
    #[must_use]
    pub fn slot_kinds(simulation: &Simulation) -> Vec<AnimalKind> {
        simulation
            .slots
            .entries()
            .iter()
            .map(|entry| entry.kind())
            .collect()
    }

    /// Token entities in slot order.
    #[must_use]
    pub fn slot_tokens(simulation: &Simulation) -> Vec<EntityId> {
        simulation
            .slots
            .entries()
            .iter()
            .map(|entry| entry.entity())
            .collect()
    }

    /// Animals still on the farm, in ascending order.
    #[must_use]
    pub fn animals(simulation: &Simulation) -> Vec<EntityId> {
        simulation.herding.animals()
    }

    /// Cell held by `entity`.
    #[must_use]
    pub fn cell_of(simulation: &Simulation, entity: EntityId) -> Option<CellCoord> {
        simulation.board.locate(entity)
    }

    /// Entity holding `cell`.
    #[must_use]
    pub fn occupant(simulation: &Simulation, cell: CellCoord) -> Option<EntityId> {
        simulation.board.occupant(cell)
    }

    /// Whether `entity` currently yields to another one.
    #[must_use]
    pub fn is_yielding(simulation: &Simulation, entity: EntityId) -> bool {
        simulation.traffic.is_yielding(entity)
    }

    /// Journey phase of an animal.
    #[must_use]
    pub fn phase(simulation: &Simulation, animal: EntityId) -> Option<JourneyPhase> {
        simulation.herding.phase(animal)
    }

    /// Logical position of `entity`.
    #[must_use]
    pub fn position(simulation: &Simulation, entity: EntityId) -> Option<Vec2> {
        simulation.world.position(entity)
    }

    /// Visual centre of `entity`.
    #[must_use]
    pub fn visual_center(simulation: &Simulation, entity: EntityId) -> Option<Vec2> {
        simulation.world.visual_center(entity)
    }

    /// Whether `entity` exists.
    #[must_use]
    pub fn is_alive(simulation: &Simulation, entity: EntityId) -> bool {
        simulation.world.is_alive(entity)
    }

    /// Board dimensions as `(rows, columns)`.
    #[must_use]
    pub fn board_dimensions(simulation: &Simulation) -> (u32, u32) {
        (simulation.board.rows(), simulation.board.columns())
    }

    /// Cues played so far.
    #[must_use]
    pub fn cues(simulation: &Simulation) -> &[PlayedCue] {
        simulation.cues.played()
    }

    /// True once no task runs and the inventory has nothing left to do.
    #[must_use]
    pub fn is_settled(simulation: &Simulation) -> bool {
        simulation.movement.active_count() == 0
            && !simulation.slots.is_busy()
            && simulation.slots.queued_count() == 0
    }
}
