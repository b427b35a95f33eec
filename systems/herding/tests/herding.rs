use std::collections::BTreeMap;
use std::time::Duration;

use corral_core::{
    AnimalKind, CancelReason, CellCoord, Direction, EntityId, Event, Feedback, FeedbackError,
    Spatial,
};
use corral_system_herding::{
    AnimalProfile, Delivery, Herding, JourneyPhase, MoveCues, TapMode, TapOutcome,
};
use corral_system_movement::{Movement, Resolution};
use corral_system_path_planner::{PerimeterRoute, RouteConfig, Winding};
use corral_world::{Board, BoardConfig, EntitySpec, World};
use glam::Vec2;

const TICK: Duration = Duration::from_millis(50);

#[derive(Default)]
struct CueRecorder {
    played: Vec<(EntityId, String)>,
}

impl Feedback for CueRecorder {
    fn play(&mut self, entity: EntityId, cue: &str) -> Result<(), FeedbackError> {
        self.played.push((entity, cue.to_owned()));
        Ok(())
    }
}

struct Harness {
    world: World,
    board: Board,
    route: PerimeterRoute,
    movement: Movement,
    herding: Herding,
    cues: CueRecorder,
    events: Vec<Event>,
    deliveries: Vec<Delivery>,
}

impl Harness {
    /// 5x5 board of 100 unit cells centred on the origin, exits on the right only.
    fn new() -> Self {
        let mut exits = BTreeMap::new();
        let _ = exits.insert(Direction::Right, Vec2::new(350.0, 0.0));
        let route = PerimeterRoute::new(RouteConfig {
            exits,
            ring: vec![Vec2::new(350.0, -350.0)],
            approach: vec![Vec2::new(0.0, -450.0)],
            winding: Winding::Clockwise,
        })
        .expect("valid route");
        let board = Board::new(BoardConfig::new(5, 5, Vec2::splat(500.0), Vec2::ZERO))
            .expect("valid board");
        Self {
            world: World::new(),
            board,
            route,
            movement: Movement::new(),
            herding: Herding::new(),
            cues: CueRecorder::default(),
            events: Vec::new(),
            deliveries: Vec::new(),
        }
    }

    fn spawn(&mut self, cell: CellCoord, profile: AnimalProfile) -> EntityId {
        let animal = self
            .world
            .spawn(EntitySpec::at(Vec2::ZERO, Vec2::splat(80.0)).with_body());
        self.board
            .place(&mut self.world, animal, cell)
            .expect("cell inside board");
        self.herding.enroll(animal, profile);
        animal
    }

    fn tap(&mut self, animal: EntityId) -> TapOutcome {
        let mut resolutions = Vec::new();
        let outcome = self
            .herding
            .tap(
                animal,
                &mut self.world,
                &mut self.board,
                &self.route,
                &mut self.movement,
                &mut self.cues,
                &mut self.events,
                &mut resolutions,
            )
            .expect("tap succeeds");
        self.dispatch(resolutions);
        outcome
    }

    fn tick(&mut self) {
        let mut resolutions = Vec::new();
        self.movement.tick(&mut self.world, TICK, &mut resolutions);
        self.dispatch(resolutions);
    }

    fn dispatch(&mut self, mut resolutions: Vec<Resolution>) {
        while !resolutions.is_empty() {
            let mut follow_up = Vec::new();
            for resolution in &resolutions {
                if let Some(delivery) = self.herding.on_resolution(
                    resolution,
                    &mut self.world,
                    &mut self.board,
                    &self.route,
                    &mut self.movement,
                    &mut self.cues,
                    &mut self.events,
                    &mut follow_up,
                ) {
                    self.deliveries.push(delivery);
                }
            }
            resolutions = follow_up;
        }
    }

    fn run_until_still(&mut self, animal: EntityId) {
        for _ in 0..200 {
            if self.herding.phase(animal).is_none() {
                return;
            }
            self.tick();
        }
        panic!("animal never stopped");
    }

    fn cues_of(&self, animal: EntityId) -> Vec<&str> {
        self.cues
            .played
            .iter()
            .filter(|(entity, _)| *entity == animal)
            .map(|(_, cue)| cue.as_str())
            .collect()
    }
}

#[test]
fn occupied_neighbour_blocks_the_tap() {
    let mut harness = Harness::new();
    let mut profile = AnimalProfile::new(AnimalKind::Cow, Direction::Right);
    profile.cues.idle = Some("idle".to_owned());
    let cow = harness.spawn(CellCoord::new(2, 0), profile);
    let _pig = harness.spawn(
        CellCoord::new(2, 1),
        AnimalProfile::new(AnimalKind::Pig, Direction::Up),
    );

    assert_eq!(harness.tap(cow), TapOutcome::Blocked);
    assert_eq!(
        harness.events,
        vec![Event::MoveBlocked {
            animal: cow,
            cell: CellCoord::new(2, 0),
        }]
    );
    assert_eq!(harness.cues_of(cow), vec!["idle"]);
    assert_eq!(harness.board.locate(cow), Some(CellCoord::new(2, 0)));
    assert_eq!(harness.movement.active_count(), 0);
}

#[test]
fn slide_stops_in_front_of_the_next_animal() {
    let mut harness = Harness::new();
    let cow = harness.spawn(
        CellCoord::new(2, 0),
        AnimalProfile::new(AnimalKind::Cow, Direction::Right),
    );
    let _pig = harness.spawn(
        CellCoord::new(2, 3),
        AnimalProfile::new(AnimalKind::Pig, Direction::Up),
    );

    assert_eq!(
        harness.tap(cow),
        TapOutcome::Sliding {
            to: CellCoord::new(2, 2),
            leaves_board: false,
        }
    );
    assert_eq!(harness.board.locate(cow), Some(CellCoord::new(2, 2)));
    assert_eq!(harness.board.occupant(CellCoord::new(2, 0)), None);
    assert_eq!(harness.herding.phase(cow), Some(JourneyPhase::Sliding));

    harness.run_until_still(cow);

    assert_eq!(harness.world.visual_center(cow), Some(Vec2::new(0.0, 0.0)));
    assert_eq!(
        harness.events.last(),
        Some(&Event::SlideStopped {
            animal: cow,
            cell: CellCoord::new(2, 2),
        })
    );
    assert_eq!(harness.cues_of(cow), vec!["r_move"]);
    assert!(harness.deliveries.is_empty());
}

#[test]
fn edge_slide_follows_the_route_to_delivery() {
    let mut harness = Harness::new();
    let sheep = harness.spawn(
        CellCoord::new(2, 4),
        AnimalProfile::new(AnimalKind::Sheep, Direction::Right),
    );

    assert_eq!(
        harness.tap(sheep),
        TapOutcome::Sliding {
            to: CellCoord::new(2, 4),
            leaves_board: true,
        }
    );
    harness.run_until_still(sheep);

    assert_eq!(
        harness.deliveries,
        vec![Delivery {
            animal: sheep,
            kind: AnimalKind::Sheep,
        }]
    );
    assert_eq!(harness.board.locate(sheep), None);
    assert_eq!(harness.world.visual_center(sheep), Some(Vec2::new(0.0, -450.0)));
    assert!(harness.events.contains(&Event::LeftBoard {
        animal: sheep,
        direction: Direction::Right,
    }));
    assert_eq!(
        harness.events.last(),
        Some(&Event::Delivered {
            animal: sheep,
            kind: AnimalKind::Sheep,
        })
    );
    // The exit leg keeps travelling right, so its cue is not replayed.
    assert_eq!(harness.cues_of(sheep), vec!["r_move", "b_move", "l_move"]);
}

#[test]
fn taps_while_travelling_are_ignored() {
    let mut harness = Harness::new();
    let horse = harness.spawn(
        CellCoord::new(2, 0),
        AnimalProfile::new(AnimalKind::Horse, Direction::Right),
    );

    assert!(matches!(harness.tap(horse), TapOutcome::Sliding { .. }));
    harness.tick();
    assert_eq!(harness.tap(horse), TapOutcome::Ignored);
    assert_eq!(
        harness
            .events
            .iter()
            .filter(|event| matches!(event, Event::SlideStarted { .. }))
            .count(),
        1
    );
}

#[test]
fn missing_exit_is_reported_without_moving() {
    let mut harness = Harness::new();
    let bunny = harness.spawn(
        CellCoord::new(0, 2),
        AnimalProfile::new(AnimalKind::Bunny, Direction::Up),
    );

    assert_eq!(harness.tap(bunny), TapOutcome::Misconfigured);
    assert_eq!(
        harness.events,
        vec![Event::MoveMisconfigured {
            animal: bunny,
            direction: Direction::Up,
        }]
    );
    assert_eq!(harness.board.locate(bunny), Some(CellCoord::new(0, 2)));
    assert_eq!(harness.movement.active_count(), 0);
}

#[test]
fn first_open_mode_turns_clockwise_past_obstacles() {
    let mut harness = Harness::new();
    let mut profile = AnimalProfile::new(AnimalKind::Chicken, Direction::Right);
    profile.tap_mode = TapMode::FirstOpen;
    let chicken = harness.spawn(CellCoord::new(2, 2), profile);
    let _cow = harness.spawn(
        CellCoord::new(2, 3),
        AnimalProfile::new(AnimalKind::Cow, Direction::Up),
    );
    let _pig = harness.spawn(
        CellCoord::new(4, 2),
        AnimalProfile::new(AnimalKind::Pig, Direction::Up),
    );

    assert_eq!(
        harness.tap(chicken),
        TapOutcome::Sliding {
            to: CellCoord::new(3, 2),
            leaves_board: false,
        }
    );
    assert_eq!(
        harness.herding.profile(chicken).map(|profile| profile.facing),
        Some(Direction::Down)
    );
    harness.run_until_still(chicken);
    assert_eq!(harness.cues_of(chicken), vec!["b_move"]);
}

#[test]
fn cancelled_task_aborts_the_journey() {
    let mut harness = Harness::new();
    let mut profile = AnimalProfile::new(AnimalKind::Pig, Direction::Right);
    profile.cues = MoveCues {
        idle: Some("idle".to_owned()),
        ..MoveCues::default()
    };
    let pig = harness.spawn(CellCoord::new(2, 0), profile);
    assert!(matches!(harness.tap(pig), TapOutcome::Sliding { .. }));
    harness.tick();

    let mut resolutions = Vec::new();
    assert!(harness
        .movement
        .cancel(&mut harness.world, pig, CancelReason::Stopped, &mut resolutions));
    harness.dispatch(resolutions);

    assert_eq!(harness.herding.phase(pig), None);
    assert_eq!(
        harness.events.last(),
        Some(&Event::JourneyAborted {
            animal: pig,
            reason: CancelReason::Stopped,
        })
    );
    assert_eq!(harness.cues_of(pig), vec!["r_move", "idle"]);
    assert!(matches!(harness.tap(pig), TapOutcome::Sliding { .. }));
}

#[test]
fn lost_route_after_leaving_the_board_is_reported() {
    let mut harness = Harness::new();
    let sheep = harness.spawn(
        CellCoord::new(2, 4),
        AnimalProfile::new(AnimalKind::Sheep, Direction::Right),
    );
    assert!(matches!(harness.tap(sheep), TapOutcome::Sliding { .. }));

    harness.route = PerimeterRoute::new(RouteConfig {
        exits: BTreeMap::new(),
        ring: Vec::new(),
        approach: vec![Vec2::new(0.0, -450.0)],
        winding: Winding::Clockwise,
    })
    .expect("valid route");
    harness.run_until_still(sheep);

    assert_eq!(
        harness.events[harness.events.len() - 2..],
        [
            Event::LeftBoard {
                animal: sheep,
                direction: Direction::Right,
            },
            Event::MoveMisconfigured {
                animal: sheep,
                direction: Direction::Right,
            },
        ]
    );
    assert!(harness.deliveries.is_empty());
    assert_eq!(harness.board.locate(sheep), None);
    assert_eq!(harness.movement.active_count(), 0);
}

#[test]
fn exit_directions_follow_the_tap_mode() {
    let mut profile = AnimalProfile::new(AnimalKind::Horse, Direction::Left);
    assert_eq!(profile.exit_directions(), vec![Direction::Left]);

    profile.tap_mode = TapMode::FirstOpen;
    assert_eq!(profile.exit_directions(), Direction::ALL.to_vec());
}
