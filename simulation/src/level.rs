//! TOML level layout.
//!
//! Points are written as `[x, y]` pairs, durations in milliseconds.

use std::collections::BTreeMap;
use std::time::Duration;

use corral_core::{
    AnimalKind, CellCoord, CorralError, Direction, GridInversion, OverflowPolicy,
};
use corral_system_herding::{AnimalProfile, MoveCues, TapMode};
use corral_system_path_planner::{RouteConfig, Winding};
use corral_system_slots::SlotConfig;
use corral_system_traffic_yield::YieldConfig;
use corral_world::BoardConfig;
use glam::Vec2;
use serde::Deserialize;
use thiserror::Error;

/// Failure to load a level.
#[derive(Debug, Error)]
pub enum LevelError {
    /// The TOML text could not be parsed into a level.
    #[error("failed to parse level: {0}")]
    Parse(#[from] toml::de::Error),
    /// The level parsed but describes an invalid setup.
    #[error("invalid level: {0}")]
    Invalid(#[from] CorralError),
}

/// Complete level description.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LevelConfig {
    /// Grid layout.
    pub board: BoardSection,
    /// Perimeter route to the barn.
    pub route: RouteSection,
    /// Slot inventory layout and timing.
    #[serde(default)]
    pub slots: SlotSection,
    /// Yield coordinator tuning.
    #[serde(default)]
    pub traffic: YieldConfig,
    /// Cue names and the optional cue library.
    #[serde(default)]
    pub cues: CueSection,
    /// Animals present when the level starts.
    #[serde(default)]
    pub animals: Vec<AnimalSection>,
}

/// `[board]` table.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoardSection {
    /// Number of rows.
    pub rows: u32,
    /// Number of columns.
    pub columns: u32,
    /// Width and height of the board area.
    pub extent: [f32; 2],
    /// Centre of the board area.
    #[serde(default)]
    pub center: [f32; 2],
    /// Margin kept free inside the board area.
    #[serde(default)]
    pub inner_padding: f32,
    /// Forces square cells.
    #[serde(default)]
    pub square_cells: bool,
    /// Policy when a layout has more animals than cells.
    #[serde(default)]
    pub overflow: OverflowPolicy,
    /// Snap every animal onto its nearest cell on load.
    #[serde(default)]
    pub layout_by_nearest: bool,
}

/// `[route]` table.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteSection {
    /// Exit point per direction.
    #[serde(default)]
    pub exits: ExitSection,
    /// Perimeter ring waypoints.
    #[serde(default)]
    pub ring: Vec<[f32; 2]>,
    /// Approach waypoints ending at the delivery point.
    pub approach: Vec<[f32; 2]>,
    /// Direction the ring is walked in.
    #[serde(default)]
    pub winding: Winding,
}

/// `[route.exits]` table. Missing entries leave that side without an exit.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExitSection {
    /// Exit above the board.
    pub up: Option<[f32; 2]>,
    /// Exit right of the board.
    pub right: Option<[f32; 2]>,
    /// Exit below the board.
    pub down: Option<[f32; 2]>,
    /// Exit left of the board.
    pub left: Option<[f32; 2]>,
}

/// `[slots]` table.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SlotSection {
    /// Slot positions in fill order.
    pub positions: Vec<[f32; 2]>,
    /// Displacement of the tokens behind a merging entry.
    pub shift_offset: [f32; 2],
    /// Shift duration in milliseconds.
    pub shift_ms: u64,
    /// Pop pulse duration in milliseconds.
    pub pop_ms: u64,
    /// Minimum match cue time in milliseconds.
    pub merge_hold_ms: u64,
    /// Policy when every slot is taken.
    pub overflow: OverflowPolicy,
    /// Token size before scaling.
    pub token_size: [f32; 2],
    /// Scale of new tokens.
    pub token_scale: f32,
}

impl Default for SlotSection {
    fn default() -> Self {
        let defaults = SlotConfig::default();
        Self {
            positions: Vec::new(),
            shift_offset: defaults.shift_offset.to_array(),
            shift_ms: millis(defaults.shift_duration),
            pop_ms: millis(defaults.pop_duration),
            merge_hold_ms: millis(defaults.merge_hold),
            overflow: defaults.overflow,
            token_size: defaults.token_size.to_array(),
            token_scale: defaults.token_scale,
        }
    }
}

/// `[cues]` table.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CueSection {
    /// Movement cue names shared by every animal.
    pub moves: MoveCues,
    /// Known cues. When present, any other cue is reported as missing.
    pub library: Option<Vec<String>>,
}

/// One `[[animals]]` entry.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnimalSection {
    /// Species.
    pub kind: AnimalKind,
    /// Direction the animal runs in when tapped.
    pub facing: Direction,
    /// Starting cell as `[row, column]`.
    #[serde(default)]
    pub cell: Option<[u32; 2]>,
    /// Starting position, used when no cell is given.
    #[serde(default)]
    pub position: Option<[f32; 2]>,
    /// Visual size of the animal.
    #[serde(default = "default_animal_size")]
    pub size: [f32; 2],
    /// Grid inversion of mirrored boards.
    #[serde(default)]
    pub inversion: GridInversion,
    /// Travel speed, defaults to the herding default.
    #[serde(default)]
    pub speed: Option<f32>,
    /// Stop distance of each movement task.
    #[serde(default)]
    pub stop_distance: f32,
    /// Direction selection rule.
    #[serde(default)]
    pub tap_mode: TapMode,
    /// Whether the animal reacts to taps from the start.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_animal_size() -> [f32; 2] {
    [80.0, 80.0]
}

fn default_enabled() -> bool {
    true
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl LevelConfig {
    /// Parses a level from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, LevelError> {
        Ok(toml::from_str(contents)?)
    }

    /// Board configuration of the level.
    #[must_use]
    pub fn board_config(&self) -> BoardConfig {
        let board = &self.board;
        let mut config = BoardConfig::new(
            board.rows,
            board.columns,
            Vec2::from_array(board.extent),
            Vec2::from_array(board.center),
        );
        config.inner_padding = board.inner_padding;
        config.square_cells = board.square_cells;
        config.overflow = board.overflow;
        config
    }

    /// Route configuration of the level.
    #[must_use]
    pub fn route_config(&self) -> RouteConfig {
        let exits = &self.route.exits;
        let exits: BTreeMap<Direction, Vec2> = [
            (Direction::Up, exits.up),
            (Direction::Right, exits.right),
            (Direction::Down, exits.down),
            (Direction::Left, exits.left),
        ]
        .into_iter()
        .filter_map(|(direction, point)| point.map(|point| (direction, Vec2::from_array(point))))
        .collect();
        RouteConfig {
            exits,
            ring: points(&self.route.ring),
            approach: points(&self.route.approach),
            winding: self.route.winding,
        }
    }

    /// Slot inventory configuration of the level.
    pub fn slot_config(&self) -> Result<SlotConfig, CorralError> {
        let slots = &self.slots;
        if slots.positions.is_empty() {
            return Err(CorralError::MissingConfiguration(
                "slots.positions must list at least one slot".to_owned(),
            ));
        }
        Ok(SlotConfig {
            slots: points(&slots.positions),
            shift_offset: Vec2::from_array(slots.shift_offset),
            shift_duration: Duration::from_millis(slots.shift_ms),
            pop_duration: Duration::from_millis(slots.pop_ms),
            merge_hold: Duration::from_millis(slots.merge_hold_ms),
            overflow: slots.overflow,
            token_size: Vec2::from_array(slots.token_size),
            token_scale: slots.token_scale,
        })
    }
}

impl AnimalSection {
    /// Herding profile of the animal, using `cues` for its rig.
    #[must_use]
    pub fn profile(&self, cues: &MoveCues) -> AnimalProfile {
        let mut profile = AnimalProfile::new(self.kind, self.facing);
        profile.inversion = self.inversion;
        if let Some(speed) = self.speed {
            profile.speed = speed;
        }
        profile.stop_distance = self.stop_distance;
        profile.tap_mode = self.tap_mode;
        profile.cues = cues.clone();
        profile
    }

    /// Starting cell, if the entry names one.
    #[must_use]
    pub fn start_cell(&self) -> Option<CellCoord> {
        self.cell.map(|[row, column]| CellCoord::new(row, column))
    }
}

fn points(pairs: &[[f32; 2]]) -> Vec<Vec2> {
    pairs.iter().copied().map(Vec2::from_array).collect()
}
