#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Perimeter route construction from a board exit to the delivery point.
//!
//! A route is the exit point, followed by the arc of the perimeter ring that
//! joins the exit to the start of the approach, followed by the approach
//! itself. The ring is authored in clockwise order.

use std::collections::BTreeMap;

use corral_core::{CorralError, Direction};
use glam::Vec2;
use serde::Deserialize;

/// Direction in which the perimeter ring is walked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Winding {
    /// Increasing ring indices.
    #[default]
    Clockwise,
    /// Decreasing ring indices.
    CounterClockwise,
}

/// Authored waypoints describing the board perimeter.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RouteConfig {
    /// Point just outside the board for each exit direction.
    pub exits: BTreeMap<Direction, Vec2>,
    /// Cyclic ring of waypoints around the board, possibly empty.
    pub ring: Vec<Vec2>,
    /// Ordered final approach. The last point is the delivery point.
    pub approach: Vec<Vec2>,
    /// Direction the ring is walked in.
    pub winding: Winding,
}

/// Read-only perimeter route set.
#[derive(Clone, Debug)]
pub struct PerimeterRoute {
    config: RouteConfig,
}

impl PerimeterRoute {
    /// Validates and wraps the authored route.
    pub fn new(config: RouteConfig) -> Result<Self, CorralError> {
        if config.approach.is_empty() {
            return Err(CorralError::MissingConfiguration(
                "route approach must contain at least the delivery point".to_owned(),
            ));
        }
        let all_points = config
            .exits
            .values()
            .chain(config.ring.iter())
            .chain(config.approach.iter());
        for point in all_points {
            if !point.is_finite() {
                return Err(CorralError::MissingConfiguration(
                    "route waypoints must be finite".to_owned(),
                ));
            }
        }
        Ok(Self { config })
    }

    /// Exit point for `direction`.
    pub fn exit_point(&self, direction: Direction) -> Result<Vec2, CorralError> {
        self.config
            .exits
            .get(&direction)
            .copied()
            .ok_or(CorralError::MissingExit(direction))
    }

    /// Reports whether an exit exists for `direction`.
    #[must_use]
    pub fn has_exit(&self, direction: Direction) -> bool {
        self.config.exits.contains_key(&direction)
    }

    /// Fails with the first direction that has no exit.
    pub fn require_exits(&self, directions: &[Direction]) -> Result<(), CorralError> {
        directions
            .iter()
            .try_for_each(|direction| self.exit_point(*direction).map(|_| ()))
    }

    /// Final point of the approach.
    #[must_use]
    pub fn delivery_point(&self) -> Vec2 {
        // The constructor guarantees a non-empty approach.
        self.config.approach.last().copied().unwrap_or(Vec2::ZERO)
    }

    /// Full ordered waypoint list from the exit for `direction` to delivery.
    pub fn build_route(&self, direction: Direction) -> Result<Vec<Vec2>, CorralError> {
        let exit = self.exit_point(direction)?;
        let mut route = Vec::with_capacity(1 + self.config.ring.len() + self.config.approach.len());
        route.push(exit);

        let ring = &self.config.ring;
        let first_approach = self.config.approach[0];
        if let (Some(enter), Some(leave)) = (
            nearest_index(ring, exit),
            nearest_index(ring, first_approach),
        ) {
            route.extend(walk_ring(ring, enter, leave, self.config.winding));
        }

        route.extend_from_slice(&self.config.approach);
        Ok(route)
    }
}

/// Index of the point closest to `target`. Ties go to the lowest index.
#[must_use]
pub fn nearest_index(points: &[Vec2], target: Vec2) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for (index, point) in points.iter().enumerate() {
        let distance = point.distance_squared(target);
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((index, distance)),
        }
    }
    best.map(|(index, _)| index)
}

/// Ring points from `from` to `to` inclusive, walking in `winding` order.
fn walk_ring(ring: &[Vec2], from: usize, to: usize, winding: Winding) -> Vec<Vec2> {
    let length = ring.len();
    let mut points = Vec::new();
    if length == 0 {
        return points;
    }
    let mut index = from % length;
    for _ in 0..=length {
        points.push(ring[index]);
        if index == to {
            break;
        }
        index = match winding {
            Winding::Clockwise => (index + 1) % length,
            Winding::CounterClockwise => (index + length - 1) % length,
        };
    }
    points
}
