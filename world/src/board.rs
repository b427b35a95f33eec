//! Rectangular grid geometry, occupancy and straight-line probing.

use corral_core::{
    CellCoord, CorralError, Direction, EntityId, GridInversion, GridStep, OverflowPolicy,
    ProbeResult, Spatial,
};
use glam::Vec2;
use tracing::{debug, warn};

use crate::assignment;

/// Static description of a board.
#[derive(Clone, Debug, PartialEq)]
pub struct BoardConfig {
    /// Number of rows.
    pub rows: u32,
    /// Number of columns.
    pub columns: u32,
    /// Physical width and height of the board in world units.
    pub extent: Vec2,
    /// World position of the board centre.
    pub center: Vec2,
    /// Margin kept free on every side of the grid.
    pub inner_padding: f32,
    /// Forces square cells using the smaller of the two raw dimensions.
    pub square_cells: bool,
    /// What to do when more entities than cells are laid out.
    pub overflow: OverflowPolicy,
}

impl BoardConfig {
    /// Creates a configuration with no padding and rectangular cells.
    #[must_use]
    pub fn new(rows: u32, columns: u32, extent: Vec2, center: Vec2) -> Self {
        Self {
            rows,
            columns,
            extent,
            center,
            inner_padding: 0.0,
            square_cells: false,
            overflow: OverflowPolicy::default(),
        }
    }
}

/// Grid board that owns cell geometry and the occupancy matrix.
///
/// Row 0 is the top row and column 0 the left column. World space grows
/// upwards, so increasing rows map to decreasing `y`.
#[derive(Clone, Debug)]
pub struct Board {
    config: BoardConfig,
    cell_size: Vec2,
    grid_size: Vec2,
    occupancy: Vec<Option<EntityId>>,
}

impl Board {
    /// Creates a board and computes its geometry.
    pub fn new(config: BoardConfig) -> Result<Self, CorralError> {
        validate(&config)?;
        let mut board = Self {
            config,
            cell_size: Vec2::ZERO,
            grid_size: Vec2::ZERO,
            occupancy: Vec::new(),
        };
        board.compute_geometry();
        Ok(board)
    }

    /// Recomputes cell and grid sizes and clears the occupancy matrix.
    pub fn compute_geometry(&mut self) {
        let padding = self.config.inner_padding;
        let usable = Vec2::new(
            (self.config.extent.x - 2.0 * padding).max(1.0),
            (self.config.extent.y - 2.0 * padding).max(1.0),
        );
        let mut cell = Vec2::new(
            usable.x / self.config.columns.max(1) as f32,
            usable.y / self.config.rows.max(1) as f32,
        );
        if self.config.square_cells {
            cell = Vec2::splat(cell.x.min(cell.y));
        }
        self.cell_size = cell;
        self.grid_size = Vec2::new(
            cell.x * self.config.columns as f32,
            cell.y * self.config.rows as f32,
        );
        let capacity = usize::try_from(u64::from(self.config.rows) * u64::from(self.config.columns))
            .unwrap_or(0);
        self.occupancy = vec![None; capacity];
        debug!(
            rows = self.config.rows,
            columns = self.config.columns,
            cell_width = cell.x,
            cell_height = cell.y,
            "board geometry computed"
        );
    }

    /// Changes the board shape and size, then recomputes its geometry.
    pub fn reconfigure(
        &mut self,
        rows: u32,
        columns: u32,
        extent: Vec2,
    ) -> Result<(), CorralError> {
        let mut config = self.config.clone();
        config.rows = rows;
        config.columns = columns;
        config.extent = extent;
        validate(&config)?;
        self.config = config;
        self.compute_geometry();
        Ok(())
    }

    /// Configuration the board was built from.
    #[must_use]
    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    /// Number of rows.
    #[must_use]
    pub fn rows(&self) -> u32 {
        self.config.rows
    }

    /// Number of columns.
    #[must_use]
    pub fn columns(&self) -> u32 {
        self.config.columns
    }

    /// Width and height of a single cell.
    #[must_use]
    pub fn cell_size(&self) -> Vec2 {
        self.cell_size
    }

    /// Width and height of the whole grid.
    #[must_use]
    pub fn grid_size(&self) -> Vec2 {
        self.grid_size
    }

    /// Reports whether signed coordinates fall inside the board.
    #[must_use]
    pub fn contains(&self, row: i64, column: i64) -> bool {
        row >= 0
            && column >= 0
            && row < i64::from(self.config.rows)
            && column < i64::from(self.config.columns)
    }

    /// Iterates over every cell in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = CellCoord> + '_ {
        (0..self.config.rows).flat_map(move |row| {
            (0..self.config.columns).map(move |column| CellCoord::new(row, column))
        })
    }

    /// World position of the centre of `cell`.
    pub fn cell_to_world(&self, cell: CellCoord) -> Result<Vec2, CorralError> {
        let _ = self.index(cell).ok_or_else(|| self.out_of_bounds(cell))?;
        let top_left = self.top_left();
        Ok(Vec2::new(
            top_left.x + (cell.column() as f32 + 0.5) * self.cell_size.x,
            top_left.y - (cell.row() as f32 + 0.5) * self.cell_size.y,
        ))
    }

    /// Cell whose centre is nearest to `position`, clamped into the board.
    #[must_use]
    pub fn world_to_cell(&self, position: Vec2) -> CellCoord {
        let top_left = self.top_left();
        let column = round_half_up((position.x - top_left.x) / self.cell_size.x - 0.5);
        let row = round_half_up((top_left.y - position.y) / self.cell_size.y - 0.5);
        CellCoord::new(
            clamp_index(row, self.config.rows),
            clamp_index(column, self.config.columns),
        )
    }

    /// Entity occupying `cell`, if any.
    #[must_use]
    pub fn occupant(&self, cell: CellCoord) -> Option<EntityId> {
        self.index(cell)
            .and_then(|index| self.occupancy.get(index).copied().flatten())
    }

    /// Cell currently claimed by `entity`.
    #[must_use]
    pub fn locate(&self, entity: EntityId) -> Option<CellCoord> {
        let position = self
            .occupancy
            .iter()
            .position(|occupant| *occupant == Some(entity))?;
        let columns = usize::try_from(self.config.columns).ok()?.max(1);
        let row = u32::try_from(position / columns).ok()?;
        let column = u32::try_from(position % columns).ok()?;
        Some(CellCoord::new(row, column))
    }

    /// Claims `cell` for `entity`, releasing any other cell it held.
    pub fn occupy(&mut self, cell: CellCoord, entity: EntityId) -> Result<(), CorralError> {
        let index = self.index(cell).ok_or_else(|| self.out_of_bounds(cell))?;
        let _ = self.release(entity);
        if let Some(previous) = self.occupancy[index].replace(entity) {
            debug!(
                displaced = previous.get(),
                entity = entity.get(),
                row = cell.row(),
                column = cell.column(),
                "occupancy overwritten"
            );
        }
        Ok(())
    }

    /// Claims `cell` and aligns the entity's visual centre with the cell centre.
    ///
    /// Does nothing for entities that no longer exist.
    pub fn place<S>(
        &mut self,
        spatial: &mut S,
        entity: EntityId,
        cell: CellCoord,
    ) -> Result<(), CorralError>
    where
        S: Spatial + ?Sized,
    {
        let center = self.cell_to_world(cell)?;
        if !spatial.is_alive(entity) {
            return Ok(());
        }
        self.occupy(cell, entity)?;
        let _ = spatial.align_to(entity, center);
        Ok(())
    }

    /// Clears `cell` when `entity` holds it. Returns whether anything changed.
    pub fn clear(&mut self, cell: CellCoord, entity: EntityId) -> bool {
        let Some(index) = self.index(cell) else {
            return false;
        };
        if self.occupancy[index] == Some(entity) {
            self.occupancy[index] = None;
            true
        } else {
            false
        }
    }

    /// Releases whatever cell `entity` holds.
    pub fn release(&mut self, entity: EntityId) -> Option<CellCoord> {
        let cell = self.locate(entity)?;
        let _ = self.clear(cell, entity);
        Some(cell)
    }

    /// Empties every cell.
    pub fn reset_occupancy(&mut self) {
        self.occupancy.fill(None);
    }

    /// Scans from `cell` in steps of `step` until the edge or an occupied cell.
    ///
    /// Leaving the board wins over blocking: when the next step leaves the
    /// board the probe reports `can_move` with `hit_edge`, even with zero
    /// displacement. An immediately occupied neighbour yields `can_move = false`.
    #[must_use]
    pub fn probe(&self, cell: CellCoord, step: GridStep) -> ProbeResult {
        if step.is_zero() {
            return ProbeResult {
                can_move: false,
                end: cell,
                hit_edge: false,
            };
        }

        let mut row = i64::from(cell.row());
        let mut column = i64::from(cell.column());
        let mut moved = false;
        loop {
            let next_row = row + i64::from(step.rows);
            let next_column = column + i64::from(step.columns);
            let end = signed_cell(row, column);
            if !self.contains(next_row, next_column) {
                return ProbeResult {
                    can_move: true,
                    end,
                    hit_edge: true,
                };
            }
            if self.occupant(signed_cell(next_row, next_column)).is_some() {
                return ProbeResult {
                    can_move: moved,
                    end,
                    hit_edge: false,
                };
            }
            row = next_row;
            column = next_column;
            moved = true;
        }
    }

    /// First direction, starting at `facing` and rotating clockwise, in which
    /// an entity on `cell` could start moving.
    #[must_use]
    pub fn first_open_direction(
        &self,
        cell: CellCoord,
        facing: Direction,
        inversion: GridInversion,
    ) -> Option<Direction> {
        let mut direction = facing;
        for _ in 0..Direction::ALL.len() {
            if self.probe(cell, direction.grid_step(inversion)).can_move {
                return Some(direction);
            }
            direction = direction.clockwise();
        }
        None
    }

    /// Places `entities` onto `cells` minimising total squared displacement.
    ///
    /// Occupancy is rebuilt from scratch. Returns the pairs that were placed.
    pub fn assign_nearest<S>(
        &mut self,
        spatial: &mut S,
        entities: &[EntityId],
        cells: &[CellCoord],
    ) -> Result<Vec<(EntityId, CellCoord)>, CorralError>
    where
        S: Spatial + ?Sized,
    {
        let mut centers: Vec<(EntityId, Vec2)> = Vec::with_capacity(entities.len());
        for entity in entities {
            match spatial.visual_center(*entity) {
                Some(center) => centers.push((*entity, center)),
                None => warn!(entity = entity.get(), "skipping entity without a visual centre"),
            }
        }

        if centers.len() > cells.len() {
            match self.config.overflow {
                OverflowPolicy::Truncate => {
                    warn!(
                        requested = centers.len(),
                        capacity = cells.len(),
                        "more entities than cells, extra entities stay unplaced"
                    );
                    centers.truncate(cells.len());
                }
                OverflowPolicy::Reject => {
                    return Err(CorralError::CapacityExceeded {
                        requested: centers.len(),
                        capacity: cells.len(),
                    });
                }
            }
        }

        let cell_centers = cells
            .iter()
            .map(|cell| self.cell_to_world(*cell))
            .collect::<Result<Vec<_>, _>>()?;

        let costs: Vec<Vec<f64>> = centers
            .iter()
            .map(|(_, center)| {
                cell_centers
                    .iter()
                    .map(|cell_center| f64::from(center.distance_squared(*cell_center)))
                    .collect()
            })
            .collect();
        let assignment = assignment::solve(&costs);

        self.reset_occupancy();
        let mut placed = Vec::with_capacity(centers.len());
        for ((entity, _), column) in centers.iter().zip(assignment) {
            let Some(column) = column else {
                continue;
            };
            let cell = cells[column];
            self.place(spatial, *entity, cell)?;
            placed.push((*entity, cell));
        }
        Ok(placed)
    }

    /// Snaps `entities` onto their optimal cells across the whole board.
    pub fn layout_by_nearest<S>(
        &mut self,
        spatial: &mut S,
        entities: &[EntityId],
    ) -> Result<Vec<(EntityId, CellCoord)>, CorralError>
    where
        S: Spatial + ?Sized,
    {
        let cells: Vec<CellCoord> = self.cells().collect();
        self.assign_nearest(spatial, entities, &cells)
    }

    fn top_left(&self) -> Vec2 {
        self.config.center + Vec2::new(-self.grid_size.x * 0.5, self.grid_size.y * 0.5)
    }

    fn index(&self, cell: CellCoord) -> Option<usize> {
        if cell.row() < self.config.rows && cell.column() < self.config.columns {
            let row = usize::try_from(cell.row()).ok()?;
            let column = usize::try_from(cell.column()).ok()?;
            let width = usize::try_from(self.config.columns).ok()?;
            Some(row * width + column)
        } else {
            None
        }
    }

    fn out_of_bounds(&self, cell: CellCoord) -> CorralError {
        CorralError::OutOfBounds {
            row: i64::from(cell.row()),
            column: i64::from(cell.column()),
            rows: self.config.rows,
            columns: self.config.columns,
        }
    }
}

fn validate(config: &BoardConfig) -> Result<(), CorralError> {
    if config.rows == 0 || config.columns == 0 {
        return Err(CorralError::MissingConfiguration(format!(
            "board needs at least one row and column, got {}x{}",
            config.rows, config.columns
        )));
    }
    if !config.extent.is_finite() || config.extent.x <= 0.0 || config.extent.y <= 0.0 {
        return Err(CorralError::MissingConfiguration(
            "board extent must be positive and finite".to_owned(),
        ));
    }
    if !config.center.is_finite() || !config.inner_padding.is_finite() {
        return Err(CorralError::MissingConfiguration(
            "board centre and padding must be finite".to_owned(),
        ));
    }
    Ok(())
}

fn round_half_up(value: f32) -> i64 {
    if value.is_finite() {
        (value + 0.5).floor() as i64
    } else {
        0
    }
}

fn clamp_index(value: i64, count: u32) -> u32 {
    let max = i64::from(count.saturating_sub(1));
    u32::try_from(value.clamp(0, max)).unwrap_or(0)
}

// Callers only pass coordinates already checked with `contains`.
fn signed_cell(row: i64, column: i64) -> CellCoord {
    CellCoord::new(
        u32::try_from(row).unwrap_or(u32::MAX),
        u32::try_from(column).unwrap_or(u32::MAX),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EntitySpec, World};
    use proptest::prelude::*;

    fn board(rows: u32, columns: u32) -> Board {
        let extent = Vec2::new(columns as f32 * 10.0, rows as f32 * 10.0);
        Board::new(BoardConfig::new(rows, columns, extent, Vec2::ZERO)).expect("valid board")
    }

    #[test]
    fn rejects_empty_dimensions() {
        let error = Board::new(BoardConfig::new(0, 3, Vec2::splat(10.0), Vec2::ZERO))
            .expect_err("zero rows must be rejected");
        assert!(matches!(error, CorralError::MissingConfiguration(_)));
    }

    #[test]
    fn geometry_honours_padding_and_square_cells() {
        let mut config = BoardConfig::new(2, 4, Vec2::new(100.0, 60.0), Vec2::ZERO);
        config.inner_padding = 10.0;
        config.square_cells = true;
        let board = Board::new(config).expect("valid board");

        assert_eq!(board.cell_size(), Vec2::splat(20.0));
        assert_eq!(board.grid_size(), Vec2::new(80.0, 40.0));
    }

    #[test]
    fn cell_centres_run_left_to_right_and_top_to_bottom() {
        let board = board(3, 3);
        assert_eq!(
            board.cell_to_world(CellCoord::new(0, 0)).expect("in bounds"),
            Vec2::new(-10.0, 10.0)
        );
        assert_eq!(
            board.cell_to_world(CellCoord::new(2, 1)).expect("in bounds"),
            Vec2::new(0.0, -10.0)
        );
        assert!(matches!(
            board.cell_to_world(CellCoord::new(3, 0)),
            Err(CorralError::OutOfBounds { row: 3, .. })
        ));
    }

    #[test]
    fn world_to_cell_rounds_and_clamps() {
        let board = board(3, 3);
        assert_eq!(board.world_to_cell(Vec2::new(-10.0, 10.0)), CellCoord::new(0, 0));
        assert_eq!(board.world_to_cell(Vec2::new(4.9, -4.9)), CellCoord::new(1, 1));
        assert_eq!(board.world_to_cell(Vec2::new(5.0, 0.0)), CellCoord::new(1, 2));
        assert_eq!(board.world_to_cell(Vec2::new(500.0, 500.0)), CellCoord::new(0, 2));
        assert_eq!(board.world_to_cell(Vec2::new(-500.0, -500.0)), CellCoord::new(2, 0));
    }

    #[test]
    fn geometry_recompute_clears_occupancy() {
        let mut board = board(3, 3);
        board.occupy(CellCoord::new(1, 1), EntityId::new(1)).expect("in bounds");
        board.reconfigure(4, 4, Vec2::splat(40.0)).expect("valid shape");
        assert_eq!(board.locate(EntityId::new(1)), None);
        assert_eq!(board.cells().count(), 16);
    }

    #[test]
    fn probe_slides_to_the_edge() {
        let board = board(5, 5);
        let result = board.probe(CellCoord::new(2, 0), GridStep::new(0, 1));
        assert_eq!(
            result,
            ProbeResult {
                can_move: true,
                end: CellCoord::new(2, 4),
                hit_edge: true,
            }
        );
    }

    #[test]
    fn probe_flush_against_edge_can_move_without_displacement() {
        let board = board(5, 5);
        let result = board.probe(CellCoord::new(2, 4), GridStep::new(0, 1));
        assert!(result.can_move);
        assert!(result.hit_edge);
        assert_eq!(result.end, CellCoord::new(2, 4));
    }

    #[test]
    fn probe_stops_before_an_occupied_cell() {
        let mut board = board(5, 5);
        board.occupy(CellCoord::new(2, 3), EntityId::new(7)).expect("in bounds");

        let partial = board.probe(CellCoord::new(2, 0), GridStep::new(0, 1));
        assert_eq!(
            partial,
            ProbeResult {
                can_move: true,
                end: CellCoord::new(2, 2),
                hit_edge: false,
            }
        );

        let blocked = board.probe(CellCoord::new(2, 2), GridStep::new(0, 1));
        assert!(!blocked.can_move);
        assert!(!blocked.hit_edge);
        assert_eq!(blocked.end, CellCoord::new(2, 2));
    }

    #[test]
    fn zero_step_never_moves() {
        let board = board(2, 2);
        let result = board.probe(CellCoord::new(0, 0), GridStep::new(0, 0));
        assert!(!result.can_move);
        assert!(!result.hit_edge);
    }

    #[test]
    fn first_open_direction_rotates_clockwise() {
        let mut board = board(3, 3);
        board.occupy(CellCoord::new(0, 1), EntityId::new(1)).expect("in bounds");
        board.occupy(CellCoord::new(1, 2), EntityId::new(2)).expect("in bounds");
        let centre = CellCoord::new(1, 1);

        assert_eq!(
            board.first_open_direction(centre, Direction::Up, GridInversion::default()),
            Some(Direction::Down)
        );

        board.occupy(CellCoord::new(2, 1), EntityId::new(3)).expect("in bounds");
        board.occupy(CellCoord::new(1, 0), EntityId::new(4)).expect("in bounds");
        assert_eq!(
            board.first_open_direction(centre, Direction::Up, GridInversion::default()),
            None
        );
    }

    #[test]
    fn clear_ignores_foreign_entities() {
        let mut board = board(2, 2);
        let cell = CellCoord::new(1, 0);
        board.occupy(cell, EntityId::new(1)).expect("in bounds");
        assert!(!board.clear(cell, EntityId::new(2)));
        assert_eq!(board.occupant(cell), Some(EntityId::new(1)));
        assert!(board.clear(cell, EntityId::new(1)));
        assert_eq!(board.occupant(cell), None);
    }

    #[test]
    fn place_aligns_the_visual_centre() {
        let mut world = World::new();
        let spec = EntitySpec::at(Vec2::ZERO, Vec2::splat(4.0)).with_pivot(Vec2::new(0.0, 2.0));
        let entity = world.spawn(spec);
        let mut board = board(3, 3);

        board.place(&mut world, entity, CellCoord::new(0, 2)).expect("in bounds");

        assert_eq!(board.locate(entity), Some(CellCoord::new(0, 2)));
        assert_eq!(world.visual_center(entity), Some(Vec2::new(10.0, 10.0)));
    }

    #[test]
    fn layout_by_nearest_snaps_each_entity_to_its_closest_cell() {
        let mut world = World::new();
        let near_top_left = world.spawn(EntitySpec::at(Vec2::new(-8.0, 7.0), Vec2::splat(2.0)));
        let near_centre = world.spawn(EntitySpec::at(Vec2::new(1.0, -1.0), Vec2::splat(2.0)));
        let mut board = board(3, 3);

        let placed = board
            .layout_by_nearest(&mut world, &[near_top_left, near_centre])
            .expect("enough cells");

        assert_eq!(
            placed,
            vec![
                (near_top_left, CellCoord::new(0, 0)),
                (near_centre, CellCoord::new(1, 1)),
            ]
        );
        assert_eq!(world.position(near_centre), Some(Vec2::ZERO));
    }

    #[test]
    fn overflow_policy_truncates_or_rejects() {
        let mut world = World::new();
        let entities: Vec<EntityId> = (0..3)
            .map(|index| world.spawn(EntitySpec::at(Vec2::new(index as f32, 0.0), Vec2::ONE)))
            .collect();
        let cells = [CellCoord::new(0, 0), CellCoord::new(0, 1)];

        let mut truncating = board(2, 2);
        let placed = truncating
            .assign_nearest(&mut world, &entities, &cells)
            .expect("truncation succeeds");
        assert_eq!(placed.len(), 2);
        assert_eq!(truncating.locate(entities[2]), None);

        let mut config = BoardConfig::new(2, 2, Vec2::splat(20.0), Vec2::ZERO);
        config.overflow = OverflowPolicy::Reject;
        let mut rejecting = Board::new(config).expect("valid board");
        assert_eq!(
            rejecting.assign_nearest(&mut world, &entities, &cells),
            Err(CorralError::CapacityExceeded {
                requested: 3,
                capacity: 2,
            })
        );
    }

    #[derive(Clone, Debug)]
    enum OccupancyOp {
        Occupy(u32, u32, u32),
        Clear(u32, u32, u32),
    }

    fn occupancy_op() -> impl Strategy<Value = OccupancyOp> {
        prop_oneof![
            (0_u32..4, 0_u32..4, 0_u32..5).prop_map(|(r, c, e)| OccupancyOp::Occupy(r, c, e)),
            (0_u32..4, 0_u32..4, 0_u32..5).prop_map(|(r, c, e)| OccupancyOp::Clear(r, c, e)),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn each_entity_claims_at_most_one_cell(
            ops in proptest::collection::vec(occupancy_op(), 1..40),
        ) {
            let mut board = board(4, 4);
            for op in ops {
                match op {
                    OccupancyOp::Occupy(row, column, entity) => {
                        board
                            .occupy(CellCoord::new(row, column), EntityId::new(entity))
                            .expect("in bounds");
                    }
                    OccupancyOp::Clear(row, column, entity) => {
                        let _ = board.clear(CellCoord::new(row, column), EntityId::new(entity));
                    }
                }
            }
            for entity in 0..5 {
                let claimed = board
                    .cells()
                    .filter(|cell| board.occupant(*cell) == Some(EntityId::new(entity)))
                    .count();
                prop_assert!(claimed <= 1);
            }
        }

        #[test]
        fn probes_end_on_the_board_and_respect_edge_precedence(
            row in 0_u32..5,
            column in 0_u32..5,
            direction in 0_usize..4,
            blockers in proptest::collection::vec((0_u32..5, 0_u32..5), 0..6),
        ) {
            let mut board = board(5, 5);
            for (index, (r, c)) in blockers.iter().enumerate() {
                board
                    .occupy(CellCoord::new(*r, *c), EntityId::new(index as u32 + 1))
                    .expect("in bounds");
            }
            let start = CellCoord::new(row, column);
            let step = Direction::ALL[direction].grid_step(GridInversion::default());
            let result = board.probe(start, step);

            prop_assert!(result.end.row() < 5 && result.end.column() < 5);
            if result.hit_edge {
                prop_assert!(result.can_move);
                let beyond_row = i64::from(result.end.row()) + i64::from(step.rows);
                let beyond_column = i64::from(result.end.column()) + i64::from(step.columns);
                prop_assert!(!board.contains(beyond_row, beyond_column));
            } else {
                prop_assert_eq!(result.can_move, result.end != start);
            }
        }
    }
}
