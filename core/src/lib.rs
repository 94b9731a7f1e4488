#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the NPC chase engine.
//!
//! This crate defines the grid vocabulary ([`Cell`], [`Direction`],
//! [`GridBounds`]), the capabilities a host engine exposes to the chase
//! systems ([`PassabilityMap`], [`ChaseHost`]), the per-entity chase
//! configuration, and the message surface of the reference world. Adapters
//! submit [`Command`] values, the world executes them via its `apply` entry
//! point and broadcasts [`Event`] values describing what happened.

use std::{collections::VecDeque, fmt};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Location of a single grid cell expressed as `x` (column) and `y` (row).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    x: u32,
    y: u32,
}

impl Cell {
    /// Creates a new grid cell coordinate.
    #[must_use]
    pub const fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }

    /// Zero-based column index of the cell.
    #[must_use]
    pub const fn x(&self) -> u32 {
        self.x
    }

    /// Zero-based row index of the cell.
    #[must_use]
    pub const fn y(&self) -> u32 {
        self.y
    }

    /// Computes the Manhattan distance between two cells.
    #[must_use]
    pub fn manhattan_distance(self, other: Cell) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// Neighbouring cell reached by moving one step in `direction`.
    ///
    /// Returns `None` when the neighbour falls outside `bounds`.
    #[must_use]
    pub fn step(self, direction: Direction, bounds: GridBounds) -> Option<Cell> {
        let (dx, dy) = direction.offset();
        let x = self.x.checked_add_signed(dx)?;
        let y = self.y.checked_add_signed(dy)?;
        let next = Cell::new(x, y);
        bounds.contains(next).then_some(next)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Cardinal movement directions. Diagonal movement is never produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Movement toward decreasing row indices.
    Up,
    /// Movement toward increasing column indices.
    Right,
    /// Movement toward increasing row indices.
    Down,
    /// Movement toward decreasing column indices.
    Left,
}

impl Direction {
    /// Every direction in the canonical expansion order used by path searches.
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Right,
        Direction::Down,
        Direction::Left,
    ];

    /// Unit offset `(dx, dy)` applied when stepping in this direction.
    #[must_use]
    pub const fn offset(self) -> (i32, i32) {
        match self {
            Self::Up => (0, -1),
            Self::Right => (1, 0),
            Self::Down => (0, 1),
            Self::Left => (-1, 0),
        }
    }

    /// Direction pointing the opposite way.
    #[must_use]
    pub const fn opposite(self) -> Direction {
        match self {
            Self::Up => Self::Down,
            Self::Right => Self::Left,
            Self::Down => Self::Up,
            Self::Left => Self::Right,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Up => "up",
            Self::Right => "right",
            Self::Down => "down",
            Self::Left => "left",
        };
        f.write_str(label)
    }
}

/// Dimensions of the tile grid; valid cells lie in `[0, width) × [0, height)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridBounds {
    width: u32,
    height: u32,
}

impl GridBounds {
    /// Creates a new bounds descriptor.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of columns in the grid.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Number of rows in the grid.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Reports whether the cell lies inside the grid.
    #[must_use]
    pub const fn contains(&self, cell: Cell) -> bool {
        cell.x < self.width && cell.y < self.height
    }

    /// Total number of cells covered by the grid.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        let width = usize::try_from(self.width).unwrap_or(0);
        let height = usize::try_from(self.height).unwrap_or(0);
        width.saturating_mul(height)
    }

    /// Row-major dense index of the cell, if it lies inside the grid.
    #[must_use]
    pub fn index(&self, cell: Cell) -> Option<usize> {
        if !self.contains(cell) {
            return None;
        }
        let width = usize::try_from(self.width).ok()?;
        let column = usize::try_from(cell.x).ok()?;
        let row = usize::try_from(cell.y).ok()?;
        row.checked_mul(width)?.checked_add(column)
    }

    /// Validates that `cell` lies inside the grid, naming its `role` on failure.
    pub fn check(&self, cell: Cell, role: CellRole) -> Result<(), ChaseError> {
        if self.contains(cell) {
            Ok(())
        } else {
            Err(ChaseError::OutOfBounds {
                role,
                cell,
                bounds: *self,
            })
        }
    }
}

impl fmt::Display for GridBounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Unique identifier assigned to an NPC by the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NpcId(u32);

impl NpcId {
    /// Creates a new NPC identifier with the provided numeric value.
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

/// Ordered sequence of cardinal steps, front-to-back in traversal order.
///
/// An empty path means the walker already stands on its goal. Unreachable
/// goals are reported as [`ChaseError::Unreachable`] instead of a path.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Path {
    steps: VecDeque<Direction>,
}

impl Path {
    /// Creates an empty path.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of steps remaining.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Reports whether no steps remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Next step to take, without consuming it.
    #[must_use]
    pub fn front(&self) -> Option<Direction> {
        self.steps.front().copied()
    }

    /// Removes and returns the next step.
    pub fn pop_front(&mut self) -> Option<Direction> {
        self.steps.pop_front()
    }

    /// Iterator over the remaining steps in traversal order.
    pub fn iter(&self) -> impl Iterator<Item = Direction> + '_ {
        self.steps.iter().copied()
    }

    /// Cell reached by walking every step from `start`.
    ///
    /// Returns `None` if any intermediate step leaves `bounds`.
    #[must_use]
    pub fn walk(&self, start: Cell, bounds: GridBounds) -> Option<Cell> {
        self.iter()
            .try_fold(start, |cell, direction| cell.step(direction, bounds))
    }
}

impl FromIterator<Direction> for Path {
    fn from_iter<I: IntoIterator<Item = Direction>>(iter: I) -> Self {
        Self {
            steps: iter.into_iter().collect(),
        }
    }
}

/// Behaviour applied when the target leaves the engagement range mid-chase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnRangeExit {
    /// Stop chasing and walk back home.
    #[default]
    Disengage,
    /// Keep chasing regardless of distance once triggered.
    KeepChasing,
}

/// Condition that ends a chase outright.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopCondition {
    /// Only the range rule (see [`OnRangeExit`]) or an explicit stop ends the chase.
    #[default]
    RangeExit,
    /// Reaching the target's cell ends the chase and disarms the controller.
    Contact,
    /// Like [`StopCondition::Contact`], but standing on the cell the target
    /// faces also counts.
    FacedContact,
    /// Only an explicit stop command ends the chase.
    ExplicitCommand,
}

/// How often a chasing entity recomputes its path toward the target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Repath {
    /// Recompute before every step the entity takes.
    #[default]
    EveryStep,
    /// Reuse the stored path until it runs out, becomes blocked, or the target moves.
    OnTargetMove,
}

/// Per-entity chase configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ChaseConfig {
    /// Manhattan tile distance within which the chase engages.
    pub range: u32,
    /// Behaviour when the target leaves `range` during a chase.
    pub on_range_exit: OnRangeExit,
    /// Additional condition that ends a chase.
    pub stop_condition: StopCondition,
    /// Path recomputation cadence while chasing.
    pub repath: Repath,
}

impl Default for ChaseConfig {
    fn default() -> Self {
        Self {
            range: 5,
            on_range_exit: OnRangeExit::default(),
            stop_condition: StopCondition::default(),
            repath: Repath::default(),
        }
    }
}

/// Names the coordinate that failed a bounds check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellRole {
    /// Start cell of a path search.
    Start,
    /// Goal cell of a path search.
    Goal,
    /// Home cell of a chasing entity.
    Home,
    /// Position of the tracked target.
    Target,
    /// Position of the chasing entity itself.
    Entity,
}

impl fmt::Display for CellRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Start => "start",
            Self::Goal => "goal",
            Self::Home => "home",
            Self::Target => "target",
            Self::Entity => "entity",
        };
        f.write_str(label)
    }
}

/// Failures surfaced by path searches and chase ticks.
///
/// None of these abort the host tick loop: `Unreachable` and `MoveRefused`
/// degrade to "no movement this tick", `OutOfBounds` is returned to the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Error, Serialize, Deserialize)]
pub enum ChaseError {
    /// No walkable path connects the two cells.
    #[error("no walkable path from {start} to {goal}")]
    Unreachable {
        /// Cell the search started from.
        start: Cell,
        /// Cell the search tried to reach.
        goal: Cell,
    },
    /// A coordinate supplied by the caller lies outside the grid.
    #[error("{role} cell {cell} lies outside the {bounds} grid")]
    OutOfBounds {
        /// Which coordinate was rejected.
        role: CellRole,
        /// The rejected coordinate.
        cell: Cell,
        /// Grid bounds in effect.
        bounds: GridBounds,
    },
    /// The host declined a step the controller believed legal.
    #[error("host refused the {direction} step from {from}")]
    MoveRefused {
        /// Cell the entity tried to leave.
        from: Cell,
        /// Direction of the refused step.
        direction: Direction,
    },
}

/// Read-only passability oracle provided by the host.
pub trait PassabilityMap {
    /// Grid dimensions.
    fn bounds(&self) -> GridBounds;

    /// Reports whether leaving `cell` in `direction` is currently legal.
    ///
    /// Only queried for in-bounds source cells.
    fn is_passable(&self, cell: Cell, direction: Direction) -> bool;
}

impl<T: PassabilityMap + ?Sized> PassabilityMap for &T {
    fn bounds(&self) -> GridBounds {
        (**self).bounds()
    }

    fn is_passable(&self, cell: Cell, direction: Direction) -> bool {
        (**self).is_passable(cell, direction)
    }
}

/// Adapts a bounds value and a closure into a [`PassabilityMap`].
#[derive(Clone, Copy, Debug)]
pub struct PassabilityFn<F> {
    bounds: GridBounds,
    oracle: F,
}

impl<F> PassabilityFn<F>
where
    F: Fn(Cell, Direction) -> bool,
{
    /// Wraps `oracle` so it answers passability queries within `bounds`.
    #[must_use]
    pub const fn new(bounds: GridBounds, oracle: F) -> Self {
        Self { bounds, oracle }
    }
}

impl<F> PassabilityMap for PassabilityFn<F>
where
    F: Fn(Cell, Direction) -> bool,
{
    fn bounds(&self) -> GridBounds {
        self.bounds
    }

    fn is_passable(&self, cell: Cell, direction: Direction) -> bool {
        (self.oracle)(cell, direction)
    }
}

/// Capabilities a chasing entity needs from its host engine.
///
/// The host's tick loop hands an implementation of this trait to the chase
/// controller once per tick for each entity.
pub trait ChaseHost: PassabilityMap {
    /// Current cell of the chasing entity.
    fn entity_position(&self) -> Cell;

    /// Reports whether the entity is still animating its previous step.
    fn is_moving(&self) -> bool;

    /// Attempts one step in `direction`, returning whether the host accepted it.
    fn move_one_step(&mut self, direction: Direction) -> bool;

    /// Current cell of the tracked target.
    fn target_position(&self) -> Cell;

    /// Direction the tracked target is facing.
    fn target_facing(&self) -> Direction;
}

/// Blocked edge between a cell and its neighbour in `direction`.
///
/// Fences block traversal both ways.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fence {
    /// Cell on one side of the fence.
    pub cell: Cell,
    /// Side of `cell` the fence runs along.
    pub direction: Direction,
}

/// Chase phase of an entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChasePhase {
    /// Not engaged, standing still.
    #[default]
    Idle,
    /// Engaged, following or refreshing a path to the target.
    Chasing,
    /// Disengaged, stepping back toward home.
    Returning,
}

/// Why a tick produced no movement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StallReason {
    /// No walkable path to the target exists right now.
    Unreachable,
    /// The host declined the planned step; the stored path was discarded.
    MoveRefused,
    /// Every cardinal direction is blocked.
    Boxed,
}

/// Why a chase ended outright.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The entity touched the target.
    Contact,
    /// An explicit stop command was issued.
    Command,
}

/// Reasons an NPC spawn request may be rejected by the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpawnError {
    /// The requested cell lies outside the map.
    OutOfBounds,
    /// The requested cell is a wall.
    Wall,
    /// The requested cell is already occupied.
    Occupied,
}

/// Commands that express all permissible world mutations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Replaces the map terrain and clears every NPC.
    ConfigureMap {
        /// Number of columns.
        width: u32,
        /// Number of rows.
        height: u32,
        /// Impassable cells.
        walls: Vec<Cell>,
        /// Blocked edges between neighbouring cells.
        fences: Vec<Fence>,
        /// Global seed from which per-NPC random streams are derived.
        seed: u64,
    },
    /// Transfers the player to a cell, resetting every NPC's engagement.
    PlacePlayer {
        /// Destination cell.
        cell: Cell,
        /// Facing after the transfer.
        facing: Direction,
    },
    /// Turns the player toward `direction` and steps if the way is clear.
    MovePlayer {
        /// Direction of the attempted step.
        direction: Direction,
    },
    /// Creates an NPC whose home is the spawn cell.
    SpawnNpc {
        /// Spawn and home cell.
        cell: Cell,
        /// Chase configuration attached to the NPC.
        config: ChaseConfig,
        /// Ticks each step takes to animate; at least one.
        step_ticks: u32,
    },
    /// Arms an NPC's chase behaviour with the provided range.
    BeginChase {
        /// NPC to arm.
        npc: NpcId,
        /// Engagement range in tiles.
        range: u32,
    },
    /// Moves an NPC to a cell, keeping its home and resetting its engagement.
    PlaceNpc {
        /// NPC to move.
        npc: NpcId,
        /// Destination cell.
        cell: Cell,
    },
    /// Disarms an NPC's chase behaviour; it walks home if away.
    StopChase {
        /// NPC to disarm.
        npc: NpcId,
    },
    /// Arms or disarms every NPC at once, resetting engagement.
    SetAllChasesActive {
        /// Whether chase behaviour should be active.
        active: bool,
    },
    /// Advances the simulation by one discrete tick.
    Tick,
}

/// Events broadcast by the world after processing commands.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    /// Confirms that the map terrain was replaced.
    MapConfigured {
        /// Dimensions of the new map.
        bounds: GridBounds,
    },
    /// Confirms that the player was transferred.
    PlayerPlaced {
        /// Cell the player now occupies.
        cell: Cell,
        /// Direction the player now faces.
        facing: Direction,
    },
    /// Reports that a transfer request named an invalid cell.
    PlayerPlacementRejected {
        /// Rejected destination.
        cell: Cell,
    },
    /// Confirms that the player stepped between two cells.
    PlayerMoved {
        /// Cell the player left.
        from: Cell,
        /// Cell the player entered.
        to: Cell,
    },
    /// Reports that the player turned but could not step.
    PlayerBlocked {
        /// Cell the player remains on.
        cell: Cell,
        /// Direction the player now faces.
        facing: Direction,
    },
    /// Confirms that an NPC was created.
    NpcSpawned {
        /// Identifier assigned to the NPC.
        npc: NpcId,
        /// Spawn and home cell.
        cell: Cell,
    },
    /// Reports that an NPC spawn request was rejected.
    SpawnRejected {
        /// Requested spawn cell.
        cell: Cell,
        /// Specific reason the spawn failed.
        reason: SpawnError,
    },
    /// Confirms that an NPC was moved by command.
    NpcPlaced {
        /// NPC that moved.
        npc: NpcId,
        /// Cell the NPC now occupies.
        cell: Cell,
    },
    /// Reports that an NPC placement request was rejected.
    NpcPlacementRejected {
        /// NPC that stays put.
        npc: NpcId,
        /// Requested destination.
        cell: Cell,
        /// Specific reason the placement failed.
        reason: SpawnError,
    },
    /// Reports that an NPC started chasing the player.
    ChaseEngaged {
        /// NPC that engaged.
        npc: NpcId,
    },
    /// Reports that an NPC gave up the chase and heads home.
    ChaseDisengaged {
        /// NPC that disengaged.
        npc: NpcId,
    },
    /// Reports that an NPC's chase ended outright.
    ChaseStopped {
        /// NPC whose chase ended.
        npc: NpcId,
        /// Why the chase ended.
        reason: StopReason,
    },
    /// Confirms that an NPC stepped between two cells.
    NpcAdvanced {
        /// NPC that moved.
        npc: NpcId,
        /// Cell the NPC left.
        from: Cell,
        /// Cell the NPC entered.
        to: Cell,
    },
    /// Reports that an NPC wanted to move but could not this tick.
    NpcStalled {
        /// NPC that stalled.
        npc: NpcId,
        /// Why no step was taken.
        reason: StallReason,
    },
    /// Reports that a returning NPC reached its home cell.
    ReturnedHome {
        /// NPC that arrived.
        npc: NpcId,
        /// Home cell.
        home: Cell,
    },
    /// Reports a precondition violation raised during an NPC's tick.
    ChaseFault {
        /// NPC whose tick failed.
        npc: NpcId,
        /// Violation raised by the controller.
        error: ChaseError,
    },
    /// Indicates that the simulation advanced by one tick.
    TimeAdvanced {
        /// Index of the tick that completed.
        tick: u64,
    },
}
