#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative reference host for the NPC chase engine.
//!
//! The world owns a tile map with walls and fenced edges, a single player,
//! and any number of NPCs. Adapters mutate it exclusively through [`apply`]
//! and observe it through the [`query`] module. Each [`Command::Tick`] first
//! advances every NPC's step animation and then hands each NPC, in id order,
//! to the chase controller through a host adapter.

use std::collections::HashSet;

use npc_chase_core::{
    Cell, ChaseError, ChaseHost, Command, Direction, Event, Fence, GridBounds, NpcId,
    PassabilityMap, SpawnError, StopReason,
};
use npc_chase_system_chase::{ChaseController, ChaseState, TickAction, TickReport, Transition};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use sha2::{Digest, Sha256};

const DEFAULT_WIDTH: u32 = 10;
const DEFAULT_HEIGHT: u32 = 10;
const DEFAULT_SEED: u64 = 0x6e70_635f_6368_6173;
const NPC_STREAM_LABEL: &str = "npc-return-step";

/// Represents the authoritative world state.
#[derive(Debug)]
pub struct World {
    map: TileMap,
    player: Player,
    npcs: Vec<Npc>,
    next_npc_id: u32,
    seed: u64,
    tick_index: u64,
    controller: ChaseController,
}

impl World {
    /// Creates an open 10x10 world with the player in the top-left corner.
    #[must_use]
    pub fn new() -> Self {
        Self::with_controller(ChaseController::new())
    }

    /// Creates a world whose NPC path searches stop after `max_expansions` nodes.
    #[must_use]
    pub fn with_search_budget(max_expansions: usize) -> Self {
        Self::with_controller(ChaseController::new().with_search_budget(max_expansions))
    }

    fn with_controller(controller: ChaseController) -> Self {
        Self {
            map: TileMap::open(GridBounds::new(DEFAULT_WIDTH, DEFAULT_HEIGHT)),
            player: Player {
                cell: Cell::new(0, 0),
                facing: Direction::Down,
            },
            npcs: Vec::new(),
            next_npc_id: 0,
            seed: DEFAULT_SEED,
            tick_index: 0,
            controller,
        }
    }

    fn npc_mut(&mut self, id: NpcId) -> Option<&mut Npc> {
        self.npcs.iter_mut().find(|npc| npc.id == id)
    }

    fn npc_at(&self, cell: Cell) -> Option<NpcId> {
        self.npcs
            .iter()
            .find(|npc| npc.body.cell == cell)
            .map(|npc| npc.id)
    }

    /// Replaces the terrain. Returns `true` when the player had to be moved
    /// off a wall.
    fn configure_map(
        &mut self,
        bounds: GridBounds,
        walls: &[Cell],
        fences: &[Fence],
        seed: u64,
    ) -> bool {
        self.map = TileMap::open(bounds);
        for wall in walls {
            if !self.map.raise_wall(*wall) {
                tracing::warn!(cell = %wall, %bounds, "ignoring wall outside the map");
            }
        }
        for fence in fences {
            if !self.map.raise_fence(*fence) {
                tracing::warn!(
                    cell = %fence.cell,
                    direction = %fence.direction,
                    "ignoring fence without a neighbour"
                );
            }
        }

        self.npcs.clear();
        self.next_npc_id = 0;
        self.seed = seed;
        self.player.cell = Cell::new(
            self.player.cell.x().min(bounds.width().saturating_sub(1)),
            self.player.cell.y().min(bounds.height().saturating_sub(1)),
        );
        if !self.map.is_wall(self.player.cell) {
            return false;
        }
        match self.map.first_floor() {
            Some(floor) => {
                tracing::debug!(
                    from = %self.player.cell,
                    to = %floor,
                    "player moved off a wall"
                );
                self.player.cell = floor;
                true
            }
            None => {
                tracing::warn!(%bounds, "map has no floor for the player");
                false
            }
        }
    }

    fn spawn_npc(&mut self, cell: Cell, state: ChaseState, step_ticks: u32) -> NpcId {
        let id = NpcId::new(self.next_npc_id);
        self.next_npc_id = self.next_npc_id.saturating_add(1);
        self.npcs.push(Npc {
            id,
            body: NpcBody {
                cell,
                step_ticks: step_ticks.max(1),
                cooldown: 0,
            },
            state,
            rng: ChaCha8Rng::seed_from_u64(derive_npc_seed(self.seed, id)),
        });
        id
    }

    /// Why `cell` cannot hold an NPC. `mover` is ignored as an occupant.
    fn placement_rejection(&self, cell: Cell, mover: Option<NpcId>) -> Option<SpawnError> {
        let blocked_by_npc = self.npc_at(cell).is_some_and(|npc| Some(npc) != mover);
        if !self.map.bounds.contains(cell) {
            Some(SpawnError::OutOfBounds)
        } else if self.map.is_wall(cell) {
            Some(SpawnError::Wall)
        } else if self.player.cell == cell || blocked_by_npc {
            Some(SpawnError::Occupied)
        } else {
            None
        }
    }

    fn advance_step_animations(&mut self) {
        for npc in &mut self.npcs {
            npc.body.cooldown = npc.body.cooldown.saturating_sub(1);
        }
    }

    fn run_chase_controllers(&mut self, out_events: &mut Vec<Event>) {
        let controller = self.controller;
        for index in 0..self.npcs.len() {
            let (before, rest) = self.npcs.split_at_mut(index);
            let Some((npc, after)) = rest.split_first_mut() else {
                continue;
            };
            let Npc {
                id,
                body,
                state,
                rng,
            } = npc;

            let mut host = NpcHost {
                map: &self.map,
                player: &self.player,
                body,
                neighbours: [&*before, &*after],
            };
            let outcome = controller.on_tick(state, &mut host, rng);
            publish_tick_outcome(*id, state.home(), outcome, out_events);
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies the provided command to the world, mutating state deterministically.
pub fn apply(world: &mut World, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::ConfigureMap {
            width,
            height,
            walls,
            fences,
            seed,
        } => {
            let bounds = GridBounds::new(width, height);
            let relocated = world.configure_map(bounds, &walls, &fences, seed);
            out_events.push(Event::MapConfigured { bounds });
            if relocated {
                out_events.push(Event::PlayerPlaced {
                    cell: world.player.cell,
                    facing: world.player.facing,
                });
            }
        }
        Command::PlacePlayer { cell, facing } => {
            if !world.map.bounds.contains(cell) || world.map.is_wall(cell) {
                out_events.push(Event::PlayerPlacementRejected { cell });
                return;
            }

            world.player = Player { cell, facing };
            for npc in &mut world.npcs {
                npc.state.reset_engagement();
            }
            out_events.push(Event::PlayerPlaced { cell, facing });
        }
        Command::MovePlayer { direction } => {
            world.player.facing = direction;
            let from = world.player.cell;
            match world
                .map
                .step(from, direction)
                .filter(|next| world.npc_at(*next).is_none())
            {
                Some(to) => {
                    world.player.cell = to;
                    out_events.push(Event::PlayerMoved { from, to });
                }
                None => out_events.push(Event::PlayerBlocked {
                    cell: from,
                    facing: direction,
                }),
            }
        }
        Command::SpawnNpc {
            cell,
            config,
            step_ticks,
        } => {
            if let Some(reason) = world.placement_rejection(cell, None) {
                out_events.push(Event::SpawnRejected { cell, reason });
                return;
            }

            match ChaseState::new(cell, config, world.map.bounds) {
                Ok(state) => {
                    let npc = world.spawn_npc(cell, state, step_ticks);
                    tracing::debug!(npc = npc.get(), %cell, "npc spawned");
                    out_events.push(Event::NpcSpawned { npc, cell });
                }
                Err(_) => out_events.push(Event::SpawnRejected {
                    cell,
                    reason: SpawnError::OutOfBounds,
                }),
            }
        }
        Command::PlaceNpc { npc, cell } => {
            if world.npc_mut(npc).is_none() {
                tracing::warn!(npc = npc.get(), "place for unknown npc");
                return;
            }
            if let Some(reason) = world.placement_rejection(cell, Some(npc)) {
                out_events.push(Event::NpcPlacementRejected { npc, cell, reason });
                return;
            }
            if let Some(target) = world.npc_mut(npc) {
                target.body.cell = cell;
                target.body.cooldown = 0;
                target.state.reset_engagement();
                out_events.push(Event::NpcPlaced { npc, cell });
            }
        }
        Command::BeginChase { npc, range } => match world.npc_mut(npc) {
            Some(target) => target.state.begin_chase(range),
            None => tracing::warn!(npc = npc.get(), "begin chase for unknown npc"),
        },
        Command::StopChase { npc } => match world.npc_mut(npc) {
            Some(target) => {
                let was_engaged = target.state.is_engaged();
                target.state.stop_chase();
                if was_engaged {
                    out_events.push(Event::ChaseStopped {
                        npc,
                        reason: StopReason::Command,
                    });
                }
            }
            None => tracing::warn!(npc = npc.get(), "stop chase for unknown npc"),
        },
        Command::SetAllChasesActive { active } => {
            for npc in &mut world.npcs {
                if active {
                    npc.state.reset_engagement();
                    let range = npc.state.range();
                    npc.state.begin_chase(range);
                } else {
                    let was_engaged = npc.state.is_engaged();
                    npc.state.stop_chase();
                    if was_engaged {
                        out_events.push(Event::ChaseStopped {
                            npc: npc.id,
                            reason: StopReason::Command,
                        });
                    }
                }
            }
        }
        Command::Tick => {
            world.tick_index = world.tick_index.saturating_add(1);
            out_events.push(Event::TimeAdvanced {
                tick: world.tick_index,
            });
            world.advance_step_animations();
            world.run_chase_controllers(out_events);
        }
    }
}

fn publish_tick_outcome(
    npc: NpcId,
    home: Cell,
    outcome: Result<TickReport, ChaseError>,
    out_events: &mut Vec<Event>,
) {
    let report = match outcome {
        Ok(report) => report,
        Err(error) => {
            tracing::warn!(npc = npc.get(), %error, "chase tick rejected");
            out_events.push(Event::ChaseFault { npc, error });
            return;
        }
    };

    // Engagement changes precede the step; stops and arrivals follow it.
    let (leading, trailing): (Vec<Transition>, Vec<Transition>) =
        report.transitions.into_iter().partition(|transition| {
            matches!(transition, Transition::Engaged | Transition::Disengaged)
        });

    out_events.extend(
        leading
            .into_iter()
            .map(|transition| transition_event(npc, home, transition)),
    );
    match report.action {
        TickAction::Busy | TickAction::Idle => {}
        TickAction::Stepped { from, to, .. } => {
            out_events.push(Event::NpcAdvanced { npc, from, to });
        }
        TickAction::Stalled(reason) => out_events.push(Event::NpcStalled { npc, reason }),
    }
    out_events.extend(
        trailing
            .into_iter()
            .map(|transition| transition_event(npc, home, transition)),
    );
}

fn transition_event(npc: NpcId, home: Cell, transition: Transition) -> Event {
    match transition {
        Transition::Engaged => Event::ChaseEngaged { npc },
        Transition::Disengaged => Event::ChaseDisengaged { npc },
        Transition::Stopped(reason) => Event::ChaseStopped { npc, reason },
        Transition::ArrivedHome => Event::ReturnedHome { npc, home },
    }
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use npc_chase_core::{Cell, ChaseConfig, ChasePhase, Direction, GridBounds, NpcId};

    use super::{Npc, World};

    /// Dimensions of the current map.
    #[must_use]
    pub fn bounds(world: &World) -> GridBounds {
        world.map.bounds
    }

    /// Number of ticks processed so far.
    #[must_use]
    pub fn tick(world: &World) -> u64 {
        world.tick_index
    }

    /// Captures the player's position and facing.
    #[must_use]
    pub fn player(world: &World) -> PlayerSnapshot {
        PlayerSnapshot {
            cell: world.player.cell,
            facing: world.player.facing,
        }
    }

    /// Captures every NPC ordered by identifier.
    #[must_use]
    pub fn npcs(world: &World) -> Vec<NpcSnapshot> {
        let mut snapshots: Vec<NpcSnapshot> = world.npcs.iter().map(snapshot).collect();
        snapshots.sort_by_key(|snapshot| snapshot.id);
        snapshots
    }

    /// Captures a single NPC, if it exists.
    #[must_use]
    pub fn npc(world: &World, id: NpcId) -> Option<NpcSnapshot> {
        world
            .npcs
            .iter()
            .find(|npc| npc.id == id)
            .map(snapshot)
    }

    /// Reports whether `cell` is a wall. Cells outside the map are not walls.
    #[must_use]
    pub fn is_wall(world: &World, cell: Cell) -> bool {
        world.map.is_wall(cell)
    }

    /// Reports whether the edge leaving `cell` toward `direction` is fenced.
    #[must_use]
    pub fn is_fenced(world: &World, cell: Cell, direction: Direction) -> bool {
        world.map.is_fenced(cell, direction)
    }

    /// Renders the map as text rows.
    ///
    /// `#` wall, `.` floor, `P` player, and NPCs by phase: `n` idle,
    /// `C` chasing, `R` returning. An NPC sharing the player's cell is `X`.
    #[must_use]
    pub fn render_ascii(world: &World) -> String {
        let bounds = world.map.bounds;
        let mut rows = Vec::with_capacity(bounds.height() as usize);
        for y in 0..bounds.height() {
            let row: String = (0..bounds.width())
                .map(|x| glyph(world, Cell::new(x, y)))
                .collect();
            rows.push(row);
        }
        rows.join("\n")
    }

    fn glyph(world: &World, cell: Cell) -> char {
        let npc = world.npcs.iter().find(|npc| npc.body.cell == cell);
        match (npc, world.player.cell == cell) {
            (Some(_), true) => 'X',
            (None, true) => 'P',
            (Some(npc), false) => match npc.state.phase() {
                ChasePhase::Idle => 'n',
                ChasePhase::Chasing => 'C',
                ChasePhase::Returning => 'R',
            },
            (None, false) if world.map.is_wall(cell) => '#',
            (None, false) => '.',
        }
    }

    /// Read-only view of the player.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct PlayerSnapshot {
        /// Cell the player occupies.
        pub cell: Cell,
        /// Direction the player faces.
        pub facing: Direction,
    }

    /// Read-only view of a single NPC.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct NpcSnapshot {
        /// Unique identifier assigned to the NPC.
        pub id: NpcId,
        /// Cell the NPC occupies.
        pub cell: Cell,
        /// Spawn cell the NPC returns to.
        pub home: Cell,
        /// Current chase phase.
        pub phase: ChasePhase,
        /// Whether chase behaviour may engage.
        pub armed: bool,
        /// Whether the previous step is still animating.
        pub moving: bool,
        /// Remaining steps of the stored chase path, if any.
        pub path_len: Option<usize>,
        /// Chase configuration, including the current range.
        pub config: ChaseConfig,
    }

    fn snapshot(npc: &Npc) -> NpcSnapshot {
        NpcSnapshot {
            id: npc.id,
            cell: npc.body.cell,
            home: npc.state.home(),
            phase: npc.state.phase(),
            armed: npc.state.is_armed(),
            moving: npc.body.cooldown > 0,
            path_len: npc.state.path().map(|path| path.len()),
            config: *npc.state.config(),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Player {
    cell: Cell,
    facing: Direction,
}

#[derive(Debug)]
struct Npc {
    id: NpcId,
    body: NpcBody,
    state: ChaseState,
    rng: ChaCha8Rng,
}

#[derive(Clone, Copy, Debug)]
struct NpcBody {
    cell: Cell,
    step_ticks: u32,
    cooldown: u32,
}

/// Terrain: walls on cells, fences on edges.
#[derive(Clone, Debug)]
struct TileMap {
    bounds: GridBounds,
    walls: Vec<bool>,
    fences: HashSet<(Cell, Direction)>,
}

impl TileMap {
    fn open(bounds: GridBounds) -> Self {
        Self {
            bounds,
            walls: vec![false; bounds.cell_count()],
            fences: HashSet::new(),
        }
    }

    fn raise_wall(&mut self, cell: Cell) -> bool {
        match self.bounds.index(cell).and_then(|i| self.walls.get_mut(i)) {
            Some(slot) => {
                *slot = true;
                true
            }
            None => false,
        }
    }

    fn raise_fence(&mut self, fence: Fence) -> bool {
        if !self.bounds.contains(fence.cell) {
            return false;
        }
        let Some(neighbour) = fence.cell.step(fence.direction, self.bounds) else {
            return false;
        };
        let _ = self.fences.insert((fence.cell, fence.direction));
        let _ = self.fences.insert((neighbour, fence.direction.opposite()));
        true
    }

    fn is_wall(&self, cell: Cell) -> bool {
        self.bounds
            .index(cell)
            .and_then(|i| self.walls.get(i).copied())
            .unwrap_or(false)
    }

    fn is_fenced(&self, cell: Cell, direction: Direction) -> bool {
        self.fences.contains(&(cell, direction))
    }

    /// First non-wall cell in row-major order.
    fn first_floor(&self) -> Option<Cell> {
        let width = self.bounds.width();
        (0..self.bounds.height())
            .flat_map(|y| (0..width).map(move |x| Cell::new(x, y)))
            .find(|cell| !self.is_wall(*cell))
    }

    /// Destination of a step that terrain allows, ignoring occupants.
    fn step(&self, cell: Cell, direction: Direction) -> Option<Cell> {
        let next = cell.step(direction, self.bounds)?;
        if self.is_wall(next) || self.is_fenced(cell, direction) {
            return None;
        }
        Some(next)
    }
}

/// One NPC's view of the world during its chase tick.
struct NpcHost<'a> {
    map: &'a TileMap,
    player: &'a Player,
    body: &'a mut NpcBody,
    neighbours: [&'a [Npc]; 2],
}

impl NpcHost<'_> {
    fn occupied_by_other(&self, cell: Cell) -> bool {
        self.neighbours
            .iter()
            .flat_map(|group| group.iter())
            .any(|npc| npc.body.cell == cell)
    }
}

impl PassabilityMap for NpcHost<'_> {
    fn bounds(&self) -> GridBounds {
        self.map.bounds
    }

    fn is_passable(&self, cell: Cell, direction: Direction) -> bool {
        self.map
            .step(cell, direction)
            .is_some_and(|next| !self.occupied_by_other(next))
    }
}

impl ChaseHost for NpcHost<'_> {
    fn entity_position(&self) -> Cell {
        self.body.cell
    }

    fn is_moving(&self) -> bool {
        self.body.cooldown > 0
    }

    fn move_one_step(&mut self, direction: Direction) -> bool {
        if self.is_moving() || !self.is_passable(self.body.cell, direction) {
            return false;
        }
        let Some(next) = self.map.step(self.body.cell, direction) else {
            return false;
        };
        self.body.cell = next;
        self.body.cooldown = self.body.step_ticks;
        true
    }

    fn target_position(&self) -> Cell {
        self.player.cell
    }

    fn target_facing(&self) -> Direction {
        self.player.facing
    }
}

fn derive_npc_seed(global_seed: u64, npc: NpcId) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(global_seed.to_le_bytes());
    hasher.update(NPC_STREAM_LABEL.as_bytes());
    hasher.update(npc.get().to_le_bytes());
    finalize_seed(hasher)
}

fn finalize_seed(hasher: Sha256) -> u64 {
    let digest = hasher.finalize();
    let mut bytes = [0_u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}
