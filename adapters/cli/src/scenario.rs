//! Scenario files: a TOML map with NPCs and scripted player input.
//!
//! ```toml
//! seed = 7
//! ticks = 30
//! map = [
//!     "#########",
//!     "#P.....N#",
//!     "#########",
//! ]
//!
//! [defaults]
//! range = 4
//!
//! [[npc]]
//! cell = [3, 1]
//! stop_condition = "contact"
//!
//! [[script]]
//! tick = 2
//! action = "move"
//! direction = "right"
//! ```

use std::collections::{BTreeMap, HashSet};

use npc_chase_core::{
    Cell, ChaseConfig, Command, Direction, Fence, GridBounds, NpcId, OnRangeExit, Repath,
    SpawnError, StopCondition,
};
use serde::Deserialize;
use thiserror::Error;

const DEFAULT_STEP_TICKS: u32 = 1;

/// Validation failures for a parsed scenario.
#[derive(Debug, Error, PartialEq, Eq)]
pub(crate) enum ScenarioError {
    #[error("scenario map has no tiles")]
    EmptyMap,
    #[error("scenario map does not fit a u32 grid")]
    MapTooLarge,
    #[error("map row {row} is {found} tiles wide, expected {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("unknown tile {tile:?} at {cell}")]
    UnknownTile { tile: char, cell: Cell },
    #[error("map has no player tile `P`")]
    MissingPlayer,
    #[error("map has a second player tile at {cell}")]
    DuplicatePlayer { cell: Cell },
    #[error("npc cannot spawn at {cell}: {reason:?}")]
    InvalidSpawn { cell: Cell, reason: SpawnError },
    #[error("fence at {cell} lies outside the map")]
    FenceOutOfBounds { cell: Cell },
    #[error("script entry at tick {tick} names unknown npc {npc}")]
    UnknownNpc { tick: u64, npc: u32 },
}

/// Raw scenario as written in the TOML file.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct Scenario {
    #[serde(default)]
    seed: u64,
    ticks: Option<u64>,
    search_budget: Option<usize>,
    #[serde(default = "default_facing")]
    facing: Direction,
    map: Vec<String>,
    #[serde(default)]
    fences: Vec<FenceEntry>,
    #[serde(default)]
    defaults: NpcSettings,
    #[serde(default, rename = "npc")]
    npcs: Vec<NpcEntry>,
    #[serde(default)]
    script: Vec<ScriptEntry>,
}

fn default_facing() -> Direction {
    Direction::Down
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FenceEntry {
    cell: [u32; 2],
    direction: Direction,
}

/// Chase settings that may be left unset and inherited from `[defaults]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
struct NpcSettings {
    range: Option<u32>,
    on_range_exit: Option<OnRangeExit>,
    stop_condition: Option<StopCondition>,
    repath: Option<Repath>,
    step_ticks: Option<u32>,
    armed: Option<bool>,
}

impl NpcSettings {
    fn or(self, fallback: NpcSettings) -> Self {
        Self {
            range: self.range.or(fallback.range),
            on_range_exit: self.on_range_exit.or(fallback.on_range_exit),
            stop_condition: self.stop_condition.or(fallback.stop_condition),
            repath: self.repath.or(fallback.repath),
            step_ticks: self.step_ticks.or(fallback.step_ticks),
            armed: self.armed.or(fallback.armed),
        }
    }

    fn config(&self) -> ChaseConfig {
        let base = ChaseConfig::default();
        ChaseConfig {
            range: self.range.unwrap_or(base.range),
            on_range_exit: self.on_range_exit.unwrap_or(base.on_range_exit),
            stop_condition: self.stop_condition.unwrap_or(base.stop_condition),
            repath: self.repath.unwrap_or(base.repath),
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NpcEntry {
    cell: [u32; 2],
    range: Option<u32>,
    on_range_exit: Option<OnRangeExit>,
    stop_condition: Option<StopCondition>,
    repath: Option<Repath>,
    step_ticks: Option<u32>,
    armed: Option<bool>,
}

impl NpcEntry {
    fn settings(&self) -> NpcSettings {
        NpcSettings {
            range: self.range,
            on_range_exit: self.on_range_exit,
            stop_condition: self.stop_condition,
            repath: self.repath,
            step_ticks: self.step_ticks,
            armed: self.armed,
        }
    }
}

/// Player input or chase command applied once `tick` ticks have elapsed.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ScriptEntry {
    Move {
        tick: u64,
        direction: Direction,
    },
    Place {
        tick: u64,
        cell: [u32; 2],
        facing: Option<Direction>,
    },
    PlaceNpc {
        tick: u64,
        npc: u32,
        cell: [u32; 2],
    },
    BeginChase {
        tick: u64,
        npc: u32,
        range: u32,
    },
    StopChase {
        tick: u64,
        npc: u32,
    },
    ActivateAll {
        tick: u64,
    },
    DeactivateAll {
        tick: u64,
    },
}

impl ScriptEntry {
    fn tick(&self) -> u64 {
        match *self {
            Self::Move { tick, .. }
            | Self::Place { tick, .. }
            | Self::PlaceNpc { tick, .. }
            | Self::BeginChase { tick, .. }
            | Self::StopChase { tick, .. }
            | Self::ActivateAll { tick }
            | Self::DeactivateAll { tick } => tick,
        }
    }

    fn npc(&self) -> Option<u32> {
        match *self {
            Self::PlaceNpc { npc, .. }
            | Self::BeginChase { npc, .. }
            | Self::StopChase { npc, .. } => Some(npc),
            _ => None,
        }
    }

    fn command(&self, facing: Direction) -> Command {
        match *self {
            Self::Move { direction, .. } => Command::MovePlayer { direction },
            Self::Place {
                cell: [x, y],
                facing: placed_facing,
                ..
            } => Command::PlacePlayer {
                cell: Cell::new(x, y),
                facing: placed_facing.unwrap_or(facing),
            },
            Self::PlaceNpc {
                npc,
                cell: [x, y],
                ..
            } => Command::PlaceNpc {
                npc: NpcId::new(npc),
                cell: Cell::new(x, y),
            },
            Self::BeginChase { npc, range, .. } => Command::BeginChase {
                npc: NpcId::new(npc),
                range,
            },
            Self::StopChase { npc, .. } => Command::StopChase {
                npc: NpcId::new(npc),
            },
            Self::ActivateAll { .. } => Command::SetAllChasesActive { active: true },
            Self::DeactivateAll { .. } => Command::SetAllChasesActive { active: false },
        }
    }
}

/// Scenario lowered to world commands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct CompiledScenario {
    pub(crate) bounds: GridBounds,
    pub(crate) setup: Vec<Command>,
    pub(crate) ticks: Option<u64>,
    pub(crate) search_budget: Option<usize>,
    pub(crate) npc_count: usize,
    script: BTreeMap<u64, Vec<Command>>,
}

impl CompiledScenario {
    /// Commands to apply once `tick` ticks have been processed.
    pub(crate) fn script_at(&self, tick: u64) -> &[Command] {
        self.script.get(&tick).map_or(&[], Vec::as_slice)
    }

    /// Number of scripted commands across all ticks.
    pub(crate) fn script_len(&self) -> usize {
        self.script.values().map(Vec::len).sum()
    }

    /// Latest tick at which a scripted command fires.
    pub(crate) fn last_scripted_tick(&self) -> Option<u64> {
        self.script.keys().next_back().copied()
    }
}

impl Scenario {
    /// Parses a scenario from TOML text.
    pub(crate) fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Validates the scenario and lowers it to world commands.
    ///
    /// NPCs spawn in map order (row-major) followed by `[[npc]]` entries, so
    /// the n-th NPC receives id `n`.
    pub(crate) fn compile(&self) -> Result<CompiledScenario, ScenarioError> {
        let layout = Layout::parse(&self.map)?;

        let mut npcs: Vec<(Cell, NpcSettings)> = layout
            .npc_tiles
            .iter()
            .map(|cell| (*cell, self.defaults))
            .collect();
        npcs.extend(self.npcs.iter().map(|entry| {
            let [x, y] = entry.cell;
            (Cell::new(x, y), entry.settings().or(self.defaults))
        }));

        let walls: HashSet<Cell> = layout.walls.iter().copied().collect();
        let mut taken = HashSet::from([layout.player]);
        for (cell, _) in &npcs {
            let reason = if !layout.bounds.contains(*cell) {
                Some(SpawnError::OutOfBounds)
            } else if walls.contains(cell) {
                Some(SpawnError::Wall)
            } else if !taken.insert(*cell) {
                Some(SpawnError::Occupied)
            } else {
                None
            };
            if let Some(reason) = reason {
                return Err(ScenarioError::InvalidSpawn {
                    cell: *cell,
                    reason,
                });
            }
        }

        let mut fences = Vec::with_capacity(self.fences.len());
        for entry in &self.fences {
            let [x, y] = entry.cell;
            let cell = Cell::new(x, y);
            if !layout.bounds.contains(cell) {
                return Err(ScenarioError::FenceOutOfBounds { cell });
            }
            fences.push(Fence {
                cell,
                direction: entry.direction,
            });
        }

        let mut setup = vec![
            Command::ConfigureMap {
                width: layout.bounds.width(),
                height: layout.bounds.height(),
                walls: layout.walls,
                fences,
                seed: self.seed,
            },
            Command::PlacePlayer {
                cell: layout.player,
                facing: self.facing,
            },
        ];
        for (cell, settings) in &npcs {
            setup.push(Command::SpawnNpc {
                cell: *cell,
                config: settings.config(),
                step_ticks: settings.step_ticks.unwrap_or(DEFAULT_STEP_TICKS),
            });
        }
        for (id, (_, settings)) in (0_u32..).zip(&npcs) {
            if settings.armed.unwrap_or(true) {
                setup.push(Command::BeginChase {
                    npc: NpcId::new(id),
                    range: settings.config().range,
                });
            }
        }

        let mut script: BTreeMap<u64, Vec<Command>> = BTreeMap::new();
        for entry in &self.script {
            if let Some(npc) = entry.npc() {
                if usize::try_from(npc).map_or(true, |index| index >= npcs.len()) {
                    return Err(ScenarioError::UnknownNpc {
                        tick: entry.tick(),
                        npc,
                    });
                }
            }
            script
                .entry(entry.tick())
                .or_default()
                .push(entry.command(self.facing));
        }

        Ok(CompiledScenario {
            bounds: layout.bounds,
            setup,
            ticks: self.ticks,
            search_budget: self.search_budget,
            npc_count: npcs.len(),
            script,
        })
    }
}

#[derive(Debug)]
struct Layout {
    bounds: GridBounds,
    walls: Vec<Cell>,
    player: Cell,
    npc_tiles: Vec<Cell>,
}

impl Layout {
    fn parse(rows: &[String]) -> Result<Self, ScenarioError> {
        let expected = rows.first().map_or(0, |row| row.chars().count());
        if expected == 0 {
            return Err(ScenarioError::EmptyMap);
        }
        let width = u32::try_from(expected).map_err(|_| ScenarioError::MapTooLarge)?;
        let height = u32::try_from(rows.len()).map_err(|_| ScenarioError::MapTooLarge)?;

        let mut walls = Vec::new();
        let mut player = None;
        let mut npc_tiles = Vec::new();
        for (row, (y, text)) in (0_u32..).zip(rows).enumerate() {
            let found = text.chars().count();
            if found != expected {
                return Err(ScenarioError::RaggedRow {
                    row,
                    expected,
                    found,
                });
            }
            for (x, tile) in (0_u32..).zip(text.chars()) {
                let cell = Cell::new(x, y);
                match tile {
                    '.' => {}
                    '#' => walls.push(cell),
                    'N' => npc_tiles.push(cell),
                    'P' if player.is_some() => {
                        return Err(ScenarioError::DuplicatePlayer { cell });
                    }
                    'P' => player = Some(cell),
                    other => return Err(ScenarioError::UnknownTile { tile: other, cell }),
                }
            }
        }

        Ok(Self {
            bounds: GridBounds::new(width, height),
            walls,
            player: player.ok_or(ScenarioError::MissingPlayer)?,
            npc_tiles,
        })
    }
}
