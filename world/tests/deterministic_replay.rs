use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
};

use npc_chase_core::{
    Cell, ChaseConfig, ChasePhase, Command, Direction, Event, Fence, NpcId, OnRangeExit, Repath,
    StopCondition,
};
use npc_chase_world::{self as world, query, World};

#[test]
fn deterministic_replay_produces_identical_runs() {
    let first = replay(scripted_commands(0x5eed));
    let second = replay(scripted_commands(0x5eed));

    assert_eq!(first, second, "replay diverged between runs");
    assert_eq!(
        first.fingerprint(),
        second.fingerprint(),
        "fingerprint mismatch: {:#x}",
        first.fingerprint()
    );
    assert!(
        first
            .events
            .iter()
            .any(|event| matches!(event, Event::NpcAdvanced { .. })),
        "scripted replay never moved an npc"
    );
}

#[test]
fn replay_reaches_every_scripted_tick() {
    let outcome = replay(scripted_commands(7));
    let ticks: Vec<u64> = outcome
        .events
        .iter()
        .filter_map(|event| match event {
            Event::TimeAdvanced { tick } => Some(*tick),
            _ => None,
        })
        .collect();

    assert_eq!(ticks, (1..=ticks.len() as u64).collect::<Vec<_>>());
    assert_eq!(ticks.len(), 24);
}

fn replay(commands: Vec<Command>) -> ReplayOutcome {
    let mut world = World::new();
    let mut events = Vec::new();

    for command in commands {
        world::apply(&mut world, command, &mut events);
    }

    let npcs = query::npcs(&world)
        .into_iter()
        .map(|snapshot| NpcState {
            id: snapshot.id,
            cell: snapshot.cell,
            phase: snapshot.phase,
            armed: snapshot.armed,
            path_len: snapshot.path_len,
        })
        .collect();

    ReplayOutcome {
        npcs,
        player: query::player(&world).cell,
        events,
    }
}

fn scripted_commands(seed: u64) -> Vec<Command> {
    let mut commands = vec![
        Command::ConfigureMap {
            width: 8,
            height: 6,
            walls: vec![Cell::new(3, 2), Cell::new(3, 3), Cell::new(3, 4)],
            fences: vec![Fence {
                cell: Cell::new(5, 1),
                direction: Direction::Down,
            }],
            seed,
        },
        Command::PlacePlayer {
            cell: Cell::new(0, 0),
            facing: Direction::Right,
        },
        Command::SpawnNpc {
            cell: Cell::new(5, 0),
            config: ChaseConfig {
                range: 10,
                ..ChaseConfig::default()
            },
            step_ticks: 1,
        },
        Command::SpawnNpc {
            cell: Cell::new(6, 5),
            config: ChaseConfig {
                range: 6,
                on_range_exit: OnRangeExit::KeepChasing,
                stop_condition: StopCondition::Contact,
                repath: Repath::OnTargetMove,
            },
            step_ticks: 2,
        },
        Command::SpawnNpc {
            cell: Cell::new(1, 5),
            config: ChaseConfig::default(),
            step_ticks: 1,
        },
        Command::BeginChase {
            npc: NpcId::new(0),
            range: 10,
        },
        Command::BeginChase {
            npc: NpcId::new(1),
            range: 6,
        },
        Command::BeginChase {
            npc: NpcId::new(2),
            range: 3,
        },
    ];

    for tick in 0..12 {
        if tick % 3 == 0 {
            commands.push(Command::MovePlayer {
                direction: Direction::Down,
            });
        }
        commands.push(Command::Tick);
    }

    commands.push(Command::PlacePlayer {
        cell: Cell::new(7, 0),
        facing: Direction::Left,
    });
    commands.push(Command::SetAllChasesActive { active: false });
    commands.extend(std::iter::repeat(Command::Tick).take(6));
    commands.push(Command::SetAllChasesActive { active: true });
    commands.extend(std::iter::repeat(Command::Tick).take(6));
    commands
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct ReplayOutcome {
    npcs: Vec<NpcState>,
    player: Cell,
    events: Vec<Event>,
}

impl ReplayOutcome {
    fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.npcs.hash(&mut hasher);
        self.player.hash(&mut hasher);
        format!("{:?}", self.events).hash(&mut hasher);
        hasher.finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct NpcState {
    id: NpcId,
    cell: Cell,
    phase: ChasePhase,
    armed: bool,
    path_len: Option<usize>,
}
