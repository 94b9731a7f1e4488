use npc_chase_core::{
    Cell, ChaseConfig, ChasePhase, Command, Direction, Event, NpcId, OnRangeExit, StopCondition,
    StopReason,
};
use npc_chase_world::{self as world, query, World};

fn open_world(width: u32, height: u32) -> World {
    let mut world = World::new();
    let _ = run(
        &mut world,
        Command::ConfigureMap {
            width,
            height,
            walls: Vec::new(),
            fences: Vec::new(),
            seed: 3,
        },
    );
    world
}

fn run(world: &mut World, command: Command) -> Vec<Event> {
    let mut events = Vec::new();
    world::apply(world, command, &mut events);
    events
}

fn place_player(world: &mut World, x: u32, y: u32, facing: Direction) {
    let events = run(
        world,
        Command::PlacePlayer {
            cell: Cell::new(x, y),
            facing,
        },
    );
    assert!(matches!(events.as_slice(), [Event::PlayerPlaced { .. }]));
}

fn spawn_armed(world: &mut World, cell: Cell, config: ChaseConfig) -> NpcId {
    let events = run(
        world,
        Command::SpawnNpc {
            cell,
            config,
            step_ticks: 1,
        },
    );
    let npc = match events.as_slice() {
        [Event::NpcSpawned { npc, .. }] => *npc,
        other => panic!("unexpected spawn events: {other:?}"),
    };
    let _ = run(
        world,
        Command::BeginChase {
            npc,
            range: config.range,
        },
    );
    npc
}

fn npc_cell(world: &World, npc: NpcId) -> Cell {
    query::npc(world, npc).expect("npc exists").cell
}

#[test]
fn guard_engages_chases_and_walks_home() {
    let mut world = open_world(10, 10);
    place_player(&mut world, 7, 2, Direction::Left);
    let home = Cell::new(2, 2);
    let npc = spawn_armed(
        &mut world,
        home,
        ChaseConfig {
            range: 3,
            ..ChaseConfig::default()
        },
    );

    for _ in 0..3 {
        let events = run(&mut world, Command::Tick);
        assert!(matches!(events.as_slice(), [Event::TimeAdvanced { .. }]));
    }
    assert_eq!(npc_cell(&world, npc), home);

    for _ in 0..2 {
        let _ = run(
            &mut world,
            Command::MovePlayer {
                direction: Direction::Left,
            },
        );
    }
    assert_eq!(query::player(&world).cell, Cell::new(5, 2));

    let events = run(&mut world, Command::Tick);
    assert_eq!(
        &events[1..],
        &[
            Event::ChaseEngaged { npc },
            Event::NpcAdvanced {
                npc,
                from: home,
                to: Cell::new(3, 2),
            },
        ]
    );
    let _ = run(&mut world, Command::Tick);
    assert_eq!(npc_cell(&world, npc), Cell::new(4, 2));

    place_player(&mut world, 9, 9, Direction::Up);
    assert_eq!(
        query::npc(&world, npc).expect("npc").phase,
        ChasePhase::Returning
    );

    let _ = run(&mut world, Command::Tick);
    let events = run(&mut world, Command::Tick);
    assert_eq!(
        &events[1..],
        &[
            Event::NpcAdvanced {
                npc,
                from: Cell::new(3, 2),
                to: home,
            },
            Event::ReturnedHome { npc, home },
        ]
    );

    for _ in 0..3 {
        let events = run(&mut world, Command::Tick);
        assert_eq!(events.len(), 1, "idle guard produced events: {events:?}");
    }
    assert_eq!(
        query::npc(&world, npc).expect("npc").phase,
        ChasePhase::Idle
    );
}

#[test]
fn bumping_into_the_player_ends_a_faced_contact_chase() {
    let mut world = open_world(6, 1);
    place_player(&mut world, 1, 0, Direction::Right);
    let npc = spawn_armed(
        &mut world,
        Cell::new(3, 0),
        ChaseConfig {
            range: 5,
            on_range_exit: OnRangeExit::KeepChasing,
            stop_condition: StopCondition::FacedContact,
            ..ChaseConfig::default()
        },
    );

    let events = run(&mut world, Command::Tick);

    assert_eq!(
        &events[1..],
        &[
            Event::ChaseEngaged { npc },
            Event::NpcAdvanced {
                npc,
                from: Cell::new(3, 0),
                to: Cell::new(2, 0),
            },
            Event::ChaseStopped {
                npc,
                reason: StopReason::Contact,
            },
        ]
    );
    let snapshot = query::npc(&world, npc).expect("npc");
    assert!(!snapshot.armed);
    assert_eq!(snapshot.phase, ChasePhase::Idle);

    let events = run(&mut world, Command::Tick);
    assert_eq!(events.len(), 1);
}

#[test]
fn deactivating_all_chases_sends_chasers_home() {
    let mut world = open_world(8, 1);
    let home = Cell::new(4, 0);
    let npc = spawn_armed(
        &mut world,
        home,
        ChaseConfig {
            range: 6,
            ..ChaseConfig::default()
        },
    );

    let _ = run(&mut world, Command::Tick);
    assert_eq!(npc_cell(&world, npc), Cell::new(3, 0));

    let events = run(&mut world, Command::SetAllChasesActive { active: false });
    assert_eq!(
        events,
        vec![Event::ChaseStopped {
            npc,
            reason: StopReason::Command,
        }]
    );

    let events = run(&mut world, Command::Tick);
    assert_eq!(
        &events[1..],
        &[
            Event::NpcAdvanced {
                npc,
                from: Cell::new(3, 0),
                to: home,
            },
            Event::ReturnedHome { npc, home },
        ]
    );

    let _ = run(&mut world, Command::SetAllChasesActive { active: true });
    let snapshot = query::npc(&world, npc).expect("npc");
    assert!(snapshot.armed);
    assert_eq!(snapshot.config.range, 6);

    let events = run(&mut world, Command::Tick);
    assert!(events.contains(&Event::ChaseEngaged { npc }));
}

#[test]
fn walls_force_a_detour() {
    let mut world = World::new();
    let _ = run(
        &mut world,
        Command::ConfigureMap {
            width: 5,
            height: 3,
            walls: vec![Cell::new(2, 0), Cell::new(2, 1)],
            fences: Vec::new(),
            seed: 9,
        },
    );
    place_player(&mut world, 0, 0, Direction::Down);
    let npc = spawn_armed(
        &mut world,
        Cell::new(4, 0),
        ChaseConfig {
            range: 10,
            ..ChaseConfig::default()
        },
    );

    let mut visited = vec![npc_cell(&world, npc)];
    for _ in 0..8 {
        let _ = run(&mut world, Command::Tick);
        let cell = npc_cell(&world, npc);
        if visited.last() != Some(&cell) {
            visited.push(cell);
        }
    }

    assert!(visited.contains(&Cell::new(2, 2)), "path skipped the gap: {visited:?}");
    assert_eq!(visited.last(), Some(&Cell::new(0, 0)));
    assert_eq!(visited.len(), 9);
}
