#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line adapter that replays chase scenarios against the reference world.

mod report;
mod scenario;

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use npc_chase_core::{Command, Event};
use npc_chase_world::{self as world, query, World};
use report::{EventWriter, OutputFormat};
use scenario::{CompiledScenario, Scenario};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_TICKS: u64 = 20;

/// Grid NPC chase simulator.
#[derive(Debug, Parser)]
#[command(name = "npc-chase", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Run a scenario and print the events it produces
    Run {
        /// Scenario file (TOML)
        #[arg(value_name = "SCENARIO")]
        scenario: PathBuf,

        /// Number of ticks to simulate; overrides the scenario's `ticks`
        #[arg(long)]
        ticks: Option<u64>,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,

        /// Print the map after every tick
        #[arg(long)]
        show_map: bool,
    },
    /// Validate a scenario without running it
    Check {
        /// Scenario file (TOML)
        #[arg(value_name = "SCENARIO")]
        scenario: PathBuf,
    },
}

fn main() -> Result<()> {
    init_tracing();

    match Cli::parse().command {
        CliCommand::Run {
            scenario,
            ticks,
            format,
            show_map,
        } => run(&scenario, ticks, format, show_map),
        CliCommand::Check { scenario } => check(&scenario),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn load(path: &Path) -> Result<CompiledScenario> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read scenario {}", path.display()))?;
    let scenario = Scenario::from_toml(&text)
        .with_context(|| format!("failed to parse scenario {}", path.display()))?;
    scenario
        .compile()
        .with_context(|| format!("invalid scenario {}", path.display()))
}

fn check(path: &Path) -> Result<()> {
    let compiled = load(path)?;
    println!(
        "{}: {} map, {} npc(s), {} scripted action(s)",
        path.display(),
        compiled.bounds,
        compiled.npc_count,
        compiled.script_len()
    );
    Ok(())
}

fn run(path: &Path, ticks: Option<u64>, format: OutputFormat, show_map: bool) -> Result<()> {
    let compiled = load(path)?;
    let ticks = ticks.or(compiled.ticks).unwrap_or(DEFAULT_TICKS);
    if let Some(last) = compiled.last_scripted_tick() {
        if last >= ticks {
            tracing::warn!(last, ticks, "script entries after the final tick never run");
        }
    }

    let mut world = compiled
        .search_budget
        .map_or_else(World::new, World::with_search_budget);
    let stdout = io::stdout();
    let mut writer = EventWriter::new(format, stdout.lock());
    let mut events = Vec::new();

    apply_all(&mut world, &compiled.setup, &mut events);
    writer.write_events(0, &events)?;
    events.clear();
    if show_map {
        writer.write_map(0, &query::render_ascii(&world))?;
    }

    for elapsed in 0..ticks {
        apply_all(&mut world, compiled.script_at(elapsed), &mut events);
        world::apply(&mut world, Command::Tick, &mut events);

        let tick = query::tick(&world);
        writer.write_events(tick, &events)?;
        events.clear();
        if show_map {
            writer.write_map(tick, &query::render_ascii(&world))?;
        }
    }
    writer.flush()?;

    tracing::info!(
        ticks,
        npcs = query::npcs(&world).len(),
        player = %query::player(&world).cell,
        "scenario finished"
    );
    Ok(())
}

fn apply_all(world: &mut World, commands: &[Command], events: &mut Vec<Event>) {
    for command in commands {
        world::apply(world, command.clone(), events);
    }
}
