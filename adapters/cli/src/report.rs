//! Event output for `npc-chase run`.

use std::io::{self, Write};

use npc_chase_core::Event;
use serde::Serialize;

/// Output encoding for simulation events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    /// One human-readable line per event.
    Text,
    /// One JSON object per event line.
    Json,
}

#[derive(Serialize)]
struct EventLine<'a> {
    tick: u64,
    event: &'a Event,
}

#[derive(Serialize)]
struct MapLine<'a> {
    tick: u64,
    map: Vec<&'a str>,
}

/// Writes events and map renders in the selected format.
#[derive(Debug)]
pub(crate) struct EventWriter<W> {
    format: OutputFormat,
    out: W,
}

impl<W: Write> EventWriter<W> {
    pub(crate) fn new(format: OutputFormat, out: W) -> Self {
        Self { format, out }
    }

    pub(crate) fn write_events(&mut self, tick: u64, events: &[Event]) -> io::Result<()> {
        for event in events {
            match self.format {
                OutputFormat::Text => writeln!(self.out, "{}", describe(event))?,
                OutputFormat::Json => {
                    serde_json::to_writer(&mut self.out, &EventLine { tick, event })?;
                    writeln!(self.out)?;
                }
            }
        }
        Ok(())
    }

    pub(crate) fn write_map(&mut self, tick: u64, render: &str) -> io::Result<()> {
        match self.format {
            OutputFormat::Text => writeln!(self.out, "{render}\n"),
            OutputFormat::Json => {
                let line = MapLine {
                    tick,
                    map: render.lines().collect(),
                };
                serde_json::to_writer(&mut self.out, &line)?;
                writeln!(self.out)
            }
        }
    }

    pub(crate) fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// Human-readable rendering of a single event.
pub(crate) fn describe(event: &Event) -> String {
    match event {
        Event::MapConfigured { bounds } => format!("map configured: {bounds}"),
        Event::PlayerPlaced { cell, facing } => format!("player placed at {cell} facing {facing}"),
        Event::PlayerPlacementRejected { cell } => format!("player placement at {cell} rejected"),
        Event::PlayerMoved { from, to } => format!("player moved {from} -> {to}"),
        Event::PlayerBlocked { cell, facing } => {
            format!("player blocked at {cell} facing {facing}")
        }
        Event::NpcSpawned { npc, cell } => format!("npc {} spawned at {cell}", npc.get()),
        Event::SpawnRejected { cell, reason } => format!("spawn at {cell} rejected: {reason:?}"),
        Event::NpcPlaced { npc, cell } => format!("npc {} placed at {cell}", npc.get()),
        Event::NpcPlacementRejected { npc, cell, reason } => {
            format!("npc {} placement at {cell} rejected: {reason:?}", npc.get())
        }
        Event::ChaseEngaged { npc } => format!("npc {} engaged", npc.get()),
        Event::ChaseDisengaged { npc } => format!("npc {} disengaged", npc.get()),
        Event::ChaseStopped { npc, reason } => {
            format!("npc {} stopped chasing: {reason:?}", npc.get())
        }
        Event::NpcAdvanced { npc, from, to } => {
            format!("npc {} advanced {from} -> {to}", npc.get())
        }
        Event::NpcStalled { npc, reason } => format!("npc {} stalled: {reason:?}", npc.get()),
        Event::ReturnedHome { npc, home } => format!("npc {} returned home to {home}", npc.get()),
        Event::ChaseFault { npc, error } => format!("npc {} fault: {error}", npc.get()),
        Event::TimeAdvanced { tick } => format!("-- tick {tick} --"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use npc_chase_core::{Cell, NpcId, SpawnError, StallReason};

    #[test]
    fn text_lines_describe_events() {
        assert_eq!(
            describe(&Event::NpcAdvanced {
                npc: NpcId::new(2),
                from: Cell::new(1, 1),
                to: Cell::new(2, 1),
            }),
            "npc 2 advanced (1, 1) -> (2, 1)"
        );
        assert_eq!(
            describe(&Event::NpcStalled {
                npc: NpcId::new(0),
                reason: StallReason::Boxed,
            }),
            "npc 0 stalled: Boxed"
        );
        assert_eq!(
            describe(&Event::NpcPlacementRejected {
                npc: NpcId::new(1),
                cell: Cell::new(0, 0),
                reason: SpawnError::Occupied,
            }),
            "npc 1 placement at (0, 0) rejected: Occupied"
        );
    }

    #[test]
    fn json_lines_carry_the_tick() {
        let mut buffer = Vec::new();
        let mut writer = EventWriter::new(OutputFormat::Json, &mut buffer);
        writer
            .write_events(
                3,
                &[
                    Event::ChaseEngaged { npc: NpcId::new(1) },
                    Event::TimeAdvanced { tick: 3 },
                ],
            )
            .expect("write to vec");

        let text = String::from_utf8(buffer).expect("utf8");
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["tick"], 3);
        assert_eq!(lines[0]["event"]["ChaseEngaged"]["npc"], 1);
        assert_eq!(lines[1]["event"]["TimeAdvanced"]["tick"], 3);
    }

    #[test]
    fn json_map_lines_split_rows() {
        let mut buffer = Vec::new();
        EventWriter::new(OutputFormat::Json, &mut buffer)
            .write_map(1, "P.\n.n")
            .expect("write to vec");

        let text = String::from_utf8(buffer).expect("utf8");
        let value: serde_json::Value = serde_json::from_str(text.trim_end()).expect("json");
        assert_eq!(value["map"], serde_json::json!(["P.", ".n"]));
    }
}
