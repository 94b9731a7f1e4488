#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Stateless four-directional A* search over a host passability oracle.
//!
//! Each call owns its search nodes and discards them on return. Candidates
//! with equal `f = g + h` are expanded in the order they were first
//! discovered, so identical inputs always yield identical paths.

use std::{cmp::Ordering, collections::BinaryHeap};

use npc_chase_core::{Cell, CellRole, ChaseError, Direction, GridBounds, PassabilityMap, Path};

/// Computes a shortest sequence of cardinal steps from `start` to `goal`.
///
/// Returns an empty path when `start == goal`, [`ChaseError::Unreachable`]
/// when the open set empties before the goal is reached, and
/// [`ChaseError::OutOfBounds`] when either endpoint lies outside the map.
/// The goal cell's own occupancy is not special-cased; only transitions into
/// it are checked against the oracle.
pub fn find_path<M>(start: Cell, goal: Cell, map: &M) -> Result<Path, ChaseError>
where
    M: PassabilityMap + ?Sized,
{
    let budget = map.bounds().cell_count();
    find_path_within(start, goal, map, budget)
}

/// Same as [`find_path`], but gives up with [`ChaseError::Unreachable`] after
/// closing `max_expansions` non-goal nodes.
pub fn find_path_within<M>(
    start: Cell,
    goal: Cell,
    map: &M,
    max_expansions: usize,
) -> Result<Path, ChaseError>
where
    M: PassabilityMap + ?Sized,
{
    let bounds = map.bounds();
    bounds.check(start, CellRole::Start)?;
    bounds.check(goal, CellRole::Goal)?;

    if start == goal {
        return Ok(Path::new());
    }

    let mut search = Search::new(bounds, goal);
    let outcome = search.run(start, map, max_expansions);
    tracing::trace!(
        %start,
        %goal,
        expansions = search.expansions,
        nodes = search.nodes.len(),
        steps = outcome.as_ref().map_or(0, Path::len),
        "path search finished"
    );
    outcome.ok_or(ChaseError::Unreachable { start, goal })
}

#[derive(Clone, Copy, Debug)]
struct SearchNode {
    cell: Cell,
    g: u32,
    h: u32,
    via: Option<Direction>,
    parent: Option<usize>,
    sequence: u64,
    closed: bool,
}

impl SearchNode {
    fn f(&self) -> u32 {
        self.g + self.h
    }
}

/// Heap entry; stale once its node has been closed or relaxed to a lower `g`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct OpenEntry {
    f: u32,
    sequence: u64,
    g: u32,
    node: usize,
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed: BinaryHeap is a max-heap
        (other.f, other.sequence).cmp(&(self.f, self.sequence))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug)]
struct Search {
    bounds: GridBounds,
    goal: Cell,
    nodes: Vec<SearchNode>,
    slots: Vec<Option<usize>>,
    open: BinaryHeap<OpenEntry>,
    next_sequence: u64,
    expansions: usize,
}

impl Search {
    fn new(bounds: GridBounds, goal: Cell) -> Self {
        Self {
            bounds,
            goal,
            nodes: Vec::new(),
            slots: vec![None; bounds.cell_count()],
            open: BinaryHeap::new(),
            next_sequence: 0,
            expansions: 0,
        }
    }

    fn run<M>(&mut self, start: Cell, map: &M, max_expansions: usize) -> Option<Path>
    where
        M: PassabilityMap + ?Sized,
    {
        self.insert(start, 0, None, None);

        while let Some(entry) = self.open.pop() {
            let current = self.nodes[entry.node];
            if current.closed || entry.g != current.g {
                continue;
            }
            self.nodes[entry.node].closed = true;

            if current.cell == self.goal {
                return Some(self.reconstruct(entry.node));
            }

            if self.expansions >= max_expansions {
                return None;
            }
            self.expansions += 1;

            for direction in Direction::ALL {
                let Some(neighbor) = current.cell.step(direction, self.bounds) else {
                    continue;
                };
                if !map.is_passable(current.cell, direction) {
                    continue;
                }

                let g = current.g + 1;
                match self.slot(neighbor) {
                    Some(index) if self.nodes[index].closed => {}
                    Some(index) => {
                        if g < self.nodes[index].g {
                            self.relax(index, g, direction, entry.node);
                        }
                    }
                    None => self.insert(neighbor, g, Some(direction), Some(entry.node)),
                }
            }
        }

        None
    }

    fn insert(&mut self, cell: Cell, g: u32, via: Option<Direction>, parent: Option<usize>) {
        let node = SearchNode {
            cell,
            g,
            h: cell.manhattan_distance(self.goal),
            via,
            parent,
            sequence: self.next_sequence,
            closed: false,
        };
        self.next_sequence += 1;

        let index = self.nodes.len();
        self.nodes.push(node);
        if let Some(slot) = self.bounds.index(cell).and_then(|i| self.slots.get_mut(i)) {
            *slot = Some(index);
        }
        self.open.push(OpenEntry {
            f: node.f(),
            sequence: node.sequence,
            g,
            node: index,
        });
    }

    fn relax(&mut self, index: usize, g: u32, via: Direction, parent: usize) {
        let node = &mut self.nodes[index];
        node.g = g;
        node.via = Some(via);
        node.parent = Some(parent);
        let entry = OpenEntry {
            f: node.f(),
            sequence: node.sequence,
            g,
            node: index,
        };
        self.open.push(entry);
    }

    fn slot(&self, cell: Cell) -> Option<usize> {
        self.bounds
            .index(cell)
            .and_then(|i| self.slots.get(i).copied().flatten())
    }

    fn reconstruct(&self, goal_index: usize) -> Path {
        let mut steps = Vec::new();
        let mut cursor = Some(goal_index);
        while let Some(index) = cursor {
            let node = &self.nodes[index];
            if let Some(direction) = node.via {
                steps.push(direction);
            }
            cursor = node.parent;
        }
        steps.into_iter().rev().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use npc_chase_core::PassabilityFn;

    fn open_grid(width: u32, height: u32) -> PassabilityFn<impl Fn(Cell, Direction) -> bool> {
        PassabilityFn::new(GridBounds::new(width, height), |_, _| true)
    }

    #[test]
    fn open_entries_pop_lowest_f_then_earliest_sequence() {
        let mut heap = BinaryHeap::new();
        heap.push(OpenEntry {
            f: 4,
            sequence: 0,
            g: 0,
            node: 0,
        });
        heap.push(OpenEntry {
            f: 2,
            sequence: 5,
            g: 0,
            node: 1,
        });
        heap.push(OpenEntry {
            f: 2,
            sequence: 3,
            g: 0,
            node: 2,
        });

        let order: Vec<usize> =
            std::iter::from_fn(|| heap.pop().map(|entry| entry.node)).collect();
        assert_eq!(order, vec![2, 1, 0]);
    }

    #[test]
    fn ties_resolve_to_first_discovered_candidate() {
        let path = find_path(Cell::new(0, 0), Cell::new(1, 1), &open_grid(2, 2)).expect("path");
        let steps: Vec<_> = path.iter().collect();
        assert_eq!(steps, vec![Direction::Right, Direction::Down]);
    }

    #[test]
    fn start_equal_to_goal_yields_empty_path() {
        let path = find_path(Cell::new(2, 2), Cell::new(2, 2), &open_grid(5, 5)).expect("path");
        assert!(path.is_empty());
    }

    #[test]
    fn exhausted_budget_reports_unreachable() {
        let start = Cell::new(0, 0);
        let goal = Cell::new(4, 4);
        assert_eq!(
            find_path_within(start, goal, &open_grid(5, 5), 2),
            Err(ChaseError::Unreachable { start, goal })
        );
    }
}
