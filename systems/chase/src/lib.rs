#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Range-gated chase behaviour for NPCs on a tile grid.
//!
//! Each NPC owns a [`ChaseState`]. Once per tick the host hands that state,
//! a [`ChaseHost`] view of the NPC, and a random source to
//! [`ChaseController::on_tick`], which decides whether to engage, keep
//! following the stored path, recompute it, or walk back home.

use npc_chase_core::{
    Cell, CellRole, ChaseConfig, ChaseError, ChaseHost, ChasePhase, Direction, GridBounds,
    OnRangeExit, PassabilityMap, Path, Repath, StallReason, StopCondition, StopReason,
};
use npc_chase_system_pathfinding::{find_path, find_path_within};
use rand::{seq::SliceRandom, Rng};

/// Chase bookkeeping owned by a single NPC for its whole lifetime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChaseState {
    phase: ChasePhase,
    armed: bool,
    home: Cell,
    path: Option<Path>,
    path_goal: Option<Cell>,
    config: ChaseConfig,
}

impl ChaseState {
    /// Creates the state for a freshly spawned NPC whose home is `home`.
    ///
    /// The home cell is fixed here and never changes afterwards. The state
    /// starts idle and disarmed; [`ChaseState::begin_chase`] arms it.
    pub fn new(home: Cell, config: ChaseConfig, bounds: GridBounds) -> Result<Self, ChaseError> {
        bounds.check(home, CellRole::Home)?;
        Ok(Self {
            phase: ChasePhase::Idle,
            armed: false,
            home,
            path: None,
            path_goal: None,
            config,
        })
    }

    /// Arms the chase behaviour with the provided engagement range.
    ///
    /// Engagement itself still waits for the target to come within range.
    pub fn begin_chase(&mut self, range: u32) {
        self.armed = true;
        self.config.range = range;
    }

    /// Disarms the chase behaviour. A chasing NPC turns back toward home.
    pub fn stop_chase(&mut self) {
        self.armed = false;
        self.drop_engagement();
    }

    /// Forgets any ongoing engagement without disarming, e.g. after the
    /// target was transferred elsewhere.
    pub fn reset_engagement(&mut self) {
        self.drop_engagement();
    }

    /// Current phase of the state machine.
    #[must_use]
    pub const fn phase(&self) -> ChasePhase {
        self.phase
    }

    /// Reports whether the NPC is currently chasing.
    #[must_use]
    pub fn is_engaged(&self) -> bool {
        self.phase == ChasePhase::Chasing
    }

    /// Reports whether chase behaviour may engage.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.armed
    }

    /// Cell the NPC returns to when disengaged.
    #[must_use]
    pub const fn home(&self) -> Cell {
        self.home
    }

    /// Remaining steps of the stored chase path, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_ref()
    }

    /// Engagement range in tiles.
    #[must_use]
    pub const fn range(&self) -> u32 {
        self.config.range
    }

    /// Configuration attached to the NPC.
    #[must_use]
    pub const fn config(&self) -> &ChaseConfig {
        &self.config
    }

    fn drop_engagement(&mut self) {
        if self.phase == ChasePhase::Chasing {
            self.phase = ChasePhase::Returning;
        }
        self.clear_path();
    }

    fn clear_path(&mut self) {
        self.path = None;
        self.path_goal = None;
    }
}

/// Phase change observed during a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transition {
    /// The target came within range and the chase started.
    Engaged,
    /// The target left range and the NPC turned back home.
    Disengaged,
    /// The chase ended outright and the controller disarmed.
    Stopped(StopReason),
    /// A returning NPC stands on its home cell again.
    ArrivedHome,
}

/// What the NPC did with its tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TickAction {
    /// The previous step is still animating; nothing was decided.
    Busy,
    /// No movement was wanted.
    Idle,
    /// The NPC took one step.
    Stepped {
        /// Direction of the step.
        direction: Direction,
        /// Cell the NPC left.
        from: Cell,
        /// Cell the NPC entered.
        to: Cell,
    },
    /// Movement was wanted but not possible this tick.
    Stalled(StallReason),
}

/// Outcome of a single [`ChaseController::on_tick`] call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TickReport {
    /// Phase changes in the order they happened.
    pub transitions: Vec<Transition>,
    /// Movement decision taken this tick.
    pub action: TickAction,
}

impl TickReport {
    fn new(action: TickAction) -> Self {
        Self {
            transitions: Vec::new(),
            action,
        }
    }
}

/// Per-tick chase policy shared by every NPC.
#[derive(Clone, Copy, Debug, Default)]
pub struct ChaseController {
    search_budget: Option<usize>,
}

impl ChaseController {
    /// Creates a controller whose path searches may explore the whole map.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            search_budget: None,
        }
    }

    /// Caps the number of nodes a single path search may expand.
    #[must_use]
    pub fn with_search_budget(mut self, max_expansions: usize) -> Self {
        self.search_budget = Some(max_expansions);
        self
    }

    /// Runs one tick of chase behaviour for the NPC behind `host`.
    ///
    /// Out-of-bounds entity, home, or target cells are reported as
    /// [`ChaseError::OutOfBounds`] without moving. Unreachable targets and
    /// refused steps are not errors; they surface as [`TickAction::Stalled`].
    pub fn on_tick<H, R>(
        &self,
        state: &mut ChaseState,
        host: &mut H,
        rng: &mut R,
    ) -> Result<TickReport, ChaseError>
    where
        H: ChaseHost + ?Sized,
        R: Rng + ?Sized,
    {
        if host.is_moving() {
            return Ok(TickReport::new(TickAction::Busy));
        }

        let bounds = host.bounds();
        let position = host.entity_position();
        let target = host.target_position();
        bounds.check(position, CellRole::Entity)?;
        bounds.check(state.home, CellRole::Home)?;
        bounds.check(target, CellRole::Target)?;

        let facing = host.target_facing();
        let distance = position.manhattan_distance(target);
        let mut transitions = Vec::new();

        if state.phase != ChasePhase::Chasing && state.armed && distance <= state.config.range {
            tracing::debug!(%position, %target, distance, "chase engaged");
            state.phase = ChasePhase::Chasing;
            state.clear_path();
            transitions.push(Transition::Engaged);
        }

        if state.phase == ChasePhase::Chasing {
            if in_contact(state.config.stop_condition, position, target, facing, bounds) {
                stop_on_contact(state, position);
                transitions.push(Transition::Stopped(StopReason::Contact));
                return Ok(TickReport {
                    transitions,
                    action: TickAction::Idle,
                });
            }

            if disengages_on_range_exit(&state.config) && distance > state.config.range {
                tracing::debug!(%position, %target, distance, "chase disengaged");
                state.phase = ChasePhase::Returning;
                state.clear_path();
                transitions.push(Transition::Disengaged);
            }
        }

        let action = match state.phase {
            ChasePhase::Idle => TickAction::Idle,
            ChasePhase::Chasing => {
                let action = self.chase_step(state, host, position, target)?;
                if let TickAction::Stepped { to, .. } = action {
                    if in_contact(state.config.stop_condition, to, target, facing, bounds) {
                        stop_on_contact(state, to);
                        transitions.push(Transition::Stopped(StopReason::Contact));
                    }
                }
                action
            }
            ChasePhase::Returning => return_step(state, host, rng, position, &mut transitions),
        };

        Ok(TickReport {
            transitions,
            action,
        })
    }

    fn chase_step<H>(
        &self,
        state: &mut ChaseState,
        host: &mut H,
        position: Cell,
        target: Cell,
    ) -> Result<TickAction, ChaseError>
    where
        H: ChaseHost + ?Sized,
    {
        if needs_repath(state, &*host, position, target) {
            let search = match self.search_budget {
                Some(budget) => find_path_within(position, target, &*host, budget),
                None => find_path(position, target, &*host),
            };
            match search {
                Ok(path) => {
                    tracing::trace!(%position, %target, steps = path.len(), "chase path computed");
                    state.path = Some(path);
                    state.path_goal = Some(target);
                }
                Err(ChaseError::Unreachable { .. }) => {
                    tracing::trace!(%position, %target, "target unreachable");
                    state.clear_path();
                    return Ok(TickAction::Stalled(StallReason::Unreachable));
                }
                Err(error) => return Err(error),
            }
        }

        let Some(direction) = state.path.as_mut().and_then(Path::pop_front) else {
            state.clear_path();
            return Ok(TickAction::Idle);
        };

        if !host.is_passable(position, direction) || !host.move_one_step(direction) {
            tracing::debug!(%position, %direction, "step refused, discarding path");
            state.clear_path();
            return Ok(TickAction::Stalled(StallReason::MoveRefused));
        }

        if state.path.as_ref().is_some_and(Path::is_empty) {
            state.clear_path();
        }

        let to = host.entity_position();
        tracing::trace!(from = %position, %to, %direction, "chase step");
        Ok(TickAction::Stepped {
            direction,
            from: position,
            to,
        })
    }
}

/// Chooses the next step toward `home` for a returning NPC.
///
/// The axis with the larger remaining offset is tried first (horizontal on
/// ties), then the other axis. When both are blocked a passable cardinal
/// direction is drawn uniformly from `rng`. Returns `None` when every
/// direction is blocked or the NPC already stands on `home`.
pub fn home_step<M, R>(from: Cell, home: Cell, map: &M, rng: &mut R) -> Option<Direction>
where
    M: PassabilityMap + ?Sized,
    R: Rng + ?Sized,
{
    if from == home {
        return None;
    }

    let bounds = map.bounds();
    let can_step = |direction: Direction| {
        from.step(direction, bounds).is_some() && map.is_passable(from, direction)
    };

    let dx = i64::from(home.x()) - i64::from(from.x());
    let dy = i64::from(home.y()) - i64::from(from.y());
    let horizontal = match dx.signum() {
        1 => Some(Direction::Right),
        -1 => Some(Direction::Left),
        _ => None,
    };
    let vertical = match dy.signum() {
        1 => Some(Direction::Down),
        -1 => Some(Direction::Up),
        _ => None,
    };
    let preferred = if dx.abs() >= dy.abs() {
        [horizontal, vertical]
    } else {
        [vertical, horizontal]
    };

    if let Some(direction) = preferred.into_iter().flatten().find(|d| can_step(*d)) {
        return Some(direction);
    }

    let open: Vec<Direction> = Direction::ALL
        .into_iter()
        .filter(|d| can_step(*d))
        .collect();
    open.choose(rng).copied()
}

fn return_step<H, R>(
    state: &mut ChaseState,
    host: &mut H,
    rng: &mut R,
    position: Cell,
    transitions: &mut Vec<Transition>,
) -> TickAction
where
    H: ChaseHost + ?Sized,
    R: Rng + ?Sized,
{
    if position == state.home {
        arrive_home(state, transitions);
        return TickAction::Idle;
    }

    let Some(direction) = home_step(position, state.home, &*host, rng) else {
        return TickAction::Stalled(StallReason::Boxed);
    };

    if !host.move_one_step(direction) {
        tracing::debug!(%position, %direction, "return step refused");
        return TickAction::Stalled(StallReason::MoveRefused);
    }

    let to = host.entity_position();
    tracing::trace!(from = %position, %to, %direction, "return step");
    if to == state.home {
        arrive_home(state, transitions);
    }
    TickAction::Stepped {
        direction,
        from: position,
        to,
    }
}

fn arrive_home(state: &mut ChaseState, transitions: &mut Vec<Transition>) {
    tracing::debug!(home = %state.home, "returned home");
    state.phase = ChasePhase::Idle;
    transitions.push(Transition::ArrivedHome);
}

fn stop_on_contact(state: &mut ChaseState, position: Cell) {
    tracing::debug!(%position, "chase stopped on contact");
    state.phase = ChasePhase::Idle;
    state.armed = false;
    state.clear_path();
}

fn disengages_on_range_exit(config: &ChaseConfig) -> bool {
    config.on_range_exit == OnRangeExit::Disengage
        && config.stop_condition != StopCondition::ExplicitCommand
}

fn in_contact(
    stop_condition: StopCondition,
    position: Cell,
    target: Cell,
    facing: Direction,
    bounds: GridBounds,
) -> bool {
    match stop_condition {
        StopCondition::Contact => position == target,
        StopCondition::FacedContact => {
            position == target || target.step(facing, bounds) == Some(position)
        }
        StopCondition::RangeExit | StopCondition::ExplicitCommand => false,
    }
}

fn needs_repath<M>(state: &ChaseState, map: &M, position: Cell, target: Cell) -> bool
where
    M: PassabilityMap + ?Sized,
{
    let Some(next) = state.path.as_ref().and_then(Path::front) else {
        return true;
    };
    if !map.is_passable(position, next) {
        return true;
    }
    match state.config.repath {
        Repath::EveryStep => true,
        Repath::OnTargetMove => state.path_goal != Some(target),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use npc_chase_core::PassabilityFn;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(7)
    }

    #[test]
    fn home_step_prefers_larger_offset_axis() {
        let map = PassabilityFn::new(GridBounds::new(6, 6), |_, _| true);
        let home = Cell::new(1, 1);

        assert_eq!(
            home_step(Cell::new(4, 2), home, &map, &mut rng()),
            Some(Direction::Left)
        );
        assert_eq!(
            home_step(Cell::new(2, 5), home, &map, &mut rng()),
            Some(Direction::Up)
        );
        assert_eq!(
            home_step(Cell::new(3, 3), home, &map, &mut rng()),
            Some(Direction::Left)
        );
        assert_eq!(home_step(home, home, &map, &mut rng()), None);
    }

    #[test]
    fn home_step_falls_back_to_secondary_axis() {
        let bounds = GridBounds::new(6, 6);
        let map = PassabilityFn::new(bounds, |_, direction: Direction| {
            direction != Direction::Left
        });

        assert_eq!(
            home_step(Cell::new(4, 3), Cell::new(1, 1), &map, &mut rng()),
            Some(Direction::Up)
        );
    }

    #[test]
    fn home_step_picks_random_open_direction_when_boxed_toward_home() {
        let bounds = GridBounds::new(6, 6);
        let map = PassabilityFn::new(bounds, |_, direction: Direction| {
            matches!(direction, Direction::Right | Direction::Down)
        });

        let mut seeded = rng();
        for _ in 0..32 {
            let choice = home_step(Cell::new(3, 3), Cell::new(1, 1), &map, &mut seeded);
            assert!(matches!(choice, Some(Direction::Right | Direction::Down)));
        }

        let first: Vec<_> = (0..8)
            .scan(rng(), |r, _| {
                Some(home_step(Cell::new(3, 3), Cell::new(1, 1), &map, r))
            })
            .collect();
        let second: Vec<_> = (0..8)
            .scan(rng(), |r, _| {
                Some(home_step(Cell::new(3, 3), Cell::new(1, 1), &map, r))
            })
            .collect();
        assert_eq!(first, second, "seeded fallback must be reproducible");
    }

    #[test]
    fn home_step_reports_fully_boxed_npc() {
        let map = PassabilityFn::new(GridBounds::new(3, 3), |_, _| false);
        assert_eq!(home_step(Cell::new(1, 1), Cell::new(0, 0), &map, &mut rng()), None);
    }

    #[test]
    fn contact_requires_the_target_cell() {
        let bounds = GridBounds::new(5, 5);
        let target = Cell::new(2, 2);
        let faced = Cell::new(2, 1);
        assert!(in_contact(StopCondition::Contact, target, target, Direction::Up, bounds));
        assert!(!in_contact(StopCondition::Contact, faced, target, Direction::Up, bounds));
        assert!(!in_contact(StopCondition::RangeExit, target, target, Direction::Up, bounds));
    }

    #[test]
    fn faced_contact_includes_cell_the_target_faces() {
        let bounds = GridBounds::new(5, 5);
        let target = Cell::new(2, 2);
        let faced = StopCondition::FacedContact;
        assert!(in_contact(faced, target, target, Direction::Up, bounds));
        assert!(in_contact(faced, Cell::new(2, 1), target, Direction::Up, bounds));
        assert!(!in_contact(faced, Cell::new(2, 3), target, Direction::Up, bounds));
    }

    #[test]
    fn home_outside_bounds_is_rejected() {
        let bounds = GridBounds::new(4, 4);
        assert_eq!(
            ChaseState::new(Cell::new(4, 0), ChaseConfig::default(), bounds),
            Err(ChaseError::OutOfBounds {
                role: CellRole::Home,
                cell: Cell::new(4, 0),
                bounds,
            })
        );
    }

    #[test]
    fn stop_chase_turns_a_chaser_around() {
        let mut state =
            ChaseState::new(Cell::new(0, 0), ChaseConfig::default(), GridBounds::new(4, 4))
                .expect("home in bounds");
        state.begin_chase(2);
        state.phase = ChasePhase::Chasing;
        state.path = Some([Direction::Right].into_iter().collect());

        state.stop_chase();

        assert_eq!(state.phase(), ChasePhase::Returning);
        assert!(!state.is_armed());
        assert!(state.path().is_none());
        assert_eq!(state.range(), 2);
    }
}
