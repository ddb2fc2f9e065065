//! Core data model: stops, routes, derived jobs, chains, and schedules.
//!
//! Types here follow the construct-once-then-immutable discipline described
//! in the design notes: `Route`/`Stop` are validated at construction and
//! never mutated afterward, and derived per-optimization state (`RouteJob`,
//! `Chain`) carries its own scratch fields rather than being bolted onto the
//! source records.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Minutes since midnight, signed so that shifted/realized times and
/// deadhead deltas can be negative during intermediate computation.
pub type Minutes = i32;

/// A point along a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub lat: f64,
    pub lon: f64,
    /// Order index within the owning route, starting at 0.
    pub order: usize,
    /// Minutes from the route's first stop.
    pub minutes_from_start: Minutes,
    pub passenger_count: Option<u32>,
    pub school_flag: bool,
}

impl Stop {
    pub fn new(
        lat: f64,
        lon: f64,
        order: usize,
        minutes_from_start: Minutes,
        passenger_count: Option<u32>,
        school_flag: bool,
    ) -> Result<Self, ModelError> {
        if minutes_from_start < 0 {
            return Err(ModelError::NegativeOffset { order });
        }
        Ok(Self {
            lat,
            lon,
            order,
            minutes_from_start,
            passenger_count,
            school_flag,
        })
    }

    pub fn location(&self) -> (f64, f64) {
        (self.lat, self.lon)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteType {
    Entry,
    Exit,
}

/// Five-day service calendar, stored as a bitmask (Mon = bit 0 .. Fri = bit 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDays(u8);

impl ServiceDays {
    pub const MON: u8 = 1 << 0;
    pub const TUE: u8 = 1 << 1;
    pub const WED: u8 = 1 << 2;
    pub const THU: u8 = 1 << 3;
    pub const FRI: u8 = 1 << 4;

    pub fn new(mask: u8) -> Self {
        Self(mask & 0b0001_1111)
    }

    pub fn all() -> Self {
        Self(Self::MON | Self::TUE | Self::WED | Self::THU | Self::FRI)
    }

    pub fn none() -> Self {
        Self(0)
    }

    pub fn contains(&self, day: Weekday) -> bool {
        self.0 & (day as u8) != 0
    }
}

/// A single weekday, used to query a [`ServiceDays`] calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Weekday {
    Mon = ServiceDays::MON as isize,
    Tue = ServiceDays::TUE as isize,
    Wed = ServiceDays::WED as isize,
    Thu = ServiceDays::THU as isize,
    Fri = ServiceDays::FRI as isize,
}

/// A fixed passenger route: an ordered, non-empty chain of stops plus the
/// scheduling metadata needed to place it on a vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: String,
    pub stops: Vec<Stop>,
    pub route_type: RouteType,
    pub school_id: String,
    pub school_name: String,
    pub contract_id: String,
    pub capacity: u32,
    pub service_days: ServiceDays,
    /// Set only when `route_type == Entry`. `None` means the route is
    /// missing its anchor time and will be excluded during block
    /// partitioning (see `blocks::partition`).
    pub arrival_time: Option<Minutes>,
    /// Set only when `route_type == Exit`. `None` means the route is
    /// missing its anchor time.
    pub departure_time: Option<Minutes>,
}

impl Route {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: impl Into<String>,
        stops: Vec<Stop>,
        route_type: RouteType,
        school_id: impl Into<String>,
        school_name: impl Into<String>,
        contract_id: impl Into<String>,
        capacity: u32,
        service_days: ServiceDays,
        arrival_time: Option<Minutes>,
        departure_time: Option<Minutes>,
    ) -> Result<Self, ModelError> {
        let id = id.into();
        if stops.is_empty() {
            return Err(ModelError::EmptyRoute { route_id: id });
        }
        if capacity == 0 {
            return Err(ModelError::InvalidCapacity { route_id: id });
        }
        match route_type {
            RouteType::Entry if departure_time.is_some() => {
                return Err(ModelError::WrongAnchorField { route_id: id });
            }
            RouteType::Exit if arrival_time.is_some() => {
                return Err(ModelError::WrongAnchorField { route_id: id });
            }
            _ => {}
        }
        let mut ordered = stops;
        ordered.sort_by_key(|s| s.order);
        for (i, stop) in ordered.iter().enumerate() {
            if stop.order != i {
                return Err(ModelError::NonContiguousStops { route_id: id });
            }
        }
        Ok(Self {
            id,
            stops: ordered,
            route_type,
            school_id: school_id.into(),
            school_name: school_name.into(),
            contract_id: contract_id.into(),
            capacity,
            service_days,
            arrival_time,
            departure_time,
        })
    }

    /// Geographic duration of the route: the last stop's offset from the
    /// first. Invariant: this equals `last_stop.minutes_from_start`.
    pub fn duration(&self) -> Minutes {
        self.stops.last().map(|s| s.minutes_from_start).unwrap_or(0)
    }

    pub fn first_stop(&self) -> &Stop {
        &self.stops[0]
    }

    pub fn last_stop(&self) -> &Stop {
        self.stops.last().expect("route is non-empty")
    }

    /// The anchor time relevant to this route's type, or `None` if missing.
    pub fn anchor_time(&self) -> Option<Minutes> {
        match self.route_type {
            RouteType::Entry => self.arrival_time,
            RouteType::Exit => self.departure_time,
        }
    }

    pub fn active_on(&self, day: Weekday) -> bool {
        self.service_days.contains(day)
    }
}

/// Which of the four temporal blocks a route falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Block {
    EntryMorning = 1,
    ExitMidday = 2,
    EntryAfternoon = 3,
    ExitEvening = 4,
}

impl Block {
    pub fn route_type(self) -> RouteType {
        match self {
            Block::EntryMorning | Block::EntryAfternoon => RouteType::Entry,
            Block::ExitMidday | Block::ExitEvening => RouteType::Exit,
        }
    }

    pub fn all() -> [Block; 4] {
        [
            Block::EntryMorning,
            Block::ExitMidday,
            Block::EntryAfternoon,
            Block::ExitEvening,
        ]
    }

    /// Paired predecessor block for cross-block matching (1->2, 3->4).
    /// Returns `None` for blocks 2 and 4, which are never a predecessor.
    pub fn cross_block_partner(self) -> Option<Block> {
        match self {
            Block::EntryMorning => Some(Block::ExitMidday),
            Block::EntryAfternoon => Some(Block::ExitEvening),
            _ => None,
        }
    }
}

/// A `Route` augmented with realized scheduling fields for one block.
#[derive(Debug, Clone)]
pub struct RouteJob {
    pub route: Arc<Route>,
    pub block: Block,
    pub scheduled_start_min: Minutes,
    pub scheduled_end_min: Minutes,
    pub start_location: (f64, f64),
    pub end_location: (f64, f64),
}

impl RouteJob {
    pub fn from_route(route: Arc<Route>, block: Block, anchor: Minutes) -> Self {
        let duration = route.duration();
        let (scheduled_start_min, scheduled_end_min) = match route.route_type {
            RouteType::Entry => (anchor - duration, anchor),
            RouteType::Exit => (anchor, anchor + duration),
        };
        Self {
            start_location: route.first_stop().location(),
            end_location: route.last_stop().location(),
            route,
            block,
            scheduled_start_min,
            scheduled_end_min,
        }
    }

    pub fn route_id(&self) -> &str {
        &self.route.id
    }

    pub fn capacity(&self) -> u32 {
        self.route.capacity
    }

    pub fn duration(&self) -> Minutes {
        self.route.duration()
    }
}

/// Sparse inter-job travel time matrix for one block, indexed by position
/// within that block's job list.
#[derive(Debug, Clone, Default)]
pub struct TravelMatrix {
    minutes: std::collections::HashMap<(usize, usize), u32>,
}

impl TravelMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, from: usize, to: usize, minutes: u32) {
        self.minutes.insert((from, to), minutes);
    }

    pub fn get(&self, from: usize, to: usize) -> Option<u32> {
        self.minutes.get(&(from, to)).copied()
    }
}

/// One realized link in a chain: which job, and its realized times after
/// applying any within-bounds shift.
#[derive(Debug, Clone)]
pub struct ChainLink {
    pub job_index: usize,
    pub realized_start: Minutes,
    pub realized_end: Minutes,
}

/// An ordered, non-empty sequence of jobs assigned to run back-to-back on
/// one vehicle within a single block.
#[derive(Debug, Clone)]
pub struct Chain {
    pub block: Block,
    pub links: Vec<ChainLink>,
}

impl Chain {
    pub fn first(&self) -> &ChainLink {
        &self.links[0]
    }

    pub fn last(&self) -> &ChainLink {
        self.links.last().expect("chain is non-empty")
    }
}

/// A chain link rendered for output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleItem {
    pub route_id: String,
    pub start_time: Minutes,
    pub end_time: Minutes,
    /// Signed minutes vs. the route's original anchor time.
    pub shift_applied: Minutes,
    /// Deadhead minutes from the previous item on this vehicle (0 for the
    /// first item).
    pub deadhead_minutes: Minutes,
}

/// All work assigned to one synthesized vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusSchedule {
    pub vehicle_id: String,
    pub items: Vec<ScheduleItem>,
    pub capacity: Option<u32>,
}

impl BusSchedule {
    /// Checks the invariant that items, sorted by `start_time`, never
    /// overlap: `items[k].end_time <= items[k+1].start_time`.
    pub fn is_non_overlapping(&self) -> bool {
        self.items
            .windows(2)
            .all(|pair| pair[0].end_time <= pair[1].start_time)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnassignedReason {
    MissingAnchor,
    NoFeasibleChain,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnassignedRoute {
    pub route_id: String,
    pub reason: UnassignedReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Ok,
    OkWithUnassigned,
    PartialTimeout,
    Timeout,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverStatus {
    Optimal,
    Feasible,
    Infeasible,
    Unbounded,
    TimedOut,
    GreedyFallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockDiagnostic {
    pub block: Block,
    pub job_count: usize,
    pub chain_count: usize,
    pub solver_status: SolverStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterStatsSnapshot {
    pub requests: u64,
    pub cache_hits: u64,
    pub api_errors: u64,
    pub breaker_openings: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostics {
    pub total_routes: usize,
    pub assigned_routes: usize,
    pub unassigned_routes: usize,
    pub vehicle_count: usize,
    pub local_search_passes_run: usize,
    pub local_search_moves_accepted: usize,
    pub blocks: Vec<BlockDiagnostic>,
    pub router_stats: RouterStatsSnapshot,
    pub status: JobStatus,
}

/// Output of one optimization run. Produced once, immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub schedules: Vec<BusSchedule>,
    pub unassigned: Vec<UnassignedRoute>,
    pub diagnostics: Diagnostics,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stop(order: usize, minutes: Minutes) -> Stop {
        Stop::new(42.5, -8.7, order, minutes, Some(10), true).unwrap()
    }

    #[test]
    fn route_rejects_empty_stops() {
        let err = Route::new(
            "r1",
            vec![],
            RouteType::Entry,
            "S1",
            "School",
            "C1",
            40,
            ServiceDays::all(),
            Some(480),
            None,
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::EmptyRoute { .. }));
    }

    #[test]
    fn route_rejects_wrong_anchor_field() {
        let err = Route::new(
            "r1",
            vec![stop(0, 0), stop(1, 20)],
            RouteType::Entry,
            "S1",
            "School",
            "C1",
            40,
            ServiceDays::all(),
            Some(480),
            Some(500),
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::WrongAnchorField { .. }));
    }

    #[test]
    fn route_allows_missing_anchor() {
        let route = Route::new(
            "r1",
            vec![stop(0, 0), stop(1, 20)],
            RouteType::Entry,
            "S1",
            "School",
            "C1",
            40,
            ServiceDays::all(),
            None,
            None,
        )
        .unwrap();
        assert_eq!(route.anchor_time(), None);
    }

    #[test]
    fn duration_is_last_stop_offset() {
        let route = Route::new(
            "r1",
            vec![stop(0, 0), stop(1, 20)],
            RouteType::Entry,
            "S1",
            "School",
            "C1",
            40,
            ServiceDays::all(),
            Some(800),
            None,
        )
        .unwrap();
        assert_eq!(route.duration(), 20);
    }

    #[test]
    fn service_days_contains() {
        let days = ServiceDays::new(ServiceDays::MON | ServiceDays::WED);
        assert!(days.contains(Weekday::Mon));
        assert!(!days.contains(Weekday::Tue));
        assert!(days.contains(Weekday::Wed));
    }

    #[test]
    fn bus_schedule_overlap_detection() {
        let schedule = BusSchedule {
            vehicle_id: "B-001".into(),
            items: vec![
                ScheduleItem {
                    route_id: "r1".into(),
                    start_time: 0,
                    end_time: 20,
                    shift_applied: 0,
                    deadhead_minutes: 0,
                },
                ScheduleItem {
                    route_id: "r2".into(),
                    start_time: 10,
                    end_time: 30,
                    shift_applied: 0,
                    deadhead_minutes: 0,
                },
            ],
            capacity: None,
        };
        assert!(!schedule.is_non_overlapping());
    }
}
