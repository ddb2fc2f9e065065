//! Feasibility Builder (component C): which ordered job pairs may appear
//! consecutively on one vehicle within a block, and the quality score used
//! by both the ILP objective and the greedy fallback's tie-break.

use std::collections::{HashMap, HashSet};

use crate::config::OptimizationOptions;
use crate::model::{Block, RouteJob, TravelMatrix};

/// A block's feasibility predicate: derived once from its jobs and travel
/// matrix, never mutated afterward.
#[derive(Debug, Clone)]
pub struct Feasibility {
    allowed: HashSet<(usize, usize)>,
    scores: HashMap<(usize, usize), f64>,
}

impl Feasibility {
    pub fn is_feasible(&self, i: usize, j: usize) -> bool {
        self.allowed.contains(&(i, j))
    }

    /// Score in `[0, 1]`; only meaningful for feasible pairs.
    pub fn score(&self, i: usize, j: usize) -> f64 {
        self.scores.get(&(i, j)).copied().unwrap_or(0.0)
    }

    pub fn successors(&self, i: usize) -> impl Iterator<Item = usize> + '_ {
        self.allowed.iter().filter(move |&&(from, _)| from == i).map(|&(_, to)| to)
    }

    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.allowed.iter().copied()
    }
}

/// Builds the feasibility predicate and score table for one block's jobs.
pub fn build(jobs: &[RouteJob], matrix: &TravelMatrix, block: Block, options: &OptimizationOptions) -> Feasibility {
    let (lower, upper) = options.shift_bounds(block.route_type());
    let min_buffer = options.min_buffer_minutes;

    let mut allowed = HashSet::new();
    let mut scores = HashMap::new();

    for i in 0..jobs.len() {
        for j in 0..jobs.len() {
            if i == j {
                continue;
            }
            let Some(travel) = matrix.get(i, j) else { continue };

            let cap_diff = jobs[i].capacity().abs_diff(jobs[j].capacity());
            if cap_diff > options.capacity_max_diff {
                continue;
            }

            let needed = travel as i32 + jobs[j].duration() + min_buffer;
            let gap = jobs[j].scheduled_start_min - jobs[i].scheduled_end_min;
            if gap < needed - (upper - lower) {
                continue;
            }

            allowed.insert((i, j));
            scores.insert((i, j), pair_score(&jobs[i], &jobs[j], cap_diff, gap, needed));
        }
    }

    Feasibility { allowed, scores }
}

fn pair_score(a: &RouteJob, b: &RouteJob, cap_diff: u32, gap: i32, needed: i32) -> f64 {
    let mut score = 0.0;
    if a.route.school_id == b.route.school_id {
        score += 0.4;
    }
    if a.route.contract_id == b.route.contract_id {
        score += 0.2;
    }
    if cap_diff <= 5 {
        score += 0.2;
    }
    let slack = (gap - needed).max(0) as f64;
    score += 0.2 * (1.0 - slack / 30.0).max(0.0);
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Route, RouteType, ServiceDays, Stop};
    use std::sync::Arc;

    fn job(id: &str, school: &str, contract: &str, capacity: u32, start: i32, end: i32, duration: i32) -> RouteJob {
        let stops = vec![
            Stop::new(42.5, -8.7, 0, 0, Some(10), true).unwrap(),
            Stop::new(42.6, -8.8, 1, duration, Some(10), true).unwrap(),
        ];
        let route = Arc::new(
            Route::new(id, stops, RouteType::Entry, school, "School", contract, capacity, ServiceDays::all(), Some(end), None)
                .unwrap(),
        );
        let mut job = RouteJob::from_route(route, Block::EntryMorning, end);
        job.scheduled_start_min = start;
        job.scheduled_end_min = end;
        job
    }

    fn options() -> OptimizationOptions {
        OptimizationOptions::default()
    }

    #[test]
    fn rejects_self_pair() {
        let jobs = vec![job("a", "S1", "C1", 40, 0, 20, 20)];
        let mut matrix = TravelMatrix::new();
        matrix.set(0, 0, 0);
        let feas = build(&jobs, &matrix, Block::EntryMorning, &options());
        assert!(!feas.is_feasible(0, 0));
    }

    #[test]
    fn rejects_missing_travel_entry() {
        let jobs = vec![job("a", "S1", "C1", 40, 0, 20, 20), job("b", "S1", "C1", 40, 50, 70, 15)];
        let matrix = TravelMatrix::new();
        let feas = build(&jobs, &matrix, Block::EntryMorning, &options());
        assert!(!feas.is_feasible(0, 1));
    }

    #[test]
    fn accepts_chainable_pair_within_shift_budget() {
        // S1 scenario: R1 ends 08:00 (480), R2 starts earlier-ish with 45 min gap and 3 min travel.
        let jobs = vec![job("r1", "E1", "C1", 40, 460, 480, 20), job("r2", "E1", "C1", 42, 525, 540, 15)];
        let mut matrix = TravelMatrix::new();
        matrix.set(0, 1, 3);
        let feas = build(&jobs, &matrix, Block::EntryMorning, &options());
        assert!(feas.is_feasible(0, 1));
        assert!(feas.score(0, 1) > 0.5);
    }

    #[test]
    fn rejects_capacity_mismatch() {
        let jobs = vec![job("r1", "E1", "C1", 20, 0, 20, 20), job("r2", "E1", "C1", 55, 50, 70, 15)];
        let mut matrix = TravelMatrix::new();
        matrix.set(0, 1, 3);
        let feas = build(&jobs, &matrix, Block::EntryMorning, &options());
        assert!(!feas.is_feasible(0, 1));
    }

    #[test]
    fn rejects_insufficient_time_even_with_shift_budget() {
        // S2 scenario: needed = 3+15+5=23, available gap = 10, shift budget total 10 (5+5).
        let jobs = vec![job("r1", "E1", "C1", 40, 460, 480, 20), job("r2", "E1", "C1", 42, 475, 490, 15)];
        let mut matrix = TravelMatrix::new();
        matrix.set(0, 1, 3);
        let feas = build(&jobs, &matrix, Block::EntryMorning, &options());
        assert!(!feas.is_feasible(0, 1));
    }
}
