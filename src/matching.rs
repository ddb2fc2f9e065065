//! Cross-Block Matcher (component E): pairs chains from one block with
//! chains from its paired successor block onto the same vehicle, via
//! maximum-weight bipartite matching, formulated as a min-cost assignment
//! LP on `good_lp` (the same `SolverModel`/`microlp` pairing the Chain
//! Optimizer uses in `chain::ilp`) rather than a hand-rolled solver.

use good_lp::{constraint, solvers::microlp::microlp, variable, variables, Expression, Solution, SolverModel, Variable};

use crate::config::OptimizationOptions;
use crate::haversine::GreatCircleEstimator;
use crate::model::{Chain, RouteJob};
use crate::router::{resolve_or_fallback, TravelTimeProvider};

const SENTINEL_COST: f64 = 1.0e6;
const BINARY_THRESHOLD: f64 = 0.5;

/// `matches[i] == Some(j)` means `left[i]` and `right[j]` run on one
/// vehicle; `None` means `left[i]` stays its own vehicle.
pub fn match_chains(
    left: &[Chain],
    left_jobs: &[RouteJob],
    right: &[Chain],
    right_jobs: &[RouteJob],
    provider: &dyn TravelTimeProvider,
    estimator: &GreatCircleEstimator,
    options: &OptimizationOptions,
) -> Vec<Option<usize>> {
    let n = left.len();
    let m = right.len();
    if n == 0 || m == 0 {
        return vec![None; n];
    }

    let mut cost = vec![vec![0.0; n + m]; n + m];
    for (i, row) in cost.iter_mut().enumerate().take(n) {
        for (j, cell) in row.iter_mut().enumerate().take(m) {
            *cell = match matchability_score(&left[i], left_jobs, &right[j], right_jobs, provider, estimator, options) {
                Some(score) => -score,
                None => SENTINEL_COST,
            };
        }
        for (k, cell) in row.iter_mut().enumerate().skip(m) {
            *cell = if k - m == i { 0.0 } else { SENTINEL_COST };
        }
    }
    for (di, row) in cost.iter_mut().enumerate().skip(n) {
        for (j, cell) in row.iter_mut().enumerate().take(m) {
            *cell = if di - n == j { 0.0 } else { SENTINEL_COST };
        }
    }

    let assignment = solve_assignment(&cost);
    let mut matches = vec![None; n];
    for (i, &j) in assignment.iter().enumerate().take(n) {
        if j < m {
            matches[i] = Some(j);
        }
    }
    matches
}

fn matchability_score(
    left: &Chain,
    left_jobs: &[RouteJob],
    right: &Chain,
    right_jobs: &[RouteJob],
    provider: &dyn TravelTimeProvider,
    estimator: &GreatCircleEstimator,
    options: &OptimizationOptions,
) -> Option<f64> {
    let end_job = &left_jobs[left.last().job_index];
    let start_job = &right_jobs[right.first().job_index];

    let travel = resolve_or_fallback(provider, estimator, end_job.end_location, start_job.start_location);
    let gap = right.first().realized_start - left.last().realized_end;
    if gap < travel as i32 + options.min_buffer_minutes {
        return None;
    }

    let cap_left = chain_max_capacity(left, left_jobs);
    let cap_right = chain_max_capacity(right, right_jobs);
    let cap_diff = cap_left.abs_diff(cap_right);
    if cap_diff > options.capacity_max_diff {
        return None;
    }

    let same_school = end_job.route.school_id == start_job.route.school_id;
    let mut score = 10.0;
    if same_school {
        score += 12.0;
    }
    if cap_diff <= 5 {
        score += 4.0;
    }
    if cap_diff > 20 {
        score -= 8.0;
    }
    Some(score)
}

fn chain_max_capacity(chain: &Chain, jobs: &[RouteJob]) -> u32 {
    chain.links.iter().map(|link| jobs[link.job_index].capacity()).max().unwrap_or(0)
}

/// Minimum-cost assignment on a square `cost` matrix, via the same
/// `good_lp`/`microlp` pairing `chain::ilp` uses: one binary variable per
/// cell, a row-sum and a column-sum equality constraint per index. A
/// square assignment polytope is always feasible (the identity permutation
/// satisfies every constraint), so a solver failure here means a genuine
/// solver-internal problem rather than an infeasible instance — handled by
/// falling back to the identity assignment rather than panicking, the same
/// posture the Router Client takes toward any single failed call.
fn solve_assignment(cost: &[Vec<f64>]) -> Vec<usize> {
    let n = cost.len();
    if n == 0 {
        return Vec::new();
    }

    let mut vars = variables!();
    let z: Vec<Vec<Variable>> = (0..n).map(|_| (0..n).map(|_| vars.add(variable().binary())).collect()).collect();

    let objective = (0..n)
        .flat_map(|i| (0..n).map(move |j| (i, j)))
        .fold(Expression::from(0.0), |acc, (i, j)| acc + cost[i][j] * z[i][j]);

    let mut problem = vars.minimise(objective).using(microlp);
    for i in 0..n {
        let row = (0..n).fold(Expression::from(0.0), |acc, j| acc + z[i][j]);
        problem = problem.with(constraint!(row == 1));
    }
    for j in 0..n {
        let col = (0..n).fold(Expression::from(0.0), |acc, i| acc + z[i][j]);
        problem = problem.with(constraint!(col == 1));
    }

    match problem.solve() {
        Ok(solution) => (0..n)
            .map(|i| (0..n).find(|&j| solution.value(z[i][j]) > BINARY_THRESHOLD).unwrap_or(i))
            .collect(),
        Err(_) => {
            tracing::warn!(n, "assignment solve failed unexpectedly; falling back to identity assignment");
            (0..n).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Block, ChainLink, Route, RouteType, ServiceDays, Stop};
    use std::sync::Arc;

    struct StubProvider;
    impl TravelTimeProvider for StubProvider {
        fn travel_time(&self, _a: (f64, f64), _b: (f64, f64)) -> crate::router::TravelTime {
            crate::router::TravelTime::Minutes(0)
        }
        fn travel_matrix(
            &self,
            sources: &[(f64, f64)],
            destinations: &[(f64, f64)],
            _token: &crate::cancellation::CancellationToken,
        ) -> Vec<Vec<crate::router::TravelTime>> {
            vec![vec![crate::router::TravelTime::Minutes(0); destinations.len()]; sources.len()]
        }
        fn geometry(&self, _a: (f64, f64), _b: (f64, f64)) -> Option<crate::router::Polyline> {
            None
        }
    }

    fn entry_job(arrival: i32) -> RouteJob {
        let stops = vec![
            Stop::new(42.5, -8.7, 0, 0, Some(10), true).unwrap(),
            Stop::new(42.5, -8.7, 1, 30, Some(10), true).unwrap(),
        ];
        let route =
            Arc::new(Route::new("r1", stops, RouteType::Entry, "E1", "School", "C1", 40, ServiceDays::all(), Some(arrival), None).unwrap());
        RouteJob::from_route(route, Block::EntryMorning, arrival)
    }

    fn exit_job(departure: i32) -> RouteJob {
        let stops = vec![
            Stop::new(42.5, -8.7, 0, 0, Some(10), true).unwrap(),
            Stop::new(42.5, -8.7, 1, 20, Some(10), true).unwrap(),
        ];
        let route =
            Arc::new(Route::new("r2", stops, RouteType::Exit, "E1", "School", "C1", 42, ServiceDays::all(), None, Some(departure)).unwrap());
        RouteJob::from_route(route, Block::ExitMidday, departure)
    }

    #[test]
    fn matches_cross_block_chains_at_same_location() {
        // S3 scenario: entry chain ends 08:30 at L, exit chain starts 13:00 at L.
        let left_jobs = vec![entry_job(510)]; // arrival 08:30
        let right_jobs = vec![exit_job(780)]; // departure 13:00
        let left_chains = vec![Chain {
            block: Block::EntryMorning,
            links: vec![ChainLink { job_index: 0, realized_start: 480, realized_end: 510 }],
        }];
        let right_chains = vec![Chain {
            block: Block::ExitMidday,
            links: vec![ChainLink { job_index: 0, realized_start: 780, realized_end: 800 }],
        }];

        let matches = match_chains(
            &left_chains,
            &left_jobs,
            &right_chains,
            &right_jobs,
            &StubProvider,
            &GreatCircleEstimator::default(),
            &OptimizationOptions::default(),
        );
        assert_eq!(matches, vec![Some(0)]);
    }

    #[test]
    fn solve_assignment_picks_minimum_cost_assignment() {
        let cost = vec![vec![4.0, 2.0, 8.0], vec![4.0, 3.0, 7.0], vec![3.0, 1.0, 6.0]];
        let assignment = solve_assignment(&cost);
        let total: f64 = assignment.iter().enumerate().map(|(i, &j)| cost[i][j]).sum();
        assert_eq!(total, 12.0);
        let mut seen = assignment.clone();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2]);
    }
}
