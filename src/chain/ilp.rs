//! Chain Optimizer — ILP formulation (§4.D), built on `good_lp`'s
//! `SolverModel` trait wired to the pure-Rust `microlp` backend.
//!
//! `good_lp::SolverModel` realizes the pluggable-solver interface the
//! design calls for literally: any backend implementing it can be swapped
//! in at the `.using(...)` call without touching this module.

use std::collections::HashMap;
use std::time::Instant;

use good_lp::{constraint, solvers::microlp::microlp, variable, variables, Expression, Solution, SolverModel, Variable};

use crate::config::OptimizationOptions;
use crate::feasibility::Feasibility;
use crate::model::{Block, Chain, ChainLink, RouteJob, RouteType, TravelMatrix};

const BIG_M: f64 = 2880.0; // 24h * 2 minutes, per §4.D
const CHAIN_START_WEIGHT: f64 = 10_000.0;
const BINARY_THRESHOLD: f64 = 0.5;

#[derive(Debug)]
pub enum IlpOutcome {
    Infeasible,
    TimedOut(Option<Vec<Chain>>),
}

/// Solves one block's chain cover. `Ok` on optimal/feasible solve within
/// the time limit; `Err(TimedOut(Some(..)))` when the solve overran
/// `options.ilp_time_limit()` but still returned an incumbent worth
/// keeping; `Err(Infeasible)` when the solver reports no solution at all.
pub fn solve_block(
    block: Block,
    jobs: &[RouteJob],
    matrix: &TravelMatrix,
    feasibility: &Feasibility,
    options: &OptimizationOptions,
) -> Result<Vec<Chain>, IlpOutcome> {
    let n = jobs.len();
    // Sorted so variable creation order (and therefore which optimum the
    // solver lands on among ties) is stable across runs — `Feasibility`
    // stores pairs in a `HashSet`, whose iteration order is not (§5, §8 P5).
    let mut pairs: Vec<(usize, usize)> = feasibility.pairs().collect();
    pairs.sort_unstable();
    let (lower, upper) = options.shift_bounds(block.route_type());
    let min_buffer = options.min_buffer_minutes as f64;

    let mut vars = variables!();
    let x: Vec<Variable> = pairs.iter().map(|_| vars.add(variable().binary())).collect();
    let y: Vec<Variable> = (0..n).map(|_| vars.add(variable().binary())).collect();
    let a: Vec<Variable> = (0..n)
        .map(|i| {
            let anchor = anchor_value(block, &jobs[i]) as f64;
            vars.add(variable().min(anchor + lower as f64).max(anchor + upper as f64))
        })
        .collect();

    let objective = y
        .iter()
        .fold(Expression::from(0.0), |acc, &yi| acc + CHAIN_START_WEIGHT * yi)
        + pairs
            .iter()
            .enumerate()
            .fold(Expression::from(0.0), |acc, (k, &(i, j))| acc + (1.0 - feasibility.score(i, j)) * x[k]);

    let mut problem = vars.minimise(objective).using(microlp);

    for i in 0..n {
        let preds = pairs
            .iter()
            .enumerate()
            .filter(|&(_, &(_, to))| to == i)
            .fold(Expression::from(0.0), |acc, (k, _)| acc + x[k]);
        problem = problem.with(constraint!(preds.clone() <= 1));
        problem = problem.with(constraint!(y[i] + preds >= 1));

        let succs = pairs
            .iter()
            .enumerate()
            .filter(|&(_, &(from, _))| from == i)
            .fold(Expression::from(0.0), |acc, (k, _)| acc + x[k]);
        problem = problem.with(constraint!(succs <= 1));
    }

    for (k, &(i, j)) in pairs.iter().enumerate() {
        let Some(travel) = matrix.get(i, j) else { continue };
        let needed = travel as f64 + jobs[j].duration() as f64 + min_buffer;
        problem = problem.with(constraint!(a[j] - a[i] + BIG_M - BIG_M * x[k] >= needed));
    }

    let start = Instant::now();
    let result = problem.solve();
    let elapsed = start.elapsed();

    match result {
        Ok(solution) => {
            let chains = extract_chains(block, jobs, &pairs, &x, &y, &a, &solution);
            if elapsed > options.ilp_time_limit() {
                Err(IlpOutcome::TimedOut(Some(chains)))
            } else {
                Ok(chains)
            }
        }
        Err(_) => Err(IlpOutcome::Infeasible),
    }
}

fn anchor_value(block: Block, job: &RouteJob) -> i32 {
    match block.route_type() {
        RouteType::Entry => job.scheduled_end_min,
        RouteType::Exit => job.scheduled_start_min,
    }
}

fn extract_chains(
    block: Block,
    jobs: &[RouteJob],
    pairs: &[(usize, usize)],
    x: &[Variable],
    y: &[Variable],
    a: &[Variable],
    solution: &impl Solution,
) -> Vec<Chain> {
    let successor: HashMap<usize, usize> = pairs
        .iter()
        .zip(x.iter())
        .filter(|&(_, &var)| solution.value(var) > BINARY_THRESHOLD)
        .map(|(&(i, j), _)| (i, j))
        .collect();

    let mut chains = Vec::new();
    for i in 0..jobs.len() {
        if solution.value(y[i]) <= BINARY_THRESHOLD {
            continue;
        }
        let mut links = Vec::new();
        let mut cur = i;
        loop {
            let realized = solution.value(a[cur]).round() as i32;
            let (realized_start, realized_end) = match block.route_type() {
                RouteType::Entry => (realized - jobs[cur].duration(), realized),
                RouteType::Exit => (realized, realized + jobs[cur].duration()),
            };
            links.push(ChainLink { job_index: cur, realized_start, realized_end });
            match successor.get(&cur) {
                Some(&next) => cur = next,
                None => break,
            }
        }
        chains.push(Chain { block, links });
    }
    chains
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Route, ServiceDays, Stop};
    use std::sync::Arc;

    fn job(id: &str, arrival: i32, duration: i32) -> RouteJob {
        let stops = vec![
            Stop::new(42.5, -8.7, 0, 0, Some(10), true).unwrap(),
            Stop::new(42.6, -8.8, 1, duration, Some(10), true).unwrap(),
        ];
        let route = Arc::new(
            Route::new(id, stops, RouteType::Entry, "E1", "School", "C1", 40, ServiceDays::all(), Some(arrival), None)
                .unwrap(),
        );
        RouteJob::from_route(route, Block::EntryMorning, arrival)
    }

    #[test]
    fn solves_two_job_chain_optimally() {
        let jobs = vec![job("r1", 480, 20), job("r2", 540, 15)];
        let mut matrix = TravelMatrix::new();
        matrix.set(0, 1, 3);
        let options = OptimizationOptions::default();
        let feas = crate::feasibility::build(&jobs, &matrix, Block::EntryMorning, &options);
        let chains = solve_block(Block::EntryMorning, &jobs, &matrix, &feas, &options).unwrap();
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0].links.len(), 2);
    }

    #[test]
    fn reports_infeasible_as_error_when_no_pairs_exist() {
        let jobs = vec![job("r1", 480, 20), job("r2", 490, 15)];
        let matrix = TravelMatrix::new();
        let options = OptimizationOptions::default();
        let feas = crate::feasibility::build(&jobs, &matrix, Block::EntryMorning, &options);
        // No feasible pairs: the ILP still solves trivially (each job its own chain).
        let chains = solve_block(Block::EntryMorning, &jobs, &matrix, &feas, &options).unwrap();
        assert_eq!(chains.len(), 2);
    }
}
