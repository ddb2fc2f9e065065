//! Deterministic greedy chain-cover fallback (§4.D), used when the ILP
//! backend times out, reports infeasible, or is disabled for a test.

use crate::config::OptimizationOptions;
use crate::feasibility::Feasibility;
use crate::model::{Block, Chain, RouteJob, TravelMatrix};

use super::ChainBuildState;

type OrderingFn = fn(&[RouteJob], &Feasibility) -> Vec<usize>;

const ORDERINGS: &[OrderingFn] = &[
    earliest_first,
    latest_first,
    most_connected_first,
    least_connected_first,
    by_school,
    by_duration_descending,
    by_geographic_clustering,
];

pub fn solve_block(
    block: Block,
    jobs: &[RouteJob],
    matrix: &TravelMatrix,
    feasibility: &Feasibility,
    options: &OptimizationOptions,
) -> Vec<Chain> {
    ORDERINGS
        .iter()
        .map(|ordering| build_chains(block, jobs, matrix, feasibility, options, ordering(jobs, feasibility)))
        .min_by(|a, b| a.len().cmp(&b.len()).then_with(|| total_inverse_score(a, feasibility).total_cmp(&total_inverse_score(b, feasibility))))
        .unwrap_or_default()
}

fn total_inverse_score(chains: &[Chain], feasibility: &Feasibility) -> f64 {
    chains
        .iter()
        .flat_map(|c| c.links.windows(2))
        .map(|pair| 1.0 - feasibility.score(pair[0].job_index, pair[1].job_index))
        .sum()
}

fn build_chains(
    block: Block,
    jobs: &[RouteJob],
    matrix: &TravelMatrix,
    feasibility: &Feasibility,
    options: &OptimizationOptions,
    order: Vec<usize>,
) -> Vec<Chain> {
    let (_lower, upper) = options.shift_bounds(block.route_type());
    let min_buffer = options.min_buffer_minutes;
    let mut used = vec![false; jobs.len()];
    let mut chains = Vec::new();

    for &start in &order {
        if used[start] {
            continue;
        }
        used[start] = true;
        let mut state = ChainBuildState {
            job_indices: vec![start],
            realized_start: vec![jobs[start].scheduled_start_min],
            realized_end: vec![jobs[start].scheduled_end_min],
        };

        loop {
            let last = *state.job_indices.last().unwrap();
            let last_end = *state.realized_end.last().unwrap();

            let next = order.iter().copied().find_map(|cand| {
                if used[cand] || !feasibility.is_feasible(last, cand) {
                    return None;
                }
                let travel = matrix.get(last, cand)?;
                let needed_start = last_end + travel as i32 + min_buffer;
                // Only ever shift later, and only as much as required: a job
                // already starting after `needed_start` keeps its original time.
                let shift = (needed_start - jobs[cand].scheduled_start_min).clamp(0, upper);
                let realized_start = jobs[cand].scheduled_start_min + shift;
                if realized_start < needed_start {
                    return None;
                }
                Some((cand, realized_start))
            });

            let Some((next, realized_start)) = next else { break };
            used[next] = true;
            state.job_indices.push(next);
            state.realized_start.push(realized_start);
            state.realized_end.push(realized_start + jobs[next].duration());
        }

        chains.push(state.into_chain(block));
    }

    chains
}

fn earliest_first(jobs: &[RouteJob], _f: &Feasibility) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..jobs.len()).collect();
    idx.sort_by_key(|&i| jobs[i].scheduled_start_min);
    idx
}

fn latest_first(jobs: &[RouteJob], _f: &Feasibility) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..jobs.len()).collect();
    idx.sort_by_key(|&i| std::cmp::Reverse(jobs[i].scheduled_start_min));
    idx
}

fn most_connected_first(jobs: &[RouteJob], f: &Feasibility) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..jobs.len()).collect();
    idx.sort_by_key(|&i| std::cmp::Reverse(f.successors(i).count()));
    idx
}

fn least_connected_first(jobs: &[RouteJob], f: &Feasibility) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..jobs.len()).collect();
    idx.sort_by_key(|&i| f.successors(i).count());
    idx
}

fn by_school(jobs: &[RouteJob], _f: &Feasibility) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..jobs.len()).collect();
    idx.sort_by(|&a, &b| jobs[a].route.school_id.cmp(&jobs[b].route.school_id));
    idx
}

fn by_duration_descending(jobs: &[RouteJob], _f: &Feasibility) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..jobs.len()).collect();
    idx.sort_by_key(|&i| std::cmp::Reverse(jobs[i].duration()));
    idx
}

fn by_geographic_clustering(jobs: &[RouteJob], _f: &Feasibility) -> Vec<usize> {
    const GRID: f64 = 0.05;
    let grid_key = |(lat, lon): (f64, f64)| ((lat / GRID).round() as i64, (lon / GRID).round() as i64);
    let mut idx: Vec<usize> = (0..jobs.len()).collect();
    idx.sort_by_key(|&i| grid_key(jobs[i].start_location));
    idx
}
