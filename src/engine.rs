//! Top-level orchestration (component "engine"): wires the Router Client,
//! Block Partitioner, Feasibility Builder, Chain Optimizer, Cross-Block
//! Matcher, and Schedule Assembler into one `optimize` call, and owns the
//! concurrency and cancellation model described in the design notes (§5).

use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use rayon::prelude::*;

use crate::assembler::{self, BlockChains};
use crate::blocks::{self, PartitionResult};
use crate::cancellation::CancellationToken;
use crate::config::OptimizationOptions;
use crate::feasibility;
use crate::haversine::GreatCircleEstimator;
use crate::matching;
use crate::model::{
    Block, BlockDiagnostic, Diagnostics, JobStatus, OptimizationResult, Route, RouteJob, RouterStatsSnapshot, SolverStatus, UnassignedReason,
    UnassignedRoute, Weekday,
};
use crate::router::TravelTimeProvider;

struct BlockResult {
    block: Block,
    solution: crate::chain::BlockSolution,
    jobs: Vec<RouteJob>,
}

enum JobOutcome {
    Completed(Box<[BlockResult; 4]>),
    Cancelled,
    TimedOut,
}

/// Runs one full optimization job. Never returns `Err`: a job is always
/// produced, with failure modes surfaced through `Diagnostics::status`
/// (§7 — unexpected panics are caught at this boundary and reported as
/// `JobStatus::Failed` rather than propagated). `router_stats` reflects
/// whatever `provider` accumulated over the call — a trait object alone
/// can't expose that, so the caller supplies its own snapshot (zeroed for
/// a stub provider with nothing to report).
#[tracing::instrument(skip(routes, provider, options, token))]
pub fn optimize(
    routes: &[Arc<Route>],
    day: Weekday,
    provider: &dyn TravelTimeProvider,
    options: &OptimizationOptions,
    token: &CancellationToken,
    router_stats: RouterStatsSnapshot,
) -> OptimizationResult {
    let total_routes = routes.len();
    match catch_unwind(AssertUnwindSafe(|| run(routes, day, provider, options, token, router_stats.clone()))) {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = panic_message(&payload);
            tracing::error!(error = %message, "optimization job panicked");
            empty_result(total_routes, JobStatus::Failed, router_stats)
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn empty_result(total_routes: usize, status: JobStatus, router_stats: RouterStatsSnapshot) -> OptimizationResult {
    OptimizationResult {
        schedules: Vec::new(),
        unassigned: Vec::new(),
        diagnostics: Diagnostics {
            total_routes,
            assigned_routes: 0,
            unassigned_routes: 0,
            vehicle_count: 0,
            local_search_passes_run: 0,
            local_search_moves_accepted: 0,
            blocks: Vec::new(),
            router_stats,
            status,
        },
    }
}

fn run(
    routes: &[Arc<Route>],
    day: Weekday,
    provider: &dyn TravelTimeProvider,
    options: &OptimizationOptions,
    token: &CancellationToken,
    router_stats: RouterStatsSnapshot,
) -> OptimizationResult {
    let estimator = GreatCircleEstimator::new(options.fallback_speed_kmh);
    let total_routes = routes.len();

    if token.is_cancelled() {
        return empty_result(total_routes, JobStatus::Cancelled, router_stats);
    }

    let partition = blocks::partition(routes, day, provider, &estimator, token);

    match solve_blocks(&partition, options, token) {
        JobOutcome::Cancelled => empty_result(total_routes, JobStatus::Cancelled, router_stats),
        JobOutcome::TimedOut => empty_result(total_routes, JobStatus::Timeout, router_stats),
        JobOutcome::Completed(block_results) => finish(*block_results, partition, provider, &estimator, options, token, router_stats),
    }
}

/// Solves all four blocks in parallel (§5), each trying the ILP backend
/// then the greedy fallback. Checked for cancellation at task entry and
/// for the overall deadline once the join barrier completes.
fn solve_blocks(partition: &PartitionResult, options: &OptimizationOptions, token: &CancellationToken) -> JobOutcome {
    let results: Vec<Option<BlockResult>> = partition
        .jobs
        .par_iter()
        .map(|(block, jobs)| {
            if token.is_cancelled() {
                return None;
            }
            tracing::debug!(?block, job_count = jobs.len(), "solving block");
            let matrix = partition.matrices.iter().find(|(b, _)| b == block).map(|(_, m)| m.clone()).unwrap_or_default();
            let feas = feasibility::build(jobs, &matrix, *block, options);
            let solution = crate::chain::solve_block(*block, jobs, &matrix, &feas, options, token);
            Some(BlockResult { block: *block, solution, jobs: jobs.clone() })
        })
        .collect();

    if results.iter().any(Option::is_none) {
        return JobOutcome::Cancelled;
    }
    if token.is_expired() {
        return JobOutcome::TimedOut;
    }

    let mut ordered: Vec<BlockResult> = results.into_iter().flatten().collect();
    ordered.sort_by_key(|r| r.block);
    let mut iter = ordered.into_iter();
    let boxed = Box::new([
        iter.next().expect("partition always yields all four blocks"),
        iter.next().expect("partition always yields all four blocks"),
        iter.next().expect("partition always yields all four blocks"),
        iter.next().expect("partition always yields all four blocks"),
    ]);
    JobOutcome::Completed(boxed)
}

#[allow(clippy::too_many_arguments)]
fn finish(
    block_results: [BlockResult; 4],
    partition: PartitionResult,
    provider: &dyn TravelTimeProvider,
    estimator: &GreatCircleEstimator,
    options: &OptimizationOptions,
    token: &CancellationToken,
    router_stats: RouterStatsSnapshot,
) -> OptimizationResult {
    let [b1, b2, b3, b4] = block_results;
    let total_routes = partition.jobs.iter().map(|(_, jobs)| jobs.len()).sum::<usize>() + partition.unassigned.len();

    let matches_12 = matching::match_chains(&b1.solution.chains, &b1.jobs, &b2.solution.chains, &b2.jobs, provider, estimator, options);
    let matches_34 = matching::match_chains(&b3.solution.chains, &b3.jobs, &b4.solution.chains, &b4.jobs, provider, estimator, options);

    let block_diagnostics: Vec<BlockDiagnostic> = [&b1, &b2, &b3, &b4]
        .iter()
        .map(|b| BlockDiagnostic {
            block: b.block,
            job_count: b.jobs.len(),
            chain_count: b.solution.chains.len(),
            solver_status: b.solution.status,
        })
        .collect();
    let any_timed_out = block_diagnostics.iter().any(|d| d.solver_status == SolverStatus::TimedOut);

    let chains1 = BlockChains { block: b1.block, chains: b1.solution.chains, jobs: &b1.jobs };
    let chains2 = BlockChains { block: b2.block, chains: b2.solution.chains, jobs: &b2.jobs };
    let chains3 = BlockChains { block: b3.block, chains: b3.solution.chains, jobs: &b3.jobs };
    let chains4 = BlockChains { block: b4.block, chains: b4.solution.chains, jobs: &b4.jobs };

    let assembled =
        assembler::assemble(&chains1, &chains2, &matches_12, &chains3, &chains4, &matches_34, provider, estimator, options, token);

    let (schedules, mut unassigned, report) = match assembled {
        Ok((schedules, report)) => {
            let assigned: HashSet<&str> = schedules.iter().flat_map(|s| s.items.iter()).map(|i| i.route_id.as_str()).collect();
            let unchained: Vec<UnassignedRoute> = [&chains1, &chains2, &chains3, &chains4]
                .iter()
                .flat_map(|b| b.jobs.iter())
                .filter(|job| !assigned.contains(job.route_id()))
                .map(|job| UnassignedRoute { route_id: job.route_id().to_string(), reason: UnassignedReason::NoFeasibleChain })
                .collect();
            (schedules, unchained, report)
        }
        Err(err) => {
            tracing::error!(error = %err, "overlap violation; aborting job");
            return empty_result(total_routes, JobStatus::Failed, router_stats);
        }
    };

    unassigned.extend(partition.unassigned);

    let assigned_routes: usize = schedules.iter().map(|s| s.items.len()).sum();
    let status = if any_timed_out {
        JobStatus::PartialTimeout
    } else if !unassigned.is_empty() {
        JobStatus::OkWithUnassigned
    } else {
        JobStatus::Ok
    };

    let vehicle_count = schedules.len();
    let unassigned_routes = unassigned.len();

    OptimizationResult {
        schedules,
        unassigned,
        diagnostics: Diagnostics {
            total_routes,
            assigned_routes,
            unassigned_routes,
            vehicle_count,
            local_search_passes_run: report.passes_run,
            local_search_moves_accepted: report.moves_accepted,
            blocks: block_diagnostics,
            router_stats,
            status,
        },
    }
}
