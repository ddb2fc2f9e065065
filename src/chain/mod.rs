//! Chain Optimizer (component D): per-block minimum-cardinality chain
//! cover, ILP-first with a deterministic greedy fallback.

pub mod greedy;
pub mod ilp;

use crate::cancellation::CancellationToken;
use crate::config::OptimizationOptions;
use crate::feasibility::Feasibility;
use crate::model::{Chain, ChainLink, RouteJob, SolverStatus, TravelMatrix};

/// Scratch state built up while extending one chain; discarded once the
/// chain is finalized into a `Chain`/`ChainLink` pair. Keeps realized-time
/// bookkeeping out of `RouteJob` itself (see the crate's "no monkey
/// patching on output records" design rule).
#[derive(Debug)]
pub(crate) struct ChainBuildState {
    pub job_indices: Vec<usize>,
    pub realized_start: Vec<i32>,
    pub realized_end: Vec<i32>,
}

impl ChainBuildState {
    fn into_chain(self, block: crate::model::Block) -> Chain {
        let links = self
            .job_indices
            .into_iter()
            .zip(self.realized_start)
            .zip(self.realized_end)
            .map(|((job_index, realized_start), realized_end)| ChainLink {
                job_index,
                realized_start,
                realized_end,
            })
            .collect();
        Chain { block, links }
    }
}

pub struct BlockSolution {
    pub chains: Vec<Chain>,
    pub status: SolverStatus,
}

/// Tries the ILP formulation first; falls through to the greedy fallback on
/// timeout or infeasibility, or immediately if `options` disables the ILP
/// backend (an ambient test-tooling affordance — see `chain::ilp`). Checked
/// for cancellation between the two backends (§5) so a job that expires
/// mid-ILP doesn't still pay for a full greedy pass afterward.
pub fn solve_block(
    block: crate::model::Block,
    jobs: &[RouteJob],
    matrix: &TravelMatrix,
    feasibility: &Feasibility,
    options: &OptimizationOptions,
    token: &CancellationToken,
) -> BlockSolution {
    if jobs.is_empty() {
        return BlockSolution { chains: Vec::new(), status: SolverStatus::Optimal };
    }

    if options.ilp_enabled() {
        match ilp::solve_block(block, jobs, matrix, feasibility, options) {
            Ok(chains) => return BlockSolution { chains, status: SolverStatus::Optimal },
            Err(ilp::IlpOutcome::TimedOut(Some(chains))) => {
                return BlockSolution { chains, status: SolverStatus::TimedOut }
            }
            Err(ilp::IlpOutcome::TimedOut(None)) | Err(ilp::IlpOutcome::Infeasible) => {
                tracing::warn!(?block, "ilp solve did not complete; falling back to greedy");
            }
        }
    }

    if token.should_stop() {
        tracing::warn!(?block, "cancelled before greedy fallback; reporting no chains for this block");
        return BlockSolution { chains: Vec::new(), status: SolverStatus::TimedOut };
    }

    let chains = greedy::solve_block(block, jobs, matrix, feasibility, options);
    BlockSolution { chains, status: SolverStatus::GreedyFallback }
}

/// Sort key used everywhere a deterministic chain ordering is required
/// (§5, §8 P5): the route id of the chain's first job.
pub fn chain_key<'a>(chain: &Chain, jobs: &'a [RouteJob]) -> &'a str {
    jobs[chain.first().job_index].route_id()
}
