//! Block Partitioner (component B): classifies routes into one of four
//! temporal blocks and builds each block's pairwise travel-time matrix.

use std::sync::Arc;

use crate::cancellation::CancellationToken;
use crate::haversine::GreatCircleEstimator;
use crate::model::{Block, Minutes, Route, RouteJob, RouteType, TravelMatrix, UnassignedReason, UnassignedRoute, Weekday};
use crate::router::{resolve_or_fallback, TravelTimeProvider};

const BLOCK1_CUTOFF: Minutes = 11 * 60;
const BLOCK2_CUTOFF: Minutes = 15 * 60;

fn classify(route: &Route) -> Option<Block> {
    match route.route_type {
        RouteType::Entry => route.arrival_time.map(|t| {
            if t <= BLOCK1_CUTOFF {
                Block::EntryMorning
            } else {
                Block::EntryAfternoon
            }
        }),
        RouteType::Exit => route.departure_time.map(|t| {
            if t <= BLOCK2_CUTOFF {
                Block::ExitMidday
            } else {
                Block::ExitEvening
            }
        }),
    }
}

pub struct PartitionResult {
    pub jobs: Vec<(Block, Vec<RouteJob>)>,
    pub matrices: Vec<(Block, TravelMatrix)>,
    pub unassigned: Vec<UnassignedRoute>,
}

/// Classifies `routes` active on `day` into blocks, building each non-empty
/// block's travel matrix from `provider` (falling back to `estimator` for
/// any cell the provider can't supply). Routes inactive on `day` are
/// dropped silently — they are not this job's concern, not an error.
pub fn partition(
    routes: &[Arc<Route>],
    day: Weekday,
    provider: &dyn TravelTimeProvider,
    estimator: &GreatCircleEstimator,
    token: &CancellationToken,
) -> PartitionResult {
    let mut by_block: Vec<(Block, Vec<RouteJob>)> = Block::all().iter().map(|&b| (b, Vec::new())).collect();
    let mut unassigned = Vec::new();

    for route in routes.iter().filter(|r| r.active_on(day)) {
        match classify(route) {
            Some(block) => {
                let anchor = route.anchor_time().expect("classify only returns Some when anchor present");
                let job = RouteJob::from_route(Arc::clone(route), block, anchor);
                by_block.iter_mut().find(|(b, _)| *b == block).expect("all blocks present").1.push(job);
            }
            None => unassigned.push(UnassignedRoute {
                route_id: route.id.clone(),
                reason: UnassignedReason::MissingAnchor,
            }),
        }
    }

    let mut matrices = Vec::new();
    for (block, jobs) in &by_block {
        if jobs.is_empty() {
            continue;
        }
        let sources: Vec<(f64, f64)> = jobs.iter().map(|j| j.end_location).collect();
        let destinations: Vec<(f64, f64)> = jobs.iter().map(|j| j.start_location).collect();
        let raw = provider.travel_matrix(&sources, &destinations, token);

        let mut matrix = TravelMatrix::new();
        for (i, row) in raw.iter().enumerate() {
            for (j, cell) in row.iter().enumerate() {
                if i == j {
                    continue;
                }
                let minutes = match cell.minutes() {
                    Some(m) => m,
                    None => resolve_or_fallback(provider, estimator, sources[i], destinations[j]),
                };
                matrix.set(i, j, minutes);
            }
        }
        matrices.push((*block, matrix));
    }

    PartitionResult {
        jobs: by_block,
        matrices,
        unassigned,
    }
}
