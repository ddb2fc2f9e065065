//! Schedule Assembler (component F): materializes vehicle schedules from
//! matched chains, validates the no-overlap invariant, and runs local
//! search (relocate / swap / 2-opt) to shrink vehicle count and deadhead.

use std::collections::HashMap;

use crate::cancellation::CancellationToken;
use crate::config::OptimizationOptions;
use crate::error::EngineError;
use crate::haversine::GreatCircleEstimator;
use crate::model::{Block, BusSchedule, Chain, RouteJob, ScheduleItem};
use crate::router::{resolve_or_fallback, TravelTimeProvider};

/// One block's solved chains plus the jobs they index into.
pub struct BlockChains<'a> {
    pub block: Block,
    pub chains: Vec<Chain>,
    pub jobs: &'a [RouteJob],
}

/// Every route's first/last stop location, keyed by route id, so local
/// search can recompute real deadhead after moving a `ScheduleItem`
/// between vehicles (the item itself carries only times, per the output
/// contract in `model::ScheduleItem`).
type LocationIndex = HashMap<String, ((f64, f64), (f64, f64))>;

fn build_schedule(segments: &[(&Chain, &[RouteJob])]) -> BusSchedule {
    let mut items = Vec::new();
    let mut capacity = None;
    let mut prev_end: Option<i32> = None;

    for (chain, jobs) in segments {
        for link in &chain.links {
            let job = &jobs[link.job_index];
            let anchor = job.route.anchor_time().expect("assembled jobs always have an anchor");
            let shift_applied = match chain.block.route_type() {
                crate::model::RouteType::Entry => link.realized_end - anchor,
                crate::model::RouteType::Exit => link.realized_start - anchor,
            };
            let deadhead_minutes = match prev_end {
                Some(end) => link.realized_start - end,
                None => 0,
            };
            items.push(ScheduleItem {
                route_id: job.route_id().to_string(),
                start_time: link.realized_start,
                end_time: link.realized_end,
                shift_applied,
                deadhead_minutes,
            });
            capacity = Some(capacity.map_or(job.capacity(), |c: u32| c.max(job.capacity())));
            prev_end = Some(link.realized_end);
        }
    }

    BusSchedule { vehicle_id: String::new(), items, capacity }
}

/// Assembles final vehicle schedules from the paired blocks' chains and
/// cross-block matches. `matches_12`/`matches_34` come from
/// [`crate::matching::match_chains`] (index into block 1/3's chains).
#[allow(clippy::too_many_arguments)]
pub fn assemble(
    block1: &BlockChains,
    block2: &BlockChains,
    matches_12: &[Option<usize>],
    block3: &BlockChains,
    block4: &BlockChains,
    matches_34: &[Option<usize>],
    provider: &dyn TravelTimeProvider,
    estimator: &GreatCircleEstimator,
    options: &OptimizationOptions,
    token: &CancellationToken,
) -> Result<(Vec<BusSchedule>, LocalSearchReport), EngineError> {
    let mut schedules = Vec::new();
    assemble_pair(block1, block2, matches_12, &mut schedules);
    assemble_pair(block3, block4, matches_34, &mut schedules);

    let locations = build_location_index(&[block1, block2, block3, block4]);

    for schedule in &schedules {
        if !schedule.is_non_overlapping() {
            tracing::error!(vehicle_id = ?schedule.items.first().map(|i| &i.route_id), "overlap violation in assembled schedule");
            return Err(EngineError::OverlapViolation {
                vehicle_id: schedule.items.first().map(|i| i.route_id.clone()).unwrap_or_default(),
                detail: "item end_time exceeds next item's start_time".to_string(),
            });
        }
    }

    let report = local_search(&mut schedules, &locations, provider, estimator, options, token);

    schedules.sort_by(|a, b| {
        b.items
            .len()
            .cmp(&a.items.len())
            .then_with(|| a.items.first().map(|i| i.route_id.clone()).cmp(&b.items.first().map(|i| i.route_id.clone())))
    });
    for (i, schedule) in schedules.iter_mut().enumerate() {
        schedule.vehicle_id = format!("B-{:03}", i + 1);
    }

    Ok((schedules, report))
}

fn build_location_index(blocks: &[&BlockChains]) -> LocationIndex {
    let mut index = LocationIndex::new();
    for block in blocks {
        for job in block.jobs {
            index.insert(job.route_id().to_string(), (job.start_location, job.end_location));
        }
    }
    index
}

fn assemble_pair(first: &BlockChains, second: &BlockChains, matches: &[Option<usize>], out: &mut Vec<BusSchedule>) {
    let mut used_second = vec![false; second.chains.len()];
    for (i, chain) in first.chains.iter().enumerate() {
        let mut segments: Vec<(&Chain, &[RouteJob])> = vec![(chain, first.jobs)];
        if let Some(j) = matches.get(i).copied().flatten() {
            used_second[j] = true;
            segments.push((&second.chains[j], second.jobs));
        }
        out.push(build_schedule(&segments));
    }
    for (j, chain) in second.chains.iter().enumerate() {
        if !used_second[j] {
            out.push(build_schedule(&[(chain, second.jobs)]));
        }
    }
}

const MAX_PASSES: usize = 5;

pub struct LocalSearchReport {
    pub passes_run: usize,
    pub moves_accepted: usize,
}

fn local_search(
    schedules: &mut Vec<BusSchedule>,
    locations: &LocationIndex,
    provider: &dyn TravelTimeProvider,
    estimator: &GreatCircleEstimator,
    options: &OptimizationOptions,
    token: &CancellationToken,
) -> LocalSearchReport {
    let max_passes = options.local_search_max_passes.min(MAX_PASSES);
    let mut passes_run = 0;
    let mut moves_accepted = 0;

    for _ in 0..max_passes {
        if token.should_stop() {
            tracing::warn!(passes_run, "local search interrupted before completing all passes");
            break;
        }
        passes_run += 1;
        let mut made_move = false;

        if try_relocate(schedules, locations, provider, estimator, options) {
            made_move = true;
            moves_accepted += 1;
        } else if try_swap(schedules, locations, provider, estimator, options) {
            made_move = true;
            moves_accepted += 1;
        } else if try_two_opt_star(schedules, locations, provider, estimator, options) {
            made_move = true;
            moves_accepted += 1;
        }

        if !made_move {
            break;
        }
    }

    schedules.retain(|s| !s.items.is_empty());
    LocalSearchReport { passes_run, moves_accepted }
}

fn location_of(locations: &LocationIndex, route_id: &str) -> ((f64, f64), (f64, f64)) {
    *locations
        .get(route_id)
        .expect("every scheduled item's route is present in the location index")
}

fn deadhead_between(prev: &ScheduleItem, next: &ScheduleItem) -> i32 {
    next.start_time - prev.end_time
}

fn buffer_holds(
    locations: &LocationIndex,
    provider: &dyn TravelTimeProvider,
    estimator: &GreatCircleEstimator,
    min_buffer: i32,
    prev: &ScheduleItem,
    next: &ScheduleItem,
) -> bool {
    let (_, prev_end_loc) = location_of(locations, &prev.route_id);
    let (next_start_loc, _) = location_of(locations, &next.route_id);
    let travel = resolve_or_fallback(provider, estimator, prev_end_loc, next_start_loc) as i32;
    next.start_time - prev.end_time >= travel + min_buffer
}

/// Tries moving one item from vehicle A into vehicle B. Accepts iff vehicle
/// A becomes empty (vehicle count strictly decreases) or, counts equal,
/// total deadhead strictly decreases.
fn try_relocate(
    schedules: &mut [BusSchedule],
    locations: &LocationIndex,
    provider: &dyn TravelTimeProvider,
    estimator: &GreatCircleEstimator,
    options: &OptimizationOptions,
) -> bool {
    let min_buffer = options.min_buffer_minutes;
    for a in 0..schedules.len() {
        if schedules[a].items.len() != 1 {
            continue; // only relocating a whole single-item vehicle keeps this tractable and sound
        }
        let item = schedules[a].items[0].clone();
        for b in 0..schedules.len() {
            if a == b {
                continue;
            }
            if let Some(pos) = insertion_position(&schedules[b], &item, locations, provider, estimator, min_buffer) {
                let mut candidate = schedules[b].items.clone();
                candidate.insert(pos, item.clone());
                recompute_deadhead(&mut candidate);
                let before_deadhead = total_deadhead(&schedules[b]);
                let after_deadhead: i32 = candidate.iter().map(|i| i.deadhead_minutes).sum();

                if after_deadhead <= before_deadhead {
                    schedules[b].items = candidate;
                    schedules[a].items.clear();
                    return true;
                }
            }
        }
    }
    false
}

/// Tries exchanging one item of vehicle A with one item of vehicle B,
/// re-sorting each side by start_time and accepting iff both resulting
/// sequences stay feasible and total deadhead across the pair strictly
/// decreases. Unlike relocate, this can improve a pair of vehicles that are
/// each already full: regrouping the same four endpoints differently can
/// shrink the sum of consecutive gaps even when no vehicle empties out.
fn try_swap(
    schedules: &mut [BusSchedule],
    locations: &LocationIndex,
    provider: &dyn TravelTimeProvider,
    estimator: &GreatCircleEstimator,
    options: &OptimizationOptions,
) -> bool {
    let min_buffer = options.min_buffer_minutes;
    for a in 0..schedules.len() {
        for b in (a + 1)..schedules.len() {
            for ia in 0..schedules[a].items.len() {
                for ib in 0..schedules[b].items.len() {
                    let item_a = schedules[a].items[ia].clone();
                    let item_b = schedules[b].items[ib].clone();

                    let mut candidate_a = schedules[a].items.clone();
                    candidate_a[ia] = item_b;
                    candidate_a.sort_by_key(|i| i.start_time);

                    let mut candidate_b = schedules[b].items.clone();
                    candidate_b[ib] = item_a;
                    candidate_b.sort_by_key(|i| i.start_time);

                    if !sequence_feasible(&candidate_a, locations, provider, estimator, min_buffer)
                        || !sequence_feasible(&candidate_b, locations, provider, estimator, min_buffer)
                    {
                        continue;
                    }

                    let before = total_deadhead(&schedules[a]) + total_deadhead(&schedules[b]);
                    recompute_deadhead(&mut candidate_a);
                    recompute_deadhead(&mut candidate_b);
                    let after: i32 =
                        candidate_a.iter().map(|i| i.deadhead_minutes).sum::<i32>()
                            + candidate_b.iter().map(|i| i.deadhead_minutes).sum::<i32>();

                    if after < before {
                        schedules[a].items = candidate_a;
                        schedules[b].items = candidate_b;
                        return true;
                    }
                }
            }
        }
    }
    false
}

/// 2-opt*: exchanges the tail segments of two vehicles at a split point,
/// the standard inter-route generalization of 2-opt for fixed-time,
/// multi-vehicle schedules (a same-vehicle reversal is a no-op here since
/// each item's absolute time is frozen after chain assembly).
fn try_two_opt_star(
    schedules: &mut [BusSchedule],
    locations: &LocationIndex,
    provider: &dyn TravelTimeProvider,
    estimator: &GreatCircleEstimator,
    options: &OptimizationOptions,
) -> bool {
    let min_buffer = options.min_buffer_minutes;
    for a in 0..schedules.len() {
        for b in (a + 1)..schedules.len() {
            for split_a in 1..schedules[a].items.len() {
                for split_b in 1..schedules[b].items.len() {
                    let mut new_a = schedules[a].items[..split_a].to_vec();
                    new_a.extend(schedules[b].items[split_b..].iter().cloned());
                    let mut new_b = schedules[b].items[..split_b].to_vec();
                    new_b.extend(schedules[a].items[split_a..].iter().cloned());

                    if !sequence_feasible(&new_a, locations, provider, estimator, min_buffer)
                        || !sequence_feasible(&new_b, locations, provider, estimator, min_buffer)
                    {
                        continue;
                    }

                    let before = total_deadhead(&schedules[a]) + total_deadhead(&schedules[b]);
                    recompute_deadhead(&mut new_a);
                    recompute_deadhead(&mut new_b);
                    let after: i32 =
                        new_a.iter().map(|i| i.deadhead_minutes).sum::<i32>() + new_b.iter().map(|i| i.deadhead_minutes).sum::<i32>();

                    if after < before {
                        schedules[a].items = new_a;
                        schedules[b].items = new_b;
                        return true;
                    }
                }
            }
        }
    }
    false
}

fn sequence_feasible(
    items: &[ScheduleItem],
    locations: &LocationIndex,
    provider: &dyn TravelTimeProvider,
    estimator: &GreatCircleEstimator,
    min_buffer: i32,
) -> bool {
    items.windows(2).all(|pair| buffer_holds(locations, provider, estimator, min_buffer, &pair[0], &pair[1]))
}

fn insertion_position(
    schedule: &BusSchedule,
    item: &ScheduleItem,
    locations: &LocationIndex,
    provider: &dyn TravelTimeProvider,
    estimator: &GreatCircleEstimator,
    min_buffer: i32,
) -> Option<usize> {
    let pos = schedule.items.partition_point(|existing| existing.start_time < item.start_time);
    let fits_before = pos == 0 || buffer_holds(locations, provider, estimator, min_buffer, &schedule.items[pos - 1], item);
    let fits_after = pos == schedule.items.len() || buffer_holds(locations, provider, estimator, min_buffer, item, &schedule.items[pos]);
    (fits_before && fits_after).then_some(pos)
}

fn total_deadhead(schedule: &BusSchedule) -> i32 {
    schedule.items.iter().map(|i| i.deadhead_minutes).sum()
}

fn recompute_deadhead(items: &mut [ScheduleItem]) {
    for i in 1..items.len() {
        items[i].deadhead_minutes = deadhead_between(&items[i - 1], &items[i]);
    }
    if let Some(first) = items.first_mut() {
        first.deadhead_minutes = 0;
    }
}
