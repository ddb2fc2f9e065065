//! End-to-end scenarios against `engine::optimize`, covering the concrete
//! cases and boundary behaviors used to validate block chaining, cross-block
//! reuse, and the capacity bar.

mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use fleet_scheduler::model::{JobStatus, RouterStatsSnapshot, UnassignedReason};
use fleet_scheduler::{optimize, CancellationToken, OptimizationOptions};

use fixtures::{FixedTravelProvider, TestRoute, MONDAY};

fn zero_stats() -> RouterStatsSnapshot {
    RouterStatsSnapshot { requests: 0, cache_hits: 0, api_errors: 0, breaker_openings: 0 }
}

fn token() -> CancellationToken {
    CancellationToken::new(Duration::from_secs(30))
}

#[test]
fn empty_route_list_yields_empty_result() {
    let result = optimize(&[], MONDAY, &FixedTravelProvider::new(3), &OptimizationOptions::default(), &token(), zero_stats());
    assert!(result.schedules.is_empty());
    assert!(result.unassigned.is_empty());
    assert_eq!(result.diagnostics.status, JobStatus::Ok);
}

#[test]
fn single_valid_route_becomes_one_vehicle_one_item() {
    let routes = vec![TestRoute::entry("r1", 480).build()];
    let result = optimize(&routes, MONDAY, &FixedTravelProvider::new(3), &OptimizationOptions::default(), &token(), zero_stats());
    assert_eq!(result.schedules.len(), 1);
    assert_eq!(result.schedules[0].items.len(), 1);
    assert_eq!(result.diagnostics.status, JobStatus::Ok);
}

/// S1 — chaining on one bus. Two ENTRY routes at the same school, close
/// enough in time and location to chain onto a single vehicle.
#[test]
fn s1_chains_two_entries_onto_one_bus() {
    let r1 = TestRoute::entry("r1", 480)
        .stops(vec![fixtures::stop(42.60, -8.80, 0, 0), fixtures::stop(42.50, -8.70, 1, 20)])
        .capacity(40)
        .build();
    let r2 = TestRoute::entry("r2", 540)
        .stops(vec![fixtures::stop(42.52, -8.69, 0, 0), fixtures::stop(42.50, -8.70, 1, 15)])
        .capacity(42)
        .build();

    let result = optimize(
        &[r1, r2],
        MONDAY,
        &FixedTravelProvider::new(3),
        &OptimizationOptions::default(),
        &token(),
        zero_stats(),
    );

    assert_eq!(result.diagnostics.status, JobStatus::Ok);
    assert_eq!(result.schedules.len(), 1, "expected one bus, got {:?}", result.schedules);
    assert_eq!(result.schedules[0].items.len(), 2);
}

/// S2 — forced split by time: the same pair, but R2's arrival is too early
/// to leave enough room for travel + dwell + buffer within the shift budget.
#[test]
fn s2_splits_when_time_window_too_tight() {
    let r1 = TestRoute::entry("r1", 480)
        .stops(vec![fixtures::stop(42.60, -8.80, 0, 0), fixtures::stop(42.50, -8.70, 1, 20)])
        .capacity(40)
        .build();
    let r2 = TestRoute::entry("r2", 490)
        .stops(vec![fixtures::stop(42.52, -8.69, 0, 0), fixtures::stop(42.50, -8.70, 1, 15)])
        .capacity(42)
        .build();

    let result = optimize(
        &[r1, r2],
        MONDAY,
        &FixedTravelProvider::new(3),
        &OptimizationOptions::default(),
        &token(),
        zero_stats(),
    );

    assert_eq!(result.diagnostics.status, JobStatus::Ok);
    assert_eq!(result.schedules.len(), 2);
    assert!(result.schedules.iter().all(|s| s.items.len() == 1));
}

/// S4 — capacity bar: otherwise-chainable routes whose capacities differ by
/// more than `capacity_max_diff` must stay on separate buses.
#[test]
fn s4_capacity_gap_forces_separate_buses() {
    let r1 = TestRoute::entry("r1", 480)
        .stops(vec![fixtures::stop(42.60, -8.80, 0, 0), fixtures::stop(42.50, -8.70, 1, 20)])
        .capacity(20)
        .build();
    let r2 = TestRoute::entry("r2", 540)
        .stops(vec![fixtures::stop(42.52, -8.69, 0, 0), fixtures::stop(42.50, -8.70, 1, 15)])
        .capacity(55)
        .build();

    let result = optimize(
        &[r1, r2],
        MONDAY,
        &FixedTravelProvider::new(3),
        &OptimizationOptions::default(),
        &token(),
        zero_stats(),
    );

    assert_eq!(result.schedules.len(), 2);
}

/// S3 — cross-block reuse: an entry chain ending at `L` and an exit chain
/// starting at `L` hours later should land on the same vehicle.
#[test]
fn s3_reuses_bus_across_blocks_at_shared_location() {
    let shared = (42.50, -8.70);
    let entry = TestRoute::entry("r1", 510) // 08:30 arrival
        .stops(vec![fixtures::stop(42.60, -8.80, 0, 0), fixtures::stop(shared.0, shared.1, 1, 30)])
        .capacity(40)
        .build();
    let exit = TestRoute::exit("r2", 780) // 13:00 departure
        .stops(vec![fixtures::stop(shared.0, shared.1, 0, 0), fixtures::stop(42.60, -8.80, 1, 20)])
        .capacity(40)
        .build();

    let result = optimize(
        &[entry, exit],
        MONDAY,
        &FixedTravelProvider::new(0),
        &OptimizationOptions::default(),
        &token(),
        zero_stats(),
    );

    assert_eq!(result.diagnostics.status, JobStatus::Ok);
    assert_eq!(result.schedules.len(), 1, "expected cross-block reuse onto one bus, got {:?}", result.schedules);
    assert_eq!(result.schedules[0].items.len(), 2);
}

/// S6 — unassignable route: a route with no anchor time is excluded, while
/// the rest of the fleet schedules normally.
#[test]
fn s6_missing_anchor_is_reported_unassigned() {
    let unassignable = TestRoute::entry("r1", 480).no_anchor().build();
    let normal = TestRoute::entry("r2", 600).build();

    let result = optimize(
        &[unassignable, normal],
        MONDAY,
        &FixedTravelProvider::new(5),
        &OptimizationOptions::default(),
        &token(),
        zero_stats(),
    );

    assert_eq!(result.diagnostics.status, JobStatus::OkWithUnassigned);
    assert_eq!(result.unassigned.len(), 1);
    assert_eq!(result.unassigned[0].route_id, "r1");
    assert_eq!(result.unassigned[0].reason, UnassignedReason::MissingAnchor);
    assert!(result.schedules.iter().flat_map(|s| s.items.iter()).any(|i| i.route_id == "r2"));
}

#[test]
fn mutually_incompatible_routes_become_one_bus_each() {
    // Far apart in location and time: no feasible pair, no cross-block reuse.
    let r1 = TestRoute::entry("r1", 480)
        .stops(vec![fixtures::stop(40.0, -8.0, 0, 0), fixtures::stop(40.0, -8.0, 1, 20)])
        .build();
    let r2 = TestRoute::entry("r2", 1000)
        .stops(vec![fixtures::stop(50.0, 8.0, 0, 0), fixtures::stop(50.0, 8.0, 1, 20)])
        .build();

    let result = optimize(
        &[r1, r2],
        MONDAY,
        &FixedTravelProvider::new(600),
        &OptimizationOptions::default(),
        &token(),
        zero_stats(),
    );

    assert_eq!(result.diagnostics.status, JobStatus::Ok);
    assert_eq!(result.schedules.len(), 2);
    assert!(result.schedules.iter().all(|s| s.items.len() == 1));
}

#[test]
fn cancelled_token_yields_cancelled_status() {
    let routes = vec![TestRoute::entry("r1", 480).build()];
    let cancel_token = token();
    cancel_token.cancel();
    let result = optimize(&routes, MONDAY, &FixedTravelProvider::new(3), &OptimizationOptions::default(), &cancel_token, zero_stats());
    assert_eq!(result.diagnostics.status, JobStatus::Cancelled);
    assert!(result.schedules.is_empty());
}
