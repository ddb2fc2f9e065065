//! Test fixtures for fleet-scheduler.
//!
//! A small builder for `Route`s with sensible defaults, mirroring the
//! distance-provider stub pattern used in the crate's own unit tests.

use std::sync::Arc;

use fleet_scheduler::{CancellationToken, Route, RouteType, ServiceDays, Stop, Weekday};
use fleet_scheduler::router::{Polyline, TravelTime, TravelTimeProvider};

/// Builder for test routes with sensible defaults: a two-stop Entry route
/// at `(42.5, -8.7)` arriving 08:00, 20 minutes long, capacity 40.
#[derive(Clone)]
pub struct TestRoute {
    id: String,
    stops: Vec<Stop>,
    route_type: RouteType,
    school_id: String,
    capacity: u32,
    service_days: ServiceDays,
    arrival_time: Option<i32>,
    departure_time: Option<i32>,
}

impl TestRoute {
    pub fn entry(id: &str, arrival: i32) -> Self {
        Self {
            id: id.to_string(),
            stops: vec![
                Stop::new(42.6, -8.8, 0, 0, Some(10), false).unwrap(),
                Stop::new(42.5, -8.7, 1, 20, Some(10), true).unwrap(),
            ],
            route_type: RouteType::Entry,
            school_id: "E1".to_string(),
            capacity: 40,
            service_days: ServiceDays::all(),
            arrival_time: Some(arrival),
            departure_time: None,
        }
    }

    pub fn exit(id: &str, departure: i32) -> Self {
        Self {
            id: id.to_string(),
            stops: vec![
                Stop::new(42.5, -8.7, 0, 0, Some(10), true).unwrap(),
                Stop::new(42.6, -8.8, 1, 20, Some(10), false).unwrap(),
            ],
            route_type: RouteType::Exit,
            school_id: "E1".to_string(),
            capacity: 40,
            service_days: ServiceDays::all(),
            arrival_time: None,
            departure_time: Some(departure),
        }
    }

    pub fn stops(mut self, stops: Vec<Stop>) -> Self {
        self.stops = stops;
        self
    }

    pub fn school(mut self, school_id: &str) -> Self {
        self.school_id = school_id.to_string();
        self
    }

    pub fn capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn service_days(mut self, days: ServiceDays) -> Self {
        self.service_days = days;
        self
    }

    pub fn no_anchor(mut self) -> Self {
        self.arrival_time = None;
        self.departure_time = None;
        self
    }

    pub fn build(self) -> Arc<Route> {
        Arc::new(
            Route::new(
                self.id,
                self.stops,
                self.route_type,
                self.school_id,
                "Test School",
                "C1",
                self.capacity,
                self.service_days,
                self.arrival_time,
                self.departure_time,
            )
            .unwrap(),
        )
    }
}

pub fn stop(lat: f64, lon: f64, order: usize, minutes_from_start: i32) -> Stop {
    Stop::new(lat, lon, order, minutes_from_start, Some(10), order == 0).unwrap()
}

pub const MONDAY: Weekday = Weekday::Mon;

/// Travel-time provider returning a fixed number of minutes between any two
/// distinct points, and 0 for a point to itself.
pub struct FixedTravelProvider {
    pub minutes: u32,
}

impl FixedTravelProvider {
    pub fn new(minutes: u32) -> Self {
        Self { minutes }
    }
}

impl TravelTimeProvider for FixedTravelProvider {
    fn travel_time(&self, a: (f64, f64), b: (f64, f64)) -> TravelTime {
        if a == b {
            TravelTime::Minutes(0)
        } else {
            TravelTime::Minutes(self.minutes)
        }
    }

    fn travel_matrix(&self, sources: &[(f64, f64)], destinations: &[(f64, f64)], _token: &CancellationToken) -> Vec<Vec<TravelTime>> {
        sources
            .iter()
            .map(|&s| destinations.iter().map(|&d| self.travel_time(s, d)).collect())
            .collect()
    }

    fn geometry(&self, _a: (f64, f64), _b: (f64, f64)) -> Option<Polyline> {
        None
    }
}

/// Travel-time provider that reports every lookup as `Unavailable`, forcing
/// callers through the great-circle fallback path.
pub struct UnavailableProvider;

impl TravelTimeProvider for UnavailableProvider {
    fn travel_time(&self, _a: (f64, f64), _b: (f64, f64)) -> TravelTime {
        TravelTime::Unavailable
    }

    fn travel_matrix(&self, sources: &[(f64, f64)], destinations: &[(f64, f64)], _token: &CancellationToken) -> Vec<Vec<TravelTime>> {
        vec![vec![TravelTime::Unavailable; destinations.len()]; sources.len()]
    }

    fn geometry(&self, _a: (f64, f64), _b: (f64, f64)) -> Option<Polyline> {
        None
    }
}
