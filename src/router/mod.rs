//! Router Client (component A, §4.A): travel times and geometry from an
//! OSRM-compatible HTTP service, backed by a persistent cache and guarded
//! by a circuit breaker. Individual lookups never fail loudly — they
//! return `TravelTime::Unavailable` and let the caller decide whether to
//! fall back to a great-circle estimate (see [`resolve_or_fallback`]).

pub mod breaker;
pub mod cache;
pub mod osrm;
pub mod polyline;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::cancellation::CancellationToken;
use crate::config::RouterConfig;
use crate::haversine::GreatCircleEstimator;
use crate::model::RouterStatsSnapshot;

use breaker::{BreakerState, CircuitBreaker};
use cache::TravelTimeCache;
use osrm::{OsrmError, OsrmHttp};
pub use polyline::Polyline;

const RETRY_DELAY: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TravelTime {
    Minutes(u32),
    Unavailable,
}

impl TravelTime {
    pub fn minutes(self) -> Option<u32> {
        match self {
            TravelTime::Minutes(m) => Some(m),
            TravelTime::Unavailable => None,
        }
    }
}

/// Lock-free-readable counters for the Router Client (§4.A).
#[derive(Debug, Default)]
pub struct RouterStats {
    pub requests: AtomicU64,
    pub cache_hits: AtomicU64,
    pub api_errors: AtomicU64,
    pub breaker_openings: AtomicU64,
}

impl RouterStats {
    pub fn snapshot(&self) -> RouterStatsSnapshot {
        RouterStatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            api_errors: self.api_errors.load(Ordering::Relaxed),
            breaker_openings: self.breaker_openings.load(Ordering::Relaxed),
        }
    }
}

/// The abstraction `blocks`/`matching` program against, so tests can swap a
/// deterministic stub in for the real HTTP client (mirrors the teacher's
/// `DistanceMatrixProvider` trait).
pub trait TravelTimeProvider: Send + Sync {
    fn travel_time(&self, a: (f64, f64), b: (f64, f64)) -> TravelTime;
    /// Batch lookup, chunked internally by a real HTTP-backed provider
    /// (§4.A) — `token` lets a long matrix request be abandoned between
    /// chunks once the caller's job is cancelled or past its deadline.
    fn travel_matrix(&self, sources: &[(f64, f64)], destinations: &[(f64, f64)], token: &CancellationToken) -> Vec<Vec<TravelTime>>;
    fn geometry(&self, a: (f64, f64), b: (f64, f64)) -> Option<Polyline>;
}

pub struct RouterClient {
    http: OsrmHttp,
    cache: TravelTimeCache,
    breaker: Mutex<CircuitBreaker>,
    stats: Arc<RouterStats>,
}

impl RouterClient {
    pub fn new(config: RouterConfig) -> Result<Self, reqwest::Error> {
        let cache = TravelTimeCache::load(config.cache_path.clone());
        let http = OsrmHttp::new(config)?;
        Ok(Self {
            http,
            cache,
            breaker: Mutex::new(CircuitBreaker::new()),
            stats: Arc::new(RouterStats::default()),
        })
    }

    pub fn stats(&self) -> Arc<RouterStats> {
        Arc::clone(&self.stats)
    }

    pub fn flush_cache(&self) {
        self.cache.flush();
    }

    fn call_with_retry<T>(&self, f: impl Fn() -> Result<T, OsrmError>) -> Result<T, OsrmError> {
        match f() {
            Ok(v) => Ok(v),
            Err(_) => {
                std::thread::sleep(RETRY_DELAY);
                f()
            }
        }
    }

    fn record_failure(&self) {
        self.stats.api_errors.fetch_add(1, Ordering::Relaxed);
        let mut breaker = self.breaker.lock();
        let was_open_before = breaker.state() == BreakerState::Open;
        breaker.record_failure();
        if !was_open_before && breaker.state() == BreakerState::Open {
            self.stats.breaker_openings.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn record_success(&self) {
        self.breaker.lock().record_success();
    }

    fn breaker_allows(&self) -> bool {
        self.breaker.lock().allow_call()
    }
}

impl TravelTimeProvider for RouterClient {
    fn travel_time(&self, a: (f64, f64), b: (f64, f64)) -> TravelTime {
        self.stats.requests.fetch_add(1, Ordering::Relaxed);
        if a == b {
            return TravelTime::Minutes(0);
        }
        if let Some(minutes) = self.cache.get(a, b) {
            self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
            return TravelTime::Minutes(minutes);
        }
        if !self.breaker_allows() {
            return TravelTime::Unavailable;
        }
        match self.call_with_retry(|| self.http.table(&[a], &[b], None).map(|t| t[0][0])) {
            Ok(Some(minutes)) => {
                self.record_success();
                self.cache.put(a, b, minutes);
                TravelTime::Minutes(minutes)
            }
            Ok(None) => {
                self.record_success();
                TravelTime::Unavailable
            }
            Err(_) => {
                self.record_failure();
                TravelTime::Unavailable
            }
        }
    }

    fn travel_matrix(&self, sources: &[(f64, f64)], destinations: &[(f64, f64)], token: &CancellationToken) -> Vec<Vec<TravelTime>> {
        self.stats
            .requests
            .fetch_add((sources.len() * destinations.len()) as u64, Ordering::Relaxed);

        let mut result = vec![vec![TravelTime::Unavailable; destinations.len()]; sources.len()];
        let mut missing = false;
        for (i, &src) in sources.iter().enumerate() {
            for (j, &dst) in destinations.iter().enumerate() {
                if src == dst {
                    result[i][j] = TravelTime::Minutes(0);
                } else if let Some(minutes) = self.cache.get(src, dst) {
                    self.stats.cache_hits.fetch_add(1, Ordering::Relaxed);
                    result[i][j] = TravelTime::Minutes(minutes);
                } else {
                    missing = true;
                }
            }
        }

        if !missing {
            return result;
        }
        if !self.breaker_allows() {
            return result;
        }

        match self.call_with_retry(|| self.http.table(sources, destinations, Some(token))) {
            Ok(table) => {
                self.record_success();
                for (i, &src) in sources.iter().enumerate() {
                    for (j, &dst) in destinations.iter().enumerate() {
                        if let Some(minutes) = table.get(i).and_then(|row| row.get(j)).copied().flatten() {
                            self.cache.put(src, dst, minutes);
                            result[i][j] = TravelTime::Minutes(minutes);
                        }
                    }
                }
                result
            }
            Err(_) => {
                self.record_failure();
                result
            }
        }
    }

    fn geometry(&self, a: (f64, f64), b: (f64, f64)) -> Option<Polyline> {
        if !self.breaker_allows() {
            return None;
        }
        match self.call_with_retry(|| self.http.route(a, b)) {
            Ok((minutes, polyline)) => {
                self.record_success();
                self.cache.put(a, b, minutes);
                Some(polyline)
            }
            Err(_) => {
                self.record_failure();
                None
            }
        }
    }
}

/// Resolves a travel time from `provider`, falling back to a great-circle
/// estimate when the provider reports `Unavailable`. The provider never
/// makes this choice itself (§4.A: "the caller decides").
pub fn resolve_or_fallback(
    provider: &dyn TravelTimeProvider,
    estimator: &GreatCircleEstimator,
    a: (f64, f64),
    b: (f64, f64),
) -> u32 {
    match provider.travel_time(a, b) {
        TravelTime::Minutes(m) => m,
        TravelTime::Unavailable => estimator.minutes(a, b),
    }
}
