//! Raw HTTP calls against an OSRM-compatible routing service (§6 wire
//! contract). Adapted from the teacher's `osrm.rs`: same blocking
//! `reqwest` client and URL shapes, generalized to return sentinel
//! per-cell availability instead of propagating `Result` to callers, and to
//! round durations up to whole minutes instead of returning raw seconds.

use serde::Deserialize;
use std::time::Duration;

use super::polyline::Polyline;
use crate::cancellation::CancellationToken;
use crate::config::RouterConfig;

#[derive(Debug)]
pub enum OsrmError {
    Request(String),
    Status(String),
    Parse(String),
    NoRoute,
    Cancelled,
}

impl std::fmt::Display for OsrmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OsrmError::Request(msg) => write!(f, "OSRM request failed: {msg}"),
            OsrmError::Status(msg) => write!(f, "OSRM returned an error: {msg}"),
            OsrmError::Parse(msg) => write!(f, "failed to parse OSRM response: {msg}"),
            OsrmError::NoRoute => write!(f, "no route found between waypoints"),
            OsrmError::Cancelled => write!(f, "request abandoned: job cancelled or past its deadline"),
        }
    }
}

impl std::error::Error for OsrmError {}

pub struct OsrmHttp {
    config: RouterConfig,
    client: reqwest::blocking::Client,
}

impl OsrmHttp {
    pub fn new(config: RouterConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.connect_timeout() + config.read_timeout())
            .build()?;
        Ok(Self { config, client })
    }

    fn coords(points: &[(f64, f64)]) -> String {
        points
            .iter()
            .map(|(lat, lon)| format!("{lon:.6},{lat:.6}"))
            .collect::<Vec<_>>()
            .join(";")
    }

    /// Fetches the driving duration (rounded up to whole minutes) and decoded
    /// geometry for a single ordered pair.
    pub fn route(&self, a: (f64, f64), b: (f64, f64)) -> Result<(u32, Polyline), OsrmError> {
        let coords = Self::coords(&[a, b]);
        let url = format!(
            "{}/route/v1/{}/{}?overview=full&geometries=geojson",
            self.config.base_url, self.config.profile, coords
        );

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| OsrmError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OsrmError::Status(format!("HTTP {}", response.status())));
        }

        let body: OsrmRouteResponse = response.json().map_err(|e| OsrmError::Parse(e.to_string()))?;
        if body.code != "Ok" {
            return Err(OsrmError::Status(body.code));
        }
        let route = body.routes.into_iter().next().ok_or(OsrmError::NoRoute)?;
        let minutes = (route.duration / 60.0).ceil() as u32;
        let points = route
            .geometry
            .coordinates
            .into_iter()
            .filter_map(|c| match c.as_slice() {
                [lon, lat] => Some((*lat, *lon)),
                _ => None,
            })
            .collect();
        Ok((minutes, Polyline::new(points)))
    }

    /// Fetches a driving-duration matrix (minutes, rounded up; `None` for
    /// cells OSRM reports as unreachable) between `sources` and
    /// `destinations`, chunked so no request carries more than 100
    /// combined coordinates (§4.A). `token` is checked between chunks
    /// (§5) — pass `None` for single-pair lookups, which never chunk and
    /// so have nothing to abandon mid-request.
    pub fn table(
        &self,
        sources: &[(f64, f64)],
        destinations: &[(f64, f64)],
        token: Option<&CancellationToken>,
    ) -> Result<Vec<Vec<Option<u32>>>, OsrmError> {
        const MAX_COORDS_PER_REQUEST: usize = 100;
        let mut result = vec![vec![None; destinations.len()]; sources.len()];

        for src_chunk in chunk_indices(sources.len(), MAX_COORDS_PER_REQUEST / 2) {
            for dst_chunk in chunk_indices(destinations.len(), MAX_COORDS_PER_REQUEST / 2) {
                if token.is_some_and(CancellationToken::should_stop) {
                    return Err(OsrmError::Cancelled);
                }
                let rows = self.table_chunk(sources, destinations, &src_chunk, &dst_chunk)?;
                for (ri, &src_idx) in src_chunk.iter().enumerate() {
                    for (ci, &dst_idx) in dst_chunk.iter().enumerate() {
                        result[src_idx][dst_idx] = rows[ri][ci];
                    }
                }
            }
        }
        Ok(result)
    }

    fn table_chunk(
        &self,
        sources: &[(f64, f64)],
        destinations: &[(f64, f64)],
        src_idx: &[usize],
        dst_idx: &[usize],
    ) -> Result<Vec<Vec<Option<u32>>>, OsrmError> {
        let mut all_points: Vec<(f64, f64)> = src_idx.iter().map(|&i| sources[i]).collect();
        let source_param: Vec<String> = (0..src_idx.len()).map(|i| i.to_string()).collect();
        let dest_offset = all_points.len();
        all_points.extend(dst_idx.iter().map(|&i| destinations[i]));
        let dest_param: Vec<String> = (0..dst_idx.len())
            .map(|i| (dest_offset + i).to_string())
            .collect();

        let coords = Self::coords(&all_points);
        let url = format!(
            "{}/table/v1/{}/{}?annotations=duration&sources={}&destinations={}",
            self.config.base_url,
            self.config.profile,
            coords,
            source_param.join(";"),
            dest_param.join(";"),
        );

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| OsrmError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(OsrmError::Status(format!("HTTP {}", response.status())));
        }
        let body: OsrmTableResponse = response.json().map_err(|e| OsrmError::Parse(e.to_string()))?;
        let durations = body.durations.unwrap_or_default();
        Ok(durations
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|cell| cell.map(|secs| (secs / 60.0).ceil() as u32))
                    .collect()
            })
            .collect())
    }
}

/// Per-request timeout split as connect + read (§5: 10s total, 3s + 7s).
pub fn request_timeout(config: &RouterConfig) -> Duration {
    config.connect_timeout() + config.read_timeout()
}

fn chunk_indices(len: usize, chunk_size: usize) -> Vec<Vec<usize>> {
    if len == 0 {
        return Vec::new();
    }
    let chunk_size = chunk_size.max(1);
    (0..len)
        .collect::<Vec<_>>()
        .chunks(chunk_size)
        .map(|c| c.to_vec())
        .collect()
}

#[derive(Debug, Deserialize)]
struct OsrmTableResponse {
    durations: Option<Vec<Vec<Option<f64>>>>,
}

#[derive(Debug, Deserialize)]
struct OsrmRouteResponse {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    duration: f64,
    geometry: OsrmGeometry,
}

#[derive(Debug, Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<Vec<f64>>,
}
