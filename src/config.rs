//! Configuration records. Nothing in this crate reads environment variables
//! or configuration files directly (§6) — these are plain, `serde`-friendly
//! structs a host collaborator populates from whatever source it likes,
//! mirroring the teacher's `OsrmConfig` pattern of a `Default`-backed
//! plain-data config struct.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tuning knobs for one optimization request, as specified in §6.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationOptions {
    pub max_time_shift_entry_minutes: i32,
    pub max_time_shift_exit_early_minutes: i32,
    pub max_time_shift_exit_late_minutes: i32,
    pub min_buffer_minutes: i32,
    pub capacity_max_diff: u32,
    pub ilp_time_limit_seconds: u64,
    pub job_time_limit_seconds: u64,
    pub fallback_speed_kmh: f64,
    pub local_search_max_passes: usize,
    pub random_seed: u64,
    /// Bypasses the ILP backend entirely in favor of the greedy fallback.
    /// Not part of the original option set — an ambient affordance so
    /// tests never need a live MILP solver to exercise chain assembly.
    pub ilp_enabled: bool,
}

impl Default for OptimizationOptions {
    fn default() -> Self {
        Self {
            max_time_shift_entry_minutes: 5,
            max_time_shift_exit_early_minutes: 5,
            max_time_shift_exit_late_minutes: 10,
            min_buffer_minutes: 5,
            capacity_max_diff: 20,
            ilp_time_limit_seconds: 60,
            job_time_limit_seconds: 300,
            fallback_speed_kmh: 45.0,
            local_search_max_passes: 5,
            random_seed: 0,
            ilp_enabled: true,
        }
    }
}

impl OptimizationOptions {
    /// Allowed shift window `[lower, upper]` for a given block's route type.
    pub fn shift_bounds(&self, route_type: crate::model::RouteType) -> (i32, i32) {
        match route_type {
            crate::model::RouteType::Entry => {
                (-self.max_time_shift_entry_minutes, self.max_time_shift_entry_minutes)
            }
            crate::model::RouteType::Exit => {
                (-self.max_time_shift_exit_early_minutes, self.max_time_shift_exit_late_minutes)
            }
        }
    }

    pub fn ilp_time_limit(&self) -> Duration {
        Duration::from_secs(self.ilp_time_limit_seconds)
    }

    pub fn job_time_limit(&self) -> Duration {
        Duration::from_secs(self.job_time_limit_seconds)
    }

    pub fn ilp_enabled(&self) -> bool {
        self.ilp_enabled
    }
}

/// Connection details for the OSRM-compatible routing service and its
/// on-disk travel-time cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub base_url: String,
    pub profile: String,
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub cache_path: Option<PathBuf>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000".to_string(),
            profile: "driving".to_string(),
            connect_timeout_secs: 3,
            read_timeout_secs: 7,
            cache_path: None,
        }
    }
}

impl RouterConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}
