//! Error types.
//!
//! Most error conditions in this crate are recoverable and surface as data
//! (an `UnassignedReason`, a `SolverStatus`, a job `JobStatus`) rather than
//! as `Result::Err` — see §7 of the design spec. The types here cover the
//! two classes of failure that are not data: malformed input construction
//! (`ModelError`) and genuinely fatal job-level conditions (`EngineError`).

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("route {route_id} has no stops")]
    EmptyRoute { route_id: String },
    #[error("route {route_id} has non-positive capacity")]
    InvalidCapacity { route_id: String },
    #[error("route {route_id} sets the anchor field for the wrong route type")]
    WrongAnchorField { route_id: String },
    #[error("route {route_id} stops are not contiguously ordered from 0")]
    NonContiguousStops { route_id: String },
    #[error("stop at order {order} has a negative minutes_from_start offset")]
    NegativeOffset { order: usize },
}

/// Fatal, job-aborting conditions. Everything else is reported as part of
/// the `OptimizationResult` rather than thrown.
#[derive(Debug, Error)]
pub enum EngineError {
    /// §4.F overlap validation failed — a bug in an upstream component.
    #[error("overlap violation on vehicle {vehicle_id}: {detail}")]
    OverlapViolation { vehicle_id: String, detail: String },
    /// A panic was caught at the job boundary and converted to `status = FAILED`.
    #[error("optimization job panicked: {0}")]
    Panicked(String),
}
