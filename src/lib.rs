//! fleet-scheduler core
//!
//! Core fleet scheduling engine for school-bus route optimization: partitions
//! routes into daily blocks, chains them onto vehicles within a block,
//! matches chains across paired blocks, and assembles the final per-vehicle
//! schedules under a travel-time-aware feasibility model.

pub mod assembler;
pub mod blocks;
pub mod cancellation;
pub mod chain;
pub mod config;
pub mod engine;
pub mod error;
pub mod feasibility;
pub mod haversine;
pub mod matching;
pub mod model;
pub mod router;

pub use cancellation::CancellationToken;
pub use config::{OptimizationOptions, RouterConfig};
pub use engine::optimize;
pub use error::EngineError;
pub use model::{
    Block, BusSchedule, Diagnostics, JobStatus, OptimizationResult, Route, RouteJob, RouteType, ScheduleItem, ServiceDays, Stop, Weekday,
};
pub use router::{RouterClient, TravelTime, TravelTimeProvider};
