//! Data models for Strata.
//!
//! Defines the core types shared by the service and its storage adapters:
//! - Abstraction levels and their validation
//! - Chunk and cluster records with their store payload layout
//! - Tool request/response DTOs validated at the boundary

mod chunk;
mod cluster;
mod error;
mod level;
mod params;

pub mod payload;

pub use chunk::*;
pub use cluster::*;
pub use error::*;
pub use level::*;
pub use params::*;

use chrono::Utc;

/// Current UTC time as fractional Unix seconds.
pub fn now_timestamp() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
