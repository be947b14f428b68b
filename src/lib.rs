//! Strata - hierarchical semantic memory for code.
//!
//! Stores context chunks at five abstraction levels, groups them into
//! online clusters, and answers prompts with a two-stage search packed into
//! a token budget. Exposed as MCP tools over stdio or HTTP.

pub mod api;
pub mod config;
mod error;
pub mod services;
mod state;

pub use config::Config;
pub use error::{Error, Result};
pub use state::AppState;
