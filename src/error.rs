//! Error types for vehicle configuration and scheduling.
//!
//! Step functions never fail; everything here is raised at author time
//! (validation, config loading) or when a sequence is assembled.

use thiserror::Error;

/// Errors raised while building or configuring a vehicle.
#[derive(Debug, Error)]
pub enum VehicleError {
    /// A Params block failed validation against its axle description.
    #[error("invalid {block}: {reason}")]
    InvalidParams {
        /// Name of the offending Params block.
        block: &'static str,
        /// What was wrong.
        reason: String,
    },

    /// A bounded container or table ran out of room.
    #[error("{what} capacity of {capacity} exceeded")]
    CapacityExceeded {
        /// Which container overflowed.
        what: &'static str,
        /// Its fixed capacity.
        capacity: usize,
    },

    /// A substep-group handle outlived the sequence layout it was issued for.
    #[error("stale substep group handle (index {index}, generation {generation})")]
    StaleHandle {
        /// Arena index.
        index: usize,
        /// Generation the handle was issued with.
        generation: u32,
    },

    /// `begin_substep_group` / `end_substep_group` calls do not pair up.
    #[error("unbalanced substep groups: {0}")]
    UnbalancedSubstepGroup(&'static str),

    /// Reading a configuration file failed.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration file could not be parsed.
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
}

impl VehicleError {
    /// Creates an invalid-params error.
    pub fn invalid(block: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParams { block, reason: reason.into() }
    }
}

/// Result alias for vehicle operations.
pub type Result<T> = std::result::Result<T, VehicleError>;
