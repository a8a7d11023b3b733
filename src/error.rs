use thiserror::Error;

use crate::node::NodeId;

/// Locator error types
///
/// Missing data (no pose, no fix, empty window) is never an error; those
/// paths return `None` or do nothing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocatorError {
    #[error("{node} has no geographic coordinate and the locator trusts fixes only")]
    MissingFixCoordinate { node: NodeId },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to load configuration: {0}")]
    ConfigIo(String),

    #[error("Locator task is no longer running")]
    SchedulerClosed,
}

/// Result type for locator operations
pub type LocatorResult<T> = Result<T, LocatorError>;
