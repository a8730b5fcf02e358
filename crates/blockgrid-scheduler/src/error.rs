//! Scheduler error types.

use std::time::Duration;

use thiserror::Error;

use crate::filters::FilterTrace;

/// Errors that can occur while building or running the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("unknown filter: {0}")]
    UnknownFilter(String),

    #[error("unknown weigher: {0}")]
    UnknownWeigher(String),

    #[error("no valid backend was found: {trace}")]
    NoValidBackend { trace: FilterTrace },

    #[error("{collaborator} did not answer within {timeout:?}")]
    Timeout {
        collaborator: &'static str,
        timeout: Duration,
    },

    #[error("service registry error: {0}")]
    Registry(#[source] anyhow::Error),

    #[error("telemetry error: {0}")]
    Telemetry(#[source] anyhow::Error),

    #[error("state store error: {0}")]
    State(#[from] blockgrid_state::StateError),

    #[error("configuration error: {0}")]
    Config(#[from] blockgrid_core::ConfigError),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
