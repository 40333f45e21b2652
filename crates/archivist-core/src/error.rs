use thiserror::Error;

use crate::app::scheduler::ScheduleError;
use crate::config::ConfigError;
use crate::domain::{QueueError, StoreError};

/// Top-level error for wiring and running the archiver.
#[derive(Debug, Error)]
pub enum ArchivistError {
    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Schedule(#[from] ScheduleError),

    #[error("invalid refresh target: {0}")]
    InvalidTarget(String),
}
