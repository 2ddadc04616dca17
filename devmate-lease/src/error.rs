use std::io;

use thiserror::Error;

use crate::device::Status;

pub type Result<T> = std::result::Result<T, LeaseError>;

/// Reasons a device operation did not take effect.
///
/// Everything except [`LeaseError::Store`] is caller-correctable.
#[derive(Debug, Error)]
pub enum LeaseError {
    /// The referenced device does not exist.
    #[error("device not found")]
    NotFound,

    /// A device with the same name already exists.
    #[error("device with this name already exists")]
    AlreadyExists,

    /// The device is not in the state the transition requires.
    #[error("device is {status}")]
    Conflict {
        status: Status,
        owner: Option<String>,
    },

    /// The device is already in the requested state; nothing changed.
    #[error("device already in requested state")]
    NoOp,

    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LeaseError {
    /// Current owner reported by a [`LeaseError::Conflict`], if any.
    pub fn conflict_owner(&self) -> Option<&str> {
        match self {
            LeaseError::Conflict { owner, .. } => owner.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o: {0}")]
    Io(#[from] io::Error),

    #[error("store encoding: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("store write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("corrupt device record {name:?}: {reason}")]
    Corrupt { name: String, reason: String },
}
