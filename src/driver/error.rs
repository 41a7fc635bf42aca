use std::path::PathBuf;
use thiserror::Error;

use crate::gateway::GatewayError;

pub type DriverResult<T> = Result<T, DriverError>;

/// Errors returned by the layer driver.
///
/// Backend failures keep the underlying `GatewayError` as their source so the
/// caller can see exactly what `zfs` reported.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("ZFS is not available on this host: {0}")]
    BackendUnavailable(String),

    #[error("Root {root} is not a single ZFS filesystem: {reason}")]
    AmbiguousRoot { root: PathBuf, reason: String },

    #[error("Could not pin mountpoint {path}: {source}")]
    MountPinFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid layer id {id:?}: {reason}")]
    InvalidLayerId { id: String, reason: &'static str },

    #[error("Failed to create layer {id}: {source}")]
    CreateFailed {
        id: String,
        #[source]
        source: GatewayError,
    },

    #[error("Failed to snapshot parent {parent} as {snapshot}: {source}")]
    SnapshotFailed {
        parent: String,
        snapshot: String,
        #[source]
        source: GatewayError,
    },

    #[error("Failed to clone {snapshot} into layer {id}: {source}")]
    CloneFailed {
        id: String,
        snapshot: String,
        #[source]
        source: GatewayError,
    },

    #[error("Failed to unmount layer {id}: {source}")]
    UnmountFailed {
        id: String,
        #[source]
        source: GatewayError,
    },

    #[error("Failed to remove layer {id}: {source}")]
    RemoveFailed {
        id: String,
        #[source]
        source: GatewayError,
    },

    #[error("Failed to mount layer {id}: {source}")]
    MountFailed {
        id: String,
        #[source]
        source: GatewayError,
    },

    #[error("Failed to query layer {id}: {source}")]
    QueryFailed {
        id: String,
        #[source]
        source: GatewayError,
    },

    #[error("Cleanup left {} dataset(s) mounted: {}", .failed.len(), .failed.join(", "))]
    CleanupFailed { failed: Vec<String> },
}

impl DriverError {
    /// The backend failure behind this error, if any.
    pub fn gateway_error(&self) -> Option<&GatewayError> {
        match self {
            DriverError::CreateFailed { source, .. }
            | DriverError::SnapshotFailed { source, .. }
            | DriverError::CloneFailed { source, .. }
            | DriverError::UnmountFailed { source, .. }
            | DriverError::RemoveFailed { source, .. }
            | DriverError::MountFailed { source, .. }
            | DriverError::QueryFailed { source, .. } => Some(source),
            _ => None,
        }
    }
}
