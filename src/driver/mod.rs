//! Layer lifecycle management on ZFS.
//!
//! This module provides:
//! - Initialization against a root dataset (platform probe, root discovery,
//!   mountpoint pin)
//! - Layer create/remove/get/exists/cleanup through the `GraphDriver` trait
//! - Copy-on-write layer creation via snapshot and clone
//! - Validated naming of layer datasets, mount paths and snapshots
//! - Per-operation metrics

mod error;
mod manager;
mod metrics;
mod naming;
mod platform;
mod root;
mod traits;

pub use error::{DriverError, DriverResult};
pub use manager::{DRIVER_NAME, LayerState, ZfsDriver};
pub use metrics::DriverMetrics;
pub use naming::{
    SNAPSHOT_PREFIX, SnapshotNamer, SnapshotNaming, layer_dataset, layer_path, validate_layer_id,
};
pub use platform::{ZFS_FILESYSTEM_TYPE, ensure_zfs_supported, filesystem_listed};
pub use root::{ChildDataset, MountPin, StorageRoot, parse_children};
pub use traits::GraphDriver;
