//! Host capability probe.

use std::path::Path;

use super::error::{DriverError, DriverResult};

pub const ZFS_FILESYSTEM_TYPE: &str = "zfs";

/// Whether `fstype` appears in a `/proc/filesystems` style listing.
///
/// Each line is an optional `nodev` flag followed by the type name.
pub fn filesystem_listed(listing: &str, fstype: &str) -> bool {
    listing.lines().any(|line| line.split_whitespace().any(|word| word == fstype))
}

/// Fails with `BackendUnavailable` unless the kernel has ZFS registered.
pub async fn ensure_zfs_supported(filesystems_path: &Path) -> DriverResult<()> {
    let listing = tokio::fs::read_to_string(filesystems_path).await.map_err(|e| {
        DriverError::BackendUnavailable(format!(
            "cannot read {}: {}",
            filesystems_path.display(),
            e
        ))
    })?;

    if !filesystem_listed(&listing, ZFS_FILESYSTEM_TYPE) {
        return Err(DriverError::BackendUnavailable(format!(
            "{ZFS_FILESYSTEM_TYPE} was not found in {}",
            filesystems_path.display()
        )));
    }

    tracing::debug!(path = %filesystems_path.display(), "ZFS is supported");
    Ok(())
}
