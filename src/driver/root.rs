//! The storage root bound at initialization and the handle that pins it.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use super::error::{DriverError, DriverResult};
use super::naming;

/// Dataset and mountpoint backing the driver's root directory.
///
/// Built once by `ZfsDriver::init` and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRoot {
    root: PathBuf,
    dataset: String,
    mountpoint: PathBuf,
}

impl StorageRoot {
    /// Parse the tab-separated output of `zfs list -H -o name,mountpoint` for
    /// `root`. The name is the first tab-separated field and the mountpoint
    /// the last; exactly one filesystem must be reported and it must be
    /// mounted at `root` itself.
    pub fn from_listing(root: &Path, listing: &str) -> DriverResult<Self> {
        let ambiguous =
            |reason: String| DriverError::AmbiguousRoot { root: root.to_path_buf(), reason };

        let lines: Vec<&str> = listing.lines().filter(|line| !line.trim().is_empty()).collect();
        let line = match lines.as_slice() {
            [] => return Err(ambiguous("no filesystem reported".to_string())),
            [line] => *line,
            many => return Err(ambiguous(format!("{} filesystems reported", many.len()))),
        };

        let fields: Vec<&str> = line.split('\t').filter(|field| !field.is_empty()).collect();
        if fields.len() < 2 {
            return Err(ambiguous(format!("malformed listing line {line:?}")));
        }

        let dataset = fields[0].to_string();
        let mountpoint = fields[fields.len() - 1].trim_end_matches(['\n', '\r']);

        if !mountpoint.starts_with('/') {
            return Err(ambiguous(format!("dataset {dataset} is not mounted ({mountpoint})")));
        }

        let mountpoint = PathBuf::from(mountpoint);
        if mountpoint != root {
            return Err(ambiguous(format!(
                "it lies inside dataset {dataset} mounted at {}",
                mountpoint.display()
            )));
        }

        Ok(Self { root: root.to_path_buf(), dataset, mountpoint })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    pub fn mountpoint(&self) -> &Path {
        &self.mountpoint
    }

    pub fn layer_dataset(&self, id: &str) -> DriverResult<String> {
        naming::layer_dataset(&self.dataset, id)
    }

    pub fn layer_path(&self, id: &str) -> DriverResult<PathBuf> {
        naming::layer_path(&self.mountpoint, id)
    }
}

/// A direct child of the root dataset as reported by
/// `zfs list -H -o name,mounted -r -d 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildDataset {
    pub name: String,
    pub mounted: bool,
}

/// Parse a children listing, skipping the root dataset itself and any line
/// that does not have both fields.
pub fn parse_children(root_dataset: &str, listing: &str) -> Vec<ChildDataset> {
    listing
        .lines()
        .filter_map(|line| {
            let mut fields = line.split('\t').filter(|field| !field.is_empty());
            let name = fields.next()?.trim();
            let mounted = fields.next_back()?.trim();
            if name.is_empty() || name == root_dataset {
                return None;
            }
            Some(ChildDataset { name: name.to_string(), mounted: mounted == "yes" })
        })
        .collect()
}

/// Open handle on the root mountpoint, held for the life of the driver.
///
/// While the handle is open the filesystem cannot be unmounted from under
/// the driver without force, so paths handed out by `get` stay valid.
#[derive(Debug)]
pub struct MountPin {
    path: PathBuf,
    _handle: File,
}

impl MountPin {
    pub fn acquire(path: &Path) -> DriverResult<Self> {
        let handle = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_DIRECTORY | libc::O_CLOEXEC)
            .open(path)
            .map_err(|source| DriverError::MountPinFailed { path: path.to_path_buf(), source })?;

        tracing::debug!(path = %path.display(), "Pinned root mountpoint");
        Ok(Self { path: path.to_path_buf(), _handle: handle })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for MountPin {
    fn drop(&mut self) {
        tracing::debug!(path = %self.path.display(), "Released root mountpoint");
    }
}
