//! Names for layer datasets, mount paths and transient snapshots.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::error::{DriverError, DriverResult};

/// ZFS caps full dataset names at 255 bytes; leave room for the root dataset.
const MAX_LAYER_ID_LENGTH: usize = 200;

/// Prefix of every snapshot the driver takes, so they never collide with
/// snapshots created by other tools.
pub const SNAPSHOT_PREFIX: &str = "graph-";

pub fn validate_layer_id(id: &str) -> DriverResult<()> {
    let invalid = |reason| Err(DriverError::InvalidLayerId { id: id.to_string(), reason });

    if id.is_empty() {
        return invalid("empty id");
    }
    if id.len() > MAX_LAYER_ID_LENGTH {
        return invalid("longer than 200 bytes");
    }
    if id == "." || id == ".." {
        return invalid("reserved path component");
    }
    if !id.bytes().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b':')) {
        return invalid("only [A-Za-z0-9_.:-] are allowed");
    }
    Ok(())
}

/// Dataset backing layer `id`: a direct child of the root dataset.
pub fn layer_dataset(root_dataset: &str, id: &str) -> DriverResult<String> {
    validate_layer_id(id)?;
    Ok(format!("{}/{}", root_dataset.trim_end_matches('/'), id))
}

/// Path at which layer `id` is mounted.
pub fn layer_path(mountpoint: &Path, id: &str) -> DriverResult<PathBuf> {
    validate_layer_id(id)?;
    Ok(mountpoint.join(id))
}

/// How transient snapshot names are chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotNaming {
    /// `graph-<child id>-<hex>`. The suffix keeps a snapshot left behind by a
    /// failed creation from blocking the next attempt for the same id.
    #[default]
    Derived,
    /// `graph-<hex>` from a random 31-bit value. Concurrent creations on the
    /// same parent can collide, with negligible probability.
    Random,
}

impl fmt::Display for SnapshotNaming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SnapshotNaming::Derived => f.write_str("derived"),
            SnapshotNaming::Random => f.write_str("random"),
        }
    }
}

/// Names the snapshot taken on a parent while creating a child layer.
///
/// The random generator is seeded once and owned by the driver instance.
#[derive(Debug)]
pub struct SnapshotNamer {
    naming: SnapshotNaming,
    rng: Mutex<StdRng>,
}

impl SnapshotNamer {
    pub fn new(naming: SnapshotNaming) -> Self {
        Self::with_rng(naming, StdRng::from_os_rng())
    }

    pub fn with_seed(naming: SnapshotNaming, seed: u64) -> Self {
        Self::with_rng(naming, StdRng::seed_from_u64(seed))
    }

    fn with_rng(naming: SnapshotNaming, rng: StdRng) -> Self {
        Self { naming, rng: Mutex::new(rng) }
    }

    pub fn naming(&self) -> SnapshotNaming {
        self.naming
    }

    /// Snapshot name (the part after `@`) for creating layer `child_id`.
    /// Every call draws a fresh suffix.
    pub fn snapshot_name(&self, child_id: &str) -> String {
        let value = self.next_value();
        match self.naming {
            SnapshotNaming::Derived => format!("{SNAPSHOT_PREFIX}{child_id}-{value:08x}"),
            SnapshotNaming::Random => format!("{SNAPSHOT_PREFIX}{value:08x}"),
        }
    }

    fn next_value(&self) -> u32 {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.random_range(0..(1u32 << 31))
    }
}
