//! ZFS layer driver.
//!
//! Maps layer ids onto child datasets of the root dataset. A layer without a
//! parent is a fresh empty dataset; a layer with a parent is a clone of a
//! transient snapshot of the parent, so no data is copied up front. Layers
//! are left unmounted after creation and mounted lazily by `get`.

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::error::{DriverError, DriverResult};
use super::metrics::DriverMetrics;
use super::naming::SnapshotNamer;
use super::platform;
use super::root::{MountPin, StorageRoot, parse_children};
use super::traits::GraphDriver;
use crate::config::DriverConfig;
use crate::gateway::{CommandRunner, GatewayError, Zfs, ZfsCommand};

pub const DRIVER_NAME: &str = "zfs";

/// What the backend knows about a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerState {
    Missing,
    Unmounted,
    Mounted,
}

impl fmt::Display for LayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerState::Missing => f.write_str("missing"),
            LayerState::Unmounted => f.write_str("unmounted"),
            LayerState::Mounted => f.write_str("mounted"),
        }
    }
}

fn is_missing_dataset(err: &GatewayError) -> bool {
    err.stderr().is_some_and(|stderr| stderr.contains("dataset does not exist"))
}

fn is_not_mounted(err: &GatewayError) -> bool {
    err.stderr().is_some_and(|stderr| stderr.contains("not currently mounted"))
}

/// Layer driver bound to one root dataset.
///
/// Operations on different ids may run concurrently. Operations on the same
/// id are not coordinated; callers serialize those themselves.
pub struct ZfsDriver {
    root: StorageRoot,
    zfs: Zfs,
    namer: SnapshotNamer,
    metrics: Option<Arc<DriverMetrics>>,
    pin: MountPin,
}

impl ZfsDriver {
    /// Bind the driver to `config.root`.
    ///
    /// Checks that the kernel knows ZFS, resolves the dataset mounted at the
    /// root and pins the mountpoint with an open handle for the life of the
    /// driver.
    pub async fn init(config: &DriverConfig, runner: Arc<dyn CommandRunner>) -> DriverResult<Self> {
        info!(root = %config.root.display(), "Initializing ZFS layer driver");

        platform::ensure_zfs_supported(&config.filesystems_path).await?;

        if !config.root.is_absolute() {
            return Err(DriverError::AmbiguousRoot {
                root: config.root.clone(),
                reason: "root must be an absolute path".to_string(),
            });
        }

        let zfs = Zfs::new(config.zfs_binary.clone(), runner);
        let listing = zfs
            .run(ZfsCommand::ListRoot { path: config.root.clone() })
            .await
            .map_err(|e| DriverError::AmbiguousRoot {
                root: config.root.clone(),
                reason: e.to_string(),
            })?;

        let root = StorageRoot::from_listing(&config.root, &listing.stdout)?;
        let pin = MountPin::acquire(root.mountpoint())?;

        info!(
            dataset = %root.dataset(),
            mountpoint = %root.mountpoint().display(),
            snapshot_naming = %config.snapshot_naming,
            "ZFS layer driver ready"
        );

        Ok(Self { root, zfs, namer: SnapshotNamer::new(config.snapshot_naming), metrics: None, pin })
    }

    pub fn with_metrics(mut self, metrics: Arc<DriverMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_namer(mut self, namer: SnapshotNamer) -> Self {
        self.namer = namer;
        self
    }

    pub fn storage_root(&self) -> &StorageRoot {
        &self.root
    }

    /// Tri-state lookup: unlike `exists`, a backend failure other than
    /// "dataset does not exist" is reported as an error.
    pub async fn state(&self, id: &str) -> DriverResult<LayerState> {
        let dataset = self.root.layer_dataset(id)?;
        match self.zfs.run(ZfsCommand::GetMounted { dataset }).await {
            Ok(output) if output.stdout == "yes" => Ok(LayerState::Mounted),
            Ok(_) => Ok(LayerState::Unmounted),
            Err(err) if is_missing_dataset(&err) => Ok(LayerState::Missing),
            Err(source) => Err(DriverError::QueryFailed { id: id.to_string(), source }),
        }
    }

    /// Unmount all layers, then release the root pin.
    pub async fn shutdown(self) -> DriverResult<()> {
        let result = self.cleanup().await;
        info!(mountpoint = %self.pin.path().display(), "ZFS layer driver shut down");
        result
    }

    fn observe<T>(&self, operation: &str, started: Instant, result: &DriverResult<T>) {
        if let Some(metrics) = &self.metrics {
            metrics.record_operation(operation, started.elapsed().as_secs_f64(), result.is_ok());
        }
    }

    fn count_leaked_snapshot(&self) {
        if let Some(metrics) = &self.metrics {
            metrics.leaked_snapshots.inc();
        }
    }

    async fn create_layer(&self, id: &str, parent: Option<&str>) -> DriverResult<()> {
        match parent.filter(|parent| !parent.is_empty()) {
            None => self.create_empty(id).await,
            Some(parent) => self.create_from_parent(id, parent).await,
        }
    }

    async fn create_empty(&self, id: &str) -> DriverResult<()> {
        let dataset = self.root.layer_dataset(id)?;
        info!(id = %id, dataset = %dataset, "Creating empty layer");

        self.zfs
            .run(ZfsCommand::Create { dataset: dataset.clone() })
            .await
            .map_err(|source| DriverError::CreateFailed { id: id.to_string(), source })?;

        // A fresh dataset comes up mounted; mounting is left to `get`.
        self.zfs
            .run(ZfsCommand::Unmount { dataset })
            .await
            .map_err(|source| DriverError::CreateFailed { id: id.to_string(), source })?;

        Ok(())
    }

    async fn create_from_parent(&self, id: &str, parent: &str) -> DriverResult<()> {
        let dataset = self.root.layer_dataset(id)?;
        let parent_dataset = self.root.layer_dataset(parent)?;
        let snapshot = format!("{parent_dataset}@{}", self.namer.snapshot_name(id));

        info!(id = %id, parent = %parent, snapshot = %snapshot, "Creating layer from parent");

        self.zfs.run(ZfsCommand::Snapshot { snapshot: snapshot.clone() }).await.map_err(
            |source| DriverError::SnapshotFailed {
                parent: parent.to_string(),
                snapshot: snapshot.clone(),
                source,
            },
        )?;

        let cloned = self
            .zfs
            .run(ZfsCommand::Clone { snapshot: snapshot.clone(), dataset: dataset.clone() })
            .await;
        if let Err(source) = cloned {
            warn!(id = %id, snapshot = %snapshot, "Clone failed, snapshot left behind");
            self.count_leaked_snapshot();
            return Err(DriverError::CloneFailed { id: id.to_string(), snapshot, source });
        }

        if let Err(source) = self.zfs.run(ZfsCommand::Unmount { dataset }).await {
            warn!(id = %id, snapshot = %snapshot, "Unmount failed, snapshot not released");
            self.count_leaked_snapshot();
            return Err(DriverError::UnmountFailed { id: id.to_string(), source });
        }

        // The clone is usable from here on; a snapshot that cannot be
        // released is reported but does not fail the creation.
        let released = self.zfs.run(ZfsCommand::DestroyDeferred { snapshot: snapshot.clone() }).await;
        if let Err(err) = released {
            warn!(
                id = %id,
                snapshot = %snapshot,
                error = %err,
                "Could not mark snapshot for deferred destruction"
            );
            self.count_leaked_snapshot();
        }

        Ok(())
    }

    async fn remove_layer(&self, id: &str) -> DriverResult<()> {
        let dataset = self.root.layer_dataset(id)?;
        info!(id = %id, dataset = %dataset, "Removing layer");

        self.zfs
            .run(ZfsCommand::DestroyRecursive { dataset })
            .await
            .map_err(|source| DriverError::RemoveFailed { id: id.to_string(), source })?;

        Ok(())
    }

    async fn mount_layer(&self, id: &str) -> DriverResult<PathBuf> {
        let dataset = self.root.layer_dataset(id)?;
        let path = self.root.layer_path(id)?;

        let mounted = self
            .zfs
            .run(ZfsCommand::GetMounted { dataset: dataset.clone() })
            .await
            .map_err(|source| DriverError::MountFailed { id: id.to_string(), source })?;

        if mounted.stdout == "yes" {
            debug!(id = %id, path = %path.display(), "Layer already mounted");
            return Ok(path);
        }

        self.zfs
            .run(ZfsCommand::Mount { dataset })
            .await
            .map_err(|source| DriverError::MountFailed { id: id.to_string(), source })?;

        info!(id = %id, path = %path.display(), "Mounted layer");
        Ok(path)
    }

    async fn cleanup_layers(&self) -> DriverResult<()> {
        let root_dataset = self.root.dataset();
        let listing = self
            .zfs
            .run(ZfsCommand::ListChildren { dataset: root_dataset.to_string() })
            .await
            .map_err(|source| DriverError::QueryFailed { id: root_dataset.to_string(), source })?;

        let mut failed = Vec::new();
        for child in parse_children(root_dataset, &listing.stdout) {
            if !child.mounted {
                continue;
            }

            match self.zfs.run(ZfsCommand::Unmount { dataset: child.name.clone() }).await {
                Ok(_) => debug!(dataset = %child.name, "Unmounted layer"),
                Err(err) if is_not_mounted(&err) => {
                    debug!(dataset = %child.name, "Layer was already unmounted")
                }
                Err(err) => {
                    warn!(dataset = %child.name, error = %err, "Failed to unmount layer");
                    failed.push(child.name);
                }
            }
        }

        if !failed.is_empty() {
            return Err(DriverError::CleanupFailed { failed });
        }

        info!(dataset = %root_dataset, "Unmounted all layers");
        Ok(())
    }
}

#[async_trait]
impl GraphDriver for ZfsDriver {
    fn name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn status(&self) -> Vec<(String, String)> {
        vec![
            ("Root Dir".to_string(), self.root.root().display().to_string()),
            ("Dataset".to_string(), self.root.dataset().to_string()),
            ("Mountpoint".to_string(), self.root.mountpoint().display().to_string()),
            ("Snapshot Naming".to_string(), self.namer.naming().to_string()),
        ]
    }

    async fn create(&self, id: &str, parent: Option<&str>) -> DriverResult<()> {
        let started = Instant::now();
        let result = self.create_layer(id, parent).await;
        self.observe("create", started, &result);
        result
    }

    async fn remove(&self, id: &str) -> DriverResult<()> {
        let started = Instant::now();
        let result = self.remove_layer(id).await;
        self.observe("remove", started, &result);
        result
    }

    async fn get(&self, id: &str) -> DriverResult<PathBuf> {
        let started = Instant::now();
        let result = self.mount_layer(id).await;
        self.observe("get", started, &result);
        result
    }

    /// `false` covers both "no such layer" and "the query failed"; use
    /// `ZfsDriver::state` to tell them apart.
    async fn exists(&self, id: &str) -> bool {
        let Ok(dataset) = self.root.layer_dataset(id) else {
            return false;
        };
        self.zfs.run(ZfsCommand::GetMounted { dataset }).await.is_ok()
    }

    async fn cleanup(&self) -> DriverResult<()> {
        let started = Instant::now();
        let result = self.cleanup_layers().await;
        self.observe("cleanup", started, &result);
        result
    }
}

impl fmt::Debug for ZfsDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ZfsDriver")
            .field("root", &self.root)
            .field("zfs", &self.zfs)
            .field("naming", &self.namer.naming())
            .finish_non_exhaustive()
    }
}
