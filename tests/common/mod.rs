// In-memory ZFS emulator for driver integration tests.
//
// Datasets are backed by real directories so copy-on-write behaviour can be
// checked with real files. A mounted dataset's content lives at its
// mountpoint; an unmounted one is moved to a private store.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use zfsdriver::config::DriverConfig;
use zfsdriver::driver::{SnapshotNaming, ZfsDriver};
use zfsdriver::gateway::{CommandOutput, CommandRunner, GatewayError, GatewayResult};

pub const ROOT_DATASET: &str = "pool/docker";

#[derive(Debug)]
struct Dataset {
    mounted: bool,
    origin: Option<String>,
}

#[derive(Debug)]
struct Snapshot {
    clones: usize,
    deferred: bool,
}

#[derive(Default)]
struct State {
    datasets: BTreeMap<String, Dataset>,
    snapshots: BTreeMap<String, Snapshot>,
    calls: Vec<Vec<String>>,
    failures: Vec<(String, String)>,
}

pub struct FakeZfs {
    mountpoint: PathBuf,
    store: PathBuf,
    state: Mutex<State>,
}

fn failed(args: &[String], stderr: String) -> GatewayError {
    GatewayError::Failed {
        command: format!("zfs {}", args.join(" ")),
        status: "exit status: 1".to_string(),
        stdout: String::new(),
        stderr,
    }
}

pub fn copy_tree(from: &Path, to: &Path) -> std::io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

impl FakeZfs {
    pub fn new(mountpoint: PathBuf, store: PathBuf) -> Self {
        let mut state = State::default();
        state.datasets.insert(ROOT_DATASET.to_string(), Dataset { mounted: true, origin: None });
        Self { mountpoint, store, state: Mutex::new(state) }
    }

    /// Make the next invocation of `subcommand` fail with `stderr`.
    pub fn fail_next(&self, subcommand: &str, stderr: &str) {
        self.state.lock().unwrap().failures.push((subcommand.to_string(), stderr.to_string()));
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count_calls(&self, subcommand: &str) -> usize {
        self.calls().iter().filter(|call| call.first().map(String::as_str) == Some(subcommand)).count()
    }

    pub fn snapshot_names(&self) -> Vec<String> {
        self.state.lock().unwrap().snapshots.keys().cloned().collect()
    }

    pub fn dataset_names(&self) -> Vec<String> {
        self.state.lock().unwrap().datasets.keys().cloned().collect()
    }

    pub fn is_mounted(&self, dataset: &str) -> bool {
        self.state.lock().unwrap().datasets.get(dataset).is_some_and(|ds| ds.mounted)
    }

    fn child_id(dataset: &str) -> &str {
        dataset.rsplit('/').next().unwrap_or(dataset)
    }

    fn mounted_dir(&self, dataset: &str) -> PathBuf {
        self.mountpoint.join(Self::child_id(dataset))
    }

    fn stored_dir(&self, dataset: &str) -> PathBuf {
        self.store.join("datasets").join(Self::child_id(dataset))
    }

    fn snapshot_dir(&self, snapshot: &str) -> PathBuf {
        self.store.join("snapshots").join(snapshot.replace(['/', '@'], "_"))
    }

    fn content_dir(&self, dataset: &str, ds: &Dataset) -> PathBuf {
        if dataset == ROOT_DATASET {
            self.mountpoint.clone()
        } else if ds.mounted {
            self.mounted_dir(dataset)
        } else {
            self.stored_dir(dataset)
        }
    }

    fn execute(&self, state: &mut State, args: &[String]) -> Result<String, String> {
        let argv: Vec<&str> = args.iter().map(String::as_str).collect();
        match argv.as_slice() {
            ["list", "-H", "-o", "name,mountpoint", "-t", "filesystem", path] => {
                // A path below the mountpoint resolves to the enclosing dataset.
                if Path::new(path).starts_with(&self.mountpoint) {
                    Ok(format!("{ROOT_DATASET}\t{}\n", self.mountpoint.display()))
                } else {
                    Err(format!("cannot open '{path}': dataset does not exist"))
                }
            }
            ["list", "-H", "-o", "name,mounted", "-t", "filesystem", "-r", "-d", "1", dataset] => {
                if !state.datasets.contains_key(*dataset) {
                    return Err(format!("cannot open '{dataset}': dataset does not exist"));
                }
                Ok(state
                    .datasets
                    .iter()
                    .map(|(name, ds)| format!("{name}\t{}", if ds.mounted { "yes" } else { "no" }))
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
            ["create", dataset] => {
                if state.datasets.contains_key(*dataset) {
                    return Err(format!("cannot create '{dataset}': dataset already exists"));
                }
                fs::create_dir_all(self.mounted_dir(dataset)).map_err(|e| e.to_string())?;
                state.datasets.insert(dataset.to_string(), Dataset { mounted: true, origin: None });
                Ok(String::new())
            }
            ["snapshot", snapshot] => {
                let (dataset, _) = snapshot.split_once('@').ok_or("invalid snapshot name")?;
                let ds = state
                    .datasets
                    .get(dataset)
                    .ok_or_else(|| format!("cannot open '{dataset}': dataset does not exist"))?;
                if state.snapshots.contains_key(*snapshot) {
                    return Err(format!("cannot create snapshot '{snapshot}': dataset already exists"));
                }
                copy_tree(&self.content_dir(dataset, ds), &self.snapshot_dir(snapshot))
                    .map_err(|e| e.to_string())?;
                state.snapshots.insert(snapshot.to_string(), Snapshot { clones: 0, deferred: false });
                Ok(String::new())
            }
            ["clone", snapshot, dataset] => {
                if !state.snapshots.contains_key(*snapshot) {
                    return Err(format!("cannot open '{snapshot}': dataset does not exist"));
                }
                if state.datasets.contains_key(*dataset) {
                    return Err(format!("cannot create '{dataset}': dataset already exists"));
                }
                copy_tree(&self.snapshot_dir(snapshot), &self.mounted_dir(dataset))
                    .map_err(|e| e.to_string())?;
                if let Some(snap) = state.snapshots.get_mut(*snapshot) {
                    snap.clones += 1;
                }
                state.datasets.insert(
                    dataset.to_string(),
                    Dataset { mounted: true, origin: Some(snapshot.to_string()) },
                );
                Ok(String::new())
            }
            ["destroy", "-d", snapshot] => {
                let snap = state
                    .snapshots
                    .get_mut(*snapshot)
                    .ok_or_else(|| "could not find any snapshots to destroy; check snapshot names.".to_string())?;
                if snap.clones > 0 {
                    snap.deferred = true;
                } else {
                    state.snapshots.remove(*snapshot);
                    let _ = fs::remove_dir_all(self.snapshot_dir(snapshot));
                }
                Ok(String::new())
            }
            ["destroy", "-R", dataset] => {
                if !state.datasets.contains_key(*dataset) {
                    return Err(format!("cannot open '{dataset}': dataset does not exist"));
                }
                self.destroy(state, dataset);
                Ok(String::new())
            }
            ["mount", dataset] => {
                let ds = state
                    .datasets
                    .get_mut(*dataset)
                    .ok_or_else(|| format!("cannot open '{dataset}': dataset does not exist"))?;
                if ds.mounted {
                    return Err(format!("cannot mount '{dataset}': filesystem already mounted"));
                }
                fs::rename(self.stored_dir(dataset), self.mounted_dir(dataset))
                    .map_err(|e| e.to_string())?;
                ds.mounted = true;
                Ok(String::new())
            }
            ["unmount", dataset] => {
                let ds = state
                    .datasets
                    .get_mut(*dataset)
                    .ok_or_else(|| format!("cannot open '{dataset}': dataset does not exist"))?;
                if !ds.mounted {
                    return Err(format!("cannot unmount '{dataset}': not currently mounted"));
                }
                fs::create_dir_all(self.store.join("datasets")).map_err(|e| e.to_string())?;
                fs::rename(self.mounted_dir(dataset), self.stored_dir(dataset))
                    .map_err(|e| e.to_string())?;
                ds.mounted = false;
                Ok(String::new())
            }
            ["get", "-H", "-o", "value", "mounted", dataset] => state
                .datasets
                .get(*dataset)
                .map(|ds| if ds.mounted { "yes".to_string() } else { "no".to_string() })
                .ok_or_else(|| format!("cannot open '{dataset}': dataset does not exist")),
            other => Err(format!("unsupported invocation: {other:?}")),
        }
    }

    fn destroy(&self, state: &mut State, dataset: &str) {
        let prefix = format!("{dataset}@");
        let own_snapshots: Vec<String> =
            state.snapshots.keys().filter(|name| name.starts_with(&prefix)).cloned().collect();

        for snapshot in &own_snapshots {
            let dependents: Vec<String> = state
                .datasets
                .iter()
                .filter(|(_, ds)| ds.origin.as_deref() == Some(snapshot.as_str()))
                .map(|(name, _)| name.clone())
                .collect();
            for dependent in dependents {
                self.destroy(state, &dependent);
            }
            state.snapshots.remove(snapshot);
            let _ = fs::remove_dir_all(self.snapshot_dir(snapshot));
        }

        if let Some(ds) = state.datasets.remove(dataset) {
            let _ = fs::remove_dir_all(self.content_dir(dataset, &ds));
            if let Some(origin) = ds.origin
                && let Some(snap) = state.snapshots.get_mut(&origin)
            {
                snap.clones -= 1;
                if snap.clones == 0 && snap.deferred {
                    state.snapshots.remove(&origin);
                    let _ = fs::remove_dir_all(self.snapshot_dir(&origin));
                }
            }
        }
    }
}

#[async_trait]
impl CommandRunner for FakeZfs {
    async fn run(&self, _program: &str, args: &[String]) -> GatewayResult<CommandOutput> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(args.to_vec());

        let subcommand = args.first().cloned().unwrap_or_default();
        if let Some(pos) = state.failures.iter().position(|(sub, _)| *sub == subcommand) {
            let (_, stderr) = state.failures.remove(pos);
            return Err(failed(args, stderr));
        }

        self.execute(&mut state, args)
            .map(CommandOutput::stdout)
            .map_err(|stderr| failed(args, stderr))
    }
}

/// A driver root backed by `FakeZfs` inside a temporary directory.
pub struct TestEnv {
    pub dir: TempDir,
    pub zfs: Arc<FakeZfs>,
    pub config: DriverConfig,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_naming(SnapshotNaming::Derived)
    }

    pub fn with_naming(snapshot_naming: SnapshotNaming) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mountpoint = dir.path().join("docker");
        fs::create_dir_all(&mountpoint).unwrap();

        let filesystems_path = dir.path().join("filesystems");
        let mut probe = fs::File::create(&filesystems_path).unwrap();
        probe.write_all(b"nodev\tsysfs\n\text4\nnodev\tzfs\n").unwrap();

        let zfs = Arc::new(FakeZfs::new(mountpoint.clone(), dir.path().join("store")));
        let config = DriverConfig {
            root: mountpoint,
            filesystems_path,
            snapshot_naming,
            ..Default::default()
        };

        Self { dir, zfs, config }
    }

    pub fn mountpoint(&self) -> &Path {
        &self.config.root
    }

    pub async fn driver(&self) -> ZfsDriver {
        ZfsDriver::init(&self.config, self.zfs.clone()).await.unwrap()
    }
}
