use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use super::error::GatewayResult;
use super::runner::{CommandOutput, CommandRunner};

/// Every `zfs` invocation the driver issues.
///
/// Listing commands ask for scripted output (`-H`): no header, one object per
/// line, fields separated by a single tab. `zfs create` refuses tabs in
/// dataset names, so splitting on tab is unambiguous.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZfsCommand {
    /// Dataset and mountpoint of the filesystem containing `path`.
    ListRoot { path: PathBuf },
    /// `dataset` and its direct children, with their mounted state.
    ListChildren { dataset: String },
    Create { dataset: String },
    /// Destroys `dataset` together with its snapshots and dependent clones.
    DestroyRecursive { dataset: String },
    /// Marks a snapshot for destruction once nothing depends on it.
    DestroyDeferred { snapshot: String },
    Snapshot { snapshot: String },
    Clone { snapshot: String, dataset: String },
    Mount { dataset: String },
    Unmount { dataset: String },
    GetMounted { dataset: String },
}

impl ZfsCommand {
    pub fn args(&self) -> Vec<String> {
        let args: Vec<&str> = match self {
            ZfsCommand::ListRoot { path } => {
                let path = path.to_string_lossy().into_owned();
                return ["list", "-H", "-o", "name,mountpoint", "-t", "filesystem"]
                    .into_iter()
                    .map(String::from)
                    .chain(std::iter::once(path))
                    .collect();
            }
            ZfsCommand::ListChildren { dataset } => {
                vec![
                    "list",
                    "-H",
                    "-o",
                    "name,mounted",
                    "-t",
                    "filesystem",
                    "-r",
                    "-d",
                    "1",
                    dataset.as_str(),
                ]
            }
            ZfsCommand::Create { dataset } => vec!["create", dataset.as_str()],
            ZfsCommand::DestroyRecursive { dataset } => vec!["destroy", "-R", dataset.as_str()],
            ZfsCommand::DestroyDeferred { snapshot } => vec!["destroy", "-d", snapshot.as_str()],
            ZfsCommand::Snapshot { snapshot } => vec!["snapshot", snapshot.as_str()],
            ZfsCommand::Clone { snapshot, dataset } => {
                vec!["clone", snapshot.as_str(), dataset.as_str()]
            }
            ZfsCommand::Mount { dataset } => vec!["mount", dataset.as_str()],
            ZfsCommand::Unmount { dataset } => vec!["unmount", dataset.as_str()],
            ZfsCommand::GetMounted { dataset } => {
                vec!["get", "-H", "-o", "value", "mounted", dataset.as_str()]
            }
        };
        args.into_iter().map(String::from).collect()
    }

    /// Short name of the subcommand, used as a log field.
    pub fn subcommand(&self) -> &'static str {
        match self {
            ZfsCommand::ListRoot { .. } | ZfsCommand::ListChildren { .. } => "list",
            ZfsCommand::Create { .. } => "create",
            ZfsCommand::DestroyRecursive { .. } | ZfsCommand::DestroyDeferred { .. } => "destroy",
            ZfsCommand::Snapshot { .. } => "snapshot",
            ZfsCommand::Clone { .. } => "clone",
            ZfsCommand::Mount { .. } => "mount",
            ZfsCommand::Unmount { .. } => "unmount",
            ZfsCommand::GetMounted { .. } => "get",
        }
    }
}

impl fmt::Display for ZfsCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "zfs {}", self.args().join(" "))
    }
}

/// The `zfs` binary bound to a command runner.
#[derive(Clone)]
pub struct Zfs {
    binary: String,
    runner: Arc<dyn CommandRunner>,
}

impl Zfs {
    pub fn new(binary: impl Into<String>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { binary: binary.into(), runner }
    }

    pub async fn run(&self, command: ZfsCommand) -> GatewayResult<CommandOutput> {
        tracing::debug!(subcommand = command.subcommand(), command = %command, "Invoking zfs");
        self.runner.run(&self.binary, &command.args()).await
    }
}

impl fmt::Debug for Zfs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Zfs").field("binary", &self.binary).finish_non_exhaustive()
    }
}
