//! Backend command gateway.
//!
//! Runs the external `zfs` tool and hands back what it printed. Nothing in
//! here interprets the output; the driver does that.

mod error;
mod runner;
mod zfs;

pub use error::{GatewayError, GatewayResult};
#[cfg(any(test, feature = "mockall"))]
pub use runner::MockCommandRunner;
pub use runner::{CommandOutput, CommandRunner, ProcessRunner};
pub use zfs::{Zfs, ZfsCommand};
