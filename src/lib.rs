//! ZFS-backed layer storage driver for container runtimes.
//!
//! Each layer is a child dataset of one root dataset. Layers with a parent
//! start as clones of a snapshot of that parent, so creating them copies no
//! data.

pub mod config;
pub mod driver;
pub mod gateway;

pub use driver::{DriverError, DriverResult, GraphDriver, LayerState, ZfsDriver};
