use async_trait::async_trait;
use std::path::PathBuf;

use super::error::DriverResult;

/// Capability interface a layer storage driver exposes to the container
/// runtime.
#[async_trait]
pub trait GraphDriver: Send + Sync {
    /// Name the driver is registered under.
    fn name(&self) -> &'static str;

    /// Ordered label/value pairs describing the driver; no side effects.
    fn status(&self) -> Vec<(String, String)>;

    /// Create layer `id`, empty or as a copy-on-write child of `parent`.
    /// An empty `parent` is the same as `None`.
    async fn create(&self, id: &str, parent: Option<&str>) -> DriverResult<()>;

    async fn remove(&self, id: &str) -> DriverResult<()>;

    /// Mount layer `id` if needed and return its path.
    async fn get(&self, id: &str) -> DriverResult<PathBuf>;

    async fn exists(&self, id: &str) -> bool;

    /// Unmount every layer before shutdown.
    async fn cleanup(&self) -> DriverResult<()>;
}
