//! FileSystemProvider trait and change notifications

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::{Resource, ResourceIdentity, Result};

/// Capacity of each provider's change channel. Slow receivers lag rather
/// than block writers; a lagged receiver treats the gap as "something
/// changed".
pub const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// What happened to a watched resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileChangeKind {
    Added,
    Updated,
    Deleted,
}

/// A single change notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub resource: Resource,
    pub kind: FileChangeKind,
}

impl FileChange {
    pub fn new(resource: Resource, kind: FileChangeKind) -> Self {
        Self { resource, kind }
    }
}

/// Storage backend for one URI scheme.
///
/// Providers own their change channel; the service subscribes once per
/// provider and decides for itself which resources it cares about.
#[async_trait]
pub trait FileSystemProvider: Send + Sync {
    /// Read the full content. Missing files yield [`crate::Error::FileNotFound`].
    async fn read_file(&self, resource: &Resource) -> Result<Vec<u8>>;

    /// Replace the full content, creating the file when needed.
    async fn write_file(&self, resource: &Resource, content: &[u8]) -> Result<()>;

    /// Remove the file. Deleting a missing file is not an error.
    async fn delete(&self, resource: &Resource) -> Result<()>;

    async fn exists(&self, resource: &Resource) -> bool;

    /// Start reporting changes for `resource` on the change channel.
    fn watch(&self, resource: &Resource) -> Result<()>;

    /// Stop reporting changes for `resource`.
    fn unwatch(&self, resource: &Resource);

    /// Subscribe to the provider's change channel.
    fn subscribe(&self) -> broadcast::Receiver<FileChange>;

    /// Identity rule for resources served by this provider.
    fn identity(&self) -> ResourceIdentity {
        ResourceIdentity::CaseSensitive
    }
}
