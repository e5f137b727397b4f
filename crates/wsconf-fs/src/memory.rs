//! In-memory file system provider
//!
//! Serves any scheme from a map. Every write and delete is announced on the
//! change channel, which makes it behave like a perfectly reliable watcher.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::provider::{CHANGE_CHANNEL_CAPACITY, FileChange, FileChangeKind, FileSystemProvider};
use crate::{Error, Resource, ResourceIdentity, Result};

/// Map-backed provider used for the `memory` scheme and in tests.
pub struct InMemoryFileSystem {
    files: Mutex<HashMap<String, (Resource, Vec<u8>)>>,
    changes: broadcast::Sender<FileChange>,
    identity: ResourceIdentity,
}

impl Default for InMemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryFileSystem {
    pub fn new() -> Self {
        Self::with_identity(ResourceIdentity::CaseSensitive)
    }

    pub fn with_identity(identity: ResourceIdentity) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            files: Mutex::new(HashMap::new()),
            changes,
            identity,
        }
    }

    fn files(&self) -> MutexGuard<'_, HashMap<String, (Resource, Vec<u8>)>> {
        self.files.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed content without announcing a change.
    pub fn insert(&self, resource: &Resource, content: impl Into<Vec<u8>>) {
        self.files().insert(
            self.identity.key(resource),
            (resource.clone(), content.into()),
        );
    }

    /// Synchronous read, mostly for assertions.
    pub fn get(&self, resource: &Resource) -> Option<Vec<u8>> {
        self.files()
            .get(&self.identity.key(resource))
            .map(|(_, content)| content.clone())
    }

    /// All stored resources, sorted by their string form.
    pub fn resources(&self) -> Vec<Resource> {
        let mut resources: Vec<Resource> =
            self.files().values().map(|(r, _)| r.clone()).collect();
        resources.sort();
        resources
    }

    fn announce(&self, resource: &Resource, kind: FileChangeKind) {
        // No receivers is fine: nobody is watching yet.
        let _ = self.changes.send(FileChange::new(resource.clone(), kind));
    }
}

#[async_trait]
impl FileSystemProvider for InMemoryFileSystem {
    async fn read_file(&self, resource: &Resource) -> Result<Vec<u8>> {
        self.get(resource).ok_or_else(|| Error::FileNotFound {
            resource: resource.to_string(),
        })
    }

    async fn write_file(&self, resource: &Resource, content: &[u8]) -> Result<()> {
        let previous = self.files().insert(
            self.identity.key(resource),
            (resource.clone(), content.to_vec()),
        );
        let kind = if previous.is_some() {
            FileChangeKind::Updated
        } else {
            FileChangeKind::Added
        };
        self.announce(resource, kind);
        Ok(())
    }

    async fn delete(&self, resource: &Resource) -> Result<()> {
        let removed = self.files().remove(&self.identity.key(resource));
        if removed.is_some() {
            self.announce(resource, FileChangeKind::Deleted);
        }
        Ok(())
    }

    async fn exists(&self, resource: &Resource) -> bool {
        self.files().contains_key(&self.identity.key(resource))
    }

    fn watch(&self, _resource: &Resource) -> Result<()> {
        Ok(())
    }

    fn unwatch(&self, _resource: &Resource) {}

    fn subscribe(&self) -> broadcast::Receiver<FileChange> {
        self.changes.subscribe()
    }

    fn identity(&self) -> ResourceIdentity {
        self.identity
    }
}
