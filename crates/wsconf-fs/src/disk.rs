//! Local disk provider for the `file` scheme
//!
//! Watching is done per file: the parent directory is watched
//! non-recursively (the file may not exist yet) and events are filtered
//! down to the files that were asked for.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::broadcast;

use crate::io::write_atomic;
use crate::provider::{CHANGE_CHANNEL_CAPACITY, FileChange, FileChangeKind, FileSystemProvider};
use crate::{Error, Resource, ResourceIdentity, Result};

type WatchedFiles = Arc<Mutex<HashMap<PathBuf, Resource>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Provider backed by `std::fs`/`tokio::fs` with `notify` based watching.
pub struct DiskFileSystem {
    changes: broadcast::Sender<FileChange>,
    watched: WatchedFiles,
    watched_dirs: Mutex<HashSet<PathBuf>>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    identity: ResourceIdentity,
}

impl Default for DiskFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskFileSystem {
    pub fn new() -> Self {
        let identity = if cfg!(any(windows, target_os = "macos")) {
            ResourceIdentity::CaseInsensitive
        } else {
            ResourceIdentity::CaseSensitive
        };
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            changes,
            watched: Arc::new(Mutex::new(HashMap::new())),
            watched_dirs: Mutex::new(HashSet::new()),
            watcher: Mutex::new(None),
            identity,
        }
    }

    fn file_path(resource: &Resource) -> Result<PathBuf> {
        resource.to_file_path().ok_or_else(|| Error::NotAFilePath {
            resource: resource.to_string(),
        })
    }

    /// Key used to match notify events back to watched resources.
    fn watch_key(path: &Path) -> Option<PathBuf> {
        let parent = path.parent()?;
        let name = path.file_name()?;
        let parent = dunce::canonicalize(parent).ok()?;
        Some(parent.join(name))
    }

    fn ensure_dir_watched(&self, dir: &Path) -> Result<()> {
        let mut dirs = lock(&self.watched_dirs);
        if dirs.contains(dir) {
            return Ok(());
        }

        let mut watcher_slot = lock(&self.watcher);
        if watcher_slot.is_none() {
            *watcher_slot = Some(self.create_watcher(dir)?);
        }
        if let Some(watcher) = watcher_slot.as_mut() {
            watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .map_err(|e| Error::Watch {
                    path: dir.to_path_buf(),
                    message: e.to_string(),
                })?;
        }
        dirs.insert(dir.to_path_buf());
        tracing::debug!(dir = %dir.display(), "Watching settings directory");
        Ok(())
    }

    fn create_watcher(&self, dir: &Path) -> Result<RecommendedWatcher> {
        let watched = Arc::clone(&self.watched);
        let changes = self.changes.clone();
        notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => forward_event(&event, &watched, &changes),
            Err(e) => tracing::warn!(error = %e, "File watcher error"),
        })
        .map_err(|e| Error::Watch {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })
    }
}

fn forward_event(event: &Event, watched: &WatchedFiles, changes: &broadcast::Sender<FileChange>) {
    let kind = match event.kind {
        EventKind::Create(_) => FileChangeKind::Added,
        EventKind::Modify(_) => FileChangeKind::Updated,
        EventKind::Remove(_) => FileChangeKind::Deleted,
        _ => return,
    };

    for path in &event.paths {
        let resource = {
            let watched = lock(watched);
            watched.get(path).cloned().or_else(|| {
                DiskFileSystem::watch_key(path).and_then(|key| watched.get(&key).cloned())
            })
        };
        if let Some(resource) = resource {
            // Atomic writes surface as create+rename; report existing files as updates.
            let kind = if kind == FileChangeKind::Added && path.exists() {
                FileChangeKind::Updated
            } else {
                kind
            };
            let _ = changes.send(FileChange::new(resource, kind));
        }
    }
}

#[async_trait]
impl FileSystemProvider for DiskFileSystem {
    async fn read_file(&self, resource: &Resource) -> Result<Vec<u8>> {
        let path = Self::file_path(resource)?;
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                Error::FileNotFound {
                    resource: resource.to_string(),
                }
            } else {
                Error::io(&path, e)
            }
        })
    }

    async fn write_file(&self, resource: &Resource, content: &[u8]) -> Result<()> {
        let path = Self::file_path(resource)?;
        let content = content.to_vec();
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&target, &content))
            .await
            .map_err(|e| Error::io(&path, io::Error::other(e)))?
    }

    async fn delete(&self, resource: &Resource) -> Result<()> {
        let path = Self::file_path(resource)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(&path, e)),
        }
    }

    async fn exists(&self, resource: &Resource) -> bool {
        match Self::file_path(resource) {
            Ok(path) => tokio::fs::try_exists(&path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    fn watch(&self, resource: &Resource) -> Result<()> {
        let path = Self::file_path(resource)?;
        let Some(key) = Self::watch_key(&path) else {
            tracing::debug!(
                path = %path.display(),
                "Parent directory missing, file cannot be watched yet"
            );
            return Ok(());
        };
        lock(&self.watched).insert(key.clone(), resource.clone());
        match key.parent() {
            Some(dir) => self.ensure_dir_watched(dir),
            None => Ok(()),
        }
    }

    fn unwatch(&self, resource: &Resource) {
        if let Some(key) = Self::file_path(resource)
            .ok()
            .and_then(|path| Self::watch_key(&path))
        {
            lock(&self.watched).remove(&key);
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<FileChange> {
        self.changes.subscribe()
    }

    fn identity(&self) -> ResourceIdentity {
        self.identity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn round_trips_through_disk() {
        let temp = TempDir::new().unwrap();
        let fs = DiskFileSystem::new();
        let resource = Resource::from_file_path(temp.path().join("a/settings.json")).unwrap();

        assert!(!fs.exists(&resource).await);
        fs.write_file(&resource, b"{\"a\": 1}").await.unwrap();

        assert!(fs.exists(&resource).await);
        assert_eq!(fs.read_file(&resource).await.unwrap(), b"{\"a\": 1}");
    }

    #[tokio::test]
    async fn delete_missing_is_ok() {
        let temp = TempDir::new().unwrap();
        let fs = DiskFileSystem::new();
        let resource = Resource::from_file_path(temp.path().join("nope.json")).unwrap();

        fs.delete(&resource).await.unwrap();
        assert!(fs.read_file(&resource).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn non_file_scheme_is_rejected() {
        let fs = DiskFileSystem::new();
        let resource = Resource::parse("memory:///a.json").unwrap();
        assert!(matches!(
            fs.read_file(&resource).await,
            Err(Error::NotAFilePath { .. })
        ));
    }

    #[test]
    fn watching_missing_directory_is_deferred() {
        let temp = TempDir::new().unwrap();
        let fs = DiskFileSystem::new();
        let resource =
            Resource::from_file_path(temp.path().join("missing/settings.json")).unwrap();
        assert!(fs.watch(&resource).is_ok());
    }
}
