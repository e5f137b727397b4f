//! Configuration cache
//!
//! Folder and workspace models served by slow (non `file`) providers are
//! cached between sessions so a provisional configuration is available
//! before the real files have been read.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use wsconf_fs::Resource;
use wsconf_fs::checksum::compute_hex_digest;

use crate::{Error, Result};

/// What a cache entry holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Workspace,
    Folder(Resource),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub kind: CacheKind,
    pub workspace_id: String,
    pub remote_authority: Option<String>,
}

impl CacheKey {
    pub fn workspace(workspace_id: impl Into<String>, remote_authority: Option<String>) -> Self {
        Self {
            kind: CacheKind::Workspace,
            workspace_id: workspace_id.into(),
            remote_authority,
        }
    }

    pub fn folder(
        workspace_id: impl Into<String>,
        folder: Resource,
        remote_authority: Option<String>,
    ) -> Self {
        Self {
            kind: CacheKind::Folder(folder),
            workspace_id: workspace_id.into(),
            remote_authority,
        }
    }

    /// Directory name shared by every entry of one workspace.
    fn bucket(&self) -> String {
        let authority = self.remote_authority.as_deref().unwrap_or_default();
        compute_hex_digest(format!("{}\n{}", self.workspace_id, authority).as_bytes())
    }

    fn file_name(&self) -> String {
        match &self.kind {
            CacheKind::Workspace => "workspace.json".to_string(),
            CacheKind::Folder(folder) => {
                format!("{}.json", compute_hex_digest(folder.as_str().as_bytes()))
            }
        }
    }
}

/// Persistent store for serialized configuration models.
#[async_trait]
pub trait ConfigurationCache: Send + Sync {
    /// Whether models read from `resource` should be cached at all.
    fn needs_caching(&self, resource: &Resource) -> bool;

    /// Cached content, empty when nothing is cached.
    async fn read(&self, key: &CacheKey) -> Result<String>;

    async fn write(&self, key: &CacheKey, content: &str) -> Result<()>;

    async fn remove(&self, key: &CacheKey) -> Result<()>;
}

/// Cache files below a local directory, one subdirectory per workspace.
pub struct DiskConfigurationCache {
    root: PathBuf,
}

impl DiskConfigurationCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    fn path_of(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.bucket()).join(key.file_name())
    }
}

#[async_trait]
impl ConfigurationCache for DiskConfigurationCache {
    fn needs_caching(&self, resource: &Resource) -> bool {
        resource.scheme() != "file"
    }

    async fn read(&self, key: &CacheKey) -> Result<String> {
        let path = self.path_of(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, key: &CacheKey, content: &str) -> Result<()> {
        let path = self.path_of(key);
        let bytes = content.as_bytes().to_vec();
        tracing::debug!(path = %path.display(), "Writing configuration cache");
        tokio::task::spawn_blocking(move || wsconf_fs::io::write_atomic(&path, &bytes))
            .await
            .map_err(|e| Error::Cache {
                message: e.to_string(),
            })??;
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<()> {
        let path = self.path_of(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local cache, mainly for tests and short-lived tools.
pub struct InMemoryConfigurationCache {
    entries: Mutex<HashMap<CacheKey, String>>,
    cache_all: bool,
}

impl InMemoryConfigurationCache {
    /// Caches resources of every scheme except `file`.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            cache_all: false,
        }
    }

    /// Caches resources of every scheme.
    pub fn caching_everything() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            cache_all: true,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryConfigurationCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigurationCache for InMemoryConfigurationCache {
    fn needs_caching(&self, resource: &Resource) -> bool {
        self.cache_all || resource.scheme() != "file"
    }

    async fn read(&self, key: &CacheKey) -> Result<String> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn write(&self, key: &CacheKey, content: &str) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), content.to_string());
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<()> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

/// Cache that never stores anything.
#[derive(Debug, Default)]
pub struct NullConfigurationCache;

#[async_trait]
impl ConfigurationCache for NullConfigurationCache {
    fn needs_caching(&self, _resource: &Resource) -> bool {
        false
    }

    async fn read(&self, _key: &CacheKey) -> Result<String> {
        Ok(String::new())
    }

    async fn write(&self, _key: &CacheKey, _content: &str) -> Result<()> {
        Ok(())
    }

    async fn remove(&self, _key: &CacheKey) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn folder_key(id: &str) -> CacheKey {
        CacheKey::folder(id, Resource::parse("vscode-remote://box/src/app").unwrap(), None)
    }

    #[tokio::test]
    async fn disk_cache_round_trips_and_removes() {
        let temp = TempDir::new().unwrap();
        let cache = DiskConfigurationCache::new(temp.path());
        let key = folder_key("ws-1");

        assert_eq!(cache.read(&key).await.unwrap(), "");
        cache.write(&key, r#"{"contents":{}}"#).await.unwrap();
        assert_eq!(cache.read(&key).await.unwrap(), r#"{"contents":{}}"#);

        cache.remove(&key).await.unwrap();
        assert_eq!(cache.read(&key).await.unwrap(), "");
        cache.remove(&key).await.unwrap();
    }

    #[tokio::test]
    async fn disk_cache_separates_workspaces_and_authorities() {
        let temp = TempDir::new().unwrap();
        let cache = DiskConfigurationCache::new(temp.path());
        let local = CacheKey::workspace("ws-1", None);
        let remote = CacheKey::workspace("ws-1", Some("box".into()));
        let other = CacheKey::workspace("ws-2", None);

        cache.write(&local, "local").await.unwrap();
        cache.write(&remote, "remote").await.unwrap();

        assert_eq!(cache.read(&local).await.unwrap(), "local");
        assert_eq!(cache.read(&remote).await.unwrap(), "remote");
        assert_eq!(cache.read(&other).await.unwrap(), "");
    }

    #[test]
    fn only_non_file_schemes_need_caching() {
        let disk = DiskConfigurationCache::new("/unused");
        assert!(!disk.needs_caching(&Resource::parse("file:///w/a").unwrap()));
        assert!(disk.needs_caching(&Resource::parse("vscode-remote://box/a").unwrap()));

        let everything = InMemoryConfigurationCache::caching_everything();
        assert!(everything.needs_caching(&Resource::parse("file:///w/a").unwrap()));
        assert!(!NullConfigurationCache.needs_caching(&Resource::parse("memory:///a").unwrap()));
    }

    #[tokio::test]
    async fn memory_cache_stores_entries() {
        let cache = InMemoryConfigurationCache::new();
        let key = folder_key("ws-1");
        cache.write(&key, "content").await.unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.read(&key).await.unwrap(), "content");
        cache.remove(&key).await.unwrap();
        assert!(cache.is_empty());
    }
}
