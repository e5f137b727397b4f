//! [`TempWorkspace`]: settings files on a real temporary directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;
use wsconf_core::{NullConfigurationCache, ServiceOptions, WorkspaceConfigurationService};
use wsconf_fs::{DiskFileSystem, FileService, FileSystemProvider, Resource};
use wsconf_model::ConfigurationRegistry;

use crate::registry::standard_registry;

/// A temporary directory with helpers for writing settings files and
/// asserting on their content.
pub struct TempWorkspace {
    temp_dir: TempDir,
    pub registry: Arc<ConfigurationRegistry>,
}

impl Default for TempWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl TempWorkspace {
    pub fn new() -> Self {
        Self {
            temp_dir: TempDir::new().unwrap_or_else(|e| panic!("TempWorkspace::new: {e}")),
            registry: standard_registry(),
        }
    }

    pub fn root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root().join(relative)
    }

    pub fn resource(&self, relative: &str) -> Resource {
        Resource::from_file_path(self.path(relative))
            .unwrap_or_else(|e| panic!("TempWorkspace::resource: {relative}: {e}"))
    }

    /// Write `content` to `relative`, creating parent directories.
    pub fn write(&self, relative: &str, content: &str) -> &Self {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, content).unwrap();
        self
    }

    pub fn read(&self, relative: &str) -> Option<String> {
        fs::read_to_string(self.path(relative)).ok()
    }

    pub fn read_json(&self, relative: &str) -> serde_json::Value {
        let content = self
            .read(relative)
            .unwrap_or_else(|| panic!("TempWorkspace::read_json: {relative} does not exist"));
        serde_json::from_str(&content)
            .unwrap_or_else(|e| panic!("TempWorkspace::read_json: {relative}: {e}"))
    }

    /// Service over the disk, with user settings at `user/settings.json`.
    pub fn service(&self, watch_files: bool) -> WorkspaceConfigurationService {
        let files = Arc::new(FileService::new());
        files.register_provider("file", Arc::new(DiskFileSystem::new()) as Arc<dyn FileSystemProvider>);
        WorkspaceConfigurationService::builder(
            files,
            Arc::clone(&self.registry),
            self.resource("user/settings.json"),
        )
        .options(ServiceOptions {
            watch_files,
            ..ServiceOptions::default()
        })
        .cache(Arc::new(NullConfigurationCache))
        .build()
    }

    /// Assert that `relative` exists.
    ///
    /// # Panics
    /// Panics with a descriptive message if the path does not exist.
    pub fn assert_file_exists(&self, relative: &str) {
        let path = self.path(relative);
        assert!(path.exists(), "Expected file to exist: {}", path.display());
    }

    pub fn assert_file_not_exists(&self, relative: &str) {
        let path = self.path(relative);
        assert!(!path.exists(), "Expected file NOT to exist: {}", path.display());
    }

    /// Assert that the file at `relative` contains `content`.
    pub fn assert_file_contains(&self, relative: &str, content: &str) {
        let file_content = self
            .read(relative)
            .unwrap_or_else(|| panic!("Could not read file: {}", self.path(relative).display()));
        assert!(
            file_content.contains(content),
            "File {} does not contain expected content.\nExpected: {}\nActual: {}",
            self.path(relative).display(),
            content,
            file_content
        );
    }
}
