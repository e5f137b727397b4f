//! [`TestWorkspace`] builder backed by an in-memory file system.

use std::sync::Arc;

use wsconf_core::{
    InMemoryConfigurationCache, ServiceBuilder, ServiceOptions, WorkspaceConfigurationService,
};
use wsconf_fs::{FileService, FileSystemProvider, InMemoryFileSystem, Resource};
use wsconf_model::ConfigurationRegistry;

use crate::registry::standard_registry;

/// Location of the user settings file in every test workspace.
pub const USER_SETTINGS: &str = "file:///home/user/settings.json";

/// In-memory files served for the `file` scheme, plus the pieces needed to
/// build a service over them.
///
/// # Example
///
/// ```rust,no_run
/// use wsconf_test_utils::TestWorkspace;
///
/// let workspace = TestWorkspace::new()
///     .with_file("/home/user/settings.json", r#"{ "editor.tabSize": 2 }"#)
///     .with_file("/w/app/.vscode/settings.json", r#"{ "editor.tabSize": 8 }"#);
/// let service = workspace.service();
/// ```
pub struct TestWorkspace {
    pub memory: Arc<InMemoryFileSystem>,
    pub files: Arc<FileService>,
    pub registry: Arc<ConfigurationRegistry>,
    pub cache: Arc<InMemoryConfigurationCache>,
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorkspace {
    pub fn new() -> Self {
        let memory = Arc::new(InMemoryFileSystem::new());
        let files = Arc::new(FileService::new());
        files.register_provider("file", Arc::clone(&memory) as Arc<dyn FileSystemProvider>);
        Self {
            memory,
            files,
            registry: standard_registry(),
            cache: Arc::new(InMemoryConfigurationCache::new()),
        }
    }

    /// `file://` resource for an absolute path.
    pub fn resource(path: &str) -> Resource {
        Resource::parse(&format!("file://{path}"))
            .unwrap_or_else(|e| panic!("TestWorkspace::resource: bad path {path}: {e}"))
    }

    /// Seed a file without announcing a change.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.seed(path, content);
        self
    }

    pub fn seed(&self, path: &str, content: &str) {
        self.memory.insert(&Self::resource(path), content);
    }

    /// Write a file through the provider, announcing the change.
    pub async fn write(&self, path: &str, content: &str) {
        self.memory
            .write_file(&Self::resource(path), content.as_bytes())
            .await
            .unwrap_or_else(|e| panic!("TestWorkspace::write: {path}: {e}"));
    }

    /// Current content of a file, `None` when missing.
    pub fn read(&self, path: &str) -> Option<String> {
        self.memory
            .get(&Self::resource(path))
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Parsed JSON content of a file.
    ///
    /// # Panics
    /// Panics when the file is missing or not JSON.
    pub fn read_json(&self, path: &str) -> serde_json::Value {
        let content = self
            .read(path)
            .unwrap_or_else(|| panic!("TestWorkspace::read_json: {path} does not exist"));
        serde_json::from_str(&content)
            .unwrap_or_else(|e| panic!("TestWorkspace::read_json: {path}: {e}"))
    }

    /// Builder with file watching off and the in-memory cache.
    pub fn builder(&self) -> ServiceBuilder {
        let options = ServiceOptions {
            watch_files: false,
            ..ServiceOptions::default()
        };
        WorkspaceConfigurationService::builder(
            Arc::clone(&self.files),
            Arc::clone(&self.registry),
            Resource::parse(USER_SETTINGS).unwrap_or_else(|e| panic!("{e}")),
        )
        .options(options)
        .cache(Arc::clone(&self.cache) as Arc<dyn wsconf_core::ConfigurationCache>)
    }

    pub fn service(&self) -> WorkspaceConfigurationService {
        self.builder().build()
    }

    /// Service that reloads when files change.
    pub fn watching_service(&self) -> WorkspaceConfigurationService {
        self.builder()
            .options(ServiceOptions {
                watch_files: true,
                ..ServiceOptions::default()
            })
            .build()
    }
}
