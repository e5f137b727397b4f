//! Multi-root workspace configuration service
//!
//! Resolves the effective value of settings across user, remote user,
//! workspace, workspace folder and in-memory sources, tracks workspace
//! folders, routes writes to the right settings file, and reports what
//! changed after every reload.
//!
//! The entry point is [`WorkspaceConfigurationService`]:
//!
//! ```no_run
//! use std::sync::Arc;
//! use wsconf_core::{ConfigurationOverrides, WorkspaceConfigurationService, WorkspaceInitialization};
//! use wsconf_fs::{DiskFileSystem, FileService, Resource};
//! use wsconf_model::ConfigurationRegistry;
//!
//! # async fn run() -> wsconf_core::Result<()> {
//! let files = Arc::new(FileService::new());
//! files.register_provider("file", Arc::new(DiskFileSystem::new()));
//! let registry = Arc::new(ConfigurationRegistry::with_builtins());
//! let user = Resource::from_file_path("/home/me/.config/wsconf/settings.json")?;
//!
//! let service = WorkspaceConfigurationService::builder(files, registry, user).build();
//! service
//!     .initialize(WorkspaceInitialization::Folder {
//!         id: "project".into(),
//!         folder: Resource::from_file_path("/src/project")?,
//!     })
//!     .await?;
//! let value = service.get_value("editor.tabSize", &ConfigurationOverrides::none());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod change;
pub mod configuration;
pub mod editing;
pub mod error;
pub mod options;
pub mod remote;
pub mod service;
mod sources;
pub mod workspace;

pub use cache::{
    CacheKey, CacheKind, ConfigurationCache, DiskConfigurationCache, InMemoryConfigurationCache,
    NullConfigurationCache,
};
pub use change::{ConfigurationChange, ConfigurationChangeEvent};
pub use configuration::{
    Configuration, ConfigurationKeys, ConfigurationOverrides, FolderConfiguration, InspectValue,
};
pub use editing::{EditingErrorCode, UpdateOptions};
pub use error::{Error, Result};
pub use options::{CacheOptions, ServiceOptions};
pub use remote::{
    RemoteAgent, RemoteEnvironment, RemoteState, RemoteUserConfiguration, StaticRemoteAgent,
};
pub use service::{ServiceBuilder, WorkspaceConfigurationService, WorkspaceInitialization};
pub use workspace::{
    FolderToAdd, WorkbenchState, Workspace, WorkspaceDefinition, WorkspaceFolder,
    WorkspaceFoldersChangeEvent, diff_folders,
};
