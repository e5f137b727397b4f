//! Workspace context detection
//!
//! Works out what to open from the command line and the current directory,
//! then builds an initialized service for it. Without `--folder` or
//! `--workspace`, the nearest ancestor holding a folder settings directory
//! (`.vscode`) is opened, falling back to the current directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use wsconf_core::{
    ConfigurationOverrides, ServiceOptions, WorkspaceConfigurationService, WorkspaceInitialization,
};
use wsconf_fs::checksum::compute_hex_digest;
use wsconf_fs::{DiskFileSystem, FileService, Resource};
use wsconf_model::ConfigurationRegistry;

use crate::cli::{OpenArgs, ScopeArgs};
use crate::error::{CliError, Result};

/// What the command operates on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenTarget {
    Folder(PathBuf),
    Workspace(PathBuf),
}

/// Resolve `--folder`/`--workspace`, or detect the folder from `cwd`.
pub fn detect_target(cwd: &Path, args: &OpenArgs, settings_dir: &str) -> OpenTarget {
    if let Some(workspace) = &args.workspace {
        return OpenTarget::Workspace(cwd.join(workspace));
    }
    if let Some(folder) = &args.folder {
        return OpenTarget::Folder(cwd.join(folder));
    }

    let mut current = cwd;
    loop {
        if current.join(settings_dir).is_dir() {
            return OpenTarget::Folder(current.to_path_buf());
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return OpenTarget::Folder(cwd.to_path_buf()),
        }
    }
}

/// `<config dir>/wsconf/settings.json`
fn default_user_settings() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("wsconf").join("settings.json"))
        .ok_or_else(|| CliError::user("cannot locate a config directory, pass --user-settings"))
}

/// An opened workspace.
pub struct Context {
    pub service: WorkspaceConfigurationService,
    pub cwd: PathBuf,
}

impl Context {
    pub async fn open(cwd: &Path, args: &OpenArgs) -> Result<Self> {
        let mut options = match &args.options {
            Some(path) => ServiceOptions::load(&cwd.join(path))?,
            None => ServiceOptions::default(),
        };
        // One-shot process; nothing to reload.
        options.watch_files = false;

        let registry = Arc::new(ConfigurationRegistry::with_builtins());
        for schema in &args.schema {
            let path = cwd.join(schema);
            tracing::debug!(schema = %path.display(), "Registering settings schema");
            let content = std::fs::read_to_string(&path)?;
            registry.register_schema_json(&content)?;
        }

        let user_settings = match &args.user_settings {
            Some(path) => cwd.join(path),
            None => default_user_settings()?,
        };

        let files = Arc::new(FileService::new());
        files.register_provider("file", Arc::new(DiskFileSystem::new()));

        let target = detect_target(cwd, args, &options.folder_settings_dir);
        let initialization = match &target {
            OpenTarget::Folder(path) => {
                let folder = Resource::from_file_path(path)?;
                WorkspaceInitialization::Folder {
                    id: compute_hex_digest(folder.as_str().as_bytes()),
                    folder,
                }
            }
            OpenTarget::Workspace(path) => {
                let config_path = Resource::from_file_path(path)?;
                WorkspaceInitialization::Workspace {
                    id: compute_hex_digest(config_path.as_str().as_bytes()),
                    config_path,
                }
            }
        };
        tracing::debug!(?target, user_settings = %user_settings.display(), "Opening workspace");

        let service = WorkspaceConfigurationService::builder(
            files,
            registry,
            Resource::from_file_path(&user_settings)?,
        )
        .options(options)
        .build();
        service.initialize(initialization).await?;

        Ok(Self {
            service,
            cwd: cwd.to_path_buf(),
        })
    }

    /// `file` resource of a path given on the command line.
    pub fn resource(&self, path: &Path) -> Result<Resource> {
        Ok(Resource::from_file_path(self.cwd.join(path))?)
    }

    pub fn overrides(&self, scope: &ScopeArgs) -> Result<ConfigurationOverrides> {
        let mut overrides = match &scope.language {
            Some(language) => ConfigurationOverrides::for_language(language.clone()),
            None => ConfigurationOverrides::none(),
        };
        if let Some(path) = &scope.resource {
            overrides = overrides.with_resource(self.resource(path)?);
        }
        Ok(overrides)
    }
}
