//! Service options
//!
//! Options are read from TOML:
//!
//! ```toml
//! folder_settings_dir = ".vscode"
//! watch_files = true
//!
//! [cache]
//! enabled = true
//! directory = "/tmp/wsconf-cache"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceOptions {
    /// Directory below each folder holding its settings files
    pub folder_settings_dir: String,
    pub settings_file: String,
    pub launch_file: String,
    pub tasks_file: String,
    /// Reload automatically when watched settings files change
    pub watch_files: bool,
    pub cache: CacheOptions,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            folder_settings_dir: ".vscode".to_string(),
            settings_file: "settings.json".to_string(),
            launch_file: "launch.json".to_string(),
            tasks_file: "tasks.json".to_string(),
            watch_files: true,
            cache: CacheOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    pub enabled: bool,
    /// Defaults to `<cache dir>/wsconf`
    pub directory: Option<PathBuf>,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
        }
    }
}

impl CacheOptions {
    /// Directory for cached models, `None` when no cache dir is known.
    pub fn resolved_directory(&self) -> Option<PathBuf> {
        self.directory
            .clone()
            .or_else(|| dirs::cache_dir().map(|dir| dir.join("wsconf")))
    }
}

impl ServiceOptions {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::InvalidOptions {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| Error::InvalidOptions {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// File name of the standalone settings file for a top-level key
    /// (`launch`, `tasks`), if it has one.
    pub fn standalone_file(&self, key: &str) -> Option<&str> {
        match key {
            "launch" => Some(&self.launch_file),
            "tasks" => Some(&self.tasks_file),
            _ => None,
        }
    }
}

/// Top-level keys that live in their own file next to the settings file.
pub const STANDALONE_KEYS: [&str; 2] = ["launch", "tasks"];

/// The standalone key `key` belongs to (`launch.configurations` → `launch`).
pub fn standalone_key_of(key: &str) -> Option<&'static str> {
    let top = key.split('.').next()?;
    STANDALONE_KEYS.into_iter().find(|standalone| *standalone == top)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(ServiceOptions::from_toml_str("").unwrap(), ServiceOptions::default());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let options = ServiceOptions::from_toml_str(
            r#"
            folder_settings_dir = ".config"
            watch_files = false

            [cache]
            enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(options.folder_settings_dir, ".config");
        assert_eq!(options.settings_file, "settings.json");
        assert!(!options.watch_files);
        assert!(!options.cache.enabled);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(ServiceOptions::from_toml_str("watch_files = \"yes\"").is_err());
    }

    #[test]
    fn standalone_keys() {
        assert_eq!(standalone_key_of("launch"), Some("launch"));
        assert_eq!(standalone_key_of("tasks.version"), Some("tasks"));
        assert_eq!(standalone_key_of("launcher"), None);
        let options = ServiceOptions::default();
        assert_eq!(options.standalone_file("launch"), Some("launch.json"));
    }
}
