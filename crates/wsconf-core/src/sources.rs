//! Source model loading
//!
//! Reads settings files through the file service and turns them into
//! [`ConfigurationModel`]s. Every loaded model is remembered together with
//! the checksum of the content it was built from; reading unchanged content
//! again returns the very same model, so a reload that finds nothing new
//! produces no change.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Map, Value};
use wsconf_fs::checksum::compute_content_checksum;
use wsconf_fs::{FileService, Resource, ResourceIdentity};
use wsconf_model::{ConfigurationModel, ConfigurationModelParser, parse_jsonc};

use crate::options::{STANDALONE_KEYS, ServiceOptions};
use crate::workspace::{WorkspaceDefinition, WorkspaceFolder};

struct Loaded {
    checksum: String,
    model: ConfigurationModel,
}

pub(crate) struct SourceLoader {
    files: Arc<FileService>,
    options: ServiceOptions,
    loaded: Mutex<HashMap<String, Loaded>>,
}

impl SourceLoader {
    pub(crate) fn new(files: Arc<FileService>, options: ServiceOptions) -> Self {
        Self {
            files,
            options,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// Content of `resource`, `None` when missing or unreadable.
    pub(crate) async fn read(&self, resource: &Resource) -> Option<String> {
        match self.files.read_optional_string(resource).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(resource = %resource, error = %e, "Failed to read settings file");
                None
            }
        }
    }

    fn remember(
        &self,
        key: String,
        checksum: String,
        build: impl FnOnce() -> ConfigurationModel,
    ) -> ConfigurationModel {
        let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = loaded.get(&key).filter(|entry| entry.checksum == checksum) {
            return entry.model.clone();
        }
        let model = build();
        loaded.insert(
            key,
            Loaded {
                checksum,
                model: model.clone(),
            },
        );
        model
    }

    /// Model of a plain settings file (user or remote settings).
    pub(crate) async fn load_settings(&self, resource: &Resource) -> ConfigurationModel {
        let content = self.read(resource).await;
        let checksum = checksum_of(&[content.as_deref()]);
        self.remember(format!("settings:{resource}"), checksum, || match content {
            Some(content) => ConfigurationModelParser::new(resource.as_str()).parse(&content),
            None => ConfigurationModel::empty(),
        })
    }

    /// Model of a folder: its settings file with the standalone `launch`
    /// and `tasks` files placed under their keys.
    pub(crate) async fn load_folder(&self, folder: &WorkspaceFolder) -> ConfigurationModel {
        let dir = &self.options.folder_settings_dir;
        let settings_resource = folder.settings_resource(dir, &self.options.settings_file);
        let settings = self.read(&settings_resource).await;

        let mut standalone = Vec::with_capacity(STANDALONE_KEYS.len());
        for key in STANDALONE_KEYS {
            let Some(file) = self.options.standalone_file(key) else {
                continue;
            };
            let resource = folder.settings_resource(dir, file);
            let content = self.read(&resource).await;
            standalone.push((key, resource, content));
        }

        let mut parts = vec![settings.as_deref()];
        parts.extend(standalone.iter().map(|(_, _, content)| content.as_deref()));
        let checksum = checksum_of(&parts);

        self.remember(format!("folder:{}", folder.uri), checksum, || {
            let base = match &settings {
                Some(content) => ConfigurationModelParser::new(settings_resource.as_str()).parse(content),
                None => ConfigurationModel::empty(),
            };
            let wrapped: Vec<ConfigurationModel> = standalone
                .iter()
                .filter_map(|(key, resource, content)| {
                    standalone_model(key, resource, content.as_deref()?)
                })
                .collect();
            let others: Vec<&ConfigurationModel> = wrapped.iter().collect();
            base.merge(&others)
        })
    }

    /// Read and parse the workspace definition file and build the
    /// workspace model from its `settings`, `launch` and `tasks`.
    pub(crate) async fn load_workspace(
        &self,
        location: &Resource,
        identity: ResourceIdentity,
    ) -> (WorkspaceDefinition, ConfigurationModel) {
        let content = self.read(location).await;
        let definition = match &content {
            Some(content) => WorkspaceDefinition::parse_lenient(location, content, identity),
            None => {
                tracing::warn!(workspace = %location, "Workspace file does not exist");
                WorkspaceDefinition::default()
            }
        };
        let checksum = checksum_of(&[content.as_deref()]);
        let model = self.remember(format!("workspace:{location}"), checksum, || {
            workspace_model(location, &definition)
        });
        (definition, model)
    }

    /// Forget every remembered model of `folder`.
    pub(crate) fn forget_folder(&self, folder: &Resource) {
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&format!("folder:{folder}"));
    }
}

fn checksum_of(parts: &[Option<&str>]) -> String {
    let mut combined = Vec::new();
    for part in parts {
        match part {
            Some(content) => {
                combined.push(b'+');
                combined.extend_from_slice(content.as_bytes());
            }
            None => combined.push(b'-'),
        }
        combined.push(0);
    }
    compute_content_checksum(&combined)
}

fn standalone_model(key: &str, resource: &Resource, content: &str) -> Option<ConfigurationModel> {
    match parse_jsonc(resource.as_str(), content) {
        Ok(value @ Value::Object(_)) => {
            let mut wrapper = Map::new();
            wrapper.insert(key.to_string(), value);
            Some(ConfigurationModelParser::new(resource.as_str()).parse_value(&Value::Object(wrapper)))
        }
        Ok(Value::Null) => None,
        Ok(_) => {
            tracing::warn!(resource = %resource, "Ignoring standalone settings file that is not an object");
            None
        }
        Err(e) => {
            tracing::warn!(resource = %resource, error = %e, "Ignoring malformed standalone settings file");
            None
        }
    }
}

fn workspace_model(location: &Resource, definition: &WorkspaceDefinition) -> ConfigurationModel {
    let parser = ConfigurationModelParser::new(location.as_str());
    let settings = parser.parse_value(&definition.settings);

    let mut standalone = Map::new();
    if let Some(launch) = &definition.launch {
        standalone.insert("launch".to_string(), launch.clone());
    }
    if let Some(tasks) = &definition.tasks {
        standalone.insert("tasks".to_string(), tasks.clone());
    }
    if standalone.is_empty() {
        return settings;
    }
    settings.merge(&[&parser.parse_value(&Value::Object(standalone))])
}
