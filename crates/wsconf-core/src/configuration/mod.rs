//! Configuration resolution engine
//!
//! A [`Configuration`] is an immutable snapshot of every source model plus
//! the registry snapshot used to gate them. Precedence, highest first:
//! memory, folder, workspace, remote user, local user, defaults.
//! `Application` and `Machine` keys are never read from the workspace or
//! folder sources, whatever those files contain. With a language
//! identifier, the highest `[id]` value of any source is layered over the
//! highest plain value.

mod inspect;

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;
use wsconf_fs::{Resource, ResourceIdentity};
use wsconf_model::{ConfigurationModel, ConfigurationScope, RegistrySnapshot, layer_override};

use crate::workspace::WorkspaceFolder;

pub use inspect::{ConfigurationKeys, InspectValue};

/// Where a value is resolved for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationOverrides {
    /// Resource whose owning folder source applies
    pub resource: Option<Resource>,
    /// Language identifier for `[id]` override sections
    pub override_identifier: Option<String>,
}

impl ConfigurationOverrides {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn for_resource(resource: Resource) -> Self {
        Self {
            resource: Some(resource),
            override_identifier: None,
        }
    }

    pub fn for_language(identifier: impl Into<String>) -> Self {
        Self {
            resource: None,
            override_identifier: Some(identifier.into()),
        }
    }

    pub fn with_resource(mut self, resource: Resource) -> Self {
        self.resource = Some(resource);
        self
    }
}

/// The settings of one workspace folder.
#[derive(Debug, Clone, PartialEq)]
pub struct FolderConfiguration {
    pub folder: WorkspaceFolder,
    pub model: ConfigurationModel,
}

#[derive(Debug, Clone)]
pub struct Configuration {
    registry: Arc<RegistrySnapshot>,
    user_local: ConfigurationModel,
    user_remote: ConfigurationModel,
    workspace: ConfigurationModel,
    folders: Vec<FolderConfiguration>,
    memory: ConfigurationModel,
    identity: ResourceIdentity,
}

impl Configuration {
    pub fn new(registry: Arc<RegistrySnapshot>, identity: ResourceIdentity) -> Self {
        Self {
            registry,
            user_local: ConfigurationModel::empty(),
            user_remote: ConfigurationModel::empty(),
            workspace: ConfigurationModel::empty(),
            folders: Vec::new(),
            memory: ConfigurationModel::empty(),
            identity,
        }
    }

    pub fn with_registry(mut self, registry: Arc<RegistrySnapshot>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_user_local(mut self, model: ConfigurationModel) -> Self {
        self.user_local = model;
        self
    }

    pub fn with_user_remote(mut self, model: ConfigurationModel) -> Self {
        self.user_remote = model;
        self
    }

    pub fn with_workspace(mut self, model: ConfigurationModel) -> Self {
        self.workspace = model;
        self
    }

    pub fn with_folders(mut self, folders: Vec<FolderConfiguration>) -> Self {
        self.folders = folders;
        self
    }

    /// Replace the model of one folder, adding it when missing.
    pub fn with_folder(mut self, folder: WorkspaceFolder, model: ConfigurationModel) -> Self {
        let identity = self.identity;
        match self
            .folders
            .iter_mut()
            .find(|existing| identity.is_equal(&existing.folder.uri, &folder.uri))
        {
            Some(existing) => {
                existing.folder = folder;
                existing.model = model;
            }
            None => self.folders.push(FolderConfiguration { folder, model }),
        }
        self
    }

    pub fn with_memory(mut self, model: ConfigurationModel) -> Self {
        self.memory = model;
        self
    }

    pub fn registry(&self) -> &Arc<RegistrySnapshot> {
        &self.registry
    }

    pub fn identity(&self) -> ResourceIdentity {
        self.identity
    }

    pub fn defaults(&self) -> &ConfigurationModel {
        self.registry.default_model()
    }

    pub fn user_local(&self) -> &ConfigurationModel {
        &self.user_local
    }

    pub fn user_remote(&self) -> &ConfigurationModel {
        &self.user_remote
    }

    pub fn workspace(&self) -> &ConfigurationModel {
        &self.workspace
    }

    pub fn folders(&self) -> &[FolderConfiguration] {
        &self.folders
    }

    pub fn memory(&self) -> &ConfigurationModel {
        &self.memory
    }

    /// The folder source owning `resource`; the deepest folder wins.
    pub fn folder_for(&self, resource: &Resource) -> Option<&FolderConfiguration> {
        self.folders
            .iter()
            .filter(|entry| self.identity.is_equal_or_parent(&entry.folder.uri, resource))
            .max_by_key(|entry| entry.folder.uri.path().trim_end_matches('/').len())
    }

    pub fn folder_model(&self, folder: &Resource) -> Option<&ConfigurationModel> {
        self.folders
            .iter()
            .find(|entry| self.identity.is_equal(&entry.folder.uri, folder))
            .map(|entry| &entry.model)
    }

    /// Effective value of `key`.
    pub fn get_value(&self, key: &str, overrides: &ConfigurationOverrides) -> Option<Value> {
        self.inspect(key, overrides).value
    }

    /// Values of `key` in every source.
    pub fn inspect(&self, key: &str, overrides: &ConfigurationOverrides) -> InspectValue {
        if let Some(scope) = self.registry.scope_of(key) {
            return self.inspect_key(key, scope, overrides);
        }
        let parts: Vec<InspectValue> = self
            .registry
            .registered_descendants(key)
            .map(|descendant| self.inspect(descendant, overrides))
            .collect();
        if parts.is_empty() {
            return InspectValue::unknown(key);
        }
        InspectValue::compose(key, &parts)
    }

    fn inspect_key(
        &self,
        key: &str,
        scope: ConfigurationScope,
        overrides: &ConfigurationOverrides,
    ) -> InspectValue {
        let identifier = match scope {
            ConfigurationScope::LanguageOverridable => overrides.override_identifier.as_deref(),
            _ => None,
        };
        let folder_model = match &overrides.resource {
            Some(resource) if scope.is_folder_readable() => {
                self.folder_for(resource).map(|entry| &entry.model)
            }
            _ => None,
        };
        let workspace_model = scope.is_workspace_readable().then_some(&self.workspace);
        let read = |model: Option<&ConfigurationModel>| {
            model.and_then(|model| model.get_value_with_override(key, identifier))
        };

        let default_value = read(Some(self.defaults()));
        let user_local_value = read(Some(&self.user_local));
        let user_remote_value = read(Some(&self.user_remote));
        let workspace_value = read(workspace_model);
        let workspace_folder_value = read(folder_model);
        let memory_value = read(Some(&self.memory));
        let user_value = user_remote_value.clone().or_else(|| user_local_value.clone());

        // A language override from any source beats a plain value from a
        // narrower one.
        let layers = [
            Some(&self.memory),
            folder_model,
            workspace_model,
            Some(&self.user_remote),
            Some(&self.user_local),
            Some(self.defaults()),
        ];
        let base = layers
            .iter()
            .flatten()
            .find_map(|model| model.get_value(key).cloned());
        let overridden = identifier.and_then(|identifier| {
            layers
                .iter()
                .flatten()
                .find_map(|model| model.get_override_value(key, identifier))
        });
        let value = match overridden {
            Some(overridden) => Some(layer_override(base, overridden)),
            None => base,
        };

        InspectValue {
            key: key.to_string(),
            default_value,
            user_value,
            user_local_value,
            user_remote_value,
            workspace_value,
            workspace_folder_value,
            memory_value,
            value,
            override_identifiers: self.override_identifiers_for(key, scope),
        }
    }

    fn override_identifiers_for(&self, key: &str, scope: ConfigurationScope) -> Vec<String> {
        if scope != ConfigurationScope::LanguageOverridable {
            return Vec::new();
        }
        let mut identifiers = BTreeSet::new();
        for model in self.all_models() {
            for identifier in model.override_identifiers() {
                if model.get_override_value(key, &identifier).is_some() {
                    identifiers.insert(identifier);
                }
            }
        }
        identifiers.into_iter().collect()
    }

    /// Keys declared at each level. Workspace and folder keys exclude
    /// `Application` and `Machine` scoped ones; unregistered keys are kept.
    pub fn keys(&self) -> ConfigurationKeys {
        let gated = |model: &ConfigurationModel, readable: fn(ConfigurationScope) -> bool| {
            model
                .keys()
                .iter()
                .filter(|key| self.registry.scope_of(key).is_none_or(readable))
                .cloned()
                .collect::<BTreeSet<String>>()
        };

        let user: BTreeSet<String> = self
            .user_local
            .keys()
            .iter()
            .chain(self.user_remote.keys())
            .cloned()
            .collect();
        let workspace = gated(&self.workspace, ConfigurationScope::is_workspace_readable);
        let mut workspace_folder = BTreeSet::new();
        for entry in &self.folders {
            workspace_folder.extend(gated(&entry.model, ConfigurationScope::is_folder_readable));
        }

        ConfigurationKeys {
            default: self.registry.keys().cloned().collect(),
            user: user.into_iter().collect(),
            workspace: workspace.into_iter().collect(),
            workspace_folder: workspace_folder.into_iter().collect(),
        }
    }

    /// Every override identifier used by any source, defaults included.
    pub fn override_identifiers(&self) -> BTreeSet<String> {
        self.all_models()
            .flat_map(|model| model.override_identifiers())
            .collect()
    }

    fn all_models(&self) -> impl Iterator<Item = &ConfigurationModel> {
        [
            self.defaults(),
            &self.user_local,
            &self.user_remote,
            &self.workspace,
            &self.memory,
        ]
        .into_iter()
        .chain(self.folders.iter().map(|entry| &entry.model))
    }
}
