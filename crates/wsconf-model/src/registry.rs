//! Configuration registry
//!
//! The registry declares every known key with its scope and default value.
//! It is an explicit object shared by reference; each update publishes a new
//! immutable [`RegistrySnapshot`] and notifies listeners synchronously with
//! the keys whose declaration changed.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::event::{Emitter, Subscription};
use crate::model::ConfigurationModel;
use crate::parser::{is_override_key, override_identifiers_from_key, override_key, parse_jsonc};
use crate::scope::ConfigurationScope;
use crate::{Error, Result};

/// Declaration of a single configuration key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(default)]
    pub scope: ConfigurationScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl PropertySchema {
    pub fn new(scope: ConfigurationScope) -> Self {
        Self {
            scope,
            ..Self::default()
        }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// An immutable view of the registry at one point in time.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    version: u64,
    properties: BTreeMap<String, PropertySchema>,
    default_overrides: BTreeMap<String, Map<String, Value>>,
    defaults: ConfigurationModel,
}

impl RegistrySnapshot {
    fn build(
        version: u64,
        properties: BTreeMap<String, PropertySchema>,
        default_overrides: BTreeMap<String, Map<String, Value>>,
    ) -> Self {
        let mut entries: Vec<(String, Value)> = properties
            .iter()
            .filter_map(|(key, schema)| schema.default.clone().map(|value| (key.clone(), value)))
            .collect();
        entries.extend(
            default_overrides
                .iter()
                .map(|(identifier, values)| (override_key(identifier), Value::Object(values.clone()))),
        );
        let defaults = ConfigurationModel::from_entries(entries);
        Self {
            version,
            properties,
            default_overrides,
            defaults,
        }
    }

    /// Increases with every registry update.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn property(&self, key: &str) -> Option<&PropertySchema> {
        self.properties.get(key)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&String, &PropertySchema)> {
        self.properties.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.properties.keys()
    }

    pub fn is_registered(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    /// Scope of a registered key, or of the nearest registered ancestor for
    /// keys inside an object valued setting (`launch.configurations`).
    pub fn scope_of(&self, key: &str) -> Option<ConfigurationScope> {
        if let Some(schema) = self.properties.get(key) {
            return Some(schema.scope);
        }
        let mut current = key;
        while let Some((parent, _)) = current.rsplit_once('.') {
            if let Some(schema) = self.properties.get(parent) {
                return Some(schema.scope);
            }
            current = parent;
        }
        None
    }

    /// `key` is a proper prefix of at least one registered key (`editor`
    /// for `editor.fontSize`).
    pub fn is_section(&self, key: &str) -> bool {
        self.registered_descendants(key).next().is_some()
    }

    /// Registered keys strictly below `key`.
    pub fn registered_descendants<'a>(
        &'a self,
        key: &str,
    ) -> impl Iterator<Item = &'a String> + use<'a> {
        let prefix = format!("{key}.");
        self.properties
            .range(prefix.clone()..)
            .map(|(k, _)| k)
            .take_while(move |k| k.starts_with(&prefix))
    }

    /// The default values as a model, including default language overrides.
    pub fn default_model(&self) -> &ConfigurationModel {
        &self.defaults
    }

    pub fn default_override_identifiers(&self) -> impl Iterator<Item = &String> {
        self.default_overrides.keys()
    }
}

/// Published after every registry update.
#[derive(Debug, Clone)]
pub struct RegistryChange {
    /// Keys whose scope, default, or default override changed.
    pub keys: BTreeSet<String>,
    pub snapshot: Arc<RegistrySnapshot>,
}

/// Shared registry of configuration keys.
pub struct ConfigurationRegistry {
    current: RwLock<Arc<RegistrySnapshot>>,
    on_did_update: Emitter<RegistryChange>,
}

impl Default for ConfigurationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigurationRegistry {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(RegistrySnapshot::default())),
            on_did_update: Emitter::new(),
        }
    }

    /// A registry with the keys every workspace understands: `launch` and
    /// `tasks`, both resource scoped.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        let builtins = [
            (
                "launch",
                PropertySchema::new(ConfigurationScope::Resource)
                    .with_default(Value::Object(Map::new()))
                    .with_description("Debug launch configurations"),
            ),
            (
                "tasks",
                PropertySchema::new(ConfigurationScope::Resource)
                    .with_default(Value::Object(Map::new()))
                    .with_description("Task configurations"),
            ),
        ];
        if let Err(e) = registry.register_properties(builtins) {
            tracing::warn!(error = %e, "Failed to register built-in settings");
        }
        registry
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Listen for registry updates. Listeners run synchronously on the
    /// updating thread, after the new snapshot is in place.
    pub fn on_did_update<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&RegistryChange) + Send + Sync + 'static,
    {
        self.on_did_update.subscribe(listener)
    }

    pub fn register_property(&self, key: impl Into<String>, schema: PropertySchema) -> Result<()> {
        self.register_properties([(key.into(), schema)])
    }

    /// Register (or re-declare) several keys as one update.
    pub fn register_properties<K, I>(&self, properties: I) -> Result<()>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, PropertySchema)>,
    {
        let properties: Vec<(String, PropertySchema)> = properties
            .into_iter()
            .map(|(key, schema)| (key.into(), schema))
            .collect();
        for (key, _) in &properties {
            validate_key(key)?;
        }

        self.update(|props, _| {
            let mut changed = BTreeSet::new();
            for (key, schema) in properties {
                if props.get(&key) != Some(&schema) {
                    tracing::debug!(%key, scope = %schema.scope, "Registering configuration property");
                    props.insert(key.clone(), schema);
                    changed.insert(key);
                }
            }
            changed
        });
        Ok(())
    }

    pub fn deregister_properties(&self, keys: &[&str]) {
        self.update(|props, _| {
            keys.iter()
                .filter(|key| props.remove(**key).is_some())
                .map(|key| key.to_string())
                .collect()
        });
    }

    /// Default values applied inside the `[identifier]` section.
    pub fn register_default_overrides(&self, identifier: &str, values: Map<String, Value>) {
        let identifier = identifier.to_string();
        self.update(move |_, overrides| {
            let previous = overrides.remove(&identifier).unwrap_or_default();
            let mut changed: BTreeSet<String> = previous
                .iter()
                .filter(|(key, value)| values.get(*key) != Some(*value))
                .map(|(key, _)| key.clone())
                .collect();
            changed.extend(
                values
                    .iter()
                    .filter(|(key, value)| previous.get(*key) != Some(*value))
                    .map(|(key, _)| key.clone()),
            );
            if !values.is_empty() {
                overrides.insert(identifier, values);
            }
            changed
        });
    }

    /// Register keys from a JSONC schema document:
    ///
    /// ```json
    /// {
    ///   "editor.fontSize": { "scope": "language-overridable", "default": 14 },
    ///   "[rust]": { "editor.fontSize": 12 }
    /// }
    /// ```
    pub fn register_schema_json(&self, content: &str) -> Result<()> {
        let Value::Object(entries) = parse_jsonc("schema", content)? else {
            return Err(Error::NotAnObject {
                name: "schema".to_string(),
            });
        };

        let mut properties = Vec::new();
        let mut overrides = Vec::new();
        for (key, value) in entries {
            if is_override_key(&key) {
                let Value::Object(values) = value else {
                    return Err(Error::InvalidSchema {
                        key,
                        message: "default overrides must be an object".to_string(),
                    });
                };
                for identifier in override_identifiers_from_key(&key) {
                    overrides.push((identifier, values.clone()));
                }
            } else {
                let schema: PropertySchema =
                    serde_json::from_value(value).map_err(|e| Error::InvalidSchema {
                        key: key.clone(),
                        message: e.to_string(),
                    })?;
                properties.push((key, schema));
            }
        }

        self.register_properties(properties)?;
        for (identifier, values) in overrides {
            self.register_default_overrides(&identifier, values);
        }
        Ok(())
    }

    fn update<F>(&self, apply: F)
    where
        F: FnOnce(
            &mut BTreeMap<String, PropertySchema>,
            &mut BTreeMap<String, Map<String, Value>>,
        ) -> BTreeSet<String>,
    {
        let change = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            let mut properties = current.properties.clone();
            let mut overrides = current.default_overrides.clone();
            let keys = apply(&mut properties, &mut overrides);
            if keys.is_empty() {
                return;
            }
            let snapshot = Arc::new(RegistrySnapshot::build(
                current.version + 1,
                properties,
                overrides,
            ));
            *current = Arc::clone(&snapshot);
            RegistryChange { keys, snapshot }
        };
        self.on_did_update.fire(&change);
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || is_override_key(key) || key.split('.').any(str::is_empty) {
        return Err(Error::InvalidKey {
            key: key.to_string(),
        });
    }
    Ok(())
}
