//! Change computation engine
//!
//! Compares two configuration snapshots and reports the registered keys
//! whose scope-gated values differ. Only keys related to sources that
//! actually changed are examined, and each candidate is compared without a
//! resource, for every folder, and for every override identifier.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::Value;
use wsconf_model::{ConfigurationModel, ConfigurationTarget, RegistrySnapshot};

use crate::configuration::{Configuration, ConfigurationOverrides};

/// Keys whose effective values differ between two snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationChange {
    pub keys: BTreeSet<String>,
    /// Override identifiers under which some key changed
    pub override_identifiers: BTreeSet<String>,
}

impl ConfigurationChange {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Compute the change from `previous` to `next`.
pub fn compare(previous: &Configuration, next: &Configuration) -> ConfigurationChange {
    let mut raw_keys = BTreeSet::new();
    let mut collect = |a: &ConfigurationModel, b: &ConfigurationModel| {
        if ConfigurationModel::ptr_eq(a, b) {
            return;
        }
        model_keys(a, &mut raw_keys);
        model_keys(b, &mut raw_keys);
    };

    collect(previous.user_local(), next.user_local());
    collect(previous.user_remote(), next.user_remote());
    collect(previous.workspace(), next.workspace());
    collect(previous.memory(), next.memory());
    collect(previous.defaults(), next.defaults());

    let empty = ConfigurationModel::empty();
    let mut folder_uris: Vec<&wsconf_fs::Resource> = Vec::new();
    for entry in previous.folders().iter().chain(next.folders()) {
        if !folder_uris
            .iter()
            .any(|uri| next.identity().is_equal(uri, &entry.folder.uri))
        {
            folder_uris.push(&entry.folder.uri);
        }
    }
    for uri in &folder_uris {
        let before = previous.folder_model(uri).unwrap_or(&empty);
        let after = next.folder_model(uri).unwrap_or(&empty);
        collect(before, after);
    }

    let schema_keys = changed_schema_keys(previous.registry(), next.registry());

    let candidates = candidate_keys(&raw_keys, &schema_keys, previous.registry(), next.registry());
    if candidates.is_empty() {
        return ConfigurationChange::default();
    }

    let mut contexts = vec![ConfigurationOverrides::none()];
    contexts.extend(
        folder_uris
            .iter()
            .map(|uri| ConfigurationOverrides::for_resource((*uri).clone())),
    );
    let identifiers: BTreeSet<String> = previous
        .override_identifiers()
        .into_iter()
        .chain(next.override_identifiers())
        .collect();

    let mut change = ConfigurationChange::default();
    for key in candidates {
        let mut affected = contexts.iter().any(|overrides| {
            !previous
                .inspect(&key, overrides)
                .same_values(&next.inspect(&key, overrides))
        });
        for identifier in &identifiers {
            let language_contexts = contexts.iter().map(|overrides| ConfigurationOverrides {
                override_identifier: Some(identifier.clone()),
                ..overrides.clone()
            });
            let mut changed_here = false;
            for overrides in language_contexts {
                if !previous
                    .inspect(&key, &overrides)
                    .same_values(&next.inspect(&key, &overrides))
                {
                    changed_here = true;
                    break;
                }
            }
            if changed_here {
                affected = true;
                change.override_identifiers.insert(identifier.clone());
            }
        }
        if affected {
            change.keys.insert(key);
        }
    }
    change
}

fn model_keys(model: &ConfigurationModel, keys: &mut BTreeSet<String>) {
    keys.extend(model.keys().iter().cloned());
    for section in model.overrides() {
        keys.extend(section.keys.iter().cloned());
    }
}

fn changed_schema_keys(previous: &Arc<RegistrySnapshot>, next: &Arc<RegistrySnapshot>) -> BTreeSet<String> {
    if Arc::ptr_eq(previous, next) {
        return BTreeSet::new();
    }
    let before: BTreeMap<&String, _> = previous.properties().collect();
    let after: BTreeMap<&String, _> = next.properties().collect();
    before
        .keys()
        .chain(after.keys())
        .filter(|key| before.get(*key) != after.get(*key))
        .map(|key| (*key).clone())
        .collect()
}

/// Registered keys equal to, below, or above any raw key.
fn candidate_keys(
    raw_keys: &BTreeSet<String>,
    schema_keys: &BTreeSet<String>,
    previous: &RegistrySnapshot,
    next: &RegistrySnapshot,
) -> BTreeSet<String> {
    let registered: BTreeSet<&String> = previous.keys().chain(next.keys()).collect();
    let mut candidates: BTreeSet<String> = schema_keys.clone();
    for raw in raw_keys {
        for key in &registered {
            if is_related(key, raw) {
                candidates.insert((*key).clone());
            }
        }
    }
    candidates
}

/// Equal, or one is a dotted ancestor of the other.
pub fn is_related(a: &str, b: &str) -> bool {
    a == b || is_ancestor(a, b) || is_ancestor(b, a)
}

fn is_ancestor(ancestor: &str, key: &str) -> bool {
    key.strip_prefix(ancestor)
        .is_some_and(|rest| rest.starts_with('.'))
}

/// Delivered to `on_did_change_configuration` listeners.
#[derive(Debug, Clone)]
pub struct ConfigurationChangeEvent {
    pub affected_keys: BTreeSet<String>,
    /// Source that triggered the change
    pub source: ConfigurationTarget,
    /// Contents of the changed source after the change, when it has one
    pub source_config: Option<Value>,
    pub change: ConfigurationChange,
    previous: Arc<Configuration>,
    current: Arc<Configuration>,
}

impl ConfigurationChangeEvent {
    /// `None` when nothing changed.
    pub fn new(
        source: ConfigurationTarget,
        source_config: Option<&ConfigurationModel>,
        change: ConfigurationChange,
        previous: Arc<Configuration>,
        current: Arc<Configuration>,
    ) -> Option<Self> {
        if change.is_empty() {
            return None;
        }
        Some(Self {
            affected_keys: change.keys.clone(),
            source,
            source_config: source_config.map(|model| Value::Object(model.contents().clone())),
            change,
            previous,
            current,
        })
    }

    /// Whether `section`, a key below it, or a key above it changed. With
    /// `overrides`, the effective value under them must differ as well.
    pub fn affects_configuration(&self, section: &str, overrides: Option<&ConfigurationOverrides>) -> bool {
        let related = self
            .affected_keys
            .iter()
            .any(|key| is_related(key, section));
        if !related {
            return false;
        }
        match overrides {
            None => true,
            Some(overrides) => {
                self.previous.get_value(section, overrides) != self.current.get_value(section, overrides)
            }
        }
    }

    pub fn previous(&self) -> &Arc<Configuration> {
        &self.previous
    }

    pub fn current(&self) -> &Arc<Configuration> {
        &self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use wsconf_fs::{Resource, ResourceIdentity};
    use wsconf_model::{ConfigurationModelParser, ConfigurationRegistry, ConfigurationScope, PropertySchema};

    use crate::workspace::WorkspaceFolder;

    fn registry() -> ConfigurationRegistry {
        let registry = ConfigurationRegistry::new();
        registry
            .register_properties([
                (
                    "editor.fontSize",
                    PropertySchema::new(ConfigurationScope::LanguageOverridable).with_default(json!(14)),
                ),
                (
                    "editor.tabSize",
                    PropertySchema::new(ConfigurationScope::Resource).with_default(json!(4)),
                ),
                (
                    "app.telemetry",
                    PropertySchema::new(ConfigurationScope::Application).with_default(json!(true)),
                ),
            ])
            .unwrap();
        registry
    }

    fn model(value: Value) -> ConfigurationModel {
        ConfigurationModelParser::new("test").parse_value(&value)
    }

    fn base(registry: &ConfigurationRegistry) -> Configuration {
        Configuration::new(registry.snapshot(), ResourceIdentity::CaseSensitive)
    }

    #[test]
    fn identical_snapshots_have_no_change() {
        let registry = registry();
        let configuration = base(&registry).with_user_local(model(json!({"editor.fontSize": 12})));
        assert!(compare(&configuration, &configuration.clone()).is_empty());
    }

    #[test]
    fn equal_content_in_new_model_is_no_change() {
        let registry = registry();
        let before = base(&registry).with_user_local(model(json!({"editor.fontSize": 12})));
        let after = base(&registry).with_user_local(model(json!({"editor.fontSize": 12})));
        assert!(compare(&before, &after).is_empty());
    }

    #[test]
    fn reports_changed_and_removed_keys() {
        let registry = registry();
        let before = base(&registry).with_user_local(model(json!({"editor.fontSize": 12, "editor.tabSize": 2})));
        let after = base(&registry).with_user_local(model(json!({"editor.fontSize": 13})));

        let change = compare(&before, &after);
        assert_eq!(
            change.keys.into_iter().collect::<Vec<_>>(),
            ["editor.fontSize", "editor.tabSize"]
        );
    }

    #[test]
    fn gated_workspace_value_is_no_change() {
        let registry = registry();
        let before = base(&registry);
        let after = base(&registry).with_workspace(model(json!({"app.telemetry": false})));
        assert!(compare(&before, &after).is_empty());
    }

    #[test]
    fn section_write_reports_registered_descendants() {
        let registry = registry();
        let before = base(&registry);
        let after = base(&registry).with_user_local(model(json!({"editor": {"tabSize": 8}})));
        let change = compare(&before, &after);
        assert_eq!(change.keys.into_iter().collect::<Vec<_>>(), ["editor.tabSize"]);
    }

    #[test]
    fn folder_only_change_is_detected() {
        let registry = registry();
        let folder = WorkspaceFolder::new(Resource::parse("file:///w/a").unwrap(), None, 0);
        let before = base(&registry).with_folder(folder.clone(), ConfigurationModel::empty());
        let after = base(&registry).with_folder(folder, model(json!({"editor.tabSize": 3})));

        let change = compare(&before, &after);
        assert!(change.keys.contains("editor.tabSize"));
    }

    #[test]
    fn language_override_change_records_identifier() {
        let registry = registry();
        let before = base(&registry);
        let after = base(&registry).with_user_local(model(json!({"[rust]": {"editor.fontSize": 20}})));

        let change = compare(&before, &after);
        assert!(change.keys.contains("editor.fontSize"));
        assert_eq!(
            change.override_identifiers.into_iter().collect::<Vec<_>>(),
            ["rust"]
        );
    }

    #[test]
    fn rescoping_is_a_change() {
        let registry = registry();
        let before = base(&registry)
            .with_user_local(model(json!({"editor.tabSize": 2})))
            .with_workspace(model(json!({"editor.tabSize": 6})));
        registry
            .register_property("editor.tabSize", PropertySchema::new(ConfigurationScope::Application))
            .unwrap();
        let after = before.clone().with_registry(registry.snapshot());

        let change = compare(&before, &after);
        assert!(change.keys.contains("editor.tabSize"));
        assert_eq!(
            after.get_value("editor.tabSize", &ConfigurationOverrides::none()),
            Some(json!(2))
        );
    }

    #[test]
    fn affects_configuration_matches_related_keys() {
        let registry = registry();
        let before = Arc::new(base(&registry));
        let after = Arc::new(base(&registry).with_user_local(model(json!({"editor.fontSize": 12}))));
        let change = compare(&before, &after);
        let event = ConfigurationChangeEvent::new(
            ConfigurationTarget::User,
            Some(after.user_local()),
            change,
            before,
            Arc::clone(&after),
        )
        .unwrap();

        assert!(event.affects_configuration("editor", None));
        assert!(event.affects_configuration("editor.fontSize", None));
        assert!(!event.affects_configuration("editor.tabSize", None));
        assert!(!event.affects_configuration("edit", None));
        assert!(event.affects_configuration("editor.fontSize", Some(&ConfigurationOverrides::none())));
        assert_eq!(event.source_config, Some(json!({"editor": {"fontSize": 12}})));
    }

    #[test]
    fn empty_change_has_no_event() {
        let registry = registry();
        let configuration = Arc::new(base(&registry));
        assert!(
            ConfigurationChangeEvent::new(
                ConfigurationTarget::Workspace,
                None,
                ConfigurationChange::default(),
                Arc::clone(&configuration),
                configuration,
            )
            .is_none()
        );
    }
}
