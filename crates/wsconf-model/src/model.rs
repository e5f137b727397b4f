//! Immutable configuration models
//!
//! A [`ConfigurationModel`] holds the settings of a single source as a value
//! tree (`"editor.fontSize": 12` is stored as `{"editor": {"fontSize": 12}}`)
//! plus the list of keys as they were declared, and any language override
//! sections (`"[rust]": {...}`). Models are shared behind an `Arc`; every
//! edit builds a new model so earlier snapshots stay intact for diffing.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::parser::{is_override_key, override_identifiers_from_key};

/// Settings scoped to one or more override identifiers, e.g. `[rust][toml]`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverrideSection {
    pub identifiers: Vec<String>,
    pub contents: Map<String, Value>,
    pub keys: Vec<String>,
}

impl OverrideSection {
    /// The section's key as written in a settings file.
    pub fn key(&self) -> String {
        self.identifiers.iter().map(|id| format!("[{id}]")).collect()
    }
}

/// Plain data form of a model, used for caching.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationModelData {
    pub contents: Map<String, Value>,
    pub keys: Vec<String>,
    #[serde(default)]
    pub overrides: Vec<OverrideSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "ConfigurationModelData", into = "ConfigurationModelData")]
pub struct ConfigurationModel {
    data: Arc<ConfigurationModelData>,
}

impl PartialEq for ConfigurationModel {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data) || self.data == other.data
    }
}

impl From<ConfigurationModelData> for ConfigurationModel {
    fn from(data: ConfigurationModelData) -> Self {
        Self {
            data: Arc::new(data),
        }
    }
}

impl From<ConfigurationModel> for ConfigurationModelData {
    fn from(model: ConfigurationModel) -> Self {
        Arc::unwrap_or_clone(model.data)
    }
}

impl ConfigurationModel {
    pub fn new(
        contents: Map<String, Value>,
        keys: Vec<String>,
        overrides: Vec<OverrideSection>,
    ) -> Self {
        ConfigurationModelData {
            contents,
            keys,
            overrides,
        }
        .into()
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a model from dotted keys. `[id]` keys with object values become
    /// override sections.
    pub fn from_entries<K, I>(entries: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        let mut data = ConfigurationModelData::default();
        for (key, value) in entries {
            data.set(key.into(), value);
        }
        data.into()
    }

    pub fn is_empty(&self) -> bool {
        self.data.keys.is_empty() && self.data.overrides.is_empty()
    }

    pub fn contents(&self) -> &Map<String, Value> {
        &self.data.contents
    }

    /// Keys in declaration order, override sections excluded.
    pub fn keys(&self) -> &[String] {
        &self.data.keys
    }

    pub fn overrides(&self) -> &[OverrideSection] {
        &self.data.overrides
    }

    /// Every identifier named by any override section, sorted and unique.
    pub fn override_identifiers(&self) -> Vec<String> {
        let mut identifiers: Vec<String> = self
            .data
            .overrides
            .iter()
            .flat_map(|section| section.identifiers.iter().cloned())
            .collect();
        identifiers.sort();
        identifiers.dedup();
        identifiers
    }

    /// Value at a dotted key, navigating into object values.
    pub fn get_value(&self, section: &str) -> Option<&Value> {
        lookup(&self.data.contents, section)
    }

    /// Value at `section` from every override section naming `identifier`,
    /// later sections winning.
    pub fn get_override_value(&self, section: &str, identifier: &str) -> Option<Value> {
        let contents = self.override_contents(identifier)?;
        lookup(&contents, section).cloned()
    }

    /// Base value with the override section for `identifier` layered over it.
    pub fn get_value_with_override(&self, section: &str, identifier: Option<&str>) -> Option<Value> {
        let base = self.get_value(section).cloned();
        match identifier.and_then(|id| self.get_override_value(section, id)) {
            Some(overridden) => Some(layer_override(base, overridden)),
            None => base,
        }
    }

    pub fn contains_key(&self, section: &str) -> bool {
        self.get_value(section).is_some()
    }

    /// A new model with `key` set. `[id]` keys replace an override section.
    pub fn set_value(&self, key: &str, value: Value) -> Self {
        let mut data = (*self.data).clone();
        data.set(key.to_string(), value);
        data.into()
    }

    /// A new model without `key` (and anything declared below it).
    pub fn remove_value(&self, key: &str) -> Self {
        let mut data = (*self.data).clone();
        if is_override_key(key) {
            let identifiers = override_identifiers_from_key(key);
            data.overrides.retain(|section| section.identifiers != identifiers);
        } else {
            remove_from_value_tree(&mut data.contents, key);
            data.keys.retain(|k| !is_same_or_child(k, key));
        }
        data.into()
    }

    /// A new model with `key` set inside the `[identifier]` section.
    pub fn set_override_value(&self, identifier: &str, key: &str, value: Value) -> Self {
        let mut data = (*self.data).clone();
        let identifiers = vec![identifier.to_string()];
        let index = match data
            .overrides
            .iter()
            .position(|section| section.identifiers == identifiers)
        {
            Some(index) => index,
            None => {
                data.overrides.push(OverrideSection {
                    identifiers,
                    ..OverrideSection::default()
                });
                data.overrides.len() - 1
            }
        };
        let section = &mut data.overrides[index];
        if add_to_value_tree(&mut section.contents, key, value) && !section.keys.iter().any(|k| k == key) {
            section.keys.push(key.to_string());
        }
        data.into()
    }

    /// A new model with `key` removed from the `[identifier]` section.
    /// Sections left empty are dropped.
    pub fn remove_override_value(&self, identifier: &str, key: &str) -> Self {
        let mut data = (*self.data).clone();
        for section in data
            .overrides
            .iter_mut()
            .filter(|section| section.identifiers.len() == 1 && section.identifiers[0] == identifier)
        {
            remove_from_value_tree(&mut section.contents, key);
            section.keys.retain(|k| !is_same_or_child(k, key));
        }
        data.overrides.retain(|section| !section.keys.is_empty());
        data.into()
    }

    /// Overlay `others` onto this model in order; later models win.
    pub fn merge(&self, others: &[&ConfigurationModel]) -> Self {
        if others.iter().all(|other| other.is_empty()) {
            return self.clone();
        }
        let mut data = (*self.data).clone();
        for other in others {
            merge_contents(&mut data.contents, &other.data.contents);
            for key in &other.data.keys {
                if !data.keys.contains(key) {
                    data.keys.push(key.clone());
                }
            }
            for section in &other.data.overrides {
                match data
                    .overrides
                    .iter_mut()
                    .find(|existing| existing.identifiers == section.identifiers)
                {
                    Some(existing) => {
                        merge_contents(&mut existing.contents, &section.contents);
                        for key in &section.keys {
                            if !existing.keys.contains(key) {
                                existing.keys.push(key.clone());
                            }
                        }
                    }
                    None => data.overrides.push(section.clone()),
                }
            }
        }
        data.into()
    }

    /// Both handles point at the same underlying model.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.data, &b.data)
    }

    fn sections_for<'a>(&'a self, identifier: &'a str) -> impl Iterator<Item = &'a OverrideSection> {
        self.data
            .overrides
            .iter()
            .filter(move |section| section.identifiers.iter().any(|id| id == identifier))
    }

    fn override_contents(&self, identifier: &str) -> Option<Map<String, Value>> {
        let mut sections = self.sections_for(identifier);
        let mut contents = sections.next()?.contents.clone();
        for section in sections {
            merge_contents(&mut contents, &section.contents);
        }
        Some(contents)
    }
}

impl ConfigurationModelData {
    fn set(&mut self, key: String, value: Value) {
        if is_override_key(&key) {
            let identifiers = override_identifiers_from_key(&key);
            self.overrides.retain(|section| section.identifiers != identifiers);
            if let Value::Object(entries) = value {
                let mut section = OverrideSection {
                    identifiers,
                    ..OverrideSection::default()
                };
                for (inner_key, inner_value) in entries {
                    if add_to_value_tree(&mut section.contents, &inner_key, inner_value) {
                        section.keys.push(inner_key);
                    }
                }
                self.overrides.push(section);
            } else {
                tracing::warn!(%key, "Ignoring override section that is not an object");
            }
            return;
        }

        if add_to_value_tree(&mut self.contents, &key, value) && !self.keys.contains(&key) {
            self.keys.push(key);
        }
    }
}

fn is_same_or_child(candidate: &str, key: &str) -> bool {
    candidate == key
        || candidate
            .strip_prefix(key)
            .is_some_and(|rest| rest.starts_with('.'))
}

/// Look up a dotted key in a value tree.
fn lookup<'a>(tree: &'a Map<String, Value>, section: &str) -> Option<&'a Value> {
    let mut segments = section.split('.');
    let mut current = tree.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Insert `value` at a dotted key, creating intermediate objects.
///
/// Returns `false` (and leaves the tree alone) when a segment on the way is
/// already a non-object value.
pub(crate) fn add_to_value_tree(tree: &mut Map<String, Value>, key: &str, value: Value) -> bool {
    let segments: Vec<&str> = key.split('.').collect();
    let Some((last, parents)) = segments.split_last() else {
        return false;
    };

    let mut current = tree;
    for segment in parents {
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        match entry {
            Value::Object(map) => current = map,
            _ => {
                tracing::warn!(%key, %segment, "Ignoring setting, an ancestor is not an object");
                return false;
            }
        }
    }
    current.insert(last.to_string(), value);
    true
}

/// Remove a dotted key, pruning parents that end up empty.
fn remove_from_value_tree(tree: &mut Map<String, Value>, key: &str) {
    fn remove(map: &mut Map<String, Value>, segments: &[&str]) {
        match segments {
            [] => {}
            [last] => {
                map.remove(*last);
            }
            [first, rest @ ..] => {
                if let Some(Value::Object(child)) = map.get_mut(*first) {
                    remove(child, rest);
                    if child.is_empty() {
                        map.remove(*first);
                    }
                }
            }
        }
    }
    let segments: Vec<&str> = key.split('.').collect();
    remove(tree, &segments);
}

fn merge_contents(target: &mut Map<String, Value>, source: &Map<String, Value>) {
    for (key, value) in source {
        match target.get_mut(key) {
            Some(existing) if existing.is_object() && value.is_object() => {
                deep_merge_value(existing, value);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// An override value layered over a base value. Objects merge, anything
/// else replaces.
pub fn layer_override(base: Option<Value>, overridden: Value) -> Value {
    match base {
        Some(mut base @ Value::Object(_)) if overridden.is_object() => {
            deep_merge_value(&mut base, &overridden);
            base
        }
        _ => overridden,
    }
}

/// Recursively overlay `other` onto `base`; non-object values replace.
pub fn deep_merge_value(base: &mut Value, other: &Value) {
    match (base, other) {
        (Value::Object(base_map), Value::Object(other_map)) => {
            for (key, other_val) in other_map {
                if let Some(base_val) = base_map.get_mut(key) {
                    deep_merge_value(base_val, other_val);
                } else {
                    base_map.insert(key.clone(), other_val.clone());
                }
            }
        }
        (base, other) => {
            *base = other.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn model(value: Value) -> ConfigurationModel {
        let Value::Object(entries) = value else {
            panic!("test models are objects");
        };
        ConfigurationModel::from_entries(entries)
    }

    #[test]
    fn dotted_keys_build_a_tree() {
        let m = model(json!({"editor.fontSize": 12, "editor.tabSize": 4}));
        assert_eq!(m.get_value("editor"), Some(&json!({"fontSize": 12, "tabSize": 4})));
        assert_eq!(m.get_value("editor.tabSize"), Some(&json!(4)));
        assert_eq!(m.keys(), ["editor.fontSize", "editor.tabSize"]);
    }

    #[test]
    fn navigates_into_object_values() {
        let m = model(json!({"launch": {"configurations": [], "compounds": []}}));
        assert_eq!(m.get_value("launch.configurations"), Some(&json!([])));
        assert_eq!(m.get_value("launch.version"), None);
    }

    #[test]
    fn conflicting_key_is_ignored() {
        let m = model(json!({"a": 1, "a.b": 2}));
        assert_eq!(m.get_value("a"), Some(&json!(1)));
        assert_eq!(m.keys(), ["a"]);
    }

    #[test]
    fn edits_return_new_models() {
        let original = model(json!({"a.b": 1}));
        let edited = original.set_value("a.c", json!(2));

        assert_eq!(original.get_value("a.c"), None);
        assert_eq!(edited.get_value("a"), Some(&json!({"b": 1, "c": 2})));

        let removed = edited.remove_value("a.b").remove_value("a.c");
        assert!(removed.is_empty());
        assert_eq!(removed.get_value("a"), None);
    }

    #[test]
    fn merge_overlays_later_models() {
        let base = model(json!({"a": 1, "b": {"x": 1, "y": 1}}));
        let other = model(json!({"b.y": 2, "c": 3}));
        let merged = base.merge(&[&other]);

        assert_eq!(merged.get_value("a"), Some(&json!(1)));
        assert_eq!(merged.get_value("b"), Some(&json!({"x": 1, "y": 2})));
        assert_eq!(merged.get_value("c"), Some(&json!(3)));
        assert_eq!(merged.keys(), ["a", "b", "b.y", "c"]);
    }

    #[test]
    fn merge_with_empty_keeps_identity() {
        let base = model(json!({"a": 1}));
        let merged = base.merge(&[&ConfigurationModel::empty()]);
        assert!(ConfigurationModel::ptr_eq(&base, &merged));
    }

    #[test]
    fn override_sections_layer_over_base() {
        let m = model(json!({
            "editor.tabSize": 4,
            "editor": {"insertSpaces": true},
            "[rust]": {"editor.tabSize": 2},
            "[rust][toml]": {"editor.insertSpaces": false},
        }));

        assert_eq!(m.override_identifiers(), ["rust", "toml"]);
        assert_eq!(m.get_value_with_override("editor.tabSize", Some("rust")), Some(json!(2)));
        assert_eq!(m.get_value_with_override("editor.tabSize", Some("go")), Some(json!(4)));
        assert_eq!(
            m.get_value_with_override("editor", Some("rust")),
            Some(json!({"tabSize": 2, "insertSpaces": false}))
        );
    }

    #[test]
    fn override_value_edits() {
        let m = ConfigurationModel::empty().set_override_value("rust", "editor.tabSize", json!(2));
        assert_eq!(m.get_override_value("editor.tabSize", "rust"), Some(json!(2)));
        assert_eq!(m.overrides()[0].key(), "[rust]");

        let cleared = m.remove_override_value("rust", "editor.tabSize");
        assert!(cleared.is_empty());
    }

    #[test]
    fn serde_round_trip_preserves_overrides() {
        let m = model(json!({"a": 1, "[rust]": {"b": 2}}));
        let json = serde_json::to_string(&m).unwrap();
        let restored: ConfigurationModel = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, m);
    }

    #[test]
    fn deep_merge_replaces_non_objects() {
        let mut base = json!({"a": {"b": 1}, "c": [1]});
        deep_merge_value(&mut base, &json!({"a": {"d": 2}, "c": [2]}));
        assert_eq!(base, json!({"a": {"b": 1, "d": 2}, "c": [2]}));
    }
}
