//! Inspection results

use serde::Serialize;
use serde_json::{Map, Value};

/// Per-source values of one key, plus the effective value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectValue {
    pub key: String,
    pub default_value: Option<Value>,
    /// Remote user value, falling back to the local one
    pub user_value: Option<Value>,
    pub user_local_value: Option<Value>,
    pub user_remote_value: Option<Value>,
    pub workspace_value: Option<Value>,
    pub workspace_folder_value: Option<Value>,
    pub memory_value: Option<Value>,
    pub value: Option<Value>,
    /// Identifiers with an override section for this key in any source
    pub override_identifiers: Vec<String>,
}

impl InspectValue {
    pub fn unknown(key: &str) -> Self {
        Self {
            key: key.to_string(),
            ..Self::default()
        }
    }

    /// Same values, ignoring the key name.
    pub(crate) fn same_values(&self, other: &Self) -> bool {
        self.default_value == other.default_value
            && self.user_value == other.user_value
            && self.user_local_value == other.user_local_value
            && self.user_remote_value == other.user_remote_value
            && self.workspace_value == other.workspace_value
            && self.workspace_folder_value == other.workspace_folder_value
            && self.memory_value == other.memory_value
            && self.value == other.value
    }

    /// Compose a section from the inspection of its descendants.
    pub(crate) fn compose(section: &str, parts: &[InspectValue]) -> Self {
        fn field(
            section: &str,
            parts: &[InspectValue],
            get: impl Fn(&InspectValue) -> &Option<Value>,
        ) -> Option<Value> {
            let mut composed = Map::new();
            for part in parts {
                let Some(value) = get(part) else { continue };
                let relative = part
                    .key
                    .strip_prefix(section)
                    .and_then(|rest| rest.strip_prefix('.'))
                    .unwrap_or(&part.key);
                insert_path(&mut composed, relative, value.clone());
            }
            (!composed.is_empty()).then_some(Value::Object(composed))
        }

        let mut override_identifiers: Vec<String> = parts
            .iter()
            .flat_map(|part| part.override_identifiers.iter().cloned())
            .collect();
        override_identifiers.sort();
        override_identifiers.dedup();

        Self {
            key: section.to_string(),
            default_value: field(section, parts, |p| &p.default_value),
            user_value: field(section, parts, |p| &p.user_value),
            user_local_value: field(section, parts, |p| &p.user_local_value),
            user_remote_value: field(section, parts, |p| &p.user_remote_value),
            workspace_value: field(section, parts, |p| &p.workspace_value),
            workspace_folder_value: field(section, parts, |p| &p.workspace_folder_value),
            memory_value: field(section, parts, |p| &p.memory_value),
            value: field(section, parts, |p| &p.value),
            override_identifiers,
        }
    }
}

fn insert_path(map: &mut Map<String, Value>, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            map.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = map
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(child) = child {
                insert_path(child, rest, value);
            }
        }
    }
}

/// Keys present at each level, after scope filtering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationKeys {
    pub default: Vec<String>,
    pub user: Vec<String>,
    pub workspace: Vec<String>,
    pub workspace_folder: Vec<String>,
}
