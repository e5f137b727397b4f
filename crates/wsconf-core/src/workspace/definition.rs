//! Workspace definition files
//!
//! ```json
//! {
//!   "folders": [{ "path": "app" }, { "uri": "memory:///shared", "name": "Shared" }],
//!   "settings": { "editor.tabSize": 2 },
//!   "launch": { "configurations": [] }
//! }
//! ```
//!
//! Relative `path` entries resolve against the directory of the file.
//! Unknown top-level properties survive a rewrite.

use serde_json::{Map, Value};
use wsconf_fs::{Resource, ResourceIdentity};
use wsconf_model::parse_jsonc;

use super::WorkspaceFolder;
use crate::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkspaceDefinition {
    pub folders: Vec<WorkspaceFolder>,
    pub settings: Value,
    pub launch: Option<Value>,
    pub tasks: Option<Value>,
    raw: Map<String, Value>,
}

impl WorkspaceDefinition {
    /// Parse the content of the definition file at `location`.
    pub fn parse(location: &Resource, content: &str, identity: ResourceIdentity) -> Result<Self> {
        let value = parse_jsonc(location.as_str(), content)?;
        let Value::Object(raw) = value else {
            return Err(Error::InvalidWorkspace {
                resource: location.to_string(),
                message: "expected a JSON object".to_string(),
            });
        };

        let mut folders: Vec<WorkspaceFolder> = Vec::new();
        if let Some(entries) = raw.get("folders").and_then(Value::as_array) {
            for entry in entries {
                let Some(folder) = parse_folder_entry(location, entry) else {
                    tracing::warn!(workspace = %location, entry = %entry, "Skipping invalid folder entry");
                    continue;
                };
                if folders
                    .iter()
                    .any(|existing| identity.is_equal(&existing.uri, &folder.uri))
                {
                    tracing::debug!(folder = %folder.uri, "Dropping duplicate workspace folder");
                    continue;
                }
                let index = folders.len();
                folders.push(WorkspaceFolder { index, ..folder });
            }
        }

        Ok(Self {
            folders,
            settings: raw.get("settings").cloned().unwrap_or(Value::Null),
            launch: raw.get("launch").cloned(),
            tasks: raw.get("tasks").cloned(),
            raw,
        })
    }

    /// Parse, treating malformed content as an empty definition.
    pub fn parse_lenient(location: &Resource, content: &str, identity: ResourceIdentity) -> Self {
        Self::parse(location, content, identity).unwrap_or_else(|e| {
            tracing::warn!(workspace = %location, error = %e, "Ignoring malformed workspace file");
            Self::default()
        })
    }

    /// The original JSON object, including properties this crate ignores.
    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    /// The raw object with `folders` replaced by `folders`.
    pub fn with_folders(&self, location: &Resource, folders: &[WorkspaceFolder]) -> Value {
        let mut raw = self.raw.clone();
        let entries = folders
            .iter()
            .map(|folder| folder_entry(location, folder))
            .collect();
        raw.insert("folders".to_string(), Value::Array(entries));
        Value::Object(raw)
    }
}

fn parse_folder_entry(location: &Resource, entry: &Value) -> Option<WorkspaceFolder> {
    let name = entry
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string);
    let uri = if let Some(path) = entry.get("path").and_then(Value::as_str) {
        resolve_folder_path(location, path)?
    } else {
        Resource::parse(entry.get("uri").and_then(Value::as_str)?).ok()?
    };
    Some(WorkspaceFolder::new(uri, name, 0))
}

fn resolve_folder_path(location: &Resource, path: &str) -> Option<Resource> {
    let bytes = path.as_bytes();
    let is_drive_path = bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':';
    if is_drive_path && location.scheme() == "file" {
        return Resource::from_file_path(path).ok();
    }
    let normalized = path.replace('\\', "/");
    let trimmed = normalized.trim_end_matches('/');
    let reference = if trimmed.is_empty() { "." } else { trimmed };
    let resolved = location.resolve(reference).ok()?;
    // Url resolution keeps a trailing slash for "." and ".."; folders never
    // carry one.
    match resolved.as_str().strip_suffix('/') {
        Some(stripped) if resolved.path() != "/" => Resource::parse(stripped).ok(),
        _ => Some(resolved),
    }
}

fn folder_entry(location: &Resource, folder: &WorkspaceFolder) -> Value {
    let mut entry = Map::new();
    let relative = location
        .parent()
        .and_then(|dir| dir.relative_path_to(&folder.uri));
    match relative {
        Some(path) => {
            entry.insert("path".to_string(), Value::String(path));
        }
        None => match folder.uri.to_file_path() {
            Some(path) if location.scheme() == "file" => {
                entry.insert(
                    "path".to_string(),
                    Value::String(path.display().to_string()),
                );
            }
            _ => {
                entry.insert("uri".to_string(), Value::String(folder.uri.to_string()));
            }
        },
    }
    if folder.name != super::default_folder_name(&folder.uri) {
        entry.insert("name".to_string(), Value::String(folder.name.clone()));
    }
    Value::Object(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn location() -> Resource {
        Resource::parse("file:///work/team.code-workspace").unwrap()
    }

    #[test]
    fn resolves_folder_entries() {
        let definition = WorkspaceDefinition::parse(
            &location(),
            r#"{
                // folders
                "folders": [
                    { "path": "app" },
                    { "path": "../shared", "name": "Shared" },
                    { "path": "." },
                    { "uri": "memory:///scratch" },
                ],
                "settings": { "editor.tabSize": 2 },
            }"#,
            ResourceIdentity::CaseSensitive,
        )
        .unwrap();

        let uris: Vec<String> = definition.folders.iter().map(|f| f.uri.to_string()).collect();
        assert_eq!(
            uris,
            [
                "file:///work/app",
                "file:///shared",
                "file:///work",
                "memory:///scratch"
            ]
        );
        assert_eq!(definition.folders[1].name, "Shared");
        assert_eq!(definition.folders[3].index, 3);
        assert_eq!(definition.settings, json!({"editor.tabSize": 2}));
    }

    #[test]
    fn duplicate_folders_are_dropped() {
        let definition = WorkspaceDefinition::parse(
            &location(),
            r#"{ "folders": [{ "path": "app" }, { "path": "./app/" }, { "path": "b" }] }"#,
            ResourceIdentity::CaseSensitive,
        )
        .unwrap();
        assert_eq!(definition.folders.len(), 2);
        assert_eq!(definition.folders[1].index, 1);
    }

    #[test]
    fn malformed_file_is_lenient_empty() {
        let definition = WorkspaceDefinition::parse_lenient(
            &location(),
            "{ folders: [",
            ResourceIdentity::CaseSensitive,
        );
        assert!(definition.folders.is_empty());
        assert!(WorkspaceDefinition::parse(&location(), "[]", ResourceIdentity::CaseSensitive).is_err());
    }

    #[test]
    fn rewrite_keeps_unknown_properties() {
        let definition = WorkspaceDefinition::parse(
            &location(),
            r#"{ "folders": [], "extensions": { "recommendations": ["a"] } }"#,
            ResourceIdentity::CaseSensitive,
        )
        .unwrap();
        let folders = vec![
            WorkspaceFolder::new(Resource::parse("file:///work/app").unwrap(), None, 0),
            WorkspaceFolder::new(
                Resource::parse("memory:///scratch").unwrap(),
                Some("Scratch".into()),
                1,
            ),
        ];

        let value = definition.with_folders(&location(), &folders);

        assert_eq!(
            value,
            json!({
                "folders": [
                    { "path": "app" },
                    { "uri": "memory:///scratch", "name": "Scratch" }
                ],
                "extensions": { "recommendations": ["a"] }
            })
        );
    }
}
