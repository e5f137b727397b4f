//! Settings file parsing
//!
//! Settings files are JSON with comments and trailing commas, parsed with
//! `json5`. Top-level keys of the form `[id]` or `[a][b]` open language
//! override sections.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::model::ConfigurationModel;
use crate::{Error, Result};

static OVERRIDE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\[[^\[\]]+\])+$").expect("Invalid override key regex"));

static OVERRIDE_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\[\]]+)\]").expect("Invalid override identifier regex"));

/// `[rust]` or `[rust][toml]`.
pub fn is_override_key(key: &str) -> bool {
    OVERRIDE_KEY.is_match(key)
}

/// Identifiers named by an override key, in written order.
pub fn override_identifiers_from_key(key: &str) -> Vec<String> {
    OVERRIDE_IDENTIFIER
        .captures_iter(key)
        .filter_map(|captures| captures.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|id| !id.is_empty())
        .collect()
}

/// Override key for a single identifier.
pub fn override_key(identifier: &str) -> String {
    format!("[{identifier}]")
}

/// Parse JSONC text into a JSON value. Blank input is an empty object.
pub fn parse_jsonc(name: &str, content: &str) -> Result<Value> {
    if content.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    json5::from_str::<Value>(content).map_err(|e| Error::Parse {
        name: name.to_string(),
        message: e.to_string(),
    })
}

/// Turns settings content into a [`ConfigurationModel`].
#[derive(Debug, Clone)]
pub struct ConfigurationModelParser {
    name: String,
}

impl ConfigurationModelParser {
    /// `name` identifies the source in log messages and errors.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Parse, failing on malformed content.
    pub fn parse_strict(&self, content: &str) -> Result<ConfigurationModel> {
        let value = parse_jsonc(&self.name, content)?;
        match value {
            Value::Object(entries) => Ok(ConfigurationModel::from_entries(entries)),
            _ => Err(Error::NotAnObject {
                name: self.name.clone(),
            }),
        }
    }

    /// Parse, treating malformed content as an empty model.
    pub fn parse(&self, content: &str) -> ConfigurationModel {
        match self.parse_strict(content) {
            Ok(model) => model,
            Err(e) => {
                tracing::warn!(source = %self.name, error = %e, "Ignoring malformed settings");
                ConfigurationModel::empty()
            }
        }
    }

    /// Build a model from an already parsed value (e.g. the `settings`
    /// property of a workspace file).
    pub fn parse_value(&self, value: &Value) -> ConfigurationModel {
        match value {
            Value::Object(entries) => ConfigurationModel::from_entries(entries.clone()),
            Value::Null => ConfigurationModel::empty(),
            _ => {
                tracing::warn!(source = %self.name, "Ignoring settings that are not an object");
                ConfigurationModel::empty()
            }
        }
    }
}
