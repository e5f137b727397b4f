//! Read-only commands: get, inspect, keys

use colored::Colorize;
use serde_json::Value;
use wsconf_core::{ConfigurationKeys, InspectValue};

use crate::cli::ScopeArgs;
use crate::context::Context;
use crate::error::Result;

/// Print the effective value as JSON.
pub fn run_get(context: &Context, key: &str, scope: &ScopeArgs) -> Result<()> {
    let overrides = context.overrides(scope)?;
    match context.service.get_value(key, &overrides) {
        Some(value) => println!("{}", serde_json::to_string_pretty(&value)?),
        None => eprintln!("{} {} is not set", "note:".yellow(), key),
    }
    Ok(())
}

pub fn run_inspect(context: &Context, key: &str, scope: &ScopeArgs, json: bool) -> Result<()> {
    let overrides = context.overrides(scope)?;
    let inspect = context.service.inspect(key, &overrides);
    if json {
        println!("{}", serde_json::to_string_pretty(&inspect)?);
    } else {
        print!("{}", render_inspect(&inspect));
    }
    Ok(())
}

pub fn run_keys(context: &Context, json: bool) -> Result<()> {
    let keys = context.service.keys();
    if json {
        println!("{}", serde_json::to_string_pretty(&keys)?);
    } else {
        print!("{}", render_keys(&keys));
    }
    Ok(())
}

fn show(value: Option<&Value>) -> String {
    match value {
        Some(value) => value.to_string(),
        None => "-".dimmed().to_string(),
    }
}

pub fn render_inspect(inspect: &InspectValue) -> String {
    let rows = [
        ("default", inspect.default_value.as_ref()),
        ("user (local)", inspect.user_local_value.as_ref()),
        ("user (remote)", inspect.user_remote_value.as_ref()),
        ("workspace", inspect.workspace_value.as_ref()),
        ("workspace folder", inspect.workspace_folder_value.as_ref()),
        ("memory", inspect.memory_value.as_ref()),
    ];

    let mut out = format!("{}\n\n", inspect.key.bold());
    for (label, value) in rows {
        out.push_str(&format!("  {:<18} {}\n", format!("{label}:").dimmed(), show(value)));
    }
    out.push_str(&format!(
        "\n  {:<18} {}\n",
        "value:".green().bold(),
        show(inspect.value.as_ref())
    ));
    if !inspect.override_identifiers.is_empty() {
        out.push_str(&format!(
            "  {:<18} {}\n",
            "overrides:".dimmed(),
            inspect.override_identifiers.join(", ")
        ));
    }
    out
}

pub fn render_keys(keys: &ConfigurationKeys) -> String {
    let sections = [
        ("Default", &keys.default),
        ("User", &keys.user),
        ("Workspace", &keys.workspace),
        ("Workspace folders", &keys.workspace_folder),
    ];

    let mut out = String::new();
    for (title, list) in sections {
        out.push_str(&format!("{}:\n", title.bold()));
        if list.is_empty() {
            out.push_str(&format!("  {}\n", "(none)".dimmed()));
        }
        for key in list {
            out.push_str(&format!("  {} {}\n", "+".green(), key));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn inspect_shows_every_source() {
        colored::control::set_override(false);
        let inspect = InspectValue {
            key: "editor.tabSize".into(),
            default_value: Some(json!(4)),
            user_value: Some(json!(2)),
            user_local_value: Some(json!(2)),
            workspace_value: Some(json!(8)),
            value: Some(json!(8)),
            ..InspectValue::default()
        };

        let rendered = render_inspect(&inspect);

        assert!(rendered.starts_with("editor.tabSize\n"));
        assert!(rendered.contains("default:           4"));
        assert!(rendered.contains("user (remote):     -"));
        assert!(rendered.contains("value:             8"));
        assert!(!rendered.contains("overrides:"));
    }

    #[test]
    fn keys_lists_sections() {
        colored::control::set_override(false);
        let keys = ConfigurationKeys {
            default: vec!["launch".into()],
            user: vec!["editor.tabSize".into()],
            ..ConfigurationKeys::default()
        };

        assert_eq!(
            render_keys(&keys),
            "Default:\n  + launch\nUser:\n  + editor.tabSize\nWorkspace:\n  (none)\nWorkspace folders:\n  (none)\n"
        );
    }
}
