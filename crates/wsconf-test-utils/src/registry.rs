//! Standard test registry.

use std::sync::Arc;

use serde_json::json;
use wsconf_model::{ConfigurationRegistry, ConfigurationScope, PropertySchema};

/// Registry with the built-in keys plus one key per scope:
///
/// | key | scope | default |
/// |---|---|---|
/// | `app.telemetry` | application | `true` |
/// | `machine.shell` | machine | `"sh"` |
/// | `terminal.cwd` | machine-overridable | `""` |
/// | `files.exclude` | resource | `{}` |
/// | `editor.tabSize` | language-overridable | `4` |
/// | `editor.fontSize` | language-overridable | `14` |
/// | `window.zoom` | window | `0` |
pub fn standard_registry() -> Arc<ConfigurationRegistry> {
    let registry = ConfigurationRegistry::with_builtins();
    registry
        .register_properties([
            (
                "app.telemetry",
                PropertySchema::new(ConfigurationScope::Application).with_default(json!(true)),
            ),
            (
                "machine.shell",
                PropertySchema::new(ConfigurationScope::Machine).with_default(json!("sh")),
            ),
            (
                "terminal.cwd",
                PropertySchema::new(ConfigurationScope::MachineOverridable).with_default(json!("")),
            ),
            (
                "files.exclude",
                PropertySchema::new(ConfigurationScope::Resource).with_default(json!({})),
            ),
            (
                "editor.tabSize",
                PropertySchema::new(ConfigurationScope::LanguageOverridable).with_default(json!(4)),
            ),
            (
                "editor.fontSize",
                PropertySchema::new(ConfigurationScope::LanguageOverridable).with_default(json!(14)),
            ),
            (
                "window.zoom",
                PropertySchema::new(ConfigurationScope::Window).with_default(json!(0)),
            ),
        ])
        .unwrap_or_else(|e| panic!("standard_registry: invalid schema: {e}"));
    Arc::new(registry)
}
