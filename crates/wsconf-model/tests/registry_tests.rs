//! Integration tests for the configuration registry

use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use serde_json::json;
use wsconf_model::{ConfigurationRegistry, ConfigurationScope, PropertySchema};

#[test]
fn test_register_schema_json() {
    let registry = ConfigurationRegistry::new();
    registry
        .register_schema_json(
            r#"{
                // editor settings
                "editor.fontSize": { "scope": "language-overridable", "default": 14 },
                "telemetry.enabled": { "scope": "application", "default": true },
                "terminal.shell": { "scope": "machine" },
                "[rust]": { "editor.fontSize": 12 },
            }"#,
        )
        .unwrap();

    let snapshot = registry.snapshot();
    assert_eq!(
        snapshot.scope_of("editor.fontSize"),
        Some(ConfigurationScope::LanguageOverridable)
    );
    assert_eq!(
        snapshot.scope_of("telemetry.enabled"),
        Some(ConfigurationScope::Application)
    );
    assert_eq!(snapshot.property("terminal.shell").unwrap().default, None);
    assert_eq!(
        snapshot
            .default_model()
            .get_value_with_override("editor.fontSize", Some("rust")),
        Some(json!(12))
    );
}

#[test]
fn test_schema_without_scope_defaults_to_window() {
    let registry = ConfigurationRegistry::new();
    registry
        .register_schema_json(r#"{ "files.autoSave": { "default": "off" } }"#)
        .unwrap();
    assert_eq!(
        registry.snapshot().scope_of("files.autoSave"),
        Some(ConfigurationScope::Window)
    );
}

#[test]
fn test_malformed_schema_is_an_error() {
    let registry = ConfigurationRegistry::new();
    assert!(registry.register_schema_json("{ nope").is_err());
    assert!(registry
        .register_schema_json(r#"{ "a": { "scope": "galaxy" } }"#)
        .is_err());
    assert!(registry.register_schema_json(r#"{ "[rust]": 1 }"#).is_err());
}

#[test]
fn test_snapshots_are_immutable() {
    let registry = ConfigurationRegistry::new();
    registry
        .register_property("a", PropertySchema::new(ConfigurationScope::Resource))
        .unwrap();
    let before = registry.snapshot();

    registry
        .register_property("a", PropertySchema::new(ConfigurationScope::Application))
        .unwrap();

    assert_eq!(before.scope_of("a"), Some(ConfigurationScope::Resource));
    assert_eq!(
        registry.snapshot().scope_of("a"),
        Some(ConfigurationScope::Application)
    );
}

#[test]
fn test_listener_sees_new_snapshot() {
    let registry = Arc::new(ConfigurationRegistry::new());
    let observed = Arc::new(Mutex::new(None));
    let _subscription = {
        let inner = Arc::clone(&registry);
        let observed = Arc::clone(&observed);
        registry.on_did_update(move |change| {
            *observed.lock().unwrap() =
                Some((change.snapshot.version(), inner.snapshot().version()));
        })
    };

    registry
        .register_property("a", PropertySchema::default())
        .unwrap();

    assert_eq!(*observed.lock().unwrap(), Some((1, 1)));
}

#[test]
fn test_deregister() {
    let registry = ConfigurationRegistry::with_builtins();
    registry.deregister_properties(&["launch"]);
    let snapshot = registry.snapshot();
    assert!(!snapshot.is_registered("launch"));
    assert!(snapshot.is_registered("tasks"));
    assert_eq!(snapshot.default_model().get_value("launch"), None);
}
