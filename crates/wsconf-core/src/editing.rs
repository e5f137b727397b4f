//! Update router
//!
//! Decides which source a write goes to, validates it against the key's
//! scope before anything is written, and edits settings file content.

use std::fmt;

use serde_json::{Map, Value};
use wsconf_model::{ConfigurationScope, ConfigurationTarget, parse_jsonc};

use crate::configuration::{Configuration, ConfigurationOverrides};
use crate::workspace::WorkbenchState;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditingErrorCode {
    /// Application scoped key written to a workspace or folder target
    InvalidWorkspaceConfigurationApplication,
    /// Machine scoped key written to a workspace or folder target
    InvalidWorkspaceConfigurationMachine,
    /// The default target cannot be written
    InvalidTarget,
    NoWorkspaceOpened,
    /// Folder target without a resource inside a workspace folder
    InvalidFolderTarget,
    /// Remote user target before a remote settings file is known
    RemoteNotResolved,
    /// Override identifier on a key that is not language overridable
    InvalidResourceLanguageConfiguration,
    /// The target file exists but cannot be parsed
    InvalidConfiguration,
    /// Folder APIs need a multi-root workspace
    NotWorkspaceState,
}

impl EditingErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidWorkspaceConfigurationApplication => {
                "ERROR_INVALID_WORKSPACE_CONFIGURATION_APPLICATION"
            }
            Self::InvalidWorkspaceConfigurationMachine => "ERROR_INVALID_WORKSPACE_CONFIGURATION_MACHINE",
            Self::InvalidTarget => "ERROR_INVALID_TARGET",
            Self::NoWorkspaceOpened => "ERROR_NO_WORKSPACE_OPENED",
            Self::InvalidFolderTarget => "ERROR_INVALID_FOLDER_TARGET",
            Self::RemoteNotResolved => "ERROR_REMOTE_NOT_RESOLVED",
            Self::InvalidResourceLanguageConfiguration => {
                "ERROR_INVALID_RESOURCE_LANGUAGE_CONFIGURATION"
            }
            Self::InvalidConfiguration => "ERROR_INVALID_CONFIGURATION",
            Self::NotWorkspaceState => "ERROR_NOT_WORKSPACE_STATE",
        }
    }
}

impl fmt::Display for EditingErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for a single update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Log failures at debug level instead of warning
    pub donot_notify_error: bool,
}

impl UpdateOptions {
    pub fn quiet() -> Self {
        Self {
            donot_notify_error: true,
        }
    }
}

/// What the router knows about the service when routing a write.
#[derive(Debug, Clone, Copy)]
pub struct RoutingContext<'a> {
    pub configuration: &'a Configuration,
    pub state: WorkbenchState,
    /// A remote settings file is known
    pub remote_active: bool,
}

/// The concrete targets an update writes to, in write order.
///
/// Without an explicit target, removing a value (`value == None`) targets
/// every source currently holding one; setting a value targets the owning
/// folder when the key is folder scoped and a multi-root workspace is open,
/// and the user otherwise.
pub fn resolve_targets(
    context: &RoutingContext<'_>,
    key: &str,
    value: Option<&Value>,
    overrides: &ConfigurationOverrides,
    target: Option<ConfigurationTarget>,
) -> Result<Vec<ConfigurationTarget>> {
    let registry = context.configuration.registry();
    let scope = registry.scope_of(key);

    if overrides.override_identifier.is_some()
        && scope.is_some_and(|scope| scope != ConfigurationScope::LanguageOverridable)
    {
        return Err(Error::editing(
            EditingErrorCode::InvalidResourceLanguageConfiguration,
            format!("{key} cannot be set for a language"),
        ));
    }

    let targets = match (target, value) {
        (Some(target), _) => vec![target],
        (None, None) => targets_holding_value(context, key, overrides),
        (None, Some(_)) => {
            let folder_eligible = scope.is_none_or(ConfigurationScope::is_folder_readable);
            let in_folder = overrides
                .resource
                .as_ref()
                .is_some_and(|resource| context.configuration.folder_for(resource).is_some());
            if folder_eligible && in_folder && context.state == WorkbenchState::Workspace {
                vec![ConfigurationTarget::WorkspaceFolder]
            } else {
                vec![ConfigurationTarget::User]
            }
        }
    };

    let mut resolved = Vec::with_capacity(targets.len());
    for target in targets {
        let target = normalize_user_target(target, scope, context.remote_active);
        validate(context, key, scope, target, overrides)?;
        if !resolved.contains(&target) {
            resolved.push(target);
        }
    }
    Ok(resolved)
}

/// `User` becomes `UserRemote` for machine keys while a remote is active,
/// `UserLocal` otherwise.
pub fn normalize_user_target(
    target: ConfigurationTarget,
    scope: Option<ConfigurationScope>,
    remote_active: bool,
) -> ConfigurationTarget {
    if target != ConfigurationTarget::User {
        return target;
    }
    let machine = matches!(
        scope,
        Some(ConfigurationScope::Machine | ConfigurationScope::MachineOverridable)
    );
    if remote_active && machine {
        ConfigurationTarget::UserRemote
    } else {
        ConfigurationTarget::UserLocal
    }
}

fn targets_holding_value(
    context: &RoutingContext<'_>,
    key: &str,
    overrides: &ConfigurationOverrides,
) -> Vec<ConfigurationTarget> {
    let inspect = context.configuration.inspect(key, overrides);
    let mut targets = Vec::new();
    if inspect.memory_value.is_some() {
        targets.push(ConfigurationTarget::Memory);
    }
    if inspect.workspace_folder_value.is_some() && context.state == WorkbenchState::Workspace {
        targets.push(ConfigurationTarget::WorkspaceFolder);
    }
    if inspect.workspace_value.is_some() {
        targets.push(ConfigurationTarget::Workspace);
    }
    if inspect.user_remote_value.is_some() {
        targets.push(ConfigurationTarget::UserRemote);
    }
    if inspect.user_local_value.is_some() {
        targets.push(ConfigurationTarget::UserLocal);
    }
    targets
}

fn validate(
    context: &RoutingContext<'_>,
    key: &str,
    scope: Option<ConfigurationScope>,
    target: ConfigurationTarget,
    overrides: &ConfigurationOverrides,
) -> Result<()> {
    match target {
        ConfigurationTarget::Default => {
            return Err(Error::editing(
                EditingErrorCode::InvalidTarget,
                "default values cannot be written",
            ));
        }
        ConfigurationTarget::UserRemote if !context.remote_active => {
            return Err(Error::editing(
                EditingErrorCode::RemoteNotResolved,
                "no remote settings are available",
            ));
        }
        _ => {}
    }

    if target.is_workspace_level() {
        match scope {
            Some(ConfigurationScope::Application) => {
                return Err(Error::editing(
                    EditingErrorCode::InvalidWorkspaceConfigurationApplication,
                    format!("{key} is an application setting and can only be written to user settings"),
                ));
            }
            Some(ConfigurationScope::Machine) => {
                return Err(Error::editing(
                    EditingErrorCode::InvalidWorkspaceConfigurationMachine,
                    format!("{key} is a machine setting and can only be written to user settings"),
                ));
            }
            _ => {}
        }
        if context.state == WorkbenchState::Empty {
            return Err(Error::editing(
                EditingErrorCode::NoWorkspaceOpened,
                format!("cannot write {key} to {target} settings without an open workspace"),
            ));
        }
    }

    if target == ConfigurationTarget::WorkspaceFolder {
        let owned = overrides
            .resource
            .as_ref()
            .is_some_and(|resource| context.configuration.folder_for(resource).is_some());
        if !owned {
            return Err(Error::editing(
                EditingErrorCode::InvalidFolderTarget,
                format!("cannot write {key} to folder settings without a resource in a workspace folder"),
            ));
        }
    }
    Ok(())
}

/// Where a value sits inside a settings document.
///
/// Settings files hold flat dotted keys (`"editor.tabSize"`), so the path is
/// usually one segment, optionally inside a `[id]` section or a wrapping
/// property such as `settings` in a workspace file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath(pub Vec<String>);

impl JsonPath {
    /// Path of `key` in a settings document, below `prefix`.
    pub fn for_setting(prefix: &[&str], key: &str, override_identifier: Option<&str>) -> Self {
        let mut segments: Vec<String> = prefix.iter().map(|s| s.to_string()).collect();
        if let Some(identifier) = override_identifier {
            segments.push(format!("[{identifier}]"));
        }
        segments.push(key.to_string());
        Self(segments)
    }

    /// Path of a key nested as real objects (`launch.configurations`).
    pub fn nested(prefix: &[&str], key: &str) -> Self {
        let mut segments: Vec<String> = prefix.iter().map(|s| s.to_string()).collect();
        segments.extend(key.split('.').filter(|s| !s.is_empty()).map(str::to_string));
        Self(segments)
    }
}

/// Set or remove `path` in JSONC `content`, returning the new document.
///
/// `None` content means the file does not exist. Returns `Ok(None)` when the
/// document becomes empty and the file should be deleted. Comments are not
/// preserved.
pub fn edit_document(
    name: &str,
    content: Option<&str>,
    path: &JsonPath,
    value: Option<Value>,
) -> Result<Option<String>> {
    let mut root = match content {
        None => Value::Object(Map::new()),
        Some(content) => match parse_jsonc(name, content) {
            Ok(value @ Value::Object(_)) => value,
            Ok(_) | Err(_) => {
                return Err(Error::editing(
                    EditingErrorCode::InvalidConfiguration,
                    format!("{name} is not a valid settings file; fix it before writing"),
                ));
            }
        },
    };

    match value {
        Some(value) => set_path(&mut root, &path.0, value),
        None => {
            remove_path(&mut root, &path.0);
            // A flat key may also have been written as nested objects.
            if let Some((last, prefix)) = path.0.split_last() {
                let mut nested = prefix.to_vec();
                nested.extend(last.split('.').map(str::to_string));
                if nested.len() > path.0.len() {
                    remove_path(&mut root, &nested);
                }
            }
        }
    }

    if root.as_object().is_some_and(Map::is_empty) && content.is_none() {
        return Ok(None);
    }
    let mut text = serde_json::to_string_pretty(&root)?;
    text.push('\n');
    Ok(Some(text))
}

fn set_path(root: &mut Value, path: &[String], value: Value) {
    let Some((first, rest)) = path.split_first() else {
        *root = value;
        return;
    };
    if !root.is_object() {
        *root = Value::Object(Map::new());
    }
    if let Value::Object(map) = root {
        let child = map
            .entry(first.clone())
            .or_insert_with(|| Value::Object(Map::new()));
        set_path(child, rest, value);
    }
}

/// Remove `path`, pruning objects emptied by the removal (never the root).
fn remove_path(root: &mut Value, path: &[String]) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    let Value::Object(map) = root else {
        return;
    };
    if rest.is_empty() {
        map.remove(first);
        return;
    }
    if let Some(child) = map.get_mut(first) {
        remove_path(child, rest);
        if child.as_object().is_some_and(Map::is_empty) {
            map.remove(first);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;
    use wsconf_fs::{Resource, ResourceIdentity};
    use wsconf_model::{
        ConfigurationModel, ConfigurationModelParser, ConfigurationRegistry, PropertySchema,
    };

    use crate::workspace::WorkspaceFolder;

    fn configuration() -> Configuration {
        let registry = ConfigurationRegistry::new();
        registry
            .register_properties([
                ("app.key", PropertySchema::new(ConfigurationScope::Application)),
                ("machine.key", PropertySchema::new(ConfigurationScope::Machine)),
                ("overridable.key", PropertySchema::new(ConfigurationScope::MachineOverridable)),
                ("resource.key", PropertySchema::new(ConfigurationScope::Resource)),
                ("window.key", PropertySchema::new(ConfigurationScope::Window)),
                ("language.key", PropertySchema::new(ConfigurationScope::LanguageOverridable)),
            ])
            .unwrap();
        Configuration::new(registry.snapshot(), ResourceIdentity::CaseSensitive).with_folder(
            WorkspaceFolder::new(Resource::parse("file:///w/a").unwrap(), None, 0),
            ConfigurationModel::empty(),
        )
    }

    fn context(configuration: &Configuration, state: WorkbenchState, remote: bool) -> RoutingContext<'_> {
        RoutingContext {
            configuration,
            state,
            remote_active: remote,
        }
    }

    fn in_folder() -> ConfigurationOverrides {
        ConfigurationOverrides::for_resource(Resource::parse("file:///w/a/src/main.rs").unwrap())
    }

    #[rstest]
    #[case("app.key", ConfigurationTarget::Workspace, EditingErrorCode::InvalidWorkspaceConfigurationApplication)]
    #[case("app.key", ConfigurationTarget::WorkspaceFolder, EditingErrorCode::InvalidWorkspaceConfigurationApplication)]
    #[case("machine.key", ConfigurationTarget::Workspace, EditingErrorCode::InvalidWorkspaceConfigurationMachine)]
    #[case("machine.key", ConfigurationTarget::WorkspaceFolder, EditingErrorCode::InvalidWorkspaceConfigurationMachine)]
    #[case("window.key", ConfigurationTarget::Default, EditingErrorCode::InvalidTarget)]
    #[case("machine.key", ConfigurationTarget::UserRemote, EditingErrorCode::RemoteNotResolved)]
    fn rejected_writes(
        #[case] key: &str,
        #[case] target: ConfigurationTarget,
        #[case] expected: EditingErrorCode,
    ) {
        let configuration = configuration();
        let ctx = context(&configuration, WorkbenchState::Workspace, false);
        let err = resolve_targets(&ctx, key, Some(&json!(1)), &in_folder(), Some(target)).unwrap_err();
        assert_eq!(err.editing_code(), Some(expected));
    }

    #[rstest]
    #[case(ConfigurationTarget::Workspace)]
    #[case(ConfigurationTarget::WorkspaceFolder)]
    fn machine_overridable_is_writable_at_workspace_level(#[case] target: ConfigurationTarget) {
        let configuration = configuration();
        let ctx = context(&configuration, WorkbenchState::Workspace, false);
        let targets =
            resolve_targets(&ctx, "overridable.key", Some(&json!(1)), &in_folder(), Some(target)).unwrap();
        assert_eq!(targets, [target]);
    }

    #[rstest]
    #[case("resource.key", WorkbenchState::Workspace, true, ConfigurationTarget::WorkspaceFolder)]
    #[case("window.key", WorkbenchState::Workspace, true, ConfigurationTarget::WorkspaceFolder)]
    #[case("app.key", WorkbenchState::Workspace, true, ConfigurationTarget::UserLocal)]
    #[case("resource.key", WorkbenchState::Folder, true, ConfigurationTarget::UserLocal)]
    #[case("resource.key", WorkbenchState::Workspace, false, ConfigurationTarget::UserLocal)]
    fn inferred_target(
        #[case] key: &str,
        #[case] state: WorkbenchState,
        #[case] with_resource: bool,
        #[case] expected: ConfigurationTarget,
    ) {
        let configuration = configuration();
        let ctx = context(&configuration, state, false);
        let overrides = if with_resource { in_folder() } else { ConfigurationOverrides::none() };
        let targets = resolve_targets(&ctx, key, Some(&json!(1)), &overrides, None).unwrap();
        assert_eq!(targets, [expected]);
    }

    #[rstest]
    #[case("machine.key", true, ConfigurationTarget::UserRemote)]
    #[case("overridable.key", true, ConfigurationTarget::UserRemote)]
    #[case("window.key", true, ConfigurationTarget::UserLocal)]
    #[case("machine.key", false, ConfigurationTarget::UserLocal)]
    fn user_target_routing(#[case] key: &str, #[case] remote: bool, #[case] expected: ConfigurationTarget) {
        let configuration = configuration();
        let ctx = context(&configuration, WorkbenchState::Empty, remote);
        let targets = resolve_targets(
            &ctx,
            key,
            Some(&json!(1)),
            &ConfigurationOverrides::none(),
            Some(ConfigurationTarget::User),
        )
        .unwrap();
        assert_eq!(targets, [expected]);
    }

    #[test]
    fn removal_targets_every_holder() {
        let parser = ConfigurationModelParser::new("test");
        let configuration = configuration()
            .with_user_local(parser.parse_value(&json!({"resource.key": 1})))
            .with_workspace(parser.parse_value(&json!({"resource.key": 2, "app.key": 3})))
            .with_memory(parser.parse_value(&json!({"resource.key": 4})));
        let ctx = context(&configuration, WorkbenchState::Workspace, false);

        let targets = resolve_targets(&ctx, "resource.key", None, &in_folder(), None).unwrap();
        assert_eq!(
            targets,
            [
                ConfigurationTarget::Memory,
                ConfigurationTarget::Workspace,
                ConfigurationTarget::UserLocal
            ]
        );

        // The gated workspace value of an application key is not a holder.
        let targets = resolve_targets(&ctx, "app.key", None, &in_folder(), None).unwrap();
        assert!(targets.is_empty());
    }

    #[test]
    fn workspace_target_needs_a_workspace() {
        let configuration = configuration();
        let ctx = context(&configuration, WorkbenchState::Empty, false);
        let err = resolve_targets(
            &ctx,
            "resource.key",
            Some(&json!(1)),
            &ConfigurationOverrides::none(),
            Some(ConfigurationTarget::Workspace),
        )
        .unwrap_err();
        assert_eq!(err.editing_code(), Some(EditingErrorCode::NoWorkspaceOpened));
    }

    #[test]
    fn folder_target_needs_owned_resource() {
        let configuration = configuration();
        let ctx = context(&configuration, WorkbenchState::Workspace, false);
        let outside =
            ConfigurationOverrides::for_resource(Resource::parse("file:///elsewhere/x").unwrap());
        let err = resolve_targets(
            &ctx,
            "resource.key",
            Some(&json!(1)),
            &outside,
            Some(ConfigurationTarget::WorkspaceFolder),
        )
        .unwrap_err();
        assert_eq!(err.editing_code(), Some(EditingErrorCode::InvalidFolderTarget));
    }

    #[test]
    fn language_override_needs_language_overridable_key() {
        let configuration = configuration();
        let ctx = context(&configuration, WorkbenchState::Empty, false);
        let rust = ConfigurationOverrides::for_language("rust");
        let err = resolve_targets(&ctx, "window.key", Some(&json!(1)), &rust, None).unwrap_err();
        assert_eq!(
            err.editing_code(),
            Some(EditingErrorCode::InvalidResourceLanguageConfiguration)
        );
        assert!(resolve_targets(&ctx, "language.key", Some(&json!(1)), &rust, None).is_ok());
    }

    #[test]
    fn edit_creates_and_removes() {
        let path = JsonPath::for_setting(&[], "editor.tabSize", None);
        let created = edit_document("settings", None, &path, Some(json!(2))).unwrap().unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&created).unwrap(),
            json!({"editor.tabSize": 2})
        );

        let removed = edit_document("settings", Some(&created), &path, None).unwrap().unwrap();
        assert_eq!(serde_json::from_str::<Value>(&removed).unwrap(), json!({}));
    }

    #[test]
    fn edit_inside_override_and_prefix() {
        let path = JsonPath::for_setting(&["settings"], "editor.tabSize", Some("rust"));
        let content = r#"{
            // keep me
            "folders": [],
            "settings": { "a": 1 },
        }"#;
        let edited = edit_document("workspace", Some(content), &path, Some(json!(2)))
            .unwrap()
            .unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&edited).unwrap(),
            json!({"folders": [], "settings": {"a": 1, "[rust]": {"editor.tabSize": 2}}})
        );
    }

    #[test]
    fn removal_also_clears_nested_form() {
        let path = JsonPath::for_setting(&[], "editor.tabSize", None);
        let content = r#"{ "editor": { "tabSize": 4, "fontSize": 12 } }"#;
        let edited = edit_document("settings", Some(content), &path, None).unwrap().unwrap();
        assert_eq!(
            serde_json::from_str::<Value>(&edited).unwrap(),
            json!({"editor": {"fontSize": 12}})
        );
    }

    #[test]
    fn malformed_target_is_refused() {
        let path = JsonPath::for_setting(&[], "a", None);
        let err = edit_document("settings", Some("{ broken"), &path, Some(json!(1))).unwrap_err();
        assert_eq!(err.editing_code(), Some(EditingErrorCode::InvalidConfiguration));
    }

    #[test]
    fn removing_from_missing_file_deletes_nothing() {
        let path = JsonPath::for_setting(&[], "a", None);
        assert_eq!(edit_document("settings", None, &path, None).unwrap(), None);
    }
}
