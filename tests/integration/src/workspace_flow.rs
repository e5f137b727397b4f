//! End-to-end flow over a real directory: open a multi-root workspace,
//! resolve values, write to every kind of target, and edit folders.

use pretty_assertions::assert_eq;
use serde_json::json;
use wsconf_core::{
    ConfigurationOverrides, EditingErrorCode, FolderToAdd, UpdateOptions, WorkbenchState,
    WorkspaceInitialization,
};
use wsconf_model::ConfigurationTarget;
use wsconf_test_utils::{Recorder, TempWorkspace};

fn setup() -> TempWorkspace {
    let workspace = TempWorkspace::new();
    workspace
        .write(
            "user/settings.json",
            r#"{
                // personal defaults
                "editor.tabSize": 2,
                "app.telemetry": false,
            }"#,
        )
        .write(
            "team.code-workspace",
            r#"{
                "folders": [
                    { "path": "frontend" },
                    { "path": "backend", "name": "API" },
                ],
                "settings": { "editor.tabSize": 3, "app.telemetry": true },
                "extensions": { "recommendations": ["rust-lang.rust-analyzer"] },
            }"#,
        )
        .write("frontend/.vscode/settings.json", r#"{ "editor.tabSize": 4 }"#)
        .write(
            "backend/.vscode/tasks.json",
            r#"{ "version": "2.0.0", "tasks": [{ "label": "build" }] }"#,
        );
    workspace
}

async fn open(workspace: &TempWorkspace) -> wsconf_core::WorkspaceConfigurationService {
    let service = workspace.service(false);
    service
        .initialize(WorkspaceInitialization::Workspace {
            id: "team".into(),
            config_path: workspace.resource("team.code-workspace"),
        })
        .await
        .unwrap();
    service
}

#[tokio::test]
async fn multi_root_workspace_resolves_from_disk() {
    let workspace = setup();
    let service = open(&workspace).await;

    assert_eq!(service.workbench_state(), WorkbenchState::Workspace);
    assert_eq!(service.workspace().name(), "team");
    let names: Vec<String> = service
        .workspace()
        .folders()
        .iter()
        .map(|folder| folder.name.clone())
        .collect();
    assert_eq!(names, ["frontend", "API"]);

    let frontend = ConfigurationOverrides::for_resource(workspace.resource("frontend/src/app.ts"));
    let backend = ConfigurationOverrides::for_resource(workspace.resource("backend/src/main.rs"));
    assert_eq!(service.get_value("editor.tabSize", &frontend), Some(json!(4)));
    assert_eq!(service.get_value("editor.tabSize", &backend), Some(json!(3)));
    assert_eq!(service.get_value("app.telemetry", &backend), Some(json!(false)));
    assert_eq!(
        service.get_value("tasks.tasks", &backend),
        Some(json!([{ "label": "build" }]))
    );
}

#[tokio::test]
async fn writes_land_in_the_right_files() {
    let workspace = setup();
    let service = open(&workspace).await;
    let recorder = Recorder::configuration(&service);
    let backend = ConfigurationOverrides::for_resource(workspace.resource("backend"));

    service
        .update_value("files.exclude", Some(json!({"target": true})), &backend, None, UpdateOptions::default())
        .await
        .unwrap();
    workspace.assert_file_contains("backend/.vscode/settings.json", "\"target\": true");

    service
        .update_value(
            "window.zoom",
            Some(json!(1)),
            &backend,
            Some(ConfigurationTarget::Workspace),
            UpdateOptions::default(),
        )
        .await
        .unwrap();
    let definition = workspace.read_json("team.code-workspace");
    assert_eq!(definition["settings"]["window.zoom"], json!(1));
    // Properties this crate does not know survive the rewrite.
    assert_eq!(
        definition["extensions"],
        json!({ "recommendations": ["rust-lang.rust-analyzer"] })
    );

    service
        .update_value(
            "tasks.version",
            Some(json!("2.1.0")),
            &backend,
            Some(ConfigurationTarget::WorkspaceFolder),
            UpdateOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(
        workspace.read_json("backend/.vscode/tasks.json")["version"],
        json!("2.1.0")
    );

    assert_eq!(recorder.len(), 3);
    let sources: Vec<ConfigurationTarget> = recorder.events().iter().map(|e| e.source).collect();
    assert_eq!(
        sources,
        [
            ConfigurationTarget::WorkspaceFolder,
            ConfigurationTarget::Workspace,
            ConfigurationTarget::WorkspaceFolder,
        ]
    );
}

#[tokio::test]
async fn rejected_write_leaves_files_untouched() {
    let workspace = setup();
    let service = open(&workspace).await;
    let before = workspace.read("team.code-workspace");

    let err = service
        .update_value(
            "machine.shell",
            Some(json!("zsh")),
            &ConfigurationOverrides::none(),
            Some(ConfigurationTarget::Workspace),
            UpdateOptions::quiet(),
        )
        .await
        .unwrap_err();

    assert_eq!(
        err.editing_code(),
        Some(EditingErrorCode::InvalidWorkspaceConfigurationMachine)
    );
    assert_eq!(workspace.read("team.code-workspace"), before);
}

#[tokio::test]
async fn folder_edits_rewrite_the_definition() {
    let workspace = setup();
    workspace.write("shared/.vscode/settings.json", r#"{ "editor.tabSize": 6 }"#);
    let service = open(&workspace).await;
    let folders = Recorder::folders(&service);

    service
        .add_folders(vec![FolderToAdd::new(workspace.resource("shared"))], Some(0))
        .await
        .unwrap();

    let definition = workspace.read_json("team.code-workspace");
    assert_eq!(
        definition["folders"],
        json!([
            { "path": "shared" },
            { "path": "frontend" },
            { "path": "backend", "name": "API" },
        ])
    );
    let shared = ConfigurationOverrides::for_resource(workspace.resource("shared/x"));
    assert_eq!(service.get_value("editor.tabSize", &shared), Some(json!(6)));

    let events = folders.events();
    let event = &events[0];
    assert_eq!(event.added.len(), 1);
    assert_eq!(event.changed.len(), 2);

    service
        .remove_folders(&[workspace.resource("frontend")])
        .await
        .unwrap();
    assert_eq!(service.workspace().folders().len(), 2);
    workspace.assert_file_contains("team.code-workspace", "\"API\"");
}

#[tokio::test]
async fn single_folder_writes_go_to_its_settings() {
    let workspace = setup();
    let service = workspace.service(false);
    service
        .initialize(WorkspaceInitialization::Folder {
            id: "frontend".into(),
            folder: workspace.resource("frontend"),
        })
        .await
        .unwrap();

    service
        .update_value(
            "editor.tabSize",
            Some(json!(8)),
            &ConfigurationOverrides::none(),
            Some(ConfigurationTarget::Workspace),
            UpdateOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(
        workspace.read_json("frontend/.vscode/settings.json"),
        json!({ "editor.tabSize": 8 })
    );
    assert_eq!(
        service.get_value("editor.tabSize", &ConfigurationOverrides::none()),
        Some(json!(8))
    );
}
