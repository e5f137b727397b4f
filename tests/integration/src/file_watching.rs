//! Settings files edited outside the service trigger a reload.

use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use wsconf_core::{ConfigurationOverrides, WorkspaceInitialization};
use wsconf_model::ConfigurationTarget;
use wsconf_test_utils::{Recorder, TempWorkspace};

/// Poll `condition` until it holds, panicking after five seconds. A plain
/// write may be observed in several steps, so the final state can trail
/// the first event.
async fn eventually(condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met within five seconds");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn folder_settings_change_is_picked_up() {
    let workspace = TempWorkspace::new();
    workspace
        .write("user/settings.json", "{}")
        .write("app/.vscode/settings.json", r#"{ "editor.tabSize": 2 }"#);
    let service = workspace.service(true);
    service
        .initialize(WorkspaceInitialization::Folder {
            id: "app".into(),
            folder: workspace.resource("app"),
        })
        .await
        .unwrap();
    let recorder = Recorder::configuration(&service);

    workspace.write("app/.vscode/settings.json", r#"{ "editor.tabSize": 7 }"#);

    let events = recorder.wait_for(1).await;
    assert!(events[0].affects_configuration("editor.tabSize", None));
    assert_eq!(events[0].source, ConfigurationTarget::Workspace);
    eventually(|| {
        service.get_value("editor.tabSize", &ConfigurationOverrides::none()) == Some(json!(7))
    })
    .await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn user_settings_change_is_picked_up() {
    let workspace = TempWorkspace::new();
    workspace
        .write("user/settings.json", r#"{ "window.zoom": 0 }"#)
        .write("team.code-workspace", r#"{ "folders": [] }"#);
    let service = workspace.service(true);
    service
        .initialize(WorkspaceInitialization::Workspace {
            id: "team".into(),
            config_path: workspace.resource("team.code-workspace"),
        })
        .await
        .unwrap();
    let recorder = Recorder::configuration(&service);

    workspace.write("user/settings.json", r#"{ "window.zoom": 2 }"#);

    let events = recorder.wait_for(1).await;
    assert_eq!(events[0].source, ConfigurationTarget::User);
    eventually(|| {
        service.inspect("window.zoom", &ConfigurationOverrides::none()).user_value == Some(json!(2))
    })
    .await;
}
