//! Workspace model
//!
//! A workspace is an ordered list of folders plus, in the multi-root case,
//! the resource of its workspace definition file.

pub mod definition;
pub mod diff;

use serde::{Deserialize, Serialize};
use wsconf_fs::{Resource, ResourceIdentity};

pub use definition::WorkspaceDefinition;
pub use diff::{WorkspaceFoldersChangeEvent, diff_folders};

/// Extension of workspace definition files, stripped from the workspace name.
pub const WORKSPACE_EXTENSION: &str = "code-workspace";

/// One root folder of a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceFolder {
    pub uri: Resource,
    pub name: String,
    /// Position in the folder list, recomputed when the list changes.
    pub index: usize,
}

impl WorkspaceFolder {
    /// `name` defaults to the last path segment of `uri`.
    pub fn new(uri: Resource, name: Option<String>, index: usize) -> Self {
        let name = name.unwrap_or_else(|| default_folder_name(&uri));
        Self { uri, name, index }
    }

    /// Resource of `file` inside the folder's settings directory.
    pub fn settings_resource(&self, settings_dir: &str, file: &str) -> Resource {
        self.uri.join(settings_dir).join(file)
    }
}

pub fn default_folder_name(uri: &Resource) -> String {
    uri.file_name().unwrap_or_else(|| uri.to_string())
}

/// A folder to add through the folder APIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderToAdd {
    pub uri: Resource,
    pub name: Option<String>,
}

impl FolderToAdd {
    pub fn new(uri: Resource) -> Self {
        Self { uri, name: None }
    }

    pub fn named(uri: Resource, name: impl Into<String>) -> Self {
        Self {
            uri,
            name: Some(name.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkbenchState {
    Empty,
    Folder,
    Workspace,
}

impl std::fmt::Display for WorkbenchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Empty => "empty",
            Self::Folder => "folder",
            Self::Workspace => "workspace",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: String,
    folders: Vec<WorkspaceFolder>,
    configuration: Option<Resource>,
}

impl Workspace {
    pub fn new(
        id: impl Into<String>,
        folders: Vec<WorkspaceFolder>,
        configuration: Option<Resource>,
    ) -> Self {
        let mut workspace = Self {
            id: id.into(),
            folders: Vec::new(),
            configuration,
        };
        workspace.set_folders(folders);
        workspace
    }

    pub fn empty(id: impl Into<String>) -> Self {
        Self::new(id, Vec::new(), None)
    }

    pub fn single_folder(id: impl Into<String>, folder: Resource) -> Self {
        Self::new(id, vec![WorkspaceFolder::new(folder, None, 0)], None)
    }

    pub fn folders(&self) -> &[WorkspaceFolder] {
        &self.folders
    }

    /// Replace the folder list, renumbering indexes.
    pub fn set_folders(&mut self, folders: Vec<WorkspaceFolder>) {
        self.folders = folders
            .into_iter()
            .enumerate()
            .map(|(index, folder)| WorkspaceFolder { index, ..folder })
            .collect();
    }

    /// The workspace definition file, multi-root only.
    pub fn configuration(&self) -> Option<&Resource> {
        self.configuration.as_ref()
    }

    pub fn state(&self) -> WorkbenchState {
        if self.configuration.is_some() {
            WorkbenchState::Workspace
        } else if self.folders.len() == 1 {
            WorkbenchState::Folder
        } else {
            WorkbenchState::Empty
        }
    }

    /// File stem of the definition file, or the single folder's name.
    pub fn name(&self) -> String {
        match (&self.configuration, self.folders.first()) {
            (Some(configuration), _) => {
                let name = configuration.file_name().unwrap_or_default();
                name.strip_suffix(&format!(".{WORKSPACE_EXTENSION}"))
                    .map(str::to_string)
                    .or_else(|| configuration.file_stem())
                    .unwrap_or(name)
            }
            (None, Some(folder)) if self.folders.len() == 1 => folder.name.clone(),
            _ => String::new(),
        }
    }

    /// The folder containing `resource`; the deepest one wins when folders
    /// are nested.
    pub fn folder(&self, resource: &Resource, identity: ResourceIdentity) -> Option<&WorkspaceFolder> {
        self.folders
            .iter()
            .filter(|folder| identity.is_equal_or_parent(&folder.uri, resource))
            .max_by_key(|folder| folder.uri.path().trim_end_matches('/').len())
    }

    pub fn contains(&self, resource: &Resource, identity: ResourceIdentity) -> bool {
        self.folder(resource, identity).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn resource(s: &str) -> Resource {
        Resource::parse(s).unwrap()
    }

    #[test]
    fn folder_name_defaults_to_last_segment() {
        let folder = WorkspaceFolder::new(resource("file:///work/my%20app"), None, 0);
        assert_eq!(folder.name, "my app");
        let named = WorkspaceFolder::new(resource("file:///work/app"), Some("App".into()), 0);
        assert_eq!(named.name, "App");
    }

    #[test]
    fn states_and_names() {
        let empty = Workspace::empty("");
        assert_eq!(empty.state(), WorkbenchState::Empty);
        assert_eq!(empty.name(), "");

        let folder = Workspace::single_folder("f", resource("file:///work/app"));
        assert_eq!(folder.state(), WorkbenchState::Folder);
        assert_eq!(folder.name(), "app");

        let multi = Workspace::new(
            "w",
            vec![],
            Some(resource("file:///work/team.code-workspace")),
        );
        assert_eq!(multi.state(), WorkbenchState::Workspace);
        assert_eq!(multi.name(), "team");
    }

    #[test]
    fn indexes_are_renumbered() {
        let mut workspace = Workspace::new(
            "w",
            vec![
                WorkspaceFolder::new(resource("file:///a"), None, 7),
                WorkspaceFolder::new(resource("file:///b"), None, 7),
            ],
            None,
        );
        assert_eq!(
            workspace.folders().iter().map(|f| f.index).collect::<Vec<_>>(),
            [0, 1]
        );
        workspace.set_folders(vec![WorkspaceFolder::new(resource("file:///b"), None, 1)]);
        assert_eq!(workspace.folders()[0].index, 0);
    }

    #[test]
    fn nested_folders_resolve_to_deepest() {
        let workspace = Workspace::new(
            "w",
            vec![
                WorkspaceFolder::new(resource("file:///work"), None, 0),
                WorkspaceFolder::new(resource("file:///work/inner"), None, 1),
            ],
            Some(resource("file:///work/w.code-workspace")),
        );
        let identity = ResourceIdentity::CaseSensitive;
        let found = workspace
            .folder(&resource("file:///work/inner/src/lib.rs"), identity)
            .unwrap();
        assert_eq!(found.name, "inner");
        assert!(workspace.folder(&resource("file:///elsewhere"), identity).is_none());
    }
}
