//! Folder diff engine

use std::collections::HashMap;

use serde::Serialize;
use wsconf_fs::ResourceIdentity;

use super::WorkspaceFolder;

/// Folders added, removed, or changed (renamed or moved) between two lists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkspaceFoldersChangeEvent {
    pub added: Vec<WorkspaceFolder>,
    pub removed: Vec<WorkspaceFolder>,
    pub changed: Vec<WorkspaceFolder>,
}

impl WorkspaceFoldersChangeEvent {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Diff two ordered folder lists by URI identity.
///
/// `added` and `changed` follow the order of `new`, `removed` the order of
/// `old`. A folder present in both is changed when its name or index differs.
pub fn diff_folders(
    old: &[WorkspaceFolder],
    new: &[WorkspaceFolder],
    identity: ResourceIdentity,
) -> WorkspaceFoldersChangeEvent {
    let old_by_key: HashMap<String, &WorkspaceFolder> = old
        .iter()
        .map(|folder| (identity.key(&folder.uri), folder))
        .collect();
    let new_keys: HashMap<String, &WorkspaceFolder> = new
        .iter()
        .map(|folder| (identity.key(&folder.uri), folder))
        .collect();

    let mut event = WorkspaceFoldersChangeEvent::default();
    for folder in new {
        match old_by_key.get(&identity.key(&folder.uri)) {
            None => event.added.push(folder.clone()),
            Some(previous) if previous.name != folder.name || previous.index != folder.index => {
                event.changed.push(folder.clone())
            }
            Some(_) => {}
        }
    }
    event.removed = old
        .iter()
        .filter(|folder| !new_keys.contains_key(&identity.key(&folder.uri)))
        .cloned()
        .collect();
    event
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wsconf_fs::Resource;

    fn folder(path: &str, name: Option<&str>, index: usize) -> WorkspaceFolder {
        WorkspaceFolder::new(
            Resource::parse(&format!("file:///work/{path}")).unwrap(),
            name.map(str::to_string),
            index,
        )
    }

    fn uris(folders: &[WorkspaceFolder]) -> Vec<String> {
        folders.iter().map(|f| f.uri.to_string()).collect()
    }

    #[test]
    fn reverse_order_changes_both() {
        let old = [folder("a", None, 0), folder("b", None, 1)];
        let new = [folder("b", None, 0), folder("a", None, 1)];
        let event = diff_folders(&old, &new, ResourceIdentity::CaseSensitive);

        assert!(event.added.is_empty());
        assert!(event.removed.is_empty());
        assert_eq!(uris(&event.changed), ["file:///work/b", "file:///work/a"]);
    }

    #[test]
    fn removal_only() {
        let old = [folder("a", None, 0), folder("b", None, 1)];
        let new = [folder("a", None, 0)];
        let event = diff_folders(&old, &new, ResourceIdentity::CaseSensitive);

        assert_eq!(uris(&event.removed), ["file:///work/b"]);
        assert!(event.added.is_empty());
        assert!(event.changed.is_empty());
    }

    #[test]
    fn rename_is_a_change() {
        let old = [folder("a", None, 0)];
        let new = [folder("a", Some("X"), 0)];
        let event = diff_folders(&old, &new, ResourceIdentity::CaseSensitive);

        assert_eq!(uris(&event.changed), ["file:///work/a"]);
        assert_eq!(event.changed[0].name, "X");
        assert!(event.added.is_empty() && event.removed.is_empty());
    }

    #[test]
    fn identity_rules_decide_equality() {
        let old = [folder("A", None, 0)];
        let new = [folder("a", Some("A"), 0)];

        let insensitive = diff_folders(&old, &new, ResourceIdentity::CaseInsensitive);
        assert!(insensitive.is_empty());

        let sensitive = diff_folders(&old, &new, ResourceIdentity::CaseSensitive);
        assert_eq!(sensitive.added.len(), 1);
        assert_eq!(sensitive.removed.len(), 1);
    }
}
