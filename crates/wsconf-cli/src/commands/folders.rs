//! Workspace folder commands

use colored::Colorize;
use wsconf_core::{FolderToAdd, WorkspaceFolder};

use crate::cli::FoldersAction;
use crate::context::Context;
use crate::error::Result;

pub async fn run_folders(context: &Context, action: Option<FoldersAction>) -> Result<()> {
    match action.unwrap_or(FoldersAction::List) {
        FoldersAction::List => {
            print!("{}", render_folders(context.service.workspace().folders()));
        }
        FoldersAction::Add { path, name, index } => {
            let uri = context.resource(&path)?;
            let folder = match name {
                Some(name) => FolderToAdd::named(uri, name),
                None => FolderToAdd::new(uri),
            };
            context.service.add_folders(vec![folder], index).await?;
            println!("{} Added {}", "OK".green().bold(), path.display());
        }
        FoldersAction::Remove { path } => {
            let uri = context.resource(&path)?;
            context.service.remove_folders(&[uri]).await?;
            println!("{} Removed {}", "OK".green().bold(), path.display());
        }
    }
    Ok(())
}

pub fn render_folders(folders: &[WorkspaceFolder]) -> String {
    if folders.is_empty() {
        return format!("{}\n", "(no folders)".dimmed());
    }
    folders
        .iter()
        .map(|folder| format!("{:>3}  {:<16} {}\n", folder.index, folder.name.bold(), folder.uri))
        .collect()
}
