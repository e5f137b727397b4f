//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use wsconf_model::ConfigurationTarget;

/// Workspace configuration - read and write layered settings
#[derive(Parser, Debug)]
#[command(name = "wsconf")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(flatten)]
    pub open: OpenArgs,

    /// The command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// What to open and where user settings live.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct OpenArgs {
    /// Open a single folder (defaults to the current directory)
    #[arg(long, global = true, conflicts_with = "workspace")]
    pub folder: Option<PathBuf>,

    /// Open a multi-root workspace file
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    /// User settings file
    #[arg(long, global = true, env = "WSCONF_USER_SETTINGS")]
    pub user_settings: Option<PathBuf>,

    /// JSON schema files declaring settings
    #[arg(long, global = true)]
    pub schema: Vec<PathBuf>,

    /// Service options (TOML)
    #[arg(long, global = true, env = "WSCONF_OPTIONS")]
    pub options: Option<PathBuf>,
}

/// Resource and language a read or write applies to.
#[derive(Args, Debug, Clone, PartialEq, Eq, Default)]
pub struct ScopeArgs {
    /// File or directory the setting applies to
    #[arg(short, long)]
    pub resource: Option<PathBuf>,

    /// Language override identifier (e.g. rust)
    #[arg(short, long)]
    pub language: Option<String>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Print the effective value of a setting
    Get {
        key: String,

        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Show the value of a setting in every source
    Inspect {
        key: String,

        #[command(flatten)]
        scope: ScopeArgs,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// List the keys defined by each source
    Keys {
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Write a setting
    ///
    /// VALUE is parsed as JSON; anything else is written as a string.
    ///
    /// Examples:
    ///   wsconf set editor.tabSize 2
    ///   wsconf set editor.tabSize 8 --language rust --target user
    ///   wsconf set files.exclude '{"target": true}' --resource src
    Set {
        key: String,

        value: String,

        /// Destination (user, user-local, user-remote, workspace,
        /// workspace-folder, memory). Inferred when omitted.
        #[arg(short, long, value_parser = parse_target)]
        target: Option<ConfigurationTarget>,

        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Remove a setting, from every source holding it unless --target is given
    Unset {
        key: String,

        #[arg(short, long, value_parser = parse_target)]
        target: Option<ConfigurationTarget>,

        #[command(flatten)]
        scope: ScopeArgs,
    },

    /// Show or edit the folders of the workspace
    Folders {
        #[command(subcommand)]
        action: Option<FoldersAction>,
    },
}

/// Folder actions
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum FoldersAction {
    /// List workspace folders
    List,

    /// Add a folder to the workspace
    Add {
        path: PathBuf,

        /// Display name of the folder
        #[arg(short, long)]
        name: Option<String>,

        /// Position to insert at (appended when omitted)
        #[arg(short, long)]
        index: Option<usize>,
    },

    /// Remove a folder from the workspace
    Remove { path: PathBuf },
}

fn parse_target(s: &str) -> Result<ConfigurationTarget, String> {
    s.parse().map_err(|e: wsconf_model::Error| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_set_with_target() {
        let cli = Cli::try_parse_from([
            "wsconf",
            "set",
            "editor.tabSize",
            "2",
            "--target",
            "workspace-folder",
            "--resource",
            "src",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Commands::Set {
                key: "editor.tabSize".into(),
                value: "2".into(),
                target: Some(ConfigurationTarget::WorkspaceFolder),
                scope: ScopeArgs {
                    resource: Some(PathBuf::from("src")),
                    language: None,
                },
            }
        );
    }

    #[test]
    fn unknown_target_is_rejected() {
        let result = Cli::try_parse_from(["wsconf", "unset", "a.b", "--target", "global"]);
        assert!(result.is_err());
    }

    #[test]
    fn folder_and_workspace_conflict() {
        let result = Cli::try_parse_from([
            "wsconf",
            "--folder",
            ".",
            "--workspace",
            "team.code-workspace",
            "keys",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn global_open_flags_after_command() {
        let cli = Cli::try_parse_from(["wsconf", "get", "a.b", "--workspace", "w.code-workspace"]).unwrap();
        assert_eq!(cli.open.workspace, Some(PathBuf::from("w.code-workspace")));
    }
}
