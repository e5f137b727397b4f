//! Configuration targets, ordered lowest to highest precedence

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

/// A configuration source when reading, or the destination of a write.
///
/// `User` is an alias that resolves to `UserLocal`, or to `UserRemote` for
/// machine scoped keys while a remote is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigurationTarget {
    Default,
    User,
    UserLocal,
    UserRemote,
    Workspace,
    WorkspaceFolder,
    Memory,
}

impl ConfigurationTarget {
    pub const ALL: [ConfigurationTarget; 7] = [
        Self::Default,
        Self::User,
        Self::UserLocal,
        Self::UserRemote,
        Self::Workspace,
        Self::WorkspaceFolder,
        Self::Memory,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::User => "user",
            Self::UserLocal => "user-local",
            Self::UserRemote => "user-remote",
            Self::Workspace => "workspace",
            Self::WorkspaceFolder => "workspace-folder",
            Self::Memory => "memory",
        }
    }

    /// Workspace or folder target, where machine level scopes are illegal.
    pub fn is_workspace_level(self) -> bool {
        matches!(self, Self::Workspace | Self::WorkspaceFolder)
    }
}

impl fmt::Display for ConfigurationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigurationTarget {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|target| target.as_str() == s)
            .ok_or_else(|| Error::UnknownTarget {
                target: s.to_string(),
            })
    }
}
