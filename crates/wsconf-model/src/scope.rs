//! Configuration scopes
//!
//! A scope declares which sources may define a key. It is looked up from the
//! registry whenever a value is resolved, never stored next to the value.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfigurationScope {
    /// User only, never settable outside the user target.
    Application,
    /// User only, excluded from workspace and folder sources.
    Machine,
    /// User default that workspace and folder values may override.
    MachineOverridable,
    /// Fully overridable per folder.
    Resource,
    /// Resource scoped plus per-language override sections.
    LanguageOverridable,
    #[default]
    Window,
}

impl ConfigurationScope {
    pub const ALL: [ConfigurationScope; 6] = [
        Self::Application,
        Self::Machine,
        Self::MachineOverridable,
        Self::Resource,
        Self::LanguageOverridable,
        Self::Window,
    ];

    /// Values may be read from the workspace source.
    pub fn is_workspace_readable(self) -> bool {
        !matches!(self, Self::Application | Self::Machine)
    }

    /// Values may be read from a folder source, and writes with a resource
    /// default to the owning folder.
    pub fn is_folder_readable(self) -> bool {
        matches!(
            self,
            Self::Resource | Self::MachineOverridable | Self::LanguageOverridable | Self::Window
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Application => "application",
            Self::Machine => "machine",
            Self::MachineOverridable => "machine-overridable",
            Self::Resource => "resource",
            Self::LanguageOverridable => "language-overridable",
            Self::Window => "window",
        }
    }
}

impl fmt::Display for ConfigurationScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConfigurationScope {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|scope| scope.as_str() == s)
            .ok_or_else(|| Error::UnknownScope {
                scope: s.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ConfigurationScope::Application, false)]
    #[case(ConfigurationScope::Machine, false)]
    #[case(ConfigurationScope::MachineOverridable, true)]
    #[case(ConfigurationScope::Resource, true)]
    #[case(ConfigurationScope::LanguageOverridable, true)]
    #[case(ConfigurationScope::Window, true)]
    fn workspace_gating(#[case] scope: ConfigurationScope, #[case] readable: bool) {
        assert_eq!(scope.is_workspace_readable(), readable);
        assert_eq!(scope.is_folder_readable(), readable);
    }

    #[test]
    fn parses_serde_names() {
        for scope in ConfigurationScope::ALL {
            assert_eq!(scope.as_str().parse::<ConfigurationScope>().unwrap(), scope);
            let json = serde_json::to_string(&scope).unwrap();
            assert_eq!(json, format!("\"{}\"", scope.as_str()));
        }
    }

    #[test]
    fn unknown_scope_is_rejected() {
        assert!("global".parse::<ConfigurationScope>().is_err());
    }
}
