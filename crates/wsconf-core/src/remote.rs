//! Remote user configuration
//!
//! A remote agent may expose a second user settings file living on the
//! remote machine. Its location is only known once the agent answers, so
//! the remote layer goes through a small state machine:
//!
//! ```text
//! Unresolved -> Resolving -> Resolved(Some(environment))
//!                         -> Resolved(None)
//! ```
//!
//! Resolution happens at most once per service.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use wsconf_fs::{FileSystemProvider, Resource};

/// What the remote agent reports about its environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEnvironment {
    pub authority: String,
    /// Location of the remote user settings file
    pub settings_path: Resource,
}

#[async_trait]
pub trait RemoteAgent: Send + Sync {
    /// The remote environment, `None` when there is no remote settings file.
    async fn environment(&self) -> Option<RemoteEnvironment>;

    /// The remote authority, known before the environment is resolved.
    fn authority(&self) -> Option<String> {
        None
    }

    /// Provider serving the scheme of `settings_path`, created on first
    /// access. `None` when the provider is registered elsewhere.
    fn provider(&self) -> Option<Arc<dyn FileSystemProvider>> {
        None
    }
}

/// Fixed environment, for tests and the CLI.
pub struct StaticRemoteAgent {
    environment: Option<RemoteEnvironment>,
    provider: Option<Arc<dyn FileSystemProvider>>,
}

impl StaticRemoteAgent {
    pub fn new(environment: Option<RemoteEnvironment>) -> Self {
        Self {
            environment,
            provider: None,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn FileSystemProvider>) -> Self {
        self.provider = Some(provider);
        self
    }
}

#[async_trait]
impl RemoteAgent for StaticRemoteAgent {
    async fn environment(&self) -> Option<RemoteEnvironment> {
        self.environment.clone()
    }

    fn authority(&self) -> Option<String> {
        self.environment
            .as_ref()
            .map(|environment| environment.authority.clone())
    }

    fn provider(&self) -> Option<Arc<dyn FileSystemProvider>> {
        self.provider.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteState {
    Unresolved,
    Resolving,
    Resolved(Option<RemoteEnvironment>),
}

impl RemoteState {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    /// The remote environment once resolved with one.
    pub fn environment(&self) -> Option<&RemoteEnvironment> {
        match self {
            Self::Resolved(environment) => environment.as_ref(),
            _ => None,
        }
    }
}

/// Resolution state of the remote user layer.
pub struct RemoteUserConfiguration {
    state: watch::Sender<RemoteState>,
}

impl Default for RemoteUserConfiguration {
    fn default() -> Self {
        Self::new()
    }
}

impl RemoteUserConfiguration {
    pub fn new() -> Self {
        let (state, _) = watch::channel(RemoteState::Unresolved);
        Self { state }
    }

    pub fn state(&self) -> RemoteState {
        self.state.borrow().clone()
    }

    /// Move `Unresolved` to `Resolving`. False when resolution already
    /// started, so only the first caller proceeds.
    pub fn begin(&self) -> bool {
        self.state.send_if_modified(|state| {
            if *state == RemoteState::Unresolved {
                *state = RemoteState::Resolving;
                true
            } else {
                false
            }
        })
    }

    /// Record the outcome and wake every waiter.
    pub fn finish(&self, environment: Option<RemoteEnvironment>) {
        tracing::debug!(
            authority = environment.as_ref().map(|e| e.authority.as_str()),
            "Remote user configuration resolved"
        );
        self.state.send_replace(RemoteState::Resolved(environment));
    }

    /// Settings file of the resolved remote, if any.
    pub fn settings_path(&self) -> Option<Resource> {
        self.state
            .borrow()
            .environment()
            .map(|environment| environment.settings_path.clone())
    }

    /// Wait until resolution has finished.
    pub async fn wait_resolved(&self) -> Option<RemoteEnvironment> {
        let mut receiver = self.state.subscribe();
        match receiver.wait_for(RemoteState::is_resolved).await {
            Ok(state) => state.environment().cloned(),
            // The sender lives in `self`, so it cannot be gone here.
            Err(_) => None,
        }
    }
}
