//! Event recording.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use wsconf_core::{
    ConfigurationChangeEvent, WorkbenchState, WorkspaceConfigurationService,
    WorkspaceFoldersChangeEvent,
};
use wsconf_model::Subscription;

/// Collects every event of one kind until dropped.
pub struct Recorder<T> {
    events: Arc<Mutex<Vec<T>>>,
    _subscription: Subscription,
}

impl<T: Clone + Send + 'static> Recorder<T> {
    fn new(subscribe: impl FnOnce(Arc<Mutex<Vec<T>>>) -> Subscription) -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let subscription = subscribe(Arc::clone(&events));
        Self {
            events,
            _subscription: subscription,
        }
    }

    /// Events recorded so far, oldest first.
    pub fn events(&self) -> Vec<T> {
        self.events.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget recorded events.
    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    /// Wait until at least `count` events were recorded.
    ///
    /// # Panics
    /// Panics after five seconds.
    pub async fn wait_for(&self, count: usize) -> Vec<T> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let events = self.events();
            if events.len() >= count {
                return events;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "Timed out waiting for {count} events, got {}",
                events.len()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

fn push<T: Clone>(events: &Mutex<Vec<T>>, event: &T) {
    events.lock().unwrap().push(event.clone());
}

impl Recorder<ConfigurationChangeEvent> {
    pub fn configuration(service: &WorkspaceConfigurationService) -> Self {
        Self::new(|events| service.on_did_change_configuration(move |e| push(&events, e)))
    }

    /// Affected keys of every recorded event, in order.
    pub fn affected_keys(&self) -> Vec<Vec<String>> {
        self.events()
            .iter()
            .map(|event| event.affected_keys.iter().cloned().collect())
            .collect()
    }
}

impl Recorder<WorkspaceFoldersChangeEvent> {
    pub fn folders(service: &WorkspaceConfigurationService) -> Self {
        Self::new(|events| service.on_did_change_workspace_folders(move |e| push(&events, e)))
    }
}

impl Recorder<WorkbenchState> {
    pub fn workbench_state(service: &WorkspaceConfigurationService) -> Self {
        Self::new(|events| service.on_did_change_workbench_state(move |e| push(&events, e)))
    }
}

impl Recorder<String> {
    pub fn workspace_name(service: &WorkspaceConfigurationService) -> Self {
        Self::new(|events| service.on_did_change_workspace_name(move |e| push(&events, e)))
    }
}
