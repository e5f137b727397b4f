//! Workspace configuration service
//!
//! Owns the workspace, the current [`Configuration`] snapshot and the
//! pipelines that replace it. Every pipeline (initialize, reload, update,
//! folder edits, remote resolution) runs under one async gate, builds the
//! new snapshot from the old one, swaps it in, and only then computes and
//! fires the change events. Readers never wait on the gate.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::task::JoinHandle;
use wsconf_fs::{FileChange, FileService, Resource, ResourceIdentity};
use wsconf_model::{
    ConfigurationModel, ConfigurationRegistry, ConfigurationTarget, Emitter, RegistryChange,
    Subscription,
};

use crate::cache::{CacheKey, ConfigurationCache, DiskConfigurationCache, NullConfigurationCache};
use crate::change::{ConfigurationChangeEvent, compare};
use crate::configuration::{
    Configuration, ConfigurationKeys, ConfigurationOverrides, FolderConfiguration, InspectValue,
};
use crate::editing::{self, EditingErrorCode, JsonPath, RoutingContext, UpdateOptions};
use crate::options::{STANDALONE_KEYS, ServiceOptions, standalone_key_of};
use crate::remote::{RemoteAgent, RemoteEnvironment, RemoteUserConfiguration};
use crate::sources::SourceLoader;
use crate::workspace::{
    FolderToAdd, WorkbenchState, Workspace, WorkspaceDefinition, WorkspaceFolder,
    WorkspaceFoldersChangeEvent, diff_folders,
};
use crate::{Error, Result};

/// What to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkspaceInitialization {
    Empty { id: String },
    Folder { id: String, folder: Resource },
    Workspace { id: String, config_path: Resource },
}

/// Builder for [`WorkspaceConfigurationService`].
pub struct ServiceBuilder {
    files: Arc<FileService>,
    registry: Arc<ConfigurationRegistry>,
    user_settings: Resource,
    options: ServiceOptions,
    cache: Option<Arc<dyn ConfigurationCache>>,
    remote_agent: Option<Arc<dyn RemoteAgent>>,
}

impl ServiceBuilder {
    pub fn options(mut self, options: ServiceOptions) -> Self {
        self.options = options;
        self
    }

    /// Use `cache` instead of the one described by the options.
    pub fn cache(mut self, cache: Arc<dyn ConfigurationCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn remote_agent(mut self, agent: Arc<dyn RemoteAgent>) -> Self {
        self.remote_agent = Some(agent);
        self
    }

    pub fn build(self) -> WorkspaceConfigurationService {
        let cache = self.cache.unwrap_or_else(|| default_cache(&self.options));
        let identity = self.files.identity(&self.user_settings);
        let configuration = Arc::new(Configuration::new(self.registry.snapshot(), identity));
        let registry = self.registry;

        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let listener = weak.clone();
            let registry_subscription = registry.on_did_update(move |change: &RegistryChange| {
                if let Some(inner) = listener.upgrade() {
                    inner.on_registry_changed(change);
                }
            });
            Inner {
                loader: SourceLoader::new(Arc::clone(&self.files), self.options.clone()),
                files: self.files,
                registry: Arc::clone(&registry),
                user_settings: self.user_settings,
                options: self.options,
                cache,
                remote_agent: self.remote_agent,
                remote: RemoteUserConfiguration::new(),
                gate: tokio::sync::Mutex::new(()),
                state: RwLock::new(State {
                    workspace: Workspace::empty(""),
                    configuration,
                }),
                on_did_change_configuration: Emitter::new(),
                on_did_change_workspace_folders: Emitter::new(),
                on_did_change_workbench_state: Emitter::new(),
                on_did_change_workspace_name: Emitter::new(),
                _registry_subscription: registry_subscription,
                watched: Mutex::new(HashSet::new()),
                forwarders: Mutex::new(HashMap::new()),
            }
        });
        WorkspaceConfigurationService { inner }
    }
}

fn default_cache(options: &ServiceOptions) -> Arc<dyn ConfigurationCache> {
    if !options.cache.enabled {
        return Arc::new(NullConfigurationCache);
    }
    match options.cache.resolved_directory() {
        Some(directory) => Arc::new(DiskConfigurationCache::new(directory)),
        None => {
            tracing::warn!("No cache directory available, configuration cache disabled");
            Arc::new(NullConfigurationCache)
        }
    }
}

/// Multi-root workspace configuration service.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct WorkspaceConfigurationService {
    inner: Arc<Inner>,
}

struct State {
    workspace: Workspace,
    configuration: Arc<Configuration>,
}

struct Inner {
    files: Arc<FileService>,
    registry: Arc<ConfigurationRegistry>,
    user_settings: Resource,
    options: ServiceOptions,
    cache: Arc<dyn ConfigurationCache>,
    remote_agent: Option<Arc<dyn RemoteAgent>>,
    remote: RemoteUserConfiguration,
    loader: SourceLoader,
    gate: tokio::sync::Mutex<()>,
    state: RwLock<State>,
    on_did_change_configuration: Emitter<ConfigurationChangeEvent>,
    on_did_change_workspace_folders: Emitter<WorkspaceFoldersChangeEvent>,
    on_did_change_workbench_state: Emitter<WorkbenchState>,
    on_did_change_workspace_name: Emitter<String>,
    _registry_subscription: Subscription,
    watched: Mutex<HashSet<Resource>>,
    forwarders: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let forwarders = self.forwarders.get_mut().unwrap_or_else(PoisonError::into_inner);
        for (_, handle) in forwarders.drain() {
            handle.abort();
        }
    }
}

/// One step of a pipeline: the snapshot after `source` was replaced.
struct Stage {
    source: ConfigurationTarget,
    source_config: Option<ConfigurationModel>,
    configuration: Configuration,
}

impl Stage {
    fn new(
        source: ConfigurationTarget,
        source_config: Option<ConfigurationModel>,
        configuration: &Configuration,
    ) -> Self {
        Self {
            source,
            source_config,
            configuration: configuration.clone(),
        }
    }
}

/// Sources a reload re-reads.
#[derive(Debug, Default)]
struct ReloadRequest {
    user: bool,
    workspace: bool,
    all_folders: bool,
    folders: Vec<Resource>,
    memory: Option<ConfigurationModel>,
}

impl ReloadRequest {
    fn full() -> Self {
        Self {
            user: true,
            workspace: true,
            all_folders: true,
            ..Self::default()
        }
    }

    fn is_empty(&self) -> bool {
        !self.user
            && !self.workspace
            && !self.all_folders
            && self.folders.is_empty()
            && self.memory.is_none()
    }

    fn wants_folder(&self, folder: &Resource, identity: ResourceIdentity) -> bool {
        self.all_folders || self.folders.iter().any(|f| identity.is_equal(f, folder))
    }
}

/// A planned change to one target, computed before anything is written.
enum PlannedWrite {
    Put(Resource, String),
    Delete(Resource),
    /// In-memory targets and removals from files that do not exist
    Nothing,
}

/// Where a key lives inside a target file.
enum EditLocation {
    Path(JsonPath),
    /// The key is the whole standalone file (`launch` in `launch.json`)
    WholeFile,
}

impl WorkspaceConfigurationService {
    /// Start building a service reading user settings from `user_settings`.
    pub fn builder(
        files: Arc<FileService>,
        registry: Arc<ConfigurationRegistry>,
        user_settings: Resource,
    ) -> ServiceBuilder {
        ServiceBuilder {
            files,
            registry,
            user_settings,
            options: ServiceOptions::default(),
            cache: None,
            remote_agent: None,
        }
    }

    /// Open a workspace, replacing the current one.
    ///
    /// Fires workbench state, name and folder events as needed, then the
    /// configuration events for the provisional (cached) and the final
    /// configuration.
    pub async fn initialize(&self, initialization: WorkspaceInitialization) -> Result<()> {
        let inner = &self.inner;
        let _gate = inner.gate.lock().await;
        tracing::debug!(?initialization, "Initializing workspace");

        let workspace = inner.open_workspace(&initialization).await?;
        let identity = inner.identity_for(&workspace);
        let (previous, old_workspace) = inner.current();

        let provisional = inner.provisional_configuration(&previous, &workspace, identity).await;
        let folders_event = diff_folders(old_workspace.folders(), workspace.folders(), identity);
        let state_changed = old_workspace.state() != workspace.state();
        let name_changed = old_workspace.name() != workspace.name();
        let new_state = workspace.state();
        let new_name = workspace.name();

        let events = inner.commit(
            vec![Stage::new(ConfigurationTarget::Workspace, None, &provisional)],
            Some(workspace),
        );

        if state_changed {
            inner.on_did_change_workbench_state.fire(&new_state);
        }
        if name_changed {
            inner.on_did_change_workspace_name.fire(&new_name);
        }
        if !folders_event.is_empty() {
            inner.on_did_change_workspace_folders.fire(&folders_event);
        }
        inner.fire_configuration(events);

        inner.reload_locked(ReloadRequest::full()).await?;

        if inner.remote_agent.is_none() {
            if inner.remote.begin() {
                inner.remote.finish(None);
            }
        } else if !inner.remote.state().is_resolved() {
            let weak = Arc::downgrade(inner);
            tokio::spawn(async move {
                if let Some(inner) = weak.upgrade() {
                    inner.resolve_remote().await;
                }
            });
        }
        Ok(())
    }

    /// Re-read every source, or only `folder`'s settings when given.
    pub async fn reload_configuration(&self, folder: Option<&Resource>) -> Result<()> {
        let _gate = self.inner.gate.lock().await;
        let request = match folder {
            Some(folder) => ReloadRequest {
                folders: vec![folder.clone()],
                ..ReloadRequest::default()
            },
            None => ReloadRequest::full(),
        };
        self.inner.reload_locked(request).await
    }

    /// Resolve the remote user settings now instead of waiting for the
    /// background resolution started by `initialize`.
    pub async fn resolve_remote(&self) {
        self.inner.resolve_remote().await;
    }

    /// Completes once the remote user settings are loaded, or known to be
    /// absent.
    pub async fn when_remote_resolved(&self) -> Option<RemoteEnvironment> {
        self.inner.remote.wait_resolved().await
    }

    /// The current configuration snapshot.
    pub fn configuration(&self) -> Arc<Configuration> {
        Arc::clone(&self.inner.read_state().configuration)
    }

    pub fn get_value(&self, key: &str, overrides: &ConfigurationOverrides) -> Option<Value> {
        self.configuration().get_value(key, overrides)
    }

    pub fn inspect(&self, key: &str, overrides: &ConfigurationOverrides) -> InspectValue {
        self.configuration().inspect(key, overrides)
    }

    pub fn keys(&self) -> ConfigurationKeys {
        self.configuration().keys()
    }

    /// Write `value` (or remove the key when `None`) and wait until the
    /// resulting change event has been delivered.
    pub async fn update_value(
        &self,
        key: &str,
        value: Option<Value>,
        overrides: &ConfigurationOverrides,
        target: Option<ConfigurationTarget>,
        options: UpdateOptions,
    ) -> Result<()> {
        let _gate = self.inner.gate.lock().await;
        let result = self.inner.update_locked(key, value, overrides, target).await;
        if let Err(e) = &result {
            if options.donot_notify_error {
                tracing::debug!(%key, error = %e, "Configuration update failed");
            } else {
                tracing::warn!(%key, error = %e, "Configuration update failed");
            }
        }
        result
    }

    /// Insert folders at `index` (appended when `None`). Folders already in
    /// the workspace are skipped.
    pub async fn add_folders(&self, folders: Vec<FolderToAdd>, index: Option<usize>) -> Result<()> {
        let identity = self.inner.identity();
        self.inner
            .edit_folders(|current| {
                let index = index.unwrap_or(current.len()).min(current.len());
                splice_folders(current, index, 0, folders, identity)
            })
            .await
    }

    pub async fn remove_folders(&self, folders: &[Resource]) -> Result<()> {
        let identity = self.inner.identity();
        self.inner
            .edit_folders(|current| {
                current
                    .iter()
                    .filter(|folder| !folders.iter().any(|r| identity.is_equal(r, &folder.uri)))
                    .cloned()
                    .collect()
            })
            .await
    }

    /// Remove `delete_count` folders starting at `index`, then insert
    /// `folders` there.
    pub async fn update_folders(
        &self,
        index: usize,
        delete_count: usize,
        folders: Vec<FolderToAdd>,
    ) -> Result<()> {
        let identity = self.inner.identity();
        self.inner
            .edit_folders(|current| {
                let index = index.min(current.len());
                splice_folders(current, index, delete_count, folders, identity)
            })
            .await
    }

    pub fn workspace(&self) -> Workspace {
        self.inner.read_state().workspace.clone()
    }

    pub fn workbench_state(&self) -> WorkbenchState {
        self.inner.read_state().workspace.state()
    }

    /// The workspace folder containing `resource`.
    pub fn workspace_folder(&self, resource: &Resource) -> Option<WorkspaceFolder> {
        let state = self.inner.read_state();
        let identity = state.configuration.identity();
        state.workspace.folder(resource, identity).cloned()
    }

    pub fn is_inside_workspace(&self, resource: &Resource) -> bool {
        self.workspace_folder(resource).is_some()
    }

    pub fn on_did_change_configuration<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&ConfigurationChangeEvent) + Send + Sync + 'static,
    {
        self.inner.on_did_change_configuration.subscribe(listener)
    }

    pub fn on_did_change_workspace_folders<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&WorkspaceFoldersChangeEvent) + Send + Sync + 'static,
    {
        self.inner.on_did_change_workspace_folders.subscribe(listener)
    }

    pub fn on_did_change_workbench_state<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&WorkbenchState) + Send + Sync + 'static,
    {
        self.inner.on_did_change_workbench_state.subscribe(listener)
    }

    pub fn on_did_change_workspace_name<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&String) + Send + Sync + 'static,
    {
        self.inner.on_did_change_workspace_name.subscribe(listener)
    }
}

/// Replace `delete_count` folders at `index` with `additions`, skipping
/// additions already present in the result.
fn splice_folders(
    current: &[WorkspaceFolder],
    index: usize,
    delete_count: usize,
    additions: Vec<FolderToAdd>,
    identity: ResourceIdentity,
) -> Vec<WorkspaceFolder> {
    let end = index.saturating_add(delete_count).min(current.len());
    let mut kept: Vec<WorkspaceFolder> = current[..index].to_vec();
    let tail: Vec<WorkspaceFolder> = current[end..].to_vec();

    let mut inserted = Vec::new();
    for addition in additions {
        let present = kept
            .iter()
            .chain(&tail)
            .chain(&inserted)
            .any(|folder: &WorkspaceFolder| identity.is_equal(&folder.uri, &addition.uri));
        if !present {
            inserted.push(WorkspaceFolder::new(addition.uri, addition.name, 0));
        }
    }
    kept.extend(inserted);
    kept.extend(tail);
    kept
}

impl Inner {
    fn read_state(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn current(&self) -> (Arc<Configuration>, Workspace) {
        let state = self.read_state();
        (Arc::clone(&state.configuration), state.workspace.clone())
    }

    fn identity(&self) -> ResourceIdentity {
        self.read_state().configuration.identity()
    }

    fn identity_for(&self, workspace: &Workspace) -> ResourceIdentity {
        let resource = workspace
            .configuration()
            .or_else(|| workspace.folders().first().map(|folder| &folder.uri))
            .unwrap_or(&self.user_settings);
        self.files.identity(resource)
    }

    /// Swap in the last stage and compute one event per stage, each against
    /// the snapshot it replaced.
    fn commit(&self, stages: Vec<Stage>, workspace: Option<Workspace>) -> Vec<ConfigurationChangeEvent> {
        let (mut previous, stages) = {
            let mut state = self.write_state();
            let previous = Arc::clone(&state.configuration);
            // Read under the state lock so a concurrent registry update is
            // never replaced by an older snapshot.
            let registry = self.registry.snapshot();
            let stages: Vec<(ConfigurationTarget, Option<ConfigurationModel>, Arc<Configuration>)> = stages
                .into_iter()
                .map(|stage| {
                    let configuration = stage.configuration.with_registry(Arc::clone(&registry));
                    (stage.source, stage.source_config, Arc::new(configuration))
                })
                .collect();
            if let Some((_, _, last)) = stages.last() {
                state.configuration = Arc::clone(last);
            }
            if let Some(workspace) = workspace {
                state.workspace = workspace;
            }
            (previous, stages)
        };

        let mut events = Vec::new();
        for (source, source_config, next) in stages {
            let change = compare(&previous, &next);
            tracing::debug!(%source, keys = change.keys.len(), "Configuration stage committed");
            events.extend(ConfigurationChangeEvent::new(
                source,
                source_config.as_ref(),
                change,
                Arc::clone(&previous),
                Arc::clone(&next),
            ));
            previous = next;
        }
        events
    }

    fn fire_configuration(&self, events: Vec<ConfigurationChangeEvent>) {
        for event in events {
            self.on_did_change_configuration.fire(&event);
        }
    }

    fn on_registry_changed(&self, change: &RegistryChange) {
        let (previous, next) = {
            let mut state = self.write_state();
            let previous = Arc::clone(&state.configuration);
            if change.snapshot.version() <= previous.registry().version() {
                return;
            }
            let next = Arc::new((*previous).clone().with_registry(Arc::clone(&change.snapshot)));
            state.configuration = Arc::clone(&next);
            (previous, next)
        };
        let defaults = next.defaults().clone();
        let diff = compare(&previous, &next);
        if let Some(event) = ConfigurationChangeEvent::new(
            ConfigurationTarget::Default,
            Some(&defaults),
            diff,
            previous,
            next,
        ) {
            self.on_did_change_configuration.fire(&event);
        }
    }

    async fn open_workspace(&self, initialization: &WorkspaceInitialization) -> Result<Workspace> {
        match initialization {
            WorkspaceInitialization::Empty { id } => Ok(Workspace::empty(id.clone())),
            WorkspaceInitialization::Folder { id, folder } => {
                Ok(Workspace::single_folder(id.clone(), folder.clone()))
            }
            WorkspaceInitialization::Workspace { id, config_path } => {
                let identity = self.files.identity(config_path);
                let content = self
                    .files
                    .read_optional_string(config_path)
                    .await?
                    .ok_or_else(|| Error::InvalidWorkspace {
                        resource: config_path.to_string(),
                        message: "file does not exist".to_string(),
                    })?;
                let definition = WorkspaceDefinition::parse_lenient(config_path, &content, identity);
                Ok(Workspace::new(
                    id.clone(),
                    definition.folders,
                    Some(config_path.clone()),
                ))
            }
        }
    }

    /// Cache entries are keyed on the agent's authority, which is known
    /// before resolution, so every session reads and writes the same entry.
    fn remote_authority(&self) -> Option<String> {
        self.remote_agent.as_ref().and_then(|agent| agent.authority())
    }

    fn cache_enabled_for(&self, resource: &Resource) -> bool {
        self.cache.needs_caching(resource)
    }

    async fn read_cached(&self, key: &CacheKey) -> Option<ConfigurationModel> {
        let content = match self.cache.read(key).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read configuration cache");
                return None;
            }
        };
        if content.is_empty() {
            return None;
        }
        match serde_json::from_str::<ConfigurationModel>(&content) {
            Ok(model) => Some(model),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring corrupt configuration cache entry");
                None
            }
        }
    }

    async fn write_cached(&self, key: &CacheKey, model: &ConfigurationModel) {
        if model.is_empty() {
            self.remove_cached(key).await;
            return;
        }
        let result = match serde_json::to_string(model) {
            Ok(content) => self.cache.write(key, &content).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            tracing::warn!(error = %e, "Failed to write configuration cache");
        }
    }

    async fn remove_cached(&self, key: &CacheKey) {
        if let Err(e) = self.cache.remove(key).await {
            tracing::warn!(error = %e, "Failed to remove configuration cache entry");
        }
    }

    /// The configuration to show until the real files are read: user and
    /// memory sources carried over, workspace and folder sources from the
    /// cache where available.
    async fn provisional_configuration(
        &self,
        previous: &Configuration,
        workspace: &Workspace,
        identity: ResourceIdentity,
    ) -> Configuration {
        let authority = self.remote_authority();
        let mut workspace_model = ConfigurationModel::empty();
        if let Some(location) = workspace.configuration()
            && self.cache_enabled_for(location)
        {
            let key = CacheKey::workspace(workspace.id.clone(), authority.clone());
            if let Some(model) = self.read_cached(&key).await {
                workspace_model = model;
            }
        }

        let mut folders = Vec::with_capacity(workspace.folders().len());
        for folder in workspace.folders() {
            let mut model = ConfigurationModel::empty();
            if self.cache_enabled_for(&folder.uri) {
                let key = CacheKey::folder(workspace.id.clone(), folder.uri.clone(), authority.clone());
                if let Some(cached) = self.read_cached(&key).await {
                    model = cached;
                }
            }
            folders.push(FolderConfiguration {
                folder: folder.clone(),
                model,
            });
        }
        if workspace.state() == WorkbenchState::Folder
            && let Some(entry) = folders.first()
        {
            workspace_model = entry.model.clone();
        }

        Configuration::new(self.registry.snapshot(), identity)
            .with_user_local(previous.user_local().clone())
            .with_user_remote(previous.user_remote().clone())
            .with_memory(previous.memory().clone())
            .with_workspace(workspace_model)
            .with_folders(folders)
    }

    /// Re-read the requested sources, swap once, and fire one event per
    /// changed source followed by the folder event. Caller holds the gate.
    async fn reload_locked(self: &Arc<Self>, request: ReloadRequest) -> Result<()> {
        if request.is_empty() {
            return Ok(());
        }
        let (previous, old_workspace) = self.current();
        let identity = previous.identity();
        let mut workspace = old_workspace.clone();
        let mut next = (*previous).clone();
        let mut stages = Vec::new();
        tracing::debug!(?request, state = %workspace.state(), "Reloading configuration");

        if let Some(memory) = request.memory.clone() {
            next = next.with_memory(memory.clone());
            stages.push(Stage::new(ConfigurationTarget::Memory, Some(memory), &next));
        }

        if request.user {
            let local = self.loader.load_settings(&self.user_settings).await;
            let remote = match self.remote.settings_path() {
                Some(path) => self.loader.load_settings(&path).await,
                None => ConfigurationModel::empty(),
            };
            next = next.with_user_local(local.clone()).with_user_remote(remote);
            stages.push(Stage::new(ConfigurationTarget::User, Some(local), &next));
        }

        let mut reloaded_folders: Vec<WorkspaceFolder> = Vec::new();
        match workspace.state() {
            WorkbenchState::Workspace => {
                if request.workspace
                    && let Some(location) = workspace.configuration().cloned()
                {
                    let (definition, model) = self.loader.load_workspace(&location, identity).await;
                    next = next.with_workspace(model.clone());
                    stages.push(Stage::new(ConfigurationTarget::Workspace, Some(model), &next));
                    workspace.set_folders(definition.folders);
                }

                let mut folders = Vec::with_capacity(workspace.folders().len());
                let mut source_config = None;
                for folder in workspace.folders() {
                    let model = match previous.folder_model(&folder.uri) {
                        Some(model) if !request.wants_folder(&folder.uri, identity) => model.clone(),
                        _ => {
                            let model = self.loader.load_folder(folder).await;
                            reloaded_folders.push(folder.clone());
                            source_config = Some(model.clone());
                            model
                        }
                    };
                    folders.push(FolderConfiguration {
                        folder: folder.clone(),
                        model,
                    });
                }
                if reloaded_folders.len() != 1 {
                    source_config = None;
                }
                if folders.as_slice() != next.folders() {
                    next = next.with_folders(folders);
                    stages.push(Stage::new(
                        ConfigurationTarget::WorkspaceFolder,
                        source_config,
                        &next,
                    ));
                }
            }
            WorkbenchState::Folder => {
                let wanted = request.workspace || request.all_folders || !request.folders.is_empty();
                if let Some(folder) = workspace.folders().first().filter(|_| wanted) {
                    // A single folder is both the workspace and its folder.
                    let model = self.loader.load_folder(folder).await;
                    reloaded_folders.push(folder.clone());
                    next = next.with_workspace(model.clone()).with_folders(vec![FolderConfiguration {
                        folder: folder.clone(),
                        model: model.clone(),
                    }]);
                    stages.push(Stage::new(ConfigurationTarget::Workspace, Some(model), &next));
                }
            }
            WorkbenchState::Empty => {}
        }

        let folders_event = diff_folders(old_workspace.folders(), workspace.folders(), identity);
        for removed in &folders_event.removed {
            self.loader.forget_folder(&removed.uri);
        }
        let workspace_changed = workspace != old_workspace;
        let events = self.commit(stages, workspace_changed.then(|| workspace.clone()));
        self.fire_configuration(events);
        if !folders_event.is_empty() {
            self.on_did_change_workspace_folders.fire(&folders_event);
        }

        self.update_cache(
            &workspace,
            &next,
            request.workspace,
            &reloaded_folders,
            &folders_event.removed,
        )
        .await;
        if self.options.watch_files {
            self.refresh_watches(&workspace, self.remote.settings_path().as_ref());
        }
        Ok(())
    }

    async fn update_cache(
        &self,
        workspace: &Workspace,
        configuration: &Configuration,
        workspace_reloaded: bool,
        folders: &[WorkspaceFolder],
        removed: &[WorkspaceFolder],
    ) {
        let authority = self.remote_authority();
        for folder in removed {
            if self.cache_enabled_for(&folder.uri) {
                let key = CacheKey::folder(workspace.id.clone(), folder.uri.clone(), authority.clone());
                self.remove_cached(&key).await;
            }
        }
        if workspace_reloaded
            && let Some(location) = workspace.configuration()
            && self.cache_enabled_for(location)
        {
            let key = CacheKey::workspace(workspace.id.clone(), authority.clone());
            self.write_cached(&key, configuration.workspace()).await;
        }
        for folder in folders {
            if !self.cache_enabled_for(&folder.uri) {
                continue;
            }
            if let Some(model) = configuration.folder_model(&folder.uri) {
                let key = CacheKey::folder(workspace.id.clone(), folder.uri.clone(), authority.clone());
                self.write_cached(&key, model).await;
            }
        }
    }

    async fn resolve_remote(self: &Arc<Self>) {
        if !self.remote.begin() {
            self.remote.wait_resolved().await;
            return;
        }
        let Some(agent) = self.remote_agent.clone() else {
            self.remote.finish(None);
            return;
        };
        let Some(environment) = agent.environment().await else {
            self.remote.finish(None);
            return;
        };

        let scheme = environment.settings_path.scheme().to_string();
        if let Some(provider) = agent.provider() {
            self.files.on_will_activate(scheme, move || provider);
        }

        let _gate = self.gate.lock().await;
        let model = self.loader.load_settings(&environment.settings_path).await;
        let (previous, workspace) = self.current();
        let next = (*previous).clone().with_user_remote(model.clone());
        let events = self.commit(
            vec![Stage::new(ConfigurationTarget::User, Some(model), &next)],
            None,
        );
        self.fire_configuration(events);
        if self.options.watch_files {
            self.refresh_watches(&workspace, Some(&environment.settings_path));
        }
        self.remote.finish(Some(environment));
    }

    async fn update_locked(
        self: &Arc<Self>,
        key: &str,
        value: Option<Value>,
        overrides: &ConfigurationOverrides,
        target: Option<ConfigurationTarget>,
    ) -> Result<()> {
        let (configuration, workspace) = self.current();
        let remote_path = self.remote.settings_path();
        let context = RoutingContext {
            configuration: &configuration,
            state: workspace.state(),
            remote_active: remote_path.is_some(),
        };
        let targets = editing::resolve_targets(&context, key, value.as_ref(), overrides, target)?;
        tracing::debug!(%key, ?targets, "Updating configuration");

        // Plan every write first so an invalid target file aborts the
        // update before anything is written.
        let mut planned = Vec::with_capacity(targets.len());
        let mut request = ReloadRequest::default();
        for target in targets {
            let write = match target {
                ConfigurationTarget::Memory => {
                    let model = edit_model(configuration.memory(), key, value.clone(), overrides);
                    request.memory = Some(model);
                    PlannedWrite::Nothing
                }
                ConfigurationTarget::UserLocal | ConfigurationTarget::User => {
                    request.user = true;
                    let path = JsonPath::for_setting(&[], key, overrides.override_identifier.as_deref());
                    self.plan_file_edit(&self.user_settings, EditLocation::Path(path), value.clone())
                        .await?
                }
                ConfigurationTarget::UserRemote => {
                    let Some(remote_path) = &remote_path else {
                        return Err(Error::editing(
                            EditingErrorCode::RemoteNotResolved,
                            "no remote settings are available",
                        ));
                    };
                    request.user = true;
                    let path = JsonPath::for_setting(&[], key, overrides.override_identifier.as_deref());
                    self.plan_file_edit(remote_path, EditLocation::Path(path), value.clone())
                        .await?
                }
                ConfigurationTarget::Workspace if workspace.state() == WorkbenchState::Workspace => {
                    let Some(location) = workspace.configuration() else {
                        return Err(Error::editing(
                            EditingErrorCode::NoWorkspaceOpened,
                            "the workspace has no definition file",
                        ));
                    };
                    request.workspace = true;
                    let path = match standalone_key_of(key) {
                        Some(_) => JsonPath::nested(&[], key),
                        None => JsonPath::for_setting(
                            &["settings"],
                            key,
                            overrides.override_identifier.as_deref(),
                        ),
                    };
                    self.plan_file_edit(location, EditLocation::Path(path), value.clone())
                        .await?
                }
                ConfigurationTarget::Workspace | ConfigurationTarget::WorkspaceFolder => {
                    let folder = if target == ConfigurationTarget::Workspace {
                        workspace.folders().first()
                    } else {
                        overrides
                            .resource
                            .as_ref()
                            .and_then(|resource| workspace.folder(resource, configuration.identity()))
                    };
                    let Some(folder) = folder else {
                        return Err(Error::editing(
                            EditingErrorCode::InvalidFolderTarget,
                            format!("no workspace folder to write {key} to"),
                        ));
                    };
                    request.folders.push(folder.uri.clone());
                    let (resource, location) = self.folder_edit_location(folder, key, overrides);
                    self.plan_file_edit(&resource, location, value.clone()).await?
                }
                ConfigurationTarget::Default => {
                    return Err(Error::editing(
                        EditingErrorCode::InvalidTarget,
                        "default values cannot be written",
                    ));
                }
            };
            planned.push(write);
        }

        for write in planned {
            match write {
                PlannedWrite::Put(resource, content) => {
                    tracing::debug!(resource = %resource, "Writing settings file");
                    self.files.write_file(&resource, content.as_bytes()).await?;
                }
                PlannedWrite::Delete(resource) => {
                    tracing::debug!(resource = %resource, "Deleting settings file");
                    self.files.delete(&resource).await?;
                }
                PlannedWrite::Nothing => {}
            }
        }

        self.reload_locked(request).await
    }

    /// File and location of `key` in `folder`'s settings.
    fn folder_edit_location(
        &self,
        folder: &WorkspaceFolder,
        key: &str,
        overrides: &ConfigurationOverrides,
    ) -> (Resource, EditLocation) {
        let dir = &self.options.folder_settings_dir;
        if let Some(standalone) = standalone_key_of(key)
            && let Some(file) = self.options.standalone_file(standalone)
        {
            let relative = key[standalone.len()..].trim_start_matches('.');
            let location = if relative.is_empty() {
                EditLocation::WholeFile
            } else {
                EditLocation::Path(JsonPath::nested(&[], relative))
            };
            return (folder.settings_resource(dir, file), location);
        }
        let path = JsonPath::for_setting(&[], key, overrides.override_identifier.as_deref());
        (
            folder.settings_resource(dir, &self.options.settings_file),
            EditLocation::Path(path),
        )
    }

    async fn plan_file_edit(
        &self,
        resource: &Resource,
        location: EditLocation,
        value: Option<Value>,
    ) -> Result<PlannedWrite> {
        let content = self.files.read_optional_string(resource).await?;
        match location {
            EditLocation::WholeFile => Ok(match value {
                Some(value) => {
                    let mut text = serde_json::to_string_pretty(&value)?;
                    text.push('\n');
                    PlannedWrite::Put(resource.clone(), text)
                }
                None if content.is_some() => PlannedWrite::Delete(resource.clone()),
                None => PlannedWrite::Nothing,
            }),
            EditLocation::Path(path) => {
                match editing::edit_document(resource.as_str(), content.as_deref(), &path, value)? {
                    Some(text) => Ok(PlannedWrite::Put(resource.clone(), text)),
                    None => Ok(PlannedWrite::Nothing),
                }
            }
        }
    }

    /// Persist a new folder list into the workspace file and reload.
    async fn edit_folders<F>(self: &Arc<Self>, edit: F) -> Result<()>
    where
        F: FnOnce(&[WorkspaceFolder]) -> Vec<WorkspaceFolder>,
    {
        let _gate = self.gate.lock().await;
        let (configuration, workspace) = self.current();
        let Some(location) = workspace
            .configuration()
            .filter(|_| workspace.state() == WorkbenchState::Workspace)
        else {
            return Err(Error::editing(
                EditingErrorCode::NotWorkspaceState,
                "folders can only be changed in a multi-root workspace",
            ));
        };
        let identity = configuration.identity();

        let mut folders = edit(workspace.folders());
        for (index, folder) in folders.iter_mut().enumerate() {
            folder.index = index;
        }
        if folders.as_slice() == workspace.folders() {
            tracing::debug!("Folder list unchanged");
            return Ok(());
        }

        let content = self
            .files
            .read_optional_string(location)
            .await?
            .unwrap_or_else(|| "{}".to_string());
        let definition = WorkspaceDefinition::parse(location, &content, identity).map_err(|e| {
            Error::editing(
                EditingErrorCode::InvalidConfiguration,
                format!("cannot update folders: {e}"),
            )
        })?;
        let mut text = serde_json::to_string_pretty(&definition.with_folders(location, &folders))?;
        text.push('\n');
        tracing::debug!(workspace = %location, folders = folders.len(), "Writing workspace folders");
        self.files.write_file(location, text.as_bytes()).await?;

        self.reload_locked(ReloadRequest {
            workspace: true,
            ..ReloadRequest::default()
        })
        .await
    }

    /// Settings files of `folder` that affect its model.
    fn folder_files(&self, folder: &WorkspaceFolder) -> Vec<Resource> {
        let dir = &self.options.folder_settings_dir;
        let mut files = vec![folder.settings_resource(dir, &self.options.settings_file)];
        files.extend(
            STANDALONE_KEYS
                .iter()
                .filter_map(|key| self.options.standalone_file(key))
                .map(|file| folder.settings_resource(dir, file)),
        );
        files
    }

    /// Watch exactly the files the current workspace depends on.
    fn refresh_watches(self: &Arc<Self>, workspace: &Workspace, remote: Option<&Resource>) {
        let mut wanted: HashSet<Resource> = HashSet::new();
        wanted.insert(self.user_settings.clone());
        wanted.extend(remote.cloned());
        wanted.extend(workspace.configuration().cloned());
        for folder in workspace.folders() {
            wanted.extend(self.folder_files(folder));
        }

        let (added, removed): (Vec<Resource>, Vec<Resource>) = {
            let mut watched = self.watched.lock().unwrap_or_else(PoisonError::into_inner);
            let added = wanted.difference(&watched).cloned().collect();
            let removed = watched.difference(&wanted).cloned().collect();
            *watched = wanted;
            (added, removed)
        };

        for resource in removed {
            self.files.unwatch(&resource);
        }
        for resource in added {
            self.ensure_forwarder(resource.scheme());
            if let Err(e) = self.files.watch(&resource) {
                tracing::warn!(resource = %resource, error = %e, "Failed to watch settings file");
            }
        }
    }

    fn ensure_forwarder(self: &Arc<Self>, scheme: &str) {
        let mut forwarders = self.forwarders.lock().unwrap_or_else(PoisonError::into_inner);
        if forwarders.contains_key(scheme) {
            return;
        }
        let receiver = match self.files.subscribe(scheme) {
            Ok(receiver) => receiver,
            Err(e) => {
                tracing::warn!(%scheme, error = %e, "Cannot listen for file changes");
                return;
            }
        };
        tracing::debug!(%scheme, "Forwarding file changes");
        let handle = tokio::spawn(forward_changes(Arc::downgrade(self), receiver));
        forwarders.insert(scheme.to_string(), handle);
    }

    /// Sources affected by `changes`.
    fn request_for_changes(&self, changes: &[FileChange]) -> ReloadRequest {
        let (configuration, workspace) = self.current();
        let identity = configuration.identity();
        let remote = self.remote.settings_path();
        let mut request = ReloadRequest::default();
        for change in changes {
            let resource = &change.resource;
            if identity.is_equal(resource, &self.user_settings)
                || remote.as_ref().is_some_and(|path| identity.is_equal(resource, path))
            {
                request.user = true;
            } else if workspace
                .configuration()
                .is_some_and(|location| identity.is_equal(resource, location))
            {
                request.workspace = true;
            } else if let Some(folder) = workspace.folders().iter().find(|folder| {
                self.folder_files(folder)
                    .iter()
                    .any(|file| identity.is_equal(resource, file))
            }) && !request.folders.contains(&folder.uri)
            {
                request.folders.push(folder.uri.clone());
            }
        }
        request
    }
}

/// Drain a provider's change channel into reloads. Every notification
/// pending at once becomes one reload.
async fn forward_changes(inner: Weak<Inner>, mut receiver: broadcast::Receiver<FileChange>) {
    loop {
        let mut changes = Vec::new();
        let mut lagged = false;
        match receiver.recv().await {
            Ok(change) => changes.push(change),
            Err(RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "File change notifications lagged");
                lagged = true;
            }
            Err(RecvError::Closed) => break,
        }
        loop {
            match receiver.try_recv() {
                Ok(change) => changes.push(change),
                Err(TryRecvError::Lagged(_)) => lagged = true,
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }

        let Some(inner) = inner.upgrade() else {
            break;
        };
        let request = if lagged {
            ReloadRequest::full()
        } else {
            inner.request_for_changes(&changes)
        };
        if request.is_empty() {
            continue;
        }
        let _gate = inner.gate.lock().await;
        if let Err(e) = inner.reload_locked(request).await {
            tracing::warn!(error = %e, "Reload after file change failed");
        }
    }
}

/// Apply an update to an in-memory model.
fn edit_model(
    model: &ConfigurationModel,
    key: &str,
    value: Option<Value>,
    overrides: &ConfigurationOverrides,
) -> ConfigurationModel {
    match (overrides.override_identifier.as_deref(), value) {
        (Some(identifier), Some(value)) => model.set_override_value(identifier, key, value),
        (Some(identifier), None) => model.remove_override_value(identifier, key),
        (None, Some(value)) => model.set_value(key, value),
        (None, None) => model.remove_value(key),
    }
}
