//! Scheme routing file service
//!
//! Providers are registered per URI scheme. A scheme can instead get an
//! activator: a one-time setup closure that runs on the first access to that
//! scheme and produces the provider. The remote settings scheme is wired up
//! this way because its provider only makes sense once the remote
//! environment is known.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::broadcast;

use crate::provider::{FileChange, FileSystemProvider};
use crate::{Error, Resource, ResourceIdentity, Result};

type Activator = Box<dyn FnOnce() -> Arc<dyn FileSystemProvider> + Send>;

/// Routes file operations to the provider registered for a resource's scheme.
#[derive(Default)]
pub struct FileService {
    providers: RwLock<HashMap<String, Arc<dyn FileSystemProvider>>>,
    activators: Mutex<HashMap<String, Activator>>,
}

impl FileService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the provider for `scheme`.
    pub fn register_provider(&self, scheme: impl Into<String>, provider: Arc<dyn FileSystemProvider>) {
        let scheme = scheme.into();
        tracing::debug!(%scheme, "Registering file system provider");
        self.providers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(scheme, provider);
    }

    /// Defer provider creation for `scheme` until the first access.
    ///
    /// Ignored when a provider is already registered for the scheme.
    pub fn on_will_activate<F>(&self, scheme: impl Into<String>, activator: F)
    where
        F: FnOnce() -> Arc<dyn FileSystemProvider> + Send + 'static,
    {
        let scheme = scheme.into();
        if self.has_provider(&scheme) {
            return;
        }
        self.activators
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(scheme, Box::new(activator));
    }

    /// Whether a provider is registered, without triggering activation.
    pub fn has_provider(&self, scheme: &str) -> bool {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(scheme)
    }

    /// Whether the scheme can be served, either now or after activation.
    pub fn can_handle(&self, scheme: &str) -> bool {
        self.has_provider(scheme)
            || self
                .activators
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .contains_key(scheme)
    }

    /// Provider for `scheme`, running its activator on first use.
    pub fn activate(&self, scheme: &str) -> Result<Arc<dyn FileSystemProvider>> {
        if let Some(provider) = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(scheme)
        {
            return Ok(Arc::clone(provider));
        }

        // Held while the activator runs; concurrent first accesses wait here.
        let mut activators = self.activators.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(provider) = self
            .providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(scheme)
        {
            return Ok(Arc::clone(provider));
        }
        match activators.remove(scheme) {
            Some(activate) => {
                tracing::debug!(%scheme, "Activating file system provider");
                let provider = activate();
                self.providers
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(scheme.to_string(), Arc::clone(&provider));
                Ok(provider)
            }
            None => Err(Error::NoProvider {
                scheme: scheme.to_string(),
            }),
        }
    }

    pub async fn read_file(&self, resource: &Resource) -> Result<Vec<u8>> {
        self.activate(resource.scheme())?.read_file(resource).await
    }

    /// Read a UTF-8 file, `None` when it does not exist.
    pub async fn read_optional_string(&self, resource: &Resource) -> Result<Option<String>> {
        match self.read_file(resource).await {
            Ok(bytes) => String::from_utf8(bytes).map(Some).map_err(|_| Error::InvalidUtf8 {
                resource: resource.to_string(),
            }),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn write_file(&self, resource: &Resource, content: &[u8]) -> Result<()> {
        self.activate(resource.scheme())?
            .write_file(resource, content)
            .await
    }

    pub async fn delete(&self, resource: &Resource) -> Result<()> {
        self.activate(resource.scheme())?.delete(resource).await
    }

    pub async fn exists(&self, resource: &Resource) -> bool {
        match self.activate(resource.scheme()) {
            Ok(provider) => provider.exists(resource).await,
            Err(_) => false,
        }
    }

    pub fn watch(&self, resource: &Resource) -> Result<()> {
        self.activate(resource.scheme())?.watch(resource)
    }

    pub fn unwatch(&self, resource: &Resource) {
        if let Ok(provider) = self.activate(resource.scheme()) {
            provider.unwatch(resource);
        }
    }

    /// Change channel of the provider serving `scheme`.
    pub fn subscribe(&self, scheme: &str) -> Result<broadcast::Receiver<FileChange>> {
        Ok(self.activate(scheme)?.subscribe())
    }

    /// Identity rule for `resource`; case sensitive when no provider exists.
    pub fn identity(&self, resource: &Resource) -> ResourceIdentity {
        self.providers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(resource.scheme())
            .map(|provider| provider.identity())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryFileSystem;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn unknown_scheme_has_no_provider() {
        let service = FileService::new();
        let resource = Resource::parse("remote://host/settings.json").unwrap();
        assert!(matches!(
            service.read_file(&resource).await,
            Err(Error::NoProvider { .. })
        ));
    }

    #[tokio::test]
    async fn activator_runs_once_on_first_access() {
        let service = FileService::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        service.on_will_activate("remote", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Arc::new(InMemoryFileSystem::new()) as Arc<dyn FileSystemProvider>
        });

        assert!(!service.has_provider("remote"));
        assert!(service.can_handle("remote"));

        let resource = Resource::parse("remote://host/settings.json").unwrap();
        service.write_file(&resource, b"{}").await.unwrap();
        assert_eq!(service.read_file(&resource).await.unwrap(), b"{}");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(service.has_provider("remote"));
    }

    #[test]
    fn concurrent_first_access_shares_one_activation() {
        let service = Arc::new(FileService::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        service.on_will_activate("remote", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            Arc::new(InMemoryFileSystem::new()) as Arc<dyn FileSystemProvider>
        });

        let barrier = Arc::new(std::sync::Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let service = Arc::clone(&service);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    service.activate("remote")
                })
            })
            .collect();
        let providers: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap().unwrap())
            .collect();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(providers.iter().all(|p| Arc::ptr_eq(p, &providers[0])));
    }

    #[tokio::test]
    async fn invalid_utf8_is_an_error() {
        let service = FileService::new();
        let memory = Arc::new(InMemoryFileSystem::new());
        let resource = Resource::parse("memory:///settings.json").unwrap();
        memory.insert(&resource, vec![0x7b, 0xff, 0x7d]);
        service.register_provider("memory", memory);

        assert!(matches!(
            service.read_optional_string(&resource).await,
            Err(Error::InvalidUtf8 { .. })
        ));
    }

    #[tokio::test]
    async fn read_optional_string_maps_missing_to_none() {
        let service = FileService::new();
        service.register_provider("memory", Arc::new(InMemoryFileSystem::new()));
        let resource = Resource::parse("memory:///missing.json").unwrap();
        assert_eq!(service.read_optional_string(&resource).await.unwrap(), None);
    }
}
