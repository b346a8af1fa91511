//! Registry of coordinators keyed by provider type
//!
//! Owned by the application context. Each provider type gets at most one
//! coordinator, created on first use.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::coordinator::{CoordError, Coordinator, CoordinatorConfig, CoordinatorHandle};
use crate::provider::InfoProvider;

/// Type-erased view of a registered coordinator handle
#[async_trait]
trait RegisteredCoordinator: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn name(&self) -> &'static str;
    async fn shutdown(&self) -> Result<(), CoordError>;
}

#[async_trait]
impl<P: InfoProvider> RegisteredCoordinator for CoordinatorHandle<P> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn name(&self) -> &'static str {
        CoordinatorHandle::name(self)
    }

    async fn shutdown(&self) -> Result<(), CoordError> {
        CoordinatorHandle::shutdown(self).await
    }
}

struct Entry {
    handle: Box<dyn RegisteredCoordinator>,
    task: Option<JoinHandle<()>>,
}

/// One coordinator per information type
pub struct Registry {
    config: CoordinatorConfig,
    entries: HashMap<TypeId, Entry>,
}

impl Registry {
    /// Create an empty registry; new coordinators use `config`
    pub fn new(config: CoordinatorConfig) -> Self {
        debug!(?config, "Registry::new: called");
        Self {
            config,
            entries: HashMap::new(),
        }
    }

    /// Handle for `P`, creating its coordinator with `P::default()` on first use
    pub fn get_or_create<P>(&mut self) -> CoordinatorHandle<P>
    where
        P: InfoProvider + Default,
    {
        self.get_or_create_with(P::default)
    }

    /// Handle for `P`, calling `factory` only if no coordinator exists yet
    pub fn get_or_create_with<P, F>(&mut self, factory: F) -> CoordinatorHandle<P>
    where
        P: InfoProvider,
        F: FnOnce() -> P,
    {
        debug!(provider = std::any::type_name::<P>(), "Registry::get_or_create_with: called");
        if let Some(handle) = self.get::<P>() {
            return handle;
        }

        let coordinator = Coordinator::new(self.config.clone(), factory());
        self.insert(coordinator)
    }

    /// Handle for `P` if a coordinator was already registered
    pub fn get<P: InfoProvider>(&self) -> Option<CoordinatorHandle<P>> {
        self.entries
            .get(&TypeId::of::<P>())
            .and_then(|entry| entry.handle.as_any().downcast_ref::<CoordinatorHandle<P>>())
            .cloned()
    }

    /// Install `coordinator` as the instance for `P`.
    ///
    /// Later `get_or_create` calls return this coordinator. A previous
    /// instance is shut down and its control task awaited first, so its
    /// outstanding handles report [`CoordError::ChannelClosed`].
    pub async fn set_for_testing<P: InfoProvider>(&mut self, coordinator: Coordinator<P>) -> CoordinatorHandle<P> {
        debug!(provider = std::any::type_name::<P>(), "Registry::set_for_testing: called");
        if let Some(existing) = self.entries.remove(&TypeId::of::<P>()) {
            warn!(provider = existing.handle.name(), "Replacing registered coordinator");
            Self::stop(existing).await;
        }
        self.insert(coordinator)
    }

    fn insert<P: InfoProvider>(&mut self, coordinator: Coordinator<P>) -> CoordinatorHandle<P> {
        let (handle, task) = coordinator.spawn();
        info!(provider = handle.name(), "Registered coordinator");
        self.entries.insert(
            TypeId::of::<P>(),
            Entry {
                handle: Box::new(handle.clone()),
                task: Some(task),
            },
        );
        handle
    }

    pub fn contains<P: InfoProvider>(&self) -> bool {
        self.entries.contains_key(&TypeId::of::<P>())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Shut down every coordinator and wait for its control task.
    ///
    /// Returns how many coordinators were stopped. The registry is empty
    /// afterwards.
    pub async fn shutdown_all(&mut self) -> usize {
        debug!(count = self.entries.len(), "Registry::shutdown_all: called");
        let mut stopped = 0;
        for (_, entry) in self.entries.drain() {
            Self::stop(entry).await;
            stopped += 1;
        }
        info!(stopped, "All coordinators stopped");
        stopped
    }

    async fn stop(entry: Entry) {
        let name = entry.handle.name();
        if let Err(e) = entry.handle.shutdown().await {
            debug!(provider = name, error = %e, "Coordinator already stopped");
        }
        if let Some(task) = entry.task {
            if let Err(e) = task.await {
                warn!(provider = name, error = %e, "Coordinator task failed");
            }
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(CoordinatorConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static CREATED: AtomicUsize = AtomicUsize::new(0);

    struct Uptime;

    impl Default for Uptime {
        fn default() -> Self {
            CREATED.fetch_add(1, Ordering::SeqCst);
            Self
        }
    }

    impl InfoProvider for Uptime {
        type Info = u64;

        fn query(&mut self, info: &mut u64) -> eyre::Result<()> {
            *info = 42;
            Ok(())
        }
    }

    struct Canned(u64);

    impl InfoProvider for Canned {
        type Info = u64;

        fn query(&mut self, info: &mut u64) -> eyre::Result<()> {
            *info = self.0;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_get_or_create_builds_once() {
        let mut registry = Registry::default();
        assert!(registry.is_empty());

        let first = registry.get_or_create::<Uptime>();
        let second = registry.get_or_create::<Uptime>();

        assert_eq!(CREATED.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 1);
        assert!(registry.contains::<Uptime>());
        assert_eq!(first.get().await.unwrap(), 42);
        assert_eq!(second.get().await.unwrap(), 42);

        assert_eq!(registry.shutdown_all().await, 1);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_factory_not_called_when_registered() {
        let mut registry = Registry::default();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            registry.get_or_create_with(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                Canned(1)
            });
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        registry.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_set_for_testing_is_observed() {
        let mut registry = Registry::default();
        registry
            .set_for_testing(Coordinator::new(CoordinatorConfig::default(), Canned(7)))
            .await;

        let handle = registry.get_or_create_with(|| Canned(1));
        assert_eq!(handle.get().await.unwrap(), 7);

        // Replacement wins for later lookups
        registry
            .set_for_testing(Coordinator::new(CoordinatorConfig::default(), Canned(9)))
            .await;
        let handle = registry.get::<Canned>().unwrap();
        assert_eq!(handle.get().await.unwrap(), 9);
        assert_eq!(registry.len(), 1);

        registry.shutdown_all().await;
    }

    #[tokio::test]
    async fn test_set_for_testing_stops_replaced_coordinator() {
        let mut registry = Registry::default();
        let old = registry
            .set_for_testing(Coordinator::new(CoordinatorConfig::default(), Canned(7)))
            .await;
        assert_eq!(old.get().await.unwrap(), 7);

        let new = registry
            .set_for_testing(Coordinator::new(CoordinatorConfig::default(), Canned(9)))
            .await;

        // Old control task has already exited
        assert!(old.is_closed());
        assert!(matches!(old.get().await, Err(CoordError::ChannelClosed)));
        assert_eq!(new.get().await.unwrap(), 9);

        assert_eq!(registry.shutdown_all().await, 1);
        assert!(new.is_closed());
    }

    #[test]
    fn test_get_unregistered_is_none() {
        let registry = Registry::default();
        assert!(registry.get::<Canned>().is_none());
        assert!(!registry.contains::<Canned>());
    }
}
