//! # NAVIGo Service Worker
//!
//! The offline cache worker for NAVIGo: versioned Cache API storage, the
//! install → activate → fetch lifecycle, and URL-shape caching strategies.
//!
//! ## Features
//!
//! - **Registration**: install a worker for a scope, precache the manifest
//! - **Lifecycle**: install, activate, fetch interception
//! - **Cache API**: named versioned containers, atomic precache batches
//! - **Clients**: controlled pages, claimed on activation
//! - **Strategies**: network-first, cache-first, pass-through
//!
//! ## Architecture
//!
//! ```text
//! ServiceWorkerContainer
//!     ├── ServiceWorkerRegistration (per scope)
//!     │       ├── installing (ServiceWorker)
//!     │       ├── waiting (ServiceWorker)
//!     │       └── active (ServiceWorker)
//!     ├── CacheStorage
//!     │       └── Cache ("navigo-v1")
//!     │               └── Request URL → CacheEntry
//!     ├── Clients (controlled pages)
//!     └── RouteTable (predicate → strategy, first match wins)
//! ```

use hashbrown::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use navigo_net::Fetcher;

pub mod cache;
pub mod config;
pub mod strategy;

#[cfg(test)]
pub(crate) mod test_support;

pub use cache::{Cache, CacheEntry, CacheStorage};
pub use config::{SwConfig, DEFAULT_CACHE_NAME};
pub use strategy::{FetchEvent, FetchResponse, Route, RoutePredicate, RouteTable, Strategy};

// ==================== Errors ====================

/// Errors that can occur in cache worker operations.
#[derive(Error, Debug, Clone)]
pub enum SwError {
    #[error("Registration failed: {0}")]
    RegistrationFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("State error: {0}")]
    StateError(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

// ==================== Types ====================

/// Unique identifier for a service worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ServiceWorkerId(u64);

impl ServiceWorkerId {
    fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Service worker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceWorkerState {
    /// Initial state.
    #[default]
    Parsed,
    /// Installing (precache batch in flight).
    Installing,
    /// Installed but waiting for activation.
    Installed,
    /// Activating (stale-cache cleanup in flight).
    Activating,
    /// Active and controlling pages.
    Activated,
    /// Redundant (replaced or install failed).
    Redundant,
}

/// A service worker instance.
#[derive(Debug, Clone)]
pub struct ServiceWorker {
    /// Unique ID.
    pub id: ServiceWorkerId,

    /// Script URL.
    pub script_url: Url,

    /// Current state.
    pub state: ServiceWorkerState,

    /// Error message if install failed.
    pub error: Option<String>,

    /// Time of last state change.
    pub state_changed_at: Instant,
}

impl ServiceWorker {
    /// Create a new service worker.
    pub fn new(script_url: Url) -> Self {
        Self {
            id: ServiceWorkerId::new(),
            script_url,
            state: ServiceWorkerState::Parsed,
            error: None,
            state_changed_at: Instant::now(),
        }
    }

    /// Set state.
    pub fn set_state(&mut self, state: ServiceWorkerState) {
        self.state = state;
        self.state_changed_at = Instant::now();
    }

    /// Check if active.
    pub fn is_active(&self) -> bool {
        self.state == ServiceWorkerState::Activated
    }

    /// Check if redundant.
    pub fn is_redundant(&self) -> bool {
        self.state == ServiceWorkerState::Redundant
    }
}

// ==================== Registration ====================

/// A service worker registration: the three lifecycle slots for one scope.
#[derive(Debug, Default)]
pub struct ServiceWorkerRegistration {
    /// Scope path.
    pub scope: String,

    /// Installing worker.
    pub installing: Option<ServiceWorker>,

    /// Waiting worker (installed but not active).
    pub waiting: Option<ServiceWorker>,

    /// Active worker.
    pub active: Option<ServiceWorker>,
}

impl ServiceWorkerRegistration {
    /// Create a new registration.
    pub fn new(scope: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            installing: None,
            waiting: None,
            active: None,
        }
    }

    /// Transition installing to waiting.
    pub fn install_complete(&mut self) {
        if let Some(mut worker) = self.installing.take() {
            worker.set_state(ServiceWorkerState::Installed);
            self.waiting = Some(worker);
        }
    }

    /// Activate the waiting worker, marking any previous active worker
    /// redundant.
    pub fn activate(&mut self) {
        if let Some(mut worker) = self.waiting.take() {
            worker.set_state(ServiceWorkerState::Activating);

            if let Some(mut old) = self.active.take() {
                old.set_state(ServiceWorkerState::Redundant);
            }

            worker.set_state(ServiceWorkerState::Activated);
            self.active = Some(worker);
        }
    }

    /// Skip the waiting phase (force activation).
    pub fn skip_waiting(&mut self) {
        self.activate();
    }

    /// Unregister: all slots become redundant.
    pub fn unregister(&mut self) {
        for slot in [&mut self.active, &mut self.waiting, &mut self.installing] {
            if let Some(mut worker) = slot.take() {
                worker.set_state(ServiceWorkerState::Redundant);
            }
        }
    }
}

// ==================== Clients ====================

/// A client: one controlled (or controllable) page.
#[derive(Debug, Clone)]
pub struct Client {
    /// Client ID.
    pub id: String,

    /// Page URL.
    pub url: Url,

    /// Worker controlling this client, if any.
    pub controller: Option<ServiceWorkerId>,
}

impl Client {
    /// Create an uncontrolled client.
    pub fn new(id: impl Into<String>, url: Url) -> Self {
        Self {
            id: id.into(),
            url,
            controller: None,
        }
    }
}

/// Registry of open page instances.
#[derive(Debug, Default)]
pub struct Clients {
    clients: HashMap<String, Client>,
}

impl Clients {
    /// Create a new registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a client.
    pub fn add(&mut self, client: Client) {
        self.clients.insert(client.id.clone(), client);
    }

    /// Get a client by ID.
    pub fn get(&self, id: &str) -> Option<&Client> {
        self.clients.get(id)
    }

    /// Remove a client.
    pub fn remove(&mut self, id: &str) -> Option<Client> {
        self.clients.remove(id)
    }

    /// Claim every client for the given worker immediately, not waiting
    /// for the next navigation. Returns the IDs whose controller changed.
    pub fn claim(&mut self, worker: ServiceWorkerId) -> Vec<String> {
        let mut changed = Vec::new();
        for client in self.clients.values_mut() {
            if client.controller != Some(worker) {
                client.controller = Some(worker);
                changed.push(client.id.clone());
            }
        }
        changed
    }

    /// Number of clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

// ==================== Events ====================

/// Lifecycle events emitted by the container.
#[derive(Debug, Clone)]
pub enum SwEvent {
    /// A worker changed state.
    StateChange {
        scope: String,
        worker_id: ServiceWorkerId,
        new_state: ServiceWorkerState,
    },
    /// A new worker version started installing.
    UpdateFound { scope: String },
    /// A client's controller changed (claim).
    ControllerChange { client_id: String },
}

// ==================== Container ====================

/// The cache worker container: registrations, caches, clients, and the
/// fetch-interception entry point.
pub struct ServiceWorkerContainer {
    /// Registrations by scope.
    registrations: Arc<RwLock<HashMap<String, ServiceWorkerRegistration>>>,

    /// Cache storage.
    pub caches: Arc<RwLock<CacheStorage>>,

    /// Controlled pages.
    pub clients: Arc<RwLock<Clients>>,

    /// The fetch seam: precache and strategy traffic goes through here.
    fetcher: Arc<dyn Fetcher>,

    /// Injected configuration (cache version, scope, manifest).
    config: SwConfig,

    /// Origin the worker serves; requests elsewhere pass through.
    origin: Url,

    /// Decision table for fetch interception.
    routes: RouteTable,

    /// Event sender for lifecycle changes.
    event_tx: mpsc::UnboundedSender<SwEvent>,
}

impl ServiceWorkerContainer {
    /// Create a new container for an origin.
    pub fn new(
        origin: Url,
        fetcher: Arc<dyn Fetcher>,
        config: SwConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SwEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let routes = RouteTable::for_config(&config);

        (
            Self {
                registrations: Arc::new(RwLock::new(HashMap::new())),
                caches: Arc::new(RwLock::new(CacheStorage::new())),
                clients: Arc::new(RwLock::new(Clients::new())),
                fetcher,
                config,
                origin,
                routes,
                event_tx,
            },
            event_rx,
        )
    }

    /// The active configuration.
    pub fn config(&self) -> &SwConfig {
        &self.config
    }

    /// Register the cache worker and run it through install and activation.
    ///
    /// Install opens the configured cache and precaches the manifest as one
    /// atomic batch. On success the worker skips waiting: stale cache
    /// containers are deleted and all clients are claimed immediately. On
    /// batch failure the new worker becomes redundant, the previous worker
    /// (if any) stays in control, and the error propagates to the caller.
    pub async fn register(&self) -> Result<ServiceWorkerId, SwError> {
        let script_url = self
            .origin
            .join(&self.config.script_path)
            .map_err(|e| SwError::RegistrationFailed(e.to_string()))?;

        info!(script = %script_url, scope = %self.config.scope, "Registering cache worker");

        let worker_id = {
            let mut registrations = self.registrations.write().await;
            let registration = registrations
                .entry(self.config.scope.clone())
                .or_insert_with(|| ServiceWorkerRegistration::new(self.config.scope.clone()));

            let mut worker = ServiceWorker::new(script_url);
            worker.set_state(ServiceWorkerState::Installing);
            let id = worker.id;
            registration.installing = Some(worker);
            id
        };

        let _ = self.event_tx.send(SwEvent::UpdateFound {
            scope: self.config.scope.clone(),
        });

        // Install: precache the manifest as one atomic batch.
        let precache_urls = self.resolve_precache_urls()?;
        let install_result = {
            let mut caches = self.caches.write().await;
            let cache = caches.open(&self.config.cache_name);
            cache.add_all(self.fetcher.as_ref(), &precache_urls).await
        };

        let mut registrations = self.registrations.write().await;
        let registration = registrations
            .get_mut(&self.config.scope)
            .ok_or_else(|| SwError::NotFound(self.config.scope.clone()))?;

        if let Err(err) = install_result {
            if let Some(mut worker) = registration.installing.take() {
                worker.set_state(ServiceWorkerState::Redundant);
                worker.error = Some(err.to_string());
                let _ = self.event_tx.send(SwEvent::StateChange {
                    scope: self.config.scope.clone(),
                    worker_id: worker.id,
                    new_state: ServiceWorkerState::Redundant,
                });
            }
            warn!(error = %err, "Install failed; previous worker (if any) stays in control");
            return Err(err);
        }

        // Skip waiting: take control promptly.
        registration.install_complete();
        registration.skip_waiting();
        drop(registrations);

        // Activate: delete every cache container whose name is not current.
        let mut caches = self.caches.write().await;
        let stale: Vec<String> = caches
            .keys()
            .iter()
            .filter(|name| **name != self.config.cache_name)
            .map(|name| name.to_string())
            .collect();
        for name in &stale {
            caches.delete(name);
            debug!(cache = %name, "Deleted stale cache");
        }
        drop(caches);

        // Claim all open pages immediately.
        let claimed = self.clients.write().await.claim(worker_id);
        for client_id in claimed {
            let _ = self.event_tx.send(SwEvent::ControllerChange { client_id });
        }

        let _ = self.event_tx.send(SwEvent::StateChange {
            scope: self.config.scope.clone(),
            worker_id,
            new_state: ServiceWorkerState::Activated,
        });

        info!(
            scope = %self.config.scope,
            cache = %self.config.cache_name,
            precached = precache_urls.len(),
            stale_removed = stale.len(),
            "Cache worker activated"
        );

        Ok(worker_id)
    }

    /// Handle one fetch event from a controlled page.
    ///
    /// `Ok(None)` means the worker does not handle the request and default
    /// platform behavior applies — either because no worker is active or
    /// because the pass-through row matched.
    pub async fn handle_fetch(&self, event: FetchEvent) -> Result<Option<FetchResponse>, SwError> {
        if self.active_worker(&self.config.scope).await.is_none() {
            return Ok(None);
        }

        let strategy = self.routes.decide(&event, &self.origin);
        strategy::run_strategy(
            strategy,
            &event,
            self.fetcher.as_ref(),
            &self.caches,
            &self.config.cache_name,
            &self.origin,
        )
        .await
    }

    /// Get the active worker ID for a scope, if any.
    pub async fn active_worker(&self, scope: &str) -> Option<ServiceWorkerId> {
        let registrations = self.registrations.read().await;
        registrations
            .get(scope)
            .and_then(|r| r.active.as_ref())
            .map(|w| w.id)
    }

    /// Get all registered scopes.
    pub async fn scopes(&self) -> Vec<String> {
        self.registrations.read().await.keys().cloned().collect()
    }

    /// Unregister the worker for a scope.
    pub async fn unregister(&self, scope: &str) -> Result<bool, SwError> {
        let mut registrations = self.registrations.write().await;
        if let Some(mut registration) = registrations.remove(scope) {
            registration.unregister();
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn resolve_precache_urls(&self) -> Result<Vec<Url>, SwError> {
        self.config
            .precache
            .iter()
            .map(|path| {
                self.origin
                    .join(path)
                    .map_err(|e| SwError::RegistrationFailed(format!("{}: {}", path, e)))
            })
            .collect()
    }
}
