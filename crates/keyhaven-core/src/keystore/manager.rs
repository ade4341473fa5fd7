//! Manager - the discovery driver and registry of live stores

use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex, RwLock};
use std::time::Duration;

use indexmap::IndexMap;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info};
use uuid::Uuid;

use crate::keystore::diagnostics::DiagnosticLog;
use crate::keystore::store::KeyStore;
use crate::provider::{ProviderEvent, StoreDescriptor, StoreProvider};

/// Messages flowing from stores and provider watchers to the driver task
#[derive(Debug)]
pub(crate) enum ControlMsg {
    /// A store reported its backend lost (timeout, lockout, vanished)
    StoreLost { id: String, instance: Uuid },
    /// A change pushed by a watching provider
    Provider { index: usize, event: ProviderEvent },
}

/// Event emitted by the manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEvent {
    /// A new live store was inserted into the registry. By the time this
    /// is observed, `key_store(id)` resolves the store.
    StoreAvailable {
        /// Identifier of the new store
        id: String,
    },
}

/// Tuning for discovery and provider calls
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// How often the driver re-runs discovery
    pub poll_interval: Duration,

    /// Upper bound on any single provider call. A discovery call that
    /// exceeds it is skipped for that pass; a store operation that
    /// exceeds it makes the store unavailable.
    pub provider_timeout: Duration,

    /// Capacity of every broadcast event channel
    pub event_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            provider_timeout: Duration::from_secs(5),
            event_capacity: 256,
        }
    }
}

struct ManagerInner {
    providers: Vec<Arc<dyn StoreProvider>>,
    registry: RwLock<IndexMap<String, Arc<KeyStore>>>,
    diagnostics: Arc<DiagnosticLog>,
    events: broadcast::Sender<ManagerEvent>,
    control_tx: mpsc::UnboundedSender<ControlMsg>,
    scan_lock: Mutex<()>,
    noted_collisions: StdMutex<HashSet<String>>,
    config: ManagerConfig,
}

impl ManagerInner {
    /// One full discovery pass over all providers. Serialized so an
    /// explicit `scan` never interleaves with the driver's poll.
    async fn scan_once(&self) {
        let _guard = self.scan_lock.lock().await;

        for (index, provider) in self.providers.iter().enumerate() {
            let descriptors =
                match timeout(self.config.provider_timeout, provider.discover()).await {
                    Ok(Ok(descriptors)) => descriptors,
                    Ok(Err(err)) => {
                        self.diagnostics.record(format!(
                            "provider '{}': discovery failed: {}",
                            provider.name(),
                            err
                        ));
                        continue;
                    }
                    Err(_) => {
                        self.diagnostics.record(format!(
                            "provider '{}': discovery timed out",
                            provider.name()
                        ));
                        continue;
                    }
                };
            self.reconcile(index, provider, &descriptors);
        }
    }

    /// Bring the registry in line with one provider's discovery snapshot.
    /// A provider whose discovery failed never reaches here, so its
    /// stores survive transient faults.
    fn reconcile(
        &self,
        index: usize,
        provider: &Arc<dyn StoreProvider>,
        descriptors: &[StoreDescriptor],
    ) {
        let reported: HashSet<&str> = descriptors.iter().map(|d| d.id.as_str()).collect();

        let stale: Vec<Arc<KeyStore>> = {
            let registry = self.registry.read().unwrap();
            registry
                .values()
                .filter(|store| {
                    store.provider_index() == index && !reported.contains(store.id())
                })
                .cloned()
                .collect()
        };

        // Unavailable reaches store subscribers before the id stops resolving
        for store in &stale {
            store.mark_unavailable();
        }
        if !stale.is_empty() {
            let mut registry = self.registry.write().unwrap();
            for store in &stale {
                let still_this_instance = registry
                    .get(store.id())
                    .map(|current| current.instance() == store.instance())
                    .unwrap_or(false);
                if still_this_instance {
                    registry.shift_remove(store.id());
                    info!("Store vanished: {}", store.id());
                }
            }
        }

        let mut registry = self.registry.write().unwrap();
        for descriptor in descriptors {
            if let Some(existing) = registry.get(&descriptor.id) {
                if existing.provider_index() != index {
                    self.note_collision(&descriptor.id, provider.name());
                }
                continue;
            }
            let store = Arc::new(KeyStore::new(
                descriptor.clone(),
                provider.clone(),
                index,
                self.control_tx.clone(),
                self.diagnostics.clone(),
                self.config.provider_timeout,
                self.config.event_capacity,
            ));
            registry.insert(descriptor.id.clone(), store);
            info!("Store available: {}", descriptor.id);
            // sent while the lock is held: no handle onto the new store
            // exists yet, so the announcement precedes any store event
            let _ = self.events.send(ManagerEvent::StoreAvailable {
                id: descriptor.id.clone(),
            });
        }
    }

    async fn handle_control(&self, msg: ControlMsg) {
        match msg {
            ControlMsg::StoreLost { id, instance } => {
                self.remove_if_instance(&id, instance);
            }
            ControlMsg::Provider { index, event } => match event {
                ProviderEvent::StoreChanged { id } => {
                    let store = self.registry.read().unwrap().get(&id).cloned();
                    if let Some(store) = store {
                        if store.provider_index() == index {
                            store.notify_updated();
                        }
                    }
                }
                ProviderEvent::StoreGone { id } => {
                    let store = self.registry.read().unwrap().get(&id).cloned();
                    if let Some(store) = store {
                        if store.provider_index() == index {
                            store.mark_unavailable();
                            self.remove_if_instance(&id, store.instance());
                        }
                    }
                }
                ProviderEvent::StoreAppeared { .. } => {
                    self.scan_once().await;
                }
            },
        }
    }

    /// Drop a store from the registry, but only while the id still names
    /// the same instance. A reused id never removes its successor.
    fn remove_if_instance(&self, id: &str, instance: Uuid) {
        let mut registry = self.registry.write().unwrap();
        let matches = registry
            .get(id)
            .map(|store| store.instance() == instance)
            .unwrap_or(false);
        if matches {
            registry.shift_remove(id);
            debug!("Store removed from registry: {}", id);
        }
    }

    fn note_collision(&self, id: &str, provider_name: &str) {
        let mut noted = self.noted_collisions.lock().unwrap();
        if noted.insert(id.to_string()) {
            self.diagnostics.record(format!(
                "provider '{}' reported duplicate store id '{}', keeping the first",
                provider_name, id
            ));
        }
    }
}

async fn drive(inner: Arc<ManagerInner>, mut control_rx: mpsc::UnboundedReceiver<ControlMsg>) {
    let mut poll = interval(inner.config.poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately, giving the initial pass
    loop {
        tokio::select! {
            _ = poll.tick() => {
                inner.scan_once().await;
            }
            msg = control_rx.recv() => {
                match msg {
                    Some(msg) => inner.handle_control(msg).await,
                    None => break,
                }
            }
        }
    }
}

/// Registry of currently known credential stores.
///
/// The manager drives the injected providers: an initial discovery pass
/// at construction, a poll every `poll_interval`, pushed provider events
/// and loss reports from stores in between. Stores enter the registry on
/// discovery (announced via `StoreAvailable`) and leave it when their
/// backend goes away (after that store emits `Unavailable`).
///
/// Every store handed out is live at the time of the call; a handle kept
/// across an `Unavailable` event stays safe to use but fails softly.
///
/// Must be created inside a tokio runtime. Dropping the manager stops
/// discovery; store handles already handed out remain valid.
pub struct KeyStoreManager {
    inner: Arc<ManagerInner>,
    driver: JoinHandle<()>,
    relays: Vec<JoinHandle<()>>,
}

impl KeyStoreManager {
    /// Create a manager over the given providers with default tuning
    pub fn new(providers: Vec<Arc<dyn StoreProvider>>) -> Self {
        Self::with_config(providers, ManagerConfig::default())
    }

    /// Create a manager with explicit tuning
    pub fn with_config(providers: Vec<Arc<dyn StoreProvider>>, config: ManagerConfig) -> Self {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (events, _) = broadcast::channel(config.event_capacity);

        let inner = Arc::new(ManagerInner {
            providers,
            registry: RwLock::new(IndexMap::new()),
            diagnostics: Arc::new(DiagnosticLog::new()),
            events,
            control_tx: control_tx.clone(),
            scan_lock: Mutex::new(()),
            noted_collisions: StdMutex::new(HashSet::new()),
            config,
        });

        let mut relays = Vec::new();
        for (index, provider) in inner.providers.iter().enumerate() {
            if let Some(mut pushed) = provider.events() {
                let control = control_tx.clone();
                relays.push(tokio::spawn(async move {
                    loop {
                        match pushed.recv().await {
                            Ok(event) => {
                                if control.send(ControlMsg::Provider { index, event }).is_err() {
                                    break;
                                }
                            }
                            Err(broadcast::error::RecvError::Lagged(_)) => continue,
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }));
            }
        }

        let driver = tokio::spawn(drive(inner.clone(), control_rx));

        Self {
            inner,
            driver,
            relays,
        }
    }

    /// Look up a live store by id. O(1); `None` when no live store has
    /// that id.
    pub fn key_store(&self, id: &str) -> Option<Arc<KeyStore>> {
        self.inner.registry.read().unwrap().get(id).cloned()
    }

    /// Snapshot of all live stores, in discovery order. Later registry
    /// changes do not affect the returned vector.
    pub fn key_stores(&self) -> Vec<Arc<KeyStore>> {
        self.inner
            .registry
            .read()
            .unwrap()
            .values()
            .cloned()
            .collect()
    }

    /// Number of live stores
    pub fn count(&self) -> usize {
        self.inner.registry.read().unwrap().len()
    }

    /// Accumulated diagnostic lines from discovery and store operations
    pub fn diagnostic_text(&self) -> String {
        self.inner.diagnostics.text()
    }

    /// Register for manager events
    pub fn subscribe(&self) -> broadcast::Receiver<ManagerEvent> {
        self.inner.events.subscribe()
    }

    /// Run a discovery pass now instead of waiting for the next poll
    pub async fn scan(&self) {
        self.inner.scan_once().await;
    }
}

impl Drop for KeyStoreManager {
    fn drop(&mut self) {
        self.driver.abort();
        for relay in &self.relays {
            relay.abort();
        }
    }
}
