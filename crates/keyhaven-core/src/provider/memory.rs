//! Scriptable in-memory provider
//!
//! Backs tests and demos: stores can be added and removed at runtime
//! (simulating card insertion), locked behind a passphrase with bounded
//! retries, and given injectable faults. External mutations surface on
//! the push channel the way a watching backend would report them.

use std::sync::RwLock;

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::broadcast;
use tracing::debug;

use crate::credential::{CredentialObject, Passphrase};
use crate::error::{ProviderError, ProviderResult};
use crate::provider::traits::{
    ProviderEvent, RawEntry, StoreDescriptor, StoreProvider, UnlockOutcome,
};
use crate::provider::{entry_id, entry_name};

const PUSH_CAPACITY: usize = 64;

struct StoreLock {
    passphrase: String,
    attempts_left: u32,
}

struct MemoryStore {
    descriptor: StoreDescriptor,
    entries: IndexMap<String, RawEntry>,
    lock: Option<StoreLock>,
    fault: Option<String>,
}

impl MemoryStore {
    fn check_access(&self) -> ProviderResult<()> {
        if let Some(fault) = &self.fault {
            return Err(ProviderError::Backend(fault.clone()));
        }
        if self.lock.is_some() {
            return Err(ProviderError::Locked);
        }
        Ok(())
    }

    /// Insert or replace an entry. Imports over an existing PGP key merge
    /// with it instead of replacing it; the slot keeps its position.
    fn upsert(&mut self, object: CredentialObject) -> RawEntry {
        let object = match object {
            CredentialObject::PgpSecret(incoming) | CredentialObject::PgpPublic(incoming) => {
                let id = format!("pgp:{}", incoming.key_id);
                let merged = match self.entries.get(&id).map(|entry| &entry.object) {
                    Some(CredentialObject::PgpSecret(existing))
                    | Some(CredentialObject::PgpPublic(existing)) => {
                        existing.merged_with(&incoming)
                    }
                    _ => incoming,
                };
                CredentialObject::from_pgp_key(merged)
            }
            other => other,
        };

        let raw = RawEntry {
            id: entry_id(&object),
            name: entry_name(&object),
            object,
        };
        self.entries.insert(raw.id.clone(), raw.clone());
        raw
    }
}

#[derive(Default)]
struct MemoryState {
    stores: IndexMap<String, MemoryStore>,
}

/// In-memory store provider
pub struct MemoryProvider {
    state: RwLock<MemoryState>,
    push: broadcast::Sender<ProviderEvent>,
}

impl MemoryProvider {
    /// Create an empty provider
    pub fn new() -> Self {
        let (push, _) = broadcast::channel(PUSH_CAPACITY);
        Self {
            state: RwLock::new(MemoryState::default()),
            push,
        }
    }

    /// Add a store. Announced on the push channel as `StoreAppeared`.
    pub fn add_store(&self, descriptor: StoreDescriptor) {
        let id = descriptor.id.clone();
        self.state.write().unwrap().stores.insert(
            id.clone(),
            MemoryStore {
                descriptor,
                entries: IndexMap::new(),
                lock: None,
                fault: None,
            },
        );
        debug!("Memory store added: {}", id);
        let _ = self.push.send(ProviderEvent::StoreAppeared { id });
    }

    /// Add a store that requires a passphrase before any access. After
    /// `attempts` wrong passphrases the store locks out and withdraws
    /// itself.
    pub fn add_locked_store(&self, descriptor: StoreDescriptor, passphrase: &str, attempts: u32) {
        let id = descriptor.id.clone();
        self.state.write().unwrap().stores.insert(
            id.clone(),
            MemoryStore {
                descriptor,
                entries: IndexMap::new(),
                lock: Some(StoreLock {
                    passphrase: passphrase.to_string(),
                    attempts_left: attempts,
                }),
                fault: None,
            },
        );
        debug!("Locked memory store added: {}", id);
        let _ = self.push.send(ProviderEvent::StoreAppeared { id });
    }

    /// Remove a store, as if the backing device were pulled
    pub fn remove_store(&self, id: &str) {
        if self
            .state
            .write()
            .unwrap()
            .stores
            .shift_remove(id)
            .is_some()
        {
            debug!("Memory store removed: {}", id);
            let _ = self.push.send(ProviderEvent::StoreGone { id: id.to_string() });
        }
    }

    /// Mutate a store from outside the manager, as another process would.
    /// Returns the entry id, or `None` when the store does not exist.
    pub fn insert_entry(&self, store_id: &str, object: CredentialObject) -> Option<String> {
        let raw = {
            let mut state = self.state.write().unwrap();
            let store = state.stores.get_mut(store_id)?;
            store.upsert(object)
        };
        let _ = self.push.send(ProviderEvent::StoreChanged {
            id: store_id.to_string(),
        });
        Some(raw.id)
    }

    /// Inject (or clear) a backend fault on one store. While set, every
    /// access fails with a backend error carrying the given text.
    pub fn set_fault(&self, store_id: &str, fault: Option<&str>) {
        if let Some(store) = self.state.write().unwrap().stores.get_mut(store_id) {
            store.fault = fault.map(|text| text.to_string());
        }
    }
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreProvider for MemoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    async fn discover(&self) -> ProviderResult<Vec<StoreDescriptor>> {
        let state = self.state.read().unwrap();
        Ok(state
            .stores
            .values()
            .map(|store| store.descriptor.clone())
            .collect())
    }

    async fn enumerate(&self, store_id: &str) -> ProviderResult<Vec<RawEntry>> {
        let state = self.state.read().unwrap();
        let store = state.stores.get(store_id).ok_or(ProviderError::Gone)?;
        store.check_access()?;
        Ok(store.entries.values().cloned().collect())
    }

    async fn write(&self, store_id: &str, object: CredentialObject) -> ProviderResult<RawEntry> {
        let mut state = self.state.write().unwrap();
        let store = state.stores.get_mut(store_id).ok_or(ProviderError::Gone)?;
        store.check_access()?;
        if !store.descriptor.kind.accepts(object.kind()) {
            return Err(ProviderError::Unsupported);
        }
        Ok(store.upsert(object))
    }

    async fn remove(&self, store_id: &str, entry_id: &str) -> ProviderResult<()> {
        let mut state = self.state.write().unwrap();
        let store = state.stores.get_mut(store_id).ok_or(ProviderError::Gone)?;
        store.check_access()?;
        if store.entries.shift_remove(entry_id).is_none() {
            return Err(ProviderError::EntryNotFound(entry_id.to_string()));
        }
        Ok(())
    }

    async fn unlock(
        &self,
        store_id: &str,
        passphrase: &Passphrase,
    ) -> ProviderResult<UnlockOutcome> {
        let mut state = self.state.write().unwrap();
        let store = state.stores.get_mut(store_id).ok_or(ProviderError::Gone)?;
        if let Some(fault) = &store.fault {
            return Err(ProviderError::Backend(fault.clone()));
        }

        let outcome = match store.lock.as_mut() {
            None => UnlockOutcome::Unlocked,
            Some(lock) => {
                if lock.passphrase == passphrase.expose() {
                    UnlockOutcome::Unlocked
                } else {
                    lock.attempts_left = lock.attempts_left.saturating_sub(1);
                    if lock.attempts_left == 0 {
                        UnlockOutcome::LockedOut
                    } else {
                        UnlockOutcome::NeedsRetry
                    }
                }
            }
        };

        match outcome {
            UnlockOutcome::Unlocked => {
                store.lock = None;
            }
            UnlockOutcome::LockedOut => {
                state.stores.shift_remove(store_id);
                debug!("Memory store locked out: {}", store_id);
                let _ = self.push.send(ProviderEvent::StoreGone {
                    id: store_id.to_string(),
                });
            }
            UnlockOutcome::NeedsRetry => {}
        }
        Ok(outcome)
    }

    fn events(&self) -> Option<broadcast::Receiver<ProviderEvent>> {
        Some(self.push.subscribe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::{Certificate, IdentityBundle, PgpKey, SecretMaterial};
    use crate::keystore::StoreKind;
    use chrono::{Duration, Utc};

    fn descriptor(id: &str, kind: StoreKind) -> StoreDescriptor {
        StoreDescriptor {
            id: id.to_string(),
            name: format!("Store {}", id),
            kind,
            read_only: false,
        }
    }

    fn certificate(subject: &str) -> Certificate {
        let now = Utc::now();
        Certificate::new(
            subject,
            "CN=Test Root",
            now,
            now + Duration::days(30),
            subject.as_bytes().to_vec(),
        )
    }

    #[tokio::test]
    async fn test_discover_lists_stores_in_insertion_order() {
        let provider = MemoryProvider::new();
        provider.add_store(descriptor("b", StoreKind::SystemTrust));
        provider.add_store(descriptor("a", StoreKind::SmartCard));

        let found = provider.discover().await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, "b");
        assert_eq!(found[1].id, "a");
    }

    #[tokio::test]
    async fn test_write_and_enumerate_round_trip() {
        let provider = MemoryProvider::new();
        provider.add_store(descriptor("trust:0", StoreKind::SystemTrust));

        let written = provider
            .write(
                "trust:0",
                CredentialObject::Certificate(certificate("CN=one")),
            )
            .await
            .unwrap();

        let entries = provider.enumerate("trust:0").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, written.id);
        assert_eq!(entries[0].name, "CN=one");

        // ids are stable across enumerations
        let again = provider.enumerate("trust:0").await.unwrap();
        assert_eq!(again[0].id, written.id);
    }

    #[tokio::test]
    async fn test_kind_mismatch_is_unsupported() {
        let provider = MemoryProvider::new();
        provider.add_store(descriptor("card:0", StoreKind::SmartCard));

        let result = provider
            .write(
                "card:0",
                CredentialObject::Certificate(certificate("CN=nope")),
            )
            .await;
        assert!(matches!(result, Err(ProviderError::Unsupported)));
    }

    #[tokio::test]
    async fn test_unknown_store_is_gone() {
        let provider = MemoryProvider::new();
        assert!(matches!(
            provider.enumerate("nope").await,
            Err(ProviderError::Gone)
        ));
        assert!(matches!(
            provider.unlock("nope", &Passphrase::from("x")).await,
            Err(ProviderError::Gone)
        ));
    }

    #[tokio::test]
    async fn test_missing_entry_removal() {
        let provider = MemoryProvider::new();
        provider.add_store(descriptor("trust:0", StoreKind::SystemTrust));

        let result = provider.remove("trust:0", "cert:absent").await;
        assert!(matches!(result, Err(ProviderError::EntryNotFound(_))));
    }

    #[tokio::test]
    async fn test_locked_store_lifecycle() {
        let provider = MemoryProvider::new();
        provider.add_locked_store(descriptor("ring:0", StoreKind::PgpKeyring), "sesame", 3);

        assert!(matches!(
            provider.enumerate("ring:0").await,
            Err(ProviderError::Locked)
        ));

        let wrong = provider
            .unlock("ring:0", &Passphrase::from("guess"))
            .await
            .unwrap();
        assert_eq!(wrong, UnlockOutcome::NeedsRetry);

        let right = provider
            .unlock("ring:0", &Passphrase::from("sesame"))
            .await
            .unwrap();
        assert_eq!(right, UnlockOutcome::Unlocked);

        assert!(provider.enumerate("ring:0").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lockout_withdraws_the_store() {
        let provider = MemoryProvider::new();
        provider.add_locked_store(descriptor("card:0", StoreKind::SmartCard), "0000", 1);

        let outcome = provider
            .unlock("card:0", &Passphrase::from("9999"))
            .await
            .unwrap();
        assert_eq!(outcome, UnlockOutcome::LockedOut);

        assert!(provider.discover().await.unwrap().is_empty());
        assert!(matches!(
            provider.enumerate("card:0").await,
            Err(ProviderError::Gone)
        ));
    }

    #[tokio::test]
    async fn test_pgp_import_merges_by_key_id() {
        let provider = MemoryProvider::new();
        provider.add_store(descriptor("ring:0", StoreKind::PgpKeyring));

        let public = PgpKey::public("AABB00000001", "Dan <dan@example.org>", vec![1]);
        provider
            .write("ring:0", CredentialObject::PgpPublic(public))
            .await
            .unwrap();

        let secret = PgpKey::secret(
            "AABB00000001",
            "Dan <dan@example.org>",
            vec![1],
            SecretMaterial::new(vec![2; 4]),
        );
        let upgraded = provider
            .write("ring:0", CredentialObject::PgpSecret(secret))
            .await
            .unwrap();
        assert!(matches!(upgraded.object, CredentialObject::PgpSecret(_)));

        // a later public import must not downgrade the stored key
        let refresh = PgpKey::public("AABB00000001", "Dan <dan@example.org>", vec![1, 9]);
        let merged = provider
            .write("ring:0", CredentialObject::PgpPublic(refresh))
            .await
            .unwrap();
        match merged.object {
            CredentialObject::PgpSecret(key) => {
                assert_eq!(key.public_material, vec![1, 9]);
            }
            other => panic!("expected a secret key, got {:?}", other),
        }

        assert_eq!(provider.enumerate("ring:0").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let provider = MemoryProvider::new();
        provider.add_store(descriptor("trust:0", StoreKind::SystemTrust));
        provider.set_fault("trust:0", Some("disk on fire"));

        match provider.enumerate("trust:0").await {
            Err(ProviderError::Backend(text)) => assert_eq!(text, "disk on fire"),
            other => panic!("expected a backend error, got {:?}", other),
        }

        provider.set_fault("trust:0", None);
        assert!(provider.enumerate("trust:0").await.is_ok());
    }

    #[tokio::test]
    async fn test_push_events_for_scripted_mutations() {
        let provider = MemoryProvider::new();
        let mut events = provider.events().unwrap();

        provider.add_store(descriptor("trust:0", StoreKind::SystemTrust));
        assert!(matches!(
            events.try_recv(),
            Ok(ProviderEvent::StoreAppeared { id }) if id == "trust:0"
        ));

        provider.insert_entry(
            "trust:0",
            CredentialObject::Certificate(certificate("CN=pushed")),
        );
        assert!(matches!(
            events.try_recv(),
            Ok(ProviderEvent::StoreChanged { id }) if id == "trust:0"
        ));

        provider.remove_store("trust:0");
        assert!(matches!(
            events.try_recv(),
            Ok(ProviderEvent::StoreGone { id }) if id == "trust:0"
        ));
    }

    #[tokio::test]
    async fn test_identity_entries_key_on_leaf_fingerprint() {
        let provider = MemoryProvider::new();
        provider.add_store(descriptor("vault:0", StoreKind::UserIdentity));

        let leaf = certificate("CN=me");
        let bundle = IdentityBundle::new("me", vec![leaf.clone()], SecretMaterial::new(vec![3]));
        let written = provider
            .write("vault:0", CredentialObject::Identity(bundle))
            .await
            .unwrap();
        assert_eq!(written.id, format!("identity:{}", leaf.fingerprint()));
        assert_eq!(written.name, "me");
    }
}
