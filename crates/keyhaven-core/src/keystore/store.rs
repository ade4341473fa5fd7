//! Stores - live handles onto single credential backends

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tracing::debug;
use uuid::Uuid;

use crate::credential::{
    Certificate, CredentialObject, Crl, EntryKind, IdentityBundle, Passphrase, PgpKey,
};
use crate::error::ProviderError;
use crate::keystore::diagnostics::DiagnosticLog;
use crate::keystore::entry::StoreEntry;
use crate::keystore::manager::ControlMsg;
use crate::provider::{RawEntry, StoreDescriptor, StoreProvider, UnlockOutcome};

/// The class of backend a store represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    /// OS-level trusted certificate database
    SystemTrust,
    /// Per-user identity vault
    UserIdentity,
    /// Application-managed certificate cache
    ApplicationCache,
    /// Removable token or smart card
    SmartCard,
    /// PGP keyring
    PgpKeyring,
}

impl StoreKind {
    /// Whether stores of this kind hold trust-anchor certificates
    pub fn holds_trusted_certificates(&self) -> bool {
        matches!(self, StoreKind::SystemTrust | StoreKind::ApplicationCache)
    }

    /// Whether stores of this kind hold private identities
    pub fn holds_identities(&self) -> bool {
        matches!(
            self,
            StoreKind::UserIdentity | StoreKind::SmartCard | StoreKind::PgpKeyring
        )
    }

    /// Whether stores of this kind hold public PGP keys
    pub fn holds_pgp_public_keys(&self) -> bool {
        matches!(self, StoreKind::PgpKeyring)
    }

    /// Whether a store of this kind accepts writes of the given object kind
    pub fn accepts(&self, kind: EntryKind) -> bool {
        match self {
            StoreKind::SystemTrust | StoreKind::ApplicationCache => matches!(
                kind,
                EntryKind::Certificate | EntryKind::RevocationList
            ),
            StoreKind::UserIdentity | StoreKind::SmartCard => {
                matches!(kind, EntryKind::IdentityBundle)
            }
            StoreKind::PgpKeyring => {
                matches!(kind, EntryKind::PgpSecretKey | EntryKind::PgpPublicKey)
            }
        }
    }
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            StoreKind::SystemTrust => "system_trust",
            StoreKind::UserIdentity => "user_identity",
            StoreKind::ApplicationCache => "application_cache",
            StoreKind::SmartCard => "smart_card",
            StoreKind::PgpKeyring => "pgp_keyring",
        };
        write!(f, "{}", label)
    }
}

/// Event emitted by a single store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    /// The store's contents changed
    Updated,
    /// The backend vanished. Terminal - emitted at most once per store
    /// instance, after which every operation fails softly.
    Unavailable,
    /// The backend is locked; reads and writes will fail until a
    /// passphrase is accepted via `submit_passphrase`
    NeedPassphrase,
}

/// A live handle onto one credential backend.
///
/// Stores are created by the manager during discovery and shared as
/// `Arc<KeyStore>`. Operations never panic and never return errors: a
/// failed read yields an empty list, a failed write yields `false`, and
/// the cause travels through events and the manager's diagnostic text.
pub struct KeyStore {
    id: String,
    name: String,
    kind: StoreKind,
    read_only: bool,
    instance: Uuid,
    provider: Arc<dyn StoreProvider>,
    provider_index: usize,
    available: AtomicBool,
    events: broadcast::Sender<StoreEvent>,
    control: mpsc::UnboundedSender<ControlMsg>,
    diagnostics: Arc<DiagnosticLog>,
    provider_timeout: Duration,
}

impl KeyStore {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        descriptor: StoreDescriptor,
        provider: Arc<dyn StoreProvider>,
        provider_index: usize,
        control: mpsc::UnboundedSender<ControlMsg>,
        diagnostics: Arc<DiagnosticLog>,
        provider_timeout: Duration,
        event_capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(event_capacity);
        Self {
            id: descriptor.id,
            name: descriptor.name,
            kind: descriptor.kind,
            read_only: descriptor.read_only,
            instance: Uuid::new_v4(),
            provider,
            provider_index,
            available: AtomicBool::new(true),
            events,
            control,
            diagnostics,
            provider_timeout,
        }
    }

    /// Stable identifier for this store
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human readable name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The class of backend
    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    /// Whether writes and removals are refused
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether the backend is still present. Once false, stays false for
    /// this store instance.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Whether this store holds trust-anchor certificates
    pub fn holds_trusted_certificates(&self) -> bool {
        self.kind.holds_trusted_certificates()
    }

    /// Whether this store holds private identities
    pub fn holds_identities(&self) -> bool {
        self.kind.holds_identities()
    }

    /// Whether this store holds public PGP keys
    pub fn holds_pgp_public_keys(&self) -> bool {
        self.kind.holds_pgp_public_keys()
    }

    /// Register for this store's events
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    /// List the entries currently in the store.
    ///
    /// Queries the backend every call; entries come back in backend order.
    /// Returns an empty vector when the store is unavailable, locked, or
    /// the backend fails - the cause is reported through events and the
    /// diagnostic log.
    pub async fn entry_list(&self) -> Vec<StoreEntry> {
        if !self.is_available() {
            return Vec::new();
        }

        match timeout(self.provider_timeout, self.provider.enumerate(&self.id)).await {
            Ok(Ok(entries)) => entries.into_iter().map(StoreEntry::from_raw).collect(),
            Ok(Err(err)) => {
                self.note_failure("entry enumeration", err);
                Vec::new()
            }
            Err(_) => {
                self.report_lost("entry enumeration timed out");
                Vec::new()
            }
        }
    }

    /// Write an identity bundle. Returns false when the store is
    /// read-only, unavailable, does not hold identities, or the backend
    /// write fails.
    pub async fn write_identity(&self, bundle: &IdentityBundle) -> bool {
        self.write_object(CredentialObject::Identity(bundle.clone()))
            .await
            .is_some()
    }

    /// Write a certificate. Same failure contract as `write_identity`.
    pub async fn write_certificate(&self, certificate: &Certificate) -> bool {
        self.write_object(CredentialObject::Certificate(certificate.clone()))
            .await
            .is_some()
    }

    /// Write a revocation list. Same failure contract as `write_identity`.
    pub async fn write_crl(&self, crl: &Crl) -> bool {
        self.write_object(CredentialObject::Revocation(crl.clone()))
            .await
            .is_some()
    }

    /// Write a PGP key into a keyring.
    ///
    /// On success returns the key as now stored, which may differ from the
    /// input: importing over an existing key with the same id merges the
    /// two, keeping any secret material already present.
    pub async fn write_pgp_key(&self, key: &PgpKey) -> Option<PgpKey> {
        let raw = self
            .write_object(CredentialObject::from_pgp_key(key.clone()))
            .await?;
        match raw.object {
            CredentialObject::PgpSecret(stored) | CredentialObject::PgpPublic(stored) => {
                Some(stored)
            }
            _ => None,
        }
    }

    /// Remove an entry by id. Returns false when the store is read-only,
    /// unavailable, the entry does not exist, or the backend fails.
    pub async fn remove_entry(&self, entry_id: &str) -> bool {
        if self.read_only || !self.is_available() {
            debug!("Refusing removal on store: {}", self.id);
            return false;
        }

        match timeout(
            self.provider_timeout,
            self.provider.remove(&self.id, entry_id),
        )
        .await
        {
            Ok(Ok(())) => {
                self.notify_updated();
                true
            }
            Ok(Err(err)) => {
                self.note_failure("entry removal", err);
                false
            }
            Err(_) => {
                self.report_lost("entry removal timed out");
                false
            }
        }
    }

    /// Supply the passphrase a `NeedPassphrase` event asked for.
    ///
    /// The outcome arrives as events rather than a return value: success
    /// emits `Updated`, a rejected passphrase re-emits `NeedPassphrase`,
    /// and a lockout makes the store `Unavailable`. The secret is dropped
    /// (and zeroed) as soon as the provider call returns.
    pub async fn submit_passphrase(&self, passphrase: Passphrase) {
        if !self.is_available() {
            return;
        }

        let result = timeout(
            self.provider_timeout,
            self.provider.unlock(&self.id, &passphrase),
        )
        .await;
        drop(passphrase);

        match result {
            Ok(Ok(UnlockOutcome::Unlocked)) => {
                debug!("Store unlocked: {}", self.id);
                self.notify_updated();
            }
            Ok(Ok(UnlockOutcome::NeedsRetry)) => {
                let _ = self.events.send(StoreEvent::NeedPassphrase);
            }
            Ok(Ok(UnlockOutcome::LockedOut)) => {
                self.report_lost("too many failed unlock attempts");
            }
            Ok(Err(err)) => self.note_failure("unlock", err),
            Err(_) => self.report_lost("unlock timed out"),
        }
    }

    pub(crate) fn instance(&self) -> Uuid {
        self.instance
    }

    pub(crate) fn provider_index(&self) -> usize {
        self.provider_index
    }

    /// Emit `Updated` to subscribers
    pub(crate) fn notify_updated(&self) {
        let _ = self.events.send(StoreEvent::Updated);
    }

    /// Flip the availability flag and emit `Unavailable` exactly once
    pub(crate) fn mark_unavailable(&self) {
        if self.available.swap(false, Ordering::SeqCst) {
            let _ = self.events.send(StoreEvent::Unavailable);
        }
    }

    async fn write_object(&self, object: CredentialObject) -> Option<RawEntry> {
        if self.read_only || !self.is_available() || !self.kind.accepts(object.kind()) {
            debug!(
                "Refusing write of {} to store: {}",
                object.kind(),
                self.id
            );
            return None;
        }

        match timeout(self.provider_timeout, self.provider.write(&self.id, object)).await {
            Ok(Ok(raw)) => {
                self.notify_updated();
                Some(raw)
            }
            Ok(Err(err)) => {
                self.note_failure("write", err);
                None
            }
            Err(_) => {
                self.report_lost("write timed out");
                None
            }
        }
    }

    /// Map a provider error onto the soft-failure surface
    fn note_failure(&self, operation: &str, err: ProviderError) {
        match err {
            ProviderError::Locked => {
                let _ = self.events.send(StoreEvent::NeedPassphrase);
            }
            ProviderError::Gone => {
                self.report_lost("backend reported the store gone");
            }
            other => {
                self.diagnostics.record(format!(
                    "store '{}' ({}): {} failed: {}",
                    self.name, self.id, operation, other
                ));
            }
        }
    }

    /// Record the loss, emit `Unavailable` and ask the manager to drop
    /// this store from the registry
    fn report_lost(&self, reason: &str) {
        self.diagnostics
            .record(format!("store '{}' ({}) lost: {}", self.name, self.id, reason));
        self.mark_unavailable();
        let _ = self.control.send(ControlMsg::StoreLost {
            id: self.id.clone(),
            instance: self.instance,
        });
    }
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("read_only", &self.read_only)
            .field("available", &self.is_available())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::SecretMaterial;
    use crate::error::ProviderResult;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::Mutex;

    #[derive(Clone, Copy)]
    enum FailMode {
        None,
        Locked,
        Gone,
        Backend,
        Hang,
    }

    struct StubProvider {
        entries: Mutex<Vec<RawEntry>>,
        fail: Mutex<FailMode>,
        unlock_outcome: Mutex<UnlockOutcome>,
    }

    impl StubProvider {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                entries: Mutex::new(Vec::new()),
                fail: Mutex::new(FailMode::None),
                unlock_outcome: Mutex::new(UnlockOutcome::Unlocked),
            })
        }

        fn set_fail(&self, mode: FailMode) {
            *self.fail.lock().unwrap() = mode;
        }

        fn set_unlock_outcome(&self, outcome: UnlockOutcome) {
            *self.unlock_outcome.lock().unwrap() = outcome;
        }

        async fn gate(&self) -> ProviderResult<()> {
            let mode = *self.fail.lock().unwrap();
            match mode {
                FailMode::None => Ok(()),
                FailMode::Locked => Err(ProviderError::Locked),
                FailMode::Gone => Err(ProviderError::Gone),
                FailMode::Backend => Err(ProviderError::Backend("stub failure".to_string())),
                FailMode::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(())
                }
            }
        }
    }

    #[async_trait]
    impl StoreProvider for StubProvider {
        fn name(&self) -> &str {
            "stub"
        }

        async fn discover(&self) -> ProviderResult<Vec<StoreDescriptor>> {
            Ok(Vec::new())
        }

        async fn enumerate(&self, _store_id: &str) -> ProviderResult<Vec<RawEntry>> {
            self.gate().await?;
            Ok(self.entries.lock().unwrap().clone())
        }

        async fn write(
            &self,
            _store_id: &str,
            object: CredentialObject,
        ) -> ProviderResult<RawEntry> {
            self.gate().await?;
            let raw = RawEntry {
                id: format!("entry:{}", self.entries.lock().unwrap().len()),
                name: "written".to_string(),
                object,
            };
            self.entries.lock().unwrap().push(raw.clone());
            Ok(raw)
        }

        async fn remove(&self, _store_id: &str, entry_id: &str) -> ProviderResult<()> {
            self.gate().await?;
            let mut entries = self.entries.lock().unwrap();
            let before = entries.len();
            entries.retain(|entry| entry.id != entry_id);
            if entries.len() == before {
                return Err(ProviderError::EntryNotFound(entry_id.to_string()));
            }
            Ok(())
        }

        async fn unlock(
            &self,
            _store_id: &str,
            _passphrase: &Passphrase,
        ) -> ProviderResult<UnlockOutcome> {
            self.gate().await?;
            Ok(*self.unlock_outcome.lock().unwrap())
        }
    }

    struct Fixture {
        store: KeyStore,
        provider: Arc<StubProvider>,
        diagnostics: Arc<DiagnosticLog>,
        control_rx: mpsc::UnboundedReceiver<ControlMsg>,
    }

    fn fixture(kind: StoreKind, read_only: bool) -> Fixture {
        let provider = StubProvider::new();
        let diagnostics = Arc::new(DiagnosticLog::new());
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let store = KeyStore::new(
            StoreDescriptor {
                id: "stub:0".to_string(),
                name: "Stub Store".to_string(),
                kind,
                read_only,
            },
            provider.clone(),
            0,
            control_tx,
            diagnostics.clone(),
            Duration::from_millis(200),
            16,
        );
        Fixture {
            store,
            provider,
            diagnostics,
            control_rx,
        }
    }

    fn test_certificate() -> Certificate {
        let now = Utc::now();
        Certificate::new(
            "CN=example",
            "CN=Test Root",
            now,
            now + ChronoDuration::days(30),
            vec![0x30, 0x01],
        )
    }

    #[test]
    fn test_kind_capabilities() {
        assert!(StoreKind::SystemTrust.holds_trusted_certificates());
        assert!(!StoreKind::SystemTrust.holds_identities());
        assert!(StoreKind::SmartCard.holds_identities());
        assert!(StoreKind::PgpKeyring.holds_identities());
        assert!(StoreKind::PgpKeyring.holds_pgp_public_keys());
        assert!(!StoreKind::UserIdentity.holds_pgp_public_keys());
    }

    #[test]
    fn test_kind_accepts_table() {
        assert!(StoreKind::SystemTrust.accepts(EntryKind::Certificate));
        assert!(StoreKind::SystemTrust.accepts(EntryKind::RevocationList));
        assert!(!StoreKind::SystemTrust.accepts(EntryKind::IdentityBundle));
        assert!(StoreKind::UserIdentity.accepts(EntryKind::IdentityBundle));
        assert!(!StoreKind::UserIdentity.accepts(EntryKind::Certificate));
        assert!(StoreKind::PgpKeyring.accepts(EntryKind::PgpPublicKey));
        assert!(!StoreKind::PgpKeyring.accepts(EntryKind::Certificate));
    }

    #[tokio::test]
    async fn test_entry_list_preserves_backend_order() {
        let fx = fixture(StoreKind::ApplicationCache, false);
        assert!(fx.store.write_certificate(&test_certificate()).await);
        let mut second = test_certificate();
        second.subject = "CN=second".to_string();
        assert!(fx.store.write_certificate(&second).await);

        let entries = fx.store.entry_list().await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].certificate().unwrap().subject, "CN=example");
        assert_eq!(entries[1].certificate().unwrap().subject, "CN=second");
    }

    #[tokio::test]
    async fn test_write_emits_updated() {
        let fx = fixture(StoreKind::ApplicationCache, false);
        let mut events = fx.store.subscribe();

        assert!(fx.store.write_certificate(&test_certificate()).await);
        assert_eq!(events.try_recv(), Ok(StoreEvent::Updated));
    }

    #[tokio::test]
    async fn test_read_only_store_refuses_writes() {
        let fx = fixture(StoreKind::SystemTrust, true);
        assert!(!fx.store.write_certificate(&test_certificate()).await);
        assert!(!fx.store.remove_entry("entry:0").await);
        assert!(fx.provider.entries.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_kind_gate_refuses_foreign_objects() {
        let fx = fixture(StoreKind::UserIdentity, false);
        assert!(!fx.store.write_certificate(&test_certificate()).await);

        let bundle = IdentityBundle::new("id", vec![], SecretMaterial::new(vec![1]));
        assert!(fx.store.write_identity(&bundle).await);
    }

    #[tokio::test]
    async fn test_locked_store_emits_need_passphrase() {
        let fx = fixture(StoreKind::UserIdentity, false);
        let mut events = fx.store.subscribe();
        fx.provider.set_fail(FailMode::Locked);

        assert!(fx.store.entry_list().await.is_empty());
        assert_eq!(events.try_recv(), Ok(StoreEvent::NeedPassphrase));
        assert!(fx.store.is_available());
    }

    #[tokio::test]
    async fn test_gone_store_becomes_unavailable_once() {
        let mut fx = fixture(StoreKind::SmartCard, false);
        let mut events = fx.store.subscribe();
        fx.provider.set_fail(FailMode::Gone);

        assert!(fx.store.entry_list().await.is_empty());
        assert!(!fx.store.is_available());
        assert_eq!(events.try_recv(), Ok(StoreEvent::Unavailable));

        match fx.control_rx.try_recv() {
            Ok(ControlMsg::StoreLost { id, instance }) => {
                assert_eq!(id, "stub:0");
                assert_eq!(instance, fx.store.instance());
            }
            other => panic!("expected StoreLost, got {:?}", other),
        }

        // every later operation fails softly without touching the backend
        fx.provider.set_fail(FailMode::None);
        assert!(fx.store.entry_list().await.is_empty());
        assert!(!fx.store.write_certificate(&test_certificate()).await);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_backend_failure_lands_in_diagnostics() {
        let fx = fixture(StoreKind::ApplicationCache, false);
        fx.provider.set_fail(FailMode::Backend);

        assert!(!fx.store.write_certificate(&test_certificate()).await);
        assert!(fx.store.is_available());

        let text = fx.diagnostics.text();
        assert!(text.contains("stub:0"));
        assert!(text.contains("stub failure"));
    }

    #[tokio::test]
    async fn test_provider_timeout_loses_the_store() {
        let fx = fixture(StoreKind::SmartCard, false);
        let mut events = fx.store.subscribe();
        fx.provider.set_fail(FailMode::Hang);

        assert!(fx.store.entry_list().await.is_empty());
        assert!(!fx.store.is_available());
        assert_eq!(events.try_recv(), Ok(StoreEvent::Unavailable));
        assert!(fx.diagnostics.text().contains("timed out"));
    }

    #[tokio::test]
    async fn test_remove_missing_entry_returns_false() {
        let fx = fixture(StoreKind::ApplicationCache, false);
        assert!(!fx.store.remove_entry("no-such-entry").await);
        assert!(fx.diagnostics.text().contains("no-such-entry"));
    }

    #[tokio::test]
    async fn test_remove_existing_entry() {
        let fx = fixture(StoreKind::ApplicationCache, false);
        assert!(fx.store.write_certificate(&test_certificate()).await);

        let entries = fx.store.entry_list().await;
        assert!(fx.store.remove_entry(entries[0].id()).await);
        assert!(fx.store.entry_list().await.is_empty());
    }

    #[tokio::test]
    async fn test_write_pgp_key_returns_stored_key() {
        let fx = fixture(StoreKind::PgpKeyring, false);
        let key = PgpKey::public("AABBCCDD00112233", "Carol <carol@example.org>", vec![1]);

        let stored = fx.store.write_pgp_key(&key).await.unwrap();
        assert_eq!(stored.key_id, "AABBCCDD00112233");
    }

    #[tokio::test]
    async fn test_unlock_success_emits_updated() {
        let fx = fixture(StoreKind::UserIdentity, false);
        let mut events = fx.store.subscribe();
        fx.provider.set_unlock_outcome(UnlockOutcome::Unlocked);

        fx.store.submit_passphrase(Passphrase::from("sesame")).await;
        assert_eq!(events.try_recv(), Ok(StoreEvent::Updated));
    }

    #[tokio::test]
    async fn test_unlock_retry_reasks_for_passphrase() {
        let fx = fixture(StoreKind::UserIdentity, false);
        let mut events = fx.store.subscribe();
        fx.provider.set_unlock_outcome(UnlockOutcome::NeedsRetry);

        fx.store.submit_passphrase(Passphrase::from("wrong")).await;
        assert_eq!(events.try_recv(), Ok(StoreEvent::NeedPassphrase));
        assert!(fx.store.is_available());
    }

    #[tokio::test]
    async fn test_unlock_lockout_loses_the_store() {
        let fx = fixture(StoreKind::UserIdentity, false);
        let mut events = fx.store.subscribe();
        fx.provider.set_unlock_outcome(UnlockOutcome::LockedOut);

        fx.store.submit_passphrase(Passphrase::from("wrong")).await;
        assert_eq!(events.try_recv(), Ok(StoreEvent::Unavailable));
        assert!(!fx.store.is_available());
    }
}
