//! File-backed application certificate cache
//!
//! One ApplicationCache store persisted as a JSON file in the user's data
//! directory. Only certificates and revocation lists are cached - secret
//! material never touches disk. The file is re-read on every enumeration,
//! so edits made by other processes are picked up without a push channel.

use std::path::PathBuf;

use async_trait::async_trait;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::credential::{Certificate, CredentialObject, Crl, Passphrase};
use crate::error::{ProviderError, ProviderResult};
use crate::keystore::StoreKind;
use crate::provider::traits::{RawEntry, StoreDescriptor, StoreProvider, UnlockOutcome};
use crate::provider::{entry_id, entry_name};

const STORE_ID: &str = "application:0";
const CACHE_VERSION: u32 = 1;

/// File format for the persisted cache
#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    version: u32,
    records: Vec<CacheRecord>,
}

impl CacheFile {
    fn empty() -> Self {
        Self {
            version: CACHE_VERSION,
            records: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheRecord {
    id: String,
    name: String,
    object: CacheObject,
}

/// The cacheable subset of credential objects
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CacheObject {
    Certificate(Certificate),
    RevocationList(Crl),
}

impl CacheObject {
    fn from_object(object: &CredentialObject) -> Option<Self> {
        match object {
            CredentialObject::Certificate(cert) => Some(CacheObject::Certificate(cert.clone())),
            CredentialObject::Revocation(crl) => Some(CacheObject::RevocationList(crl.clone())),
            _ => None,
        }
    }

    fn into_object(self) -> CredentialObject {
        match self {
            CacheObject::Certificate(cert) => CredentialObject::Certificate(cert),
            CacheObject::RevocationList(crl) => CredentialObject::Revocation(crl),
        }
    }
}

/// Persistent certificate cache provider
pub struct FileCacheProvider {
    cache_dir: PathBuf,
    /// Serializes read-modify-write cycles on the cache file
    mutations: Mutex<()>,
}

impl FileCacheProvider {
    /// Create a provider over the default per-user cache location
    pub fn new() -> ProviderResult<Self> {
        let cache_dir = Self::default_cache_dir()?;
        std::fs::create_dir_all(&cache_dir)?;

        debug!("Certificate cache initialized at: {:?}", cache_dir);

        Ok(Self {
            cache_dir,
            mutations: Mutex::new(()),
        })
    }

    /// Create with a custom cache directory (for testing)
    pub fn with_dir(cache_dir: PathBuf) -> ProviderResult<Self> {
        std::fs::create_dir_all(&cache_dir)?;

        Ok(Self {
            cache_dir,
            mutations: Mutex::new(()),
        })
    }

    fn default_cache_dir() -> ProviderResult<PathBuf> {
        ProjectDirs::from("org", "keyhaven", "keyhaven")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or_else(|| {
                ProviderError::Backend("could not determine data directory".to_string())
            })
    }

    fn file_path(&self) -> PathBuf {
        self.cache_dir.join("certificate_cache.json")
    }

    fn descriptor() -> StoreDescriptor {
        StoreDescriptor {
            id: STORE_ID.to_string(),
            name: "Application Certificate Cache".to_string(),
            kind: StoreKind::ApplicationCache,
            read_only: false,
        }
    }

    fn check_store(&self, store_id: &str) -> ProviderResult<()> {
        if store_id == STORE_ID {
            Ok(())
        } else {
            Err(ProviderError::Gone)
        }
    }

    async fn read_file(&self) -> ProviderResult<CacheFile> {
        let path = self.file_path();
        if !path.exists() {
            return Ok(CacheFile::empty());
        }

        let contents = tokio::fs::read_to_string(&path).await?;
        let file: CacheFile = serde_json::from_str(&contents)?;
        Ok(file)
    }

    async fn save_file(&self, file: &CacheFile) -> ProviderResult<()> {
        let contents = serde_json::to_string_pretty(file)?;
        let path = self.file_path();

        // Write atomically using a temp file
        let temp_path = path.with_extension("tmp");
        tokio::fs::write(&temp_path, &contents).await?;
        tokio::fs::rename(&temp_path, &path).await?;

        debug!("Saved {} cache records", file.records.len());
        Ok(())
    }
}

#[async_trait]
impl StoreProvider for FileCacheProvider {
    fn name(&self) -> &str {
        "file-cache"
    }

    async fn discover(&self) -> ProviderResult<Vec<StoreDescriptor>> {
        Ok(vec![Self::descriptor()])
    }

    async fn enumerate(&self, store_id: &str) -> ProviderResult<Vec<RawEntry>> {
        self.check_store(store_id)?;

        let file = self.read_file().await?;
        Ok(file
            .records
            .into_iter()
            .map(|record| RawEntry {
                id: record.id,
                name: record.name,
                object: record.object.into_object(),
            })
            .collect())
    }

    async fn write(&self, store_id: &str, object: CredentialObject) -> ProviderResult<RawEntry> {
        self.check_store(store_id)?;
        let cached = CacheObject::from_object(&object).ok_or(ProviderError::Unsupported)?;

        let _guard = self.mutations.lock().await;
        let mut file = self.read_file().await?;

        let record = CacheRecord {
            id: entry_id(&object),
            name: entry_name(&object),
            object: cached,
        };
        match file.records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => file.records.push(record.clone()),
        }
        self.save_file(&file).await?;

        Ok(RawEntry {
            id: record.id,
            name: record.name,
            object,
        })
    }

    async fn remove(&self, store_id: &str, entry_id: &str) -> ProviderResult<()> {
        self.check_store(store_id)?;

        let _guard = self.mutations.lock().await;
        let mut file = self.read_file().await?;

        let before = file.records.len();
        file.records.retain(|record| record.id != entry_id);
        if file.records.len() == before {
            return Err(ProviderError::EntryNotFound(entry_id.to_string()));
        }
        self.save_file(&file).await
    }

    async fn unlock(
        &self,
        store_id: &str,
        _passphrase: &Passphrase,
    ) -> ProviderResult<UnlockOutcome> {
        self.check_store(store_id)?;
        Ok(UnlockOutcome::Unlocked)
    }
}
