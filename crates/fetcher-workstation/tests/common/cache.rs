//! In-memory cache store fake.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use fetcher_core::{
    Artifact, ArtifactMeta, CacheError, CacheKey, CacheStorePort, CacheTier, ItemMetadata,
    PersistenceTier, Provenance, ResourceFormat,
};
use tokio::sync::Notify;
use url::Url;

/// Cache backed by a `HashMap`, with switches for failure injection.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<CacheKey, (Artifact, PersistenceTier)>>,
    puts: AtomicUsize,
    removes: AtomicUsize,
    fail_puts: AtomicBool,
    fail_gets: AtomicBool,
    gated: AtomicBool,
    gate: Notify,
    puts_held: AtomicBool,
    put_gate: Notify,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lookups block until [`release`](Self::release) is called.
    pub fn gated() -> Self {
        let cache = Self::default();
        cache.gated.store(true, Ordering::SeqCst);
        cache
    }

    pub fn release(&self) {
        self.gated.store(false, Ordering::SeqCst);
        self.gate.notify_waiters();
        self.gate.notify_one();
    }

    /// Writes block until [`release_puts`](Self::release_puts) is called.
    /// They are counted before blocking.
    pub fn hold_puts(&self) {
        self.puts_held.store(true, Ordering::SeqCst);
    }

    pub fn release_puts(&self) {
        self.puts_held.store(false, Ordering::SeqCst);
        self.put_gate.notify_waiters();
        self.put_gate.notify_one();
    }

    pub fn fail_puts(&self) {
        self.fail_puts.store(true, Ordering::SeqCst);
    }

    pub fn fail_gets(&self) {
        self.fail_gets.store(true, Ordering::SeqCst);
    }

    /// Seed an entry as if an earlier fetch had stored it.
    pub fn seed(&self, format: ResourceFormat, url: &Url, payload: &'static [u8]) {
        let key = CacheKey::for_url(format, url);
        let meta = ArtifactMeta::describe(
            key.clone(),
            url.clone(),
            format,
            payload.len() as u64,
            ItemMetadata::new(),
        );
        let artifact = Artifact::new(meta, Bytes::from_static(payload), Provenance::Network);
        self.entries
            .lock()
            .unwrap()
            .insert(key, (artifact, PersistenceTier::Memory));
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn removes(&self) -> usize {
        self.removes.load(Ordering::SeqCst)
    }

    pub fn tier_of(&self, key: &CacheKey) -> Option<PersistenceTier> {
        self.entries.lock().unwrap().get(key).map(|(_, tier)| *tier)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }
}

#[async_trait]
impl CacheStorePort for MemoryCache {
    async fn exists(&self, key: &CacheKey) -> bool {
        self.entries.lock().unwrap().contains_key(key)
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<Artifact>, CacheError> {
        if self.gated.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(CacheError::other("index unreadable"));
        }
        Ok(self.entries.lock().unwrap().get(key).map(|(artifact, _)| {
            artifact.clone().with_provenance(Provenance::Cache {
                tier: CacheTier::Memory,
            })
        }))
    }

    async fn put(&self, artifact: Artifact, tier: PersistenceTier) -> Result<(), CacheError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.puts_held.load(Ordering::SeqCst) {
            self.put_gate.notified().await;
        }
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(CacheError::InsufficientStorage {
                message: "No space left on device".into(),
            });
        }
        self.entries
            .lock()
            .unwrap()
            .insert(artifact.key().clone(), (artifact, tier));
        Ok(())
    }

    async fn remove(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }
}
