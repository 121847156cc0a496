//! Time-bounded cache of the selectable completion models.
//!
//! Each credential gets its own slot. A slot is served without network access
//! while younger than [`CACHE_TTL_SECS`]; freshness is evaluated lazily on each
//! call, there is no background timer. Failed fetches never evict a slot.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use proto::{CatalogError, ModelCatalogEntry};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::storage::KeyValueStore;

/// Cache validity window.
pub const CACHE_TTL_SECS: i64 = 5 * 60;
/// Storage key of the persisted catalog slot.
pub const CATALOG_STORAGE_KEY: &str = "catalog.models";

/// Remote source of model records.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_models(&self, api_key: &str) -> Result<Vec<ModelCatalogEntry>, CatalogError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Empty,
    Fetching,
    Fresh { fetched_at: DateTime<Utc> },
    Stale { fetched_at: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct CachedCatalog {
    fingerprint: String,
    fetched_at: DateTime<Utc>,
    entries: Vec<ModelCatalogEntry>,
}

impl CachedCatalog {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.fetched_at).num_seconds() < CACHE_TTL_SECS
    }
}

pub struct ModelCatalog {
    source: Arc<dyn CatalogSource>,
    store: Option<Arc<dyn KeyValueStore>>,
    slots: RwLock<HashMap<String, CachedCatalog>>,
    fetching: Mutex<HashSet<String>>,
    fetch_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ModelCatalog {
    pub fn new(source: Arc<dyn CatalogSource>) -> Self {
        Self {
            source,
            store: None,
            slots: RwLock::new(HashMap::new()),
            fetching: Mutex::new(HashSet::new()),
            fetch_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Persists fetched catalogs to `store`, seeding the cache from it.
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        if let Some(cached) = load_persisted(store.as_ref()) {
            debug!(
                entries = cached.entries.len(),
                fetched_at = %cached.fetched_at,
                "Catalog restored from storage"
            );
            self.slots
                .get_mut()
                .insert(cached.fingerprint.clone(), cached);
        }
        self.store = Some(store);
        self
    }

    /// Returns the models available to `api_key`, fetching when the slot is
    /// empty or stale.
    pub async fn get(&self, api_key: &str) -> Result<Vec<ModelCatalogEntry>, CatalogError> {
        self.load(api_key, Utc::now).await
    }

    /// Same as [`get`](Self::get) with the clock pinned at `now`, which is
    /// also stamped on a slot this call fetches.
    pub async fn get_at(
        &self,
        api_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<ModelCatalogEntry>, CatalogError> {
        self.load(api_key, || now).await
    }

    async fn load(
        &self,
        api_key: &str,
        clock: impl Fn() -> DateTime<Utc>,
    ) -> Result<Vec<ModelCatalogEntry>, CatalogError> {
        if api_key.trim().is_empty() {
            return Err(CatalogError::FetchFailed("API key is required".to_string()));
        }
        let fingerprint = fingerprint(api_key);

        if let Some(entries) = self.fresh_entries(&fingerprint, clock()) {
            debug!(entries = entries.len(), "Serving catalog from cache");
            return Ok(entries);
        }

        let lock = self.fetch_lock(&fingerprint);
        let _fetch = lock.lock().await;
        // Another caller may have refreshed the slot while we waited.
        if let Some(entries) = self.fresh_entries(&fingerprint, clock()) {
            return Ok(entries);
        }

        let result = {
            let _marker = FetchingMarker::new(&self.fetching, &fingerprint);
            self.source.fetch_models(api_key).await
        };

        match result {
            Ok(entries) => {
                let cached = CachedCatalog {
                    fingerprint: fingerprint.clone(),
                    fetched_at: clock(),
                    entries: entries.clone(),
                };
                self.persist(&cached);
                self.slots.write().insert(fingerprint, cached);
                info!(entries = entries.len(), "Model catalog synced");
                Ok(entries)
            }
            Err(err) => {
                warn!(error = %err, "Model catalog fetch failed");
                Err(err)
            }
        }
    }

    /// Fetch serialization is per credential; different keys never wait on
    /// each other.
    fn fetch_lock(&self, fingerprint: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.fetch_locks
            .lock()
            .entry(fingerprint.to_string())
            .or_default()
            .clone()
    }

    /// Looks up `model_id` in the cached catalog for `api_key`.
    ///
    /// Binding the choice to the credential context is left to the caller.
    pub fn select(&self, api_key: &str, model_id: &str) -> Option<ModelCatalogEntry> {
        if model_id.is_empty() {
            return None;
        }
        self.slots
            .read()
            .get(&fingerprint(api_key))?
            .entries
            .iter()
            .find(|entry| entry.id == model_id)
            .cloned()
    }

    /// Cached entries regardless of age.
    pub fn cached(&self, api_key: &str) -> Option<Vec<ModelCatalogEntry>> {
        self.slots
            .read()
            .get(&fingerprint(api_key))
            .map(|c| c.entries.clone())
    }

    pub fn slot_state(&self, api_key: &str, now: DateTime<Utc>) -> SlotState {
        let fingerprint = fingerprint(api_key);
        if self.fetching.lock().contains(&fingerprint) {
            return SlotState::Fetching;
        }
        match self.slots.read().get(&fingerprint) {
            None => SlotState::Empty,
            Some(c) if c.is_fresh(now) => SlotState::Fresh {
                fetched_at: c.fetched_at,
            },
            Some(c) => SlotState::Stale {
                fetched_at: c.fetched_at,
            },
        }
    }

    /// Drops the slot for `api_key`, forcing the next `get` to fetch.
    pub fn invalidate(&self, api_key: &str) {
        let fingerprint = fingerprint(api_key);
        if self.slots.write().remove(&fingerprint).is_some() {
            debug!("Catalog slot invalidated");
        }
        if let Some(store) = &self.store
            && load_persisted(store.as_ref()).is_some_and(|c| c.fingerprint == fingerprint)
            && let Err(e) = store.remove(CATALOG_STORAGE_KEY)
        {
            warn!(error = %e, "Failed to remove persisted catalog");
        }
    }

    pub fn invalidate_all(&self) {
        self.slots.write().clear();
        if let Some(store) = &self.store
            && let Err(e) = store.remove(CATALOG_STORAGE_KEY)
        {
            warn!(error = %e, "Failed to remove persisted catalog");
        }
    }

    fn fresh_entries(&self, fingerprint: &str, now: DateTime<Utc>) -> Option<Vec<ModelCatalogEntry>> {
        self.slots
            .read()
            .get(fingerprint)
            .filter(|c| c.is_fresh(now))
            .map(|c| c.entries.clone())
    }

    fn persist(&self, cached: &CachedCatalog) {
        let Some(store) = &self.store else {
            return;
        };
        let payload = match serde_json::to_string(cached) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to serialize catalog");
                return;
            }
        };
        if let Err(e) = store.set(CATALOG_STORAGE_KEY, &payload) {
            warn!(error = %e, "Failed to persist catalog");
        }
    }
}

/// Entries whose id or name contains `query` (case-insensitive), sorted by id.
pub fn filter_entries(entries: &[ModelCatalogEntry], query: &str) -> Vec<ModelCatalogEntry> {
    let mut result: Vec<ModelCatalogEntry> = entries
        .iter()
        .filter(|entry| matches_query(&entry.id, query) || matches_query(&entry.name, query))
        .cloned()
        .collect();

    result.sort_by(|a, b| a.id.cmp(&b.id));
    result
}

fn matches_query(haystack: &str, query: &str) -> bool {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return true;
    }
    haystack
        .to_ascii_lowercase()
        .contains(&trimmed.to_ascii_lowercase())
}

/// Short stable digest of a credential; the secret itself is never stored.
fn fingerprint(api_key: &str) -> String {
    let digest = Sha256::digest(api_key.as_bytes());
    hex::encode(&digest[..8])
}

fn load_persisted(store: &dyn KeyValueStore) -> Option<CachedCatalog> {
    let content = store.get(CATALOG_STORAGE_KEY)?;
    serde_json::from_str(&content).ok()
}

/// Marks a slot as fetching until dropped.
struct FetchingMarker<'a> {
    set: &'a Mutex<HashSet<String>>,
    key: String,
}

impl<'a> FetchingMarker<'a> {
    fn new(set: &'a Mutex<HashSet<String>>, key: &str) -> Self {
        set.lock().insert(key.to_string());
        Self {
            set,
            key: key.to_string(),
        }
    }
}

impl Drop for FetchingMarker<'_> {
    fn drop(&mut self) {
        self.set.lock().remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Duration;

    use super::*;
    use crate::storage::MemoryStore;

    struct CountingSource {
        calls: AtomicUsize,
        responses: Mutex<VecDeque<Result<Vec<ModelCatalogEntry>, CatalogError>>>,
        delay: Option<std::time::Duration>,
    }

    impl CountingSource {
        fn new(responses: Vec<Result<Vec<ModelCatalogEntry>, CatalogError>>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                responses: Mutex::new(VecDeque::from(responses)),
                delay: None,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl CatalogSource for CountingSource {
        async fn fetch_models(
            &self,
            _api_key: &str,
        ) -> Result<Vec<ModelCatalogEntry>, CatalogError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.responses
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(CatalogError::FetchFailed("no response left".into())))
        }
    }

    fn entry(id: &str) -> ModelCatalogEntry {
        ModelCatalogEntry {
            id: id.to_string(),
            name: id.to_uppercase(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn serves_cache_inside_window_and_refetches_after() {
        let source = CountingSource::new(vec![
            Ok(vec![entry("a"), entry("b")]),
            Ok(vec![entry("c")]),
        ]);
        let catalog = ModelCatalog::new(source.clone());
        let t0 = Utc::now();

        let first = catalog.get_at("key", t0).await.expect("first fetch");
        assert_eq!(first.len(), 2);
        assert_eq!(source.calls(), 1);

        let cached = catalog
            .get_at("key", t0 + Duration::seconds(299))
            .await
            .expect("cached");
        assert_eq!(cached, first);
        assert_eq!(source.calls(), 1);

        let refreshed = catalog
            .get_at("key", t0 + Duration::seconds(301))
            .await
            .expect("refetch");
        assert_eq!(refreshed, vec![entry("c")]);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn failed_fetch_keeps_previous_slot() {
        let source = CountingSource::new(vec![
            Ok(vec![entry("a")]),
            Err(CatalogError::FetchFailed("503".into())),
        ]);
        let catalog = ModelCatalog::new(source.clone());
        let t0 = Utc::now();
        catalog.get_at("key", t0).await.expect("first fetch");

        let later = t0 + Duration::seconds(CACHE_TTL_SECS + 10);
        let err = catalog.get_at("key", later).await.expect_err("fetch fails");
        assert_eq!(err, CatalogError::FetchFailed("503".into()));
        assert_eq!(catalog.cached("key"), Some(vec![entry("a")]));
        assert_eq!(
            catalog.slot_state("key", later),
            SlotState::Stale { fetched_at: t0 }
        );
    }

    #[tokio::test]
    async fn slots_are_scoped_per_credential() {
        let source = CountingSource::new(vec![Ok(vec![entry("a")]), Ok(vec![entry("b")])]);
        let catalog = ModelCatalog::new(source.clone());

        assert_eq!(catalog.get("key-1").await.expect("k1"), vec![entry("a")]);
        assert_eq!(catalog.get("key-2").await.expect("k2"), vec![entry("b")]);
        assert_eq!(catalog.get("key-1").await.expect("k1 cached"), vec![entry("a")]);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn empty_credential_fails_without_fetch() {
        let source = CountingSource::new(vec![]);
        let catalog = ModelCatalog::new(source.clone());
        let err = catalog.get("").await.expect_err("no key");
        assert!(err.to_string().contains("Failed to load models"));
        assert_eq!(source.calls(), 0);
    }

    #[tokio::test]
    async fn concurrent_gets_share_one_fetch() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            responses: Mutex::new(VecDeque::from(vec![Ok(vec![entry("a")])])),
            delay: Some(std::time::Duration::from_millis(50)),
        });
        let catalog = ModelCatalog::new(source.clone());

        let (a, b) = tokio::join!(catalog.get("key"), catalog.get("key"));
        assert_eq!(a.expect("a"), vec![entry("a")]);
        assert_eq!(b.expect("b"), vec![entry("a")]);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn fetched_slot_is_stamped_when_the_fetch_completes() {
        let source = Arc::new(CountingSource {
            calls: AtomicUsize::new(0),
            responses: Mutex::new(VecDeque::from(vec![Ok(vec![entry("a")])])),
            delay: Some(std::time::Duration::from_millis(50)),
        });
        let catalog = ModelCatalog::new(source);
        let before = Utc::now();
        catalog.get("key").await.expect("fetch");

        let SlotState::Fresh { fetched_at } = catalog.slot_state("key", Utc::now()) else {
            panic!("slot should be fresh");
        };
        assert!(fetched_at - before >= Duration::milliseconds(50));
    }

    /// Holds fetches for "slow" until released; answers every other key at once.
    struct HeldSource {
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl CatalogSource for HeldSource {
        async fn fetch_models(
            &self,
            api_key: &str,
        ) -> Result<Vec<ModelCatalogEntry>, CatalogError> {
            if api_key == "slow" {
                self.release.notified().await;
            }
            Ok(vec![entry(api_key)])
        }
    }

    #[tokio::test]
    async fn fetches_for_different_credentials_do_not_wait_on_each_other() {
        let source = Arc::new(HeldSource {
            release: tokio::sync::Notify::new(),
        });
        let catalog = ModelCatalog::new(source.clone());

        let (slow, fast) = tokio::join!(catalog.get("slow"), async {
            let fast = catalog.get("fast").await;
            source.release.notify_one();
            fast
        });
        assert_eq!(slow.expect("slow"), vec![entry("slow")]);
        assert_eq!(fast.expect("fast"), vec![entry("fast")]);
    }

    #[tokio::test]
    async fn select_ignores_empty_model_id() {
        let source = CountingSource::new(vec![Ok(vec![entry(""), entry("a")])]);
        let catalog = ModelCatalog::new(source);
        catalog.get("key").await.expect("fetch");
        assert_eq!(catalog.select("key", ""), None);
        assert_eq!(catalog.cached("key").map(|e| e.len()), Some(2));
    }

    #[tokio::test]
    async fn slot_state_walks_empty_fresh_stale() {
        let source = CountingSource::new(vec![Ok(vec![entry("a")])]);
        let catalog = ModelCatalog::new(source);
        let t0 = Utc::now();

        assert_eq!(catalog.slot_state("key", t0), SlotState::Empty);
        catalog.get_at("key", t0).await.expect("fetch");
        assert_eq!(
            catalog.slot_state("key", t0 + Duration::seconds(10)),
            SlotState::Fresh { fetched_at: t0 }
        );
        assert_eq!(
            catalog.slot_state("key", t0 + Duration::seconds(CACHE_TTL_SECS)),
            SlotState::Stale { fetched_at: t0 }
        );
    }

    #[tokio::test]
    async fn select_returns_cached_entry_only() {
        let source = CountingSource::new(vec![Ok(vec![entry("a"), entry("b")])]);
        let catalog = ModelCatalog::new(source);
        assert_eq!(catalog.select("key", "a"), None);

        catalog.get("key").await.expect("fetch");
        assert_eq!(catalog.select("key", "b"), Some(entry("b")));
        assert_eq!(catalog.select("key", "zzz"), None);
        assert_eq!(catalog.select("other-key", "a"), None);
    }

    #[tokio::test]
    async fn invalidate_forces_refetch() {
        let source = CountingSource::new(vec![Ok(vec![entry("a")]), Ok(vec![entry("b")])]);
        let catalog = ModelCatalog::new(source.clone());
        catalog.get("key").await.expect("fetch");

        catalog.invalidate("key");
        assert_eq!(catalog.cached("key"), None);
        assert_eq!(catalog.get("key").await.expect("refetch"), vec![entry("b")]);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn persisted_slot_survives_restart() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::default());
        let t0 = Utc::now();

        let first = ModelCatalog::new(CountingSource::new(vec![Ok(vec![entry("a")])]))
            .with_store(store.clone());
        first.get_at("key", t0).await.expect("fetch");
        let raw = store.get(CATALOG_STORAGE_KEY).expect("persisted");
        assert!(!raw.contains("\"key\""));

        let offline = CountingSource::new(vec![]);
        let second = ModelCatalog::new(offline.clone()).with_store(store.clone());
        let entries = second
            .get_at("key", t0 + Duration::seconds(60))
            .await
            .expect("served from restored slot");
        assert_eq!(entries, vec![entry("a")]);
        assert_eq!(offline.calls(), 0);

        second.invalidate_all();
        assert!(store.get(CATALOG_STORAGE_KEY).is_none());
    }

    #[test]
    fn filter_entries_matches_id_or_name_and_sorts() {
        let entries = vec![
            ModelCatalogEntry {
                id: "openai/gpt-4o".into(),
                name: "GPT-4o".into(),
                ..Default::default()
            },
            ModelCatalogEntry {
                id: "anthropic/claude-3.5-sonnet".into(),
                name: "Claude 3.5 Sonnet".into(),
                ..Default::default()
            },
        ];

        let all = filter_entries(&entries, "  ");
        assert_eq!(all[0].id, "anthropic/claude-3.5-sonnet");

        let by_name = filter_entries(&entries, "sonnet");
        assert_eq!(by_name.len(), 1);

        let by_id = filter_entries(&entries, "OPENAI");
        assert_eq!(by_id[0].id, "openai/gpt-4o");
    }
}
