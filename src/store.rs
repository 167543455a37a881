//! Page cache for moderation queues.
//!
//! Each [`QueryKey`] owns an entry holding the pages fetched so far, keyed by
//! page number so the flattened view never depends on response arrival
//! order. Every entry carries a generation counter: `invalidate` bumps it,
//! and any fetch that resolves under an older generation is dropped instead
//! of merged. The lock is only held between awaits, never across a request.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::client::QueueService;
use crate::error::QueueError;
use crate::model::QueuePage;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const DEFAULT_SORT: &str = "createdAt,asc";

/// Logical identity of a cached query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub name: String,
    pub page_size: u32,
    pub sort: String,
}

impl QueryKey {
    pub fn new(name: &str, page_size: u32, sort: &str) -> Self {
        Self {
            name: name.to_string(),
            page_size,
            sort: sort.to_string(),
        }
    }

    pub fn with_defaults(name: &str) -> Self {
        Self::new(name, DEFAULT_PAGE_SIZE, DEFAULT_SORT)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[size={},sort={}]", self.name, self.page_size, self.sort)
    }
}

/// Read-only snapshot of one cached query.
#[derive(Debug)]
pub struct QueryState<T> {
    /// Sorted by page number.
    pub pages: Vec<Arc<QueuePage<T>>>,
    pub is_fetching_first: bool,
    pub is_fetching_next: bool,
    /// Message of the most recent failed fetch, cleared by the next success.
    pub last_error: Option<String>,
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            pages: self.pages.clone(),
            is_fetching_first: self.is_fetching_first,
            is_fetching_next: self.is_fetching_next,
            last_error: self.last_error.clone(),
        }
    }
}

impl<T> QueryState<T> {
    /// Items of every page, concatenated in page order.
    pub fn items(&self) -> impl Iterator<Item = &T> {
        self.pages.iter().flat_map(|p| p.items.iter())
    }

    pub fn item_count(&self) -> usize {
        self.pages.iter().map(|p| p.items.len()).sum()
    }

    /// True when at least one page is loaded and the highest one is not last.
    pub fn has_next_page(&self) -> bool {
        self.pages.last().map(|p| !p.is_last).unwrap_or(false)
    }

    pub fn total_count(&self) -> Option<u64> {
        self.pages.last().map(|p| p.total_count)
    }
}

struct Entry<T> {
    pages: BTreeMap<u32, Arc<QueuePage<T>>>,
    generation: u64,
    fetching_first: bool,
    fetching_next: bool,
    last_error: Option<String>,
}

impl<T> Entry<T> {
    fn new(generation: u64) -> Self {
        Self {
            pages: BTreeMap::new(),
            generation,
            fetching_first: false,
            fetching_next: false,
            last_error: None,
        }
    }

    fn snapshot(&self) -> QueryState<T> {
        QueryState {
            pages: self.pages.values().cloned().collect(),
            is_fetching_first: self.fetching_first,
            is_fetching_next: self.fetching_next,
            last_error: self.last_error.clone(),
        }
    }

    /// Nothing cached, nothing in flight, and the last attempt failed.
    fn first_load_failed(&self) -> bool {
        self.pages.is_empty()
            && !self.fetching_first
            && !self.fetching_next
            && self.last_error.is_some()
    }

    /// Next page to request, or `None` when nothing should be fetched.
    fn next_page_number(&self) -> Option<u32> {
        if self.fetching_first || self.fetching_next {
            return None;
        }
        match self.pages.iter().next_back() {
            None => Some(0),
            Some((_, page)) if page.is_last => None,
            Some((number, _)) => Some(number + 1),
        }
    }

    /// Merge a page fetched under `generation`. Returns false when the
    /// result is stale and was dropped.
    fn accept(&mut self, generation: u64, page: QueuePage<T>) -> bool {
        if generation != self.generation {
            return false;
        }
        self.pages.insert(page.page_number, Arc::new(page));
        self.last_error = None;
        true
    }
}

/// Cache of paged query results in front of a [`QueueService`].
pub struct PageCacheStore<S: QueueService> {
    service: Arc<S>,
    entries: Mutex<HashMap<QueryKey, Entry<S::Item>>>,
    // Store-wide so an evicted and re-created key never reuses a generation.
    generations: AtomicU64,
}

impl<S: QueueService> fmt::Debug for PageCacheStore<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageCacheStore").finish_non_exhaustive()
    }
}

impl<S: QueueService> PageCacheStore<S> {
    pub fn new(service: Arc<S>) -> Self {
        Self {
            service,
            entries: Mutex::new(HashMap::new()),
            generations: AtomicU64::new(0),
        }
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn service(&self) -> &Arc<S> {
        &self.service
    }

    /// Current snapshot for `key`, if the key has been observed.
    pub async fn state(&self, key: &QueryKey) -> Option<QueryState<S::Item>> {
        self.entries.lock().await.get(key).map(Entry::snapshot)
    }

    /// Return the cached state for `key`, fetching page 0 the first time the
    /// key is observed. A key whose first load failed is fetched again.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn get_or_fetch(&self, key: &QueryKey) -> Result<QueryState<S::Item>, QueueError> {
        let generation = {
            let mut entries = self.entries.lock().await;
            match entries.get_mut(key) {
                Some(entry) if !entry.first_load_failed() => return Ok(entry.snapshot()),
                Some(entry) => {
                    debug!("retrying failed first load");
                    entry.generation = self.next_generation();
                    entry.fetching_first = true;
                    entry.generation
                }
                None => {
                    let mut entry = Entry::new(self.next_generation());
                    entry.fetching_first = true;
                    let generation = entry.generation;
                    entries.insert(key.clone(), entry);
                    generation
                }
            }
        };
        self.fetch_first(key, generation).await
    }

    /// Fetch the page after the highest cached one. Does nothing while a
    /// first or next fetch is in flight, or once the last page is known.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn fetch_next(&self, key: &QueryKey) -> Result<(), QueueError> {
        let (generation, page) = {
            let mut entries = self.entries.lock().await;
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| Entry::new(self.next_generation()));
            let Some(page) = entry.next_page_number() else {
                debug!("next page suppressed");
                return Ok(());
            };
            entry.fetching_next = true;
            (entry.generation, page)
        };

        let result = self
            .service
            .fetch_page(page, key.page_size, &key.sort)
            .await;

        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get_mut(key) else {
            debug!(page, "entry evicted while fetching; dropping page");
            return Ok(());
        };
        if entry.generation != generation {
            debug!(page, "stale page dropped after invalidate");
            return Ok(());
        }
        entry.fetching_next = false;
        match result {
            Ok(fetched) => {
                let items = fetched.items.len();
                entry.accept(generation, fetched);
                info!(page, items, "next page cached");
                Ok(())
            }
            Err(err) => {
                warn!(page, ?err, "next page fetch failed");
                entry.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Discard every cached page for `key` and refetch from page 0. Results of
    /// fetches started before this call are dropped when they resolve.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn invalidate(&self, key: &QueryKey) -> Result<QueryState<S::Item>, QueueError> {
        let generation = {
            let mut entries = self.entries.lock().await;
            let generation = self.next_generation();
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| Entry::new(generation));
            entry.generation = generation;
            entry.pages.clear();
            entry.fetching_next = false;
            entry.fetching_first = true;
            entry.generation
        };
        info!(generation, "query invalidated");
        self.fetch_first(key, generation).await
    }

    /// Forget `key` entirely. In-flight results for it are dropped.
    pub async fn evict(&self, key: &QueryKey) {
        if self.entries.lock().await.remove(key).is_some() {
            debug!(key = %key, "query evicted");
        }
    }

    async fn fetch_first(
        &self,
        key: &QueryKey,
        generation: u64,
    ) -> Result<QueryState<S::Item>, QueueError> {
        let result = self.service.fetch_page(0, key.page_size, &key.sort).await;

        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get_mut(key) else {
            debug!("entry evicted while fetching first page");
            return Ok(QueryState {
                pages: Vec::new(),
                is_fetching_first: false,
                is_fetching_next: false,
                last_error: None,
            });
        };
        if entry.generation != generation {
            debug!(generation, current = entry.generation, "stale first page dropped");
            return Ok(entry.snapshot());
        }
        entry.fetching_first = false;
        match result {
            Ok(page) => {
                let items = page.items.len();
                entry.accept(generation, page);
                info!(items, "first page cached");
                Ok(entry.snapshot())
            }
            Err(err) => {
                warn!(?err, "first page fetch failed");
                entry.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }
}
