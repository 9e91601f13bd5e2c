//! Session-wide store of query results.
//!
//! Each [`QueryKey`] owns one slot holding the latest [`CacheEntry`], the
//! subscribers watching it and the bookkeeping that keeps at most one request
//! per key in flight. Responses carry the sequence number of the request that
//! produced them and are only applied if that request is still the current
//! one, so a slow stale answer can never replace a newer one.
//!
//! Subscriber callbacks run synchronously in the call that changed the entry,
//! after the internal lock has been released, so a callback may freely call
//! back into the cache.

use crate::lock::mutex_lock;
use chirp_common::{
    error::{ErrorInfo, ServiceError},
    hydration::{DehydratedQuery, HydrationPayload},
    model::post::PostWithAuthor,
    query::{QueryData, QueryKey},
    service::ReadProcedures,
};
use std::{
    collections::HashMap,
    fmt::{Debug, Formatter},
    sync::{Arc, Mutex, MutexGuard, Weak},
};
use time::UtcDateTime;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

const SOURCE: &str = "cache";

pub type Callback = Arc<dyn Fn(&CacheEntry) + Send + Sync>;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub enum QueryStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

/// Snapshot of one cached query.
///
/// `Success` always comes with `data` and without `error`; `Error` always
/// comes with `error` and keeps whatever `data` was shown before. `Loading`
/// keeps the data but never an error.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct CacheEntry {
    pub key: QueryKey,
    pub status: QueryStatus,
    pub data: Option<Arc<QueryData>>,
    pub error: Option<ErrorInfo>,
    pub fetched_at: Option<UtcDateTime>,
    pub subscriber_count: usize,
}

impl CacheEntry {
    fn idle(key: QueryKey) -> Self {
        Self {
            key,
            status: QueryStatus::Idle,
            data: None,
            error: None,
            fetched_at: None,
            subscriber_count: 0,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == QueryStatus::Success
    }

    #[must_use]
    pub fn feed(&self) -> Option<&[PostWithAuthor]> {
        self.data.as_deref().and_then(QueryData::as_feed)
    }
}

struct Slot {
    entry: CacheEntry,
    subscribers: Vec<(u64, Callback)>,
    issued: u64,
    in_flight: Option<u64>,
    refetch_queued: bool,
}

impl Slot {
    fn new(key: QueryKey) -> Self {
        Self {
            entry: CacheEntry::idle(key),
            subscribers: Vec::new(),
            issued: 0,
            in_flight: None,
            refetch_queued: false,
        }
    }

    /// Never requested and never hydrated.
    fn is_pristine(&self) -> bool {
        self.issued == 0 && self.entry.status == QueryStatus::Idle
    }

    fn begin_request(&mut self) -> u64 {
        self.issued += 1;
        self.in_flight = Some(self.issued);
        self.entry.status = QueryStatus::Loading;
        self.entry.error = None;
        self.issued
    }

    fn apply_hydrated(&mut self, query: &DehydratedQuery) {
        self.entry.status = QueryStatus::Success;
        self.entry.data = Some(Arc::new(query.data.clone()));
        self.entry.error = None;
        self.entry.fetched_at = Some(query.fetched_at);
    }

    fn notification(&self) -> Notification {
        Notification {
            entry: self.entry.clone(),
            callbacks: self
                .subscribers
                .iter()
                .map(|(_, callback)| Arc::clone(callback))
                .collect(),
        }
    }
}

struct Notification {
    entry: CacheEntry,
    callbacks: Vec<Callback>,
}

impl Notification {
    fn deliver(self) {
        for callback in &self.callbacks {
            callback(&self.entry);
        }
    }
}

#[derive(Default)]
struct State {
    slots: HashMap<QueryKey, Slot>,
    next_subscriber: u64,
    torn_down: bool,
}

struct Shared {
    service: Arc<dyn ReadProcedures>,
    runtime: Handle,
    state: Mutex<State>,
}

impl Shared {
    fn lock(&self, op: &'static str) -> MutexGuard<'_, State> {
        mutex_lock(&self.state, SOURCE, op)
    }
}

/// Handle to the session's query cache. Clones share the same store.
#[derive(Clone)]
pub struct QueryCache {
    shared: Arc<Shared>,
}

impl Debug for QueryCache {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock("debug");
        f.debug_struct("QueryCache")
            .field("entries", &state.slots.len())
            .field("torn_down", &state.torn_down)
            .finish_non_exhaustive()
    }
}

impl QueryCache {
    /// Creates a cache whose requests run on the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// When called outside of a Tokio runtime.
    #[track_caller]
    pub fn new(service: Arc<dyn ReadProcedures>) -> Self {
        Self::with_runtime(service, Handle::current())
    }

    /// Creates a cache whose requests run on `runtime`, so it can be read
    /// from threads that are not part of any runtime.
    pub fn with_runtime(service: Arc<dyn ReadProcedures>, runtime: Handle) -> Self {
        Self {
            shared: Arc::new(Shared {
                service,
                runtime,
                state: Mutex::default(),
            }),
        }
    }

    /// Current entry for `key`, starting its request if nobody has yet.
    ///
    /// Never waits: the result arrives later through [`subscribe`](Self::subscribe).
    pub fn read(&self, key: &QueryKey) -> CacheEntry {
        let (entry, request) = {
            let mut state = self.shared.lock("read");
            if state.torn_down {
                warn!(%key, "Read after teardown");
                return CacheEntry::idle(key.clone());
            }

            let slot = state
                .slots
                .entry(key.clone())
                .or_insert_with(|| Slot::new(key.clone()));

            let request = (slot.entry.status == QueryStatus::Idle && slot.in_flight.is_none())
                .then(|| (slot.begin_request(), slot.notification()));

            (slot.entry.clone(), request)
        };

        if let Some((seq, notification)) = request {
            notification.deliver();
            self.spawn_request(key.clone(), seq);
        }

        entry
    }

    /// Current entry for `key` without starting anything.
    #[must_use]
    pub fn peek(&self, key: &QueryKey) -> Option<CacheEntry> {
        self.shared
            .lock("peek")
            .slots
            .get(key)
            .map(|slot| slot.entry.clone())
    }

    /// Calls `callback` with every new status or data of `key` until the
    /// returned handle is dropped.
    pub fn subscribe<F>(&self, key: &QueryKey, callback: F) -> Subscription
    where
        F: Fn(&CacheEntry) + Send + Sync + 'static,
    {
        let mut guard = self.shared.lock("subscribe");
        let state = &mut *guard;

        let id = state.next_subscriber;
        state.next_subscriber += 1;

        let slot = state
            .slots
            .entry(key.clone())
            .or_insert_with(|| Slot::new(key.clone()));
        slot.subscribers.push((id, Arc::new(callback)));
        slot.entry.subscriber_count = slot.subscribers.len();

        Subscription {
            shared: Arc::downgrade(&self.shared),
            key: key.clone(),
            id,
        }
    }

    pub fn invalidate(&self, key: &QueryKey) -> usize {
        self.invalidate_matching(|candidate| candidate == key)
    }

    /// Marks every requested or hydrated entry matching `predicate` as
    /// loading, keeping its data on display, and fetches it again.
    ///
    /// `predicate` runs without the cache locked and may read from it.
    /// Returns how many entries were invalidated.
    pub fn invalidate_matching<P>(&self, predicate: P) -> usize
    where
        P: Fn(&QueryKey) -> bool,
    {
        let keys: Vec<QueryKey> = self
            .shared
            .lock("invalidate")
            .slots
            .keys()
            .cloned()
            .collect();
        let matched: Vec<QueryKey> = keys.into_iter().filter(|key| predicate(key)).collect();

        let mut requests = Vec::new();
        let mut notifications = Vec::new();
        let mut invalidated = 0;

        {
            let mut state = self.shared.lock("invalidate");
            for key in matched {
                let Some(slot) = state.slots.get_mut(&key) else {
                    continue;
                };
                if slot.is_pristine() {
                    continue;
                }
                invalidated += 1;

                if slot.in_flight.is_some() {
                    debug!(%key, "Queueing refetch behind in-flight request");
                    slot.refetch_queued = true;
                } else {
                    let seq = slot.begin_request();
                    notifications.push(slot.notification());
                    requests.push((key, seq));
                }
            }
        }

        for notification in notifications {
            notification.deliver();
        }
        for (key, seq) in requests {
            self.spawn_request(key, seq);
        }

        invalidated
    }

    /// Seeds the cache with prefetched results without any request.
    ///
    /// Keys that were already requested keep their live state, so applying
    /// the same payload again changes nothing. Returns how many entries
    /// were written.
    pub fn hydrate(&self, payload: &HydrationPayload) -> usize {
        let mut notifications = Vec::new();
        let mut applied = 0;

        {
            let mut state = self.shared.lock("hydrate");
            if state.torn_down {
                warn!("Hydration after teardown");
                return 0;
            }

            for (key, query) in payload {
                let slot = state
                    .slots
                    .entry(key.clone())
                    .or_insert_with(|| Slot::new(key.clone()));

                if slot.is_pristine() {
                    slot.apply_hydrated(query);
                    applied += 1;
                    debug!(%key, "Hydrated entry");
                    if !slot.subscribers.is_empty() {
                        notifications.push(slot.notification());
                    }
                } else {
                    debug!(%key, status = ?slot.entry.status, "Discarding hydrated entry");
                }
            }
        }

        for notification in notifications {
            notification.deliver();
        }

        applied
    }

    /// Ends the session: drops every entry and subscriber. Responses still in
    /// flight are ignored when they arrive.
    pub fn teardown(&self) {
        let mut state = self.shared.lock("teardown");
        info!(entries = state.slots.len(), "Tearing down query cache");
        state.torn_down = true;
        state.slots.clear();
    }

    fn spawn_request(&self, key: QueryKey, seq: u64) {
        debug!(%key, seq, "Issuing request");

        let service = Arc::clone(&self.shared.service);
        let shared = Arc::downgrade(&self.shared);
        self.shared.runtime.spawn(async move {
            let result = service.run(&key).await;
            match shared.upgrade() {
                Some(shared) => QueryCache { shared }.complete(&key, seq, result),
                None => debug!(%key, seq, "Cache dropped before response arrived"),
            }
        });
    }

    fn complete(&self, key: &QueryKey, seq: u64, result: Result<QueryData, ServiceError>) {
        let (notification, refetch) = {
            let mut state = self.shared.lock("complete");
            if state.torn_down {
                debug!(%key, seq, "Ignoring response after teardown");
                return;
            }
            let Some(slot) = state.slots.get_mut(key) else {
                return;
            };
            if slot.in_flight != Some(seq) {
                debug!(%key, seq, in_flight = ?slot.in_flight, "Discarding stale response");
                return;
            }

            slot.in_flight = None;

            match result {
                Ok(data) => {
                    slot.entry.status = QueryStatus::Success;
                    slot.entry.data = Some(Arc::new(data));
                    slot.entry.error = None;
                    slot.entry.fetched_at = Some(UtcDateTime::now());
                    debug!(%key, seq, "Applied response");
                }
                Err(err) => {
                    debug!(%key, seq, error = %err, "Request failed");
                    slot.entry.status = QueryStatus::Error;
                    slot.entry.error = Some(ErrorInfo::from(&err));
                }
            }

            let refetch = std::mem::take(&mut slot.refetch_queued).then(|| slot.begin_request());
            (slot.notification(), refetch)
        };

        notification.deliver();
        if let Some(seq) = refetch {
            self.spawn_request(key.clone(), seq);
        }
    }
}

/// Registration of a subscriber callback. Dropping it unsubscribes.
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
    shared: Weak<Shared>,
    key: QueryKey,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Debug for Subscription {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let mut state = shared.lock("unsubscribe");
        if let Some(slot) = state.slots.get_mut(&self.key) {
            slot.subscribers.retain(|(id, _)| *id != self.id);
            slot.entry.subscriber_count = slot.subscribers.len();
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::cache::{QueryCache, QueryStatus};
    use chirp_common::{
        hydration::HydrationPayload, memory::MemoryStore, model::Id, query::QueryData,
        query::QueryKey,
    };
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };
    use time::macros::utc_datetime;

    fn hydrated_feed() -> HydrationPayload {
        let mut payload = HydrationPayload::new();
        payload.insert(
            QueryKey::AllPosts,
            QueryData::Feed(Vec::new()),
            utc_datetime!(2025-06-01 12:00),
        );
        payload
    }

    #[tokio::test]
    async fn subscriber_count_follows_handles() {
        let cache = QueryCache::new(Arc::new(MemoryStore::default()));

        let first = cache.subscribe(&QueryKey::AllPosts, |_| {});
        let second = cache.subscribe(&QueryKey::AllPosts, |_| {});
        assert_eq!(cache.peek(&QueryKey::AllPosts).unwrap().subscriber_count, 2);

        first.unsubscribe();
        assert_eq!(cache.peek(&QueryKey::AllPosts).unwrap().subscriber_count, 1);

        drop(second);
        let entry = cache.peek(&QueryKey::AllPosts).unwrap();
        assert_eq!(entry.subscriber_count, 0);
        assert_eq!(entry.status, QueryStatus::Idle);
    }

    #[tokio::test]
    async fn hydration_notifies_existing_subscribers() {
        let cache = QueryCache::new(Arc::new(MemoryStore::default()));
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let _subscription = cache.subscribe(&QueryKey::AllPosts, move |entry| {
            assert!(entry.is_success());
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(cache.hydrate(&hydrated_feed()), 1);
        assert_eq!(cache.hydrate(&hydrated_feed()), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_skips_untouched_entries() {
        let cache = QueryCache::new(Arc::new(MemoryStore::default()));
        let _subscription = cache.subscribe(&QueryKey::AllPosts, |_| {});

        assert_eq!(cache.invalidate(&QueryKey::AllPosts), 0);
        assert_eq!(
            cache.peek(&QueryKey::AllPosts).unwrap().status,
            QueryStatus::Idle
        );
    }

    #[tokio::test]
    async fn invalidation_predicate_may_read_the_cache() {
        let cache = QueryCache::new(Arc::new(MemoryStore::default()));
        cache.hydrate(&hydrated_feed());
        let _subscription = cache.subscribe(&QueryKey::PostById { post_id: Id::from(1) }, |_| {});

        let invalidated = cache.invalidate_matching(|key| {
            cache.peek(key).is_some_and(|entry| entry.is_success())
        });

        assert_eq!(invalidated, 1);
        assert_eq!(
            cache.peek(&QueryKey::AllPosts).unwrap().status,
            QueryStatus::Loading
        );
    }

    #[tokio::test]
    async fn only_the_request_in_flight_may_complete() {
        let cache = QueryCache::new(Arc::new(MemoryStore::default()));
        let key = QueryKey::AllPosts;
        cache.hydrate(&hydrated_feed());
        cache.invalidate(&key);

        cache.complete(&key, 7, Ok(QueryData::Feed(Vec::new())));
        assert_eq!(cache.peek(&key).unwrap().status, QueryStatus::Loading);

        cache.complete(&key, 1, Ok(QueryData::Feed(Vec::new())));
        let entry = cache.peek(&key).unwrap();
        assert!(entry.is_success());
        let fetched_at = entry.fetched_at;

        // Same request answering twice
        cache.complete(&key, 1, Ok(QueryData::Feed(Vec::new())));
        assert_eq!(cache.peek(&key).unwrap().fetched_at, fetched_at);
    }

    #[tokio::test]
    async fn teardown_forgets_everything() {
        let cache = QueryCache::new(Arc::new(MemoryStore::default()));
        cache.hydrate(&hydrated_feed());

        cache.teardown();

        assert!(cache.peek(&QueryKey::AllPosts).is_none());
        assert_eq!(cache.hydrate(&hydrated_feed()), 0);
        assert_eq!(cache.read(&QueryKey::AllPosts).status, QueryStatus::Idle);
    }

    #[test]
    fn reads_from_outside_the_runtime() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let cache = QueryCache::with_runtime(
            Arc::new(MemoryStore::default()),
            runtime.handle().clone(),
        );

        assert_eq!(cache.read(&QueryKey::AllPosts).status, QueryStatus::Loading);

        runtime.block_on(async {
            while !cache.peek(&QueryKey::AllPosts).unwrap().is_success() {
                tokio::task::yield_now().await;
            }
        });
        assert_eq!(cache.read(&QueryKey::AllPosts).feed(), Some(&[][..]));
    }
}
