#![allow(dead_code)]

use async_trait::async_trait;
use chirp_client::cache::{CacheEntry, QueryCache, Subscription};
use chirp_common::{
    error::ServiceError,
    memory::MemoryStore,
    model::{
        Id,
        author::{Author, AuthorMarker, Username},
        post::{Post, PostMarker, PostWithAuthor},
    },
    query::{QueryData, QueryKey},
    service::{QueryService, ReadProcedures, Result, SessionService},
};
use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::sync::{mpsc, oneshot};

/// A signed-in session over a [`MemoryStore`] whose requests can be counted,
/// held back and made to fail.
pub struct ScriptedService {
    pub store: Arc<MemoryStore>,
    session: SessionService<MemoryStore>,
    calls: Mutex<HashMap<QueryKey, usize>>,
    gates: Mutex<HashMap<QueryKey, VecDeque<oneshot::Receiver<()>>>>,
    read_failures: Mutex<HashMap<QueryKey, VecDeque<ServiceError>>>,
    create_failures: Mutex<VecDeque<ServiceError>>,
    create_gates: Mutex<VecDeque<oneshot::Receiver<()>>>,
}

impl ScriptedService {
    pub fn new(store: Arc<MemoryStore>, author: Option<Id<AuthorMarker>>) -> Arc<Self> {
        Arc::new(Self {
            session: SessionService::new(store.clone(), author),
            store,
            calls: Mutex::default(),
            gates: Mutex::default(),
            read_failures: Mutex::default(),
            create_failures: Mutex::default(),
            create_gates: Mutex::default(),
        })
    }

    /// Number of times the procedure behind `key` was run.
    pub fn calls(&self, key: &QueryKey) -> usize {
        self.calls.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    /// Holds the next request for `key` until the returned sender fires or
    /// is dropped. The response is computed after release.
    pub fn hold(&self, key: &QueryKey) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.gates
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_default()
            .push_back(rx);
        tx
    }

    /// Like [`hold`](Self::hold), for the next `create_post`.
    pub fn hold_create(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.create_gates.lock().unwrap().push_back(rx);
        tx
    }

    pub fn fail_next_read(&self, key: &QueryKey, err: ServiceError) {
        self.read_failures
            .lock()
            .unwrap()
            .entry(key.clone())
            .or_default()
            .push_back(err);
    }

    pub fn fail_next_create(&self, err: ServiceError) {
        self.create_failures.lock().unwrap().push_back(err);
    }
}

#[async_trait]
impl ReadProcedures for ScriptedService {
    async fn get_all_posts(&self) -> Result<Vec<PostWithAuthor>> {
        self.session.get_all_posts().await
    }

    async fn get_posts_by_user(&self, user_id: Id<AuthorMarker>) -> Result<Vec<PostWithAuthor>> {
        self.session.get_posts_by_user(user_id).await
    }

    async fn get_post_by_id(&self, post_id: Id<PostMarker>) -> Result<PostWithAuthor> {
        self.session.get_post_by_id(post_id).await
    }

    async fn get_user_by_username(&self, username: &Username) -> Result<Author> {
        self.session.get_user_by_username(username).await
    }

    async fn run(&self, key: &QueryKey) -> Result<QueryData> {
        *self.calls.lock().unwrap().entry(key.clone()).or_default() += 1;

        let gate = self
            .gates
            .lock()
            .unwrap()
            .get_mut(key)
            .and_then(VecDeque::pop_front);
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        let failure = self
            .read_failures
            .lock()
            .unwrap()
            .get_mut(key)
            .and_then(VecDeque::pop_front);
        if let Some(err) = failure {
            return Err(err);
        }

        self.session.run(key).await
    }
}

#[async_trait]
impl QueryService for ScriptedService {
    async fn create_post(&self, content: String) -> Result<Post> {
        let gate = self.create_gates.lock().unwrap().pop_front();
        if let Some(gate) = gate {
            let _ = gate.await;
        }

        let failure = self.create_failures.lock().unwrap().pop_front();
        if let Some(err) = failure {
            return Err(err);
        }

        self.session.create_post(content).await
    }
}

/// Subscribes to `key`, forwarding every notification into a channel.
pub fn watch(
    cache: &QueryCache,
    key: &QueryKey,
) -> (Subscription, mpsc::UnboundedReceiver<CacheEntry>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let subscription = cache.subscribe(key, move |entry| {
        let _ = tx.send(entry.clone());
    });
    (subscription, rx)
}

pub async fn next(rx: &mut mpsc::UnboundedReceiver<CacheEntry>) -> CacheEntry {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a notification")
        .expect("subscription closed")
}

/// Lets spawned requests run until nothing is left to do.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
