use super::entry::CacheEntry;
use super::key::QueryKey;
use super::options::QueryOptions;
use crate::error::ApiError;
use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Produces one request for a query
pub type QueryFn<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, ApiError>> + Send + Sync>;

/// Wrap an async closure as a [`QueryFn`]
pub fn query_fn<T, F, Fut>(f: F) -> QueryFn<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ApiError>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

type ErasedSlot = Arc<dyn Any + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-wide cache of polling queries, shared by cloning
#[derive(Clone)]
pub struct QueryClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    slots: Mutex<HashMap<QueryKey, ErasedSlot>>,
    foreground: AtomicBool,
    /// Polling loops watch this; it only goes false when background pausing is on
    polling_active: watch::Sender<bool>,
    pause_in_background: bool,
}

impl Default for QueryClient {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryClient {
    /// Client that pauses every polling loop while the app is backgrounded
    pub fn new() -> Self {
        Self::with_background_policy(true)
    }

    pub fn with_background_policy(pause_in_background: bool) -> Self {
        let (polling_active, _) = watch::channel(true);
        Self {
            inner: Arc::new(ClientInner {
                slots: Mutex::new(HashMap::new()),
                foreground: AtomicBool::new(true),
                polling_active,
                pause_in_background,
            }),
        }
    }

    /// Subscribe to a query, joining the existing entry if the key is already cached.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn subscribe<T>(
        &self,
        key: QueryKey,
        options: QueryOptions,
        fetcher: QueryFn<T>,
    ) -> Result<QueryHandle<T>, ApiError>
    where
        T: Send + Sync + 'static,
    {
        let mut slots = lock(&self.inner.slots);

        let slot = match slots.get(&key) {
            Some(existing) => {
                let slot = Arc::clone(existing)
                    .downcast::<QuerySlot<T>>()
                    .map_err(|_| {
                        ApiError::Validation(format!(
                            "query {} is already cached with a different value type",
                            key
                        ))
                    })?;
                debug!(key = %key, "Joining cached query");
                slot
            }
            None => {
                debug!(key = %key, "Creating query");
                let slot = Arc::new(QuerySlot::new(key.clone(), options.clone(), fetcher));
                slots.insert(key, Arc::clone(&slot) as ErasedSlot);
                slot
            }
        };

        slot.subscribers.fetch_add(1, Ordering::SeqCst);
        if options.enabled {
            slot.enabled.store(true, Ordering::SeqCst);
        }
        slot.ensure_polling(self.inner.polling_active.subscribe());

        Ok(QueryHandle {
            rx: slot.state.subscribe(),
            slot,
            client: Arc::clone(&self.inner),
        })
    }

    /// Current entry for a key without subscribing to it
    pub fn peek<T>(&self, key: &QueryKey) -> Option<CacheEntry<T>>
    where
        T: Send + Sync + 'static,
    {
        let slots = lock(&self.inner.slots);
        let slot = Arc::clone(slots.get(key)?).downcast::<QuerySlot<T>>().ok()?;
        let entry = slot.state.borrow().clone();
        Some(entry)
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        lock(&self.inner.slots).contains_key(key)
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.slots).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Report app foreground/background transitions
    pub fn set_foreground(&self, foreground: bool) {
        let was = self.inner.foreground.swap(foreground, Ordering::SeqCst);
        if was == foreground {
            return;
        }
        info!(foreground, "App visibility changed");

        if self.inner.pause_in_background {
            self.inner.polling_active.send_replace(foreground);
        }
    }

    pub fn is_foreground(&self) -> bool {
        self.inner.foreground.load(Ordering::SeqCst)
    }
}

impl ClientInner {
    /// Drop the slot if nobody subscribed since the unmount that armed this timer
    fn collect<T: Send + Sync + 'static>(&self, slot: &Arc<QuerySlot<T>>, unmount: u64) {
        let mut slots = lock(&self.slots);
        if slot.subscribers.load(Ordering::SeqCst) > 0
            || slot.unmounts.load(Ordering::SeqCst) != unmount
        {
            return;
        }

        let same_slot = slots
            .get(&slot.key)
            .is_some_and(|existing| Arc::as_ptr(existing) as *const () == Arc::as_ptr(slot) as *const ());
        if same_slot {
            slots.remove(&slot.key);
            debug!(key = %slot.key, "Garbage-collected query");
        }
    }
}

struct QuerySlot<T> {
    key: QueryKey,
    options: QueryOptions,
    fetcher: QueryFn<T>,
    state: watch::Sender<CacheEntry<T>>,
    next_seq: AtomicU64,
    subscribers: AtomicUsize,
    /// Bumped each time the last subscriber goes away
    unmounts: AtomicU64,
    enabled: AtomicBool,
    poller: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + Sync + 'static> QuerySlot<T> {
    fn new(key: QueryKey, options: QueryOptions, fetcher: QueryFn<T>) -> Self {
        let (state, _) = watch::channel(CacheEntry::default());
        Self {
            key,
            enabled: AtomicBool::new(options.enabled),
            options,
            fetcher,
            state,
            next_seq: AtomicU64::new(0),
            subscribers: AtomicUsize::new(0),
            unmounts: AtomicU64::new(0),
            poller: Mutex::new(None),
        }
    }

    /// Start the polling loop unless it is already running or not wanted
    fn ensure_polling(self: &Arc<Self>, polling_active: watch::Receiver<bool>) {
        // Checked under the lock stop() takes
        let mut poller = lock(&self.poller);
        if poller.is_some()
            || !self.enabled.load(Ordering::SeqCst)
            || self.subscribers.load(Ordering::SeqCst) == 0
        {
            return;
        }

        debug!(key = %self.key, interval = ?self.options.refetch_interval, "Starting polling");
        *poller = Some(tokio::spawn(poll_loop(Arc::clone(self), polling_active)));
    }

    /// Stop scheduling and invalidate everything still in flight
    fn stop(&self) {
        if let Some(handle) = lock(&self.poller).take() {
            handle.abort();
        }

        self.state.send_if_modified(|entry| {
            entry.epoch += 1;
            entry.in_flight = 0;
            let was_fetching = entry.is_fetching;
            entry.is_fetching = false;
            was_fetching
        });
        debug!(key = %self.key, "Stopped polling");
    }

    /// Issue one request with the next sequence number, without waiting for earlier ones
    fn spawn_fetch(self: &Arc<Self>) -> JoinHandle<()> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst) + 1;

        let mut epoch = 0;
        self.state.send_modify(|entry| {
            entry.in_flight += 1;
            entry.is_fetching = true;
            epoch = entry.epoch;
        });

        let slot = Arc::clone(self);
        tokio::spawn(async move {
            debug!(key = %slot.key, seq, "Fetching");
            match slot.fetch_with_retry(epoch).await {
                Some(result) => slot.settle(seq, epoch, result),
                None => debug!(key = %slot.key, seq, "Abandoned retries for a stopped query"),
            }
        })
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.state.borrow().epoch == epoch
    }

    /// Run the fetcher with retries. `None` once the query was stopped, so no
    /// further requests go out for an epoch nobody listens to anymore.
    async fn fetch_with_retry(&self, epoch: u64) -> Option<Result<T, ApiError>> {
        let policy = self.options.retry;
        let mut attempt = 0;

        loop {
            match (self.fetcher)().await {
                Ok(value) => return Some(Ok(value)),
                Err(err) if attempt < policy.max_retries && policy.should_retry(&err) => {
                    if !self.is_current(epoch) {
                        return None;
                    }
                    attempt += 1;
                    warn!(
                        key = %self.key,
                        attempt,
                        max = policy.max_retries,
                        "Request failed, retrying: {}",
                        err
                    );
                    tokio::time::sleep(policy.delay).await;
                    if !self.is_current(epoch) {
                        return None;
                    }
                }
                Err(err) => return Some(Err(err)),
            }
        }
    }

    /// Apply a settled request if it is still the freshest for the current epoch
    fn settle(&self, seq: u64, epoch: u64, result: Result<T, ApiError>) {
        let key = &self.key;

        self.state.send_if_modified(|entry| {
            if entry.epoch != epoch {
                debug!(key = %key, seq, "Discarding response for a stopped query");
                return false;
            }

            entry.in_flight = entry.in_flight.saturating_sub(1);
            entry.is_fetching = entry.in_flight > 0;

            if seq <= entry.applied_seq {
                debug!(key = %key, seq, applied = entry.applied_seq, "Discarding out-of-order response");
                // Only is_fetching may have changed
                return true;
            }
            entry.applied_seq = seq;

            match result {
                Ok(value) => {
                    entry.data = Some(Arc::new(value));
                    entry.fetched_at = Some(Utc::now());
                    entry.error = None;
                    entry.error_at = None;
                    entry.failure_count = 0;
                }
                Err(err) => {
                    warn!(key = %key, seq, "Query failed: {}", err);
                    entry.error = Some(err);
                    entry.error_at = Some(Utc::now());
                    entry.failure_count += 1;
                }
            }
            true
        });
    }
}

async fn poll_loop<T: Send + Sync + 'static>(
    slot: Arc<QuerySlot<T>>,
    mut polling_active: watch::Receiver<bool>,
) {
    loop {
        while !*polling_active.borrow_and_update() {
            debug!(key = %slot.key, "Polling paused in background");
            if polling_active.changed().await.is_err() {
                return;
            }
        }

        slot.spawn_fetch();

        let Some(every) = slot.options.refetch_interval else {
            return;
        };

        tokio::select! {
            _ = tokio::time::sleep(every) => {}
            changed = polling_active.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}

/// A subscriber's view of one cached query. Dropping the last handle stops polling.
pub struct QueryHandle<T: Send + Sync + 'static> {
    slot: Arc<QuerySlot<T>>,
    rx: watch::Receiver<CacheEntry<T>>,
    client: Arc<ClientInner>,
}

impl<T: Send + Sync + 'static> QueryHandle<T> {
    pub fn key(&self) -> &QueryKey {
        &self.slot.key
    }

    /// Snapshot of the shared entry
    pub fn entry(&self) -> CacheEntry<T> {
        self.rx.borrow().clone()
    }

    pub fn data(&self) -> Option<Arc<T>> {
        self.rx.borrow().data.clone()
    }

    /// Wait for the next update of the entry
    pub async fn changed(&mut self) -> CacheEntry<T> {
        // The sender lives in the slot this handle keeps alive, so this cannot fail
        let _ = self.rx.changed().await;
        self.rx.borrow_and_update().clone()
    }

    /// Wait until the entry satisfies a predicate
    pub async fn wait_for(&mut self, mut predicate: impl FnMut(&CacheEntry<T>) -> bool) -> CacheEntry<T> {
        let result = self
            .rx
            .wait_for(|entry| predicate(entry))
            .await
            .map(|entry| entry.clone());
        result.unwrap_or_else(|_| self.entry())
    }

    pub fn is_enabled(&self) -> bool {
        self.slot.enabled.load(Ordering::SeqCst)
    }

    /// Suspend or resume polling; the cached value is kept either way
    pub fn set_enabled(&self, enabled: bool) {
        let was = self.slot.enabled.swap(enabled, Ordering::SeqCst);
        if was == enabled {
            return;
        }

        if enabled {
            info!(key = %self.slot.key, "Query enabled");
            self.slot.ensure_polling(self.client.polling_active.subscribe());
        } else {
            info!(key = %self.slot.key, "Query disabled");
            self.slot.stop();
        }
    }

    /// Issue one request now and wait for it to settle
    pub async fn refetch(&self) -> CacheEntry<T> {
        if let Err(e) = self.slot.spawn_fetch().await {
            warn!(key = %self.slot.key, "Refetch task did not complete: {}", e);
        }
        self.entry()
    }
}

impl<T: Send + Sync + 'static> Clone for QueryHandle<T> {
    fn clone(&self) -> Self {
        let _slots = lock(&self.client.slots);
        self.slot.subscribers.fetch_add(1, Ordering::SeqCst);
        Self {
            slot: Arc::clone(&self.slot),
            rx: self.rx.clone(),
            client: Arc::clone(&self.client),
        }
    }
}

impl<T: Send + Sync + 'static> Drop for QueryHandle<T> {
    fn drop(&mut self) {
        let unmount = {
            let _slots = lock(&self.client.slots);
            if self.slot.subscribers.fetch_sub(1, Ordering::SeqCst) != 1 {
                return;
            }
            self.slot.stop();
            self.slot.unmounts.fetch_add(1, Ordering::SeqCst) + 1
        };

        debug!(key = %self.slot.key, grace = ?self.slot.options.gc_grace, "Last subscriber gone");

        let client = Arc::clone(&self.client);
        let slot = Arc::clone(&self.slot);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    tokio::time::sleep(slot.options.gc_grace).await;
                    client.collect(&slot, unmount);
                });
            }
            Err(_) => client.collect(&slot, unmount),
        }
    }
}
