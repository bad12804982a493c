use crate::event::{Event, EventCategory, EventPriority, EventState};
use crate::filters::EventFilter;
use crate::handlers::EventHandler;
use crate::persistence::{EventStore, InMemoryEventStore};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use regia_core::{EventBusSettings, RegiaResult};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub type StreamCallback = Arc<dyn Fn(&Event) -> RegiaResult<()> + Send + Sync>;

struct Subscription {
    handler: Arc<dyn EventHandler>,
    filter: Option<Box<dyn EventFilter>>,
}

#[derive(Default)]
struct BusStats {
    events_published: AtomicU64,
    events_processed: AtomicU64,
    events_failed: AtomicU64,
    events_expired: AtomicU64,
    events_dead_lettered: AtomicU64,
    stream_errors: AtomicU64,
}

struct BusInner {
    max_queue_size: AtomicUsize,
    worker_threads: AtomicUsize,
    event_ttl_secs: AtomicU64,
    batch_size: AtomicUsize,
    max_retries: u32,
    dead_letter_interval: Duration,
    cleanup_interval: Duration,
    queue: Mutex<VecDeque<Event>>,
    dead_letter: Mutex<VecDeque<Event>>,
    notify: Notify,
    shutdown: Notify,
    handlers: Mutex<HashMap<String, Subscription>>,
    stream_handlers: DashMap<String, StreamCallback>,
    store: Arc<dyn EventStore>,
    running: AtomicBool,
    stats: BusStats,
}

impl BusInner {
    /// Routes one event: stream fan-out, handler dispatch, persistence of
    /// high-priority events. A handler failure dead-letters the original
    /// event and stops routing.
    async fn route_event(&self, mut event: Event) -> bool {
        event.state = EventState::Routed;

        for entry in self.stream_handlers.iter() {
            if let Err(e) = (entry.value())(&event) {
                self.stats.stream_errors.fetch_add(1, Ordering::Relaxed);
                warn!(stream_id = entry.key().as_str(), event_id = event.event_id.as_str(), error = %e, "stream handler failed");
            }
        }

        let matched: Vec<(String, Arc<dyn EventHandler>)> = {
            let handlers = self.handlers.lock().expect("handlers lock");
            handlers
                .iter()
                .filter_map(|(handler_id, subscription)| {
                    if !subscription.handler.is_active() {
                        return None;
                    }
                    let categories = subscription.handler.supported_categories();
                    if !categories.is_empty() && !categories.contains(&event.category) {
                        return None;
                    }
                    if let Some(filter) = &subscription.filter {
                        if !filter.matches(&event) {
                            return None;
                        }
                    }
                    Some((handler_id.clone(), subscription.handler.clone()))
                })
                .collect()
        };

        for (handler_id, handler) in matched {
            if let Err(e) = handler.handle_event(event.clone()).await {
                warn!(
                    handler_id = handler_id.as_str(),
                    event_id = event.event_id.as_str(),
                    error = %e,
                    "handler failed, dead-lettering event"
                );
                self.stats.events_dead_lettered.fetch_add(1, Ordering::Relaxed);
                self.dead_letter
                    .lock()
                    .expect("dead letter lock")
                    .push_back(event);
                return false;
            }
        }

        if event.priority >= EventPriority::High {
            if let Err(e) = self.store.persist_event(&event).await {
                error!(event_id = event.event_id.as_str(), error = %e, "event persistence failed");
                if event.priority >= EventPriority::Critical {
                    self.dead_letter
                        .lock()
                        .expect("dead letter lock")
                        .push_back(event);
                    return false;
                }
            }
        }

        event.state = EventState::Processed;
        self.stats.events_processed.fetch_add(1, Ordering::Relaxed);
        true
    }

    async fn process_dead_letters(&self) {
        let drained: Vec<Event> = {
            let mut dead_letter = self.dead_letter.lock().expect("dead letter lock");
            dead_letter.drain(..).collect()
        };

        for mut event in drained {
            if event.retry_count < self.max_retries && !event.is_expired() {
                event.retry_count += 1;
                event.state = EventState::Published;
                debug!(
                    event_id = event.event_id.as_str(),
                    retry_count = event.retry_count,
                    "re-enqueueing dead-lettered event"
                );
                let enqueued = {
                    let mut queue = self.queue.lock().expect("queue lock");
                    if queue.len() < self.max_queue_size.load(Ordering::Relaxed) {
                        queue.push_back(event);
                        true
                    } else {
                        false
                    }
                };
                if enqueued {
                    self.notify.notify_one();
                } else {
                    self.stats.events_failed.fetch_add(1, Ordering::Relaxed);
                }
            } else {
                event.state = EventState::Failed;
                warn!(
                    event_id = event.event_id.as_str(),
                    retry_count = event.retry_count,
                    "dead-letter retries exhausted, marking failed"
                );
                if let Err(e) = self.store.persist_event(&event).await {
                    error!(event_id = event.event_id.as_str(), error = %e, "failed event persistence failed");
                }
                self.stats.events_failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    async fn cleanup_expired(&self) {
        match self.store.delete_expired(Utc::now()).await {
            Ok(removed) => {
                if removed > 0 {
                    self.stats.events_expired.fetch_add(removed, Ordering::Relaxed);
                    info!(removed, "expired events removed from persistence");
                }
            }
            Err(e) => error!(error = %e, "expired event cleanup failed"),
        }
    }
}

async fn worker_loop(inner: Arc<BusInner>, worker_index: usize) {
    debug!(worker = worker_index, "event worker started");
    loop {
        if !inner.running.load(Ordering::SeqCst) {
            break;
        }
        let next = {
            let mut queue = inner.queue.lock().expect("queue lock");
            queue.pop_front()
        };
        match next {
            Some(event) => {
                inner.route_event(event).await;
            }
            None => {
                tokio::select! {
                    _ = inner.notify.notified() => {}
                    _ = inner.shutdown.notified() => {}
                    _ = tokio::time::sleep(Duration::from_millis(50)) => {}
                }
            }
        }
    }
    debug!(worker = worker_index, "event worker stopped");
}

async fn dead_letter_loop(inner: Arc<BusInner>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(inner.dead_letter_interval) => {}
            _ = inner.shutdown.notified() => break,
        }
        if !inner.running.load(Ordering::SeqCst) {
            break;
        }
        inner.process_dead_letters().await;
    }
}

async fn cleanup_loop(inner: Arc<BusInner>) {
    loop {
        tokio::select! {
            _ = tokio::time::sleep(inner.cleanup_interval) => {}
            _ = inner.shutdown.notified() => break,
        }
        if !inner.running.load(Ordering::SeqCst) {
            break;
        }
        inner.cleanup_expired().await;
    }
}

/// Asynchronous publish/subscribe bus: bounded FIFO queue, worker pool,
/// per-subscription filters, dead-letter retry, TTL cleanup and synchronous
/// stream fan-out.
pub struct EventBus {
    inner: Arc<BusInner>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl EventBus {
    pub fn new(settings: EventBusSettings) -> Self {
        Self::with_store(settings, Arc::new(InMemoryEventStore::new()))
    }

    pub fn with_store(settings: EventBusSettings, store: Arc<dyn EventStore>) -> Self {
        let inner = BusInner {
            max_queue_size: AtomicUsize::new(settings.max_queue_size),
            worker_threads: AtomicUsize::new(settings.worker_threads.max(1)),
            event_ttl_secs: AtomicU64::new(settings.event_ttl_secs),
            batch_size: AtomicUsize::new(settings.batch_size),
            max_retries: settings.max_retries,
            dead_letter_interval: Duration::from_secs(settings.dead_letter_interval_secs.max(1)),
            cleanup_interval: Duration::from_secs(settings.cleanup_interval_secs.max(1)),
            queue: Mutex::new(VecDeque::new()),
            dead_letter: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            shutdown: Notify::new(),
            handlers: Mutex::new(HashMap::new()),
            stream_handlers: DashMap::new(),
            store,
            running: AtomicBool::new(false),
            stats: BusStats::default(),
        };
        Self {
            inner: Arc::new(inner),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub async fn initialize(&self) -> bool {
        if self.inner.running.load(Ordering::SeqCst) {
            return false;
        }
        if let Err(e) = self.inner.store.initialize().await {
            error!(error = %e, "event store initialization failed");
            return false;
        }

        self.inner.running.store(true, Ordering::SeqCst);

        let mut tasks = self.tasks.lock().expect("tasks lock");
        let worker_count = self.inner.worker_threads.load(Ordering::Relaxed);
        for worker_index in 0..worker_count {
            tasks.push(tokio::spawn(worker_loop(self.inner.clone(), worker_index)));
        }
        tasks.push(tokio::spawn(dead_letter_loop(self.inner.clone())));
        tasks.push(tokio::spawn(cleanup_loop(self.inner.clone())));

        info!(workers = worker_count, "event bus started");
        true
    }

    pub async fn shutdown(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.inner.shutdown.notify_waiters();
        self.inner.notify.notify_waiters();

        let tasks: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().expect("tasks lock");
            tasks.drain(..).collect()
        };
        for task in tasks {
            let _ = task.await;
        }

        // Drain what never got routed; high-priority events are still made
        // durable before being dropped.
        let leftovers: Vec<Event> = {
            let mut queue = self.inner.queue.lock().expect("queue lock");
            let mut dead_letter = self.inner.dead_letter.lock().expect("dead letter lock");
            queue.drain(..).chain(dead_letter.drain(..)).collect()
        };
        for event in leftovers {
            self.inner.stats.events_failed.fetch_add(1, Ordering::Relaxed);
            if event.priority >= EventPriority::High {
                if let Err(e) = self.inner.store.persist_event(&event).await {
                    error!(event_id = event.event_id.as_str(), error = %e, "shutdown persistence failed");
                }
            }
        }

        info!("event bus stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    pub fn publish(&self, mut event: Event) -> bool {
        if !self.inner.running.load(Ordering::SeqCst) {
            warn!(event_id = event.event_id.as_str(), "publish rejected, bus not running");
            self.inner.stats.events_failed.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        if event.state == EventState::Created {
            let ttl = self.inner.event_ttl_secs.load(Ordering::Relaxed);
            event.set_expiry(Duration::from_secs(ttl));
        }
        event.state = EventState::Published;

        {
            let mut queue = self.inner.queue.lock().expect("queue lock");
            if queue.len() >= self.inner.max_queue_size.load(Ordering::Relaxed) {
                drop(queue);
                self.inner.stats.events_failed.fetch_add(1, Ordering::Relaxed);
                warn!(
                    event_id = event.event_id.as_str(),
                    capacity = self.inner.max_queue_size.load(Ordering::Relaxed),
                    "event queue overflow, dropping event"
                );
                return false;
            }
            queue.push_back(event);
        }

        self.inner.stats.events_published.fetch_add(1, Ordering::Relaxed);
        self.inner.notify.notify_one();
        true
    }

    pub fn publish_batch(&self, events: Vec<Event>) -> bool {
        let mut all_accepted = true;
        for event in events {
            all_accepted &= self.publish(event);
        }
        all_accepted
    }

    pub fn subscribe(
        &self,
        handler: Arc<dyn EventHandler>,
        filter: Option<Box<dyn EventFilter>>,
    ) -> bool {
        let handler_id = handler.handler_id();
        let mut handlers = self.inner.handlers.lock().expect("handlers lock");
        if handlers.contains_key(&handler_id) {
            warn!(handler_id = handler_id.as_str(), "duplicate handler id, subscribe rejected");
            return false;
        }
        handlers.insert(handler_id.clone(), Subscription { handler, filter });
        info!(handler_id = handler_id.as_str(), "handler subscribed");
        true
    }

    pub fn unsubscribe(&self, handler_id: &str) -> bool {
        let removed = self
            .inner
            .handlers
            .lock()
            .expect("handlers lock")
            .remove(handler_id)
            .is_some();
        if removed {
            info!(handler_id, "handler unsubscribed");
        }
        removed
    }

    pub fn register_stream_handler(&self, stream_id: impl Into<String>, callback: StreamCallback) {
        self.inner.stream_handlers.insert(stream_id.into(), callback);
    }

    pub fn unregister_stream_handler(&self, stream_id: &str) -> bool {
        self.inner.stream_handlers.remove(stream_id).is_some()
    }

    pub async fn get_events(
        &self,
        category: EventCategory,
        since: DateTime<Utc>,
    ) -> RegiaResult<Vec<Event>> {
        self.inner.store.get_events(category, since).await
    }

    pub async fn get_events_by_source(
        &self,
        source: &str,
        since: DateTime<Utc>,
    ) -> RegiaResult<Vec<Event>> {
        self.inner.store.get_events_by_source(source, since).await
    }

    pub fn get_statistics(&self) -> serde_json::Value {
        let queue_size = self.inner.queue.lock().expect("queue lock").len();
        let dead_letter_size = self.inner.dead_letter.lock().expect("dead letter lock").len();
        let active_handlers = self.inner.handlers.lock().expect("handlers lock").len();
        json!({
            "events_published": self.inner.stats.events_published.load(Ordering::Relaxed),
            "events_processed": self.inner.stats.events_processed.load(Ordering::Relaxed),
            "events_failed": self.inner.stats.events_failed.load(Ordering::Relaxed),
            "events_expired": self.inner.stats.events_expired.load(Ordering::Relaxed),
            "events_dead_lettered": self.inner.stats.events_dead_lettered.load(Ordering::Relaxed),
            "stream_errors": self.inner.stats.stream_errors.load(Ordering::Relaxed),
            "queue_size": queue_size,
            "dead_letter_size": dead_letter_size,
            "queue_capacity": self.inner.max_queue_size.load(Ordering::Relaxed),
            "batch_size": self.inner.batch_size.load(Ordering::Relaxed),
            "active_handlers": active_handlers,
            "stream_handlers": self.inner.stream_handlers.len(),
            "worker_threads": self.inner.worker_threads.load(Ordering::Relaxed),
            "running": self.is_running(),
        })
    }

    pub fn reset_statistics(&self) {
        self.inner.stats.events_published.store(0, Ordering::Relaxed);
        self.inner.stats.events_processed.store(0, Ordering::Relaxed);
        self.inner.stats.events_failed.store(0, Ordering::Relaxed);
        self.inner.stats.events_expired.store(0, Ordering::Relaxed);
        self.inner.stats.events_dead_lettered.store(0, Ordering::Relaxed);
        self.inner.stats.stream_errors.store(0, Ordering::Relaxed);
    }

    pub fn pending_event_count(&self) -> usize {
        self.inner.queue.lock().expect("queue lock").len()
    }

    pub fn dead_letter_count(&self) -> usize {
        self.inner.dead_letter.lock().expect("dead letter lock").len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.inner.max_queue_size.load(Ordering::Relaxed)
    }

    /// Only honored while the bus is stopped.
    pub fn set_worker_threads(&self, count: usize) -> bool {
        if self.inner.running.load(Ordering::SeqCst) {
            return false;
        }
        self.inner.worker_threads.store(count.max(1), Ordering::Relaxed);
        true
    }

    pub fn set_max_queue_size(&self, size: usize) {
        self.inner.max_queue_size.store(size.max(1), Ordering::Relaxed);
    }

    pub fn set_event_ttl(&self, ttl: Duration) {
        self.inner.event_ttl_secs.store(ttl.as_secs(), Ordering::Relaxed);
    }

    pub fn set_batch_size(&self, size: usize) {
        self.inner.batch_size.store(size.max(1), Ordering::Relaxed);
    }
}
