//! Event hub — fans stabilized subtitle events out to any number of
//! subscribers without ever blocking the pipeline.
//!
//! Each subscriber owns an independent bounded queue.  When a queue fills,
//! the oldest **interim** event is evicted first; if the queue is full of
//! final events the subscriber is treated as too slow and disconnected —
//! back-pressure is resolved by dropping slow consumers, never by blocking
//! the publisher.  `Final` events are never silently evicted for a
//! connected subscriber.
//!
//! Subscribers may join and leave at any time.  A new subscriber receives
//! only events published after it joined, unless it requests a replay of
//! the most recent `Final` events at subscribe time.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use crate::config::HubConfig;
use crate::stabilizer::{EventKind, StabilizedEvent};

// ---------------------------------------------------------------------------
// EventHub
// ---------------------------------------------------------------------------

/// Cheap-to-clone handle to the shared fan-out state.
///
/// # Example
///
/// ```rust,no_run
/// use livesub::config::HubConfig;
/// use livesub::hub::EventHub;
///
/// # async fn example() {
/// let hub = EventHub::new(&HubConfig::default());
/// let mut sub = hub.subscribe(0); // no history replay
/// while let Some(event) = sub.recv().await {
///     println!("[{}] {}", event.sequence, event.text);
/// }
/// # }
/// ```
#[derive(Clone)]
pub struct EventHub {
    shared: Arc<HubShared>,
}

struct HubShared {
    subscribers: Mutex<HashMap<u64, Arc<SubscriberQueue>>>,
    next_id: AtomicU64,
    /// Recent `Final` events for late joiners.
    history: Mutex<VecDeque<StabilizedEvent>>,
    queue_capacity: usize,
    history_max: usize,
}

struct SubscriberQueue {
    queue: Mutex<VecDeque<StabilizedEvent>>,
    notify: Notify,
    closed: AtomicBool,
}

impl EventHub {
    pub fn new(config: &HubConfig) -> Self {
        Self {
            shared: Arc::new(HubShared {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
                history: Mutex::new(VecDeque::with_capacity(config.history)),
                queue_capacity: config.queue_capacity.max(1),
                history_max: config.history,
            }),
        }
    }

    /// Register a new subscriber.
    ///
    /// `history` asks for a replay of up to that many of the most recent
    /// `Final` events (capped by the hub's retention); pass `0` for none.
    pub fn subscribe(&self, history: usize) -> Subscription {
        let queue = Arc::new(SubscriberQueue {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        });

        if history > 0 {
            let held = self.shared.history.lock().unwrap();
            let replay = history.min(held.len());
            let mut q = queue.queue.lock().unwrap();
            for event in held.iter().skip(held.len() - replay) {
                q.push_back(event.clone());
            }
        }

        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        self.shared
            .subscribers
            .lock()
            .unwrap()
            .insert(id, Arc::clone(&queue));
        log::debug!("subscriber {id} joined");

        Subscription {
            id,
            queue,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Broadcast one event to every live subscriber.  Never awaits and
    /// never blocks on a slow consumer.
    pub fn publish(&self, event: StabilizedEvent) {
        if event.kind.is_final() {
            let mut history = self.shared.history.lock().unwrap();
            history.push_back(event.clone());
            while history.len() > self.shared.history_max {
                history.pop_front();
            }
        }

        let mut dead = Vec::new();
        {
            let subscribers = self.shared.subscribers.lock().unwrap();
            for (&id, sub) in subscribers.iter() {
                if !Self::offer(sub, &event, self.shared.queue_capacity) {
                    dead.push(id);
                }
            }
        }

        if !dead.is_empty() {
            let mut subscribers = self.shared.subscribers.lock().unwrap();
            for id in dead {
                log::warn!("dropping slow subscriber {id}");
                subscribers.remove(&id);
            }
        }
    }

    /// Queue `event` for one subscriber; returns `false` when the
    /// subscriber must be disconnected.
    fn offer(sub: &SubscriberQueue, event: &StabilizedEvent, capacity: usize) -> bool {
        if sub.closed.load(Ordering::SeqCst) {
            return true; // already winding down; keep it registered until drop
        }

        let mut queue = sub.queue.lock().unwrap();

        if queue.len() >= capacity {
            // Evict the oldest interim first.
            if let Some(pos) = queue.iter().position(|e| e.kind == EventKind::Interim) {
                queue.remove(pos);
            }
        }

        if queue.len() >= capacity {
            // Nothing but finals queued — the consumer is too slow.
            sub.closed.store(true, Ordering::SeqCst);
            sub.notify.notify_waiters();
            return false;
        }

        queue.push_back(event.clone());
        drop(queue);
        sub.notify.notify_one();
        true
    }

    /// Number of currently registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.shared.subscribers.lock().unwrap().len()
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// One subscriber's receiving end.  Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    queue: Arc<SubscriberQueue>,
    shared: Arc<HubShared>,
}

impl Subscription {
    /// Receive the next event, in publish order.
    ///
    /// Returns `None` once the subscription was disconnected (slow-consumer
    /// policy) and all already-queued events have been drained.
    pub async fn recv(&mut self) -> Option<StabilizedEvent> {
        loop {
            // Create the notified future before checking the queue so a
            // publish between the check and the await is not missed.
            let notified = self.queue.notify.notified();

            if let Some(event) = self.queue.queue.lock().unwrap().pop_front() {
                return Some(event);
            }
            if self.queue.closed.load(Ordering::SeqCst) {
                return None;
            }

            notified.await;
        }
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<StabilizedEvent> {
        self.queue.queue.lock().unwrap().pop_front()
    }

    /// Whether the hub has disconnected this subscriber.
    pub fn is_closed(&self) -> bool {
        self.queue.closed.load(Ordering::SeqCst)
    }

    /// Explicitly leave the hub.  Equivalent to dropping the handle.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.shared.subscribers.lock().unwrap().remove(&self.id);
        log::debug!("subscriber {} left", self.id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
