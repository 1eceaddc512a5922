use crate::{
    Address, ChatCache, ChatNotification, IdentityMap, MessageEvent, Result, RosterEvent,
    DEFAULT_PROCESSED_CAPACITY, MAX_VISIBLE_NOTIFICATIONS,
};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ProcessedKey {
    canonical: Address,
    message_id: String,
    timestamp: u64,
}

/// Insertion-order bounded set. Message identifiers are only useful for
/// near-term dedup, so the oldest keys are evicted past capacity instead of
/// growing for the whole session.
struct ProcessedSet {
    seen: HashSet<ProcessedKey>,
    order: VecDeque<ProcessedKey>,
    capacity: usize,
}

impl ProcessedSet {
    fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    /// Returns false when the key was already present.
    fn insert(&mut self, key: ProcessedKey) -> bool {
        if !self.seen.insert(key.clone()) {
            return false;
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        true
    }
}

struct NotifierState {
    processed: ProcessedSet,
    queue: VecDeque<ChatNotification>,
    unread: u32,
    live_view_active: bool,
}

/// Presents a short rolling list of recent inbound messages without ever
/// duplicating an alert for the same message.
///
/// Consumes the same live-message stream as the chat cache but only touches
/// the identity map for resolution; when a cache is attached and warm, events
/// are fed through to it as well.
pub struct NotificationCenter {
    identity: Arc<IdentityMap>,
    cache: Option<Arc<ChatCache>>,
    event_tx: Option<crossbeam_channel::Sender<RosterEvent>>,
    state: Mutex<NotifierState>,
}

impl NotificationCenter {
    pub fn new(
        identity: Arc<IdentityMap>,
        cache: Option<Arc<ChatCache>>,
        event_tx: Option<crossbeam_channel::Sender<RosterEvent>>,
    ) -> Self {
        Self::with_processed_capacity(identity, cache, event_tx, DEFAULT_PROCESSED_CAPACITY)
    }

    pub fn with_processed_capacity(
        identity: Arc<IdentityMap>,
        cache: Option<Arc<ChatCache>>,
        event_tx: Option<crossbeam_channel::Sender<RosterEvent>>,
        capacity: usize,
    ) -> Self {
        Self {
            identity,
            cache,
            event_tx,
            state: Mutex::new(NotifierState {
                processed: ProcessedSet::new(capacity),
                queue: VecDeque::new(),
                unread: 0,
                live_view_active: false,
            }),
        }
    }

    /// Processes one inbound message event. Returns the notification it
    /// produced, or `None` for edits and repeats (an idempotent no-op).
    pub fn on_message(&self, event: &MessageEvent) -> Result<Option<ChatNotification>> {
        event.validate()?;
        if event.is_edit {
            return Ok(None);
        }

        let canonical = self.identity.resolve(&event.address);
        let key = ProcessedKey {
            canonical: canonical.clone(),
            message_id: event.message_id.clone(),
            timestamp: event.timestamp,
        };

        let (notification, raise_toast) = {
            let mut state = self.state.lock().unwrap();
            if !state.processed.insert(key) {
                debug!("dropped repeat message {} from {}", event.message_id, canonical);
                return Ok(None);
            }

            let notification = ChatNotification {
                canonical,
                message_id: event.message_id.clone(),
                display_name: event.display_name(),
                preview: event.preview(),
                timestamp: event.timestamp,
            };
            state.queue.push_front(notification.clone());
            state.queue.truncate(MAX_VISIBLE_NOTIFICATIONS);
            state.unread += 1;
            (notification, !state.live_view_active)
        };

        // Sound and toast are best-effort; a missing receiver is not an error.
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(RosterEvent::PlaySound);
            if raise_toast {
                let _ = tx.send(RosterEvent::ShowToast(notification.clone()));
            }
        }

        if let Some(cache) = &self.cache {
            if cache.is_loaded() {
                cache.apply_live_message(event)?;
            }
        }

        Ok(Some(notification))
    }

    /// The rolling display queue, most recent first. At most
    /// [`MAX_VISIBLE_NOTIFICATIONS`] entries.
    pub fn notifications(&self) -> Vec<ChatNotification> {
        self.state.lock().unwrap().queue.iter().cloned().collect()
    }

    pub fn unread_count(&self) -> u32 {
        self.state.lock().unwrap().unread
    }

    /// "Notifications cleared": empties the queue and zeroes the counter.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.queue.clear();
        state.unread = 0;
    }

    /// "List opened": zeroes the counter, keeps the queue.
    pub fn mark_all_seen(&self) {
        self.state.lock().unwrap().unread = 0;
    }

    /// While the live chat view is on screen, toasts are suppressed.
    pub fn set_live_view_active(&self, active: bool) {
        self.state.lock().unwrap().live_view_active = active;
    }
}
