use crate::{
    merge_records, ChatRecord, IdentityMap, LastMessage, MessageEvent, Result, DEFAULT_PAGE_SIZE,
};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// Remote chat-list fetch, consumed as an opaque dependency. The credential
/// is an opaque bearer value; this subsystem only ever requests page 1.
pub trait ChatFetcher: Send + Sync {
    fn fetch_chats(
        &self,
        credential: &str,
        page: u32,
        page_size: u32,
        force_refresh: bool,
    ) -> Result<Vec<ChatRecord>>;
}

#[derive(Debug, Clone)]
pub struct ChatCacheConfig {
    pub page_size: u32,
    /// `None` means the cache never expires on its own and is refreshed only
    /// on demand. This is the default configuration.
    pub ttl: Option<Duration>,
}

impl Default for ChatCacheConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            ttl: None,
        }
    }
}

/// What `load` hands back: the merged collection and the page size of the
/// most recent remote fetch.
#[derive(Debug, Clone)]
pub struct ChatPage {
    pub chats: Vec<ChatRecord>,
    pub page_size: u32,
}

#[derive(Default)]
struct CacheState {
    chats: Vec<ChatRecord>,
    loaded: bool,
    /// Freshness stamp for the TTL gate; updated by fetches and live events.
    refreshed_at: Option<Instant>,
    /// Set only when a remote fetch lands; the single-flight re-check must
    /// not mistake a live-event update for a completed fetch.
    fetch_completed_at: Option<Instant>,
    last_page_size: u32,
}

/// Process-wide merged chat list. Owned explicitly by the application's root
/// composition and injected where needed; `reset` replaces the implicit
/// module-level singleton of older clients.
pub struct ChatCache {
    fetcher: Arc<dyn ChatFetcher>,
    identity: Arc<IdentityMap>,
    config: ChatCacheConfig,
    state: Mutex<CacheState>,
    // Serializes remote fetches so concurrent loads share one flight.
    flight: Mutex<()>,
}

impl ChatCache {
    pub fn new(
        fetcher: Arc<dyn ChatFetcher>,
        identity: Arc<IdentityMap>,
        config: ChatCacheConfig,
    ) -> Self {
        Self {
            fetcher,
            identity,
            config,
            state: Mutex::new(CacheState::default()),
            flight: Mutex::new(()),
        }
    }

    /// Returns the current chat list, fetching remotely only when the cache
    /// is missing, stale, or `force_refresh` is set.
    ///
    /// A refresh is additive: the fetch result is merged into the existing
    /// collection, so chats known only from live events survive. On fetch
    /// failure the cache is left untouched and the error propagates.
    ///
    /// Concurrent callers are single-flighted: one that blocked behind an
    /// in-flight load adopts the result that landed while it waited instead
    /// of refetching.
    pub fn load(&self, credential: &str, force_refresh: bool) -> Result<ChatPage> {
        if !force_refresh {
            if let Some(page) = self.cached_page() {
                debug!("serving chat list from cache");
                return Ok(page);
            }
        }

        let entered = Instant::now();
        let _flight = self.flight.lock().unwrap();

        {
            let state = self.state.lock().unwrap();
            let completed_while_waiting =
                state.fetch_completed_at.is_some_and(|at| at >= entered);
            let still_fresh = !force_refresh && self.is_fresh(&state);
            if completed_while_waiting || still_fresh {
                return Ok(ChatPage {
                    chats: state.chats.clone(),
                    page_size: state.last_page_size,
                });
            }
        }

        // The state lock is not held across the fetch: live messages that
        // arrive now apply to the pre-fetch collection and the merge below
        // lands on top of whatever the cache holds by then.
        let fetched =
            self.fetcher
                .fetch_chats(credential, 1, self.config.page_size, force_refresh)?;
        debug!("fetched {} chats from remote", fetched.len());

        let mut state = self.state.lock().unwrap();
        let merged = merge_records(&state.chats, fetched, &self.identity)?;
        let now = Instant::now();
        state.chats = merged;
        state.loaded = true;
        state.refreshed_at = Some(now);
        state.fetch_completed_at = Some(now);
        state.last_page_size = self.config.page_size;
        Ok(ChatPage {
            chats: state.chats.clone(),
            page_size: state.last_page_size,
        })
    }

    /// Folds one inbound message event into the cached collection, marking
    /// the conversation as having an unseen update. Never removes chats.
    pub fn apply_live_message(&self, event: &MessageEvent) -> Result<()> {
        event.validate()?;
        let record = Self::record_from_event(event);

        let mut state = self.state.lock().unwrap();
        state.chats = merge_records(&state.chats, vec![record], &self.identity)?;
        state.refreshed_at = Some(Instant::now());
        Ok(())
    }

    /// Explicit invalidation for logout/reconnect.
    pub fn reset(&self) {
        *self.state.lock().unwrap() = CacheState::default();
        debug!("chat cache reset");
    }

    pub fn is_loaded(&self) -> bool {
        self.state.lock().unwrap().loaded
    }

    pub fn chats(&self) -> Vec<ChatRecord> {
        self.state.lock().unwrap().chats.clone()
    }

    fn cached_page(&self) -> Option<ChatPage> {
        let state = self.state.lock().unwrap();
        if self.is_fresh(&state) {
            Some(ChatPage {
                chats: state.chats.clone(),
                page_size: state.last_page_size,
            })
        } else {
            None
        }
    }

    fn is_fresh(&self, state: &CacheState) -> bool {
        if !state.loaded {
            return false;
        }
        match (state.refreshed_at, self.config.ttl) {
            (Some(_), None) => true,
            (Some(at), Some(ttl)) => at.elapsed() <= ttl,
            (None, _) => false,
        }
    }

    fn record_from_event(event: &MessageEvent) -> ChatRecord {
        let mut record = ChatRecord::new(
            event.address.clone(),
            event.display_name(),
            LastMessage {
                kind: event.kind,
                direction: event.direction,
                preview: event.preview(),
                timestamp: event.timestamp,
            },
        );
        record.phone_address = event.phone_address.clone();
        record.has_unseen = true;
        record
    }
}
