use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chat_roster::{
    Address, ChatCache, ChatCacheConfig, ChatFetcher, ChatRecord, Direction, IdentityMap,
    InMemoryStorage, LastMessage, MessageEvent, MessageKind, Result, RosterEvent,
};

struct StubFetcher {
    chats: Mutex<Vec<ChatRecord>>,
    calls: AtomicUsize,
    fail: AtomicBool,
    delay: Option<Duration>,
}

impl StubFetcher {
    fn new(chats: Vec<ChatRecord>) -> Self {
        Self {
            chats: Mutex::new(chats),
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            delay: None,
        }
    }

    fn with_delay(chats: Vec<ChatRecord>, delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::new(chats)
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn set_chats(&self, chats: Vec<ChatRecord>) {
        *self.chats.lock().unwrap() = chats;
    }

    fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl ChatFetcher for StubFetcher {
    fn fetch_chats(
        &self,
        _credential: &str,
        _page: u32,
        _page_size: u32,
        _force_refresh: bool,
    ) -> Result<Vec<ChatRecord>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(chat_roster::Error::Fetch("remote unavailable".to_string()));
        }
        Ok(self.chats.lock().unwrap().clone())
    }
}

fn record(address: &str, name: &str, timestamp: u64) -> ChatRecord {
    ChatRecord::new(
        Address::new(address),
        name,
        LastMessage {
            kind: MessageKind::Text,
            direction: Direction::Incoming,
            preview: format!("message at {}", timestamp),
            timestamp,
        },
    )
}

fn live_event(address: &str, id: &str, timestamp: u64) -> MessageEvent {
    MessageEvent {
        address: Address::new(address),
        phone_address: None,
        message_id: id.to_string(),
        timestamp,
        direction: Direction::Incoming,
        kind: MessageKind::Text,
        body: Some(format!("live {}", id)),
        push_name: Some("Ana".to_string()),
        is_edit: false,
    }
}

fn cache_with(
    fetcher: Arc<StubFetcher>,
    event_tx: Option<crossbeam_channel::Sender<RosterEvent>>,
) -> (ChatCache, Arc<IdentityMap>) {
    let identity = Arc::new(IdentityMap::new(Arc::new(InMemoryStorage::new()), event_tx));
    let cache = ChatCache::new(fetcher, identity.clone(), ChatCacheConfig::default());
    (cache, identity)
}

#[test]
fn test_second_load_is_served_from_cache() {
    let fetcher = Arc::new(StubFetcher::new(vec![record(
        "111@s.whatsapp.net",
        "Ana",
        10,
    )]));
    let (cache, _) = cache_with(fetcher.clone(), None);

    let first = cache.load("token", false).unwrap();
    let second = cache.load("token", false).unwrap();

    assert_eq!(fetcher.calls(), 1);
    assert_eq!(first.chats.len(), 1);
    assert_eq!(second.chats.len(), 1);
    assert_eq!(second.page_size, first.page_size);
}

#[test]
fn test_force_refresh_merges_instead_of_replacing() {
    let fetcher = Arc::new(StubFetcher::new(vec![record(
        "111@s.whatsapp.net",
        "Ana",
        10,
    )]));
    let (cache, _) = cache_with(fetcher.clone(), None);

    cache.load("token", false).unwrap();

    // A brand-new chat arrives only as a live event.
    cache
        .apply_live_message(&live_event("222@s.whatsapp.net", "L1", 30))
        .unwrap();

    // The refetch does not know about that chat; it must survive anyway.
    let page = cache.load("token", true).unwrap();

    assert_eq!(fetcher.calls(), 2);
    assert_eq!(page.chats.len(), 2);
    assert_eq!(page.chats[0].address.as_str(), "222@s.whatsapp.net");
    assert!(page.chats[0].has_unseen);
}

#[test]
fn test_failed_fetch_leaves_cache_untouched() {
    let fetcher = Arc::new(StubFetcher::new(vec![record(
        "111@s.whatsapp.net",
        "Ana",
        10,
    )]));
    let (cache, _) = cache_with(fetcher.clone(), None);

    cache.load("token", false).unwrap();
    fetcher.set_fail(true);

    assert!(cache.load("token", true).is_err());

    // The last good collection is still served.
    assert!(cache.is_loaded());
    let page = cache.load("token", false).unwrap();
    assert_eq!(page.chats.len(), 1);
}

#[test]
fn test_lid_pairing_folds_later_lid_only_event() {
    let mut paired = record("12345@lid", "Ana", 10);
    paired.phone_address = Some(Address::new("5561999998888@s.whatsapp.net"));
    let fetcher = Arc::new(StubFetcher::new(vec![paired]));

    let (tx, rx) = crossbeam_channel::unbounded();
    let (cache, identity) = cache_with(fetcher, Some(tx));

    cache.load("token", false).unwrap();

    // Merging the paired record taught the map and broadcast the change.
    assert_eq!(
        identity.resolve(&Address::new("12345@lid")).as_str(),
        "5561999998888@s.whatsapp.net"
    );
    assert!(matches!(
        rx.try_recv(),
        Ok(RosterEvent::MappingSaved { .. })
    ));

    // A live event carrying only the lid lands in the same entry.
    cache
        .apply_live_message(&live_event("12345@lid", "L1", 50))
        .unwrap();

    let chats = cache.chats();
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0].canonical.as_str(), "5561999998888@s.whatsapp.net");
    assert_eq!(chats[0].last_message.timestamp, 50);
}

#[test]
fn test_reset_clears_the_collection_and_forces_a_refetch() {
    let fetcher = Arc::new(StubFetcher::new(vec![record(
        "111@s.whatsapp.net",
        "Ana",
        10,
    )]));
    let (cache, _) = cache_with(fetcher.clone(), None);

    cache.load("token", false).unwrap();
    cache.reset();

    assert!(!cache.is_loaded());
    assert!(cache.chats().is_empty());

    cache.load("token", false).unwrap();
    assert_eq!(fetcher.calls(), 2);
}

#[test]
fn test_expired_ttl_triggers_a_refetch() {
    let fetcher = Arc::new(StubFetcher::new(vec![record(
        "111@s.whatsapp.net",
        "Ana",
        10,
    )]));
    let identity = Arc::new(IdentityMap::new(Arc::new(InMemoryStorage::new()), None));
    let cache = ChatCache::new(
        fetcher.clone(),
        identity,
        ChatCacheConfig {
            page_size: 50,
            ttl: Some(Duration::from_millis(40)),
        },
    );

    cache.load("token", false).unwrap();
    cache.load("token", false).unwrap();
    assert_eq!(fetcher.calls(), 1);

    std::thread::sleep(Duration::from_millis(120));
    cache.load("token", false).unwrap();
    assert_eq!(fetcher.calls(), 2);
}

#[test]
fn test_concurrent_loads_share_one_fetch() {
    let fetcher = Arc::new(StubFetcher::with_delay(
        vec![record("111@s.whatsapp.net", "Ana", 10)],
        Duration::from_millis(150),
    ));
    let (cache, _) = cache_with(fetcher.clone(), None);
    let cache = Arc::new(cache);

    let mut handles = Vec::new();
    for _ in 0..3 {
        let cache = cache.clone();
        handles.push(std::thread::spawn(move || {
            cache.load("token", false).unwrap()
        }));
    }
    for handle in handles {
        let page = handle.join().unwrap();
        assert_eq!(page.chats.len(), 1);
    }

    assert_eq!(fetcher.calls(), 1);
}

#[test]
fn test_refetch_with_stale_data_does_not_roll_back_a_live_update() {
    let fetcher = Arc::new(StubFetcher::new(vec![record(
        "111@s.whatsapp.net",
        "Ana",
        10,
    )]));
    let (cache, _) = cache_with(fetcher.clone(), None);

    cache.load("token", false).unwrap();
    cache
        .apply_live_message(&live_event("111@s.whatsapp.net", "L9", 99))
        .unwrap();

    // The remote still reports the old last message.
    fetcher.set_chats(vec![record("111@s.whatsapp.net", "Ana", 10)]);
    let page = cache.load("token", true).unwrap();

    assert_eq!(page.chats.len(), 1);
    assert_eq!(page.chats[0].last_message.timestamp, 99);
}
