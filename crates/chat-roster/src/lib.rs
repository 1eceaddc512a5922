pub mod chat_cache;
pub mod error;
pub mod file_storage;
pub mod identity_map;
pub mod merge;
pub mod notifications;
pub mod storage;
pub mod types;

pub use chat_cache::{ChatCache, ChatCacheConfig, ChatFetcher, ChatPage};
pub use error::{Error, Result};
pub use file_storage::FileStorageAdapter;
pub use identity_map::{IdentityMap, MappingOutcome};
pub use merge::merge_records;
pub use notifications::NotificationCenter;
pub use storage::{InMemoryStorage, StorageAdapter};
pub use types::{
    Address, ChatNotification, ChatRecord, Direction, LastMessage, MessageEvent, MessageKind,
    RosterEvent, DEFAULT_PAGE_SIZE, DEFAULT_PROCESSED_CAPACITY, LID_SERVER,
    MAX_VISIBLE_NOTIFICATIONS, PHONE_SERVER, SELF_NAME_PLACEHOLDER,
};
