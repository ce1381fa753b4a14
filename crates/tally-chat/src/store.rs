//! Conversation store: the ordered list of threads and their committed turns.
//!
//! Threads are kept newest first. The store is the only place turns are
//! written; a turn is immutable once committed.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tally_ai::{ChatMessage, Role};

use crate::{
    error::{Error, Result},
    storage::KeyValueStorage,
};

/// Title every thread starts with until one is synthesized
pub const PLACEHOLDER_TITLE: &str = "New Chat";

/// Storage key the whole store is saved under
pub const STORAGE_KEY: &str = "chat-history";

/// A store shared between the session and the UI.
///
/// The lock must never be held across an `.await`.
pub type SharedStore = Arc<Mutex<ConversationStore>>;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

/// Runtime identity of a thread. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadId(u64);

impl ThreadId {
    fn next() -> Self {
        Self(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ThreadId {
    fn default() -> Self {
        Self::next()
    }
}

/// One committed message in a thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Model selected when the turn was produced
    #[serde(default)]
    pub model: String,
    /// Cost in the display currency; always 0 for user turns
    #[serde(default)]
    pub cost: f64,
}

impl Turn {
    pub fn user(content: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            model: model.into(),
            cost: 0.0,
        }
    }

    pub fn assistant(content: impl Into<String>, model: impl Into<String>, cost: f64) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            model: model.into(),
            cost: cost.max(0.0),
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    /// The part of the turn sent back to the API as context
    pub fn to_message(&self) -> ChatMessage {
        ChatMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// A named conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Thread {
    #[serde(skip)]
    id: ThreadId,
    pub title: String,
    #[serde(rename = "chat")]
    pub turns: Vec<Turn>,
}

// Identity is runtime-only, so equality covers the persisted fields.
impl PartialEq for Thread {
    fn eq(&self, other: &Self) -> bool {
        self.title == other.title && self.turns == other.turns
    }
}

impl Thread {
    pub fn new() -> Self {
        Self {
            id: ThreadId::next(),
            title: PLACEHOLDER_TITLE.to_string(),
            turns: Vec::new(),
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Whether the thread still carries the placeholder title
    pub fn is_untitled(&self) -> bool {
        self.title == PLACEHOLDER_TITLE
    }

    /// Sum of all turn costs
    pub fn total_cost(&self) -> f64 {
        self.turns.iter().map(|t| t.cost).sum()
    }
}

impl Default for Thread {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct PersistedRef<'a> {
    list: &'a [Thread],
}

#[derive(Deserialize)]
struct Persisted {
    #[serde(default)]
    list: Vec<Thread>,
}

/// In-memory list of threads plus the active selection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationStore {
    threads: Vec<Thread>,
    active: Option<usize>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from existing threads; the first one becomes active
    pub fn from_threads(threads: Vec<Thread>) -> Self {
        let active = if threads.is_empty() { None } else { Some(0) };
        Self { threads, active }
    }

    pub fn into_shared(self) -> SharedStore {
        Arc::new(Mutex::new(self))
    }

    pub fn threads(&self) -> &[Thread] {
        &self.threads
    }

    pub fn thread(&self, index: usize) -> Option<&Thread> {
        self.threads.get(index)
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn active(&self) -> Option<usize> {
        self.active
    }

    pub fn active_thread(&self) -> Option<&Thread> {
        self.active.and_then(|i| self.threads.get(i))
    }

    /// Current index of a thread, if it still exists
    pub fn index_of(&self, id: ThreadId) -> Option<usize> {
        self.threads.iter().position(|t| t.id == id)
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index < self.threads.len() {
            Ok(())
        } else {
            Err(Error::Index {
                index,
                len: self.threads.len(),
            })
        }
    }

    /// Insert an empty thread at the front and make it active
    pub fn add_thread(&mut self) -> ThreadId {
        let thread = Thread::new();
        let id = thread.id;
        self.threads.insert(0, thread);
        self.active = Some(0);
        id
    }

    /// Remove a thread and re-derive the active selection
    pub fn delete_thread(&mut self, index: usize) -> Result<Thread> {
        self.check_index(index)?;
        let removed = self.threads.remove(index);
        let len = self.threads.len();
        self.active = if len > index {
            Some(index)
        } else {
            len.checked_sub(1)
        };
        Ok(removed)
    }

    pub fn select(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        self.active = Some(index);
        Ok(())
    }

    /// Append a turn to a thread
    pub fn commit_turn(&mut self, thread_index: usize, turn: Turn) -> Result<()> {
        self.check_index(thread_index)?;
        self.threads[thread_index].turns.push(turn);
        Ok(())
    }

    pub fn set_title(&mut self, thread_index: usize, title: impl Into<String>) -> Result<()> {
        self.check_index(thread_index)?;
        self.threads[thread_index].title = title.into();
        Ok(())
    }

    /// Drop turns appended after `len`, if the thread still exists
    pub(crate) fn truncate_turns(&mut self, id: ThreadId, len: usize) {
        if let Some(thread) = self.threads.iter_mut().find(|t| t.id == id) {
            thread.turns.truncate(len);
        }
    }

    /// Serialize to the persisted JSON layout
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&PersistedRef {
            list: &self.threads,
        })?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let persisted: Persisted = serde_json::from_str(json)?;
        Ok(Self::from_threads(persisted.list))
    }

    /// Load the store. A missing or corrupt entry yields an empty store.
    pub async fn load(storage: &dyn KeyValueStorage) -> Result<Self> {
        let Some(json) = storage.get(STORAGE_KEY).await? else {
            return Ok(Self::new());
        };
        match Self::from_json(&json) {
            Ok(store) => {
                tracing::debug!(threads = store.len(), "loaded conversation store");
                Ok(store)
            }
            Err(e) => {
                tracing::warn!("Discarding unreadable conversation data: {}", e);
                Ok(Self::new())
            }
        }
    }

    pub async fn save(&self, storage: &dyn KeyValueStorage) -> Result<()> {
        let json = self.to_json()?;
        storage.set(STORAGE_KEY, &json).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn sample_store() -> ConversationStore {
        let mut store = ConversationStore::new();
        store.add_thread();
        store.commit_turn(0, Turn::user("Hello", "gpt-4o-mini")).unwrap();
        store
            .commit_turn(0, Turn::assistant("Hi there", "gpt-4o-mini", 0.000_293_25))
            .unwrap();
        store.set_title(0, "挨拶").unwrap();
        store.add_thread();
        store
    }

    #[test]
    fn test_add_thread_on_empty_store() {
        let mut store = ConversationStore::new();
        assert_eq!(store.active(), None);

        store.add_thread();
        assert_eq!(store.len(), 1);
        assert_eq!(store.active(), Some(0));
        let thread = store.active_thread().unwrap();
        assert_eq!(thread.title, PLACEHOLDER_TITLE);
        assert!(thread.turns.is_empty());
    }

    #[test]
    fn test_add_thread_inserts_at_front() {
        let mut store = ConversationStore::new();
        let first = store.add_thread();
        let second = store.add_thread();
        assert_eq!(store.index_of(second), Some(0));
        assert_eq!(store.index_of(first), Some(1));
    }

    #[test]
    fn test_delete_only_thread() {
        let mut store = ConversationStore::new();
        store.add_thread();
        store.delete_thread(0).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.active(), None);
    }

    #[test]
    fn test_delete_keeps_index_when_valid() {
        let mut store = ConversationStore::new();
        for _ in 0..3 {
            store.add_thread();
        }
        store.delete_thread(1).unwrap();
        assert_eq!(store.active(), Some(1));
        store.delete_thread(1).unwrap();
        assert_eq!(store.active(), Some(0));
    }

    #[test]
    fn test_delete_out_of_range() {
        let mut store = ConversationStore::new();
        store.add_thread();
        assert!(matches!(
            store.delete_thread(1),
            Err(Error::Index { index: 1, len: 1 })
        ));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_active_always_valid() {
        let mut store = ConversationStore::new();
        // Deterministic mix of adds and deletes at varying positions
        let ops = [0, 0, 1, 5, 0, 2, 7, 1, 0, 0, 3, 9, 4, 0, 0, 0, 1];
        for (step, op) in ops.iter().enumerate() {
            if step % 3 == 2 || store.is_empty() {
                store.add_thread();
            } else {
                let index = op % store.len();
                store.delete_thread(index).unwrap();
            }
            match store.active() {
                Some(i) => assert!(i < store.len(), "step {}: {} >= {}", step, i, store.len()),
                None => assert!(store.is_empty(), "step {}", step),
            }
        }
    }

    #[test]
    fn test_select() {
        let mut store = sample_store();
        store.select(1).unwrap();
        assert_eq!(store.active_thread().unwrap().title, "挨拶");
        assert!(store.select(2).is_err());
        assert_eq!(store.active(), Some(1));
    }

    #[test]
    fn test_persisted_layout() {
        let mut store = ConversationStore::new();
        store.add_thread();
        store.commit_turn(0, Turn::user("Hello", "gpt-4o")).unwrap();
        store.commit_turn(0, Turn::assistant("Hi", "gpt-4o", 1.5)).unwrap();

        let json: serde_json::Value = serde_json::from_str(&store.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "list": [{
                    "title": "New Chat",
                    "chat": [
                        {"role": "user", "content": "Hello", "model": "gpt-4o", "cost": 0.0},
                        {"role": "assistant", "content": "Hi", "model": "gpt-4o", "cost": 1.5}
                    ]
                }]
            })
        );
    }

    #[test]
    fn test_json_round_trip() {
        let store = sample_store();
        let restored = ConversationStore::from_json(&store.to_json().unwrap()).unwrap();
        assert_eq!(restored.threads(), store.threads());
        assert_eq!(restored.thread(1).unwrap().turns[1].cost, 0.000_293_25);
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let store = sample_store();
        assert_eq!(store.to_json().unwrap(), store.to_json().unwrap());
        let restored = ConversationStore::from_json(&store.to_json().unwrap()).unwrap();
        assert_eq!(restored.to_json().unwrap(), store.to_json().unwrap());
    }

    #[test]
    fn test_reads_entries_without_model_or_cost() {
        let json = r#"{"list":[{"title":"old","chat":[{"role":"user","content":"hi"}]}]}"#;
        let store = ConversationStore::from_json(json).unwrap();
        assert_eq!(store.thread(0).unwrap().turns[0].model, "");
        assert_eq!(store.thread(0).unwrap().turns[0].cost, 0.0);
        assert_eq!(store.active(), Some(0));
    }

    #[test]
    fn test_loaded_threads_get_distinct_ids() {
        let store = ConversationStore::from_json(&sample_store().to_json().unwrap()).unwrap();
        assert_ne!(store.thread(0).unwrap().id(), store.thread(1).unwrap().id());
    }

    #[test]
    fn test_truncate_turns_by_id() {
        let mut store = sample_store();
        let id = store.thread(1).unwrap().id();
        store.truncate_turns(id, 1);
        assert_eq!(store.thread(1).unwrap().turns.len(), 1);

        store.delete_thread(1).unwrap();
        store.truncate_turns(id, 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_total_cost() {
        let store = sample_store();
        assert_eq!(store.thread(1).unwrap().total_cost(), 0.000_293_25);
        assert_eq!(store.thread(0).unwrap().total_cost(), 0.0);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let storage = MemoryStorage::new();
        let store = sample_store();
        store.save(&storage).await.unwrap();

        let loaded = ConversationStore::load(&storage).await.unwrap();
        assert_eq!(loaded.threads(), store.threads());
    }

    #[tokio::test]
    async fn test_save_twice_is_byte_identical() {
        let storage = MemoryStorage::new();
        let store = sample_store();
        store.save(&storage).await.unwrap();
        let first = storage.get(STORAGE_KEY).await.unwrap();
        store.save(&storage).await.unwrap();
        assert_eq!(storage.get(STORAGE_KEY).await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_load_missing_key() {
        let storage = MemoryStorage::new();
        let store = ConversationStore::load(&storage).await.unwrap();
        assert!(store.is_empty());
        assert_eq!(store.active(), None);
    }

    #[tokio::test]
    async fn test_load_corrupt_data_recovers() {
        let storage = MemoryStorage::new();
        storage.set(STORAGE_KEY, "{\"list\": [oops").await.unwrap();
        let store = ConversationStore::load(&storage).await.unwrap();
        assert!(store.is_empty());
    }
}
