//! Session lifecycle management

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::session::{ChatSession, Sender, SessionStore};
use crate::Result;

/// Session manager: in-memory cache in front of the SQLite store, plus a
/// per-sender lock so concurrent webhooks from the same sender serialize
/// their read-modify-write cycle. Independent senders are not affected by
/// each other's locks.
pub struct SessionManager {
    /// Persistent storage (wrapped in Mutex for thread safety)
    store: Arc<Mutex<SessionStore>>,
    /// In-memory cache for active sessions
    cache: Arc<RwLock<HashMap<String, ChatSession>>>,
    /// Per-sender serialization locks
    locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    /// Maximum non-system messages per session (0 = unlimited)
    max_messages: usize,
}

impl SessionManager {
    /// Create a new session manager with a database path
    pub fn new(db_path: &str, max_messages: usize) -> Result<Self> {
        let store = SessionStore::new(db_path)?;
        Ok(Self {
            store: Arc::new(Mutex::new(store)),
            cache: Arc::new(RwLock::new(HashMap::new())),
            locks: DashMap::new(),
            max_messages,
        })
    }

    /// Create an in-memory session manager (for testing)
    pub fn in_memory() -> Result<Self> {
        let store = SessionStore::in_memory()?;
        Ok(Self {
            store: Arc::new(Mutex::new(store)),
            cache: Arc::new(RwLock::new(HashMap::new())),
            locks: DashMap::new(),
            max_messages: 0,
        })
    }

    /// Get the serialization lock for a sender key. Callers hold the guard
    /// across their whole get_or_create → mutate → save cycle.
    pub fn sender_lock(&self, phone_number: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.locks
            .entry(phone_number.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Get the existing session for a sender, or create one seeded with the
    /// start template as its sole system message. Newly created sessions are
    /// cached but only persisted by an explicit `save`.
    pub async fn get_or_create(&self, sender: &Sender, start_template: &str) -> Result<ChatSession> {
        // Check cache first
        {
            let cache = self.cache.read().await;
            if let Some(session) = cache.get(&sender.phone_number) {
                debug!("Session found in cache for {}", sender.phone_number);
                return Ok(session.clone());
            }
        }

        // Try to load from store
        let stored = {
            let store = self.store.lock().unwrap();
            store.load(&sender.phone_number)?
        };
        if let Some(session) = stored {
            debug!("Session loaded from store for {}", sender.phone_number);
            let mut cache = self.cache.write().await;
            cache.insert(sender.phone_number.clone(), session.clone());
            return Ok(session);
        }

        // Create new session
        info!("Creating new session for {}", sender.phone_number);
        let session = ChatSession::new(sender.clone(), start_template);
        let mut cache = self.cache.write().await;
        cache.insert(sender.phone_number.clone(), session.clone());

        Ok(session)
    }

    /// Persist a session (write-through: cache + store, last-writer-wins).
    /// Applies the retention bound when one is configured.
    pub async fn save(&self, session: &ChatSession) -> Result<()> {
        let mut session = session.clone();

        // Trim oldest turns past the bound; slot 0 (system prompt) stays.
        if self.max_messages > 0 {
            while session.messages.len() > self.max_messages + 1 {
                session.messages.remove(1);
            }
        }

        {
            let store = self.store.lock().unwrap();
            store.save(&session)?;
        }

        let mut cache = self.cache.write().await;
        cache.insert(session.sender.phone_number.clone(), session);

        Ok(())
    }

    /// Number of persisted sessions
    pub fn stored_count(&self) -> Result<usize> {
        let store = self.store.lock().unwrap();
        store.count()
    }
}
