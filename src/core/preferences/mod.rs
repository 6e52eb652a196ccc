use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use crate::core::error::{NotifierError, NotifierResult};

/// Which process keys each chat wants to hear about.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Replaces the chat's whole subscription set.
    async fn save(&self, chat_id: i64, keys: &[String]) -> NotifierResult<()>;
    /// Flips one subscription and returns whether the chat is now subscribed.
    async fn toggle(&self, chat_id: i64, key: &str) -> NotifierResult<bool>;
    /// Empty for chats that never saved anything.
    async fn get(&self, chat_id: i64) -> NotifierResult<BTreeSet<String>>;
    async fn subscribers(&self, key: &str) -> NotifierResult<Vec<i64>>;

    fn is_persistent(&self) -> bool {
        true
    }
}

pub struct SqlitePreferenceStore {
    db: Arc<Mutex<Connection>>,
}

impl SqlitePreferenceStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    pub async fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let db = Connection::open(path)?;
        info!("Opened preference database at {}", path.display());
        let store = Self::new(Arc::new(Mutex::new(db)));
        store.initialize().await?;
        Ok(store)
    }

    pub async fn initialize(&self) -> NotifierResult<()> {
        let db = self.db.lock().await;
        db.execute(
            "CREATE TABLE IF NOT EXISTS user_preferences (
                chat_id INTEGER NOT NULL,
                process_key TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (chat_id, process_key)
            )",
            [],
        )?;
        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_user_preferences_key ON user_preferences(process_key)",
            [],
        )?;
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for SqlitePreferenceStore {
    async fn save(&self, chat_id: i64, keys: &[String]) -> NotifierResult<()> {
        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        tx.execute(
            "DELETE FROM user_preferences WHERE chat_id = ?1",
            params![chat_id],
        )?;
        for key in keys {
            tx.execute(
                "INSERT INTO user_preferences (chat_id, process_key) VALUES (?1, ?2)
                 ON CONFLICT(chat_id, process_key) DO NOTHING",
                params![chat_id, key],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn toggle(&self, chat_id: i64, key: &str) -> NotifierResult<bool> {
        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        let existing: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM user_preferences WHERE chat_id = ?1 AND process_key = ?2",
                params![chat_id, key],
                |row| row.get(0),
            )
            .optional()?;
        let subscribed = if existing.is_some() {
            tx.execute(
                "DELETE FROM user_preferences WHERE chat_id = ?1 AND process_key = ?2",
                params![chat_id, key],
            )?;
            false
        } else {
            tx.execute(
                "INSERT INTO user_preferences (chat_id, process_key) VALUES (?1, ?2)",
                params![chat_id, key],
            )?;
            true
        };
        tx.commit()?;
        Ok(subscribed)
    }

    async fn get(&self, chat_id: i64) -> NotifierResult<BTreeSet<String>> {
        let db = self.db.lock().await;
        let mut stmt =
            db.prepare("SELECT process_key FROM user_preferences WHERE chat_id = ?1")?;
        let rows = stmt.query_map(params![chat_id], |row| row.get(0))?;

        let mut keys = BTreeSet::new();
        for key in rows {
            keys.insert(key?);
        }
        Ok(keys)
    }

    async fn subscribers(&self, key: &str) -> NotifierResult<Vec<i64>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT chat_id FROM user_preferences WHERE process_key = ?1 ORDER BY chat_id",
        )?;
        let rows = stmt.query_map(params![key], |row| row.get(0))?;

        let mut chats = Vec::new();
        for chat in rows {
            chats.push(chat?);
        }
        Ok(chats)
    }
}

/// Deployments without a preference database: every alert goes to a fixed
/// list of chats and subscriptions cannot be edited.
pub struct FixedRecipients {
    chat_ids: Vec<i64>,
}

impl FixedRecipients {
    pub fn new(chat_ids: Vec<i64>) -> Self {
        Self { chat_ids }
    }
}

#[async_trait]
impl PreferenceStore for FixedRecipients {
    async fn save(&self, _chat_id: i64, _keys: &[String]) -> NotifierResult<()> {
        Err(NotifierError::Persistence(
            "notification preferences are disabled".to_string(),
        ))
    }

    async fn toggle(&self, _chat_id: i64, _key: &str) -> NotifierResult<bool> {
        Err(NotifierError::Persistence(
            "notification preferences are disabled".to_string(),
        ))
    }

    async fn get(&self, _chat_id: i64) -> NotifierResult<BTreeSet<String>> {
        Ok(BTreeSet::new())
    }

    async fn subscribers(&self, _key: &str) -> NotifierResult<Vec<i64>> {
        Ok(self.chat_ids.clone())
    }

    fn is_persistent(&self) -> bool {
        false
    }
}
