//! Persisted collections for chat messages and tasks.
//!
//! A [`Store`] owns two [`Collection`]s. Each collection keeps its records in
//! memory in insertion order; that copy is the runtime truth. With a `redb://`
//! URI every write is also flushed to a redb save file that is loaded again on
//! the next connect. All redb work runs on the blocking pool. Committed writes
//! are announced on a payload-free change feed which [`Collection::watch`]
//! exposes as a [`ChangeStream`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use connectpoint_proto::message::{ChatMessage, MessageId};
use connectpoint_proto::task::{Task, TaskId};
use connectpoint_proto::validate::ValidationError;
use redb::{Database, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{RwLock, broadcast};

use crate::config::StoreConfig;

/// Capacity of each collection's change feed before subscribers lag.
const CHANGE_FEED_CAPACITY: usize = 64;

const MESSAGES_TABLE: &str = "messages";
const TASKS_TABLE: &str = "tasks";

/// Errors produced by store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The save file could not be opened, read or written.
    #[error("storage error: {0}")]
    Storage(String),

    /// The store directory could not be created.
    #[error("failed to create store directory {path}: {source}")]
    CreateDir {
        /// Directory that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A record could not be serialized for the save file.
    #[error("failed to encode {collection} record: {source}")]
    Encode {
        /// Collection being written.
        collection: &'static str,
        /// Underlying serializer error.
        source: serde_json::Error,
    },

    /// A stored record could not be read back.
    #[error("failed to decode stored {collection} record: {source}")]
    Decode {
        /// Collection being loaded.
        collection: &'static str,
        /// Underlying deserializer error.
        source: serde_json::Error,
    },

    /// No record carries the requested id.
    #[error("no {collection} record with id {id}")]
    NotFound {
        /// Collection searched.
        collection: &'static str,
        /// The id that was requested.
        id: String,
    },

    /// The mutation was refused by the record.
    #[error("mutation rejected: {0}")]
    Rejected(#[from] ValidationError),

    /// The store was opened without a change feed.
    #[error("change notifications are not available on this store")]
    WatchUnsupported,

    /// The connection string names no known backend.
    #[error("unsupported store URI {0:?} (expected memory:// or redb://<directory>)")]
    InvalidUri(String),
}

// redb 2.x splits its errors across many types; they all become `Storage`.
macro_rules! from_redb {
    ($($t:ty),*) => {
        $(impl From<$t> for StoreError {
            fn from(e: $t) -> Self {
                Self::Storage(e.to_string())
            }
        })*
    };
}

from_redb!(
    redb::Error,
    redb::DatabaseError,
    redb::TableError,
    redb::TransactionError,
    redb::StorageError,
    redb::CommitError
);

/// A document that lives in a [`Collection`].
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// The record's identity, empty until the store assigns one.
    fn id(&self) -> &str;

    /// Sets the identity on insert.
    fn assign_id(&mut self, id: String);
}

impl Record for ChatMessage {
    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn assign_id(&mut self, id: String) {
        self.id = MessageId::new(id);
    }
}

impl Record for Task {
    fn id(&self) -> &str {
        self.id.as_str()
    }

    fn assign_id(&mut self, id: String) {
        self.id = TaskId::new(id);
    }
}

// ---------------------------------------------------------------------------
// Save file
// ---------------------------------------------------------------------------

/// Thin handle to the redb file. Cloneable (Arc inside).
#[derive(Clone)]
struct SaveFile {
    db: Arc<Database>,
}

impl SaveFile {
    /// Opens (or creates) the save file and makes sure every table exists.
    fn open(path: &Path) -> Result<Self, StoreError> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        {
            let _ = txn.open_table(table(MESSAGES_TABLE))?;
            let _ = txn.open_table(table(TASKS_TABLE))?;
        }
        txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Loads every record of one table in insertion order.
    fn load<T: Record>(&self, name: &'static str) -> Result<Vec<T>, StoreError> {
        let txn = self.db.begin_read()?;
        let records = txn.open_table(table(name))?;
        let mut loaded = Vec::new();
        for entry in records.iter()? {
            let (_, value) = entry?;
            let record = serde_json::from_slice(value.value()).map_err(|source| {
                StoreError::Decode {
                    collection: name,
                    source,
                }
            })?;
            loaded.push(record);
        }
        Ok(loaded)
    }

    /// Writes encoded records at their positions in one transaction, on the
    /// blocking pool.
    async fn put(&self, name: &'static str, rows: Vec<(u64, Vec<u8>)>) -> Result<(), StoreError> {
        let save = self.clone();
        blocking(move || save.commit(name, &rows)).await
    }

    fn commit(&self, name: &'static str, rows: &[(u64, Vec<u8>)]) -> Result<(), StoreError> {
        let txn = self.db.begin_write()?;
        {
            let mut records = txn.open_table(table(name))?;
            for (position, bytes) in rows {
                records.insert(*position, bytes.as_slice())?;
            }
        }
        txn.commit()?;
        Ok(())
    }
}

/// Runs redb work on tokio's blocking pool.
async fn blocking<R, F>(work: F) -> Result<R, StoreError>
where
    R: Send + 'static,
    F: FnOnce() -> Result<R, StoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| StoreError::Storage(format!("storage task failed: {e}")))?
}

const fn table(name: &str) -> TableDefinition<'_, u64, &'static [u8]> {
    TableDefinition::new(name)
}

// ---------------------------------------------------------------------------
// Change feed
// ---------------------------------------------------------------------------

/// Notifications that a collection changed. Carries no payload: a wake
/// means "re-read the collection".
pub struct ChangeStream {
    collection: &'static str,
    rx: broadcast::Receiver<()>,
}

impl ChangeStream {
    /// Waits for the next change.
    ///
    /// Returns `None` once the store is gone. If this subscriber fell behind,
    /// the missed notifications are folded into a single wake.
    pub async fn next(&mut self) -> Option<()> {
        match self.rx.recv().await {
            Ok(()) => Some(()),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(
                    collection = self.collection,
                    skipped,
                    "change stream lagged, coalescing"
                );
                Some(())
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

/// An ordered set of records with optional persistence and change feed.
pub struct Collection<T> {
    name: &'static str,
    records: RwLock<Vec<T>>,
    save: Option<SaveFile>,
    changes: Option<broadcast::Sender<()>>,
}

impl<T: Record> Collection<T> {
    fn new(name: &'static str, records: Vec<T>, save: Option<SaveFile>, change_feed: bool) -> Self {
        Self {
            name,
            records: RwLock::new(records),
            save,
            changes: change_feed.then(|| broadcast::channel(CHANGE_FEED_CAPACITY).0),
        }
    }

    /// Collection name, as used in logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Inserts a record, assigning a fresh UUID v7 identity if it has none.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the record cannot be persisted. The
    /// in-memory copy is left unchanged in that case.
    pub async fn insert(&self, record: T) -> Result<String, StoreError> {
        let mut ids = self.insert_many(vec![record]).await?;
        ids.pop()
            .ok_or_else(|| StoreError::Storage("insert produced no id".to_string()))
    }

    /// Inserts several records in one write, in the given order.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the batch cannot be persisted. Nothing is
    /// inserted in that case.
    pub async fn insert_many(&self, batch: Vec<T>) -> Result<Vec<String>, StoreError> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let mut records = self.records.write().await;
        let mut ids = Vec::with_capacity(batch.len());
        let mut prepared = Vec::with_capacity(batch.len());
        for mut record in batch {
            if record.id().is_empty() {
                record.assign_id(uuid::Uuid::now_v7().to_string());
            }
            ids.push(record.id().to_string());
            prepared.push(record);
        }

        if let Some(save) = &self.save {
            let start = records.len() as u64;
            let rows = prepared
                .iter()
                .zip(start..)
                .map(|(record, position)| Ok((position, self.encode(record)?)))
                .collect::<Result<Vec<_>, StoreError>>()?;
            save.put(self.name, rows).await?;
        }

        records.extend(prepared);
        drop(records);

        tracing::debug!(collection = self.name, count = ids.len(), "records inserted");
        self.notify();
        Ok(ids)
    }

    /// Applies `mutate` to the record with the given id.
    ///
    /// The mutation runs on a copy; the stored record is only replaced once
    /// the mutation succeeded and the copy was persisted.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown id,
    /// [`StoreError::Rejected`] if `mutate` refuses the change, or a storage
    /// error if the result cannot be persisted.
    pub async fn update_by_id<F>(&self, id: &str, mutate: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut T) -> Result<(), ValidationError>,
    {
        let mut records = self.records.write().await;
        let Some(position) = records.iter().position(|r| r.id() == id) else {
            return Err(StoreError::NotFound {
                collection: self.name,
                id: id.to_string(),
            });
        };

        let mut updated = records[position].clone();
        mutate(&mut updated)?;

        if let Some(save) = &self.save {
            save.put(self.name, vec![(position as u64, self.encode(&updated)?)])
                .await?;
        }

        records[position] = updated;
        drop(records);

        tracing::debug!(collection = self.name, id = %id, "record updated");
        self.notify();
        Ok(())
    }

    /// Holds the write lock, stalling every write to this collection until
    /// the guard is dropped.
    #[cfg(test)]
    pub(crate) async fn hold_writes(&self) -> tokio::sync::RwLockWriteGuard<'_, Vec<T>> {
        self.records.write().await
    }

    /// Every record, in insertion order.
    pub async fn find_all(&self) -> Vec<T> {
        self.records.read().await.clone()
    }

    /// Number of records.
    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }

    /// Subscribes to change notifications for writes committed from now on.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::WatchUnsupported`] if the store was opened
    /// without a change feed.
    pub fn watch(&self) -> Result<ChangeStream, StoreError> {
        let tx = self.changes.as_ref().ok_or(StoreError::WatchUnsupported)?;
        Ok(ChangeStream {
            collection: self.name,
            rx: tx.subscribe(),
        })
    }

    fn encode(&self, record: &T) -> Result<Vec<u8>, StoreError> {
        serde_json::to_vec(record).map_err(|source| StoreError::Encode {
            collection: self.name,
            source,
        })
    }

    fn notify(&self) {
        if let Some(tx) = &self.changes {
            // No subscribers is fine: nobody is watching yet.
            let _ = tx.send(());
        }
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// The two collections backing the workspace.
pub struct Store {
    /// Chat messages across all channels.
    pub messages: Collection<ChatMessage>,
    /// Task board.
    pub tasks: Collection<Task>,
}

impl Store {
    /// Opens the store named by `config`.
    ///
    /// `memory://` keeps everything in process. `redb://<dir>` loads and
    /// flushes `<dir>/<database>.redb`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidUri`] for any other scheme, or a storage
    /// error if the save file cannot be opened or read.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let uri = config.uri.trim();
        if uri == "memory://" {
            tracing::info!(database = %config.database, "opening in-memory store");
            return Ok(Self::in_memory(config.change_feed));
        }

        let Some(dir) = uri.strip_prefix("redb://").filter(|d| !d.is_empty()) else {
            return Err(StoreError::InvalidUri(config.uri.clone()));
        };

        let dir = PathBuf::from(dir);
        let path = dir.join(format!("{}.redb", config.database));
        let (save, messages, tasks) = {
            let path = path.clone();
            blocking(move || {
                std::fs::create_dir_all(&dir).map_err(|source| StoreError::CreateDir {
                    path: dir.clone(),
                    source,
                })?;
                let save = SaveFile::open(&path)?;
                let messages = save.load::<ChatMessage>(MESSAGES_TABLE)?;
                let tasks = save.load::<Task>(TASKS_TABLE)?;
                Ok((save, messages, tasks))
            })
            .await?
        };
        tracing::info!(
            path = %path.display(),
            messages = messages.len(),
            tasks = tasks.len(),
            "opened redb store"
        );

        Ok(Self {
            messages: Collection::new(
                MESSAGES_TABLE,
                messages,
                Some(save.clone()),
                config.change_feed,
            ),
            tasks: Collection::new(TASKS_TABLE, tasks, Some(save), config.change_feed),
        })
    }

    /// An empty in-process store.
    #[must_use]
    pub fn in_memory(change_feed: bool) -> Self {
        Self {
            messages: Collection::new(MESSAGES_TABLE, Vec::new(), None, change_feed),
            tasks: Collection::new(TASKS_TABLE, Vec::new(), None, change_feed),
        }
    }
}
