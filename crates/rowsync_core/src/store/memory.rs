//! In-memory reference store.

use super::log::{ChangeLog, LogHead, RowChange};
use super::{Store, StoreTransaction};
use crate::descriptor::{Identity, IdentityKind};
use crate::error::{CoreError, CoreResult};
use crate::predicate::Predicate;
use crate::shape::ValidationError;
use async_trait::async_trait;
use rowsync_sync_protocol::{Row, RowKey, TransactionId};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
struct Table {
    rows: BTreeMap<RowKey, Row>,
    // Last serial identity handed out; never rewound.
    last_serial: i64,
    // Keys of deleted rows. An identity is never handed out twice.
    retired: HashSet<RowKey>,
}

#[derive(Debug, Default)]
struct Tables {
    tables: HashMap<String, Table>,
}

/// Single-writer, in-memory [`Store`].
///
/// ## Single-Writer Guarantee
///
/// A transaction holds the store's write lock from `begin` until it is
/// committed, rolled back or dropped. Transaction ids are issued under that
/// lock, so they increase in commit order, and committed changes reach the
/// [`ChangeLog`] in the same order.
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    next_txid: AtomicU64,
    log: Arc<ChangeLog>,
}

impl MemoryStore {
    /// Creates an empty store with a fresh change log.
    pub fn new() -> Self {
        Self::with_log(ChangeLog::new())
    }

    /// Creates an empty store appending to the given log.
    pub fn with_log(log: ChangeLog) -> Self {
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            next_txid: AtomicU64::new(1),
            log: Arc::new(log),
        }
    }

    /// Returns the change log.
    pub fn log(&self) -> &Arc<ChangeLog> {
        &self.log
    }

    /// Reads the rows of a table matching `filter`, together with the log
    /// head the snapshot is consistent with.
    pub async fn snapshot(&self, table: &str, filter: &Predicate) -> (Vec<(RowKey, Row)>, LogHead) {
        let tables = self.tables.lock().await;
        let head = self.log.head();
        let rows = tables
            .tables
            .get(table)
            .map(|t| {
                t.rows
                    .iter()
                    .filter(|(_, row)| filter.matches(row))
                    .map(|(key, row)| (key.clone(), row.clone()))
                    .collect()
            })
            .unwrap_or_default();
        (rows, head)
    }

    /// Reads one row by identity.
    pub async fn get(&self, table: &str, key: &RowKey) -> Option<Row> {
        let tables = self.tables.lock().await;
        tables.tables.get(table)?.rows.get(key).cloned()
    }

    /// Returns the number of rows in a table.
    pub async fn count(&self, table: &str) -> usize {
        let tables = self.tables.lock().await;
        tables.tables.get(table).map_or(0, |t| t.rows.len())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("next_txid", &self.next_txid.load(Ordering::SeqCst))
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn begin(&self) -> CoreResult<Box<dyn StoreTransaction>> {
        // Blocks while another writer is active.
        let guard = self.tables.clone().lock_owned().await;
        let txid = TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst));
        tracing::trace!(%txid, "transaction started");

        Ok(Box::new(MemoryTransaction {
            guard,
            txid,
            undo: Vec::new(),
            changes: Vec::new(),
            log: Arc::clone(&self.log),
            finished: false,
        }))
    }
}

struct Undo {
    table: String,
    key: RowKey,
    previous: Option<Row>,
    retired: bool,
}

struct MemoryTransaction {
    guard: OwnedMutexGuard<Tables>,
    txid: TransactionId,
    undo: Vec<Undo>,
    changes: Vec<RowChange>,
    log: Arc<ChangeLog>,
    finished: bool,
}

impl MemoryTransaction {
    fn table(&mut self, name: &str) -> &mut Table {
        self.guard.tables.entry(name.to_string()).or_default()
    }

    fn record(&mut self, table: &str, key: RowKey, before: Option<Row>, after: Option<Row>) {
        let retired = before.is_some() && after.is_none();
        if retired {
            self.table(table).retired.insert(key.clone());
        }
        self.undo.push(Undo {
            table: table.to_string(),
            key: key.clone(),
            previous: before.clone(),
            retired,
        });
        self.changes.push(RowChange {
            table: table.to_string(),
            key,
            before,
            after,
        });
    }

    fn matching_keys(&mut self, table: &str, matcher: &Predicate) -> Vec<RowKey> {
        self.table(table)
            .rows
            .iter()
            .filter(|(_, row)| matcher.matches(row))
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn undo_all(&mut self) {
        while let Some(undo) = self.undo.pop() {
            let table = self.table(&undo.table);
            if undo.retired {
                table.retired.remove(&undo.key);
            }
            match undo.previous {
                Some(row) => {
                    table.rows.insert(undo.key, row);
                }
                None => {
                    table.rows.remove(&undo.key);
                }
            }
        }
        self.changes.clear();
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn insert(&mut self, table: &str, identity: &Identity, mut row: Row) -> CoreResult<Row> {
        let t = self.table(table);

        let key = match row.get(&identity.column) {
            None | Some(Value::Null) => match identity.kind {
                IdentityKind::Serial => {
                    t.last_serial += 1;
                    RowKey::Int(t.last_serial)
                }
                IdentityKind::Uuid => RowKey::Text(uuid::Uuid::new_v4().to_string()),
            },
            Some(value) => {
                let key = RowKey::from_value(value).ok_or_else(|| {
                    ValidationError::field(&identity.column, "identity must be an integer or text")
                })?;
                if t.rows.contains_key(&key) || t.retired.contains(&key) {
                    return Err(CoreError::DuplicateKey {
                        table: table.to_string(),
                        key,
                    });
                }
                if let RowKey::Int(n) = &key {
                    t.last_serial = t.last_serial.max(*n);
                }
                key
            }
        };

        row.insert(identity.column.clone(), key.to_value());
        t.rows.insert(key.clone(), row.clone());
        self.record(table, key, None, Some(row.clone()));
        Ok(row)
    }

    async fn update(
        &mut self,
        table: &str,
        matcher: &Predicate,
        patch: &Row,
    ) -> CoreResult<Vec<Row>> {
        let keys = self.matching_keys(table, matcher);
        let mut updated = Vec::with_capacity(keys.len());

        for key in keys {
            let t = self.table(table);
            let Some(row) = t.rows.get_mut(&key) else {
                continue;
            };
            let before = row.clone();
            for (column, value) in patch {
                row.insert(column.clone(), value.clone());
            }
            let after = row.clone();
            self.record(table, key, Some(before), Some(after.clone()));
            updated.push(after);
        }

        Ok(updated)
    }

    async fn delete(&mut self, table: &str, matcher: &Predicate) -> CoreResult<Vec<Row>> {
        let keys = self.matching_keys(table, matcher);
        let mut removed = Vec::with_capacity(keys.len());

        for key in keys {
            if let Some(row) = self.table(table).rows.remove(&key) {
                self.record(table, key, Some(row.clone()), None);
                removed.push(row);
            }
        }

        Ok(removed)
    }

    async fn select(&mut self, table: &str, matcher: &Predicate) -> CoreResult<Vec<Row>> {
        Ok(self
            .table(table)
            .rows
            .values()
            .filter(|row| matcher.matches(row))
            .cloned()
            .collect())
    }

    async fn transaction_id(&mut self) -> CoreResult<TransactionId> {
        Ok(self.txid)
    }

    async fn commit(self: Box<Self>) -> CoreResult<()> {
        let mut tx = self;
        let changes = coalesce(std::mem::take(&mut tx.changes));
        let count = changes.len();
        let offset = tx.log.append(tx.txid, changes);
        tx.undo.clear();
        tx.finished = true;
        tracing::debug!(txid = %tx.txid, changes = count, offset, "transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> CoreResult<()> {
        let mut tx = self;
        tx.undo_all();
        tx.finished = true;
        tracing::debug!(txid = %tx.txid, "transaction rolled back");
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.undo_all();
            tracing::debug!(txid = %self.txid, "uncommitted transaction dropped");
        }
    }
}

// Folds repeated changes to the same row into one, so a transaction yields
// at most one log entry per row.
fn coalesce(changes: Vec<RowChange>) -> Vec<RowChange> {
    let mut merged: Vec<RowChange> = Vec::with_capacity(changes.len());
    for change in changes {
        match merged
            .iter_mut()
            .find(|c| c.table == change.table && c.key == change.key)
        {
            Some(existing) => existing.after = change.after,
            None => merged.push(change),
        }
    }
    merged
        .into_iter()
        .filter(|c| c.before.is_some() || c.after.is_some())
        .collect()
}
