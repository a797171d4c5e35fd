//! Committed change log.
//!
//! Every committed transaction appends its row changes to the log, in
//! commit order, each at the next offset. Readers poll entries after an
//! offset and can wait for new entries through a watch channel. The log
//! keeps a bounded history; offsets older than the retained history can no
//! longer be resumed from.

use crate::predicate::Predicate;
use parking_lot::RwLock;
use rowsync_sync_protocol::{ChangeEvent, ChangeOperation, Row, RowKey, TransactionId};
use std::collections::VecDeque;
use tokio::sync::watch;

/// A row change recorded by a transaction, before it is committed.
#[derive(Debug, Clone)]
pub(crate) struct RowChange {
    pub(crate) table: String,
    pub(crate) key: RowKey,
    pub(crate) before: Option<Row>,
    pub(crate) after: Option<Row>,
}

impl RowChange {
    fn operation(&self) -> Option<ChangeOperation> {
        match (&self.before, &self.after) {
            (None, Some(_)) => Some(ChangeOperation::Insert),
            (Some(_), Some(_)) => Some(ChangeOperation::Update),
            (Some(_), None) => Some(ChangeOperation::Delete),
            (None, None) => None,
        }
    }
}

/// One committed row change.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Position in the log, starting at 1.
    pub offset: u64,
    /// Transaction that committed the change.
    pub transaction_id: TransactionId,
    /// Table the row belongs to.
    pub table: String,
    /// Identity of the row.
    pub key: RowKey,
    /// Kind of change.
    pub operation: ChangeOperation,
    /// Row value before the change.
    pub before: Option<Row>,
    /// Row value after the change.
    pub after: Option<Row>,
}

impl LogEntry {
    /// Returns the event a reader restricted to `filter` observes.
    ///
    /// An update that moves a row into the filter is seen as an insert, one
    /// that moves it out as a delete. Changes entirely outside the filter
    /// are not seen at all.
    pub fn visible_event(&self, filter: Option<&Predicate>) -> Option<ChangeEvent> {
        let visible = |row: &Option<Row>| match row {
            Some(row) => filter.map_or(true, |f| f.matches(row)),
            None => false,
        };

        let event = match (visible(&self.before), visible(&self.after)) {
            (true, true) => ChangeEvent::update(&self.table, self.key.clone(), self.after.clone()?),
            (false, true) => ChangeEvent::insert(&self.table, self.key.clone(), self.after.clone()?),
            (true, false) => ChangeEvent::delete(&self.table, self.key.clone(), self.before.clone()?),
            (false, false) => return None,
        };
        Some(event.with_transaction(self.transaction_id))
    }
}

/// Position of the end of the log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogHead {
    /// Offset of the last appended entry, 0 if none.
    pub offset: u64,
    /// Last committed transaction, if any.
    ///
    /// Transactions commit in id order, so every transaction with an id at
    /// or below this one is reflected at or before `offset`.
    pub transaction_id: Option<TransactionId>,
}

#[derive(Debug, Default)]
struct History {
    entries: VecDeque<LogEntry>,
    // Highest offset dropped from history.
    trimmed_through: u64,
    last_transaction: Option<TransactionId>,
}

/// Ordered, bounded log of committed row changes.
pub struct ChangeLog {
    handle: String,
    history: RwLock<History>,
    max_history: usize,
    latest: watch::Sender<u64>,
}

impl ChangeLog {
    /// Creates a log with the default history limit.
    pub fn new() -> Self {
        Self::with_max_history(10_000)
    }

    /// Creates a log with a specific history limit.
    pub fn with_max_history(max_history: usize) -> Self {
        let (latest, _) = watch::channel(0);
        Self {
            handle: uuid::Uuid::new_v4().to_string(),
            history: RwLock::new(History::default()),
            max_history: max_history.max(1),
            latest,
        }
    }

    /// Identifies this log; offsets are only meaningful under their handle.
    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Returns the offset of the last appended entry, 0 if none.
    pub fn latest_offset(&self) -> u64 {
        *self.latest.borrow()
    }

    /// Returns the end of the log.
    pub fn head(&self) -> LogHead {
        let history = self.history.read();
        LogHead {
            offset: self.latest_offset(),
            transaction_id: history.last_transaction,
        }
    }

    /// Returns up to `limit` entries after `after` together with the head
    /// observed at the same instant.
    pub fn poll_with_head(&self, after: u64, limit: usize) -> (Vec<LogEntry>, LogHead) {
        let history = self.history.read();
        let entries = history
            .entries
            .iter()
            .filter(|e| e.offset > after)
            .take(limit)
            .cloned()
            .collect();
        let head = LogHead {
            offset: self.latest_offset(),
            transaction_id: history.last_transaction,
        };
        (entries, head)
    }

    /// Returns true if every entry after `offset` is still retained.
    pub fn can_resume_from(&self, offset: u64) -> bool {
        offset >= self.history.read().trimmed_through && offset <= self.latest_offset()
    }

    /// Returns up to `limit` entries with offset greater than `after`.
    pub fn poll(&self, after: u64, limit: usize) -> Vec<LogEntry> {
        self.history
            .read()
            .entries
            .iter()
            .filter(|e| e.offset > after)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns a receiver notified whenever entries are appended.
    pub fn watch(&self) -> watch::Receiver<u64> {
        self.latest.subscribe()
    }

    /// Returns the number of retained entries.
    pub fn len(&self) -> usize {
        self.history.read().entries.len()
    }

    /// Returns true if no entries are retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn append(&self, transaction_id: TransactionId, changes: Vec<RowChange>) -> u64 {
        let mut history = self.history.write();
        let mut offset = self.latest_offset();

        for change in changes {
            let Some(operation) = change.operation() else {
                continue;
            };
            offset += 1;
            history.entries.push_back(LogEntry {
                offset,
                transaction_id,
                table: change.table,
                key: change.key,
                operation,
                before: change.before,
                after: change.after,
            });
        }

        history.last_transaction = Some(transaction_id);

        while history.entries.len() > self.max_history {
            if let Some(dropped) = history.entries.pop_front() {
                history.trimmed_through = dropped.offset;
            }
        }

        self.latest.send_replace(offset);
        offset
    }
}

impl Default for ChangeLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ChangeLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeLog")
            .field("handle", &self.handle)
            .field("latest_offset", &self.latest_offset())
            .field("max_history", &self.max_history)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(owner: &str) -> Row {
        json!({"id": 1, "user_id": owner}).as_object().cloned().unwrap()
    }

    fn change(before: Option<Row>, after: Option<Row>) -> RowChange {
        RowChange {
            table: "todos".into(),
            key: RowKey::Int(1),
            before,
            after,
        }
    }

    #[test]
    fn append_assigns_consecutive_offsets() {
        let log = ChangeLog::new();
        let last = log.append(
            TransactionId::new(7),
            vec![change(None, Some(row("a"))), change(Some(row("a")), None)],
        );

        assert_eq!(last, 2);
        assert_eq!(log.latest_offset(), 2);
        let entries = log.poll(0, 10);
        assert_eq!(entries[0].operation, ChangeOperation::Insert);
        assert_eq!(entries[1].operation, ChangeOperation::Delete);
        assert!(entries.iter().all(|e| e.transaction_id == TransactionId::new(7)));
        assert_eq!(log.poll(1, 10).len(), 1);
    }

    #[test]
    fn head_tracks_last_commit() {
        let log = ChangeLog::new();
        assert_eq!(log.head(), LogHead::default());

        log.append(TransactionId::new(3), vec![change(None, Some(row("a")))]);
        // A commit without row changes still moves the head.
        log.append(TransactionId::new(4), Vec::new());
        assert_eq!(
            log.head(),
            LogHead {
                offset: 1,
                transaction_id: Some(TransactionId::new(4)),
            }
        );

        let (entries, head) = log.poll_with_head(0, 10);
        assert_eq!(entries.len(), 1);
        assert_eq!(head, log.head());
    }

    #[test]
    fn history_is_bounded() {
        let log = ChangeLog::with_max_history(2);
        for txid in 1..=3 {
            log.append(TransactionId::new(txid), vec![change(None, Some(row("a")))]);
        }

        assert_eq!(log.len(), 2);
        assert!(!log.can_resume_from(0));
        assert!(log.can_resume_from(1));
        assert!(log.can_resume_from(3));
        assert!(!log.can_resume_from(4));
    }

    #[test]
    fn updates_are_translated_per_filter() {
        let filter = Predicate::eq("user_id", "a");
        let entry = |before, after| LogEntry {
            offset: 1,
            transaction_id: TransactionId::new(1),
            table: "todos".into(),
            key: RowKey::Int(1),
            operation: ChangeOperation::Update,
            before,
            after,
        };

        let moved_in = entry(Some(row("b")), Some(row("a")));
        assert_eq!(
            moved_in.visible_event(Some(&filter)).unwrap().operation,
            ChangeOperation::Insert
        );

        let moved_out = entry(Some(row("a")), Some(row("b")));
        let event = moved_out.visible_event(Some(&filter)).unwrap();
        assert_eq!(event.operation, ChangeOperation::Delete);
        assert_eq!(event.transaction_id, Some(TransactionId::new(1)));

        let elsewhere = entry(Some(row("b")), Some(row("c")));
        assert!(elsewhere.visible_event(Some(&filter)).is_none());
        assert!(elsewhere.visible_event(None).is_some());
    }

    #[tokio::test]
    async fn watchers_are_notified() {
        let log = ChangeLog::new();
        let mut rx = log.watch();
        log.append(TransactionId::new(1), vec![change(None, Some(row("a")))]);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 1);
    }
}
