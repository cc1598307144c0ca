use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::models::Notification;

/// What a row-level update did to the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateResult {
    /// No row with that id existed; the payload was inserted as new.
    Inserted,
    /// An existing row was replaced wholesale.
    Replaced,
}

/// Outcome of marking a single notification read.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkReadResult {
    NotFound,
    AlreadyRead,
    /// The row flipped to read. Carries the previous `read_at` so a rollback
    /// can restore the exact prior field values.
    Marked { prior_read_at: Option<DateTime<Utc>> },
}

/// Full copy of the store contents, taken before a bulk optimistic change so
/// a failed confirmation can restore the exact prior state.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreSnapshot {
    items: Vec<Notification>,
    unread: u32,
}

/// In-memory notification collection for one user, ordered newest first with
/// id as the tiebreak. The unread counter is derived state: every mutation
/// keeps it equal to the number of rows with `is_read == false`.
#[derive(Debug, Default)]
pub struct NotificationStore {
    items: Vec<Notification>,
    unread: u32,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    // ===== Getters =====

    pub fn notifications(&self) -> &[Notification] {
        &self.items
    }

    pub fn unread_count(&self) -> u32 {
        self.unread
    }

    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.items.iter().find(|n| n.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.items.iter().any(|n| n.id == id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    // ===== Mutations =====

    /// Insert a new notification at its sorted position. Returns false when a
    /// row with the same id is already present (redelivery is a no-op).
    pub fn insert(&mut self, notification: Notification) -> bool {
        if self.contains(&notification.id) {
            return false;
        }
        if !notification.is_read {
            self.unread += 1;
        }
        self.place(notification);
        self.debug_check();
        true
    }

    /// Replace the row with the payload's id, or insert it when absent.
    /// The payload wins all fields (last write wins).
    pub fn update(&mut self, notification: Notification) -> UpdateResult {
        let Some(idx) = self.index_of(&notification.id) else {
            self.insert(notification);
            return UpdateResult::Inserted;
        };
        let old = self.items.remove(idx);
        match (old.is_read, notification.is_read) {
            (false, true) => self.unread = self.unread.saturating_sub(1),
            (true, false) => self.unread += 1,
            _ => {}
        }
        self.place(notification);
        self.debug_check();
        UpdateResult::Replaced
    }

    /// Remove by id, returning the removed row so callers can keep a
    /// tombstone. Absent ids are a no-op.
    pub fn remove(&mut self, id: &str) -> Option<Notification> {
        let idx = self.index_of(id)?;
        let gone = self.items.remove(idx);
        if !gone.is_read {
            self.unread = self.unread.saturating_sub(1);
        }
        self.debug_check();
        Some(gone)
    }

    pub fn mark_read(&mut self, id: &str, read_at: DateTime<Utc>) -> MarkReadResult {
        let Some(item) = self.items.iter_mut().find(|n| n.id == id) else {
            return MarkReadResult::NotFound;
        };
        if item.is_read {
            return MarkReadResult::AlreadyRead;
        }
        let prior_read_at = item.read_at;
        item.is_read = true;
        item.read_at = Some(read_at);
        self.unread = self.unread.saturating_sub(1);
        self.debug_check();
        MarkReadResult::Marked { prior_read_at }
    }

    /// Undo a `mark_read` on one row. Skipped (returns false) when the row is
    /// gone or was flipped back to unread by a later event, so the counter
    /// never double-adjusts.
    pub fn revert_read(&mut self, id: &str, prior_read_at: Option<DateTime<Utc>>) -> bool {
        let Some(item) = self.items.iter_mut().find(|n| n.id == id) else {
            return false;
        };
        if !item.is_read {
            return false;
        }
        item.is_read = false;
        item.read_at = prior_read_at;
        self.unread += 1;
        self.debug_check();
        true
    }

    /// Flip every unread row to read. Returns how many rows changed.
    pub fn mark_all_read(&mut self, read_at: DateTime<Utc>) -> usize {
        let mut changed = 0;
        for item in self.items.iter_mut().filter(|n| !n.is_read) {
            item.is_read = true;
            item.read_at = Some(read_at);
            changed += 1;
        }
        self.unread = 0;
        self.debug_check();
        changed
    }

    /// Replace the whole collection with a fetched snapshot. Input order is
    /// not trusted: rows are de-duplicated by id (first occurrence wins) and
    /// re-sorted, and the unread counter is recomputed from scratch.
    pub fn replace_all(&mut self, notifications: Vec<Notification>) {
        let mut seen = HashSet::new();
        let mut items: Vec<Notification> = notifications
            .into_iter()
            .filter(|n| seen.insert(n.id.clone()))
            .collect();
        items.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        self.items = items;
        self.unread = self.recount();
        self.debug_check();
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            items: self.items.clone(),
            unread: self.unread,
        }
    }

    pub fn restore(&mut self, snapshot: StoreSnapshot) {
        self.items = snapshot.items;
        self.unread = snapshot.unread;
        self.debug_check();
    }

    // ===== Internals =====

    fn index_of(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|n| n.id == id)
    }

    /// Insert at the sorted position. Callers have already handled the id
    /// dedup and the unread counter.
    fn place(&mut self, notification: Notification) {
        let pos = self
            .items
            .partition_point(|n| n.sorts_before(&notification));
        self.items.insert(pos, notification);
    }

    fn recount(&self) -> u32 {
        self.items.iter().filter(|n| !n.is_read).count() as u32
    }

    fn debug_check(&self) {
        debug_assert_eq!(self.unread, self.recount());
        debug_assert!(self.items.windows(2).all(|w| w[0].sorts_before(&w[1])));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::notification;

    fn store_with(items: Vec<Notification>) -> NotificationStore {
        let mut store = NotificationStore::new();
        store.replace_all(items);
        store
    }

    #[test]
    fn test_insert_orders_newest_first() {
        let mut store = NotificationStore::new();
        assert!(store.insert(notification("b", 10, false)));
        assert!(store.insert(notification("a", 5, false)));
        assert!(store.insert(notification("c", 20, true)));

        let ids: Vec<&str> = store.notifications().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(store.unread_count(), 2);
    }

    #[test]
    fn test_insert_duplicate_id_is_noop() {
        let mut store = NotificationStore::new();
        assert!(store.insert(notification("a", 5, false)));
        assert!(!store.insert(notification("a", 5, false)));

        assert_eq!(store.len(), 1);
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn test_insert_equal_timestamps_tiebreak_on_id() {
        let mut store = NotificationStore::new();
        store.insert(notification("b", 5, true));
        store.insert(notification("a", 5, true));
        store.insert(notification("c", 5, true));

        let ids: Vec<&str> = store.notifications().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_update_replaces_and_adjusts_unread() {
        let mut store = store_with(vec![notification("a", 5, false)]);
        assert_eq!(store.unread_count(), 1);

        let mut read_version = notification("a", 5, true);
        read_version.title = "edited".into();
        assert_eq!(store.update(read_version), UpdateResult::Replaced);

        assert_eq!(store.unread_count(), 0);
        assert_eq!(store.get("a").unwrap().title, "edited");
        assert!(store.get("a").unwrap().is_read);
    }

    #[test]
    fn test_update_absent_id_inserts() {
        let mut store = NotificationStore::new();
        assert_eq!(store.update(notification("a", 5, false)), UpdateResult::Inserted);
        assert_eq!(store.len(), 1);
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn test_update_read_to_unread_bumps_counter() {
        let mut store = store_with(vec![notification("a", 5, true)]);
        assert_eq!(store.unread_count(), 0);

        store.update(notification("a", 5, false));
        assert_eq!(store.unread_count(), 1);
    }

    #[test]
    fn test_remove_returns_tombstone_and_adjusts_unread() {
        let mut store = store_with(vec![
            notification("a", 5, false),
            notification("b", 10, true),
        ]);

        let gone = store.remove("a").unwrap();
        assert_eq!(gone.id, "a");
        assert_eq!(store.unread_count(), 0);
        assert!(store.remove("a").is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_mark_read_decrements_once() {
        let mut store = store_with(vec![notification("a", 5, false)]);
        let now = chrono::Utc::now();

        match store.mark_read("a", now) {
            MarkReadResult::Marked { prior_read_at } => assert_eq!(prior_read_at, None),
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(store.unread_count(), 0);
        assert_eq!(store.get("a").unwrap().read_at, Some(now));

        assert_eq!(store.mark_read("a", now), MarkReadResult::AlreadyRead);
        assert_eq!(store.mark_read("missing", now), MarkReadResult::NotFound);
        assert_eq!(store.unread_count(), 0);
    }

    #[test]
    fn test_revert_read_restores_prior_fields() {
        let mut store = store_with(vec![notification("a", 5, false)]);
        let before = store.snapshot();

        store.mark_read("a", chrono::Utc::now());
        assert!(store.revert_read("a", None));

        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_revert_read_skips_deleted_or_unread_rows() {
        let mut store = store_with(vec![notification("a", 5, false)]);
        store.mark_read("a", chrono::Utc::now());

        // A later push event flipped the row back to unread already.
        store.update(notification("a", 5, false));
        assert_eq!(store.unread_count(), 1);
        assert!(!store.revert_read("a", None));
        assert_eq!(store.unread_count(), 1);

        store.remove("a");
        assert!(!store.revert_read("a", None));
        assert_eq!(store.unread_count(), 0);
    }

    #[test]
    fn test_mark_all_read_zeroes_counter() {
        let mut store = store_with(vec![
            notification("a", 5, false),
            notification("b", 10, true),
            notification("c", 15, false),
        ]);

        let changed = store.mark_all_read(chrono::Utc::now());
        assert_eq!(changed, 2);
        assert_eq!(store.unread_count(), 0);
        assert!(store.notifications().iter().all(|n| n.is_read));

        assert_eq!(store.mark_all_read(chrono::Utc::now()), 0);
    }

    #[test]
    fn test_replace_all_dedups_sorts_and_recounts() {
        let mut store = store_with(vec![notification("old", 99, false)]);

        let mut dup = notification("a", 5, true);
        dup.title = "second copy".into();
        store.replace_all(vec![
            notification("a", 5, false),
            notification("b", 1, false),
            dup,
            notification("c", 10, true),
        ]);

        let ids: Vec<&str> = store.notifications().iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c"]);
        // First occurrence of "a" won, so it still counts as unread.
        assert_eq!(store.unread_count(), 2);
        assert!(!store.contains("old"));
    }

    #[test]
    fn test_snapshot_restore_round_trip() {
        let mut store = store_with(vec![
            notification("a", 5, false),
            notification("b", 10, true),
        ]);
        let before = store.snapshot();

        store.mark_all_read(chrono::Utc::now());
        store.remove("b");
        store.insert(notification("c", 1, false));
        assert_ne!(store.snapshot(), before);

        store.restore(before.clone());
        assert_eq!(store.snapshot(), before);
        assert_eq!(store.unread_count(), 1);
    }
}
