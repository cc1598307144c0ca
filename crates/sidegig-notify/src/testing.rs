//! Shared fixtures for unit tests.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::alerts::LocalAlerts;
use crate::api::{ApiError, NotificationSnapshot, NotificationsApi};
use crate::models::{Notification, NotificationKind};

/// Deterministic row fixture. `minutes_ago` offsets a fixed base time so
/// ordering in tests never depends on the wall clock.
pub(crate) fn notification(id: &str, minutes_ago: i64, is_read: bool) -> Notification {
    let created_at = base_time() - chrono::Duration::minutes(minutes_ago);
    Notification {
        id: id.to_string(),
        user_id: "u-1".to_string(),
        kind: NotificationKind::OrderPlaced,
        title: format!("notification {id}"),
        message: "test".to_string(),
        data: None,
        is_read,
        created_at,
        read_at: is_read.then_some(created_at),
    }
}

fn base_time() -> DateTime<Utc> {
    DateTime::from_timestamp(1_750_000_000, 0).unwrap()
}

/// Snapshot whose advisory unread count matches its rows.
pub(crate) fn snapshot(rows: Vec<Notification>) -> NotificationSnapshot {
    let unread_count = rows.iter().filter(|n| !n.is_read).count() as u32;
    NotificationSnapshot {
        notifications: rows,
        unread_count,
    }
}

/// Scripted API double. Queued results are consumed in call order; an empty
/// queue falls back to success (an empty snapshot for `list`), so tests only
/// script the interesting calls. `calls` records every invocation.
#[derive(Default)]
pub(crate) struct ScriptedApi {
    list_results: Mutex<VecDeque<Result<NotificationSnapshot, ApiError>>>,
    mark_read_results: Mutex<VecDeque<Result<(), ApiError>>>,
    mark_all_results: Mutex<VecDeque<Result<(), ApiError>>>,
    delete_results: Mutex<VecDeque<Result<(), ApiError>>>,
    mark_read_gate: Mutex<Option<oneshot::Receiver<()>>>,
    pub calls: Mutex<Vec<String>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_list(&self, result: Result<NotificationSnapshot, ApiError>) {
        self.list_results.lock().push_back(result);
    }

    pub fn push_mark_read(&self, result: Result<(), ApiError>) {
        self.mark_read_results.lock().push_back(result);
    }

    pub fn push_mark_all(&self, result: Result<(), ApiError>) {
        self.mark_all_results.lock().push_back(result);
    }

    pub fn push_delete(&self, result: Result<(), ApiError>) {
        self.delete_results.lock().push_back(result);
    }

    /// Park the next `mark_read` call until the returned sender fires, so a
    /// test can interleave other work before the confirmation resolves.
    pub fn hold_next_mark_read(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.mark_read_gate.lock() = Some(rx);
        tx
    }
}

#[async_trait]
impl NotificationsApi for ScriptedApi {
    async fn list(&self) -> Result<NotificationSnapshot, ApiError> {
        self.calls.lock().push("list".to_string());
        self.list_results.lock().pop_front().unwrap_or_else(|| {
            Ok(NotificationSnapshot {
                notifications: Vec::new(),
                unread_count: 0,
            })
        })
    }

    async fn mark_read(&self, id: &str) -> Result<(), ApiError> {
        self.calls.lock().push(format!("mark_read:{id}"));
        let gate = self.mark_read_gate.lock().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        self.mark_read_results.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn mark_all_read(&self) -> Result<(), ApiError> {
        self.calls.lock().push("mark_all_read".to_string());
        self.mark_all_results.lock().pop_front().unwrap_or(Ok(()))
    }

    async fn delete(&self, id: &str) -> Result<(), ApiError> {
        self.calls.lock().push(format!("delete:{id}"));
        self.delete_results.lock().pop_front().unwrap_or(Ok(()))
    }
}

/// Alert hook that records the ids it was fired with.
#[derive(Default)]
pub(crate) struct RecordingAlerts {
    pub fired: Mutex<Vec<String>>,
}

impl LocalAlerts for RecordingAlerts {
    fn alert(&self, notification: &Notification) {
        self.fired.lock().push(notification.id.clone());
    }
}
