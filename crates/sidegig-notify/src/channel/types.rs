use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Notification;

/// Row-change kinds a push channel can deliver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeOp {
    Insert,
    Update,
    Delete,
}

/// Key-only reference to a row. Delete payloads carry just the primary key
/// of the removed row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowRef {
    pub id: String,
}

/// One row-change event, already filtered server-side to the subscribed user.
/// `new` is set for INSERT and UPDATE, `old` for DELETE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowChange {
    pub event: ChangeOp,
    #[serde(default)]
    pub new: Option<Notification>,
    #[serde(default)]
    pub old: Option<RowRef>,
}

impl RowChange {
    pub fn insert(notification: Notification) -> Self {
        Self {
            event: ChangeOp::Insert,
            new: Some(notification),
            old: None,
        }
    }

    pub fn update(notification: Notification) -> Self {
        Self {
            event: ChangeOp::Update,
            new: Some(notification),
            old: None,
        }
    }

    pub fn delete(id: impl Into<String>) -> Self {
        Self {
            event: ChangeOp::Delete,
            new: None,
            old: Some(RowRef { id: id.into() }),
        }
    }
}

/// Messages yielded by a channel subscription stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelMessage {
    /// The transport acknowledged the subscription; deliveries follow.
    Subscribed,
    Change(RowChange),
    /// Transport-level disconnect. The stream ends after this.
    Closed { reason: String },
}

#[derive(Debug, Clone, Error)]
#[error("channel transport: {reason}")]
pub struct ChannelError {
    pub reason: String,
}

impl ChannelError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

pub type ChannelStream = BoxStream<'static, ChannelMessage>;

/// Push-transport boundary. Each `subscribe` call opens one independent
/// per-user subscription; the runtime holds at most one open at a time and
/// re-calls after a disconnect.
#[async_trait]
pub trait ChannelTransport: Send + Sync {
    async fn subscribe(&self, user_id: &str) -> Result<ChannelStream, ChannelError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_change_wire_format() {
        let json = r#"{
            "event": "DELETE",
            "old": {"id": "n-1", "userId": "u-1"}
        }"#;

        let change: RowChange = serde_json::from_str(json).unwrap();
        assert_eq!(change.event, ChangeOp::Delete);
        assert!(change.new.is_none());
        assert_eq!(change.old.unwrap().id, "n-1");
    }

    #[test]
    fn test_change_op_serializes_uppercase() {
        assert_eq!(
            serde_json::to_string(&ChangeOp::Insert).unwrap(),
            "\"INSERT\""
        );
        assert_eq!(
            serde_json::from_str::<ChangeOp>("\"UPDATE\"").unwrap(),
            ChangeOp::Update
        );
    }
}
