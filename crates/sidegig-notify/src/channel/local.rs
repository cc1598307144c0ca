use std::collections::HashMap;

use async_stream::stream;
use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::types::{ChannelError, ChannelMessage, ChannelStream, ChannelTransport, RowChange};

const SUBSCRIPTION_CAPACITY: usize = 64;

/// In-process fan-out transport. Embedders bridge their socket client onto it
/// by calling `publish`/`disconnect_user`; tests drive it directly.
#[derive(Default)]
pub struct InProcessChannel {
    subscribers: Mutex<HashMap<String, Vec<mpsc::Sender<ChannelMessage>>>>,
}

impl InProcessChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a change to every open subscription for the user and return
    /// how many received it. A subscriber whose queue is full (or gone) is
    /// dropped; it observes its stream ending and reconnects.
    pub fn publish(&self, user_id: &str, change: RowChange) -> usize {
        let mut subscribers = self.subscribers.lock();
        let Some(senders) = subscribers.get_mut(user_id) else {
            return 0;
        };
        senders.retain(|tx| tx.try_send(ChannelMessage::Change(change.clone())).is_ok());
        senders.len()
    }

    /// Simulate a transport drop: every open subscription for the user
    /// observes `Closed` and its stream ends.
    pub fn disconnect_user(&self, user_id: &str, reason: &str) {
        let Some(senders) = self.subscribers.lock().remove(user_id) else {
            return;
        };
        for tx in senders {
            let _ = tx.try_send(ChannelMessage::Closed {
                reason: reason.to_string(),
            });
        }
    }

    pub fn subscriber_count(&self, user_id: &str) -> usize {
        self.subscribers.lock().get(user_id).map_or(0, |s| s.len())
    }
}

#[async_trait]
impl ChannelTransport for InProcessChannel {
    async fn subscribe(&self, user_id: &str) -> Result<ChannelStream, ChannelError> {
        let (tx, mut rx) = mpsc::channel(SUBSCRIPTION_CAPACITY);
        self.subscribers
            .lock()
            .entry(user_id.to_string())
            .or_default()
            .push(tx);
        Ok(Box::pin(stream! {
            yield ChannelMessage::Subscribed;
            while let Some(message) = rx.recv().await {
                let closed = matches!(message, ChannelMessage::Closed { .. });
                yield message;
                if closed {
                    break;
                }
            }
        }))
    }
}
