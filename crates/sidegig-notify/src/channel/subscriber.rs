use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::channel::{Backoff, ChannelMessage, ChannelTransport};
use crate::sync::engine::{ChannelStatus, EngineMsg};

/// Monotonic subscription epoch. The subscriber advances it once per
/// connection cycle and stamps everything it forwards; the engine compares
/// against the current value and drops anything older.
#[derive(Clone, Debug, Default)]
pub(crate) struct EpochSource {
    counter: Arc<AtomicU64>,
}

impl EpochSource {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn advance(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn current(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

/// Owns the per-user channel subscription: one epoch per connection cycle,
/// reconnecting with bounded backoff until cancelled. Never touches the
/// store; everything goes to the engine queue.
pub(crate) struct ChannelSubscriber {
    transport: Arc<dyn ChannelTransport>,
    user_id: String,
    epochs: EpochSource,
    msg_tx: mpsc::Sender<EngineMsg>,
    backoff: Backoff,
    cancel_rx: watch::Receiver<bool>,
}

impl ChannelSubscriber {
    pub(crate) fn new(
        transport: Arc<dyn ChannelTransport>,
        user_id: String,
        epochs: EpochSource,
        msg_tx: mpsc::Sender<EngineMsg>,
        backoff: Backoff,
        cancel_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            transport,
            user_id,
            epochs,
            msg_tx,
            backoff,
            cancel_rx,
        }
    }

    pub(crate) async fn run(self) {
        let Self {
            transport,
            user_id,
            epochs,
            msg_tx,
            mut backoff,
            mut cancel_rx,
        } = self;
        // True once any cycle has gone active; the next ACTIVE is then a
        // resume and the engine must resync to cover the gap.
        let mut was_active = false;

        loop {
            if *cancel_rx.borrow() {
                break;
            }
            let epoch = epochs.advance();
            if !forward(
                &msg_tx,
                EngineMsg::Status {
                    epoch,
                    status: ChannelStatus::Subscribing,
                },
            )
            .await
            {
                return;
            }

            match transport.subscribe(&user_id).await {
                Ok(mut stream) => loop {
                    tokio::select! {
                        changed = cancel_rx.changed() => {
                            if changed.is_err() || *cancel_rx.borrow() {
                                debug!("channel subscriber cancelled");
                                return;
                            }
                        }
                        message = stream.next() => match message {
                            Some(ChannelMessage::Subscribed) => {
                                backoff.reset();
                                let resumed = was_active;
                                was_active = true;
                                if !forward(
                                    &msg_tx,
                                    EngineMsg::Status {
                                        epoch,
                                        status: ChannelStatus::Active { resumed },
                                    },
                                )
                                .await
                                {
                                    return;
                                }
                            }
                            Some(ChannelMessage::Change(change)) => {
                                if !forward(&msg_tx, EngineMsg::Change { epoch, change }).await {
                                    return;
                                }
                            }
                            Some(ChannelMessage::Closed { reason }) => {
                                if !forward(
                                    &msg_tx,
                                    EngineMsg::Status {
                                        epoch,
                                        status: ChannelStatus::Lost { reason },
                                    },
                                )
                                .await
                                {
                                    return;
                                }
                                break;
                            }
                            None => {
                                if !forward(
                                    &msg_tx,
                                    EngineMsg::Status {
                                        epoch,
                                        status: ChannelStatus::Lost {
                                            reason: "stream ended".to_string(),
                                        },
                                    },
                                )
                                .await
                                {
                                    return;
                                }
                                break;
                            }
                        }
                    }
                },
                Err(error) => {
                    warn!(%error, "channel subscribe failed");
                    if !forward(
                        &msg_tx,
                        EngineMsg::Status {
                            epoch,
                            status: ChannelStatus::Lost {
                                reason: error.reason,
                            },
                        },
                    )
                    .await
                    {
                        return;
                    }
                }
            }

            let delay = backoff.next_delay();
            debug!(?delay, "channel retry scheduled");
            tokio::select! {
                _ = sleep(delay) => {}
                changed = cancel_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }
        debug!("channel subscriber stopped");
    }
}

async fn forward(tx: &mpsc::Sender<EngineMsg>, msg: EngineMsg) -> bool {
    tx.send(msg).await.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{InProcessChannel, RowChange};
    use crate::testing::notification;
    use std::time::Duration;

    fn spawn_subscriber(
        channel: Arc<InProcessChannel>,
    ) -> (
        mpsc::Receiver<EngineMsg>,
        watch::Sender<bool>,
        EpochSource,
        tokio::task::JoinHandle<()>,
    ) {
        let (msg_tx, msg_rx) = mpsc::channel(64);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let epochs = EpochSource::new();
        let subscriber = ChannelSubscriber::new(
            channel,
            "u-1".to_string(),
            epochs.clone(),
            msg_tx,
            Backoff::new(Duration::from_millis(5), Duration::from_millis(20)),
            cancel_rx,
        );
        let task = tokio::spawn(subscriber.run());
        (msg_rx, cancel_tx, epochs, task)
    }

    async fn next_msg(rx: &mut mpsc::Receiver<EngineMsg>) -> EngineMsg {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for a subscriber message")
            .expect("subscriber queue closed")
    }

    #[tokio::test]
    async fn test_forwards_lifecycle_and_changes_with_epoch() {
        let channel = Arc::new(InProcessChannel::new());
        let (mut msg_rx, _cancel_tx, _epochs, _task) = spawn_subscriber(channel.clone());

        match next_msg(&mut msg_rx).await {
            EngineMsg::Status {
                epoch: 1,
                status: ChannelStatus::Subscribing,
            } => {}
            _ => panic!("expected SUBSCRIBING at epoch 1"),
        }
        match next_msg(&mut msg_rx).await {
            EngineMsg::Status {
                epoch: 1,
                status: ChannelStatus::Active { resumed: false },
            } => {}
            _ => panic!("expected first ACTIVE without resume"),
        }

        channel.publish("u-1", RowChange::insert(notification("a", 1, false)));
        match next_msg(&mut msg_rx).await {
            EngineMsg::Change { epoch: 1, change } => {
                assert_eq!(change.new.unwrap().id, "a");
            }
            _ => panic!("expected the published change"),
        }
    }

    #[tokio::test]
    async fn test_reconnects_with_new_epoch_and_resume_flag() {
        let channel = Arc::new(InProcessChannel::new());
        let (mut msg_rx, _cancel_tx, epochs, _task) = spawn_subscriber(channel.clone());

        // First cycle up.
        next_msg(&mut msg_rx).await; // SUBSCRIBING
        next_msg(&mut msg_rx).await; // ACTIVE

        channel.disconnect_user("u-1", "socket dropped");
        match next_msg(&mut msg_rx).await {
            EngineMsg::Status {
                epoch: 1,
                status: ChannelStatus::Lost { reason },
            } => assert_eq!(reason, "socket dropped"),
            _ => panic!("expected LOST for the first epoch"),
        }

        // Second cycle: fresh epoch, resumed ACTIVE.
        match next_msg(&mut msg_rx).await {
            EngineMsg::Status {
                epoch: 2,
                status: ChannelStatus::Subscribing,
            } => {}
            _ => panic!("expected SUBSCRIBING at epoch 2"),
        }
        match next_msg(&mut msg_rx).await {
            EngineMsg::Status {
                epoch: 2,
                status: ChannelStatus::Active { resumed: true },
            } => {}
            _ => panic!("expected resumed ACTIVE at epoch 2"),
        }
        assert_eq!(epochs.current(), 2);
    }

    #[tokio::test]
    async fn test_cancel_stops_the_loop() {
        let channel = Arc::new(InProcessChannel::new());
        let (mut msg_rx, cancel_tx, _epochs, task) = spawn_subscriber(channel.clone());

        next_msg(&mut msg_rx).await; // SUBSCRIBING
        next_msg(&mut msg_rx).await; // ACTIVE

        cancel_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("subscriber did not stop")
            .unwrap();
        assert_eq!(channel.subscriber_count("u-1"), 1);
        channel.publish("u-1", RowChange::delete("gone"));
        // The dropped stream is pruned on the next publish.
        assert_eq!(channel.subscriber_count("u-1"), 0);
    }
}
