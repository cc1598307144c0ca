use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use crate::alerts::{LocalAlerts, NoopAlerts};
use crate::api::{HttpNotificationsApi, NotificationsApi};
use crate::auth::SessionProvider;
use crate::channel::subscriber::{ChannelSubscriber, EpochSource};
use crate::channel::{Backoff, ChannelTransport};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::models::Notification;
use crate::stats::{SharedSyncStats, SyncStats};
use crate::sync::engine::{Command, Engine, EngineMsg};

/// Read-only projection of the synchronized state, published after every
/// engine step. UIs hold the watch receiver and re-render on change.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationView {
    /// Newest first, id as the tiebreak.
    pub notifications: Vec<Notification>,
    pub unread_count: u32,
    pub status: SyncStatus,
    /// Snapshot generation the view reflects; bumps on every installed fetch.
    pub generation: u64,
    /// Most recent fetch or channel failure, cleared by the next good fetch.
    pub last_error: Option<String>,
}

impl Default for NotificationView {
    fn default() -> Self {
        Self {
            notifications: Vec::new(),
            unread_count: 0,
            status: SyncStatus::Offline,
            generation: 0,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Not running (before spawn, after shutdown).
    Offline,
    /// First bootstrap or channel subscription still in progress.
    Connecting,
    /// Subscription active and a snapshot installed; pushes are flowing.
    Live,
    /// Serving last good state after a fetch or channel failure.
    Degraded,
}

/// How an optimistic mutation settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The server confirmed the optimistic change.
    Confirmed,
    /// Local state already satisfied the request; no server call was made.
    NoOp,
    /// The confirmation resolved against a newer snapshot generation and was
    /// discarded; the installed snapshot is authoritative either way.
    Superseded,
}

/// Spawns the engine and channel subscriber tasks and hands back the only
/// way to talk to them.
pub struct SyncRuntime;

impl SyncRuntime {
    /// Production wiring: HTTP API from the config, no local alerts.
    pub fn spawn(
        config: SyncConfig,
        session: Arc<dyn SessionProvider>,
        transport: Arc<dyn ChannelTransport>,
    ) -> NotifyHandle {
        let api = Arc::new(HttpNotificationsApi::new(
            config.api_base.clone(),
            session.clone(),
        ));
        Self::spawn_with(config, session, api, transport, Arc::new(NoopAlerts))
    }

    /// Explicit wiring for embedders that bring their own API client or
    /// alert hook.
    pub fn spawn_with(
        config: SyncConfig,
        session: Arc<dyn SessionProvider>,
        api: Arc<dyn NotificationsApi>,
        transport: Arc<dyn ChannelTransport>,
        alerts: Arc<dyn LocalAlerts>,
    ) -> NotifyHandle {
        let (msg_tx, msg_rx) = mpsc::channel(config.queue_capacity);
        let (view_tx, view_rx) = watch::channel(NotificationView::default());
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let epochs = EpochSource::new();
        let stats = SharedSyncStats::new();

        let engine = Engine::new(
            api,
            alerts,
            stats.clone(),
            epochs.clone(),
            msg_tx.clone(),
            view_tx,
            cancel_tx,
            config.replay_capacity,
        );
        tokio::spawn(engine.run(msg_rx));

        let subscriber = ChannelSubscriber::new(
            transport,
            session.user_id(),
            epochs,
            msg_tx.clone(),
            Backoff::new(config.backoff_initial, config.backoff_max),
            cancel_rx,
        );
        tokio::spawn(subscriber.run());

        NotifyHandle {
            msg_tx,
            view_rx,
            stats,
        }
    }
}

/// Cloneable handle to a running sync engine. All operations are serialized
/// through the engine queue; dropping every handle does not stop the engine,
/// call [`shutdown`](NotifyHandle::shutdown) for that.
#[derive(Clone)]
pub struct NotifyHandle {
    msg_tx: mpsc::Sender<EngineMsg>,
    view_rx: watch::Receiver<NotificationView>,
    stats: SharedSyncStats,
}

impl NotifyHandle {
    async fn send(&self, command: Command) -> Result<(), SyncError> {
        self.msg_tx
            .send(EngineMsg::Command(command))
            .await
            .map_err(|_| SyncError::Closed)
    }

    /// Force a fresh bootstrap fetch. Resolves once that fetch installs, or
    /// fails leaving last good state in place.
    pub async fn resync(&self) -> Result<(), SyncError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Resync { respond_to: tx }).await?;
        rx.await.map_err(|_| SyncError::Closed)?
    }

    /// Optimistically mark one notification read, then confirm with the
    /// server. Rolls back and returns the error when the server refuses.
    pub async fn mark_read(&self, id: impl Into<String>) -> Result<MutationOutcome, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::MarkRead {
            id: id.into(),
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| SyncError::Closed)?
    }

    /// Optimistically mark everything read, then confirm with the server.
    pub async fn mark_all_read(&self) -> Result<MutationOutcome, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::MarkAllRead { respond_to: tx }).await?;
        rx.await.map_err(|_| SyncError::Closed)?
    }

    /// Optimistically delete one notification, then confirm with the server.
    pub async fn delete(&self, id: impl Into<String>) -> Result<MutationOutcome, SyncError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Delete {
            id: id.into(),
            respond_to: tx,
        })
        .await?;
        rx.await.map_err(|_| SyncError::Closed)?
    }

    /// Watch receiver for the live view; `borrow` reads the current value.
    pub fn view(&self) -> watch::Receiver<NotificationView> {
        self.view_rx.clone()
    }

    pub fn current_view(&self) -> NotificationView {
        self.view_rx.borrow().clone()
    }

    pub fn stats(&self) -> SyncStats {
        self.stats.snapshot()
    }

    /// Stop the engine and the channel subscription. Pending operations
    /// resolve with [`SyncError::Closed`].
    pub async fn shutdown(&self) {
        let _ = self.send(Command::Shutdown).await;
    }
}
