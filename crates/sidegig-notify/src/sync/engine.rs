use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::alerts::LocalAlerts;
use crate::api::{ApiError, NotificationSnapshot, NotificationsApi};
use crate::channel::subscriber::EpochSource;
use crate::channel::RowChange;
use crate::error::SyncError;
use crate::models::Notification;
use crate::stats::SharedSyncStats;
use crate::sync::reconciler::{
    ChangeOutcome, MutationResolution, MutationStart, Reconciler, ReplayOutcome,
};
use crate::sync::runtime::{MutationOutcome, NotificationView, SyncStatus};

pub(crate) type MutationReply = oneshot::Sender<Result<MutationOutcome, SyncError>>;
pub(crate) type ResyncReply = oneshot::Sender<Result<(), SyncError>>;

/// Requests a handle can make of the engine.
pub(crate) enum Command {
    Resync { respond_to: ResyncReply },
    MarkRead { id: String, respond_to: MutationReply },
    MarkAllRead { respond_to: MutationReply },
    Delete { id: String, respond_to: MutationReply },
    Shutdown,
}

/// Subscription lifecycle signals from the channel task.
#[derive(Debug)]
pub(crate) enum ChannelStatus {
    Subscribing,
    /// The transport confirmed the subscription. `resumed` is true when an
    /// earlier cycle was active before, meaning events may have been missed
    /// in between and a resync is required.
    Active { resumed: bool },
    Lost { reason: String },
}

/// Everything the engine consumes, serialized through one queue so the store
/// has a single writer and no lock.
pub(crate) enum EngineMsg {
    Command(Command),
    Status { epoch: u64, status: ChannelStatus },
    Change { epoch: u64, change: RowChange },
    FetchDone {
        ticket: u64,
        result: Result<NotificationSnapshot, ApiError>,
    },
    MutationDone {
        token: u64,
        result: Result<(), ApiError>,
    },
}

/// The engine task: owns the reconciler, runs all IO as spawned futures that
/// feed results back through the queue, and publishes a view after each step.
pub(crate) struct Engine {
    reconciler: Reconciler,
    api: Arc<dyn NotificationsApi>,
    alerts: Arc<dyn LocalAlerts>,
    stats: SharedSyncStats,
    epochs: EpochSource,
    msg_tx: mpsc::Sender<EngineMsg>,
    view_tx: watch::Sender<NotificationView>,
    cancel_tx: watch::Sender<bool>,
    fetch_waiters: Vec<ResyncReply>,
    mutation_waiters: HashMap<u64, MutationReply>,
    channel_up: bool,
    bootstrapped: bool,
    last_error: Option<String>,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        api: Arc<dyn NotificationsApi>,
        alerts: Arc<dyn LocalAlerts>,
        stats: SharedSyncStats,
        epochs: EpochSource,
        msg_tx: mpsc::Sender<EngineMsg>,
        view_tx: watch::Sender<NotificationView>,
        cancel_tx: watch::Sender<bool>,
        replay_capacity: usize,
    ) -> Self {
        Self {
            reconciler: Reconciler::new(replay_capacity),
            api,
            alerts,
            stats,
            epochs,
            msg_tx,
            view_tx,
            cancel_tx,
            fetch_waiters: Vec::new(),
            mutation_waiters: HashMap::new(),
            channel_up: false,
            bootstrapped: false,
            last_error: None,
        }
    }

    pub(crate) async fn run(mut self, mut msg_rx: mpsc::Receiver<EngineMsg>) {
        self.start_fetch();
        self.publish_view();
        // The engine holds a sender itself, so the queue only closes when the
        // Shutdown command breaks the loop.
        while let Some(msg) = msg_rx.recv().await {
            let stop = match msg {
                EngineMsg::Command(command) => self.handle_command(command),
                EngineMsg::Status { epoch, status } => {
                    self.handle_status(epoch, status);
                    false
                }
                EngineMsg::Change { epoch, change } => {
                    self.handle_change(epoch, change);
                    false
                }
                EngineMsg::FetchDone { ticket, result } => {
                    self.handle_fetch_done(ticket, result);
                    false
                }
                EngineMsg::MutationDone { token, result } => {
                    self.handle_mutation_done(token, result);
                    false
                }
            };
            if stop {
                break;
            }
            self.publish_view();
        }
        info!("notification sync engine stopped");
    }

    // ===== Commands =====

    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::Resync { respond_to } => {
                self.fetch_waiters.push(respond_to);
                self.start_fetch();
            }
            Command::MarkRead { id, respond_to } => {
                match self.reconciler.begin_mark_read(&id, Utc::now()) {
                    MutationStart::NoOp => {
                        let _ = respond_to.send(Ok(MutationOutcome::NoOp));
                    }
                    MutationStart::Started { token } => {
                        self.mutation_waiters.insert(token, respond_to);
                        let api = self.api.clone();
                        self.spawn_confirm(token, async move { api.mark_read(&id).await });
                    }
                }
            }
            Command::MarkAllRead { respond_to } => {
                match self.reconciler.begin_mark_all_read(Utc::now()) {
                    MutationStart::NoOp => {
                        let _ = respond_to.send(Ok(MutationOutcome::NoOp));
                    }
                    MutationStart::Started { token } => {
                        self.mutation_waiters.insert(token, respond_to);
                        let api = self.api.clone();
                        self.spawn_confirm(token, async move { api.mark_all_read().await });
                    }
                }
            }
            Command::Delete { id, respond_to } => match self.reconciler.begin_delete(&id) {
                MutationStart::NoOp => {
                    let _ = respond_to.send(Ok(MutationOutcome::NoOp));
                }
                MutationStart::Started { token } => {
                    self.mutation_waiters.insert(token, respond_to);
                    let api = self.api.clone();
                    self.spawn_confirm(token, async move { api.delete(&id).await });
                }
            },
            Command::Shutdown => {
                self.shutdown();
                return true;
            }
        }
        false
    }

    // ===== Channel =====

    fn handle_status(&mut self, epoch: u64, status: ChannelStatus) {
        if epoch != self.epochs.current() {
            debug!(epoch, "ignoring status from an old subscription");
            return;
        }
        match status {
            ChannelStatus::Subscribing => {
                self.channel_up = false;
            }
            ChannelStatus::Active { resumed } => {
                self.channel_up = true;
                if resumed {
                    info!("channel resumed; resyncing to cover the gap");
                    self.stats.record(|s| s.reconnects += 1);
                    self.start_fetch();
                }
            }
            ChannelStatus::Lost { reason } => {
                warn!(%reason, "channel lost");
                self.channel_up = false;
                self.last_error = Some(reason);
            }
        }
    }

    fn handle_change(&mut self, epoch: u64, change: RowChange) {
        match self.reconciler.apply_change(self.epochs.current(), epoch, change) {
            ChangeOutcome::Applied { alert } => {
                self.stats.record(|s| s.events_applied += 1);
                if let Some(row) = alert {
                    self.fire_alert(&row);
                }
            }
            ChangeOutcome::Buffered => {
                self.stats.record(|s| s.events_buffered += 1);
            }
            ChangeOutcome::StaleEpoch => {
                debug!(epoch, "dropped change from an old subscription");
                self.stats.record(|s| s.stale_epoch_drops += 1);
            }
            ChangeOutcome::Overflowed => {
                warn!("replay buffer overflowed; dropping changes until the follow-up resync");
                self.stats.record(|s| s.buffer_overflow_drops += 1);
            }
            ChangeOutcome::Malformed(reason) => {
                warn!(reason, "dropped malformed change");
            }
        }
    }

    // ===== Fetch =====

    fn start_fetch(&mut self) {
        let ticket = self.reconciler.begin_bootstrap();
        debug!(ticket, "starting bootstrap fetch");
        let api = self.api.clone();
        let tx = self.msg_tx.clone();
        tokio::spawn(async move {
            let result = api.list().await;
            let _ = tx.send(EngineMsg::FetchDone { ticket, result }).await;
        });
    }

    fn handle_fetch_done(
        &mut self,
        ticket: u64,
        result: Result<NotificationSnapshot, ApiError>,
    ) {
        match result {
            Ok(snapshot) => {
                let derived = snapshot
                    .notifications
                    .iter()
                    .filter(|n| !n.is_read)
                    .count() as u32;
                if derived != snapshot.unread_count {
                    warn!(
                        server = snapshot.unread_count,
                        derived, "server unread count disagrees with its own rows"
                    );
                }
                let current_epoch = self.epochs.current();
                let Some(install) =
                    self.reconciler
                        .install_snapshot(ticket, snapshot.notifications, current_epoch)
                else {
                    self.stats.record(|s| s.stale_fetch_drops += 1);
                    return;
                };
                self.bootstrapped = true;
                self.last_error = None;
                self.stats.record(|s| s.bootstraps += 1);
                info!(
                    generation = install.generation,
                    rows = self.reconciler.store().len(),
                    "snapshot installed"
                );
                self.finish_replay(install.replay);
                for waiter in self.fetch_waiters.drain(..) {
                    let _ = waiter.send(Ok(()));
                }
            }
            Err(error) => {
                let current_epoch = self.epochs.current();
                let Some(replay) = self.reconciler.bootstrap_failed(ticket, current_epoch) else {
                    self.stats.record(|s| s.stale_fetch_drops += 1);
                    return;
                };
                warn!(%error, "bootstrap fetch failed; keeping last good state");
                self.stats.record(|s| s.bootstrap_failures += 1);
                let reason = error.to_string();
                self.last_error = Some(reason.clone());
                self.finish_replay(replay);
                for waiter in self.fetch_waiters.drain(..) {
                    let _ = waiter.send(Err(SyncError::Fetch {
                        reason: reason.clone(),
                    }));
                }
            }
        }
    }

    fn finish_replay(&mut self, replay: ReplayOutcome) {
        if replay.replayed > 0 || replay.stale_dropped > 0 {
            debug!(
                replayed = replay.replayed,
                stale_dropped = replay.stale_dropped,
                "replayed buffered changes"
            );
            self.stats.record(|s| {
                s.events_applied += replay.replayed as u64;
                s.stale_epoch_drops += replay.stale_dropped as u64;
            });
        }
        for row in &replay.alerts {
            self.fire_alert(row);
        }
        if replay.resync_needed {
            info!("resyncing after replay buffer overflow");
            self.start_fetch();
        }
    }

    // ===== Mutations =====

    fn spawn_confirm<F>(&self, token: u64, confirm: F)
    where
        F: Future<Output = Result<(), ApiError>> + Send + 'static,
    {
        let tx = self.msg_tx.clone();
        tokio::spawn(async move {
            let result = confirm.await;
            let _ = tx.send(EngineMsg::MutationDone { token, result }).await;
        });
    }

    fn handle_mutation_done(&mut self, token: u64, result: Result<(), ApiError>) {
        let reply = self.mutation_waiters.remove(&token);
        let outcome = match self.reconciler.resolve_mutation(token, result) {
            MutationResolution::Confirmed => {
                self.stats.record(|s| s.mutations_confirmed += 1);
                Ok(MutationOutcome::Confirmed)
            }
            MutationResolution::Superseded => {
                debug!(token, "mutation resolution superseded by a newer snapshot");
                self.stats.record(|s| s.stale_generation_drops += 1);
                Ok(MutationOutcome::Superseded)
            }
            MutationResolution::RolledBack(error) => {
                warn!(%error, "mutation rejected; optimistic change rolled back");
                self.stats.record(|s| s.rollbacks += 1);
                Err(SyncError::Mutation(error))
            }
            MutationResolution::UnknownToken => {
                debug!(token, "resolution for unknown mutation token");
                return;
            }
        };
        if let Some(reply) = reply {
            let _ = reply.send(outcome);
        }
    }

    // ===== View and teardown =====

    fn fire_alert(&self, row: &Notification) {
        self.alerts.alert(row);
        self.stats.record(|s| s.alerts_fired += 1);
    }

    fn publish_view(&self) {
        self.view_tx.send_replace(self.current_view());
    }

    fn current_view(&self) -> NotificationView {
        let store = self.reconciler.store();
        let status = if self.last_error.is_some() {
            SyncStatus::Degraded
        } else if self.channel_up && self.bootstrapped {
            SyncStatus::Live
        } else {
            SyncStatus::Connecting
        };
        NotificationView {
            notifications: store.notifications().to_vec(),
            unread_count: store.unread_count(),
            status,
            generation: self.reconciler.generation(),
            last_error: self.last_error.clone(),
        }
    }

    fn shutdown(&mut self) {
        info!("shutting down notification sync");
        // Burn the epoch so anything still queued behind us is stale, then
        // stop the subscriber.
        self.epochs.advance();
        let _ = self.cancel_tx.send(true);
        for waiter in self.fetch_waiters.drain(..) {
            let _ = waiter.send(Err(SyncError::Closed));
        }
        for (_, reply) in self.mutation_waiters.drain() {
            let _ = reply.send(Err(SyncError::Closed));
        }
        let mut view = self.current_view();
        view.status = SyncStatus::Offline;
        self.view_tx.send_replace(view);
    }
}
