use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};

use crate::api::ApiError;
use crate::channel::{ChangeOp, RowChange};
use crate::models::Notification;
use crate::store::{MarkReadResult, NotificationStore, StoreSnapshot, UpdateResult};

/// What happened to one incoming row change.
#[derive(Debug, PartialEq)]
pub(crate) enum ChangeOutcome {
    /// Applied to the store. `alert` carries the row when it arrived new and
    /// unread, so the engine can fire the local alert hook.
    Applied { alert: Option<Notification> },
    /// A bootstrap fetch is outstanding; the change was parked for replay.
    Buffered,
    /// Carried an epoch older than the live subscription; dropped.
    StaleEpoch,
    /// The replay buffer hit capacity; the change (and the buffer) was
    /// dropped and the next snapshot install will request a follow-up resync.
    Overflowed,
    /// Payload missing the row or key its kind requires; dropped.
    Malformed(&'static str),
}

/// Result of replaying the parked buffer after a fetch resolves.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct ReplayOutcome {
    pub replayed: usize,
    pub stale_dropped: usize,
    /// Rows that arrived new and unread during the replay.
    pub alerts: Vec<Notification>,
    /// True when the buffer overflowed while the fetch was outstanding; the
    /// engine must start another bootstrap to reconcile the dropped window.
    pub resync_needed: bool,
}

#[derive(Debug, PartialEq)]
pub(crate) struct InstallOutcome {
    /// Snapshot generation after the install.
    pub generation: u64,
    pub replay: ReplayOutcome,
}

/// Result of starting an optimistic mutation.
#[derive(Debug, PartialEq)]
pub(crate) enum MutationStart {
    /// Local state already satisfies the request; nothing was changed and no
    /// server call is needed.
    NoOp,
    /// The store changed optimistically; confirm with the server and resolve
    /// with this token.
    Started { token: u64 },
}

/// Result of resolving a mutation confirmation.
#[derive(Debug)]
pub(crate) enum MutationResolution {
    Confirmed,
    /// The resolution arrived under a newer snapshot generation. The install
    /// already reconciled server truth, so the result is discarded whether it
    /// succeeded or failed.
    Superseded,
    /// Same-generation failure: the optimistic change was rolled back.
    RolledBack(ApiError),
    /// No pending record for this token.
    UnknownToken,
}

struct BufferedChange {
    epoch: u64,
    change: RowChange,
}

enum PendingKind {
    MarkRead {
        id: String,
        prior_read_at: Option<DateTime<Utc>>,
    },
    MarkAllRead {
        prior: StoreSnapshot,
    },
    Delete {
        tombstone: Notification,
    },
}

struct PendingMutation {
    generation: u64,
    kind: PendingKind,
}

/// Single-owner reconciliation state machine. Owns the store, the snapshot
/// generation counter, the mid-bootstrap replay buffer and the pending
/// optimistic mutations. Purely synchronous; the engine task drives it and
/// does all the IO.
pub(crate) struct Reconciler {
    store: NotificationStore,
    generation: u64,
    fetch_seq: u64,
    fetch_in_flight: Option<u64>,
    buffer: VecDeque<BufferedChange>,
    replay_capacity: usize,
    overflowed: bool,
    mutation_seq: u64,
    pending: HashMap<u64, PendingMutation>,
}

impl Reconciler {
    pub(crate) fn new(replay_capacity: usize) -> Self {
        Self {
            store: NotificationStore::new(),
            generation: 0,
            fetch_seq: 0,
            fetch_in_flight: None,
            buffer: VecDeque::new(),
            replay_capacity,
            overflowed: false,
            mutation_seq: 0,
            pending: HashMap::new(),
        }
    }

    pub(crate) fn store(&self) -> &NotificationStore {
        &self.store
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    // ===== Bootstrap =====

    /// Start a bootstrap fetch. The returned ticket gates the resolution; a
    /// newer call supersedes any outstanding one, whose late result will then
    /// be ignored. Already-buffered changes stay parked for the new fetch.
    pub(crate) fn begin_bootstrap(&mut self) -> u64 {
        self.fetch_seq += 1;
        self.fetch_in_flight = Some(self.fetch_seq);
        self.fetch_seq
    }

    /// Install a fetched snapshot, bump the generation and replay the parked
    /// buffer against it. Returns `None` when the ticket was superseded.
    pub(crate) fn install_snapshot(
        &mut self,
        ticket: u64,
        rows: Vec<Notification>,
        current_epoch: u64,
    ) -> Option<InstallOutcome> {
        if self.fetch_in_flight != Some(ticket) {
            return None;
        }
        self.fetch_in_flight = None;
        self.store.replace_all(rows);
        self.generation += 1;
        let replay = self.drain_buffer(current_epoch);
        Some(InstallOutcome {
            generation: self.generation,
            replay,
        })
    }

    /// A bootstrap fetch failed. The store keeps its last good contents and
    /// the parked buffer is replayed against them, so pushed changes survive
    /// the failed fetch. Returns `None` when the ticket was superseded.
    pub(crate) fn bootstrap_failed(
        &mut self,
        ticket: u64,
        current_epoch: u64,
    ) -> Option<ReplayOutcome> {
        if self.fetch_in_flight != Some(ticket) {
            return None;
        }
        self.fetch_in_flight = None;
        Some(self.drain_buffer(current_epoch))
    }

    // ===== Push events =====

    pub(crate) fn apply_change(
        &mut self,
        current_epoch: u64,
        epoch: u64,
        change: RowChange,
    ) -> ChangeOutcome {
        if epoch != current_epoch {
            return ChangeOutcome::StaleEpoch;
        }
        if let Some(reason) = malformed_reason(&change) {
            return ChangeOutcome::Malformed(reason);
        }
        if self.fetch_in_flight.is_some() {
            if self.overflowed {
                return ChangeOutcome::Overflowed;
            }
            if self.buffer.len() >= self.replay_capacity {
                self.overflowed = true;
                self.buffer.clear();
                return ChangeOutcome::Overflowed;
            }
            self.buffer.push_back(BufferedChange { epoch, change });
            return ChangeOutcome::Buffered;
        }
        self.apply_now(change)
    }

    fn apply_now(&mut self, change: RowChange) -> ChangeOutcome {
        match change.event {
            ChangeOp::Insert => {
                let Some(row) = change.new else {
                    return ChangeOutcome::Malformed("INSERT without new row");
                };
                let alert = (!row.is_read).then(|| row.clone());
                if self.store.insert(row) {
                    ChangeOutcome::Applied { alert }
                } else {
                    // Redelivery of a known id; idempotent no-op.
                    ChangeOutcome::Applied { alert: None }
                }
            }
            ChangeOp::Update => {
                let Some(row) = change.new else {
                    return ChangeOutcome::Malformed("UPDATE without new row");
                };
                let alert = (!row.is_read).then(|| row.clone());
                match self.store.update(row) {
                    // Absent id: the update stands in for the insert we
                    // never saw, alerts included.
                    UpdateResult::Inserted => ChangeOutcome::Applied { alert },
                    UpdateResult::Replaced => ChangeOutcome::Applied { alert: None },
                }
            }
            ChangeOp::Delete => {
                let Some(key) = change.old else {
                    return ChangeOutcome::Malformed("DELETE without old key");
                };
                self.store.remove(&key.id);
                ChangeOutcome::Applied { alert: None }
            }
        }
    }

    fn drain_buffer(&mut self, current_epoch: u64) -> ReplayOutcome {
        let mut outcome = ReplayOutcome {
            resync_needed: self.overflowed,
            ..ReplayOutcome::default()
        };
        self.overflowed = false;
        while let Some(buffered) = self.buffer.pop_front() {
            if buffered.epoch != current_epoch {
                outcome.stale_dropped += 1;
                continue;
            }
            if let ChangeOutcome::Applied { alert } = self.apply_now(buffered.change) {
                outcome.replayed += 1;
                if let Some(row) = alert {
                    outcome.alerts.push(row);
                }
            }
        }
        outcome
    }

    // ===== Optimistic mutations =====

    pub(crate) fn begin_mark_read(&mut self, id: &str, now: DateTime<Utc>) -> MutationStart {
        match self.store.mark_read(id, now) {
            MarkReadResult::NotFound | MarkReadResult::AlreadyRead => MutationStart::NoOp,
            MarkReadResult::Marked { prior_read_at } => self.track(PendingKind::MarkRead {
                id: id.to_string(),
                prior_read_at,
            }),
        }
    }

    pub(crate) fn begin_mark_all_read(&mut self, now: DateTime<Utc>) -> MutationStart {
        if self.store.unread_count() == 0 {
            return MutationStart::NoOp;
        }
        let prior = self.store.snapshot();
        self.store.mark_all_read(now);
        self.track(PendingKind::MarkAllRead { prior })
    }

    pub(crate) fn begin_delete(&mut self, id: &str) -> MutationStart {
        let Some(tombstone) = self.store.remove(id) else {
            return MutationStart::NoOp;
        };
        self.track(PendingKind::Delete { tombstone })
    }

    pub(crate) fn resolve_mutation(
        &mut self,
        token: u64,
        result: Result<(), ApiError>,
    ) -> MutationResolution {
        let Some(pending) = self.pending.remove(&token) else {
            return MutationResolution::UnknownToken;
        };
        let stale = pending.generation != self.generation;
        match result {
            Ok(()) => {
                if stale {
                    MutationResolution::Superseded
                } else {
                    MutationResolution::Confirmed
                }
            }
            Err(error) => {
                if stale {
                    return MutationResolution::Superseded;
                }
                self.roll_back(pending.kind);
                MutationResolution::RolledBack(error)
            }
        }
    }

    fn track(&mut self, kind: PendingKind) -> MutationStart {
        self.mutation_seq += 1;
        self.pending.insert(
            self.mutation_seq,
            PendingMutation {
                generation: self.generation,
                kind,
            },
        );
        MutationStart::Started {
            token: self.mutation_seq,
        }
    }

    fn roll_back(&mut self, kind: PendingKind) {
        match kind {
            PendingKind::MarkRead { id, prior_read_at } => {
                // Skipped when a later event deleted the row or flipped it
                // back to unread; the store guards the counter.
                self.store.revert_read(&id, prior_read_at);
            }
            PendingKind::MarkAllRead { prior } => {
                self.store.restore(prior);
            }
            PendingKind::Delete { tombstone } => {
                // A pushed INSERT may have re-created the id meanwhile; the
                // pushed row wins over the tombstone.
                if !self.store.contains(&tombstone.id) {
                    self.store.insert(tombstone);
                }
            }
        }
    }
}

/// Validation the wire format cannot express: which side of the payload a
/// change kind requires.
fn malformed_reason(change: &RowChange) -> Option<&'static str> {
    match change.event {
        ChangeOp::Insert if change.new.is_none() => Some("INSERT without new row"),
        ChangeOp::Update if change.new.is_none() => Some("UPDATE without new row"),
        ChangeOp::Delete if change.old.is_none() => Some("DELETE without old key"),
        _ => None,
    }
}
