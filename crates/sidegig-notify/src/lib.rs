//! Client-side notification state synchronization for Sidegig: one engine
//! task owns the per-user collection and keeps it consistent across bootstrap
//! fetches, pushed row changes and optimistic mutations with rollback.

pub mod alerts;
pub mod api;
pub mod auth;
pub mod channel;
pub mod config;
pub mod error;
pub mod models;
pub mod stats;
pub mod store;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

// Re-export the embedding surface at the crate root for convenience.
pub use alerts::{LocalAlerts, NoopAlerts};
pub use api::{ApiError, HttpNotificationsApi, NotificationSnapshot, NotificationsApi};
pub use auth::{SessionProvider, StaticSession};
pub use channel::{
    ChangeOp, ChannelError, ChannelMessage, ChannelStream, ChannelTransport, InProcessChannel,
    RowChange, RowRef,
};
pub use config::SyncConfig;
pub use error::SyncError;
pub use models::{Notification, NotificationKind};
pub use stats::{SharedSyncStats, SyncStats};
pub use store::NotificationStore;
pub use sync::{MutationOutcome, NotificationView, NotifyHandle, SyncRuntime, SyncStatus};
