pub(crate) mod engine;
mod reconciler;
mod runtime;

pub use runtime::{MutationOutcome, NotificationView, NotifyHandle, SyncRuntime, SyncStatus};
