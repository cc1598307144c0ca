use thiserror::Error;

use crate::api::ApiError;

/// Failures surfaced through [`NotifyHandle`](crate::sync::NotifyHandle)
/// operations. Staleness discards (old epochs, superseded generations) are
/// not errors; they are counted in [`SyncStats`](crate::stats::SyncStats).
#[derive(Debug, Error)]
pub enum SyncError {
    /// The bootstrap fetch failed. The store keeps its last good contents
    /// and buffered events were replayed against them.
    #[error("bootstrap fetch failed: {reason}")]
    Fetch { reason: String },
    /// The server refused a confirmation call. The optimistic change was
    /// rolled back before this was returned.
    #[error("mutation rolled back: {0}")]
    Mutation(#[source] ApiError),
    /// The sync runtime has shut down; no further operations will succeed.
    #[error("notification sync runtime is not running")]
    Closed,
}
