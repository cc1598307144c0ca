use std::time::Duration;

/// Tunables for the sync runtime. `Default` suits production; tests shrink
/// the buffers and delays.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the persistence API, e.g. `https://api.sidegig.app/v1`.
    pub api_base: String,
    /// Capacity of the engine queue that serializes commands, channel events
    /// and confirmation results.
    pub queue_capacity: usize,
    /// Cap on row changes buffered while a bootstrap fetch is outstanding.
    /// On overflow the buffer is dropped and a follow-up resync reconciles.
    pub replay_capacity: usize,
    /// First reconnect delay after a channel drop.
    pub backoff_initial: Duration,
    /// Ceiling for the doubling reconnect delay.
    pub backoff_max: Duration,
}

impl SyncConfig {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            ..Self::default()
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.sidegig.app/v1".to_string(),
            queue_capacity: 256,
            replay_capacity: 512,
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(30),
        }
    }
}
