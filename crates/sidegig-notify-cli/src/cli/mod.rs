pub mod config;
pub mod watch;

use sidegig_notify::{Notification, SyncStatus};

/// One-line rendering used by `list` and `watch`.
pub fn notification_line(notification: &Notification) -> String {
    let marker = if notification.is_read { ' ' } else { '*' };
    format!(
        "{marker} {}  {}  [{}] {}",
        notification.created_at.format("%Y-%m-%d %H:%M"),
        notification.id,
        notification.kind.as_str(),
        notification.title
    )
}

pub fn status_label(status: SyncStatus) -> &'static str {
    match status {
        SyncStatus::Offline => "offline",
        SyncStatus::Connecting => "connecting",
        SyncStatus::Live => "live",
        SyncStatus::Degraded => "degraded",
    }
}
