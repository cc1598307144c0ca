use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use sidegig_notify::{
    InProcessChannel, NotificationView, SessionProvider, SyncConfig, SyncRuntime, SyncStats,
};

use crate::cli::config::Settings;
use crate::cli::{notification_line, status_label};

/// Run the sync engine in the foreground, printing view transitions until
/// Ctrl-C. Pushes arrive through an in-process channel; without a bridge
/// feeding it, the periodic resync keeps the view fresh.
pub async fn run(
    settings: Settings,
    session: Arc<dyn SessionProvider>,
    interval: u64,
) -> Result<()> {
    let transport = Arc::new(InProcessChannel::new());
    let handle = SyncRuntime::spawn(SyncConfig::new(settings.api_url), session, transport);

    let mut view_rx = handle.view();
    let mut ticker = tokio::time::interval(Duration::from_secs(interval.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The spawn already started the first fetch; skip the immediate tick.
    ticker.tick().await;

    let mut last: Option<NotificationView> = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                handle.shutdown().await;
                print_stats(&handle.stats());
                return Ok(());
            }
            _ = ticker.tick() => {
                if let Err(error) = handle.resync().await {
                    eprintln!("resync failed: {error}");
                }
            }
            changed = view_rx.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let view = view_rx.borrow_and_update().clone();
                print_transition(last.as_ref(), &view);
                last = Some(view);
            }
        }
    }
}

fn print_stats(stats: &SyncStats) {
    println!(
        "session: {} events applied, {} buffered, {} bootstraps ({} failed), {} rollbacks, {} reconnects",
        stats.events_applied,
        stats.events_buffered,
        stats.bootstraps,
        stats.bootstrap_failures,
        stats.rollbacks,
        stats.reconnects
    );
}

fn print_transition(previous: Option<&NotificationView>, view: &NotificationView) {
    let status_changed = previous.map_or(true, |p| p.status != view.status);
    if status_changed {
        println!("[{}] unread: {}", status_label(view.status), view.unread_count);
        if let Some(error) = &view.last_error {
            println!("  last error: {error}");
        }
    }

    let Some(previous) = previous else {
        for notification in &view.notifications {
            println!("  {}", notification_line(notification));
        }
        return;
    };

    for notification in &view.notifications {
        if !previous.notifications.iter().any(|p| p.id == notification.id) {
            println!("+ {}", notification_line(notification));
        }
    }
    for notification in &previous.notifications {
        if !view.notifications.iter().any(|n| n.id == notification.id) {
            println!("- {}", notification_line(notification));
        }
    }
    if previous.unread_count != view.unread_count && !status_changed {
        println!("  unread: {}", view.unread_count);
    }
}
