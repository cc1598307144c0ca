use crate::models::Notification;

/// Local alert hook, fired once per newly arrived unread notification (never
/// for bootstrap rows or redeliveries). Implementations surface a toast or a
/// sound. Failures stay inside the implementation; alerting is best-effort
/// and never part of the consistency contract.
pub trait LocalAlerts: Send + Sync {
    fn alert(&self, notification: &Notification);
}

/// Default hook that alerts nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAlerts;

impl LocalAlerts for NoopAlerts {
    fn alert(&self, _notification: &Notification) {}
}
