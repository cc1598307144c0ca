use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Category tag for a notification. The sync core never branches on this
/// beyond display; unknown tags from newer servers decode as `Other` so a
/// vocabulary addition never breaks older clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderPlaced,
    OrderUpdated,
    OrderCompleted,
    OrderCancelled,
    MessageReceived,
    PaymentReceived,
    GigApproved,
    GigRejected,
    #[serde(other)]
    Other,
}

/// One notification row as the server stores it. `id` is globally unique and
/// immutable; `created_at` is assigned by the server and never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    /// Free-form payload (related order, gig, conversation). Carried through
    /// untouched for navigation, never interpreted here.
    #[serde(default)]
    pub data: Option<Value>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
}

impl NotificationKind {
    /// Wire tag for display; matches the serde encoding.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::OrderPlaced => "order_placed",
            NotificationKind::OrderUpdated => "order_updated",
            NotificationKind::OrderCompleted => "order_completed",
            NotificationKind::OrderCancelled => "order_cancelled",
            NotificationKind::MessageReceived => "message_received",
            NotificationKind::PaymentReceived => "payment_received",
            NotificationKind::GigApproved => "gig_approved",
            NotificationKind::GigRejected => "gig_rejected",
            NotificationKind::Other => "other",
        }
    }
}

impl Notification {
    /// Display order: newest first, id as the tiebreak so equal timestamps
    /// still sort the same way on every client.
    pub fn sorts_before(&self, other: &Notification) -> bool {
        match self.created_at.cmp(&other.created_at) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => self.id < other.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_wire_format() {
        let json = r#"{
            "id": "n-1",
            "userId": "u-1",
            "type": "order_placed",
            "title": "New order",
            "message": "You received an order",
            "data": {"orderId": "o-9"},
            "isRead": false,
            "createdAt": "2025-06-01T12:00:00Z"
        }"#;

        let n: Notification = serde_json::from_str(json).unwrap();
        assert_eq!(n.id, "n-1");
        assert_eq!(n.user_id, "u-1");
        assert_eq!(n.kind, NotificationKind::OrderPlaced);
        assert!(!n.is_read);
        assert_eq!(n.read_at, None);
        assert_eq!(n.data.unwrap()["orderId"], "o-9");
    }

    #[test]
    fn test_unknown_kind_maps_to_other() {
        let json = r#"{
            "id": "n-2",
            "userId": "u-1",
            "type": "loyalty_badge_minted",
            "title": "t",
            "message": "m",
            "isRead": true,
            "createdAt": "2025-06-01T12:00:00Z",
            "readAt": "2025-06-01T12:05:00Z"
        }"#;

        let n: Notification = serde_json::from_str(json).unwrap();
        assert_eq!(n.kind, NotificationKind::Other);
        assert!(n.is_read);
        assert!(n.read_at.is_some());
    }

    #[test]
    fn test_serialize_uses_camel_case_and_type_key() {
        let n = Notification {
            id: "n-3".into(),
            user_id: "u-1".into(),
            kind: NotificationKind::PaymentReceived,
            title: "Paid".into(),
            message: "Payment received".into(),
            data: None,
            is_read: false,
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            read_at: None,
        };

        let value = serde_json::to_value(&n).unwrap();
        assert_eq!(value["userId"], "u-1");
        assert_eq!(value["type"], "payment_received");
        assert_eq!(value["isRead"], false);
        assert!(value.get("user_id").is_none());
    }

    #[test]
    fn test_sorts_before_newest_first_id_tiebreak() {
        let older = Notification {
            id: "a".into(),
            user_id: "u".into(),
            kind: NotificationKind::Other,
            title: String::new(),
            message: String::new(),
            data: None,
            is_read: false,
            created_at: DateTime::from_timestamp(100, 0).unwrap(),
            read_at: None,
        };
        let newer = Notification {
            created_at: DateTime::from_timestamp(200, 0).unwrap(),
            ..older.clone()
        };
        let same_time_b = Notification {
            id: "b".into(),
            ..older.clone()
        };

        assert!(newer.sorts_before(&older));
        assert!(!older.sorts_before(&newer));
        assert!(older.sorts_before(&same_time_b));
        assert!(!same_time_b.sorts_before(&older));
    }
}
