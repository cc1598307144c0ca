mod notification_store;

pub use notification_store::{MarkReadResult, NotificationStore, StoreSnapshot, UpdateResult};
