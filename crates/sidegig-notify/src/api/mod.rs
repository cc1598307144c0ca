mod client;

pub use client::{
    ApiError, HttpNotificationsApi, NotificationSnapshot, NotificationsApi,
};
