use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::SessionProvider;
use crate::models::Notification;

/// Bulk fetch payload: the user's full notification set plus the unread count
/// the server believes. The count is advisory; the store derives its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationSnapshot {
    pub notifications: Vec<Notification>,
    pub unread_count: u32,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {0}")]
    HttpStatus(reqwest::StatusCode),
    /// HTTP succeeded but the response envelope did not report success.
    #[error("server rejected the request (status \"{status}\")")]
    Rejected { status: String },
    #[error("success response carried no data payload")]
    MissingData,
}

/// Persistence boundary for notifications, JSON over HTTP with bearer auth.
/// Fetch returns the whole per-user set; mutations return only confirmation.
#[async_trait]
pub trait NotificationsApi: Send + Sync {
    async fn list(&self) -> Result<NotificationSnapshot, ApiError>;
    async fn mark_read(&self, id: &str) -> Result<(), ApiError>;
    async fn mark_all_read(&self) -> Result<(), ApiError>;
    async fn delete(&self, id: &str) -> Result<(), ApiError>;
}

/// Every endpoint wraps its payload in `{"status": "...", "data": ...}`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: String,
    #[serde(default = "Option::default")]
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn into_data(self) -> Result<Option<T>, ApiError> {
        if self.status == "success" {
            Ok(self.data)
        } else {
            Err(ApiError::Rejected {
                status: self.status,
            })
        }
    }
}

/// Production client against the Sidegig REST API.
pub struct HttpNotificationsApi {
    base_url: String,
    session: Arc<dyn SessionProvider>,
    client: reqwest::Client,
}

impl HttpNotificationsApi {
    pub fn new(base_url: impl Into<String>, session: Arc<dyn SessionProvider>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<Option<T>, ApiError> {
        let response = request
            .header(
                "Authorization",
                format!("Bearer {}", self.session.bearer_token()),
            )
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ApiError::HttpStatus(response.status()));
        }

        let envelope: Envelope<T> = response.json().await?;
        envelope.into_data()
    }
}

#[async_trait]
impl NotificationsApi for HttpNotificationsApi {
    async fn list(&self) -> Result<NotificationSnapshot, ApiError> {
        let request = self.client.get(self.url("/notifications"));
        self.execute(request).await?.ok_or(ApiError::MissingData)
    }

    async fn mark_read(&self, id: &str) -> Result<(), ApiError> {
        let request = self.client.put(self.url(&format!("/notifications/{id}/read")));
        self.execute::<serde_json::Value>(request).await?;
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<(), ApiError> {
        let request = self.client.put(self.url("/notifications/read-all"));
        self.execute::<serde_json::Value>(request).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), ApiError> {
        let request = self.client.delete(self.url(&format!("/notifications/{id}")));
        self.execute::<serde_json::Value>(request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_success_with_data() {
        let envelope: Envelope<NotificationSnapshot> = serde_json::from_str(
            r#"{"status": "success", "data": {"notifications": [], "unreadCount": 0}}"#,
        )
        .unwrap();

        let snapshot = envelope.into_data().unwrap().unwrap();
        assert_eq!(snapshot.unread_count, 0);
        assert!(snapshot.notifications.is_empty());
    }

    #[test]
    fn test_envelope_success_without_data() {
        let envelope: Envelope<serde_json::Value> =
            serde_json::from_str(r#"{"status": "success"}"#).unwrap();
        assert!(envelope.into_data().unwrap().is_none());
    }

    #[test]
    fn test_envelope_non_success_is_rejected() {
        let envelope: Envelope<serde_json::Value> =
            serde_json::from_str(r#"{"status": "error", "data": {"k": 1}}"#).unwrap();

        match envelope.into_data() {
            Err(ApiError::Rejected { status }) => assert_eq!(status, "error"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let session = Arc::new(crate::auth::StaticSession::new("u-1", "tok"));
        let api = HttpNotificationsApi::new("https://api.example.com/v1/", session);
        assert_eq!(
            api.url("/notifications"),
            "https://api.example.com/v1/notifications"
        );
    }
}
