use parking_lot::RwLock;

/// Session boundary: a stable user identifier plus the bearer credential used
/// for API calls. The user id must not change for the lifetime of a sync
/// runtime; switching users means tearing down and spawning a fresh one.
pub trait SessionProvider: Send + Sync {
    fn user_id(&self) -> String;
    fn bearer_token(&self) -> String;
}

/// Fixed user with a rotatable token. Refresh flows swap the token in place
/// and in-flight requests pick up the new value on their next call.
pub struct StaticSession {
    user_id: String,
    token: RwLock<String>,
}

impl StaticSession {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token: RwLock::new(token.into()),
        }
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write() = token.into();
    }
}

impl SessionProvider for StaticSession {
    fn user_id(&self) -> String {
        self.user_id.clone()
    }

    fn bearer_token(&self) -> String {
        self.token.read().clone()
    }
}
