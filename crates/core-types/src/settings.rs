use serde::{Deserialize, Serialize};

/// Settings every engine needs; frozen at startup and shared by reference.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// URL under which the platform's own administrative resource server is
    /// registered. Delegations on this server make their holder an auth
    /// delegate.
    pub auth_server_url: String,
}

impl AuthSettings {
    pub fn new(auth_server_url: impl Into<String>) -> Self {
        Self {
            auth_server_url: auth_server_url.into(),
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self::new("auth.localhost")
    }
}

/// How access-request outcomes are mailed to consumers.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationSettings {
    pub email_enabled: bool,
    pub sender: String,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            email_enabled: true,
            sender: "noreply@auth.localhost".into(),
        }
    }
}
