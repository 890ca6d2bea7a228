//! Portal account credentials

use serde::{Deserialize, Serialize};
use std::{env, fmt};

/// Username and password for the portal's identity provider
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortalCredentials {
    /// Account username (usually an e-mail address)
    #[serde(default)]
    pub username: String,

    /// Account password
    #[serde(default)]
    pub password: String,
}

impl PortalCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Overlay `HEATPUMP_USERNAME` / `HEATPUMP_PASSWORD` when set
    pub fn apply_env(&mut self) {
        if let Ok(username) = env::var("HEATPUMP_USERNAME") {
            self.username = username;
        }
        if let Ok(password) = env::var("HEATPUMP_PASSWORD") {
            self.password = password;
        }
    }

    /// Whether a password is present
    pub fn has_password(&self) -> bool {
        !self.password.is_empty()
    }
}

impl fmt::Debug for PortalCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortalCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_hides_password() {
        let creds = PortalCredentials::new("user@example.com", "hunter2");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("user@example.com"));
        assert!(!rendered.contains("hunter2"));
    }
}
