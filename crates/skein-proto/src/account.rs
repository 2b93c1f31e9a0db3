//! Account parameters and session id derivation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::ids::{SessionId, UserId};

/// Credentials and endpoint of one signed-in account.
///
/// # Security
///
/// - **Debug Redaction**: The `Debug` impl redacts `access_token` so account
///   params can be logged safely.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountParams {
    /// Account owner.
    pub user_id: UserId,
    /// Device this login belongs to.
    pub device_id: String,
    /// Homeserver base URL.
    pub homeserver: String,
    /// Bearer token for the homeserver.
    pub access_token: String,
}

impl AccountParams {
    /// Create account params.
    pub fn new(
        user_id: impl Into<UserId>,
        device_id: impl Into<String>,
        homeserver: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            device_id: device_id.into(),
            homeserver: homeserver.into(),
            access_token: access_token.into(),
        }
    }

    /// Derive the stable session id for these credentials.
    ///
    /// Lowercase hex SHA-256 of `"{user_id}|{device_id}"`. The same login on
    /// the same device always maps to the same session; a token refresh does
    /// not change it.
    pub fn session_id(&self) -> SessionId {
        let mut hasher = Sha256::new();
        hasher.update(self.user_id.as_str().as_bytes());
        hasher.update(b"|");
        hasher.update(self.device_id.as_bytes());
        SessionId::new(hex::encode(hasher.finalize()))
    }
}

impl std::fmt::Debug for AccountParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountParams")
            .field("user_id", &self.user_id)
            .field("device_id", &self.device_id)
            .field("homeserver", &self.homeserver)
            .field("access_token", &format!("<redacted {} bytes>", self.access_token.len()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(device: &str, token: &str) -> AccountParams {
        AccountParams::new("@alice:example.org", device, "https://example.org", token)
    }

    #[test]
    fn session_id_ignores_token() {
        assert_eq!(params("DEV", "one").session_id(), params("DEV", "two").session_id());
    }

    #[test]
    fn session_id_depends_on_device() {
        assert_ne!(params("DEV1", "t").session_id(), params("DEV2", "t").session_id());
    }

    #[test]
    fn session_id_is_hex_sha256() {
        let id = params("DEV", "t").session_id();
        assert_eq!(id.as_str().len(), 64);
        assert!(id.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn debug_redacts_token() {
        let rendered = format!("{:?}", params("DEV", "super-secret"));
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted 12 bytes>"));
    }
}
