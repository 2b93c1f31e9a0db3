//! Identifier newtypes.
//!
//! Protocol identifiers are opaque strings. Wrapping each kind in its own type
//! keeps a room id from being passed where a user id is expected.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap a raw identifier.
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self(raw)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Stable identifier of a signed-in session, derived from credentials.
    SessionId
);

string_id!(
    /// Room or space identifier (`!opaque:server`).
    RoomId
);

string_id!(
    /// User identifier (`@name:server`).
    UserId
);

string_id!(
    /// Server-assigned event identifier.
    EventId
);

string_id!(
    /// Client-generated identifier of a not-yet-confirmed outbound event.
    LocalEchoId
);

/// Prefix shared by every local echo id.
pub const LOCAL_ECHO_PREFIX: &str = "$local.";

impl LocalEchoId {
    /// Build a local echo id from 16 random bytes.
    ///
    /// The caller supplies the randomness so ids stay deterministic under a
    /// seeded test environment.
    pub fn from_random(random: u128) -> Self {
        Self(format!("{LOCAL_ECHO_PREFIX}{random:032x}"))
    }

    /// Whether a raw event id names a local echo rather than a server event.
    pub fn is_local_echo(raw: &str) -> bool {
        raw.starts_with(LOCAL_ECHO_PREFIX)
    }
}
