//! Composer drafts.

use serde::{Deserialize, Serialize};

use crate::ids::EventId;

/// Unsent composer content for a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserDraft {
    /// Plain new message.
    Regular {
        /// Composer text.
        text: String,
    },
    /// Quote of an existing event.
    Quote {
        /// Quoted event.
        event_id: EventId,
        /// Composer text.
        text: String,
    },
    /// Edit of one of the user's events.
    Edit {
        /// Edited event.
        event_id: EventId,
        /// Replacement text.
        text: String,
    },
    /// Reply to an event.
    Reply {
        /// Event replied to.
        event_id: EventId,
        /// Composer text.
        text: String,
    },
}

impl UserDraft {
    /// Composer text of any draft kind.
    pub fn text(&self) -> &str {
        match self {
            Self::Regular { text }
            | Self::Quote { text, .. }
            | Self::Edit { text, .. }
            | Self::Reply { text, .. } => text,
        }
    }

    /// Whether the draft holds no text worth keeping.
    pub fn is_blank(&self) -> bool {
        self.text().trim().is_empty()
    }
}
