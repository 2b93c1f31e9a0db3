//! Operations for model-based testing.
//!
//! Operations mutate a small space graph. They are generated by proptest (or
//! decoded by `arbitrary` in the fuzzer) and applied to both the model and a
//! real store.

use arbitrary::Arbitrary;
use skein_proto::{Membership, RoomId};

/// Node identifier. `0..SPACE_SLOTS` are spaces, the rest plain rooms.
pub type ModelNodeId = u8;

/// Number of space slots.
pub const SPACE_SLOTS: u8 = 8;

/// Total node slots.
pub const NODE_SLOTS: u8 = 16;

/// Map a model node to its room id. Ids wrap into the slot range.
pub fn room_id(node: ModelNodeId) -> RoomId {
    let node = node % NODE_SLOTS;
    if node < SPACE_SLOTS {
        RoomId::new(format!("!space{node}:model"))
    } else {
        RoomId::new(format!("!room{node}:model"))
    }
}

/// Whether a node slot is a space.
pub fn is_space_slot(node: ModelNodeId) -> bool {
    node % NODE_SLOTS < SPACE_SLOTS
}

/// Membership state in model form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Arbitrary)]
pub enum ModelMembership {
    /// Joined.
    Joined,
    /// Invited.
    Invited,
    /// Left.
    Left,
}

impl From<ModelMembership> for Membership {
    fn from(m: ModelMembership) -> Self {
        match m {
            ModelMembership::Joined => Self::Joined,
            ModelMembership::Invited => Self::Invited,
            ModelMembership::Left => Self::Left,
        }
    }
}

/// A change to the graph.
#[derive(Debug, Clone, PartialEq, Eq, Arbitrary)]
pub enum GraphOperation {
    /// Replace a space's child list. Non-space targets are ignored.
    SetChildren {
        /// Space being edited.
        space: ModelNodeId,
        /// New children, in order. May repeat and may point back up.
        children: Vec<ModelNodeId>,
    },

    /// Change a node's membership.
    SetMembership {
        /// Node being edited.
        node: ModelNodeId,
        /// New membership.
        membership: ModelMembership,
    },

    /// Make a node known to the store.
    Touch {
        /// Node to materialize.
        node: ModelNodeId,
    },
}
