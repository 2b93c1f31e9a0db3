//! Space graph payload types.
//!
//! A space is a room that lists other rooms (and other spaces) as children.
//! The protocol does not stop a space from listing one of its own ancestors,
//! so consumers must treat the graph as possibly cyclic.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::ids::RoomId;

/// What kind of container a node is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoomKind {
    /// Ordinary room holding a timeline.
    Room,
    /// Container of rooms and other spaces.
    Space,
}

/// The local user's membership in a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Membership {
    /// Joined.
    Joined,
    /// Invited but not yet joined.
    Invited,
    /// Left, kicked or banned.
    Left,
}

bitflags! {
    /// Set of memberships a traversal accepts.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct MembershipFilter: u8 {
        /// Accept joined nodes.
        const JOINED = 0b0000_0001;
        /// Accept invited nodes.
        const INVITED = 0b0000_0010;
        /// Accept left nodes.
        const LEFT = 0b0000_0100;
    }
}

impl MembershipFilter {
    /// Whether a membership passes this filter.
    pub fn accepts(self, membership: Membership) -> bool {
        let flag = match membership {
            Membership::Joined => Self::JOINED,
            Membership::Invited => Self::INVITED,
            Membership::Left => Self::LEFT,
        };
        self.contains(flag)
    }
}

impl Default for MembershipFilter {
    /// Joined and invited: the memberships that take part in traversal.
    fn default() -> Self {
        Self::JOINED | Self::INVITED
    }
}

/// One node of the space graph as materialized in the local store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpaceNode {
    /// Node id.
    pub id: RoomId,
    /// Room or space.
    pub kind: RoomKind,
    /// Local user's membership.
    pub membership: Membership,
    /// Sparse ordering key among top-level spaces.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub order: Option<String>,
    /// Children in listed order. Always empty for plain rooms.
    #[serde(default)]
    pub children: Vec<RoomId>,
}

impl SpaceNode {
    /// A joined plain room.
    pub fn room(id: impl Into<RoomId>) -> Self {
        Self {
            id: id.into(),
            kind: RoomKind::Room,
            membership: Membership::Joined,
            order: None,
            children: Vec::new(),
        }
    }

    /// A joined space with the given children.
    pub fn space(id: impl Into<RoomId>, children: impl IntoIterator<Item = RoomId>) -> Self {
        Self {
            id: id.into(),
            kind: RoomKind::Space,
            membership: Membership::Joined,
            order: None,
            children: children.into_iter().collect(),
        }
    }

    /// Replace the membership.
    #[must_use]
    pub fn with_membership(mut self, membership: Membership) -> Self {
        self.membership = membership;
        self
    }

    /// Replace the ordering key.
    #[must_use]
    pub fn with_order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }

    /// Whether this node is a space.
    pub fn is_space(&self) -> bool {
        self.kind == RoomKind::Space
    }
}
