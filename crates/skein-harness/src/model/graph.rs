//! Reference space graph.
//!
//! Flattening here is recursive and written for obviousness; the real
//! resolver uses an explicit stack. Both must agree.

use std::collections::{BTreeMap, HashSet};

use skein_proto::{Membership, MembershipFilter, RoomId, SpaceNode};

use super::operation::{GraphOperation, ModelNodeId, NODE_SLOTS, is_space_slot, room_id};

#[derive(Debug, Clone)]
struct ModelNode {
    membership: Membership,
    children: Vec<ModelNodeId>,
}

/// Model of the materialized space graph.
#[derive(Debug, Clone, Default)]
pub struct ModelGraph {
    nodes: BTreeMap<ModelNodeId, ModelNode>,
}

impl ModelGraph {
    /// Empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an operation. Returns the nodes whose materialized state
    /// changed, ready to commit to a real store.
    pub fn apply(&mut self, op: &GraphOperation) -> Vec<SpaceNode> {
        let touched = match op {
            GraphOperation::SetChildren { space, children } => {
                let space = space % NODE_SLOTS;
                if !is_space_slot(space) {
                    return Vec::new();
                }
                self.entry(space).children = children.iter().map(|c| c % NODE_SLOTS).collect();
                space
            },
            GraphOperation::SetMembership { node, membership } => {
                let node = node % NODE_SLOTS;
                self.entry(node).membership = (*membership).into();
                node
            },
            GraphOperation::Touch { node } => {
                let node = node % NODE_SLOTS;
                self.entry(node);
                node
            },
        };
        self.space_node(touched).into_iter().collect()
    }

    fn entry(&mut self, node: ModelNodeId) -> &mut ModelNode {
        self.nodes
            .entry(node)
            .or_insert_with(|| ModelNode { membership: Membership::Joined, children: Vec::new() })
    }

    /// Real-store representation of one node.
    pub fn space_node(&self, node: ModelNodeId) -> Option<SpaceNode> {
        let model = self.nodes.get(&node)?;
        let base = if is_space_slot(node) {
            SpaceNode::space(room_id(node), model.children.iter().map(|c| room_id(*c)))
        } else {
            SpaceNode::room(room_id(node))
        };
        Some(base.with_membership(model.membership))
    }

    /// Every materialized node.
    pub fn space_nodes(&self) -> Vec<SpaceNode> {
        self.nodes.keys().filter_map(|n| self.space_node(*n)).collect()
    }

    /// Rooms below `root`: depth-first, listed order, no duplicates.
    pub fn flatten_rooms(&self, root: ModelNodeId, accepted: MembershipFilter) -> Vec<RoomId> {
        let mut visited = HashSet::from([root]);
        let mut out = Vec::new();
        self.visit_rooms(root, accepted, &mut visited, &mut out);
        out.into_iter().map(room_id).collect()
    }

    fn visit_rooms(
        &self,
        space: ModelNodeId,
        accepted: MembershipFilter,
        visited: &mut HashSet<ModelNodeId>,
        out: &mut Vec<ModelNodeId>,
    ) {
        let Some(node) = self.nodes.get(&space) else { return };
        for &child in &node.children {
            let Some(child_node) = self.nodes.get(&child) else { continue };
            if !accepted.accepts(child_node.membership) {
                continue;
            }
            if is_space_slot(child) {
                if visited.insert(child) {
                    self.visit_rooms(child, accepted, visited, out);
                }
            } else if !out.contains(&child) {
                out.push(child);
            }
        }
    }

    /// `root` plus every reachable space, in depth-first order.
    pub fn flatten_spaces(&self, root: ModelNodeId, accepted: MembershipFilter) -> Vec<RoomId> {
        let mut order = vec![root];
        let mut visited = HashSet::from([root]);
        self.visit_spaces(root, accepted, &mut visited, &mut order);
        order.into_iter().map(room_id).collect()
    }

    /// Nodes whose change can alter the flattening: `root` plus every child
    /// listed by a reachable space, first occurrence kept.
    pub fn dependencies(&self, root: ModelNodeId, accepted: MembershipFilter) -> Vec<RoomId> {
        let mut spaces = vec![root];
        let mut visited = HashSet::from([root]);
        self.visit_spaces(root, accepted, &mut visited, &mut spaces);

        let mut out = Vec::new();
        for space in spaces {
            if !out.contains(&space) {
                out.push(space);
            }
            let Some(node) = self.nodes.get(&space) else { continue };
            for &child in &node.children {
                if !out.contains(&child) {
                    out.push(child);
                }
            }
        }
        out.into_iter().map(room_id).collect()
    }

    fn visit_spaces(
        &self,
        space: ModelNodeId,
        accepted: MembershipFilter,
        visited: &mut HashSet<ModelNodeId>,
        order: &mut Vec<ModelNodeId>,
    ) {
        let Some(node) = self.nodes.get(&space) else { return };
        for &child in &node.children {
            let Some(child_node) = self.nodes.get(&child) else { continue };
            if !is_space_slot(child) || !accepted.accepts(child_node.membership) {
                continue;
            }
            if visited.insert(child) {
                order.push(child);
                self.visit_spaces(child, accepted, visited, order);
            }
        }
    }
}
