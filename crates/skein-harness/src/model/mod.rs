//! Reference model for model-based testing.
//!
//! The model is a deliberately naive implementation of space graph
//! flattening. It serves as the oracle the real resolver is checked against.
//!
//! # Design Principles
//!
//! - Simplicity: The model should be obviously correct
//! - Deterministic: Same operations produce the same graph

mod graph;
pub mod operation;

pub use graph::ModelGraph;
pub use operation::{
    GraphOperation, ModelMembership, ModelNodeId, NODE_SLOTS, SPACE_SLOTS, is_space_slot, room_id,
};
