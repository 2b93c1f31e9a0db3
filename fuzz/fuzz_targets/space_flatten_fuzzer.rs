//! Fuzz target for space graph flattening
//!
//! Arbitrary edit sequences build a graph with cycles, self-references,
//! repeated children and membership churn.
//!
//! # Invariants
//!
//! - Flattening always terminates
//! - Output matches the reference model exactly
//! - No room appears twice in the output
//! - The root always heads the space list

#![no_main]

use std::collections::HashSet;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use skein_core::{LocalStore, MemoryStore, flatten_rooms, flatten_spaces};
use skein_harness::{
    GraphOperation, ModelGraph,
    model::{SPACE_SLOTS, room_id},
};
use skein_proto::{MembershipFilter, RoomDelta, SyncDelta, SyncToken};

#[derive(Debug, Clone, Arbitrary)]
struct FuzzInput {
    /// Raw filter bits; unknown bits are dropped.
    filter: u8,
    ops: Vec<GraphOperation>,
}

fuzz_target!(|input: FuzzInput| {
    let filter = MembershipFilter::from_bits_truncate(input.filter);
    let mut model = ModelGraph::new();
    let store = MemoryStore::new();

    for (step, op) in input.ops.iter().enumerate() {
        let changed = model.apply(op);
        let delta = SyncDelta::new(
            SyncToken::new(format!("t{step}")),
            changed.into_iter().map(RoomDelta::node).collect(),
        );
        if store.apply_delta(&delta).is_err() {
            return;
        }
    }

    for root in 0..SPACE_SLOTS {
        let root_id = room_id(root);
        let Ok(rooms) = flatten_rooms(&root_id, filter, |id| store.space_node(id)) else { return };
        let Ok(spaces) = flatten_spaces(&root_id, filter, |id| store.space_node(id)) else { return };

        assert_eq!(rooms, model.flatten_rooms(root, filter), "rooms below {root_id}");
        assert_eq!(spaces, model.flatten_spaces(root, filter), "spaces below {root_id}");
        assert_eq!(spaces.first(), Some(&root_id));

        let unique: HashSet<_> = rooms.iter().collect();
        assert_eq!(unique.len(), rooms.len(), "duplicate room below {root_id}");
    }
});
