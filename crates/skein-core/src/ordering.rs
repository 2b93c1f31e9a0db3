//! Ordering of top-level spaces.
//!
//! Spaces carry a sparse, optional ordering key. Unlike the usual
//! "missing sorts first" convention, a space *without* a key sorts after
//! every space that has one. The comparator spells this out instead of
//! relying on `Option`'s derived order, which would do the opposite.

use std::cmp::Ordering;

use skein_proto::{RoomId, SpaceNode};

/// Longest accepted ordering key.
pub const MAX_ORDER_LEN: usize = 50;

/// Normalize a raw ordering key.
///
/// Keys that are empty, longer than [`MAX_ORDER_LEN`], or contain characters
/// outside printable ASCII (`0x20..=0x7E`) are treated as absent.
pub fn valid_order(raw: Option<&str>) -> Option<&str> {
    raw.filter(|key| {
        !key.is_empty()
            && key.len() <= MAX_ORDER_LEN
            && key.bytes().all(|b| (0x20..=0x7E).contains(&b))
    })
}

/// Compare two `(id, order)` pairs.
///
/// - Both keys present: by key, then by id
/// - One key present: the keyed entry first
/// - Neither present: by id
pub fn compare_space_order(
    a: (&RoomId, Option<&str>),
    b: (&RoomId, Option<&str>),
) -> Ordering {
    match (valid_order(a.1), valid_order(b.1)) {
        (Some(ka), Some(kb)) => ka.cmp(kb).then_with(|| a.0.cmp(b.0)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.0.cmp(b.0),
    }
}

/// Compare two space nodes by their ordering keys.
pub fn compare_nodes(a: &SpaceNode, b: &SpaceNode) -> Ordering {
    compare_space_order((&a.id, a.order.as_deref()), (&b.id, b.order.as_deref()))
}

/// Sort space nodes into display order.
pub fn sort_spaces(spaces: &mut [SpaceNode]) {
    spaces.sort_by(compare_nodes);
}
