//! Fuzz target for decoding staged ephemeral payloads and sync deltas
//!
//! The ephemeral buffer reads back files a crashed process may have left
//! half-written, so decoding must cope with any byte sequence.
//!
//! # Invariants
//!
//! - NEVER panic on malformed input
//! - Anything that decodes re-encodes to a value that decodes identically

#![no_main]

use libfuzzer_sys::fuzz_target;
use skein_proto::{EphemeralPayload, SyncDelta, decode_cbor, encode_cbor};

fuzz_target!(|data: &[u8]| {
    if let Ok(payload) = decode_cbor::<EphemeralPayload>(data) {
        let bytes = encode_cbor(&payload).expect("decoded payload must re-encode");
        let again: EphemeralPayload = decode_cbor(&bytes).expect("re-encoded payload must decode");
        assert_eq!(payload, again);
    }

    if let Ok(delta) = decode_cbor::<SyncDelta>(data) {
        let bytes = encode_cbor(&delta).expect("decoded delta must re-encode");
        let again: SyncDelta = decode_cbor(&bytes).expect("re-encoded delta must decode");
        assert_eq!(delta, again);
    }
});
