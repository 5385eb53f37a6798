//! Property tests for the wire codecs: arbitrary input never panics a
//! decoder, and well-formed values survive a round trip.

use handoff_wire::{ControlEnvelope, ControlMessageType, ConnectFrame, MessagingFrame, ProtocolLimits, varint};
use proptest::prelude::*;

proptest! {
    #[test]
    fn varint_read_inverts_write(n in any::<u32>()) {
        let mut out = Vec::new();
        varint::write(&mut out, n);
        prop_assert_eq!(out.len(), varint::size(n));
        let mut cursor = out.as_slice();
        prop_assert_eq!(varint::read(&mut cursor), Some(n));
        prop_assert!(cursor.is_empty());
    }

    #[test]
    fn varint_truncated_prefix_is_incomplete(n in 128u32..) {
        let mut out = Vec::new();
        varint::write(&mut out, n);
        for len in 0..out.len() {
            prop_assert_eq!(varint::length(&out[..len]), None);
            prop_assert_eq!(varint::peek(&out[..len]), None);
        }
    }

    #[test]
    fn decoders_never_panic_on_garbage(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
        let _ = ConnectFrame::decode(&bytes, &ProtocolLimits::default());
        let _ = MessagingFrame::decode(&bytes);
        let _ = ControlEnvelope::decode(&bytes);
        let _ = varint::length(&bytes);
    }

    #[test]
    fn control_envelope_roundtrip(
        sender in "[a-z0-9-]{1,64}",
        issued_at in any::<i64>(),
        ttl in any::<i64>(),
        nonce in any::<[u8; 16]>(),
        payload in proptest::collection::vec(any::<u8>(), 0..256),
    ) {
        let env = ControlEnvelope {
            version: 1,
            message_type: ControlMessageType::TokenValidation,
            sender_id: sender,
            issued_at_millis: issued_at,
            ttl_millis: ttl,
            nonce,
            payload,
        };
        let bytes = env.encode().unwrap();
        prop_assert_eq!(ControlEnvelope::decode(&bytes), Some(env));
    }
}
