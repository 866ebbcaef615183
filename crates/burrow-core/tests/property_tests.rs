//! Property-based tests for the framing layer, the reorder window and the
//! outermost dispatch.

mod common;

use std::time::{Duration, Instant};

use proptest::prelude::*;

use common::make_pair;

// ============================================================================
// Handshake TLV properties
// ============================================================================

mod framing_properties {
    use super::*;
    use burrow_core::framing::{Handshake, HandshakeBuilder, RecordType};

    const RECORD_TYPES: [RecordType; 10] = [
        RecordType::ReplyCode,
        RecordType::ErrorDetail,
        RecordType::Flags,
        RecordType::Mode,
        RecordType::ProtocolName,
        RecordType::SenderKey,
        RecordType::RecipientKey,
        RecordType::SenderHandshakeKey,
        RecordType::RecipientHandshakeKey,
        RecordType::Tag,
    ];

    proptest! {
        /// Encode → parse is the identity on well-formed messages.
        #[test]
        fn tlv_roundtrip(
            handshake_type in 1u8..=3,
            present in prop::collection::vec(any::<bool>(), 10),
            values in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 10),
        ) {
            let mut builder = HandshakeBuilder::new(handshake_type);
            for (i, record_type) in RECORD_TYPES.iter().enumerate() {
                if present[i] {
                    builder.add(*record_type, &values[i]);
                }
            }
            let buffer = builder.finish();

            let parsed = Handshake::parse(buffer.as_slice()).expect("well-formed");
            prop_assert_eq!(parsed.handshake_type(), handshake_type);
            for (i, record_type) in RECORD_TYPES.iter().enumerate() {
                if present[i] {
                    prop_assert_eq!(parsed.field(*record_type), Some(&values[i][..]));
                } else {
                    prop_assert_eq!(parsed.field(*record_type), None);
                }
            }
        }

        /// Arbitrary bytes never panic the parser.
        #[test]
        fn tlv_parser_total(data in prop::collection::vec(any::<u8>(), 0..512)) {
            let _ = Handshake::parse(&data);
        }
    }
}

// ============================================================================
// Reorder window properties
// ============================================================================

mod reorder_properties {
    use super::*;
    use burrow_core::config::TimingConfig;
    use burrow_core::methods::common::CommonState;
    use burrow_core::methods::MethodEnv;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fresh_state() -> (CommonState, Instant) {
        let now = Instant::now();
        let timing = TimingConfig {
            key_valid: Duration::from_secs(3600),
            key_refresh: Duration::from_secs(3600),
            key_refresh_splay: Duration::from_secs(0),
            reorder_time: Duration::from_secs(10),
            reorder_count: 64,
        };
        let mut rng = StdRng::seed_from_u64(5);
        let mut env = MethodEnv {
            now,
            timing: &timing,
            rng: &mut rng,
        };
        (CommonState::new(&mut env, true), now)
    }

    proptest! {
        /// Whatever order nonces arrive in, none is ever accepted twice.
        #[test]
        fn at_most_once_per_nonce(raw in prop::collection::vec(1u64..2000, 1..200)) {
            let (mut state, now) = fresh_state();
            let mut accepted = std::collections::HashSet::new();

            for value in raw {
                // the initiator side receives even nonces
                let value = value * 2;
                let mut nonce = [0u8; 6];
                nonce.copy_from_slice(&value.to_le_bytes()[..6]);

                let outcome = state
                    .check_receive_nonce(now, &nonce)
                    .and_then(|age| state.note_receive(now, &nonce, age));
                if outcome.is_ok() {
                    prop_assert!(accepted.insert(value), "nonce {} accepted twice", value);
                }
            }
        }
    }
}

// ============================================================================
// Outermost dispatch properties
// ============================================================================

mod dispatch_properties {
    use super::*;

    proptest! {
        /// Random datagrams — malformed handshakes, garbage data packets,
        /// unassigned type codes — never panic and never reach the TUN
        /// layer unauthenticated.
        #[test]
        fn random_datagrams_are_harmless(
            datagrams in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..128), 1..50),
        ) {
            let now = Instant::now();
            let (mut a, mut b) = make_pair("salsa2012+poly1305", now);
            a.ctx.start_handshake(0);
            common::pump(&mut a, &mut b);
            let _ = b.delivered();

            for datagram in &datagrams {
                b.feed(a.addr, datagram);
            }
            prop_assert!(b.delivered().is_empty());
            prop_assert!(b.ctx.peer(0).is_established());
        }

        /// Established sessions survive random noise and still carry
        /// payload afterwards.
        #[test]
        fn noise_then_payload(noise in prop::collection::vec(any::<u8>(), 0..256)) {
            let now = Instant::now();
            let (mut a, mut b) = make_pair("salsa2012+poly1305", now);
            a.ctx.start_handshake(0);
            common::pump(&mut a, &mut b);
            let _ = b.delivered();

            b.feed(a.addr, &noise);
            let _ = b.outbound();

            let buffer = a.ctx.payload_buffer(b"still alive");
            a.ctx.send_data(0, buffer);
            common::pump(&mut a, &mut b);
            prop_assert_eq!(b.delivered(), vec![b"still alive".to_vec()]);
        }
    }

    #[test]
    fn empty_datagram_is_dropped() {
        let now = Instant::now();
        let (mut a, mut b) = make_pair("salsa2012+poly1305", now);
        b.feed(a.addr, &[]);
        assert!(b.delivered().is_empty());
        assert!(b.outbound().is_empty());
        let _ = a;
    }
}
