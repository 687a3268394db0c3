// crates/status-registry-core/tests/codec_proptest.rs
// ============================================================================
// Module: Codec Property-Based Tests
// Description: Round-trip and capacity properties of the bitstring codec.
// Purpose: Detect lossy encodings across random bit arrays.
// ============================================================================

//! Property-based tests for bitstring codec invariants.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use proptest::prelude::*;
use status_registry_core::CapacitySource;
use status_registry_core::Encoding;
use status_registry_core::StatusBitstring;
use status_registry_core::codec;
use status_registry_core::runtime::rebuild_allocation;

/// Strategy over both text encodings.
fn encoding_strategy() -> impl Strategy<Value = Encoding> {
    prop_oneof![Just(Encoding::Base64Url), Just(Encoding::Hex)]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    #[test]
    fn decode_exact_inverts_encode(
        values in prop::collection::vec(any::<bool>(), 0 .. 2048),
        encoding in encoding_strategy(),
    ) {
        let bits = StatusBitstring::from_bools(&values);
        let blob = codec::encode(&bits, encoding).unwrap();
        let decoded = codec::decode_exact(&blob, values.len() as u64).unwrap();
        prop_assert_eq!(decoded, bits);
    }

    #[test]
    fn byte_aligned_decode_inverts_encode(
        bytes in prop::collection::vec(any::<u8>(), 0 .. 256),
        encoding in encoding_strategy(),
    ) {
        let bits = StatusBitstring::from_bytes(bytes.clone());
        let blob = codec::encode(&bits, encoding).unwrap();
        let decoded = codec::decode(&blob).unwrap();
        prop_assert_eq!(decoded.to_bytes(), bytes);
    }

    #[test]
    fn size_of_reports_padded_length(
        len in 1_usize .. 4096,
    ) {
        let blob = codec::encode(&StatusBitstring::zeroed(len), Encoding::Base64Url).unwrap();
        let estimate = codec::size_of(&blob, None);
        prop_assert_eq!(estimate.source, CapacitySource::Decompressed);
        prop_assert_eq!(estimate.bits, (len as u64).div_ceil(8) * 8);
    }
}

proptest! {
    #[test]
    fn rebuild_allocation_is_idempotent_and_disjoint(
        indexes in prop::collection::vec(0_u64 .. 512, 0 .. 64),
    ) {
        let (cursor, additional) = rebuild_allocation(&indexes);
        prop_assert!(additional.iter().all(|index| *index > cursor));
        prop_assert!(indexes.iter().all(|index| *index < cursor || additional.contains(index)));
        let replay: Vec<u64> = indexes.iter().rev().copied().collect();
        prop_assert_eq!(rebuild_allocation(&replay), (cursor, additional));
    }
}
