//! Property-based tests for addressing and the envelope codec
//!
//! Uses proptest to verify invariants of address derivation, sealing and the
//! request/response records.

use proptest::prelude::*;
use wns_core::identity::DEFAULT_SEGMENT_LEN;
use wns_core::{
    derive_address, derive_address_with, encode_public_key, Address, Envelope, EnvelopeCodec,
    Identity, Request, SealedBoxCodec,
};

// ============================================================================
// Strategy Generators
// ============================================================================

/// Arbitrary lowercase hex strings, including shorter than the segment
fn key_hex_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[0-9a-f]{0,132}").expect("valid regex")
}

fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..2048)
}

/// Printable field values for requests
fn field_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[ -~]{0,64}").expect("valid regex")
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    /// The tag keeps exactly the first `min(len, segment)` characters
    #[test]
    fn address_truncates_key_hex(key_hex in key_hex_strategy(), segment_len in 1usize..80) {
        let address = Address::from_key_hex(&key_hex, segment_len);
        let kept = &key_hex[..key_hex.len().min(segment_len)];

        prop_assert_eq!(address.as_str(), format!("/wns/1/{}/proto", kept));
        prop_assert_eq!(address.segment(), Some(kept));
    }

    /// Deriving twice from the same string gives the same address
    #[test]
    fn address_is_deterministic(key_hex in key_hex_strategy()) {
        prop_assert_eq!(
            Address::from_key_hex(&key_hex, DEFAULT_SEGMENT_LEN),
            Address::from_key_hex(&key_hex, DEFAULT_SEGMENT_LEN)
        );
    }

    /// Keys sharing the first 16 hex characters collide on the tag
    #[test]
    fn address_ignores_suffix(prefix in "[0-9a-f]{16}", a in "[0-9a-f]{48}", b in "[0-9a-f]{48}") {
        prop_assert_eq!(
            Address::from_key_hex(&format!("{}{}", prefix, a), DEFAULT_SEGMENT_LEN),
            Address::from_key_hex(&format!("{}{}", prefix, b), DEFAULT_SEGMENT_LEN)
        );
    }

    /// Request records survive encoding unchanged
    #[test]
    fn request_json_roundtrip(
        id in field_strategy(),
        service in field_strategy(),
        input in field_strategy(),
    ) {
        let request = Request::new(id, "ab".repeat(32), service, input);
        let decoded = Request::decode(&request.encode().unwrap()).unwrap();
        prop_assert_eq!(decoded, request);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Only the intended recipient recovers the plaintext
    #[test]
    fn sealed_payload_opens_only_for_recipient(payload in payload_strategy()) {
        let codec = SealedBoxCodec::new();
        let recipient = Identity::generate().unwrap();
        let stranger = Identity::generate().unwrap();

        let envelope = Envelope::seal(&codec, &payload, recipient.public_key(), DEFAULT_SEGMENT_LEN)
            .unwrap();
        let decoded = Envelope::from_bytes(&envelope.to_bytes().unwrap()).unwrap();

        prop_assert!(decoded.is_tagged_for(&derive_address(recipient.public_key())));
        prop_assert_eq!(decoded.open(&codec, &recipient).unwrap(), payload);
        prop_assert!(codec.decrypt(&decoded.payload, &stranger).is_err());
    }

    /// The derived address agrees with truncating the encoded key
    #[test]
    fn derived_address_matches_encoded_key(segment_len in 1usize..64) {
        let identity = Identity::generate().unwrap();
        let key_hex = encode_public_key(identity.public_key());

        prop_assert_eq!(
            derive_address_with(identity.public_key(), segment_len),
            Address::from_key_hex(&key_hex, segment_len)
        );
    }
}
