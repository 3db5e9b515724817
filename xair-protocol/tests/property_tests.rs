//! Property-based tests for paths, rates and the fader codec.

use proptest::prelude::*;

use xair_protocol::codec::{approx_db, db_to_normalized, decode_fader};
use xair_protocol::{Decoded, ParameterPath, Rate};

// ============================================================================
// Strategies
// ============================================================================

/// Every valid path string in the vocabulary
fn valid_path_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        (1u8..=18, prop_oneof![Just("fader"), Just("on")])
            .prop_map(|(ch, leaf)| format!("/ch/{ch:02}/mix/{leaf}")),
        prop_oneof![Just("/lr/mix/fader".to_string()), Just("/lr/mix/on".to_string())],
    ]
}

/// Channel numbers that must be rejected
fn out_of_range_channel_strategy() -> impl Strategy<Value = u8> {
    prop_oneof![Just(0u8), 19u8..=99]
}

// ============================================================================
// Paths
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Formatting a parsed path reproduces the input exactly.
    #[test]
    fn prop_format_parse_round_trip(raw in valid_path_strategy()) {
        let path = ParameterPath::parse(&raw).unwrap();
        prop_assert_eq!(path.format(), raw);
        prop_assert_eq!(ParameterPath::parse(&path.format()).unwrap(), path);
    }

    /// Out-of-range channels never parse.
    #[test]
    fn prop_out_of_range_channel_rejected(channel in out_of_range_channel_strategy()) {
        let raw = format!("/ch/{channel:02}/mix/fader");
        prop_assert!(ParameterPath::parse(&raw).is_err());
    }

    /// Arbitrary strings either fail or are already canonical.
    #[test]
    fn prop_parse_accepts_only_canonical(raw in "/[a-z0-9/]{0,20}") {
        if let Ok(path) = ParameterPath::parse(&raw) {
            prop_assert_eq!(path.to_string(), raw);
        }
    }
}

// ============================================================================
// Codec
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// The dB curve never decreases as the fader moves up.
    #[test]
    fn prop_approx_db_monotonic(a in 0.0f32..=1.0, b in 0.0f32..=1.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(approx_db(lo) <= approx_db(hi));
    }

    /// Converting to dB and back lands on the same fader position.
    #[test]
    fn prop_db_inverse(position in 0.001f32..=1.0) {
        let back = db_to_normalized(approx_db(position));
        prop_assert!((back - position).abs() < 1e-4, "{} -> {}", position, back);
    }

    /// Decoded fader values always lie inside [0, 1].
    #[test]
    fn prop_decode_fader_in_range(wire in -10.0f32..10.0) {
        let decoded = decode_fader(wire);
        let value = decoded.value().and_then(|v| v.as_normalized()).unwrap();
        prop_assert!((0.0..=1.0).contains(&value));
        prop_assert_eq!(matches!(decoded, Decoded::Clamped(..)), !(0.0..=1.0).contains(&wire));
    }

    /// Quantized rates are within a quarter hertz of the request.
    #[test]
    fn prop_rate_quantization(hz in 0.5f64..20.0) {
        let rate = Rate::from_hz(hz).unwrap();
        prop_assert!((rate.as_hz() - hz).abs() <= 0.25 + f64::EPSILON);
    }
}
