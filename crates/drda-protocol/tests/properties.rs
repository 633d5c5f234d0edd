//! Property tests for the numeric codecs and reply grammars.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use bytes::Bytes;
use drda_protocol::{
    ReplyParser, Severity, Typdef, codepoint,
    decimal::{PackedDecimal, decode_packed, decode_packed_i64, encode_packed, packed_length},
    floating_point::{f32_from_hex, f32_to_hex, f64_from_hex, f64_to_hex},
    reply::read_access_database,
};
use proptest::prelude::*;
use rust_decimal::Decimal;

fn object(code_point: u16, content: &[u8]) -> Vec<u8> {
    let mut out = ((content.len() + 4) as u16).to_be_bytes().to_vec();
    out.extend_from_slice(&code_point.to_be_bytes());
    out.extend_from_slice(content);
    out
}

fn reply_dss(payload: &[u8]) -> Bytes {
    let mut out = ((payload.len() + 6) as u16).to_be_bytes().to_vec();
    out.extend_from_slice(&[0xD0, 0x02, 0x00, 0x01]);
    out.extend_from_slice(payload);
    Bytes::from(out)
}

// =============================================================================
// Packed decimal
// =============================================================================

proptest! {
    #[test]
    fn prop_packed_decimal_preserves_value(
        mantissa in -999_999_999_999_999_999i64..=999_999_999_999_999_999,
        scale in 0u32..=12,
    ) {
        let value = Decimal::new(mantissa, scale);
        let packed = encode_packed(value, 31, scale).unwrap();
        prop_assert_eq!(packed.len(), packed_length(31));

        let sign = packed[packed.len() - 1] & 0x0F;
        prop_assert_eq!(sign, if mantissa < 0 { 0x0D } else { 0x0C });

        let decoded = decode_packed(&packed, 31, scale).unwrap();
        prop_assert_eq!(decoded.to_decimal().unwrap(), value);
        prop_assert_eq!(
            decode_packed_i64(&packed, 31, scale).unwrap(),
            mantissa / 10i64.pow(scale)
        );
    }

    #[test]
    fn prop_packed_decimal_rescales(
        mantissa in -9_999_999i64..=9_999_999,
        from_scale in 0u32..=4,
        to_scale in 0u32..=8,
    ) {
        let value = Decimal::new(mantissa, from_scale);
        let packed = encode_packed(value, 16, to_scale).unwrap();
        let decoded = decode_packed(&packed, 16, to_scale).unwrap().to_decimal().unwrap();
        if to_scale >= from_scale {
            prop_assert_eq!(decoded, value);
        } else {
            prop_assert_eq!(decoded, value.trunc_with_scale(to_scale));
        }
    }

    #[test]
    fn prop_packed_decimal_full_precision(
        magnitude in 0u128..10u128.pow(31),
        negative in any::<bool>(),
        scale in 0u32..=31,
    ) {
        let unscaled = magnitude as i128;
        let value = PackedDecimal::new(if negative { -unscaled } else { unscaled }, scale).unwrap();
        let packed = encode_packed(value, 31, scale).unwrap();
        prop_assert_eq!(packed.len(), 16);

        let decoded = decode_packed(&packed, 31, scale).unwrap();
        prop_assert_eq!(decoded.unscaled().unsigned_abs(), magnitude);
        prop_assert_eq!(decoded.is_negative(), negative && magnitude != 0);
    }

    #[test]
    fn prop_packed_decimal_overflow_rejected(whole in 100i64..1_000_000) {
        prop_assert!(encode_packed(Decimal::from(whole), 4, 2).is_err());
    }
}

// =============================================================================
// Hexadecimal floating point
// =============================================================================

proptest! {
    #[test]
    fn prop_hex_double_exact(value in -1.0e70f64..1.0e70) {
        prop_assume!(value == 0.0 || value.abs() > 1.0e-70);
        let bytes = f64_to_hex(value).unwrap();
        prop_assert_eq!(f64_from_hex(bytes), value);
    }

    #[test]
    fn prop_hex_double_is_normalized(value in 1.0e-60f64..1.0e60) {
        let bytes = f64_to_hex(value).unwrap();
        // A normalized fraction has a non-zero leading hex digit.
        prop_assert_ne!(bytes[1] >> 4, 0);
    }

    #[test]
    fn prop_hex_single_within_rounding(value in any::<f32>()) {
        prop_assume!(value.is_finite() && value.is_normal());
        let decoded = f32_from_hex(f32_to_hex(value).unwrap());
        let error = ((decoded - value) / value).abs();
        prop_assert!(error <= 1.0e-6, "{value} decoded as {decoded}");
    }
}

// =============================================================================
// Reply grammars
// =============================================================================

fn accrdbrm_members() -> Vec<Vec<u8>> {
    let typdefovr = [
        object(codepoint::CCSIDSBC, &1208u16.to_be_bytes()),
        object(codepoint::CCSIDDBC, &1200u16.to_be_bytes()),
        object(codepoint::CCSIDMBC, &1208u16.to_be_bytes()),
    ]
    .concat();
    vec![
        object(codepoint::SVRCOD, &[0x00, 0x04]),
        object(codepoint::PRDID, b"SQL11058"),
        object(codepoint::TYPDEFNAM, b"QTDSQLX86"),
        object(codepoint::TYPDEFOVR, &typdefovr),
        object(codepoint::CRRTKN, b"GA000001.C350\x00\x00\x00\x00\x00\x01"),
        object(codepoint::USRID, b"DB2INST1"),
        object(codepoint::SRVDGN, b"diag"),
    ]
}

proptest! {
    #[test]
    fn prop_accrdbrm_member_order_is_irrelevant(
        members in Just(accrdbrm_members()).prop_shuffle()
    ) {
        let payload = object(codepoint::ACCRDBRM, &members.concat());
        let mut typdef = Typdef::luw();
        let mut parser = ReplyParser::new(reply_dss(&payload), &typdef);
        let reply = read_access_database(&mut parser, &mut typdef).unwrap();

        prop_assert_eq!(reply.access.svrcod, Severity::Warning);
        prop_assert_eq!(reply.access.prdid.as_str(), "SQL11058");
        prop_assert_eq!(reply.access.user_id.as_deref(), Some("DB2INST1"));
        prop_assert_eq!(reply.access.overrides.dbc, Some(1200));
        prop_assert_eq!(typdef.name(), Some("QTDSQLX86"));
    }

    #[test]
    fn prop_duplicate_member_rejected(index in 0usize..7) {
        let mut members = accrdbrm_members();
        members.push(members[index].clone());
        let payload = object(codepoint::ACCRDBRM, &members.concat());
        let mut typdef = Typdef::luw();
        let mut parser = ReplyParser::new(reply_dss(&payload), &typdef);
        prop_assert!(read_access_database(&mut parser, &mut typdef).is_err());
    }
}
