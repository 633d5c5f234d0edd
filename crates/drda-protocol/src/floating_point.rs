//! Floating point wire formats: IEEE 754 big-endian and IBM System/390
//! hexadecimal floating point.
//!
//! A hexadecimal float is `sign | 7-bit excess-64 exponent | fraction`, with
//! value `0.fraction * 16^(exponent - 64)`. The short form has a 24-bit
//! fraction, the long form a 56-bit fraction.

use crate::error::ProtocolError;

/// FD:OCA type of IEEE floating point data.
pub const IEEE_754_FLOATING_POINT: u8 = 0x48;

/// FD:OCA type of hexadecimal floating point data.
pub const HEX_FLOATING_POINT: u8 = 0x40;

const HEX_EXPONENT_BIAS: i32 = 64;
const HEX_EXPONENT_MAX: i32 = 127;

/// Decode a big-endian IEEE single.
#[must_use]
pub fn f32_from_ieee(bytes: [u8; 4]) -> f32 {
    f32::from_be_bytes(bytes)
}

/// Decode a big-endian IEEE double.
#[must_use]
pub fn f64_from_ieee(bytes: [u8; 8]) -> f64 {
    f64::from_be_bytes(bytes)
}

/// Encode a big-endian IEEE single.
#[must_use]
pub fn f32_to_ieee(value: f32) -> [u8; 4] {
    value.to_be_bytes()
}

/// Encode a big-endian IEEE double.
#[must_use]
pub fn f64_to_ieee(value: f64) -> [u8; 8] {
    value.to_be_bytes()
}

/// Decode a short (4-byte) hexadecimal float.
///
/// Values outside the IEEE single range saturate to infinity or flush to
/// zero through the usual `f64 -> f32` conversion.
#[must_use]
pub fn f32_from_hex(bytes: [u8; 4]) -> f32 {
    let raw = u32::from_be_bytes(bytes);
    let fraction = raw & 0x00FF_FFFF;
    let negative = raw & 0x8000_0000 != 0;
    if fraction == 0 {
        return if negative { -0.0 } else { 0.0 };
    }
    let exponent = ((raw >> 24) & 0x7F) as i32 - HEX_EXPONENT_BIAS;
    let magnitude = f64::from(fraction) * 2f64.powi(4 * exponent - 24);
    let value = magnitude as f32;
    if negative { -value } else { value }
}

/// Decode a long (8-byte) hexadecimal float.
#[must_use]
pub fn f64_from_hex(bytes: [u8; 8]) -> f64 {
    let raw = u64::from_be_bytes(bytes);
    let fraction = raw & 0x00FF_FFFF_FFFF_FFFF;
    let negative = raw & 0x8000_0000_0000_0000 != 0;
    if fraction == 0 {
        return if negative { -0.0 } else { 0.0 };
    }
    let exponent = ((raw >> 56) & 0x7F) as i32 - HEX_EXPONENT_BIAS;
    // Every hex exponent is a normal f64 exponent, so only the 56 -> 53 bit
    // fraction conversion rounds.
    let magnitude = fraction as f64 * 2f64.powi(4 * exponent - 56);
    if negative { -magnitude } else { magnitude }
}

/// Split a finite non-zero magnitude into a biased hex exponent and a
/// normalized 56-bit fraction. Returns `None` on underflow.
fn hex_parts(value: f64) -> Result<Option<(u64, u64)>, ProtocolError> {
    let bits = value.to_bits();
    let biased = ((bits >> 52) & 0x7FF) as i32;
    if biased == 0 {
        // Subnormal doubles are far below the smallest hex magnitude.
        return Ok(None);
    }
    let mantissa = (bits & 0x000F_FFFF_FFFF_FFFF) | 0x0010_0000_0000_0000;
    let exp2 = biased - 1023;

    let hex_exponent = exp2.div_euclid(4) + 1;
    let shift = exp2 + 4 - 4 * hex_exponent;
    let fraction = mantissa << shift;
    let biased_hex = hex_exponent + HEX_EXPONENT_BIAS;

    if biased_hex > HEX_EXPONENT_MAX {
        return Err(ProtocolError::value_range(
            "FLOAT",
            format!("{value} exceeds the hexadecimal floating point range"),
        ));
    }
    if biased_hex < 0 {
        return Ok(None);
    }
    Ok(Some((biased_hex as u64, fraction)))
}

fn check_finite(value: f64) -> Result<(), ProtocolError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ProtocolError::value_range(
            "FLOAT",
            format!("{value} has no hexadecimal floating point form"),
        ))
    }
}

/// Encode a long (8-byte) hexadecimal float.
///
/// Every double within the hex range is represented exactly. Magnitudes
/// below the smallest hex value encode as zero.
pub fn f64_to_hex(value: f64) -> Result<[u8; 8], ProtocolError> {
    check_finite(value)?;
    let sign = if value.is_sign_negative() { 1u64 << 63 } else { 0 };
    if value == 0.0 {
        return Ok(sign.to_be_bytes());
    }
    let raw = match hex_parts(value.abs())? {
        Some((exponent, fraction)) => sign | (exponent << 56) | fraction,
        None => sign,
    };
    Ok(raw.to_be_bytes())
}

/// Encode a short (4-byte) hexadecimal float, rounding the fraction to 24
/// bits.
pub fn f32_to_hex(value: f32) -> Result<[u8; 4], ProtocolError> {
    let wide = f64::from(value);
    check_finite(wide)?;
    let sign = if value.is_sign_negative() { 1u32 << 31 } else { 0 };
    if wide == 0.0 {
        return Ok(sign.to_be_bytes());
    }
    let Some((mut exponent, fraction)) = hex_parts(wide.abs())? else {
        return Ok(sign.to_be_bytes());
    };

    let mut short = (fraction + (1 << 31)) >> 32;
    if short >= 1 << 24 {
        short >>= 4;
        exponent += 1;
        if exponent > HEX_EXPONENT_MAX as u64 {
            return Err(ProtocolError::value_range(
                "REAL",
                format!("{value} exceeds the hexadecimal floating point range"),
            ));
        }
    }
    let raw = sign | ((exponent as u32) << 24) | short as u32;
    Ok(raw.to_be_bytes())
}
