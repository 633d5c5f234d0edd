//! Packed decimal (FD:OCA type 0x30) encoding.
//!
//! A packed decimal of precision `p` occupies `p / 2 + 1` bytes: one decimal
//! digit per nibble, most significant first, followed by a sign nibble
//! (`0xC` positive, `0xD` negative). Even precisions carry one leading pad
//! nibble.
//!
//! DB2 allows up to 31 digits with a scale up to the precision, which is more
//! than [`rust_decimal::Decimal`] holds (28 digits of scale, a 96-bit
//! mantissa). Values are therefore carried as a [`PackedDecimal`] and
//! converted to `Decimal` when they fit.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;

use crate::constants::MAX_DECIMAL_PRECISION;
use crate::error::ProtocolError;

const SIGN_POSITIVE: u8 = 0x0C;
const SIGN_NEGATIVE: u8 = 0x0D;
const SIGN_NEGATIVE_ALT: u8 = 0x0B;

/// A decimal of at most 31 significant digits: an unscaled integer and the
/// number of digits after the decimal point.
///
/// Equality is structural, so `1.50` and `1.5` differ. Compare through
/// [`PackedDecimal::rescale`] when the scale may vary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PackedDecimal {
    unscaled: i128,
    scale: u32,
}

impl PackedDecimal {
    /// Create a decimal from its unscaled value and scale.
    pub fn new(unscaled: i128, scale: u32) -> Result<Self, ProtocolError> {
        let digits = digit_count(unscaled.unsigned_abs());
        if digits > MAX_DECIMAL_PRECISION {
            return Err(ProtocolError::value_range(
                "DECIMAL",
                format!("{unscaled} has more than {MAX_DECIMAL_PRECISION} digits"),
            ));
        }
        if scale > MAX_DECIMAL_PRECISION {
            return Err(ProtocolError::value_range(
                "DECIMAL",
                format!("scale {scale} exceeds {MAX_DECIMAL_PRECISION}"),
            ));
        }
        Ok(Self { unscaled, scale })
    }

    /// The value without its decimal point.
    #[must_use]
    pub const fn unscaled(&self) -> i128 {
        self.unscaled
    }

    /// Digits after the decimal point.
    #[must_use]
    pub const fn scale(&self) -> u32 {
        self.scale
    }

    /// Whether the value is below zero.
    #[must_use]
    pub const fn is_negative(&self) -> bool {
        self.unscaled < 0
    }

    /// Significant digits of the unscaled value, at least 1.
    #[must_use]
    pub fn digits(&self) -> u32 {
        digit_count(self.unscaled.unsigned_abs())
    }

    /// The same value at another scale. Extra fraction digits are
    /// truncated; fails if the result would need more than 31 digits.
    pub fn rescale(&self, scale: u32) -> Result<Self, ProtocolError> {
        let magnitude = rescale_magnitude(self.unscaled.unsigned_abs(), self.scale, scale)
            .ok_or_else(|| {
                ProtocolError::value_range("DECIMAL", format!("{self} does not fit scale {scale}"))
            })?;
        let unscaled = i128::try_from(magnitude)
            .map_err(|_| ProtocolError::value_range("DECIMAL", "value exceeds 128 bits"))?;
        Self::new(if self.is_negative() { -unscaled } else { unscaled }, scale)
    }

    /// Convert to a [`Decimal`], failing when the scale exceeds 28 or the
    /// value needs more than 96 bits.
    pub fn to_decimal(&self) -> Result<Decimal, ProtocolError> {
        Decimal::try_from_i128_with_scale(self.unscaled, self.scale).map_err(|e| {
            ProtocolError::value_range("DECIMAL", format!("{self} does not fit a Decimal: {e}"))
        })
    }
}

impl From<Decimal> for PackedDecimal {
    fn from(value: Decimal) -> Self {
        // A Decimal has at most 29 digits and a scale of at most 28.
        Self {
            unscaled: value.mantissa(),
            scale: value.scale(),
        }
    }
}

impl TryFrom<PackedDecimal> for Decimal {
    type Error = ProtocolError;

    fn try_from(value: PackedDecimal) -> Result<Self, Self::Error> {
        value.to_decimal()
    }
}

impl fmt::Display for PackedDecimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.unscaled.unsigned_abs().to_string();
        let sign = if self.is_negative() { "-" } else { "" };
        let scale = self.scale as usize;
        if scale == 0 {
            return write!(f, "{sign}{digits}");
        }
        let padded = format!("{digits:0>width$}", width = scale + 1);
        let (whole, fraction) = padded.split_at(padded.len() - scale);
        write!(f, "{sign}{whole}.{fraction}")
    }
}

impl FromStr for PackedDecimal {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ProtocolError::value_range("DECIMAL", format!("invalid decimal '{s}'"));
        let (negative, body) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            _ => (false, s),
        };
        let (whole, fraction) = body.split_once('.').unwrap_or((body, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }

        let mut magnitude = 0u128;
        for c in whole.chars().chain(fraction.chars()) {
            let digit = c.to_digit(10).ok_or_else(invalid)?;
            magnitude = magnitude
                .checked_mul(10)
                .and_then(|m| m.checked_add(u128::from(digit)))
                .ok_or_else(invalid)?;
        }
        let unscaled = i128::try_from(magnitude).map_err(|_| invalid())?;
        let scale = u32::try_from(fraction.len()).map_err(|_| invalid())?;
        Self::new(if negative { -unscaled } else { unscaled }, scale)
    }
}

/// Byte length of a packed decimal with the given precision.
#[must_use]
pub const fn packed_length(precision: u32) -> usize {
    precision as usize / 2 + 1
}

fn check_precision(precision: u32, scale: u32) -> Result<(), ProtocolError> {
    if precision == 0 || precision > MAX_DECIMAL_PRECISION {
        return Err(ProtocolError::value_range(
            "DECIMAL",
            format!("precision {precision} outside 1..={MAX_DECIMAL_PRECISION}"),
        ));
    }
    if scale > precision {
        return Err(ProtocolError::value_range(
            "DECIMAL",
            format!("scale {scale} exceeds precision {precision}"),
        ));
    }
    Ok(())
}

fn digit_count(mut value: u128) -> u32 {
    let mut count = 1;
    while value >= 10 {
        value /= 10;
        count += 1;
    }
    count
}

fn rescale_magnitude(magnitude: u128, from: u32, to: u32) -> Option<u128> {
    if from >= to {
        Some(magnitude / 10u128.checked_pow(from - to)?)
    } else {
        magnitude.checked_mul(10u128.checked_pow(to - from)?)
    }
}

/// Encode `value` as a packed decimal of the declared precision and scale.
///
/// Accepts a [`PackedDecimal`] or a [`Decimal`]. Fraction digits beyond
/// `scale` are truncated; missing fraction digits are zero filled. Fails if
/// the integer part does not fit `precision - scale` digits.
pub fn encode_packed(
    value: impl Into<PackedDecimal>,
    precision: u32,
    scale: u32,
) -> Result<Vec<u8>, ProtocolError> {
    check_precision(precision, scale)?;
    let value = value.into();

    let magnitude = value.unscaled.unsigned_abs();
    let digits = digit_count(magnitude);
    let whole_digits = i64::from(digits) - i64::from(value.scale);
    if magnitude != 0 && whole_digits > i64::from(precision - scale) {
        return Err(ProtocolError::value_range(
            "DECIMAL",
            format!("{value} overflows DECIMAL({precision}, {scale})"),
        ));
    }

    // The integer part fits, so at most `precision` digits remain.
    let mut unscaled = rescale_magnitude(magnitude, value.scale, scale).ok_or_else(|| {
        ProtocolError::value_range("DECIMAL", format!("{value} overflows DECIMAL({precision}, {scale})"))
    })?;

    let length = packed_length(precision);
    let mut out = vec![0u8; length];
    let negative = value.is_negative();
    out[length - 1] = if negative { SIGN_NEGATIVE } else { SIGN_POSITIVE };

    // Fill digit nibbles right to left, starting just before the sign.
    let mut nibble = length * 2 - 1;
    while unscaled > 0 && nibble > 0 {
        nibble -= 1;
        let digit = (unscaled % 10) as u8;
        unscaled /= 10;
        if nibble % 2 == 0 {
            out[nibble / 2] |= digit << 4;
        } else {
            out[nibble / 2] |= digit;
        }
    }

    Ok(out)
}

fn digits_to_u128(bytes: &[u8], nibbles: usize) -> Result<u128, ProtocolError> {
    let mut value = 0u128;
    for i in 0..nibbles {
        let byte = bytes[i / 2];
        let digit = if i % 2 == 0 { byte >> 4 } else { byte & 0x0F };
        if digit > 9 {
            return Err(ProtocolError::value_range(
                "DECIMAL",
                format!("invalid packed digit {digit:#03X} at nibble {i}"),
            ));
        }
        value = value * 10 + u128::from(digit);
    }
    Ok(value)
}

fn packed_parts(bytes: &[u8], precision: u32) -> Result<(u128, bool), ProtocolError> {
    let length = packed_length(precision);
    if bytes.len() < length {
        return Err(ProtocolError::NeedMoreData {
            needed: length,
            available: bytes.len(),
        });
    }
    let sign = bytes[length - 1] & 0x0F;
    let negative = sign == SIGN_NEGATIVE || sign == SIGN_NEGATIVE_ALT;
    let magnitude = digits_to_u128(&bytes[..length], length * 2 - 1)?;
    Ok((magnitude, negative))
}

/// Decode a packed decimal of the given precision and scale.
///
/// The result carries exactly `scale` fraction digits. A negative zero
/// decodes as zero.
pub fn decode_packed(
    bytes: &[u8],
    precision: u32,
    scale: u32,
) -> Result<PackedDecimal, ProtocolError> {
    check_precision(precision, scale)?;
    let (magnitude, negative) = packed_parts(bytes, precision)?;

    // 32 nibbles of at most 9 stay far below i128::MAX.
    let unscaled = i128::try_from(magnitude)
        .map_err(|_| ProtocolError::value_range("DECIMAL", "packed value exceeds 128 bits"))?;
    PackedDecimal::new(if negative { -unscaled } else { unscaled }, scale)
}

/// Decode only the integer part of a packed decimal, truncating the
/// fraction.
pub fn decode_packed_i64(bytes: &[u8], precision: u32, scale: u32) -> Result<i64, ProtocolError> {
    check_precision(precision, scale)?;
    let (magnitude, negative) = packed_parts(bytes, precision)?;
    let whole = magnitude / 10u128.pow(scale);
    let whole = i64::try_from(whole).map_err(|_| {
        ProtocolError::value_range("DECIMAL", "integer part does not fit in 64 bits")
    })?;
    Ok(if negative { -whole } else { whole })
}

/// Number of significant digits in a decimal's unscaled value.
pub fn precision_of(value: impl Into<PackedDecimal>) -> Result<u32, ProtocolError> {
    let value = value.into();
    let digits = value.digits();
    if digits > MAX_DECIMAL_PRECISION {
        return Err(ProtocolError::value_range(
            "DECIMAL",
            format!("{value} has more than {MAX_DECIMAL_PRECISION} digits"),
        ));
    }
    Ok(digits)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn packed(s: &str) -> PackedDecimal {
        PackedDecimal::from_str(s).unwrap()
    }

    #[test]
    fn test_encode_known_layout() {
        assert_eq!(
            encode_packed(dec("123.45"), 5, 2).unwrap(),
            vec![0x12, 0x34, 0x5C]
        );
        assert_eq!(
            encode_packed(dec("-123.45"), 5, 2).unwrap(),
            vec![0x12, 0x34, 0x5D]
        );
        // Even precision carries a leading pad nibble.
        assert_eq!(
            encode_packed(dec("1234"), 4, 0).unwrap(),
            vec![0x01, 0x23, 0x4C]
        );
    }

    #[test]
    fn test_encode_scale_adjustment() {
        assert_eq!(encode_packed(dec("1.5"), 5, 3).unwrap(), vec![0x01, 0x50, 0x0C]);
        // Excess fraction digits are truncated.
        assert_eq!(encode_packed(dec("1.2399"), 3, 2).unwrap(), vec![0x12, 0x3C]);
    }

    #[test]
    fn test_encode_overflow() {
        assert!(encode_packed(dec("1234.5"), 5, 2).is_err());
        assert!(encode_packed(dec("1"), 32, 0).is_err());
        assert!(encode_packed(dec("1"), 2, 3).is_err());
    }

    #[test]
    fn test_zero_is_positive() {
        assert_eq!(encode_packed(dec("-0.00"), 3, 2).unwrap(), vec![0x00, 0x0C]);
        assert_eq!(decode_packed(&[0x00, 0x0C], 3, 2).unwrap(), packed("0.00"));
        assert_eq!(decode_packed(&[0x00, 0x0D], 3, 2).unwrap(), packed("0.00"));
    }

    #[test]
    fn test_decode() {
        let value = decode_packed(&[0x12, 0x34, 0x5D], 5, 2).unwrap();
        assert_eq!(value.to_decimal().unwrap(), dec("-123.45"));
        assert_eq!(decode_packed(&[0x01, 0x23, 0x4C], 4, 0).unwrap(), packed("1234"));
    }

    #[test]
    fn test_thirty_one_nines() {
        let mut bytes = vec![0x99; 15];
        bytes.push(0x9C);
        let value = decode_packed(&bytes, 31, 0).unwrap();
        assert_eq!(value.to_string(), "9".repeat(31));
        assert_eq!(value.digits(), 31);
        assert_eq!(encode_packed(value, 31, 0).unwrap(), bytes);

        bytes[15] = 0x9D;
        let negative = decode_packed(&bytes, 31, 0).unwrap();
        assert_eq!(negative.to_string(), format!("-{}", "9".repeat(31)));
        assert_eq!(encode_packed(negative, 31, 0).unwrap(), bytes);

        // Past what a Decimal can hold.
        assert!(value.to_decimal().is_err());
    }

    #[test]
    fn test_scale_beyond_decimal_limit() {
        let mut bytes = vec![0x00; 15];
        bytes.push(0x1C);
        let value = decode_packed(&bytes, 31, 30).unwrap();
        assert_eq!(value.scale(), 30);
        assert_eq!(value.to_string(), format!("0.{}1", "0".repeat(29)));
        assert_eq!(encode_packed(value, 31, 30).unwrap(), bytes);

        let full = packed(&format!("9.{}", "9".repeat(30)));
        let encoded = encode_packed(full, 31, 30).unwrap();
        assert_eq!(decode_packed(&encoded, 31, 30).unwrap(), full);
        assert!(encode_packed(packed("10.5"), 31, 30).is_err());
    }

    #[test]
    fn test_decode_rejects_bad_digit() {
        assert!(decode_packed(&[0x1A, 0x0C], 3, 0).is_err());
    }

    #[test]
    fn test_decode_short_buffer() {
        let err = decode_packed(&[0x12], 5, 0).unwrap_err();
        assert!(err.is_incomplete());
    }

    #[test]
    fn test_decode_integer_part() {
        assert_eq!(decode_packed_i64(&[0x12, 0x34, 0x5D], 5, 2).unwrap(), -123);
        let max = encode_packed(packed(&"9".repeat(31)), 31, 0).unwrap();
        assert!(decode_packed_i64(&max, 31, 0).is_err());
    }

    #[test]
    fn test_precision_of() {
        assert_eq!(precision_of(dec("0")).unwrap(), 1);
        assert_eq!(precision_of(dec("-12.340")).unwrap(), 5);
        assert_eq!(precision_of(packed(&"1".repeat(31))).unwrap(), 31);
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(packed("-0.05").to_string(), "-0.05");
        assert_eq!(packed("+12").to_string(), "12");
        assert_eq!(packed(".5").scale(), 1);
        assert!(PackedDecimal::from_str("1".repeat(32).as_str()).is_err());
        assert!(PackedDecimal::from_str("1.2.3").is_err());
        assert!(PackedDecimal::from_str("-").is_err());
    }

    #[test]
    fn test_rescale() {
        assert_eq!(packed("1.239").rescale(1).unwrap(), packed("1.2"));
        assert_eq!(packed("-1.2").rescale(3).unwrap(), packed("-1.200"));
        assert!(packed(&"9".repeat(31)).rescale(1).is_err());
    }
}
