#![no_main]

use drda_protocol::decimal::{decode_packed, encode_packed};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let precision = u32::from(data[0] % 32) + 1;
    let scale = u32::from(data[1]) % (precision + 1);
    let digits = &data[2..];

    // Anything that decodes must encode back to the same bytes
    if let Ok(value) = decode_packed(digits, precision, scale) {
        if digits.len() == (precision as usize) / 2 + 1 {
            if let Ok(encoded) = encode_packed(value, precision, scale) {
                assert_eq!(decode_packed(&encoded, precision, scale).ok(), Some(value));
            }
        }
    }
});
