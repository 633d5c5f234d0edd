#![no_main]

use drda_protocol::{DssHeader, scan_chain};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Chain scanning must never read past the input
    if let Ok(Some(end)) = scan_chain(data) {
        assert!(end <= data.len());
    }

    let mut cursor = data;
    let _ = DssHeader::decode(&mut cursor);
});
