#![no_main]

use bytes::Bytes;
use drda_protocol::sqlca::read_sqlca;
use drda_protocol::{ByteOrder, Ccsid, FdocaReader};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }
    // First byte selects the data representation
    let (ccsid, order) = match data[0] & 0x03 {
        0 => (Ccsid::Ebcdic500, ByteOrder::BigEndian),
        1 => (Ccsid::Utf8, ByteOrder::BigEndian),
        _ => (Ccsid::Utf8, ByteOrder::LittleEndian),
    };
    let mut reader = FdocaReader::new(Bytes::copy_from_slice(&data[1..]), ccsid, order);
    if let Ok(Some(sqlca)) = read_sqlca(&mut reader) {
        let _ = sqlca.messages();
        let _ = sqlca.message_tokens();
        let _ = sqlca.update_count();
    }
});
