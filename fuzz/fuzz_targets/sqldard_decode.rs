#![no_main]

use bytes::Bytes;
use drda_protocol::sqlda::read_sqldard;
use drda_protocol::{ByteOrder, Ccsid, FdocaReader, ServerPlatform};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }
    let (platform, order) = if data[0] & 0x01 == 0 {
        (ServerPlatform::Luw, ByteOrder::LittleEndian)
    } else {
        (ServerPlatform::Zos, ByteOrder::BigEndian)
    };
    let mut reader = FdocaReader::new(Bytes::copy_from_slice(&data[1..]), Ccsid::Utf8, order);
    if let Ok(descriptor) = read_sqldard(&mut reader, platform) {
        for column in &descriptor.columns {
            let _ = column.sql_type();
            let _ = column.to_string();
        }
    }
});
