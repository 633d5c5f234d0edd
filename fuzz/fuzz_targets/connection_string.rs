#![no_main]

use db2_client::Config;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = Config::from_connection_string(s);
        let _ = Config::from_uri(s);
    }
});
