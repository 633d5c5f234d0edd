#![no_main]

use bytes::Bytes;
use drda_protocol::reply::{
    read_access_database, read_access_security, read_end_unit_of_work,
    read_exchange_server_attributes, read_security_check,
};
use drda_protocol::{ReplyParser, SecurityMechanism, Typdef};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let bytes = Bytes::copy_from_slice(data);

    for base in [Typdef::default(), Typdef::luw()] {
        let mut parser = ReplyParser::new(bytes.clone(), &base);
        let _ = read_exchange_server_attributes(&mut parser);

        let mut parser = ReplyParser::new(bytes.clone(), &base);
        let _ = read_access_security(&mut parser, SecurityMechanism::UserIdPassword);

        let mut parser = ReplyParser::new(bytes.clone(), &base);
        let _ = read_security_check(&mut parser);

        let mut typdef = base.clone();
        let mut parser = ReplyParser::new(bytes.clone(), &typdef);
        let _ = read_access_database(&mut parser, &mut typdef);

        let mut typdef = base.clone();
        let mut parser = ReplyParser::new(bytes.clone(), &typdef);
        let _ = read_end_unit_of_work(&mut parser, &mut typdef);
    }
});
