//! Example relay cell bodies, decoded and re-encoded in full.

use torlink_cell::cell::{msg::DestroyReason, CELL_DATA_LEN};
use torlink_cell::relaycell::{msg, RelayCell};

fn unhex(s: &str) -> Vec<u8> {
    hex::decode(s.replace(' ', "")).unwrap()
}

/// Assert that `hexbody`, zero-padded out to a full 509-byte body,
/// decodes into a cell that looks like `expected`, and that both
/// encode back to the padded bytes.
fn rcell(hexbody: &str, expected: RelayCell) {
    let mut bytes = unhex(hexbody);
    assert!(bytes.len() <= CELL_DATA_LEN);
    bytes.resize(CELL_DATA_LEN, 0);
    let mut body = [0_u8; CELL_DATA_LEN];
    body.copy_from_slice(&bytes[..]);

    let decoded = RelayCell::decode(body).unwrap();
    assert_eq!(decoded.stream_id(), expected.stream_id());
    assert_eq!(format!("{:?}", decoded), format!("{:?}", expected));

    assert_eq!(&decoded.encode().unwrap()[..], &bytes[..]);
    assert_eq!(&expected.encode().unwrap()[..], &bytes[..]);
}

#[test]
fn test_begin() {
    rcell(
        "01 0000 0009 00000000 0018 7777772e6578616d706c652e636f6d 3a 343433 00 00000000",
        RelayCell::new(9.into(), msg::Begin::new("www.example.com", 443, 0).unwrap()),
    );
}

#[test]
fn test_data() {
    rcell(
        "02 0000 0203 00000000 0002 6869",
        RelayCell::new(0x0203.into(), msg::Data::new(b"hi").unwrap()),
    );
}

#[test]
fn test_end() {
    rcell(
        "03 0000 0009 00000000 0001 06",
        RelayCell::new(9.into(), msg::End::new(msg::EndReason::Done)),
    );
}

#[test]
fn test_connected() {
    rcell(
        "04 0000 0009 00000000 0000",
        RelayCell::new(9.into(), msg::Connected::new_empty()),
    );
    rcell(
        "04 0000 0009 00000000 0008 c0000207 00000258",
        RelayCell::new(
            9.into(),
            msg::Connected::new_with_addr("192.0.2.7".parse().unwrap(), 600),
        ),
    );
}

#[test]
fn test_sendme() {
    // Stream-level, version 0.
    rcell(
        "05 0000 0005 00000000 0001 00",
        RelayCell::new(5.into(), msg::Sendme::new_empty()),
    );
    // Circuit-level, version 1 with a digest.
    rcell(
        "05 0000 0000 00000000 0017 01 0014 aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
        RelayCell::new(0.into(), msg::Sendme::new_tag([0xaa; 20])),
    );
}

#[test]
fn test_truncated() {
    rcell(
        "09 0000 0000 00000000 0001 03",
        RelayCell::new(0.into(), msg::Truncated::new(DestroyReason::Requested)),
    );
}

#[test]
fn test_drop() {
    rcell(
        "0a 0000 0000 00000000 0000",
        RelayCell::new(0.into(), msg::RelayMsg::Drop),
    );
}

#[test]
fn test_extend2() {
    rcell(
        "0e 0000 0000 00000000 0028 \
         02 \
         00 06 0a000002 2329 \
         02 14 0505050505050505050505050505050505050505 \
         0002 0005 6e746f7221",
        RelayCell::new(
            0.into(),
            msg::Extend2::new(
                vec![
                    msg::LinkSpec::OrPort("10.0.0.2".parse().unwrap(), 9001),
                    msg::LinkSpec::RsaId([5; 20]),
                ],
                0x0002,
                &b"ntor!"[..],
            ),
        ),
    );
}

#[test]
fn test_extended2() {
    rcell(
        "0f 0000 0000 00000000 0007 0005 6e746f7221",
        RelayCell::new(0.into(), msg::Extended2::new(&b"ntor!"[..])),
    );
}
