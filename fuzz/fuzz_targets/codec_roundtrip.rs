#![no_main]

use std::io::Cursor;

use arbitrary::Arbitrary;
use eio_transport::packet::{self, CodeType, Packet, PacketKind};
use eio_transport::payload::{self, PayloadForm};
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct FuzzPacket {
    kind: FuzzKind,
    binary: bool,
    data: Vec<u8>,
}

#[derive(Arbitrary, Debug)]
enum FuzzKind {
    Open,
    Close,
    Ping,
    Pong,
    Message,
    Upgrade,
    Noop,
}

impl From<FuzzKind> for PacketKind {
    fn from(k: FuzzKind) -> Self {
        match k {
            FuzzKind::Open => PacketKind::Open,
            FuzzKind::Close => PacketKind::Close,
            FuzzKind::Ping => PacketKind::Ping,
            FuzzKind::Pong => PacketKind::Pong,
            FuzzKind::Message => PacketKind::Message,
            FuzzKind::Upgrade => PacketKind::Upgrade,
            FuzzKind::Noop => PacketKind::Noop,
        }
    }
}

#[derive(Arbitrary, Debug)]
struct Input {
    packets: Vec<FuzzPacket>,
    form_is_text: bool,
    raw_bytes: Vec<u8>,
}

fuzz_target!(|input: Input| {
    // Arbitrary bytes handed straight to the packet decoder must never
    // panic, regardless of how malformed they are.
    let _ = packet::decode(Cursor::new(input.raw_bytes.clone()));

    // Round-trip: whatever we encode, the payload decoder must hand back
    // exactly the same sequence of packets.
    let packets: Vec<Packet> = input
        .packets
        .into_iter()
        .map(|p| {
            let code = if p.binary { CodeType::Binary } else { CodeType::Text };
            Packet::new(code, p.kind.into(), p.data)
        })
        .collect();

    let form = if input.form_is_text {
        PayloadForm::Text
    } else {
        PayloadForm::Binary
    };

    let mut buf = Vec::new();
    if payload::encode(&mut buf, form, &packets).is_err() {
        return;
    }

    let mut decoder = payload::PayloadDecoder::new(Cursor::new(buf));
    for original in &packets {
        let decoded = match decoder.next() {
            Ok(pkt) => pkt,
            Err(_) => panic!("payload decoder failed on its own encoder's output"),
        };
        assert_eq!(decoded.kind, original.kind);
        assert_eq!(decoded.code, original.code);
        assert_eq!(decoded.data, original.data);
    }
});
