//! A single typed frame: kind + code + payload bytes, and its wire
//! encoding/decoding.

use std::io::{self, Cursor, Read, Write};

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::write::EncoderWriter;
use base64::Engine;

use crate::error::Error;

/// The seven stable packet kinds, ordinal 0..6. Any ordinal >= 7 is a
/// decode error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Open,
    Close,
    Ping,
    Pong,
    Message,
    Upgrade,
    Noop,
}

const PACKET_KIND_MAX: u8 = 7;

impl PacketKind {
    pub fn ordinal(self) -> u8 {
        match self {
            PacketKind::Open => 0,
            PacketKind::Close => 1,
            PacketKind::Ping => 2,
            PacketKind::Pong => 3,
            PacketKind::Message => 4,
            PacketKind::Upgrade => 5,
            PacketKind::Noop => 6,
        }
    }

    pub fn from_ordinal(b: u8) -> Result<Self, Error> {
        match b {
            0 => Ok(PacketKind::Open),
            1 => Ok(PacketKind::Close),
            2 => Ok(PacketKind::Ping),
            3 => Ok(PacketKind::Pong),
            4 => Ok(PacketKind::Message),
            5 => Ok(PacketKind::Upgrade),
            6 => Ok(PacketKind::Noop),
            _ => Err(Error::InvalidPacket(format!("invalid byte 0x{:x}", b))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PacketKind::Open => "open",
            PacketKind::Close => "close",
            PacketKind::Ping => "ping",
            PacketKind::Pong => "pong",
            PacketKind::Message => "message",
            PacketKind::Upgrade => "upgrade",
            PacketKind::Noop => "noop",
        }
    }
}

/// Text vs binary code, determining wire encoding and content-type
/// negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeType {
    Text,
    Binary,
}

/// One typed, atomic unit of application data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub code: CodeType,
    pub kind: PacketKind,
    pub data: Vec<u8>,
}

impl Packet {
    pub fn new(code: CodeType, kind: PacketKind, data: Vec<u8>) -> Self {
        Self { code, kind, data }
    }
}

/// `normalLen(n) = 1 + n`
pub fn normal_encode_length(n: usize) -> usize {
    1 + n
}

/// `base64Len(n) = 2 + ceil(n/3)*4`
pub fn base64_encode_length(n: usize) -> usize {
    2 + ((n + 2) / 3) * 4
}

/// Encodes a single packet to `w` using the binary form: one type byte
/// (ordinal if binary code, ASCII digit if text code) followed by the raw
/// payload.
pub fn encode(w: &mut impl Write, kind: PacketKind, code: CodeType, data: &[u8]) -> io::Result<()> {
    let type_byte = match code {
        CodeType::Binary => kind.ordinal(),
        CodeType::Text => b'0' + kind.ordinal(),
    };
    w.write_all(&[type_byte])?;
    w.write_all(data)
}

/// Encodes a single packet to `w` using the base64 escape hatch: `'b'`,
/// then the ASCII digit of the kind, then the payload through a
/// standard-alphabet base64 encoder (finalized to flush padding).
pub fn encode_base64(w: &mut impl Write, kind: PacketKind, data: &[u8]) -> io::Result<()> {
    w.write_all(&[b'b', b'0' + kind.ordinal()])?;
    let mut encoder = EncoderWriter::new(w, &BASE64_STANDARD);
    encoder.write_all(data)?;
    encoder.finish()?;
    Ok(())
}

/// The decoded head of a packet: its kind, code, and a reader positioned
/// at the start of the payload. The caller is responsible for bounding
/// how many bytes it reads (the payload framer supplies that bound).
pub struct DecodedHead<R> {
    pub kind: PacketKind,
    pub code: CodeType,
    pub reader: R,
}

enum Body<R> {
    Plain(R),
    // Base64 payloads are small (one packet, already length-bounded by the
    // payload framer) so we decode them eagerly rather than streaming
    // through a chained Read adapter.
    Base64(Cursor<Vec<u8>>),
}

impl<R: Read> Read for Body<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Body::Plain(r) => r.read(buf),
            Body::Base64(r) => r.read(buf),
        }
    }
}

/// A packet payload reader: either the raw remainder of the stream, or a
/// base64 decoder wrapped around it.
pub struct PacketReader<R> {
    body: Body<R>,
}

impl<R: Read> Read for PacketReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.body.read(buf)
    }
}

/// Decodes the type byte(s) from `r` and returns the packet's kind, code,
/// and a reader over its payload.
pub fn decode<R: Read>(mut r: R) -> Result<DecodedHead<PacketReader<R>>, Error> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b)?;

    if b[0] == b'b' {
        let mut kind_byte = [0u8; 1];
        r.read_exact(&mut kind_byte)?;
        let ordinal = kind_byte[0].wrapping_sub(b'0');
        if ordinal >= PACKET_KIND_MAX {
            return Err(Error::InvalidPacket(format!("invalid byte 0x{:x}", kind_byte[0])));
        }
        let kind = PacketKind::from_ordinal(ordinal)?;

        let mut encoded = Vec::new();
        r.read_to_end(&mut encoded)?;
        let decoded = BASE64_STANDARD
            .decode(&encoded)
            .map_err(|e| Error::InvalidInput(e.to_string()))?;

        return Ok(DecodedHead {
            kind,
            code: CodeType::Binary,
            reader: PacketReader {
                body: Body::Base64(Cursor::new(decoded)),
            },
        });
    }

    let (code, ordinal) = if b[0] >= b'0' {
        (CodeType::Text, b[0] - b'0')
    } else {
        (CodeType::Binary, b[0])
    };

    if ordinal >= PACKET_KIND_MAX {
        return Err(Error::InvalidPacket(format!("invalid byte 0x{:x}", b[0])));
    }
    let kind = PacketKind::from_ordinal(ordinal)?;

    Ok(DecodedHead {
        kind,
        code,
        reader: PacketReader { body: Body::Plain(r) },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_ordinals_round_trip() {
        for ord in 0..7u8 {
            let kind = PacketKind::from_ordinal(ord).unwrap();
            assert_eq!(kind.ordinal(), ord);
        }
        assert!(PacketKind::from_ordinal(7).is_err());
        assert!(PacketKind::from_ordinal(255).is_err());
    }

    #[test]
    fn encode_decode_text_message() {
        let mut buf = Vec::new();
        encode(&mut buf, PacketKind::Message, CodeType::Text, "测试".as_bytes()).unwrap();
        assert_eq!(buf, b"4\xe6\xb5\x8b\xe8\xaf\x95");

        let head = decode(Cursor::new(buf)).unwrap();
        assert_eq!(head.kind, PacketKind::Message);
        assert_eq!(head.code, CodeType::Text);
        let mut out = Vec::new();
        let mut reader = head.reader;
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, "测试".as_bytes());
    }

    #[test]
    fn encode_decode_base64_message() {
        let mut buf = Vec::new();
        encode_base64(&mut buf, PacketKind::Message, "测试".as_bytes()).unwrap();
        assert_eq!(buf, b"b45rWL6K+V");

        let head = decode(Cursor::new(buf)).unwrap();
        assert_eq!(head.kind, PacketKind::Message);
        assert_eq!(head.code, CodeType::Binary);
        let mut out = Vec::new();
        let mut reader = head.reader;
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, "测试".as_bytes());
    }

    #[test]
    fn encode_decode_binary_open_empty() {
        let mut buf = Vec::new();
        encode(&mut buf, PacketKind::Open, CodeType::Binary, &[]).unwrap();
        assert_eq!(buf, vec![0u8]);

        let head = decode(Cursor::new(buf)).unwrap();
        assert_eq!(head.kind, PacketKind::Open);
        assert_eq!(head.code, CodeType::Binary);
    }

    #[test]
    fn invalid_kind_rejected() {
        let buf = vec![7u8 + b'0'];
        assert!(decode(Cursor::new(buf)).is_err());
        let buf = vec![0xFFu8];
        assert!(decode(Cursor::new(buf)).is_err());
    }

    #[test]
    fn length_predicates() {
        assert_eq!(normal_encode_length(0), 1);
        assert_eq!(normal_encode_length(7), 8);
        assert_eq!(base64_encode_length(6), 2 + 8);
    }
}
