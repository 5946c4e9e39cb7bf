//! The buffered writer returned from `NextWriter`: application bytes
//! accumulate in memory and are only turned into a `Packet` — appended
//! to the outbound queue, or POSTed — when the caller finishes it. The
//! packet codec's own framing (type byte, base64 escaping) is applied
//! later by the payload encoder, not here.

use std::io;

use crate::packet::{CodeType, Packet, PacketKind};

pub struct PacketBuffer {
    code: CodeType,
    kind: PacketKind,
    buf: Vec<u8>,
}

impl PacketBuffer {
    pub fn new(code: CodeType, kind: PacketKind) -> Self {
        Self {
            code,
            kind,
            buf: Vec::new(),
        }
    }

    pub fn into_packet(self) -> Packet {
        Packet::new(self.code, self.kind, self.buf)
    }
}

impl io::Write for PacketBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buf.write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
