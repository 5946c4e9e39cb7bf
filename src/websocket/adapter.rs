//! Bridges the packet codec to a WebSocket message stream. One WS
//! message carries one packet, never base64'd — WebSocket preserves
//! binary.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::sync::Mutex;

use crate::config::WebSocketConfig;
use crate::error::Error;
use crate::packet::{self, CodeType, PacketKind, PacketReader};
use crate::websocket::frame::{Frame, OpCode};
use crate::websocket::raw::{RawReader, RawWriter, Role};

/// A buffered writer for one outbound packet: bytes accumulate in memory
/// (mirroring `packet::encode`'s sync `Write` contract), and `finish`
/// sends them as a single WS message.
pub struct WebSocketWriter<'a, S> {
    adapter: &'a WebSocketAdapter<S>,
    code: CodeType,
    buf: Vec<u8>,
}

impl<'a, S> std::io::Write for WebSocketWriter<'a, S> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buf.write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a, S: AsyncRead + AsyncWrite + Unpin> WebSocketWriter<'a, S> {
    /// Commits the buffered packet as a single WS frame.
    pub async fn finish(self) -> Result<(), Error> {
        let opcode = match self.code {
            CodeType::Text => OpCode::Text,
            CodeType::Binary => OpCode::Binary,
        };
        let mut writer = self.adapter.writer.lock().await;
        writer.write_frame(Frame::new(true, opcode, self.buf)).await
    }
}

/// The WebSocket half of the `Transport` contract: `NextReader`/
/// `NextWriter` over a split async stream.
pub struct WebSocketAdapter<S> {
    reader: RawReader<ReadHalf<S>, WriteHalf<S>>,
    writer: Arc<Mutex<RawWriter<WriteHalf<S>>>>,
    read_deadline: Option<Duration>,
    write_deadline: Option<Duration>,
}

impl<S: AsyncRead + AsyncWrite + Unpin> WebSocketAdapter<S> {
    pub fn new(stream: S, role: Role, config: WebSocketConfig) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        let writer = Arc::new(Mutex::new(RawWriter::new(write_half, role)));
        let reader = RawReader::new(read_half, writer.clone(), config);
        Self {
            reader,
            writer,
            read_deadline: None,
            write_deadline: None,
        }
    }

    pub fn set_read_deadline(&mut self, d: Option<Duration>) {
        self.read_deadline = d;
        self.reader.set_read_timeout(d);
    }

    pub fn set_write_deadline(&mut self, d: Option<Duration>) {
        self.write_deadline = d;
    }

    /// Reads WS frames until a data message arrives, then hands back a
    /// packet decoder over its fully-buffered payload.
    pub async fn next_reader(
        &mut self,
    ) -> Result<(CodeType, PacketKind, PacketReader<Cursor<Vec<u8>>>), Error> {
        let (opcode, payload) = self.reader.read_message().await?;
        let code = match opcode {
            OpCode::Text => CodeType::Text,
            OpCode::Binary => CodeType::Binary,
            _ => return Err(Error::InvalidMessageType),
        };
        let head = packet::decode(Cursor::new(payload))?;
        Ok((head.code, head.kind, head.reader))
    }

    pub fn next_writer(&self, code: CodeType, kind: PacketKind) -> Result<WebSocketWriter<'_, S>, Error> {
        let mut buf = Vec::new();
        packet::encode(&mut buf, kind, code, &[]).map_err(|e| Error::Io { source: e })?;
        Ok(WebSocketWriter {
            adapter: self,
            code,
            buf,
        })
    }

    pub async fn close(&mut self) -> Result<(), Error> {
        let mut writer = self.writer.lock().await;
        writer.write_frame(Frame::new(true, OpCode::Close, Vec::new())).await
    }
}
