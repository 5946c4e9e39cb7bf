//! The uniform duplex abstraction shared by polling and WebSocket.
//! Expressed as enums over the two concrete transports rather than a
//! `dyn`-safe trait object — the two transports' reader/writer types are
//! different enough that static dispatch reads more plainly than forcing
//! a shared associated-type trait.

use std::io::{Cursor, Read, Write as _};
use std::time::Instant;

use tokio::net::TcpStream;

use crate::error::Error;
use crate::http_io::{HttpRequest, HttpResponse};
use crate::packet::{CodeType, PacketKind, PacketReader};
use crate::polling::{PollingReader, PollingServer};
use crate::websocket::adapter::WebSocketWriter;
use crate::websocket::WebSocketAdapter;

/// Either half of the duplex reader returned from `NextReader`. The
/// polling client's payload decoder already hands back fully-decoded
/// bytes (no further packet-codec framing to strip), so it gets its own
/// plain `Cursor` variant instead of being re-run through the packet
/// decoder.
pub enum TransportReader {
    Polling(PollingReader),
    Decoded(Cursor<Vec<u8>>),
    WebSocket(PacketReader<Cursor<Vec<u8>>>),
}

impl Read for TransportReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            TransportReader::Polling(r) => r.read(buf),
            TransportReader::Decoded(r) => r.read(buf),
            TransportReader::WebSocket(r) => r.read(buf),
        }
    }
}

/// The server-side transport: a request-scoped handle (polling) or a
/// full-duplex upgraded socket (WebSocket).
pub enum ServerTransport {
    Polling(PollingServer),
    WebSocket(WebSocketAdapter<TcpStream>),
}

impl ServerTransport {
    pub async fn next_reader(&mut self) -> Result<(CodeType, PacketKind, TransportReader), Error> {
        match self {
            ServerTransport::Polling(p) => {
                let (code, kind, r) = p.next_reader().await?;
                Ok((code, kind, TransportReader::Polling(r)))
            }
            ServerTransport::WebSocket(ws) => {
                let (code, kind, r) = ws.next_reader().await?;
                Ok((code, kind, TransportReader::WebSocket(r)))
            }
        }
    }

    pub fn set_read_deadline(&mut self, deadline: Option<Instant>) {
        match self {
            ServerTransport::Polling(p) => p.set_read_deadline(deadline),
            ServerTransport::WebSocket(ws) => {
                ws.set_read_deadline(deadline.map(|d| d.saturating_duration_since(Instant::now())))
            }
        }
    }

    pub fn set_write_deadline(&mut self, deadline: Option<Instant>) {
        match self {
            ServerTransport::Polling(p) => p.set_write_deadline(deadline),
            ServerTransport::WebSocket(ws) => {
                ws.set_write_deadline(deadline.map(|d| d.saturating_duration_since(Instant::now())))
            }
        }
    }

    pub async fn close(&mut self) -> Result<(), Error> {
        match self {
            ServerTransport::Polling(p) => p.close().await,
            ServerTransport::WebSocket(ws) => ws.close().await,
        }
    }

    /// Only the polling variant serves HTTP directly; dispatching a
    /// request to a WebSocket transport is a caller error (the upgrade
    /// has already happened by the time this transport exists).
    pub async fn serve_http(&self, req: &HttpRequest) -> HttpResponse {
        match self {
            ServerTransport::Polling(p) => p.serve_http(req).await,
            ServerTransport::WebSocket(_) => HttpResponse::new(400, "Bad Request")
                .with_body(b"websocket transport does not serve HTTP requests".to_vec()),
        }
    }
}

/// A writer handle bound to one transport variant; `finish` commits it.
pub enum TransportWriter<'a> {
    Polling {
        server: &'a PollingServer,
        buffer: crate::polling::writer::PacketBuffer,
    },
    WebSocket(WebSocketWriter<'a, TcpStream>),
}

impl std::io::Write for TransportWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            TransportWriter::Polling { buffer, .. } => buffer.write(buf),
            TransportWriter::WebSocket(w) => w.write(buf),
        }
    }
    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            TransportWriter::Polling { buffer, .. } => buffer.flush(),
            TransportWriter::WebSocket(w) => w.flush(),
        }
    }
}

impl<'a> TransportWriter<'a> {
    pub async fn finish(self) -> Result<(), Error> {
        match self {
            TransportWriter::Polling { server, buffer } => {
                server.commit_writer(buffer).await;
                Ok(())
            }
            TransportWriter::WebSocket(w) => w.finish().await,
        }
    }
}

impl ServerTransport {
    pub fn next_writer(&self, code: CodeType, kind: PacketKind) -> Result<TransportWriter<'_>, Error> {
        match self {
            ServerTransport::Polling(p) => Ok(TransportWriter::Polling {
                server: p,
                buffer: p.next_writer(code, kind),
            }),
            ServerTransport::WebSocket(ws) => Ok(TransportWriter::WebSocket(ws.next_writer(code, kind)?)),
        }
    }
}

/// The client-side transport, mirroring `ServerTransport` for the other
/// end of the conn.
pub enum ClientTransport {
    Polling(std::sync::Arc<crate::polling::PollingClient>),
    WebSocket(WebSocketAdapter<TcpStream>),
}

impl ClientTransport {
    pub async fn next_reader(&mut self) -> Result<(CodeType, PacketKind, TransportReader), Error> {
        match self {
            ClientTransport::Polling(c) => {
                let (code, kind, pkt) = c.next_reader().await?;
                Ok((code, kind, TransportReader::Decoded(Cursor::new(pkt.data))))
            }
            ClientTransport::WebSocket(ws) => {
                let (code, kind, r) = ws.next_reader().await?;
                Ok((code, kind, TransportReader::WebSocket(r)))
            }
        }
    }

    pub fn next_writer(&self, code: CodeType, kind: PacketKind) -> Result<ClientWriter<'_>, Error> {
        match self {
            ClientTransport::Polling(c) => Ok(ClientWriter::Polling {
                client: c.clone(),
                buffer: c.next_writer(code, kind),
            }),
            ClientTransport::WebSocket(ws) => Ok(ClientWriter::WebSocket(ws.next_writer(code, kind)?)),
        }
    }

    pub async fn close(&mut self) -> Result<(), Error> {
        match self {
            ClientTransport::Polling(c) => {
                c.close();
                Ok(())
            }
            ClientTransport::WebSocket(ws) => ws.close().await,
        }
    }

    pub fn set_read_deadline(&mut self, deadline: Option<Instant>) {
        match self {
            ClientTransport::Polling(c) => c.set_read_deadline(deadline),
            ClientTransport::WebSocket(ws) => {
                ws.set_read_deadline(deadline.map(|d| d.saturating_duration_since(Instant::now())))
            }
        }
    }

    pub fn set_write_deadline(&mut self, deadline: Option<Instant>) {
        match self {
            ClientTransport::Polling(c) => c.set_write_deadline(deadline),
            ClientTransport::WebSocket(ws) => {
                ws.set_write_deadline(deadline.map(|d| d.saturating_duration_since(Instant::now())))
            }
        }
    }

    /// The HTTP response of the first successful inbound request, polling
    /// only — a WebSocket conn has no per-message HTTP envelope after the
    /// handshake.
    pub async fn response(&self) -> Option<(u16, Vec<u8>)> {
        match self {
            ClientTransport::Polling(c) => c.response().await,
            ClientTransport::WebSocket(_) => None,
        }
    }
}

pub enum ClientWriter<'a> {
    Polling {
        client: std::sync::Arc<crate::polling::PollingClient>,
        buffer: crate::polling::writer::PacketBuffer,
    },
    WebSocket(WebSocketWriter<'a, TcpStream>),
}

impl std::io::Write for ClientWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            ClientWriter::Polling { buffer, .. } => buffer.write(buf),
            ClientWriter::WebSocket(w) => w.write(buf),
        }
    }
    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            ClientWriter::Polling { buffer, .. } => buffer.flush(),
            ClientWriter::WebSocket(w) => w.flush(),
        }
    }
}

impl<'a> ClientWriter<'a> {
    pub async fn finish(self) -> Result<(), Error> {
        match self {
            ClientWriter::Polling { client, buffer } => client.commit_writer(buffer).await,
            ClientWriter::WebSocket(w) => w.finish().await,
        }
    }
}
