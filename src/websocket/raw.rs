//! RFC 6455 frame I/O over a split async stream: reading (with
//! unmasking, fragmentation reassembly, automatic ping/pong/close
//! handling) and writing (with masking on the client side). No
//! permessage-deflate — compression is out of scope.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;
use tokio::time::{timeout, Duration};

use crate::config::WebSocketConfig;
use crate::error::Error;
use crate::websocket::frame::{Frame, OpCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Writes frames to a split write half, masking them when acting as a
/// client (RFC 6455 §5.1 — a server must never mask its frames, a client
/// always must).
pub struct RawWriter<W> {
    write_half: W,
    role: Role,
}

impl<W: AsyncWrite + Unpin> RawWriter<W> {
    pub fn new(write_half: W, role: Role) -> Self {
        Self { write_half, role }
    }

    pub async fn write_frame(&mut self, frame: Frame) -> Result<(), Error> {
        match self.role {
            Role::Server => self.write_unmasked(frame).await,
            Role::Client => self.write_masked(frame).await,
        }
    }

    async fn write_unmasked(&mut self, frame: Frame) -> Result<(), Error> {
        let first_byte = (frame.final_fragment as u8) << 7 | frame.opcode.as_byte();
        self.write_half
            .write_all(&[first_byte])
            .await
            .map_err(|e| Error::Io { source: e })?;
        self.write_length(frame.payload.len(), 0).await?;
        self.write_half
            .write_all(&frame.payload)
            .await
            .map_err(|e| Error::Io { source: e })
    }

    async fn write_masked(&mut self, frame: Frame) -> Result<(), Error> {
        let mut rng = StdRng::from_rng(rand::thread_rng());
        let mask = [
            rng.random::<u8>(),
            rng.random::<u8>(),
            rng.random::<u8>(),
            rng.random::<u8>(),
        ];

        let first_byte = (frame.final_fragment as u8) << 7 | frame.opcode.as_byte();
        self.write_half
            .write_all(&[first_byte])
            .await
            .map_err(|e| Error::Io { source: e })?;
        self.write_length(frame.payload.len(), 0b1000_0000).await?;
        self.write_half
            .write_all(&mask)
            .await
            .map_err(|e| Error::Io { source: e })?;

        let masked: Vec<u8> = frame
            .payload
            .iter()
            .enumerate()
            .map(|(i, &b)| b ^ mask[i % 4])
            .collect();
        self.write_half
            .write_all(&masked)
            .await
            .map_err(|e| Error::Io { source: e })
    }

    async fn write_length(&mut self, len: usize, mask_bit: u8) -> Result<(), Error> {
        if len <= 125 {
            self.write_half
                .write_all(&[mask_bit | len as u8])
                .await
                .map_err(|e| Error::Io { source: e })
        } else if len <= 65535 {
            self.write_half
                .write_all(&[mask_bit | 126, (len >> 8) as u8, len as u8])
                .await
                .map_err(|e| Error::Io { source: e })
        } else {
            let bytes = (len as u64).to_be_bytes();
            let mut buf = Vec::with_capacity(9);
            buf.push(mask_bit | 127);
            buf.extend_from_slice(&bytes);
            self.write_half.write_all(&buf).await.map_err(|e| Error::Io { source: e })
        }
    }
}

/// Reads frames from a split read half, unmasking client frames and
/// transparently replying to pings (writes go through the shared writer
/// so a concurrent application write can't interleave mid-frame).
pub struct RawReader<R, W> {
    buf_reader: BufReader<R>,
    writer: Arc<Mutex<RawWriter<W>>>,
    config: WebSocketConfig,
    read_timeout: Option<Duration>,
}

impl<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> RawReader<R, W> {
    pub fn new(read_half: R, writer: Arc<Mutex<RawWriter<W>>>, config: WebSocketConfig) -> Self {
        Self {
            buf_reader: BufReader::new(read_half),
            writer,
            config,
            read_timeout: None,
        }
    }

    pub fn set_read_timeout(&mut self, d: Option<Duration>) {
        self.read_timeout = d;
    }

    /// Reads frames until one complete text/binary message (possibly
    /// reassembled from continuation frames) is available. Ping/Pong are
    /// answered or absorbed transparently; Close terminates with `eof`.
    pub async fn read_message(&mut self) -> Result<(OpCode, Vec<u8>), Error> {
        let mut fragmented: Option<(OpCode, Vec<u8>)> = None;
        loop {
            let frame = self.read_frame().await?;
            match frame.opcode {
                OpCode::Text | OpCode::Binary if !frame.final_fragment => {
                    if fragmented.is_some() {
                        return Err(Error::InvalidPacket("fragmented message already in progress".into()));
                    }
                    fragmented = Some((frame.opcode, frame.payload));
                }
                OpCode::Continue => {
                    let (op, buf) = fragmented
                        .as_mut()
                        .ok_or_else(|| Error::InvalidPacket("continuation without start".into()))?;
                    buf.extend_from_slice(&frame.payload);
                    if let Some(max) = self.config.max_message_size {
                        if buf.len() > max {
                            return Err(Error::InvalidPacket("message exceeds max_message_size".into()));
                        }
                    }
                    if frame.final_fragment {
                        let op = *op;
                        let (_, payload) = fragmented.take().unwrap();
                        return Ok((op, payload));
                    }
                }
                OpCode::Text | OpCode::Binary => {
                    if fragmented.is_some() {
                        return Err(Error::InvalidPacket("unexpected non-continuation frame".into()));
                    }
                    return Ok((frame.opcode, frame.payload));
                }
                OpCode::Ping => {
                    let mut w = self.writer.lock().await;
                    w.write_frame(Frame::new(true, OpCode::Pong, frame.payload)).await?;
                }
                OpCode::Pong => {}
                OpCode::Close => {
                    let mut w = self.writer.lock().await;
                    let _ = w.write_frame(Frame::new(true, OpCode::Close, Vec::new())).await;
                    return Err(Error::Eof);
                }
            }
        }
    }

    async fn read_frame(&mut self) -> Result<Frame, Error> {
        let read = async {
            let mut header = [0u8; 2];
            self.buf_reader
                .read_exact(&mut header)
                .await
                .map_err(|e| Error::Io { source: e })?;

            let final_fragment = (header[0] & 0b1000_0000) != 0;
            let opcode = OpCode::from_byte(header[0] & 0b0000_1111)?;
            let rsv = header[0] & 0b0111_0000;
            if rsv != 0 {
                return Err(Error::InvalidPacket("non-zero RSV bits without an extension".into()));
            }
            if !final_fragment && opcode.is_control() {
                return Err(Error::InvalidPacket("fragmented control frame".into()));
            }

            let masked = (header[1] & 0b1000_0000) != 0;
            let mut length = (header[1] & 0b0111_1111) as usize;
            if length > 125 && opcode.is_control() {
                return Err(Error::InvalidPacket("control frame payload too large".into()));
            }
            if length == 126 {
                let mut be = [0u8; 2];
                self.buf_reader.read_exact(&mut be).await.map_err(|e| Error::Io { source: e })?;
                length = u16::from_be_bytes(be) as usize;
            } else if length == 127 {
                let mut be = [0u8; 8];
                self.buf_reader.read_exact(&mut be).await.map_err(|e| Error::Io { source: e })?;
                length = u64::from_be_bytes(be) as usize;
            }
            if let Some(max) = self.config.max_frame_size {
                if length > max {
                    return Err(Error::InvalidPacket("frame exceeds max_frame_size".into()));
                }
            }

            let mask = if masked {
                let mut mask = [0u8; 4];
                self.buf_reader.read_exact(&mut mask).await.map_err(|e| Error::Io { source: e })?;
                Some(mask)
            } else {
                None
            };

            let mut payload = vec![0u8; length];
            self.buf_reader
                .read_exact(&mut payload)
                .await
                .map_err(|e| Error::Io { source: e })?;

            if let Some(mask) = mask {
                for (i, byte) in payload.iter_mut().enumerate() {
                    *byte ^= mask[i % 4];
                }
            }

            Ok(Frame::new(final_fragment, opcode, payload))
        };

        match self.read_timeout {
            Some(d) => timeout(d, read).await.map_err(|_| Error::Timeout)?,
            None => read.await,
        }
    }
}
