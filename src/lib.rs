//! Engine.IO v3 transport layer: packet/payload codec, long-polling
//! transport, and a raw WebSocket primitive bridged through the same
//! packet codec.
//!
//! This crate does not implement the Engine.IO/Socket.IO handshake
//! negotiation or session registry — it offers the wire codec and the
//! two duplex transports an application layer on top would drive,
//! exposed uniformly through [`transport::ServerTransport`] and
//! [`transport::ClientTransport`].

pub mod config;
pub mod error;
pub mod http_io;
pub mod jsonp;
pub mod limit_reader;
pub mod packet;
pub mod payload;
pub mod polling;
pub mod rendezvous;
pub mod transport;
pub mod trylock;
pub mod websocket;

pub use config::{PollingConfig, WebSocketConfig};
pub use error::Error;
pub use packet::{CodeType, Packet, PacketKind};
pub use transport::{ClientTransport, ServerTransport};
