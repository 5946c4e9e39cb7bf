//! The raw RFC 6455 primitive (frame/raw/handshake) plus the packet-codec
//! adapter built on top of it.

pub mod adapter;
pub mod frame;
pub mod handshake;
pub mod raw;

pub use adapter::{WebSocketAdapter, WebSocketWriter};
pub use raw::Role;
