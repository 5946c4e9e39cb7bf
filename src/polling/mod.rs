//! The long-polling transport pair: server and client halves.

pub mod client;
pub mod reader;
pub mod server;
pub mod writer;

pub use client::{ClientRequestTemplate, PollingClient};
pub use reader::PollingReader;
pub use server::PollingServer;
