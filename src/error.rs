use std::io;
use std::string::FromUtf8Error;
use thiserror::Error;

/// Errors surfaced by the codec, the polling transport pair, and the
/// WebSocket adapter.
#[derive(Error, Debug)]
pub enum Error {
    /// The transport is closed, or a stream naturally ended.
    #[error("eof")]
    Eof,

    /// A read/write deadline elapsed before the operation completed.
    #[error("timeout")]
    Timeout,

    /// A packet byte was out of range or otherwise undecodable.
    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    /// Payload framing was malformed (bad length, missing delimiter).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The chosen framer doesn't support the packet's code type.
    #[error("invalid message type")]
    InvalidMessageType,

    /// A non-2xx HTTP response from the peer, client side.
    #[error("http error {status}: {body}")]
    Http { status: u16, body: String },

    /// A malformed HTTP request or response.
    #[error("malformed http: {0}")]
    MalformedHttp(String),

    /// A concurrent GET (or POST) collided with one already in flight.
    #[error("interleave {0}")]
    Interleave(&'static str),

    /// The transport was closed while the caller was waiting.
    #[error("closed")]
    Closed,

    #[error("{source}")]
    Io {
        #[from]
        source: io::Error,
    },

    #[error("{source}")]
    FromUtf8Error {
        #[from]
        source: FromUtf8Error,
    },

    #[error("{source}")]
    UrlParseError {
        #[from]
        source: url::ParseError,
    },
}

impl Error {
    pub fn is_eof(&self) -> bool {
        matches!(self, Error::Eof)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout)
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io { source } => source,
            Error::Eof => io::Error::new(io::ErrorKind::UnexpectedEof, "eof"),
            Error::Timeout => io::Error::new(io::ErrorKind::TimedOut, "timeout"),
            other => io::Error::new(io::ErrorKind::Other, other.to_string()),
        }
    }
}
