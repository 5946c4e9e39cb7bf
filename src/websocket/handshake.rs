//! Minimal HTTP/1.1 Upgrade handshake: server accept-key computation and
//! client request construction.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use rand::RngCore;
use sha1::{Digest, Sha1};
use tokio::io::AsyncReadExt;
use url::Url;

use crate::error::Error;
use crate::http_io::HttpRequest;

const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Splits a `ws://host[:port]/path` URL into the `host:port` string a
/// `TcpStream` connects to and the request path/query the handshake
/// uses. `wss://` is rejected — TLS is out of scope here.
pub fn parse_ws_url(ws_url: &str) -> Result<(String, String), Error> {
    let parsed = Url::parse(ws_url)?;
    if parsed.scheme() != "ws" {
        return Err(Error::MalformedHttp(format!(
            "unsupported scheme {:?}, only ws:// is supported",
            parsed.scheme()
        )));
    }
    let host = parsed
        .host_str()
        .ok_or_else(|| Error::MalformedHttp("URL has no host".into()))?;
    let port = parsed.port().unwrap_or(80);
    let host_with_port = format!("{}:{}", host, port);

    let path = match parsed.query() {
        Some(q) => format!("{}?{}", parsed.path(), q),
        None => parsed.path().to_string(),
    };

    Ok((host_with_port, path))
}

/// Computes `Sec-WebSocket-Accept` from the client's `Sec-WebSocket-Key`.
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    BASE64_STANDARD.encode(hasher.finalize())
}

/// Validates an inbound Upgrade request and returns the `Sec-WebSocket-Accept`
/// value the server should echo back.
pub fn server_accept(req: &HttpRequest) -> Result<String, Error> {
    let upgrade = req
        .header("upgrade")
        .ok_or_else(|| Error::MalformedHttp("missing Upgrade header".into()))?;
    if !upgrade.eq_ignore_ascii_case("websocket") {
        return Err(Error::MalformedHttp("Upgrade header is not websocket".into()));
    }
    let key = req
        .header("sec-websocket-key")
        .ok_or_else(|| Error::MalformedHttp("missing Sec-WebSocket-Key".into()))?;
    Ok(accept_key(key))
}

/// Generates a fresh, random `Sec-WebSocket-Key` for a client handshake.
pub fn generate_client_key() -> String {
    let mut raw = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut raw);
    BASE64_STANDARD.encode(raw)
}

/// Builds the request line/headers for a client-side Upgrade request.
pub fn build_client_request(host: &str, path: &str, key: &str) -> String {
    format!(
        "GET {path} HTTP/1.1\r\nHost: {host}\r\nConnection: Upgrade\r\nUpgrade: websocket\r\nSec-WebSocket-Key: {key}\r\nSec-WebSocket-Version: 13\r\n\r\n",
        path = path,
        host = host,
        key = key,
    )
}

/// Builds the `101 Switching Protocols` response for a server accept.
pub fn build_server_response(accept: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\nUpgrade: websocket\r\nSec-WebSocket-Accept: {}\r\n\r\n",
        accept
    )
}

/// Reads the status line and headers of a client-side Upgrade response
/// directly off the stream, one byte at a time, stopping exactly at the
/// blank line. A `101` response carries no body and the socket stays
/// open afterward as a live full-duplex WS connection, so this never
/// attempts a `Content-Length`- or EOF-bounded body read the way a
/// regular HTTP response would.
pub async fn read_handshake_response<T>(stream: &mut T) -> Result<(u16, HashMap<String, String>), Error>
where
    T: tokio::io::AsyncRead + Unpin,
{
    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        stream.read_exact(&mut byte).await.map_err(|e| Error::Io { source: e })?;
        head.push(byte[0]);
        if head.ends_with(b"\r\n\r\n") {
            break;
        }
    }

    let text = String::from_utf8_lossy(&head);
    let mut lines = text.lines();
    let status_line = lines
        .next()
        .ok_or_else(|| Error::MalformedHttp("empty response".into()))?;
    let mut parts = status_line.split_whitespace();
    let _version = parts.next();
    let status: u16 = parts
        .next()
        .ok_or_else(|| Error::MalformedHttp("missing status".into()))?
        .parse()
        .map_err(|_| Error::MalformedHttp("invalid status".into()))?;

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_lowercase(), v.trim().to_string());
        }
    }

    Ok((status, headers))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accept_key_matches_rfc6455_example() {
        // RFC 6455 §1.3 worked example.
        assert_eq!(accept_key("dGhlIHNhbXBsZSBub25jZQ=="), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[tokio::test]
    async fn reads_handshake_response_and_leaves_frame_bytes_untouched() {
        let mut raw = b"HTTP/1.1 101 Switching Protocols\r\nConnection: Upgrade\r\nUpgrade: websocket\r\nSec-WebSocket-Accept: abc\r\n\r\n".to_vec();
        raw.extend_from_slice(b"leftover frame bytes");
        let mut stream = std::io::Cursor::new(raw);

        let (status, headers) = read_handshake_response(&mut stream).await.unwrap();
        assert_eq!(status, 101);
        assert_eq!(headers.get("upgrade").map(String::as_str), Some("websocket"));

        let mut rest = Vec::new();
        stream.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"leftover frame bytes");
    }

    #[test]
    fn parses_ws_url_with_explicit_port_and_query() {
        let (host, path) = parse_ws_url("ws://127.0.0.1:9101/ws?foo=bar").unwrap();
        assert_eq!(host, "127.0.0.1:9101");
        assert_eq!(path, "/ws?foo=bar");
    }

    #[test]
    fn defaults_to_port_80_without_an_explicit_port() {
        let (host, path) = parse_ws_url("ws://example.com/ws").unwrap();
        assert_eq!(host, "example.com:80");
        assert_eq!(path, "/ws");
    }

    #[test]
    fn rejects_wss_scheme() {
        assert!(parse_ws_url("wss://example.com/ws").is_err());
    }
}
