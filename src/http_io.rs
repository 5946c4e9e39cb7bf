//! A hand-rolled HTTP/1.1 request/response shim — no framework crate,
//! just enough parsing to drive the long-polling transport and the
//! WebSocket Upgrade handshake. Used on both sides: the polling server
//! consumes an already-parsed `HttpRequest` and produces an
//! `HttpResponse`; the polling client builds requests and parses
//! responses directly off a `TcpStream`.

use std::collections::HashMap;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};

use crate::error::Error;

const CRLF: &str = "\r\n";

/// An already-parsed HTTP request: method, path, query parameters,
/// lower-cased headers, and body.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub query: HashMap<String, String>,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Reads and parses one request directly off an async stream, in two
    /// phases: headers line-by-line until the blank line, then a
    /// `Content-Length`-bounded body read.
    pub async fn read_from<T>(stream: &mut T) -> Result<Self, Error>
    where
        T: tokio::io::AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(stream);
        let mut buffer = String::new();
        loop {
            let n = reader
                .read_line(&mut buffer)
                .await
                .map_err(|e| Error::Io { source: e })?;
            if n == 0 || buffer.ends_with(&CRLF.repeat(2)) {
                break;
            }
        }

        let (head, _) = buffer
            .split_once(&CRLF.repeat(2))
            .ok_or_else(|| Error::MalformedHttp("missing header/body delimiter".into()))?;

        let mut lines = head.lines();
        let request_line = lines
            .next()
            .ok_or_else(|| Error::MalformedHttp("empty request".into()))?;
        let mut parts = request_line.split_whitespace();
        let method = parts
            .next()
            .ok_or_else(|| Error::MalformedHttp("missing method".into()))?
            .to_string();
        let uri = parts
            .next()
            .ok_or_else(|| Error::MalformedHttp("missing uri".into()))?
            .to_string();

        let (path, query) = match uri.split_once('?') {
            Some((p, q)) => (p.to_string(), parse_urlencoded(q)),
            None => (uri, HashMap::new()),
        };

        let mut headers = HashMap::new();
        for line in lines {
            if let Some((k, v)) = line.split_once(':') {
                headers.insert(k.trim().to_lowercase(), v.trim().to_string());
            }
        }

        let body = if let Some(len) = headers.get("content-length") {
            let len: usize = len
                .parse()
                .map_err(|_| Error::MalformedHttp("invalid content-length".into()))?;
            let mut body = vec![0u8; len];
            reader
                .read_exact(&mut body)
                .await
                .map_err(|e| Error::Io { source: e })?;
            body
        } else {
            Vec::new()
        };

        Ok(HttpRequest {
            method,
            path,
            query,
            headers,
            body,
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }
}

/// A fully-built in-memory response: status, headers, body. The caller
/// (an external HTTP stack, out of scope here) writes it to the wire.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: &'static str,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, reason: &'static str) -> Self {
        HttpResponse {
            status,
            reason,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn ok_text(body: Vec<u8>) -> Self {
        HttpResponse::new(200, "OK")
            .with_header("Content-Type", "text/html")
            .with_body(body)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        HttpResponse::new(400, "Bad Request").with_body(message.into().into_bytes())
    }

    pub fn forbidden() -> Self {
        HttpResponse::new(403, "Forbidden")
    }

    pub fn request_timeout() -> Self {
        HttpResponse::new(408, "Request Timeout")
    }

    /// Serializes the response head + body, with `Content-Length` added
    /// automatically.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!("HTTP/1.1 {} {}\r\n", self.status, self.reason);
        for (k, v) in &self.headers {
            out.push_str(&format!("{}: {}\r\n", k, v));
        }
        out.push_str(&format!("Content-Length: {}\r\n\r\n", self.body.len()));
        let mut bytes = out.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }

    /// Parses a response directly off an async stream (used by the
    /// polling client to read the server's GET/POST reply).
    pub async fn read_from<T>(stream: &mut T) -> Result<(u16, HashMap<String, String>, Vec<u8>), Error>
    where
        T: tokio::io::AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(stream);
        let mut buffer = String::new();
        loop {
            let n = reader
                .read_line(&mut buffer)
                .await
                .map_err(|e| Error::Io { source: e })?;
            if n == 0 || buffer.ends_with(&CRLF.repeat(2)) {
                break;
            }
        }

        let (head, _) = buffer
            .split_once(&CRLF.repeat(2))
            .ok_or_else(|| Error::MalformedHttp("missing header/body delimiter".into()))?;

        let mut lines = head.lines();
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

        let body = if let Some(len) = headers.get("content-length") {
            let len: usize = len
                .parse()
                .map_err(|_| Error::MalformedHttp("invalid content-length".into()))?;
            let mut body = vec![0u8; len];
            reader
                .read_exact(&mut body)
                .await
                .map_err(|e| Error::Io { source: e })?;
            body
        } else {
            let mut body = Vec::new();
            reader
                .read_to_end(&mut body)
                .await
                .map_err(|e| Error::Io { source: e })?;
            body
        };

        Ok((status, headers, body))
    }
}

/// Decodes `application/x-www-form-urlencoded` bytes (used for both the
/// GET query string and the JSONP POST form body's `d` field).
pub fn parse_urlencoded(raw: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for pair in raw.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (k, v) = match pair.split_once('=') {
            Some((k, v)) => (k, v),
            None => (pair, ""),
        };
        out.insert(percent_decode(k), percent_decode(v));
    }
    out
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_query_string() {
        let q = parse_urlencoded("b64=1&j=3&t=12345-0");
        assert_eq!(q.get("b64").map(String::as_str), Some("1"));
        assert_eq!(q.get("j").map(String::as_str), Some("3"));
        assert_eq!(q.get("t").map(String::as_str), Some("12345-0"));
    }

    #[test]
    fn percent_decodes_form_field() {
        let q = parse_urlencoded("d=hello%20world%21");
        assert_eq!(q.get("d").map(String::as_str), Some("hello world!"));
    }

    #[tokio::test]
    async fn read_from_parses_request_head_and_binary_body() {
        let raw = b"POST /engine.io?j=0 HTTP/1.1\r\nHost: x\r\nContent-Length: 4\r\n\r\n\x00\xffhi".to_vec();
        let mut stream = std::io::Cursor::new(raw);
        let req = HttpRequest::read_from(&mut stream).await.unwrap();
        assert_eq!(req.method, "POST");
        assert_eq!(req.path, "/engine.io");
        assert_eq!(req.query.get("j").map(String::as_str), Some("0"));
        assert_eq!(req.body, b"\x00\xffhi");
    }

    #[test]
    fn response_serializes_with_content_length() {
        let resp = HttpResponse::ok_text(b"hi".to_vec());
        let bytes = resp.to_bytes();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 2\r\n"));
        assert!(text.ends_with("hi"));
    }
}
