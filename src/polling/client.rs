//! Mirror of the polling server over outbound HTTP: POST pushes outbound,
//! GET blocks until inbound.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::config::PollingConfig;
use crate::error::Error;
use crate::http_io::HttpResponse;
use crate::packet::{CodeType, PacketKind};
use crate::payload::{DecodedPacket, PayloadDecoder};
use crate::polling::writer::PacketBuffer;

/// The fixed request shape the client reuses for every GET/POST: host
/// (for the TCP connection), path, and whether to negotiate base64
/// (text) framing on GET.
#[derive(Debug, Clone)]
pub struct ClientRequestTemplate {
    pub host: String,
    pub path: String,
    pub use_b64: bool,
}

pub struct PollingClient {
    template: ClientRequestTemplate,
    seq: AtomicU64,
    posting: AtomicBool,
    post_error: Mutex<Option<Error>>,
    pending_data: Mutex<Vec<crate::packet::Packet>>,
    inbound: Mutex<Option<PayloadDecoder<Cursor<Vec<u8>>>>>,
    last_response: Mutex<Option<(u16, Vec<u8>)>>,
    closed: AtomicBool,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    read_deadline: StdMutex<Option<Instant>>,
    write_deadline: StdMutex<Option<Instant>>,
}

impl PollingClient {
    pub fn new(template: ClientRequestTemplate, config: PollingConfig) -> Arc<Self> {
        Arc::new(Self {
            template,
            seq: AtomicU64::new(0),
            posting: AtomicBool::new(false),
            post_error: Mutex::new(None),
            pending_data: Mutex::new(Vec::new()),
            inbound: Mutex::new(None),
            last_response: Mutex::new(None),
            closed: AtomicBool::new(false),
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            read_deadline: StdMutex::new(None),
            write_deadline: StdMutex::new(None),
        })
    }

    /// Installs an absolute deadline that overrides the configured
    /// duration for this and all subsequent requests, until replaced.
    /// `None` falls back to the configured duration, refreshed from
    /// `now` on every call.
    pub fn set_read_deadline(&self, deadline: Option<Instant>) {
        *self.read_deadline.lock().unwrap() = deadline;
    }

    pub fn set_write_deadline(&self, deadline: Option<Instant>) {
        *self.write_deadline.lock().unwrap() = deadline;
    }

    fn remaining(default: Option<Duration>, deadline: &StdMutex<Option<Instant>>) -> Option<Duration> {
        match *deadline.lock().unwrap() {
            Some(d) => Some(d.saturating_duration_since(Instant::now())),
            None => default,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn next_writer(&self, code: CodeType, kind: PacketKind) -> PacketBuffer {
        PacketBuffer::new(code, kind)
    }

    /// Commits a buffered packet and triggers the background POST. Any
    /// error latched by a *prior* POST surfaces here, before the new
    /// bytes are accepted, then is cleared.
    pub async fn commit_writer(self: &Arc<Self>, buffer: PacketBuffer) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::Eof);
        }
        if let Some(err) = self.post_error.lock().await.take() {
            return Err(err);
        }
        self.pending_data.lock().await.push(buffer.into_packet());
        self.dispatch_post();
        Ok(())
    }

    /// Spawns the background POST if one isn't already running. If one
    /// is, the packets just queued will be picked up by that POST's
    /// *next* pass — triggered by a later `commit_writer` call.
    fn dispatch_post(self: &Arc<Self>) {
        if self
            .posting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        let client = self.clone();
        tokio::spawn(async move {
            let result = client.run_post().await;
            if let Err(e) = result {
                *client.post_error.lock().await = Some(e);
            }
            client.posting.store(false, Ordering::Release);
        });
    }

    async fn run_post(&self) -> Result<(), Error> {
        let packets = std::mem::take(&mut *self.pending_data.lock().await);
        if packets.is_empty() {
            return Ok(());
        }
        let mut body = Vec::new();
        crate::payload::encode(&mut body, crate::payload::PayloadForm::Binary, &packets)
            .map_err(|e| Error::Io { source: e })?;

        let dur = Self::remaining(self.write_timeout, &self.write_deadline);
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let t = format!("{}-{}", now_millis(), seq);
        let path = with_query(&self.template.path, "t", &t);

        let request = async {
            let mut stream = TcpStream::connect(&self.template.host)
                .await
                .map_err(|e| Error::Io { source: e })?;
            let head = format!(
                "POST {path} HTTP/1.1\r\nHost: {host}\r\nContent-Length: {len}\r\nContent-Type: application/octet-stream\r\nConnection: close\r\n\r\n",
                path = path,
                host = self.template.host,
                len = body.len(),
            );
            stream.write_all(head.as_bytes()).await.map_err(|e| Error::Io { source: e })?;
            stream.write_all(&body).await.map_err(|e| Error::Io { source: e })?;

            let (status, _headers, resp_body) = HttpResponse::read_from(&mut stream).await?;
            if !(200..300).contains(&status) {
                return Err(Error::Http {
                    status,
                    body: String::from_utf8_lossy(&resp_body).into_owned(),
                });
            }
            Ok(())
        };

        match dur {
            Some(d) => tokio::time::timeout(d, request).await.map_err(|_| Error::Timeout)?,
            None => request.await,
        }
    }

    /// Issues one GET and returns a fresh payload decoder over the
    /// response body, latching the first successful response for
    /// `response()`.
    async fn fetch_inbound(&self) -> Result<PayloadDecoder<Cursor<Vec<u8>>>, Error> {
        let dur = Self::remaining(self.read_timeout, &self.read_deadline);
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let t = format!("{}-{}", now_millis(), seq);
        let mut path = with_query(&self.template.path, "t", &t);
        if self.template.use_b64 {
            path = with_query(&path, "b64", "1");
        }

        let request = async {
            let mut stream = TcpStream::connect(&self.template.host)
                .await
                .map_err(|e| Error::Io { source: e })?;
            let head = format!(
                "GET {path} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n",
                path = path,
                host = self.template.host,
            );
            stream.write_all(head.as_bytes()).await.map_err(|e| Error::Io { source: e })?;

            let (status, _headers, body) = HttpResponse::read_from(&mut stream).await?;
            if status == 408 {
                return Err(Error::Timeout);
            }
            if !(200..300).contains(&status) {
                return Err(Error::Http {
                    status,
                    body: String::from_utf8_lossy(&body).into_owned(),
                });
            }
            Ok((status, body))
        };

        let (status, body) = match dur {
            Some(d) => tokio::time::timeout(d, request).await.map_err(|_| Error::Timeout)??,
            None => request.await?,
        };

        *self.last_response.lock().await = Some((status, body.clone()));
        Ok(PayloadDecoder::new(Cursor::new(body)))
    }

    pub async fn next_reader(&self) -> Result<(CodeType, PacketKind, DecodedPacket), Error> {
        if self.is_closed() {
            return Err(Error::Eof);
        }

        let mut inbound = self.inbound.lock().await;
        loop {
            if let Some(decoder) = inbound.as_mut() {
                match decoder.next() {
                    Ok(pkt) => return Ok((pkt.code, pkt.kind, pkt)),
                    Err(Error::Eof) => {}
                    Err(e) => return Err(e),
                }
            }
            let fresh = self.fetch_inbound().await?;
            *inbound = Some(fresh);
        }
    }

    pub async fn response(&self) -> Option<(u16, Vec<u8>)> {
        self.last_response.lock().await.clone()
    }
}

fn with_query(path: &str, key: &str, value: &str) -> String {
    let sep = if path.contains('?') { '&' } else { '?' };
    format!("{}{}{}={}", path, sep, key, value)
}

fn now_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_query_appends_correctly() {
        assert_eq!(with_query("/engine.io", "t", "1-0"), "/engine.io?t=1-0");
        assert_eq!(with_query("/engine.io?j=3", "t", "1-0"), "/engine.io?j=3&t=1-0");
    }

    #[test]
    fn cache_buster_increments() {
        let client = PollingClient::new(
            ClientRequestTemplate {
                host: "127.0.0.1:0".into(),
                path: "/engine.io".into(),
                use_b64: false,
            },
            PollingConfig::default(),
        );
        let a = client.seq.fetch_add(1, Ordering::SeqCst);
        let b = client.seq.fetch_add(1, Ordering::SeqCst);
        assert!(b > a);
    }
}
