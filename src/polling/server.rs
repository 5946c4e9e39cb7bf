//! Long-poll half of a polling conn: GET drains pending outbound packets,
//! POST delivers inbound packets, both obey deadlines.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::{Duration, Instant};

use log::{debug, warn};
use tokio::sync::{mpsc, oneshot, Mutex, Notify};
use tokio::time::timeout;

use crate::config::PollingConfig;
use crate::error::Error;
use crate::http_io::{HttpRequest, HttpResponse};
use crate::jsonp::js_escape;
use crate::packet::{CodeType, PacketKind};
use crate::payload::{self, DecodedPacket, PayloadDecoder, PayloadForm};
use crate::polling::reader::PollingReader;
use crate::polling::writer::PacketBuffer;
use crate::rendezvous::Rendezvous;
use crate::trylock::TryLock;

/// Tracks in-flight HTTP handlers so `close()` can wait for them to
/// drain before tearing down shared state.
#[derive(Default)]
struct WaitGroup {
    count: AtomicUsize,
    idle: Notify,
}

impl WaitGroup {
    fn enter(&self) -> WaitGroupGuard<'_> {
        self.count.fetch_add(1, Ordering::SeqCst);
        WaitGroupGuard { wg: self }
    }

    async fn wait(&self) {
        while self.count.load(Ordering::SeqCst) > 0 {
            self.idle.notified().await;
        }
    }
}

struct WaitGroupGuard<'a> {
    wg: &'a WaitGroup,
}

impl Drop for WaitGroupGuard<'_> {
    fn drop(&mut self) {
        if self.wg.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.wg.idle.notify_waiters();
        }
    }
}

type ReadHandoffItem = (DecodedPacket, oneshot::Sender<()>);

pub struct PollingServer {
    outbound: Mutex<Vec<crate::packet::Packet>>,
    send_tx: mpsc::Sender<()>,
    send_rx: Mutex<mpsc::Receiver<()>>,
    read_handoff: Rendezvous<ReadHandoffItem>,
    get_lock: TryLock,
    post_lock: TryLock,
    closed: AtomicBool,
    handlers: WaitGroup,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    read_deadline: StdMutex<Option<Instant>>,
    write_deadline: StdMutex<Option<Instant>>,
}

impl PollingServer {
    pub fn new(config: PollingConfig) -> Self {
        let (send_tx, send_rx) = mpsc::channel(1);
        Self {
            outbound: Mutex::new(Vec::new()),
            send_tx,
            send_rx: Mutex::new(send_rx),
            read_handoff: Rendezvous::new(),
            get_lock: TryLock::new(),
            post_lock: TryLock::new(),
            closed: AtomicBool::new(false),
            handlers: WaitGroup::default(),
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            read_deadline: StdMutex::new(None),
            write_deadline: StdMutex::new(None),
        }
    }

    /// Installs an absolute deadline that overrides the configured
    /// duration for this and all subsequent reads, until replaced.
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

    pub async fn serve_http(&self, req: &HttpRequest) -> HttpResponse {
        if self.is_closed() {
            return HttpResponse::forbidden();
        }
        let _guard = self.handlers.enter();
        match req.method.as_str() {
            "GET" => self.handle_get(req).await,
            "POST" => self.handle_post(req).await,
            _ => HttpResponse::new(200, "OK"),
        }
    }

    async fn handle_get(&self, req: &HttpRequest) -> HttpResponse {
        let _get_guard = match self.get_lock.try_lock() {
            Some(g) => g,
            None => {
                debug!("rejecting concurrent GET: interleave");
                return HttpResponse::new(400, "Bad Request").with_body(b"interleave GET\n".to_vec());
            }
        };

        let wait = Self::remaining(self.write_timeout, &self.write_deadline);
        let signaled = match wait {
            Some(d) => timeout(d, self.send_rx.lock().await.recv()).await,
            None => Ok(self.send_rx.lock().await.recv().await),
        };
        match signaled {
            Ok(Some(())) => {}
            Ok(None) | Err(_) => {
                warn!("GET timed out waiting for outbound data");
                return HttpResponse::request_timeout();
            }
        }

        let b64 = req.query.contains_key("b64");
        let form = if b64 { PayloadForm::Text } else { PayloadForm::Binary };
        let content_type = if b64 {
            "text/plain; charset=UTF-8"
        } else {
            "application/octet-stream"
        };

        let packets = {
            let mut outbound = self.outbound.lock().await;
            std::mem::take(&mut *outbound)
        };

        let mut raw = Vec::new();
        if let Err(e) = payload::encode(&mut raw, form, &packets) {
            return HttpResponse::new(500, "Internal Server Error").with_body(e.to_string().into_bytes());
        }

        if let Some(jsonp_id) = req.query.get("j") {
            let escaped = js_escape(&raw);
            let body = format!("___eio[{}](\"{}\");", jsonp_id, escaped).into_bytes();
            return HttpResponse::new(200, "OK")
                .with_header("Content-Type", "text/javascript; charset=UTF-8")
                .with_body(body);
        }

        HttpResponse::new(200, "OK")
            .with_header("Content-Type", content_type)
            .with_body(raw)
    }

    async fn handle_post(&self, req: &HttpRequest) -> HttpResponse {
        let _post_guard = match self.post_lock.try_lock() {
            Some(g) => g,
            None => {
                debug!("rejecting concurrent POST: interleave");
                return HttpResponse::new(400, "Bad Request").with_body(b"interleave POST\n".to_vec());
            }
        };

        let body = if req.query.contains_key("j") {
            let form = crate::http_io::parse_urlencoded(&String::from_utf8_lossy(&req.body));
            form.get("d").cloned().unwrap_or_default().into_bytes()
        } else {
            req.body.clone()
        };

        let mut decoder = PayloadDecoder::new(Cursor::new(body));
        loop {
            let pkt = match decoder.next() {
                Err(Error::Eof) => break,
                Err(e) => return HttpResponse::bad_request(e.to_string()),
                Ok(pkt) => pkt,
            };

            let dur = Self::remaining(self.read_timeout, &self.read_deadline);
            let (tx, rx) = oneshot::channel();

            let put = self.read_handoff.put((pkt, tx));
            let put_ok = match dur {
                Some(d) => timeout(d, put).await.is_ok(),
                None => {
                    put.await;
                    true
                }
            };
            if !put_ok {
                return HttpResponse::request_timeout();
            }

            let closed = match dur {
                Some(d) => timeout(d, rx).await,
                None => Ok(rx.await),
            };
            if closed.is_err() {
                return HttpResponse::request_timeout();
            }
        }

        HttpResponse::ok_text(b"ok".to_vec())
    }

    /// Blocks until a POST delivers a packet, or the read deadline/close
    /// fires.
    pub async fn next_reader(&self) -> Result<(CodeType, PacketKind, PollingReader), Error> {
        if self.is_closed() {
            return Err(Error::Eof);
        }
        let dur = Self::remaining(self.read_timeout, &self.read_deadline);
        let take = self.read_handoff.take();
        let (pkt, tx) = match dur {
            Some(d) => timeout(d, take).await.map_err(|_| Error::Timeout)?,
            None => take.await,
        };
        Ok((pkt.code, pkt.kind, PollingReader::new(pkt.data, tx)))
    }

    /// Returns a buffer; `commit` appends it as a `Packet` to the
    /// outbound queue and kicks `sendChan` (drop-if-full — it only needs
    /// to signal "there is at least one pending batch").
    pub fn next_writer(&self, code: CodeType, kind: PacketKind) -> PacketBuffer {
        PacketBuffer::new(code, kind)
    }

    pub async fn commit_writer(&self, buffer: PacketBuffer) {
        let packet = buffer.into_packet();
        self.outbound.lock().await.push(packet);
        let _ = self.send_tx.try_send(());
    }

    pub async fn close(&self) -> Result<(), Error> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.handlers.wait().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::CodeType;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn get_before_any_write_times_out() {
        let server = Arc::new(PollingServer::new(PollingConfig {
            read_timeout: None,
            write_timeout: Some(Duration::from_millis(50)),
        }));
        let req = HttpRequest {
            method: "GET".into(),
            path: "/engine.io".into(),
            query: Default::default(),
            headers: Default::default(),
            body: Vec::new(),
        };
        let resp = server.serve_http(&req).await;
        assert_eq!(resp.status, 408);
    }

    #[tokio::test]
    async fn concurrent_get_is_rejected_with_interleave() {
        let server = Arc::new(PollingServer::new(PollingConfig {
            read_timeout: None,
            write_timeout: Some(Duration::from_millis(200)),
        }));
        let req = Arc::new(HttpRequest {
            method: "GET".into(),
            path: "/engine.io".into(),
            query: Default::default(),
            headers: Default::default(),
            body: Vec::new(),
        });

        let s1 = server.clone();
        let r1 = req.clone();
        let h1 = tokio::spawn(async move { s1.serve_http(&r1).await });

        tokio::time::sleep(Duration::from_millis(20)).await;

        let resp2 = server.serve_http(&req).await;
        assert_eq!(resp2.status, 400);
        assert_eq!(resp2.body, b"interleave GET\n");

        let resp1 = h1.await.unwrap();
        assert_eq!(resp1.status, 408);
    }

    #[tokio::test]
    async fn get_drains_queued_writes() {
        let server = PollingServer::new(PollingConfig {
            read_timeout: None,
            write_timeout: Some(Duration::from_millis(200)),
        });

        let mut w = server.next_writer(CodeType::Text, PacketKind::Message);
        std::io::Write::write_all(&mut w, b"hi").unwrap();
        server.commit_writer(w).await;

        let req = HttpRequest {
            method: "GET".into(),
            path: "/engine.io".into(),
            query: Default::default(),
            headers: Default::default(),
            body: Vec::new(),
        };
        let resp = server.serve_http(&req).await;
        assert_eq!(resp.status, 200);
        assert_eq!(resp.headers[0].1, "application/octet-stream");
        assert!(!resp.body.is_empty());
    }
}
