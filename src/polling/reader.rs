//! The reader handed back from the server's `NextReader`: wraps an
//! already-decoded packet's bytes and, on `close`, releases the POST
//! handler that is blocked waiting for the application to finish with it.

use std::io::{self, Cursor, Read};

use tokio::sync::oneshot;

pub struct PollingReader {
    cursor: Cursor<Vec<u8>>,
    release: Option<oneshot::Sender<()>>,
}

impl PollingReader {
    pub fn new(data: Vec<u8>, release: oneshot::Sender<()>) -> Self {
        Self {
            cursor: Cursor::new(data),
            release: Some(release),
        }
    }

    /// Signals the waiting POST handler. Idempotent — a second call is a
    /// no-op, so a manual call followed by `Drop` never double-releases.
    pub fn close(&mut self) {
        if let Some(tx) = self.release.take() {
            let _ = tx.send(());
        }
    }
}

impl Read for PollingReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Drop for PollingReader {
    fn drop(&mut self) {
        self.close();
    }
}
