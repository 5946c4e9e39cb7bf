//! A single-slot async handoff: one POST hands a decoded packet directly
//! to the transport's pending `NextReader` caller, without an
//! intermediate queue.

use tokio::sync::Notify;
use tokio::sync::Mutex;

/// Holds at most one `T` at a time. A producer calls `put` and waits
/// until a consumer calls `take`; a consumer calls `take` and waits
/// until a producer calls `put`. Mirrors a CSP-style unbuffered channel,
/// but re-usable across many hand-offs instead of being consumed on
/// first use.
pub struct Rendezvous<T> {
    slot: Mutex<Option<T>>,
    item_ready: Notify,
    slot_free: Notify,
}

impl<T> Rendezvous<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            item_ready: Notify::new(),
            slot_free: Notify::new(),
        }
    }

    /// Waits for the slot to be empty, places `item`, then wakes a
    /// waiting consumer.
    pub async fn put(&self, item: T) {
        loop {
            {
                let mut slot = self.slot.lock().await;
                if slot.is_none() {
                    *slot = Some(item);
                    self.item_ready.notify_one();
                    return;
                }
            }
            self.slot_free.notified().await;
        }
    }

    /// Waits for an item to appear in the slot, removes it, then wakes a
    /// waiting producer.
    pub async fn take(&self) -> T {
        loop {
            {
                let mut slot = self.slot.lock().await;
                if let Some(item) = slot.take() {
                    self.slot_free.notify_one();
                    return item;
                }
            }
            self.item_ready.notified().await;
        }
    }
}

impl<T> Default for Rendezvous<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn put_then_take_round_trips() {
        let rv: Arc<Rendezvous<u32>> = Arc::new(Rendezvous::new());
        let producer = rv.clone();
        let handle = tokio::spawn(async move {
            producer.put(42).await;
        });
        let got = rv.take().await;
        assert_eq!(got, 42);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn take_blocks_until_put() {
        let rv: Arc<Rendezvous<&'static str>> = Arc::new(Rendezvous::new());
        let consumer = rv.clone();
        let handle = tokio::spawn(async move { consumer.take().await });
        tokio::task::yield_now().await;
        rv.put("hello").await;
        let got = handle.await.unwrap();
        assert_eq!(got, "hello");
    }
}
