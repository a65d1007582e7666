//! Per-extension event fan-out
//!
//! One broker serves every SSE subscriber of one extension. Delivery is
//! best-effort over a broadcast channel: a publish never blocks and never
//! waits for any subscriber; a subscriber that lags far enough simply
//! misses events.

use bytes::Bytes;
use futures::future::ready;
use futures::stream::{self, BoxStream, StreamExt};
use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

const BROKER_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
enum Message {
    Event { name: String, data: String },
    Closed,
}

struct Inner {
    tx: broadcast::Sender<Message>,
    closed: AtomicBool,
}

/// Fan-out sink for one extension's call events.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<Inner>,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl Broker {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BROKER_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                tx,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Publish one event to every current subscriber. No-op after `close`
    /// or when nobody listens.
    pub fn publish(&self, name: &str, data: String) {
        if self.inner.closed.load(Ordering::Acquire) {
            return;
        }
        let _ = self.inner.tx.send(Message::Event {
            name: name.to_string(),
            data,
        });
    }

    /// Number of subscribers currently being served.
    pub fn connected(&self) -> usize {
        self.inner.tx.receiver_count()
    }

    /// Disconnect every subscriber. Idempotent; the broker stays closed.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.inner.tx.send(Message::Closed);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// SSE-framed stream of events for one subscriber.
    ///
    /// Ends when the broker is closed; a lagging subscriber skips the
    /// events it lost and keeps going.
    pub fn sse_stream(&self) -> BoxStream<'static, Result<Bytes, Infallible>> {
        if self.is_closed() {
            return stream::empty().boxed();
        }
        let rx = self.inner.tx.subscribe();
        BroadcastStream::new(rx)
            .take_while(|item| ready(!matches!(item, Ok(Message::Closed))))
            .filter_map(|item| {
                ready(match item {
                    Ok(Message::Event { name, data }) => Some(Ok(Bytes::from(format!(
                        "event: {}\ndata: {}\n\n",
                        name, data
                    )))),
                    Ok(Message::Closed) => None,
                    Err(BroadcastStreamRecvError::Lagged(missed)) => {
                        warn!(missed, "slow sse subscriber skipped events");
                        None
                    }
                })
            })
            .boxed()
    }
}
