//! Event sink: a bounded, closable multi-producer/single-consumer funnel.
//!
//! # Contract
//! - `send` waits while the queue is full; slow consumption stalls producers
//!   instead of dropping events.
//! - `close` is performed by whichever producer decides the process must
//!   exit. The end-of-stream marker is queued behind every event already
//!   sent, so the consumer sees all of them first.
//! - Producers are expected to stop before closing. A send after close is
//!   rejected with [`SinkError::Closed`].

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Which producer handed an event to the sink or asked to close it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkSource {
    /// The HTTP listener task.
    Listener,
    /// The OS signal watcher.
    Signal,
    /// Anything holding a sender or handle from outside the lifecycle module.
    External,
}

impl SinkSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkSource::Listener => "listener",
            SinkSource::Signal => "signal",
            SinkSource::External => "external",
        }
    }
}

impl fmt::Display for SinkSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SinkError {
    /// The sink was closed by a producer.
    #[error("event sink is closed")]
    Closed,
    /// The consumer is gone.
    #[error("event sink consumer dropped")]
    Disconnected,
}

/// An event as seen by the consumer.
#[derive(Debug)]
pub struct SinkItem<E> {
    pub source: SinkSource,
    pub payload: E,
}

enum Delivery<E> {
    Event(SinkItem<E>),
    EndOfStream,
}

/// Constructor for sink channel pairs.
pub struct EventSink;

impl EventSink {
    /// Create a sink holding at most `capacity` undelivered events.
    pub fn bounded<E>(capacity: usize) -> (SinkSender<E>, SinkReceiver<E>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let closed = Arc::new(AtomicBool::new(false));
        (
            SinkSender { tx, closed },
            SinkReceiver { rx, finished: false },
        )
    }
}

/// Producer half. Cheap to clone.
pub struct SinkSender<E> {
    tx: mpsc::Sender<Delivery<E>>,
    closed: Arc<AtomicBool>,
}

impl<E> Clone for SinkSender<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            closed: Arc::clone(&self.closed),
        }
    }
}

impl<E> SinkSender<E> {
    /// Queue `payload`, waiting for room if the sink is full.
    pub async fn send(&self, source: SinkSource, payload: E) -> Result<(), SinkError> {
        if self.is_closed() {
            return Err(SinkError::Closed);
        }
        self.tx
            .send(Delivery::Event(SinkItem { source, payload }))
            .await
            .map_err(|_| SinkError::Disconnected)
    }

    /// Signal end-of-stream. Returns true for the call that actually closed
    /// the sink, false if it was already closed.
    pub async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        // A vanished consumer has nothing left to wake up.
        let _ = self.tx.send(Delivery::EndOfStream).await;
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Consumer half. Owned by the coordinator loop.
pub struct SinkReceiver<E> {
    rx: mpsc::Receiver<Delivery<E>>,
    finished: bool,
}

impl<E> SinkReceiver<E> {
    /// Next event in arrival order, or `None` once the stream has ended
    /// (closed by a producer, or every producer dropped).
    pub async fn recv(&mut self) -> Option<SinkItem<E>> {
        if self.finished {
            return None;
        }
        match self.rx.recv().await {
            Some(Delivery::Event(item)) => Some(item),
            Some(Delivery::EndOfStream) | None => {
                self.finished = true;
                self.rx.close();
                None
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}
