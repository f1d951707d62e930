//! Typed one-to-many pipeline plumbing.
//!
//! Every stage of the media pipeline is a node that consumes one item type
//! and produces another:
//!
//! ```text
//! RtspClient ──JpegFrame──▶ MjpegToH264 ──H264Frame──▶ TsSegmenter ──TsSegment──▶ HlsServlet
//! ```
//!
//! Two composed capabilities replace the observer/provider inheritance of
//! classic designs: a node implements [`Sink<I>`] for its input and owns a
//! [`Notifier<O>`] for its output. Delivery is synchronous and in
//! registration order on the producer's thread — there is no queue between
//! stages, so a slow stage backpressures the RTP receiver (acceptable for
//! live best-effort delivery).

use std::sync::Arc;

use crate::error::Result;

/// A pipeline stage input: accepts one item at a time.
///
/// `receive` takes `&self` so nodes can be shared as `Arc<dyn Sink<T>>`
/// across the wiring code and the producing thread; mutable node state
/// lives behind the node's own mutex.
///
/// An `Err` return is fatal to the pipeline: the producer stops and the
/// supervisor tears the session down (per-packet recovery happens *before*
/// items enter the pipeline, in the depacketizer).
pub trait Sink<T>: Send + Sync {
    fn receive(&self, item: &T) -> Result<()>;
}

/// Ordered fan-out of one producer's output to its observers.
pub struct Notifier<T> {
    observers: Vec<Arc<dyn Sink<T>>>,
}

impl<T> Notifier<T> {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    /// Register an observer. Observers are invoked in registration order.
    pub fn subscribe(&mut self, observer: Arc<dyn Sink<T>>) {
        self.observers.push(observer);
    }

    /// Deliver `item` to every observer, synchronously, stopping at the
    /// first failure.
    pub fn broadcast(&self, item: &T) -> Result<()> {
        for observer in &self.observers {
            observer.receive(item)?;
        }
        Ok(())
    }

    /// Number of registered observers.
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl<T> Default for Notifier<T> {
    fn default() -> Self {
        Self::new()
    }
}
