use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use bytes::Bytes;

use super::{AsyncContentProvider, ContentProvider, ContentSource, DeferredContentListener};

/// Request content produced while the request is already in flight.
///
/// The producing side calls [`offer`][DeferredContent::offer] as chunks
/// become available and [`close`][DeferredContent::close] when no more will
/// come; both notify the registered listener (the sender), which re-examines
/// its cursor. Offering after `close` is a contract violation.
///
/// The total length is unknown.
///
/// The listener is held weakly, so a provider outliving its sender does not
/// keep the sender alive, and no reference cycle forms between the sender
/// and the provider it registered with.
pub struct DeferredContent {
    inner: Arc<Inner>,
}

struct Inner {
    chunks: Mutex<VecDeque<Bytes>>,
    closed: AtomicBool,
    listener: Mutex<Option<Weak<dyn DeferredContentListener>>>,
}

impl DeferredContent {
    /// A provider with no chunks yet.
    pub fn new() -> DeferredContent {
        DeferredContent {
            inner: Arc::new(Inner {
                chunks: Mutex::new(VecDeque::new()),
                closed: AtomicBool::new(false),
                listener: Mutex::new(None),
            }),
        }
    }

    /// Queue a chunk and notify the listener.
    pub fn offer(&self, chunk: impl Into<Bytes>) {
        self.inner.chunks.lock().unwrap().push_back(chunk.into());
        self.inner.notify();
    }

    /// Signal that no more chunks will come, and notify the listener.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.notify();
    }
}

impl Default for DeferredContent {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn notify(&self) {
        let listener = self.listener.lock().unwrap().clone();
        if let Some(listener) = listener.and_then(|weak| weak.upgrade()) {
            listener.on_deferred_content();
        }
    }
}

impl ContentProvider for DeferredContent {
    fn length(&self) -> Option<u64> {
        None
    }

    fn open(&self) -> Box<dyn ContentSource> {
        Box::new(DeferredSource {
            inner: self.inner.clone(),
        })
    }

    fn as_async(&self) -> Option<&dyn AsyncContentProvider> {
        Some(self)
    }
}

impl AsyncContentProvider for DeferredContent {
    fn set_listener(&self, listener: Weak<dyn DeferredContentListener>) {
        *self.inner.listener.lock().unwrap() = Some(listener);
        // a producer may have raced ahead of the registration
        let pending = !self.inner.chunks.lock().unwrap().is_empty()
            || self.inner.closed.load(Ordering::Acquire);
        if pending {
            self.inner.notify();
        }
    }
}

struct DeferredSource {
    inner: Arc<Inner>,
}

impl ContentSource for DeferredSource {
    fn next_chunk(&mut self) -> Option<Bytes> {
        self.inner.chunks.lock().unwrap().pop_front()
    }

    fn is_exhausted(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire) && self.inner.chunks.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Counter(AtomicUsize);

    impl DeferredContentListener for Counter {
        fn on_deferred_content(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn offer_and_close_notify() {
        let provider = DeferredContent::new();
        let listener = Arc::new(Counter(AtomicUsize::new(0)));
        let dyn_listener: Arc<dyn DeferredContentListener> = listener.clone();
        provider.set_listener(Arc::downgrade(&dyn_listener));

        provider.offer("a");
        provider.offer("b");
        provider.close();
        assert_eq!(listener.0.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn registration_after_offer_notifies_immediately() {
        let provider = DeferredContent::new();
        provider.offer("a");

        let listener = Arc::new(Counter(AtomicUsize::new(0)));
        let dyn_listener: Arc<dyn DeferredContentListener> = listener.clone();
        provider.set_listener(Arc::downgrade(&dyn_listener));
        assert_eq!(listener.0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn source_drains_then_exhausts_on_close() {
        let provider = DeferredContent::new();
        let mut source = provider.open();

        assert!(source.next_chunk().is_none());
        assert!(!source.is_exhausted());

        provider.offer("a");
        assert_eq!(source.next_chunk().unwrap(), "a");
        assert!(source.next_chunk().is_none());
        assert!(!source.is_exhausted());

        provider.close();
        assert!(source.is_exhausted());
    }

    #[test]
    fn close_with_queued_chunks_drains_first() {
        let provider = DeferredContent::new();
        let mut source = provider.open();

        provider.offer("a");
        provider.close();
        assert!(!source.is_exhausted());
        assert_eq!(source.next_chunk().unwrap(), "a");
        assert!(source.is_exhausted());
    }

    #[test]
    fn dropped_listener_is_ignored() {
        let provider = DeferredContent::new();
        let listener = Arc::new(Counter(AtomicUsize::new(0)));
        let dyn_listener: Arc<dyn DeferredContentListener> = listener.clone();
        provider.set_listener(Arc::downgrade(&dyn_listener));
        drop(dyn_listener);
        drop(listener);
        provider.offer("a");
    }
}
