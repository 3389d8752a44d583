use std::sync::Arc;

use bytes::Bytes;

use crate::error::Cause;
use crate::exchange::ExchangeResult;
use crate::request::Request;

/// Observer of a request's lifecycle events.
///
/// Callbacks run synchronously on the thread performing the corresponding
/// state transition, strictly after the transition has been recorded, so a
/// listener calling back into the sender (for example to abort) observes a
/// consistent state. Listeners must not block.
pub trait RequestListener: Send + Sync {
    /// The request was picked up for processing.
    fn on_begin(&self, _request: &Request) {}

    /// The headers are about to be handed to the transport.
    fn on_headers(&self, _request: &Request) {}

    /// The headers are on the wire; the peer may have seen the request.
    fn on_commit(&self, _request: &Request) {}

    /// A content chunk is on the wire.
    fn on_content(&self, _request: &Request, _chunk: &Bytes) {}

    /// The request was fully sent.
    fn on_success(&self, _request: &Request) {}

    /// The request failed.
    fn on_failure(&self, _request: &Request, _cause: &Cause) {}
}

/// Observer of the terminal request+response outcome.
pub trait CompleteListener: Send + Sync {
    /// Both sides of the exchange have terminated.
    fn on_complete(&self, _result: &ExchangeResult) {}
}

/// Ordered fan-out of request lifecycle events.
pub struct RequestNotifier {
    listeners: Vec<Arc<dyn RequestListener>>,
}

impl RequestNotifier {
    /// A notifier with no listeners.
    pub fn new() -> RequestNotifier {
        RequestNotifier {
            listeners: Vec::new(),
        }
    }

    /// Register a listener. Events fan out in registration order.
    pub fn add(&mut self, listener: Arc<dyn RequestListener>) {
        self.listeners.push(listener);
    }

    pub(crate) fn notify_begin(&self, request: &Request) {
        for listener in &self.listeners {
            listener.on_begin(request);
        }
    }

    pub(crate) fn notify_headers(&self, request: &Request) {
        for listener in &self.listeners {
            listener.on_headers(request);
        }
    }

    pub(crate) fn notify_commit(&self, request: &Request) {
        for listener in &self.listeners {
            listener.on_commit(request);
        }
    }

    pub(crate) fn notify_content(&self, request: &Request, chunk: &Bytes) {
        for listener in &self.listeners {
            listener.on_content(request, chunk);
        }
    }

    pub(crate) fn notify_success(&self, request: &Request) {
        for listener in &self.listeners {
            listener.on_success(request);
        }
    }

    pub(crate) fn notify_failure(&self, request: &Request, cause: &Cause) {
        for listener in &self.listeners {
            listener.on_failure(request, cause);
        }
    }
}

impl Default for RequestNotifier {
    fn default() -> Self {
        Self::new()
    }
}
